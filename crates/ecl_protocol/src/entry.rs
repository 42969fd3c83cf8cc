//! Directory entries and search scopes.

use crate::dn::Dn;
use serde::{Deserialize, Serialize};

/// Scope of a search relative to its base DN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    /// Only the base entry.
    BaseObject,
    /// Immediate children of the base.
    SingleLevel,
    /// The base and everything below it.
    WholeSubtree,
    /// Everything below the base, excluding the base.
    Subordinates,
}

impl SearchScope {
    /// Returns true if an entry named `dn` is in scope of a search on `base`.
    pub fn contains(self, base: &Dn, dn: &Dn) -> bool {
        match self {
            SearchScope::BaseObject => dn == base,
            SearchScope::SingleLevel => dn.parent().as_ref() == Some(base),
            SearchScope::WholeSubtree => dn.is_descendant_of(base),
            SearchScope::Subordinates => dn != base && dn.is_descendant_of(base),
        }
    }
}

/// A named attribute with its values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// Attribute description (name plus options), as written.
    pub name: String,
    /// Values in insertion order.
    pub values: Vec<String>,
}

impl Attribute {
    /// Creates an attribute with the given values.
    pub fn new<I, V>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a single-valued attribute.
    pub fn single(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: vec![value.into()],
        }
    }

    /// Returns true if the attribute's base name (options stripped) is `name`.
    pub fn is_named(&self, name: &str) -> bool {
        let base = self.name.split(';').next().unwrap_or_default();
        base.eq_ignore_ascii_case(name)
    }

    /// The first value, if any.
    pub fn first_value(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }

    /// Returns true if the attribute carries no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A directory entry.
///
/// Changelog entries are synthesized per search response and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Entry DN.
    pub dn: Dn,
    /// Object classes.
    pub object_classes: Vec<String>,
    /// User and operational attributes, in insertion order.
    pub attributes: Vec<Attribute>,
}

impl Entry {
    /// Creates an entry with no attributes.
    pub fn new<I, S>(dn: Dn, object_classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            dn,
            object_classes: object_classes.into_iter().map(Into::into).collect(),
            attributes: Vec::new(),
        }
    }

    /// Adds a single-valued attribute, replacing any attribute of the same name.
    pub fn put(&mut self, name: &str, value: impl Into<String>) {
        self.attributes.retain(|a| !a.is_named(name));
        self.attributes.push(Attribute::single(name, value));
    }

    /// Returns the attribute called `name` (case-insensitive).
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.is_named(name))
    }

    /// Returns the first value of `name`.
    pub fn first_value(&self, name: &str) -> Option<&str> {
        self.attribute(name).and_then(Attribute::first_value)
    }

    /// Returns all values of `name`. `objectClass` is answered from the
    /// object class list.
    pub fn values(&self, name: &str) -> Vec<&str> {
        if name.eq_ignore_ascii_case("objectclass") {
            return self.object_classes.iter().map(String::as_str).collect();
        }
        self.attributes
            .iter()
            .filter(|a| a.is_named(name))
            .flat_map(|a| a.values.iter().map(String::as_str))
            .collect()
    }

    /// Returns true if the entry has the object class `oc`.
    pub fn has_object_class(&self, oc: &str) -> bool {
        self.object_classes.iter().any(|c| c.eq_ignore_ascii_case(oc))
    }

    /// Returns true if the entry is in scope of a search on `base`.
    pub fn matches_base_and_scope(&self, base: &Dn, scope: SearchScope) -> bool {
        scope.contains(base, &self.dn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    #[test]
    fn scopes() {
        let root = dn("cn=changelog");
        let child = dn("changeNumber=1,cn=changelog");
        let grandchild = dn("replicationCSN=x,o=test,cn=changelog");

        assert!(SearchScope::BaseObject.contains(&root, &root));
        assert!(!SearchScope::BaseObject.contains(&root, &child));
        assert!(SearchScope::SingleLevel.contains(&root, &child));
        assert!(!SearchScope::SingleLevel.contains(&root, &grandchild));
        assert!(SearchScope::WholeSubtree.contains(&root, &root));
        assert!(SearchScope::WholeSubtree.contains(&root, &grandchild));
        assert!(!SearchScope::Subordinates.contains(&root, &root));
        assert!(SearchScope::Subordinates.contains(&root, &grandchild));
    }

    #[test]
    fn attribute_lookup_ignores_case_and_options() {
        let mut entry = Entry::new(dn("cn=changelog"), ["top", "container"]);
        entry.attributes.push(Attribute::single("description;lang-en", "hello"));
        entry.put("hasSubordinates", "true");

        assert_eq!(entry.first_value("DESCRIPTION"), Some("hello"));
        assert_eq!(entry.first_value("hassubordinates"), Some("true"));
        assert_eq!(entry.values("objectClass"), vec!["top", "container"]);
        assert!(entry.has_object_class("CONTAINER"));
    }

    #[test]
    fn put_replaces() {
        let mut entry = Entry::new(dn("cn=changelog"), ["top"]);
        entry.put("cn", "a");
        entry.put("CN", "b");
        assert_eq!(entry.values("cn"), vec!["b"]);
    }
}

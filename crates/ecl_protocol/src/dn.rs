//! Distinguished names.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A single-valued relative distinguished name, `attr=value`.
///
/// The attribute name and value keep the case they were written with for
/// display; comparisons are case-insensitive.
#[derive(Debug, Clone)]
pub struct Rdn {
    attr: String,
    value: String,
    norm_attr: String,
    norm_value: String,
}

impl Rdn {
    /// Creates an RDN.
    pub fn new(attr: impl Into<String>, value: impl Into<String>) -> Self {
        let attr = attr.into();
        let value = value.into();
        Self {
            norm_attr: attr.trim().to_ascii_lowercase(),
            norm_value: value.trim().to_lowercase(),
            attr,
            value,
        }
    }

    /// The attribute name as written.
    pub fn attr(&self) -> &str {
        &self.attr
    }

    /// The attribute value as written.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns the value if this RDN's attribute is `attr` (case-insensitive).
    pub fn value_of(&self, attr: &str) -> Option<&str> {
        if self.norm_attr.eq_ignore_ascii_case(attr) {
            Some(&self.value)
        } else {
            None
        }
    }

    fn key(&self) -> (&str, &str) {
        (&self.norm_attr, &self.norm_value)
    }
}

impl PartialEq for Rdn {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Rdn {}

impl Hash for Rdn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl Ord for Rdn {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl PartialOrd for Rdn {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attr, self.value)
    }
}

/// A distinguished name: a sequence of RDNs, leaf first.
///
/// The empty DN names the root DSE.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Dn {
    rdns: Vec<Rdn>,
}

impl Dn {
    /// Returns the empty (root DSE) DN.
    pub fn root_dse() -> Self {
        Self::default()
    }

    /// Builds a DN from RDNs, leaf first.
    pub fn from_rdns(rdns: Vec<Rdn>) -> Self {
        Self { rdns }
    }

    /// Parses a DN string such as `replicationCSN=...,o=test,cn=changelog`.
    pub fn parse(s: &str) -> ProtocolResult<Self> {
        s.parse()
    }

    /// Number of RDNs.
    pub fn size(&self) -> usize {
        self.rdns.len()
    }

    /// Returns true for the root DSE.
    pub fn is_root_dse(&self) -> bool {
        self.rdns.is_empty()
    }

    /// The leaf RDN.
    pub fn rdn(&self) -> Option<&Rdn> {
        self.rdns.first()
    }

    /// All RDNs, leaf first.
    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    /// The parent DN, `None` for the root DSE.
    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.is_empty() {
            None
        } else {
            Some(Self {
                rdns: self.rdns[1..].to_vec(),
            })
        }
    }

    /// Returns `rdn,self`.
    pub fn child(&self, rdn: Rdn) -> Dn {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(rdn);
        rdns.extend(self.rdns.iter().cloned());
        Self { rdns }
    }

    /// Returns `self,suffix`.
    pub fn concat(&self, suffix: &Dn) -> Dn {
        let mut rdns = self.rdns.clone();
        rdns.extend(suffix.rdns.iter().cloned());
        Self { rdns }
    }

    /// Returns true if `self` equals `ancestor` or lies below it.
    pub fn is_descendant_of(&self, ancestor: &Dn) -> bool {
        let n = ancestor.rdns.len();
        self.rdns.len() >= n && self.rdns[self.rdns.len() - n..] == ancestor.rdns[..]
    }

    /// Returns the part of `self` above `ancestor` (leaf first), or `None`
    /// if `self` is not under `ancestor`.
    pub fn relative_to(&self, ancestor: &Dn) -> Option<Dn> {
        if !self.is_descendant_of(ancestor) {
            return None;
        }
        let keep = self.rdns.len() - ancestor.rdns.len();
        Some(Self {
            rdns: self.rdns[..keep].to_vec(),
        })
    }
}

impl Ord for Dn {
    fn cmp(&self, other: &Self) -> Ordering {
        // Compare from the root down so siblings group under their parent.
        self.rdns.iter().rev().cmp(other.rdns.iter().rev())
    }
}

impl PartialOrd for Dn {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rdn) in self.rdns.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{rdn}")?;
        }
        Ok(())
    }
}

impl FromStr for Dn {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        if s.trim().is_empty() {
            return Ok(Self::root_dse());
        }
        let mut rdns = Vec::new();
        for component in split_unescaped(s, ',') {
            let (attr, value) = component
                .split_once('=')
                .ok_or_else(|| ProtocolError::invalid_dn(s, format!("'{component}' has no '='")))?;
            let attr = attr.trim();
            if attr.is_empty() {
                return Err(ProtocolError::invalid_dn(s, "empty attribute name"));
            }
            rdns.push(Rdn::new(attr, value.trim()));
        }
        Ok(Self { rdns })
    }
}

impl Serialize for Dn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Dn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Splits on `sep` except where it is escaped with a backslash.
pub(crate) fn split_unescaped(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == sep {
            parts.push(&s[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&s[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_keep_case() {
        let dn = Dn::parse("replicationCSN=abc,o=Test,cn=changelog").unwrap();
        assert_eq!(dn.size(), 3);
        assert_eq!(dn.to_string(), "replicationCSN=abc,o=Test,cn=changelog");
        assert_eq!(dn.rdn().unwrap().value_of("replicationcsn"), Some("abc"));
    }

    #[test]
    fn comparison_ignores_case_and_spaces() {
        let a = Dn::parse("CN=Changelog").unwrap();
        let b = Dn::parse("cn = changelog").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn descendant_and_relative() {
        let root = Dn::parse("cn=changelog").unwrap();
        let entry = Dn::parse("changeNumber=4,cn=changelog").unwrap();
        assert!(entry.is_descendant_of(&root));
        assert!(root.is_descendant_of(&root));
        assert!(!root.is_descendant_of(&entry));
        assert_eq!(entry.relative_to(&root).unwrap().to_string(), "changeNumber=4");
        assert_eq!(entry.parent().unwrap(), root);
    }

    #[test]
    fn escaped_commas_stay_in_value() {
        let dn = Dn::parse("cn=a\\,b,o=test").unwrap();
        assert_eq!(dn.size(), 2);
        assert_eq!(dn.rdn().unwrap().value(), "a\\,b");
    }

    #[test]
    fn empty_string_is_root_dse() {
        assert!(Dn::parse("").unwrap().is_root_dse());
        assert!(Dn::parse("novalue").is_err());
    }

    #[test]
    fn child_and_concat() {
        let root = Dn::parse("cn=changelog").unwrap();
        let domain = Dn::parse("o=test").unwrap();
        let dn = domain.concat(&root).child(Rdn::new("replicationCSN", "x"));
        assert_eq!(dn.to_string(), "replicationCSN=x,o=test,cn=changelog");
    }
}

//! Search filters (RFC 4515 string form).

use crate::entry::Entry;
use crate::error::{ProtocolError, ProtocolResult};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A search filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// All components match.
    And(Vec<Filter>),
    /// At least one component matches.
    Or(Vec<Filter>),
    /// The component does not match.
    Not(Box<Filter>),
    /// `(attr=value)`
    Equality {
        /// Attribute name.
        attr: String,
        /// Assertion value.
        value: String,
    },
    /// `(attr>=value)`
    GreaterOrEqual {
        /// Attribute name.
        attr: String,
        /// Assertion value.
        value: String,
    },
    /// `(attr<=value)`
    LessOrEqual {
        /// Attribute name.
        attr: String,
        /// Assertion value.
        value: String,
    },
    /// `(attr=*)`
    Present {
        /// Attribute name.
        attr: String,
    },
    /// `(attr=init*any*final)`
    Substring {
        /// Attribute name.
        attr: String,
        /// Leading fragment.
        initial: Option<String>,
        /// Middle fragments, in order.
        any: Vec<String>,
        /// Trailing fragment.
        final_: Option<String>,
    },
}

impl Filter {
    /// Parses the string form, e.g. `(&(changeNumber>=2)(changeNumber<=5))`.
    pub fn parse(s: &str) -> ProtocolResult<Self> {
        s.parse()
    }

    /// `(objectClass=*)`, the filter that matches every entry.
    pub fn match_all() -> Self {
        Filter::Present {
            attr: "objectClass".into(),
        }
    }

    /// Builds an equality filter.
    pub fn equality(attr: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equality {
            attr: attr.into(),
            value: value.into(),
        }
    }

    /// Returns true if `entry` matches this filter.
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Filter::And(components) => components.iter().all(|f| f.matches(entry)),
            Filter::Or(components) => components.iter().any(|f| f.matches(entry)),
            Filter::Not(inner) => !inner.matches(entry),
            Filter::Equality { attr, value } => entry
                .values(attr)
                .iter()
                .any(|v| compare_values(v, value) == Ordering::Equal),
            Filter::GreaterOrEqual { attr, value } => entry
                .values(attr)
                .iter()
                .any(|v| compare_values(v, value) != Ordering::Less),
            Filter::LessOrEqual { attr, value } => entry
                .values(attr)
                .iter()
                .any(|v| compare_values(v, value) != Ordering::Greater),
            Filter::Present { attr } => !entry.values(attr).is_empty(),
            Filter::Substring {
                attr,
                initial,
                any,
                final_,
            } => entry
                .values(attr)
                .iter()
                .any(|v| substring_matches(v, initial.as_deref(), any, final_.as_deref())),
        }
    }
}

/// Integer-valued attributes compare numerically, everything else
/// case-insensitively.
fn compare_values(actual: &str, assertion: &str) -> Ordering {
    match (actual.trim().parse::<i64>(), assertion.trim().parse::<i64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => actual
            .trim()
            .to_lowercase()
            .cmp(&assertion.trim().to_lowercase()),
    }
}

fn substring_matches(value: &str, initial: Option<&str>, any: &[String], final_: Option<&str>) -> bool {
    let value = value.to_lowercase();
    let mut rest = value.as_str();
    if let Some(initial) = initial {
        let initial = initial.to_lowercase();
        match rest.strip_prefix(initial.as_str()) {
            Some(r) => rest = r,
            None => return false,
        }
    }
    for fragment in any {
        let fragment = fragment.to_lowercase();
        match rest.find(fragment.as_str()) {
            Some(pos) => rest = &rest[pos + fragment.len()..],
            None => return false,
        }
    }
    match final_ {
        Some(final_) => rest.ends_with(final_.to_lowercase().as_str()),
        None => true,
    }
}

impl FromStr for Filter {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        let trimmed = s.trim();
        // A bare "attr=value" is accepted as shorthand for "(attr=value)".
        let owned;
        let input = if trimmed.starts_with('(') {
            trimmed
        } else {
            owned = format!("({trimmed})");
            owned.as_str()
        };
        let mut parser = Parser {
            source: s,
            bytes: input.as_bytes(),
            text: input,
            pos: 0,
        };
        let filter = parser.filter()?;
        if parser.pos != parser.bytes.len() {
            return Err(parser.error("trailing characters"));
        }
        Ok(filter)
    }
}

struct Parser<'a> {
    source: &'a str,
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: impl Into<String>) -> ProtocolError {
        ProtocolError::invalid_filter(self.source, reason)
    }

    fn expect(&mut self, byte: u8) -> ProtocolResult<()> {
        if self.bytes.get(self.pos) == Some(&byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected '{}' at offset {}", byte as char, self.pos)))
        }
    }

    fn filter(&mut self) -> ProtocolResult<Filter> {
        self.expect(b'(')?;
        let filter = match self.bytes.get(self.pos) {
            Some(b'&') => {
                self.pos += 1;
                Filter::And(self.filter_list()?)
            }
            Some(b'|') => {
                self.pos += 1;
                Filter::Or(self.filter_list()?)
            }
            Some(b'!') => {
                self.pos += 1;
                Filter::Not(Box::new(self.filter()?))
            }
            Some(_) => self.item()?,
            None => return Err(self.error("unexpected end of filter")),
        };
        self.expect(b')')?;
        Ok(filter)
    }

    fn filter_list(&mut self) -> ProtocolResult<Vec<Filter>> {
        let mut components = Vec::new();
        while self.bytes.get(self.pos) == Some(&b'(') {
            components.push(self.filter()?);
        }
        if components.is_empty() {
            return Err(self.error("empty filter list"));
        }
        Ok(components)
    }

    fn item(&mut self) -> ProtocolResult<Filter> {
        let start = self.pos;
        while let Some(&b) = self.bytes.get(self.pos) {
            if b == b')' {
                break;
            }
            self.pos += 1;
        }
        let item = &self.text[start..self.pos];
        let eq = item
            .find('=')
            .ok_or_else(|| self.error(format!("'{item}' has no operator")))?;
        let (attr, op) = match item[..eq].chars().last() {
            Some('>') => (&item[..eq - 1], ">="),
            Some('<') => (&item[..eq - 1], "<="),
            Some('~') => (&item[..eq - 1], "~="),
            _ => (&item[..eq], "="),
        };
        let attr = attr.trim().to_string();
        if attr.is_empty() {
            return Err(self.error("empty attribute name"));
        }
        let raw = &item[eq + 1..];
        match op {
            ">=" => Ok(Filter::GreaterOrEqual {
                attr,
                value: self.unescape(raw)?,
            }),
            "<=" => Ok(Filter::LessOrEqual {
                attr,
                value: self.unescape(raw)?,
            }),
            _ if raw == "*" => Ok(Filter::Present { attr }),
            _ if raw.contains('*') => {
                let parts: Vec<&str> = raw.split('*').collect();
                let last = parts.len() - 1;
                let initial = match parts[0] {
                    "" => None,
                    p => Some(self.unescape(p)?),
                };
                let final_ = match parts[last] {
                    "" => None,
                    p => Some(self.unescape(p)?),
                };
                let any = parts[1..last]
                    .iter()
                    .filter(|p| !p.is_empty())
                    .map(|p| self.unescape(p))
                    .collect::<ProtocolResult<Vec<_>>>()?;
                Ok(Filter::Substring {
                    attr,
                    initial,
                    any,
                    final_,
                })
            }
            _ => Ok(Filter::Equality {
                attr,
                value: self.unescape(raw)?,
            }),
        }
    }

    /// Decodes `\XX` hex escapes.
    fn unescape(&self, raw: &str) -> ProtocolResult<String> {
        let bytes = raw.as_bytes();
        let mut out = Vec::with_capacity(bytes.len());
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'\\' {
                let hex = raw
                    .get(i + 1..i + 3)
                    .ok_or_else(|| self.error("truncated escape"))?;
                let byte =
                    u8::from_str_radix(hex, 16).map_err(|_| self.error("invalid escape"))?;
                out.push(byte);
                i += 3;
            } else {
                out.push(bytes[i]);
                i += 1;
            }
        }
        String::from_utf8(out).map_err(|_| self.error("escape produced invalid UTF-8"))
    }
}

fn escape(value: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for c in value.chars() {
        match c {
            '*' => f.write_str("\\2a")?,
            '(' => f.write_str("\\28")?,
            ')' => f.write_str("\\29")?,
            '\\' => f.write_str("\\5c")?,
            '\0' => f.write_str("\\00")?,
            c => write!(f, "{c}")?,
        }
    }
    Ok(())
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(components) | Filter::Or(components) => {
                f.write_str(if matches!(self, Filter::And(_)) { "(&" } else { "(|" })?;
                for c in components {
                    write!(f, "{c}")?;
                }
                f.write_str(")")
            }
            Filter::Not(inner) => write!(f, "(!{inner})"),
            Filter::Equality { attr, value } => {
                write!(f, "({attr}=")?;
                escape(value, f)?;
                f.write_str(")")
            }
            Filter::GreaterOrEqual { attr, value } => {
                write!(f, "({attr}>=")?;
                escape(value, f)?;
                f.write_str(")")
            }
            Filter::LessOrEqual { attr, value } => {
                write!(f, "({attr}<=")?;
                escape(value, f)?;
                f.write_str(")")
            }
            Filter::Present { attr } => write!(f, "({attr}=*)"),
            Filter::Substring {
                attr,
                initial,
                any,
                final_,
            } => {
                write!(f, "({attr}=")?;
                if let Some(initial) = initial {
                    escape(initial, f)?;
                }
                f.write_str("*")?;
                for fragment in any {
                    escape(fragment, f)?;
                    f.write_str("*")?;
                }
                if let Some(final_) = final_ {
                    escape(final_, f)?;
                }
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dn::Dn;

    fn entry() -> Entry {
        let mut e = Entry::new(
            Dn::parse("changeNumber=12,cn=changelog").unwrap(),
            ["top", "changeLogEntry"],
        );
        e.put("changeNumber", "12");
        e.put("targetDN", "uid=Bob,o=test");
        e
    }

    #[test]
    fn parse_nested() {
        let f = Filter::parse("(&(changenumber>=2)(|(dc=y)(dc=x))(!(cn=z)))").unwrap();
        match f {
            Filter::And(ref parts) => assert_eq!(parts.len(), 3),
            _ => panic!("expected AND"),
        }
        assert_eq!(f.to_string(), "(&(changenumber>=2)(|(dc=y)(dc=x))(!(cn=z)))");
    }

    #[test]
    fn bare_item_is_accepted() {
        assert_eq!(
            Filter::parse("changeNumber=5").unwrap(),
            Filter::equality("changeNumber", "5")
        );
    }

    #[test]
    fn change_numbers_compare_numerically() {
        let e = entry();
        assert!(Filter::parse("(changeNumber>=9)").unwrap().matches(&e));
        assert!(!Filter::parse("(changeNumber<=9)").unwrap().matches(&e));
        assert!(Filter::parse("(changeNumber=12)").unwrap().matches(&e));
    }

    #[test]
    fn substring_and_presence() {
        let e = entry();
        assert!(Filter::parse("(targetdn=*bob*,o=test)").unwrap().matches(&e));
        assert!(!Filter::parse("(targetdn=*alice*)").unwrap().matches(&e));
        assert!(Filter::parse("(objectclass=*)").unwrap().matches(&e));
        assert!(Filter::parse("(objectClass=changelogentry)").unwrap().matches(&e));
        assert!(!Filter::parse("(changes=*)").unwrap().matches(&e));
    }

    #[test]
    fn escapes_roundtrip() {
        let f = Filter::parse("(cn=a\\2ab\\29)").unwrap();
        assert_eq!(f, Filter::equality("cn", "a*b)"));
        assert_eq!(f.to_string(), "(cn=a\\2ab\\29)");
    }

    #[test]
    fn malformed_filters() {
        assert!(Filter::parse("(&)").is_err());
        assert!(Filter::parse("(cn=a").is_err());
        assert!(Filter::parse("(noop)").is_err());
        assert!(Filter::parse("(cn=a))").is_err());
    }
}

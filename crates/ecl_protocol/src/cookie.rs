//! Changelog cookies.
//!
//! A cookie records, for each replication domain, the newest CSN a client
//! has consumed. Cookie-mode searches resume right after that position.
//!
//! The string form is `<domain-dn>:<csn>` entries joined by `;`, ordered by
//! domain DN, e.g. `o=a:0000014...;o=b:0000014...`. It is canonical: two
//! cookies are equal exactly when their strings are equal.

use crate::csn::Csn;
use crate::dn::{split_unescaped, Dn};
use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Per-domain high-water marks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cookie {
    domains: BTreeMap<Dn, Csn>,
}

impl Cookie {
    /// Creates an empty cookie.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the string form. The empty string is the empty cookie.
    pub fn parse(s: &str) -> ProtocolResult<Self> {
        s.parse()
    }

    /// Returns true if no domain has been consumed yet.
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Number of domains in the cookie.
    pub fn len(&self) -> usize {
        self.domains.len()
    }

    /// Returns the CSN recorded for `domain`.
    pub fn get(&self, domain: &Dn) -> Option<Csn> {
        self.domains.get(domain).copied()
    }

    /// Returns true if `domain` appears in the cookie.
    pub fn contains(&self, domain: &Dn) -> bool {
        self.domains.contains_key(domain)
    }

    /// Iterates `(domain, csn)` pairs in domain order.
    pub fn iter(&self) -> impl Iterator<Item = (&Dn, Csn)> {
        self.domains.iter().map(|(dn, csn)| (dn, *csn))
    }

    /// Domains present in the cookie.
    pub fn domains(&self) -> impl Iterator<Item = &Dn> {
        self.domains.keys()
    }

    /// Records `csn` for `domain` unless the cookie already holds a newer one.
    ///
    /// Returns true if the cookie changed. A CSN not newer than the stored
    /// one is a no-op, so the per-domain position never regresses.
    pub fn update(&mut self, domain: &Dn, csn: Csn) -> bool {
        match self.domains.get_mut(domain) {
            Some(current) if *current >= csn => false,
            Some(current) => {
                *current = csn;
                true
            }
            None => {
                self.domains.insert(domain.clone(), csn);
                true
            }
        }
    }

    /// Applies [`Cookie::update`] for every entry of `other`.
    pub fn update_from(&mut self, other: &Cookie) {
        for (domain, csn) in other.iter() {
            self.update(domain, csn);
        }
    }

    /// Drops `domain` from the cookie.
    pub fn remove(&mut self, domain: &Dn) -> Option<Csn> {
        self.domains.remove(domain)
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (domain, csn)) in self.domains.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{domain}:{csn}")?;
        }
        Ok(())
    }
}

impl FromStr for Cookie {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        let mut cookie = Cookie::new();
        // domain values may contain an escaped ';'
        for part in split_unescaped(s, ';')
            .into_iter()
            .map(str::trim)
            .filter(|p| !p.is_empty())
        {
            // CSNs never contain ':', so the last one separates domain and CSN.
            let (domain, csn) = part
                .rsplit_once(':')
                .ok_or_else(|| ProtocolError::invalid_cookie(s, format!("'{part}' has no ':'")))?;
            let domain: Dn = domain
                .parse()
                .map_err(|e: ProtocolError| ProtocolError::invalid_cookie(s, e.to_string()))?;
            if domain.is_root_dse() {
                return Err(ProtocolError::invalid_cookie(s, "empty domain"));
            }
            let csn: Csn = csn
                .trim()
                .parse()
                .map_err(|e: ProtocolError| ProtocolError::invalid_cookie(s, e.to_string()))?;
            cookie.update(&domain, csn);
        }
        Ok(cookie)
    }
}

impl Serialize for Cookie {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Cookie {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

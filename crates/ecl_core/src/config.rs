//! Changelog configuration.

use ecl_protocol::Dn;
use std::collections::BTreeSet;

/// Configuration of the changelog backend.
#[derive(Debug, Clone)]
pub struct ChangelogConfig {
    /// Domains whose changes are never exposed through the changelog.
    pub excluded_domains: BTreeSet<Dn>,

    /// Value of `subschemaSubentry` on synthesized entries.
    pub schema_dn: Dn,

    /// Whether searches require the changelog-read privilege.
    pub check_privilege: bool,

    /// Size limit applied when a request carries none.
    pub default_size_limit: Option<usize>,
}

impl Default for ChangelogConfig {
    fn default() -> Self {
        Self {
            excluded_domains: BTreeSet::new(),
            schema_dn: Dn::from_rdns(vec![ecl_protocol::Rdn::new("cn", "schema")]),
            check_privilege: true,
            default_size_limit: None,
        }
    }
}

impl ChangelogConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hides a domain from the changelog.
    #[must_use]
    pub fn exclude_domain(mut self, domain: Dn) -> Self {
        self.excluded_domains.insert(domain);
        self
    }

    /// Sets the schema DN.
    #[must_use]
    pub fn schema_dn(mut self, dn: Dn) -> Self {
        self.schema_dn = dn;
        self
    }

    /// Sets whether the changelog-read privilege is enforced.
    #[must_use]
    pub const fn check_privilege(mut self, value: bool) -> Self {
        self.check_privilege = value;
        self
    }

    /// Sets the default size limit.
    #[must_use]
    pub const fn default_size_limit(mut self, limit: Option<usize>) -> Self {
        self.default_size_limit = limit;
        self
    }

    /// Returns true if `domain` is excluded.
    pub fn is_excluded(&self, domain: &Dn) -> bool {
        self.excluded_domains.contains(domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ChangelogConfig::default();
        assert!(config.check_privilege);
        assert!(config.excluded_domains.is_empty());
        assert_eq!(config.schema_dn.to_string(), "cn=schema");
        assert_eq!(config.default_size_limit, None);
    }

    #[test]
    fn builder_pattern() {
        let admin = Dn::parse("cn=admin data").unwrap();
        let config = ChangelogConfig::new()
            .exclude_domain(admin.clone())
            .check_privilege(false)
            .default_size_limit(Some(100));

        assert!(config.is_excluded(&admin));
        assert!(!config.is_excluded(&Dn::parse("o=test").unwrap()));
        assert!(!config.check_privilege);
        assert_eq!(config.default_size_limit, Some(100));
    }
}

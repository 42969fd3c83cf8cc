//! Search command implementation.

use super::open_backend;
use clap::ValueEnum;
use ecl_core::{CollectingListener, SearchOperation, SearchRequest};
use ecl_protocol::{ldif, Control, Cookie, Dn, Entry, Filter, SearchScope};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Search scope as given on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scope {
    /// Only the base entry.
    Base,
    /// Immediate children of the base.
    One,
    /// The base and everything below it.
    Sub,
    /// Everything below the base.
    Subordinates,
}

impl From<Scope> for SearchScope {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::Base => SearchScope::BaseObject,
            Scope::One => SearchScope::SingleLevel,
            Scope::Sub => SearchScope::WholeSubtree,
            Scope::Subordinates => SearchScope::Subordinates,
        }
    }
}

/// Output format of returned entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// LDIF content records.
    Ldif,
    /// A JSON document.
    Json,
}

/// Options of one search.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Search base DN.
    pub base: String,
    /// Search scope.
    pub scope: Scope,
    /// LDAP filter.
    pub filter: String,
    /// Cookie to resume from; selects cookie mode.
    pub cookie: Option<String>,
    /// Maximum number of entries to return.
    pub size_limit: Option<usize>,
    /// Domains hidden from the changelog.
    pub exclude: Vec<String>,
    /// Output format.
    pub format: OutputFormat,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            base: "cn=changelog".to_string(),
            scope: Scope::Sub,
            filter: "(objectclass=*)".to_string(),
            cookie: None,
            size_limit: None,
            exclude: Vec::new(),
            format: OutputFormat::Ldif,
        }
    }
}

/// Search result as printed with `--format json`.
#[derive(Debug, Serialize)]
pub struct SearchOutput {
    /// Returned entries, in delivery order.
    pub entries: Vec<OutputEntry>,
    /// Whether the size limit cut the search short.
    pub size_limit_exceeded: bool,
}

/// A returned entry with the cookie attached to it.
#[derive(Debug, Serialize)]
pub struct OutputEntry {
    /// The entry.
    #[serde(flatten)]
    pub entry: Entry,
    /// Cookie to resume after this entry (cookie mode only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookie: Option<String>,
}

/// Runs the search command and returns what to print.
pub fn run(input: &Path, options: &SearchOptions) -> Result<String, Box<dyn std::error::Error>> {
    let backend = open_backend(input, &options.exclude)?;

    let mut request = SearchRequest::new(
        Dn::parse(&options.base)?,
        options.scope.into(),
        Filter::parse(&options.filter)?,
    );
    if let Some(cookie) = &options.cookie {
        request = request.with_cookie(Cookie::parse(cookie)?);
    }
    if let Some(limit) = options.size_limit {
        request = request.with_size_limit(limit);
    }

    let listener = Arc::new(CollectingListener::new());
    let op = Arc::new(SearchOperation::new(request, listener.clone()));
    backend.search(Arc::clone(&op))?;

    let output = SearchOutput {
        entries: listener
            .entries_with_controls()
            .into_iter()
            .map(|(entry, controls)| OutputEntry {
                cookie: controls
                    .iter()
                    .find_map(Control::notification_cookie)
                    .map(str::to_string),
                entry,
            })
            .collect(),
        size_limit_exceeded: op.size_limit_exceeded(),
    };
    info!(entries = output.entries.len(), "search complete");

    match options.format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&output)?),
        OutputFormat::Ldif => Ok(to_ldif(&output)),
    }
}

fn to_ldif(output: &SearchOutput) -> String {
    let mut text = String::new();
    for returned in &output.entries {
        if let Some(cookie) = &returned.cookie {
            text.push_str(&format!("# cookie: {cookie}\n"));
        }
        text.push_str(&ldif::entry_to_ldif(&returned.entry));
    }
    if output.size_limit_exceeded {
        text.push_str("# size limit exceeded\n");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dump::tests::{dump_file, record};

    fn sample() -> tempfile::NamedTempFile {
        dump_file(&[
            record("o=a", 1, 1, true),
            record("o=b", 2, 2, true),
            record("o=a", 3, 1, true),
        ])
    }

    #[test]
    fn change_number_search_as_ldif() {
        let file = sample();

        let text = run(file.path(), &SearchOptions::default()).unwrap();

        assert!(text.starts_with("dn: cn=changelog\n"));
        assert!(text.contains("dn: changeNumber=1,cn=changelog\n"));
        assert!(text.contains("dn: changeNumber=3,cn=changelog\n"));
        assert!(!text.contains("# cookie:"));
    }

    #[test]
    fn cookie_search_as_json() {
        let file = sample();
        let options = SearchOptions {
            cookie: Some(String::new()),
            format: OutputFormat::Json,
            ..SearchOptions::default()
        };

        let text = run(file.path(), &options).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        let entries = value["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 4);
        assert!(entries[0].get("cookie").is_none());
        assert_eq!(
            entries[3]["cookie"],
            format!("o=a:{};o=b:{}", ecl_protocol::Csn::new(3, 0, 1), ecl_protocol::Csn::new(2, 0, 2))
        );
        assert_eq!(value["size_limit_exceeded"], false);
    }

    #[test]
    fn size_limit_is_reported() {
        let file = sample();
        let options = SearchOptions {
            size_limit: Some(2),
            ..SearchOptions::default()
        };

        let text = run(file.path(), &options).unwrap();

        assert!(text.ends_with("# size limit exceeded\n"));
        assert!(!text.contains("changeNumber=2,"));
    }

    #[test]
    fn filter_and_scope_are_applied() {
        let file = sample();
        let options = SearchOptions {
            base: "changeNumber=2,cn=changelog".to_string(),
            scope: Scope::Base,
            ..SearchOptions::default()
        };

        let text = run(file.path(), &options).unwrap();

        assert_eq!(text.matches("dn: ").count(), 1);
        assert!(text.contains("targetDN: uid=user2,o=b\n"));
    }

    #[test]
    fn invalid_filter_is_an_error() {
        let file = sample();
        let options = SearchOptions {
            filter: "(changeNumber>=".to_string(),
            ..SearchOptions::default()
        };

        assert!(run(file.path(), &options).is_err());
    }
}

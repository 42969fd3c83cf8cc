//! CLI command implementations.

pub mod cookie;
pub mod info;
pub mod search;

use crate::dump;
use ecl_core::{ChangelogBackend, ChangelogConfig};
use ecl_protocol::Dn;
use std::path::Path;
use std::sync::Arc;

/// Loads `input` and opens the changelog over it, hiding `exclude`.
pub(crate) fn open_backend(
    input: &Path,
    exclude: &[String],
) -> Result<Arc<ChangelogBackend>, Box<dyn std::error::Error>> {
    let db = dump::load(input)?;
    let mut config = ChangelogConfig::default();
    for domain in exclude {
        config = config.exclude_domain(Dn::parse(domain)?);
    }
    Ok(ChangelogBackend::new(config, db))
}

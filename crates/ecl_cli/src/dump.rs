//! Loading a changelog from a JSON dump.
//!
//! A dump is a JSON array of records:
//!
//! ```json
//! [{ "domain": "o=example", "message": { ... }, "indexed": true }]
//! ```
//!
//! Records are replayed in file order: each message is published to the
//! replica log of its domain and, when `indexed`, assigned a change number.

use ecl_core::{ChangelogDb, ChangelogError};
use ecl_protocol::{Dn, UpdateMsg};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised while loading a dump.
#[derive(Debug, Error)]
pub enum DumpError {
    /// The dump file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// Path of the dump.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The dump is not a valid JSON array of records.
    #[error("invalid dump {path}: {source}")]
    Json {
        /// Path of the dump.
        path: String,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// A record was refused by the changelog.
    #[error("record {index} ({domain}): {source}")]
    Record {
        /// Position of the record in the dump.
        index: usize,
        /// Domain of the record.
        domain: Dn,
        /// Underlying error.
        source: ChangelogError,
    },
}

/// One change of a dump.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpRecord {
    /// Replication domain of the change.
    pub domain: Dn,
    /// The change.
    pub message: UpdateMsg,
    /// Whether the change has a change number.
    #[serde(default = "indexed_by_default")]
    pub indexed: bool,
}

fn indexed_by_default() -> bool {
    true
}

/// Parses `path` and replays its records into a new changelog.
pub fn load(path: &Path) -> Result<Arc<ChangelogDb>, DumpError> {
    let dump_path = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|source| DumpError::Io {
        path: dump_path.clone(),
        source,
    })?;
    let records: Vec<DumpRecord> =
        serde_json::from_str(&text).map_err(|source| DumpError::Json {
            path: dump_path.clone(),
            source,
        })?;

    let db = Arc::new(ChangelogDb::new());
    replay(&db, &records)?;
    info!(path = %dump_path, records = records.len(), "loaded changelog dump");
    Ok(db)
}

/// Publishes, and indexes when asked, every record in order.
pub fn replay(db: &ChangelogDb, records: &[DumpRecord]) -> Result<(), DumpError> {
    for (index, record) in records.iter().enumerate() {
        let stored = if record.indexed {
            db.publish_and_index(&record.domain, &record.message)
                .map(Some)
        } else {
            db.publish(&record.domain, &record.message).map(|()| None)
        };
        let change_number = stored.map_err(|source| DumpError::Record {
            index,
            domain: record.domain.clone(),
            source,
        })?;
        debug!(index, domain = %record.domain, csn = %record.message.csn(), ?change_number, "replayed record");
    }
    Ok(())
}

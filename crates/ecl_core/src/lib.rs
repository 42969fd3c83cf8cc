//! # ECL Core
//!
//! The external changelog engine: a read-only `cn=changelog` view over a
//! replicated change log.
//!
//! This crate provides:
//! - In-memory replica logs and change-number index with live cursors
//! - `ChangelogDb`, the write path that stores and announces changes
//! - `ChangelogBackend`, which answers cookie-mode and change-number
//!   searches and feeds persistent searches
//! - Search operations and the listener entries are returned through
//!
//! # Example
//!
//! ```rust,ignore
//! use ecl_core::{ChangelogBackend, ChangelogConfig, ChangelogDb, CollectingListener,
//!     SearchOperation, SearchRequest};
//! use ecl_protocol::{Cookie, Dn, Filter, SearchScope};
//! use std::sync::Arc;
//!
//! let db = Arc::new(ChangelogDb::new());
//! let backend = ChangelogBackend::new(ChangelogConfig::default(), Arc::clone(&db));
//!
//! let request = SearchRequest::new(Dn::parse("cn=changelog")?, SearchScope::WholeSubtree,
//!     Filter::match_all()).with_cookie(Cookie::new());
//! let listener = Arc::new(CollectingListener::new());
//! backend.search(Arc::new(SearchOperation::new(request, listener.clone())))?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod backend;
mod changelog_db;
mod config;
mod error;
mod search;
pub mod store;

pub use backend::{
    base_entry, change_entry, change_entry_dn, change_time, changelog_root, optimize_search,
    ChangelogBackend, EntrySender, SearchParams, SearchPhase,
};
pub use changelog_db::{ChangelogDb, ChangelogListener};
pub use config::ChangelogConfig;
pub use error::{ChangelogError, ChangelogResult, ResultCode};
pub use search::{CollectingListener, EntryListener, OperationId, SearchOperation, SearchRequest};

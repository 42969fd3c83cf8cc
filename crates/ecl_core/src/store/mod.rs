//! In-memory changelog stores.
//!
//! Two stores back the changelog:
//! - [`ReplicaDb`]: one CSN-ordered log of update messages per domain
//! - [`ChangeNumberIndexDb`]: the global change-number index
//!
//! Both hand out live cursors: once a cursor is exhausted, a later call to
//! [`DbCursor::next`] observes records written after the cursor was opened.

mod cn_index_db;
mod replica_db;

pub use cn_index_db::{ChangeNumberIndexCursor, ChangeNumberIndexDb};
pub use replica_db::{MultiDomainCursor, ReplicaDb, ReplicaUpdate};

use crate::error::ChangelogResult;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A forward-only cursor over a store.
///
/// A fresh cursor has no current record; call [`DbCursor::next`] first.
/// Dropping the cursor releases it.
pub trait DbCursor {
    /// Record type.
    type Record;

    /// Moves to the next record. Returns false when no record is available
    /// right now; the cursor stays usable and may return true later.
    fn next(&mut self) -> ChangelogResult<bool>;

    /// The current record, `None` before the first successful `next` and
    /// after an unsuccessful one.
    fn record(&self) -> Option<&Self::Record>;
}

/// Where a cursor opened from a key starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionStrategy {
    /// The first record is the one matching the key.
    OnMatchingKey,
    /// The first record is the one following the key.
    AfterMatchingKey,
}

/// Counts open cursors of a store; decrements on drop.
#[derive(Debug)]
struct CursorGuard(Arc<AtomicUsize>);

impl CursorGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for CursorGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

//! The global change-number index.

use super::{CursorGuard, DbCursor};
use crate::error::ChangelogResult;
use ecl_protocol::{ChangeNumberIndexRecord, Csn, Dn};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Maps change numbers to the (domain, CSN) of the change they stand for.
///
/// Change numbers are assigned from 1 in strictly increasing order and are
/// never reused, even after a purge or a clear.
#[derive(Debug)]
pub struct ChangeNumberIndexDb {
    records: RwLock<BTreeMap<u64, ChangeNumberIndexRecord>>,
    next_change_number: Mutex<u64>,
    open_cursors: Arc<AtomicUsize>,
}

impl Default for ChangeNumberIndexDb {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeNumberIndexDb {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            next_change_number: Mutex::new(1),
            open_cursors: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Indexes a change and returns its change number.
    pub fn add_record(&self, domain: &Dn, csn: Csn, previous_cookie: impl Into<String>) -> u64 {
        let mut next = self.next_change_number.lock();
        let change_number = *next;
        *next += 1;
        let record = ChangeNumberIndexRecord::new(change_number, domain.clone(), csn, previous_cookie);
        self.records.write().insert(change_number, record);
        change_number
    }

    /// The record with the lowest change number.
    pub fn oldest_record(&self) -> Option<ChangeNumberIndexRecord> {
        self.records.read().values().next().cloned()
    }

    /// The record with the highest change number.
    pub fn newest_record(&self) -> Option<ChangeNumberIndexRecord> {
        self.records.read().values().next_back().cloned()
    }

    /// Looks up one record.
    pub fn get(&self, change_number: u64) -> Option<ChangeNumberIndexRecord> {
        self.records.read().get(&change_number).cloned()
    }

    /// Removes every record with a change number lower than `change_number`.
    pub fn purge_up_to(&self, change_number: u64) -> usize {
        let mut records = self.records.write();
        let kept = records.split_off(&change_number);
        let removed = records.len();
        *records = kept;
        removed
    }

    /// Removes every record. Numbering continues where it was.
    pub fn clear(&self) {
        self.records.write().clear();
    }

    /// Number of retained records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if no record is retained.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Number of cursors currently open on this index.
    pub fn open_cursor_count(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    /// Opens a cursor whose first record is the first one numbered
    /// `change_number` or above.
    pub fn cursor_from(self: &Arc<Self>, change_number: u64) -> ChangeNumberIndexCursor {
        ChangeNumberIndexCursor {
            db: Arc::clone(self),
            lower: Bound::Included(change_number),
            current: None,
            _guard: CursorGuard::new(&self.open_cursors),
        }
    }
}

/// Cursor over the change-number index in increasing change-number order.
#[derive(Debug)]
pub struct ChangeNumberIndexCursor {
    db: Arc<ChangeNumberIndexDb>,
    lower: Bound<u64>,
    current: Option<ChangeNumberIndexRecord>,
    _guard: CursorGuard,
}

impl DbCursor for ChangeNumberIndexCursor {
    type Record = ChangeNumberIndexRecord;

    fn next(&mut self) -> ChangelogResult<bool> {
        let next = self
            .db
            .records
            .read()
            .range((self.lower, Bound::Unbounded))
            .next()
            .map(|(_, record)| record.clone());
        match next {
            Some(record) => {
                self.lower = Bound::Excluded(record.change_number);
                self.current = Some(record);
                Ok(true)
            }
            None => {
                self.current = None;
                Ok(false)
            }
        }
    }

    fn record(&self) -> Option<&ChangeNumberIndexRecord> {
        self.current.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(n: u64) -> Arc<ChangeNumberIndexDb> {
        let db = Arc::new(ChangeNumberIndexDb::new());
        let domain = Dn::parse("o=test").unwrap();
        for i in 1..=n {
            db.add_record(&domain, Csn::new(i, 0, 1), "");
        }
        db
    }

    fn drain(cursor: &mut ChangeNumberIndexCursor) -> Vec<u64> {
        let mut out = Vec::new();
        while cursor.next().unwrap() {
            out.push(cursor.record().unwrap().change_number);
        }
        out
    }

    #[test]
    fn numbers_start_at_one_and_increase() {
        let db = index_with(3);
        assert_eq!(db.oldest_record().unwrap().change_number, 1);
        assert_eq!(db.newest_record().unwrap().change_number, 3);
        assert_eq!(db.get(2).unwrap().csn, Csn::new(2, 0, 1));
    }

    #[test]
    fn cursor_from_positions_on_or_after() {
        let db = index_with(5);
        assert_eq!(drain(&mut db.cursor_from(3)), vec![3, 4, 5]);
        assert_eq!(drain(&mut db.cursor_from(0)), vec![1, 2, 3, 4, 5]);
        assert!(drain(&mut db.cursor_from(9)).is_empty());

        db.purge_up_to(3);
        assert_eq!(drain(&mut db.cursor_from(1)), vec![3, 4, 5]);
    }

    #[test]
    fn cursor_is_live() {
        let db = index_with(2);
        let mut cursor = db.cursor_from(1);
        assert_eq!(drain(&mut cursor), vec![1, 2]);
        db.add_record(&Dn::parse("o=test").unwrap(), Csn::new(10, 0, 1), "");
        assert_eq!(drain(&mut cursor), vec![3]);
    }

    #[test]
    fn clear_keeps_numbering() {
        let db = index_with(2);
        db.clear();
        assert!(db.is_empty());
        assert!(db.oldest_record().is_none());
        let n = db.add_record(&Dn::parse("o=test").unwrap(), Csn::new(10, 0, 1), "");
        assert_eq!(n, 3);
    }

    #[test]
    fn cursors_are_counted() {
        let db = index_with(1);
        let c1 = db.cursor_from(1);
        let c2 = db.cursor_from(1);
        assert_eq!(db.open_cursor_count(), 2);
        drop(c1);
        drop(c2);
        assert_eq!(db.open_cursor_count(), 0);
    }
}

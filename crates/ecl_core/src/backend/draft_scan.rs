//! Change-number (draft) mode scan.
//!
//! The change-number index gives the order; the content of each change is
//! read from the replica logs. Both are walked forward together by the
//! [`Correlator`].

use super::entry_sender::{EntrySender, RetainedCursors};
use super::optimizer::SearchParams;
use crate::error::{ChangelogError, ChangelogResult};
use crate::store::{
    ChangeNumberIndexDb, DbCursor, MultiDomainCursor, PositionStrategy, ReplicaDb, ReplicaUpdate,
};
use ecl_protocol::{ChangeNumberIndexRecord, Cookie, Dn};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error};

/// Finds, for each index record, the replica change it stands for.
///
/// Index records must be presented in increasing change-number order. The
/// replica cursor is opened on the first record presented.
pub(crate) struct Correlator {
    replica_db: Arc<ReplicaDb>,
    excluded: BTreeSet<Dn>,
    cursor: Option<MultiDomainCursor>,
}

impl Correlator {
    pub(crate) fn new(replica_db: Arc<ReplicaDb>, excluded: BTreeSet<Dn>) -> Self {
        Self {
            replica_db,
            excluded,
            cursor: None,
        }
    }

    /// Returns the change of `record`, or `None` when it is no longer in the
    /// replica logs.
    pub(crate) fn find_update(
        &mut self,
        record: &ChangeNumberIndexRecord,
    ) -> ChangelogResult<Option<ReplicaUpdate>> {
        let (replica_db, excluded) = (&self.replica_db, &self.excluded);
        let cursor = self.cursor.get_or_insert_with(|| {
            let mut start = Cookie::new();
            start.update(&record.domain, record.csn);
            replica_db.cursor_from(&start, PositionStrategy::OnMatchingKey, excluded)
        });
        if cursor.record().is_none() && !cursor.next()? {
            return Err(Self::violation(record));
        }

        loop {
            let ordering = match cursor.record() {
                Some(update) => (update.msg.csn(), &update.domain).cmp(&(record.csn, &record.domain)),
                None => return Err(Self::violation(record)),
            };
            match ordering {
                Ordering::Greater => {
                    debug!(
                        change_number = record.change_number,
                        csn = %record.csn,
                        domain = %record.domain,
                        "change no longer in the replica log"
                    );
                    return Ok(None);
                }
                Ordering::Equal => {
                    let found = cursor.record().cloned();
                    cursor.next()?;
                    return Ok(found);
                }
                Ordering::Less => {
                    if !cursor.next()? {
                        return Err(Self::violation(record));
                    }
                }
            }
        }
    }

    fn violation(record: &ChangeNumberIndexRecord) -> ChangelogError {
        error!(
            change_number = record.change_number,
            csn = %record.csn,
            domain = %record.domain,
            "replica log exhausted before indexed change"
        );
        ChangelogError::consistency_violation(format!(
            "change number {} references {} in {} which the replica log cannot produce",
            record.change_number, record.csn, record.domain
        ))
    }
}

/// Sends the indexed changes selected by `params` through `sender`.
pub(crate) fn search_change_number_mode(
    replica_db: &Arc<ReplicaDb>,
    cn_index_db: &Arc<ChangeNumberIndexDb>,
    excluded: &BTreeSet<Dn>,
    sender: &EntrySender,
    params: &SearchParams,
    has_changes: bool,
    persistent: bool,
) -> ChangelogResult<()> {
    let op = sender.operation();
    let start = params
        .lowest_change_number
        .filter(|n| *n > 1)
        .or_else(|| cn_index_db.oldest_record().map(|r| r.change_number))
        .unwrap_or(0);
    debug!(op = op.id().0, start, ?params, persistent, "starting change-number scan");

    let mut index = cn_index_db.cursor_from(start);
    let mut correlator = Correlator::new(Arc::clone(replica_db), excluded.clone());
    if !sender.send_base_entry(has_changes) {
        return Ok(());
    }

    let mut transitioning = false;
    loop {
        if op.is_canceled() {
            return Err(ChangelogError::Canceled);
        }
        if !index.next()? {
            if persistent && !transitioning {
                sender.start_transition();
                transitioning = true;
                continue;
            }
            break;
        }
        let Some(record) = index.record().cloned() else {
            break;
        };
        if !params.change_number_in_range(record.change_number) {
            break;
        }
        sender.mark_scanned_change_number(record.change_number);
        if excluded.contains(&record.domain) || !params.csn_may_match(record.csn) {
            continue;
        }
        let Some(update) = correlator.find_update(&record)? else {
            continue;
        };
        let cookie = record.cookie_after()?.to_string();
        if !sender.send_change_number_entry(&record.domain, record.change_number, &cookie, &update.msg) {
            debug!(op = op.id().0, "change-number scan stopped by delivery");
            return Ok(());
        }
    }
    debug!(op = op.id().0, "change-number scan complete");

    if persistent {
        sender.retain_cursors(RetainedCursors::ChangeNumber { index, correlator });
    }
    Ok(())
}

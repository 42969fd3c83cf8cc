//! Cookie-mode scan: replays the replica logs from a client cookie.

use super::entry_sender::{EntrySender, RetainedCursors};
use super::optimizer::SearchParams;
use crate::error::{ChangelogError, ChangelogResult};
use crate::store::{DbCursor, PositionStrategy, ReplicaDb};
use ecl_protocol::{Cookie, Dn};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Sends every change after `cookie`, in CSN order, through `sender`.
///
/// A persistent search drains the cursor a second time once the sender is
/// transitioning, then keeps the cursor open.
pub(crate) fn search_cookie_mode(
    replica_db: &Arc<ReplicaDb>,
    excluded: &BTreeSet<Dn>,
    sender: &EntrySender,
    params: &SearchParams,
    cookie: &Cookie,
    has_changes: bool,
    persistent: bool,
) -> ChangelogResult<()> {
    let op = sender.operation();
    debug!(op = op.id().0, %cookie, persistent, "starting cookie-mode scan");

    let mut cursor = replica_db.cursor_from(cookie, PositionStrategy::AfterMatchingKey, excluded);
    if !sender.send_base_entry(has_changes) {
        return Ok(());
    }

    let mut transitioning = false;
    let mut sent = 0usize;
    loop {
        if op.is_canceled() {
            return Err(ChangelogError::Canceled);
        }
        if !cursor.next()? {
            if persistent && !transitioning {
                sender.start_transition();
                transitioning = true;
                continue;
            }
            break;
        }
        let Some(update) = cursor.record() else {
            break;
        };
        let csn = update.msg.csn();
        sender.mark_scanned_csn(&update.domain, csn);
        if !params.csn_may_match(csn) {
            continue;
        }
        sent += 1;
        if !sender.send_cookie_entry(&update.domain, &update.msg) {
            debug!(op = op.id().0, "cookie-mode scan stopped by delivery");
            return Ok(());
        }
    }
    debug!(op = op.id().0, changes = sent, "cookie-mode scan complete");

    if persistent {
        sender.retain_cursors(RetainedCursors::Cookie(cursor));
    }
    Ok(())
}

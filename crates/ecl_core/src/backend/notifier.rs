//! Fan-out of newly stored changes to persistent searches.

use super::entry_sender::EntrySender;
use crate::search::OperationId;
use ecl_protocol::{Dn, UpdateMsg};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Registered persistent searches, by mode.
#[derive(Debug, Default)]
pub(crate) struct PersistentSearches {
    cookie_searches: RwLock<BTreeMap<OperationId, Arc<EntrySender>>>,
    change_number_searches: RwLock<BTreeMap<OperationId, Arc<EntrySender>>>,
}

impl PersistentSearches {
    pub(crate) fn register(&self, sender: Arc<EntrySender>) {
        let searches = if sender.is_cookie_based() {
            &self.cookie_searches
        } else {
            &self.change_number_searches
        };
        debug!(op = sender.id().0, cookie = sender.is_cookie_based(), "registered persistent search");
        searches.write().insert(sender.id(), sender);
    }

    pub(crate) fn deregister(&self, id: OperationId) -> Option<Arc<EntrySender>> {
        let removed = self
            .cookie_searches
            .write()
            .remove(&id)
            .or_else(|| self.change_number_searches.write().remove(&id));
        if let Some(sender) = &removed {
            sender.release_cursors();
            debug!(op = id.0, "deregistered persistent search");
        }
        removed
    }

    pub(crate) fn get(&self, id: OperationId) -> Option<Arc<EntrySender>> {
        let cookie = self.cookie_searches.read().get(&id).cloned();
        cookie.or_else(|| self.change_number_searches.read().get(&id).cloned())
    }

    pub(crate) fn len(&self) -> usize {
        self.cookie_searches.read().len() + self.change_number_searches.read().len()
    }

    /// Delivers a change written to the replica log to cookie-mode searches.
    pub(crate) fn notify_cookie_searches(&self, domain: &Dn, msg: &UpdateMsg) {
        let csn = msg.csn();
        for sender in self.live(&self.cookie_searches) {
            if !sender.accepts_csn(domain, csn) {
                trace!(op = sender.id().0, %csn, "notification already covered by initial scan");
                continue;
            }
            sender.send_cookie_entry(domain, msg);
        }
    }

    /// Delivers an indexed change to change-number searches.
    pub(crate) fn notify_change_number_searches(
        &self,
        domain: &Dn,
        change_number: u64,
        cookie: &str,
        msg: &UpdateMsg,
    ) {
        for sender in self.live(&self.change_number_searches) {
            if !sender.accepts_change_number(change_number) {
                trace!(op = sender.id().0, change_number, "notification already covered by initial scan");
                continue;
            }
            sender.send_change_number_entry(domain, change_number, cookie, msg);
        }
    }

    /// Prunes canceled searches and snapshots the others, so that no
    /// registry lock is held while delivering.
    fn live(&self, searches: &RwLock<BTreeMap<OperationId, Arc<EntrySender>>>) -> Vec<Arc<EntrySender>> {
        let mut searches = searches.write();
        let canceled: Vec<OperationId> = searches
            .iter()
            .filter(|(_, sender)| sender.operation().is_canceled())
            .map(|(id, _)| *id)
            .collect();
        for id in canceled {
            if let Some(sender) = searches.remove(&id) {
                sender.release_cursors();
                debug!(op = id.0, "pruned canceled persistent search");
            }
        }
        searches.values().cloned().collect()
    }
}

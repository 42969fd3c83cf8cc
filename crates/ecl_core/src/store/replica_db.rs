//! Per-domain replica logs and the merged multi-domain cursor.

use super::{CursorGuard, DbCursor, PositionStrategy};
use crate::error::{ChangelogError, ChangelogResult};
use ecl_protocol::{Cookie, Csn, Dn, UpdateMsg};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// CSN-ordered log of encoded update messages for one domain.
#[derive(Debug, Default)]
struct DomainLog {
    records: RwLock<BTreeMap<Csn, Vec<u8>>>,
    newest_purged: RwLock<Option<Csn>>,
}

impl DomainLog {
    /// First record strictly inside `lower`.
    fn first_after(&self, lower: Bound<Csn>) -> Option<(Csn, Vec<u8>)> {
        self.records
            .read()
            .range((lower, Bound::Unbounded))
            .next()
            .map(|(csn, bytes)| (*csn, bytes.clone()))
    }
}

/// The replica update logs of every domain.
#[derive(Debug, Default)]
pub struct ReplicaDb {
    domains: RwLock<BTreeMap<Dn, Arc<DomainLog>>>,
    open_cursors: Arc<AtomicUsize>,
}

impl ReplicaDb {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `msg` to the log of `domain`, creating the domain if needed.
    pub fn publish(&self, domain: &Dn, msg: &UpdateMsg) -> ChangelogResult<()> {
        let bytes = msg.encode()?;
        let log = {
            let mut domains = self.domains.write();
            Arc::clone(domains.entry(domain.clone()).or_default())
        };
        let mut records = log.records.write();
        if records.contains_key(&msg.csn()) {
            return Err(ChangelogError::storage(format!(
                "duplicate CSN {} in domain {domain}",
                msg.csn()
            )));
        }
        records.insert(msg.csn(), bytes);
        Ok(())
    }

    /// Reads the message with `csn` from `domain`.
    pub fn get(&self, domain: &Dn, csn: Csn) -> ChangelogResult<Option<UpdateMsg>> {
        let Some(log) = self.log(domain) else {
            return Ok(None);
        };
        let bytes = log.records.read().get(&csn).cloned();
        match bytes {
            Some(bytes) => Ok(Some(UpdateMsg::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Removes every record of `domain` older than `csn`. Returns the number
    /// of records removed.
    pub fn purge_before(&self, domain: &Dn, csn: Csn) -> usize {
        let Some(log) = self.log(domain) else {
            return 0;
        };
        let mut records = log.records.write();
        let kept = records.split_off(&csn);
        let removed = records.len();
        if let Some(&last) = records.keys().next_back() {
            let mut newest_purged = log.newest_purged.write();
            *newest_purged = (*newest_purged).max(Some(last));
        }
        *records = kept;
        removed
    }

    /// Drops a domain and all its history.
    pub fn remove_domain(&self, domain: &Dn) -> bool {
        self.domains.write().remove(domain).is_some()
    }

    /// Domains with a log, in DN order.
    pub fn domains(&self) -> Vec<Dn> {
        self.domains.read().keys().cloned().collect()
    }

    /// Returns true if the store holds a log for `domain`.
    pub fn contains_domain(&self, domain: &Dn) -> bool {
        self.domains.read().contains_key(domain)
    }

    /// Oldest retained CSN of `domain`.
    pub fn oldest_csn(&self, domain: &Dn) -> Option<Csn> {
        self.log(domain)
            .and_then(|log| log.records.read().keys().next().copied())
    }

    /// Newest CSN of `domain` removed by [`purge_before`](Self::purge_before).
    ///
    /// A cookie older than this position cannot be resumed without losing
    /// changes.
    pub fn newest_purged_csn(&self, domain: &Dn) -> Option<Csn> {
        self.log(domain).and_then(|log| *log.newest_purged.read())
    }

    /// Newest retained CSN of `domain`.
    pub fn newest_csn(&self, domain: &Dn) -> Option<Csn> {
        self.log(domain)
            .and_then(|log| log.records.read().keys().next_back().copied())
    }

    /// Cookie made of the newest CSN of every domain not in `excluded`.
    pub fn newest_cookie(&self, excluded: &BTreeSet<Dn>) -> Cookie {
        let mut cookie = Cookie::new();
        for domain in self.domains() {
            if excluded.contains(&domain) {
                continue;
            }
            if let Some(csn) = self.newest_csn(&domain) {
                cookie.update(&domain, csn);
            }
        }
        cookie
    }

    /// Total number of retained records.
    pub fn len(&self) -> usize {
        self.domains
            .read()
            .values()
            .map(|log| log.records.read().len())
            .sum()
    }

    /// Returns true if no record is retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of cursors currently open on this store.
    pub fn open_cursor_count(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    /// Opens a cursor across all domains not in `excluded`.
    ///
    /// Domains present in `cookie` start at their cookie CSN as directed by
    /// `strategy`; other domains, including those created later, start at
    /// their oldest record.
    pub fn cursor_from(
        self: &Arc<Self>,
        cookie: &Cookie,
        strategy: PositionStrategy,
        excluded: &BTreeSet<Dn>,
    ) -> MultiDomainCursor {
        let mut cursor = MultiDomainCursor {
            db: Arc::clone(self),
            start: cookie.clone(),
            strategy,
            excluded: excluded.clone(),
            cursors: BTreeMap::new(),
            current: None,
            _guard: CursorGuard::new(&self.open_cursors),
        };
        cursor.refresh_domains();
        cursor
    }

    fn log(&self, domain: &Dn) -> Option<Arc<DomainLog>> {
        self.domains.read().get(domain).cloned()
    }
}

/// A change read from the replica logs, with the domain it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaUpdate {
    /// Domain of the change.
    pub domain: Dn,
    /// The change.
    pub msg: UpdateMsg,
}

#[derive(Debug)]
struct DomainCursor {
    log: Arc<DomainLog>,
    lower: Bound<Csn>,
}

/// Merges the logs of several domains into one stream in CSN order.
///
/// Each domain is read in strictly increasing CSN order.
#[derive(Debug)]
pub struct MultiDomainCursor {
    db: Arc<ReplicaDb>,
    start: Cookie,
    strategy: PositionStrategy,
    excluded: BTreeSet<Dn>,
    cursors: BTreeMap<Dn, DomainCursor>,
    current: Option<ReplicaUpdate>,
    _guard: CursorGuard,
}

impl MultiDomainCursor {
    /// Follows domains created or removed since the last call.
    fn refresh_domains(&mut self) {
        let domains = self.db.domains.read();
        self.cursors.retain(|dn, cursor| {
            domains
                .get(dn)
                .is_some_and(|log| Arc::ptr_eq(log, &cursor.log))
        });
        for (dn, log) in domains.iter() {
            if self.excluded.contains(dn) || self.cursors.contains_key(dn) {
                continue;
            }
            let lower = match (self.start.get(dn), self.strategy) {
                (Some(csn), PositionStrategy::OnMatchingKey) => Bound::Included(csn),
                (Some(csn), PositionStrategy::AfterMatchingKey) => Bound::Excluded(csn),
                (None, _) => Bound::Unbounded,
            };
            self.cursors.insert(
                dn.clone(),
                DomainCursor {
                    log: Arc::clone(log),
                    lower,
                },
            );
        }
    }
}

impl DbCursor for MultiDomainCursor {
    type Record = ReplicaUpdate;

    fn next(&mut self) -> ChangelogResult<bool> {
        self.refresh_domains();
        let mut best: Option<(&Dn, Csn, Vec<u8>)> = None;
        for (dn, cursor) in &self.cursors {
            if let Some((csn, bytes)) = cursor.log.first_after(cursor.lower) {
                if best.as_ref().map_or(true, |(_, b, _)| csn < *b) {
                    best = Some((dn, csn, bytes));
                }
            }
        }
        let Some((dn, csn, bytes)) = best else {
            self.current = None;
            return Ok(false);
        };
        let domain = dn.clone();
        let msg = UpdateMsg::decode(&bytes)?;
        if let Some(cursor) = self.cursors.get_mut(&domain) {
            cursor.lower = Bound::Excluded(csn);
        }
        self.current = Some(ReplicaUpdate { domain, msg });
        Ok(true)
    }

    fn record(&self) -> Option<&ReplicaUpdate> {
        self.current.as_ref()
    }
}

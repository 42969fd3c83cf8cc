//! The replication write path.
//!
//! Changes are first published to the replica log of their domain, then
//! indexed with a global change number. Each step notifies the registered
//! [`ChangelogListener`]s once the change is stored.

use crate::error::{ChangelogError, ChangelogResult};
use crate::store::{ChangeNumberIndexDb, ReplicaDb};
use ecl_protocol::{Cookie, Csn, Dn, UpdateMsg};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Observer of newly stored changes.
pub trait ChangelogListener: Send + Sync {
    /// Called once per stored change.
    ///
    /// `change_number` is 0 when the change was written to the replica log
    /// and greater than 0 once it has been indexed. `cookie` is the cookie
    /// valid right after the change.
    fn entry_added(
        &self,
        domain: &Dn,
        change_number: u64,
        cookie: &str,
        msg: &UpdateMsg,
    ) -> ChangelogResult<()>;
}

/// The replica log and the change-number index, kept in step.
pub struct ChangelogDb {
    replica_db: Arc<ReplicaDb>,
    cn_index_db: Arc<ChangeNumberIndexDb>,
    /// Cookie of everything indexed so far.
    indexed_cookie: Mutex<Cookie>,
    /// Serializes writers so listeners see changes in store order.
    write_lock: Mutex<()>,
    listeners: RwLock<Vec<Weak<dyn ChangelogListener>>>,
}

impl std::fmt::Debug for ChangelogDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangelogDb")
            .field("replica_records", &self.replica_db.len())
            .field("indexed_records", &self.cn_index_db.len())
            .field("listeners", &self.listeners.read().len())
            .finish_non_exhaustive()
    }
}

impl Default for ChangelogDb {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangelogDb {
    /// Creates empty stores.
    pub fn new() -> Self {
        Self {
            replica_db: Arc::new(ReplicaDb::new()),
            cn_index_db: Arc::new(ChangeNumberIndexDb::new()),
            indexed_cookie: Mutex::new(Cookie::new()),
            write_lock: Mutex::new(()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// The replica logs.
    pub fn replica_db(&self) -> &Arc<ReplicaDb> {
        &self.replica_db
    }

    /// The change-number index.
    pub fn cn_index_db(&self) -> &Arc<ChangeNumberIndexDb> {
        &self.cn_index_db
    }

    /// Registers a listener. Dropped listeners are forgotten on the next
    /// notification.
    pub fn register_listener(&self, listener: Weak<dyn ChangelogListener>) {
        self.listeners.write().push(listener);
    }

    /// Number of live listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .iter()
            .filter(|l| l.strong_count() > 0)
            .count()
    }

    /// Writes `msg` to the replica log of `domain` and notifies listeners
    /// with change number 0.
    pub fn publish(&self, domain: &Dn, msg: &UpdateMsg) -> ChangelogResult<()> {
        let _write = self.write_lock.lock();
        self.replica_db.publish(domain, msg)?;
        let cookie = self.replica_db.newest_cookie(&Default::default()).to_string();
        debug!(%domain, csn = %msg.csn(), "published change");
        self.notify(domain, 0, &cookie, msg);
        Ok(())
    }

    /// Assigns the next change number to the published change `csn` of
    /// `domain` and notifies listeners with it.
    pub fn index(&self, domain: &Dn, csn: Csn) -> ChangelogResult<u64> {
        let _write = self.write_lock.lock();
        let msg = self.replica_db.get(domain, csn)?.ok_or_else(|| {
            ChangelogError::NoSuchObject(format!("no change {csn} in domain {domain}"))
        })?;
        let (change_number, cookie) = {
            let mut indexed = self.indexed_cookie.lock();
            let previous = indexed.to_string();
            let change_number = self.cn_index_db.add_record(domain, csn, previous);
            indexed.update(domain, csn);
            (change_number, indexed.to_string())
        };
        debug!(%domain, %csn, change_number, "indexed change");
        self.notify(domain, change_number, &cookie, &msg);
        Ok(change_number)
    }

    /// [`publish`](Self::publish) then [`index`](Self::index).
    pub fn publish_and_index(&self, domain: &Dn, msg: &UpdateMsg) -> ChangelogResult<u64> {
        self.publish(domain, msg)?;
        self.index(domain, msg.csn())
    }

    /// The newest CSN of every domain.
    pub fn newest_cookie(&self) -> Cookie {
        self.replica_db.newest_cookie(&Default::default())
    }

    fn notify(&self, domain: &Dn, change_number: u64, cookie: &str, msg: &UpdateMsg) {
        let live: Vec<Arc<dyn ChangelogListener>> = {
            let mut listeners = self.listeners.write();
            listeners.retain(|l| l.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in live {
            if let Err(e) = listener.entry_added(domain, change_number, cookie, msg) {
                warn!(%domain, change_number, error = %e, "changelog listener failed");
            }
        }
    }
}

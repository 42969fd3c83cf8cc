//! The read-only `cn=changelog` backend.
//!
//! # Search modes
//!
//! - **Cookie mode**: the request carries a cookie exchange control. Changes
//!   are replayed from the replica logs after the cookie, and every entry
//!   carries the cookie to resume from.
//! - **Change-number mode**: changes are addressed by their global change
//!   number, read from the change-number index and correlated with the
//!   replica logs.
//!
//! Persistent searches are registered before their initial scan and then
//! fed by [`ChangelogListener::entry_added`].

mod cookie_scan;
mod draft_scan;
mod entry_sender;
mod notifier;
mod optimizer;
mod synthesizer;

pub use entry_sender::{EntrySender, SearchPhase};
pub use optimizer::{optimize_search, SearchParams};
pub use synthesizer::{base_entry, change_entry, change_entry_dn, change_time, changelog_root};

use crate::changelog_db::{ChangelogDb, ChangelogListener};
use crate::config::ChangelogConfig;
use crate::error::{ChangelogError, ChangelogResult};
use crate::search::{OperationId, SearchOperation};
use crate::store::{DbCursor, PositionStrategy};
use ecl_protocol::{Attribute, Cookie, Dn, Entry, SearchScope, UpdateMsg};
use notifier::PersistentSearches;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// The changelog backend.
///
/// Created with [`ChangelogBackend::new`], which registers it for change
/// notifications with the [`ChangelogDb`].
pub struct ChangelogBackend {
    config: ChangelogConfig,
    root: Dn,
    db: Arc<ChangelogDb>,
    persistent: PersistentSearches,
}

impl std::fmt::Debug for ChangelogBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangelogBackend")
            .field("root", &self.root)
            .field("config", &self.config)
            .field("persistent_searches", &self.persistent.len())
            .finish_non_exhaustive()
    }
}

impl ChangelogBackend {
    /// Creates the backend and registers it as a listener of `db`.
    pub fn new(config: ChangelogConfig, db: Arc<ChangelogDb>) -> Arc<Self> {
        let backend = Arc::new(Self {
            config,
            root: changelog_root(),
            db,
            persistent: PersistentSearches::default(),
        });
        let weak = Arc::downgrade(&backend);
        let listener: Weak<dyn ChangelogListener> = weak;
        backend.db.register_listener(listener);
        backend
    }

    /// The changelog root DN, `cn=changelog`.
    pub fn root(&self) -> &Dn {
        &self.root
    }

    /// The configuration.
    pub fn config(&self) -> &ChangelogConfig {
        &self.config
    }

    /// The stores behind the changelog.
    pub fn db(&self) -> &Arc<ChangelogDb> {
        &self.db
    }

    /// Runs a search and returns once its initial scan is over.
    ///
    /// A persistent search stays registered afterwards and keeps receiving
    /// changes until [`deregister_persistent_search`](Self::deregister_persistent_search)
    /// is called or the operation is canceled. A failed search is never left
    /// registered.
    pub fn search(&self, op: Arc<SearchOperation>) -> ChangelogResult<()> {
        if self.config.check_privilege && !op.has_changelog_read_privilege() {
            warn!(op = op.id().0, "changelog search without changelog-read privilege");
            return Err(ChangelogError::InsufficientAccess(
                "you do not have privileges to read the changelog".to_string(),
            ));
        }
        if !op.base().is_descendant_of(&self.root) {
            return Err(ChangelogError::NoSuchObject(format!(
                "{} is not part of the changelog",
                op.base()
            )));
        }
        let params = optimize_search(&self.root, op.base(), op.filter())?;
        if let Some(cookie) = op.request().cookie() {
            self.validate_cookie(cookie)?;
        }

        let persistent = op.request().persistent_search();
        let changes_only = persistent.is_some_and(|p| p.changes_only);
        let sender = match self.persistent.get(op.id()) {
            Some(sender) => sender,
            None if persistent.is_some() => {
                self.register_persistent_search(Arc::clone(&op), changes_only)
            }
            None => Arc::new(self.new_sender(Arc::clone(&op), false)),
        };
        if changes_only {
            return Ok(());
        }

        let cookie = sender.cookie();
        let result = self.initial_search(&sender, &params, cookie.as_ref(), persistent.is_some());
        if let Err(e) = &result {
            debug!(op = op.id().0, error = %e, "changelog search failed");
            if persistent.is_some() {
                self.persistent.deregister(op.id());
            }
        }
        result
    }

    fn initial_search(
        &self,
        sender: &Arc<EntrySender>,
        params: &SearchParams,
        cookie: Option<&Cookie>,
        persistent: bool,
    ) -> ChangelogResult<()> {
        let _finish = sender.initial_search_guard();
        let op = sender.operation();
        let has_changes = self.has_changes();
        if op.scope() == SearchScope::BaseObject && op.base() == &self.root {
            sender.send_base_entry(has_changes);
            return Ok(());
        }
        let excluded = &self.config.excluded_domains;
        match cookie {
            Some(cookie) => cookie_scan::search_cookie_mode(
                self.db.replica_db(),
                excluded,
                sender,
                params,
                cookie,
                has_changes,
                persistent,
            ),
            None => draft_scan::search_change_number_mode(
                self.db.replica_db(),
                self.db.cn_index_db(),
                excluded,
                sender,
                params,
                has_changes,
                persistent,
            ),
        }
    }

    /// Every domain of `cookie` must still have history, not be excluded,
    /// and not point before changes that were already purged.
    fn validate_cookie(&self, cookie: &Cookie) -> ChangelogResult<()> {
        let replica_db = self.db.replica_db();
        for (domain, csn) in cookie.iter() {
            let reason = if self.config.is_excluded(domain) {
                Some("domain is excluded from the changelog")
            } else if !replica_db.contains_domain(domain) {
                Some("domain has no changelog history")
            } else if replica_db
                .newest_purged_csn(domain)
                .is_some_and(|purged| csn < purged)
            {
                Some("resync required, cookie is older than the retained history of domain")
            } else {
                None
            };
            if let Some(reason) = reason {
                warn!(%cookie, %domain, reason, "rejecting cookie");
                return Err(ChangelogError::malformed_cookie(
                    cookie.to_string(),
                    format!("{reason}: {domain}"),
                ));
            }
        }
        Ok(())
    }

    /// Registers `op` as a persistent search without running a scan.
    ///
    /// With `changes_only`, only changes stored from now on are delivered;
    /// otherwise the search waits in its initial phase until
    /// [`search`](Self::search) runs its scan.
    pub fn register_persistent_search(
        &self,
        op: Arc<SearchOperation>,
        changes_only: bool,
    ) -> Arc<EntrySender> {
        let sender = Arc::new(self.new_sender(op, changes_only));
        self.persistent.register(Arc::clone(&sender));
        sender
    }

    fn new_sender(&self, op: Arc<SearchOperation>, changes_only: bool) -> EntrySender {
        let cookie = op.request().cookie().map(|c| {
            if changes_only {
                self.newest_cookie()
            } else {
                c.clone()
            }
        });
        let phase = if changes_only {
            SearchPhase::Persistent
        } else {
            SearchPhase::Initial
        };
        let size_limit = op.request().size_limit.or(self.config.default_size_limit);
        EntrySender::new(
            op,
            self.root.clone(),
            self.config.schema_dn.clone(),
            size_limit,
            cookie,
            phase,
        )
    }

    /// Ends a persistent search and closes its cursors.
    pub fn deregister_persistent_search(&self, id: OperationId) -> bool {
        self.persistent.deregister(id).is_some()
    }

    /// The delivery state of a registered persistent search.
    pub fn persistent_search(&self, id: OperationId) -> Option<Arc<EntrySender>> {
        self.persistent.get(id)
    }

    /// Number of registered persistent searches.
    pub fn persistent_search_count(&self) -> usize {
        self.persistent.len()
    }

    /// Feeds a stored change to the persistent searches.
    ///
    /// A change number of 0 means the change was just written to the
    /// replica log and goes to cookie-mode searches; a positive change
    /// number means it was indexed and goes to change-number searches.
    pub fn notify_entry_added(&self, domain: &Dn, change_number: u64, cookie: &str, msg: &UpdateMsg) {
        if self.config.is_excluded(domain) {
            return;
        }
        if change_number == 0 {
            self.notify_cookie_entry_added(domain, msg);
        } else {
            self.notify_change_number_entry_added(domain, change_number, cookie, msg);
        }
    }

    /// Feeds a change written to the replica log to cookie-mode searches.
    pub fn notify_cookie_entry_added(&self, domain: &Dn, msg: &UpdateMsg) {
        if !self.config.is_excluded(domain) {
            self.persistent.notify_cookie_searches(domain, msg);
        }
    }

    /// Feeds an indexed change to change-number searches.
    pub fn notify_change_number_entry_added(
        &self,
        domain: &Dn,
        change_number: u64,
        cookie: &str,
        msg: &UpdateMsg,
    ) {
        if !self.config.is_excluded(domain) {
            self.persistent
                .notify_change_number_searches(domain, change_number, cookie, msg);
        }
    }

    /// The newest CSN of every exposed domain.
    pub fn newest_cookie(&self) -> Cookie {
        self.db.replica_db().newest_cookie(&self.config.excluded_domains)
    }

    /// Returns true if at least one change of an exposed domain is retained.
    pub fn has_changes(&self) -> bool {
        let replica_db = self.db.replica_db();
        replica_db
            .domains()
            .iter()
            .any(|d| !self.config.is_excluded(d) && replica_db.oldest_csn(d).is_some())
    }

    /// Whether the entry `dn` has children: only the root can.
    pub fn has_subordinates(&self, dn: &Dn) -> ChangelogResult<bool> {
        if dn == &self.root {
            Ok(self.has_changes())
        } else if dn.is_descendant_of(&self.root) {
            Ok(false)
        } else {
            Err(ChangelogError::NoSuchObject(format!(
                "{dn} is not part of the changelog"
            )))
        }
    }

    /// Counts the cookie-mode entries below `base`: its direct children, or
    /// all its descendants with `subtree`.
    ///
    /// This reads every retained change.
    pub fn num_subordinates(&self, base: &Dn, subtree: bool) -> ChangelogResult<u64> {
        if !base.is_descendant_of(&self.root) {
            return Err(ChangelogError::NoSuchObject(format!(
                "{base} is not part of the changelog"
            )));
        }
        let scope = if subtree {
            SearchScope::Subordinates
        } else {
            SearchScope::SingleLevel
        };
        let mut cursor = self.db.replica_db().cursor_from(
            &Cookie::new(),
            PositionStrategy::AfterMatchingKey,
            &self.config.excluded_domains,
        );
        let mut count = 0;
        while cursor.next()? {
            if let Some(update) = cursor.record() {
                let dn = change_entry_dn(&self.root, &update.domain, 0, update.msg.csn());
                if scope.contains(base, &dn) {
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    /// Operational attributes the changelog publishes in the root DSE.
    pub fn root_dse_attributes(&self) -> Vec<Attribute> {
        let index = self.db.cn_index_db();
        let first = index.oldest_record().map_or(0, |r| r.change_number);
        let last = index.newest_record().map_or(0, |r| r.change_number);
        vec![
            Attribute::single("firstChangeNumber", first.to_string()),
            Attribute::single("lastChangeNumber", last.to_string()),
            Attribute::single("lastExternalChangelogCookie", self.newest_cookie().to_string()),
        ]
    }

    /// The changelog is read-only.
    pub fn add_entry(&self, entry: &Entry) -> ChangelogResult<()> {
        Err(Self::read_only("add", &entry.dn))
    }

    /// The changelog is read-only.
    pub fn delete_entry(&self, dn: &Dn) -> ChangelogResult<()> {
        Err(Self::read_only("delete", dn))
    }

    /// The changelog is read-only.
    pub fn replace_entry(&self, entry: &Entry) -> ChangelogResult<()> {
        Err(Self::read_only("modify", &entry.dn))
    }

    /// The changelog is read-only.
    pub fn rename_entry(&self, dn: &Dn, _new_dn: &Dn) -> ChangelogResult<()> {
        Err(Self::read_only("rename", dn))
    }

    fn read_only(operation: &str, dn: &Dn) -> ChangelogError {
        ChangelogError::UnwillingToPerform(format!(
            "the changelog is read-only: cannot {operation} {dn}"
        ))
    }
}

impl ChangelogListener for ChangelogBackend {
    fn entry_added(
        &self,
        domain: &Dn,
        change_number: u64,
        cookie: &str,
        msg: &UpdateMsg,
    ) -> ChangelogResult<()> {
        self.notify_entry_added(domain, change_number, cookie, msg);
        Ok(())
    }
}

//! Test fixtures and changelog helpers.
//!
//! Provides CSN generation, update message builders and a changelog
//! wired to its backend.

use ecl_core::{
    ChangelogBackend, ChangelogConfig, ChangelogDb, ChangelogResult, CollectingListener,
    SearchOperation, SearchRequest,
};
use ecl_protocol::{
    Attribute, Control, Csn, Dn, Entry, Filter, Modification, ModificationType, MsgHeader,
    SearchScope, UpdateMsg,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// First timestamp handed out by [`CsnGenerator`]: 2023-11-14T22:13:20Z.
pub const BASE_TIMESTAMP: u64 = 1_700_000_000_000;

/// Hands out CSNs in strictly increasing order, whatever the server id.
#[derive(Debug)]
pub struct CsnGenerator {
    timestamp: u64,
    seqnum: u32,
}

impl Default for CsnGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CsnGenerator {
    /// Creates a generator starting at [`BASE_TIMESTAMP`].
    pub fn new() -> Self {
        Self {
            timestamp: BASE_TIMESTAMP,
            seqnum: 0,
        }
    }

    /// The next CSN for `server_id`.
    pub fn next(&mut self, server_id: u16) -> Csn {
        self.timestamp += 1;
        self.seqnum += 1;
        Csn::new(self.timestamp, self.seqnum, server_id)
    }
}

/// Parses a DN, panicking on invalid input.
pub fn dn(s: &str) -> Dn {
    Dn::parse(s).expect("invalid DN in test")
}

/// A delete of `uid=user<seqnum>,<domain>`.
pub fn delete_msg(domain: &Dn, csn: Csn) -> UpdateMsg {
    UpdateMsg::delete(MsgHeader::new(csn, target(domain, csn)))
}

/// An add of a person entry below `domain`.
pub fn add_msg(domain: &Dn, csn: Csn) -> UpdateMsg {
    let header = MsgHeader::new(csn, target(domain, csn)).with_entry_uuid(uuid::Uuid::new_v4());
    UpdateMsg::add(
        header,
        vec![
            Attribute::new("objectClass", ["top", "person"]),
            Attribute::single("cn", format!("user {}", csn.seqnum())),
            Attribute::single("sn", "test"),
            Attribute::single("creatorsName", "cn=Directory Manager"),
        ],
    )
}

/// A modify replacing `description` of an entry below `domain`.
pub fn modify_msg(domain: &Dn, csn: Csn) -> UpdateMsg {
    UpdateMsg::modify(
        MsgHeader::new(csn, target(domain, csn)),
        vec![
            Modification::new(
                ModificationType::Replace,
                Attribute::single("description", format!("changed at {}", csn.timestamp())),
            ),
            Modification::new(
                ModificationType::Replace,
                Attribute::single("modifiersName", "cn=Directory Manager"),
            ),
        ],
    )
}

/// A rename of an entry below `domain`.
pub fn rename_msg(domain: &Dn, csn: Csn) -> UpdateMsg {
    UpdateMsg::modify_dn(
        MsgHeader::new(csn, target(domain, csn)),
        format!("uid=renamed{}", csn.seqnum()),
        None,
        true,
    )
}

fn target(domain: &Dn, csn: Csn) -> Dn {
    domain.child(ecl_protocol::Rdn::new("uid", format!("user{}", csn.seqnum())))
}

/// A whole-subtree search of `cn=changelog` with no filter.
pub fn changelog_request() -> SearchRequest {
    SearchRequest::new(
        dn("cn=changelog"),
        SearchScope::WholeSubtree,
        Filter::match_all(),
    )
}

/// Change numbers of the draft-mode entries, in delivery order.
pub fn change_numbers(entries: &[Entry]) -> Vec<u64> {
    entries
        .iter()
        .filter_map(|e| e.first_value("changeNumber"))
        .map(|v| v.parse().expect("numeric changeNumber"))
        .collect()
}

/// The `replicationCSN` values of the change entries, in delivery order.
pub fn replication_csns(entries: &[Entry]) -> Vec<Csn> {
    entries
        .iter()
        .filter_map(|e| e.first_value("replicationCSN"))
        .map(|v| v.parse().expect("valid replicationCSN"))
        .collect()
}

/// The notification cookie of the last delivered entry carrying one.
pub fn last_notification_cookie(entries: &[(Entry, Vec<Control>)]) -> Option<String> {
    entries
        .iter()
        .rev()
        .find_map(|(_, controls)| controls.iter().find_map(Control::notification_cookie))
        .map(str::to_string)
}

/// A changelog with its backend.
pub struct TestChangelog {
    /// The stores.
    pub db: Arc<ChangelogDb>,
    /// The backend listening to `db`.
    pub backend: Arc<ChangelogBackend>,
    csns: Mutex<CsnGenerator>,
}

impl Default for TestChangelog {
    fn default() -> Self {
        Self::new()
    }
}

impl TestChangelog {
    /// Creates an empty changelog with the default configuration.
    pub fn new() -> Self {
        Self::with_config(ChangelogConfig::default())
    }

    /// Creates an empty changelog.
    pub fn with_config(config: ChangelogConfig) -> Self {
        let db = Arc::new(ChangelogDb::new());
        let backend = ChangelogBackend::new(config, Arc::clone(&db));
        Self {
            db,
            backend,
            csns: Mutex::new(CsnGenerator::new()),
        }
    }

    /// Creates a changelog holding `count` indexed changes spread over
    /// `o=a` (server 1) and `o=b` (server 2).
    pub fn populated(count: usize) -> Self {
        let changelog = Self::new();
        for i in 0..count {
            if i % 2 == 0 {
                changelog.add_change("o=a", 1);
            } else {
                changelog.add_change("o=b", 2);
            }
        }
        changelog
    }

    /// The next CSN for `server_id`.
    pub fn next_csn(&self, server_id: u16) -> Csn {
        self.csns.lock().next(server_id)
    }

    /// Publishes and indexes a delete in `domain`. Returns its CSN and
    /// change number.
    ///
    /// Concurrent callers store their changes in CSN order.
    pub fn add_change(&self, domain: &str, server_id: u16) -> (Csn, u64) {
        let domain = dn(domain);
        let mut csns = self.csns.lock();
        let csn = csns.next(server_id);
        let n = self
            .db
            .publish_and_index(&domain, &delete_msg(&domain, csn))
            .expect("publish and index");
        (csn, n)
    }

    /// Publishes `msg` and indexes it.
    pub fn store_msg(&self, domain: &str, msg: &UpdateMsg) -> u64 {
        self.db
            .publish_and_index(&dn(domain), msg)
            .expect("publish and index")
    }

    /// Publishes a delete in `domain` without indexing it.
    pub fn publish_change(&self, domain: &str, server_id: u16) -> Csn {
        let domain = dn(domain);
        let mut csns = self.csns.lock();
        let csn = csns.next(server_id);
        self.db
            .publish(&domain, &delete_msg(&domain, csn))
            .expect("publish");
        csn
    }

    /// Indexes a published change.
    pub fn index_change(&self, domain: &str, csn: Csn) -> u64 {
        self.db.index(&dn(domain), csn).expect("index")
    }

    /// Runs a search and returns the delivered entries.
    pub fn search(&self, request: SearchRequest) -> ChangelogResult<Vec<Entry>> {
        let (op, listener) = operation(request);
        self.backend.search(op)?;
        Ok(listener.entries())
    }

    /// Runs a search and returns the delivered entries with their controls.
    pub fn search_with_controls(
        &self,
        request: SearchRequest,
    ) -> ChangelogResult<Vec<(Entry, Vec<Control>)>> {
        let (op, listener) = operation(request);
        self.backend.search(op)?;
        Ok(listener.entries_with_controls())
    }
}

/// Wraps `request` into an operation delivering to a fresh collector.
pub fn operation(request: SearchRequest) -> (Arc<SearchOperation>, Arc<CollectingListener>) {
    let listener = Arc::new(CollectingListener::new());
    let op = Arc::new(SearchOperation::new(request, listener.clone()));
    (op, listener)
}

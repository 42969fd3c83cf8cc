//! Search operations and entry delivery.

use ecl_protocol::{Control, Cookie, Dn, Entry, Filter, PersistentSearchControl, SearchScope};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Receives the entries returned by a search.
pub trait EntryListener: Send + Sync {
    /// Delivers one entry. Returns false to stop the search.
    fn return_entry(&self, entry: &Entry, controls: &[Control]) -> bool;
}

/// Identifier of a search operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(pub u64);

static NEXT_OPERATION_ID: AtomicU64 = AtomicU64::new(1);

impl OperationId {
    fn next() -> Self {
        Self(NEXT_OPERATION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Parameters of a search request.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Search base.
    pub base: Dn,
    /// Search scope.
    pub scope: SearchScope,
    /// Client filter.
    pub filter: Filter,
    /// Request controls.
    pub controls: Vec<Control>,
    /// Maximum number of entries to return.
    pub size_limit: Option<usize>,
}

impl SearchRequest {
    /// Creates a request with no controls and no size limit.
    pub fn new(base: Dn, scope: SearchScope, filter: Filter) -> Self {
        Self {
            base,
            scope,
            filter,
            controls: Vec::new(),
            size_limit: None,
        }
    }

    /// Requests cookie mode, resuming after `cookie`.
    #[must_use]
    pub fn with_cookie(mut self, cookie: Cookie) -> Self {
        self.controls.push(Control::CookieExchange(cookie));
        self
    }

    /// Makes the search persistent.
    #[must_use]
    pub fn persistent(mut self, control: PersistentSearchControl) -> Self {
        self.controls.push(Control::PersistentSearch(control));
        self
    }

    /// Sets the size limit.
    #[must_use]
    pub fn with_size_limit(mut self, limit: usize) -> Self {
        self.size_limit = Some(limit);
        self
    }

    /// The cookie of the cookie exchange control, if the request has one.
    pub fn cookie(&self) -> Option<&Cookie> {
        self.controls.iter().find_map(|c| match c {
            Control::CookieExchange(cookie) => Some(cookie),
            _ => None,
        })
    }

    /// Returns true for a cookie-mode search.
    pub fn is_cookie_based(&self) -> bool {
        self.cookie().is_some()
    }

    /// The persistent search control, if present.
    pub fn persistent_search(&self) -> Option<PersistentSearchControl> {
        self.controls.iter().find_map(|c| match c {
            Control::PersistentSearch(p) => Some(*p),
            _ => None,
        })
    }
}

/// A running search: the request, the client's rights and the channel
/// entries are returned through.
pub struct SearchOperation {
    id: OperationId,
    request: SearchRequest,
    listener: Arc<dyn EntryListener>,
    changelog_read: bool,
    canceled: AtomicBool,
    size_limit_exceeded: AtomicBool,
    /// Entries returned so far; held while delivering.
    sent: Mutex<usize>,
}

impl std::fmt::Debug for SearchOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchOperation")
            .field("id", &self.id)
            .field("request", &self.request)
            .field("changelog_read", &self.changelog_read)
            .finish_non_exhaustive()
    }
}

impl SearchOperation {
    /// Creates an operation for a client holding the changelog-read privilege.
    pub fn new(request: SearchRequest, listener: Arc<dyn EntryListener>) -> Self {
        Self {
            id: OperationId::next(),
            request,
            listener,
            changelog_read: true,
            canceled: AtomicBool::new(false),
            size_limit_exceeded: AtomicBool::new(false),
            sent: Mutex::new(0),
        }
    }

    /// Sets whether the client holds the changelog-read privilege.
    #[must_use]
    pub fn with_changelog_read(mut self, granted: bool) -> Self {
        self.changelog_read = granted;
        self
    }

    /// Operation identifier.
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// The request.
    pub fn request(&self) -> &SearchRequest {
        &self.request
    }

    /// Search base.
    pub fn base(&self) -> &Dn {
        &self.request.base
    }

    /// Search scope.
    pub fn scope(&self) -> SearchScope {
        self.request.scope
    }

    /// Client filter.
    pub fn filter(&self) -> &Filter {
        &self.request.filter
    }

    /// Returns true if the client may read the changelog.
    pub fn has_changelog_read_privilege(&self) -> bool {
        self.changelog_read
    }

    /// Abandons the operation.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    /// Returns true once the operation has been abandoned.
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Returns true if an entry was refused because of the size limit.
    pub fn size_limit_exceeded(&self) -> bool {
        self.size_limit_exceeded.load(Ordering::SeqCst)
    }

    /// Number of entries returned so far.
    pub fn entries_sent(&self) -> usize {
        *self.sent.lock()
    }

    /// Returns true if `entry` is in scope of the search and matches its
    /// filter.
    pub fn matches(&self, entry: &Entry) -> bool {
        entry.matches_base_and_scope(&self.request.base, self.request.scope)
            && self.request.filter.matches(entry)
    }

    /// Returns `entry` to the client, subject to `size_limit`.
    ///
    /// Returns false when the search must stop: the operation was
    /// abandoned, the size limit is reached or the client refused the entry.
    pub fn return_entry(&self, entry: &Entry, controls: &[Control], size_limit: Option<usize>) -> bool {
        if self.is_canceled() {
            return false;
        }
        let mut sent = self.sent.lock();
        if size_limit.is_some_and(|limit| *sent >= limit) {
            self.size_limit_exceeded.store(true, Ordering::SeqCst);
            return false;
        }
        *sent += 1;
        trace!(op = self.id.0, dn = %entry.dn, "returning entry");
        self.listener.return_entry(entry, controls)
    }
}

/// An [`EntryListener`] that keeps every entry it receives.
#[derive(Debug, Default)]
pub struct CollectingListener {
    entries: Mutex<Vec<(Entry, Vec<Control>)>>,
}

impl CollectingListener {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries received so far.
    pub fn entries(&self) -> Vec<Entry> {
        self.entries.lock().iter().map(|(e, _)| e.clone()).collect()
    }

    /// Entries received so far, with their controls.
    pub fn entries_with_controls(&self) -> Vec<(Entry, Vec<Control>)> {
        self.entries.lock().clone()
    }

    /// Number of entries received.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing was received.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl EntryListener for CollectingListener {
    fn return_entry(&self, entry: &Entry, controls: &[Control]) -> bool {
        self.entries.lock().push((entry.clone(), controls.to_vec()));
        true
    }
}

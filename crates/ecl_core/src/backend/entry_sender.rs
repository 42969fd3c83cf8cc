//! Per-search delivery state.
//!
//! An [`EntrySender`] guarantees that the changelog base entry reaches the
//! client before any change entry, and at most once, whether the first
//! change comes from the initial scan or from a live notification.
//!
//! Lock order: cookie, then base gate, then the operation's delivery lock.
//! The phase lock is never held while taking any of them.

use super::draft_scan::Correlator;
use super::synthesizer;
use crate::search::{OperationId, SearchOperation};
use crate::store::{ChangeNumberIndexCursor, MultiDomainCursor};
use ecl_protocol::{Control, Cookie, Csn, Dn, Entry, UpdateMsg};
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const PHASE_WAIT: Duration = Duration::from_millis(50);

/// Where a persistent search stands relative to its initial scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
    /// The initial scan is reading the stores; notifications are ignored.
    Initial,
    /// The scan is draining its cursors one last time; notifications wait.
    Transitioning,
    /// The scan is over; notifications are delivered.
    Persistent,
}

#[derive(Debug)]
struct PhaseState {
    phase: SearchPhase,
    /// Highest change number read by the initial scan.
    last_change_number: u64,
    /// Highest CSN read by the initial scan, per domain and replica.
    last_csn: BTreeMap<(Dn, u16), Csn>,
}

/// Store cursors kept open for the life of a persistent search.
pub(crate) enum RetainedCursors {
    Cookie(MultiDomainCursor),
    ChangeNumber {
        index: ChangeNumberIndexCursor,
        correlator: Correlator,
    },
}

/// Delivery state of one search operation.
pub struct EntrySender {
    op: Arc<SearchOperation>,
    root: Dn,
    schema_dn: Dn,
    size_limit: Option<usize>,
    /// Present only in cookie mode.
    cookie: Option<Mutex<Cookie>>,
    base_sent: AtomicBool,
    base_gate: Mutex<()>,
    phase: Mutex<PhaseState>,
    phase_changed: Condvar,
    cursors: Mutex<Option<RetainedCursors>>,
}

impl std::fmt::Debug for EntrySender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntrySender")
            .field("op", &self.op.id())
            .field("cookie", &self.cookie)
            .field("base_sent", &self.base_sent)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl EntrySender {
    pub(crate) fn new(
        op: Arc<SearchOperation>,
        root: Dn,
        schema_dn: Dn,
        size_limit: Option<usize>,
        cookie: Option<Cookie>,
        phase: SearchPhase,
    ) -> Self {
        Self {
            op,
            root,
            schema_dn,
            size_limit,
            cookie: cookie.map(Mutex::new),
            base_sent: AtomicBool::new(false),
            base_gate: Mutex::new(()),
            phase: Mutex::new(PhaseState {
                phase,
                last_change_number: 0,
                last_csn: BTreeMap::new(),
            }),
            phase_changed: Condvar::new(),
            cursors: Mutex::new(None),
        }
    }

    /// The operation this sender delivers to.
    pub fn operation(&self) -> &Arc<SearchOperation> {
        &self.op
    }

    /// Identifier of the operation.
    pub fn id(&self) -> OperationId {
        self.op.id()
    }

    /// Returns true for a cookie-mode search.
    pub fn is_cookie_based(&self) -> bool {
        self.cookie.is_some()
    }

    /// The current cookie of a cookie-mode search.
    pub fn cookie(&self) -> Option<Cookie> {
        self.cookie.as_ref().map(|c| c.lock().clone())
    }

    /// Current phase.
    pub fn phase(&self) -> SearchPhase {
        self.phase.lock().phase
    }

    /// Returns true once the base entry has been handled.
    pub fn base_entry_sent(&self) -> bool {
        self.base_sent.load(Ordering::Acquire)
    }

    /// Sends the base entry unless it was already sent.
    ///
    /// Returns false when the search must stop.
    pub fn send_base_entry(&self, has_subordinates: bool) -> bool {
        if self.base_sent.load(Ordering::Acquire) {
            return true;
        }
        let _gate = self.base_gate.lock();
        if self.base_sent.load(Ordering::Acquire) {
            return true;
        }
        let entry = synthesizer::base_entry(&self.root, &self.schema_dn, has_subordinates);
        let keep_going = !self.op.matches(&entry) || self.op.return_entry(&entry, &[], self.size_limit);
        self.base_sent.store(true, Ordering::Release);
        keep_going
    }

    /// Sends `entry` after the base entry if it matches the search.
    ///
    /// `cookie` is attached as an entry-change notification control.
    pub fn send_entry_if_matches(&self, entry: &Entry, cookie: Option<&str>) -> bool {
        if !self.send_base_entry(true) {
            return false;
        }
        if !self.op.matches(entry) {
            return true;
        }
        let controls: Vec<Control> = cookie.map(Control::entry_notification).into_iter().collect();
        self.op.return_entry(entry, &controls, self.size_limit)
    }

    /// Advances the cookie with `msg` and sends its cookie-mode entry.
    pub fn send_cookie_entry(&self, domain: &Dn, msg: &UpdateMsg) -> bool {
        let Some(cookie) = &self.cookie else {
            return true;
        };
        // held until the entry is delivered
        let mut current = cookie.lock();
        current.update(domain, msg.csn());
        let cookie = current.to_string();
        let entry = synthesizer::change_entry(&self.root, &self.schema_dn, domain, 0, &cookie, msg);
        self.send_entry_if_matches(&entry, Some(&cookie))
    }

    /// Sends the draft-mode entry of an indexed change.
    pub fn send_change_number_entry(
        &self,
        domain: &Dn,
        change_number: u64,
        cookie: &str,
        msg: &UpdateMsg,
    ) -> bool {
        let entry =
            synthesizer::change_entry(&self.root, &self.schema_dn, domain, change_number, cookie, msg);
        self.send_entry_if_matches(&entry, None)
    }

    /// Records a change read by the initial scan.
    pub(crate) fn mark_scanned_csn(&self, domain: &Dn, csn: Csn) {
        let mut state = self.phase.lock();
        let last = state
            .last_csn
            .entry((domain.clone(), csn.server_id()))
            .or_insert(csn);
        if *last < csn {
            *last = csn;
        }
    }

    /// Records an index record read by the initial scan.
    pub(crate) fn mark_scanned_change_number(&self, change_number: u64) {
        let mut state = self.phase.lock();
        state.last_change_number = state.last_change_number.max(change_number);
    }

    /// Notifications arriving from now on wait for the scan to finish.
    pub(crate) fn start_transition(&self) {
        let mut state = self.phase.lock();
        if state.phase == SearchPhase::Initial {
            state.phase = SearchPhase::Transitioning;
            debug!(op = self.op.id().0, "initial search transitioning");
        }
    }

    /// Ends the initial scan and wakes the waiting notifications.
    pub(crate) fn finish_initial_search(&self) {
        let mut state = self.phase.lock();
        if state.phase != SearchPhase::Persistent {
            state.phase = SearchPhase::Persistent;
            debug!(op = self.op.id().0, "initial search finished");
        }
        self.phase_changed.notify_all();
    }

    /// Returns true if a notification for replica change `csn` of `domain`
    /// must be delivered. Blocks while the scan is transitioning.
    ///
    /// Keyed per replica while the scan cursor keeps one position per
    /// domain. This relies on each domain receiving its changes in CSN
    /// order: a change from a lagging replica that arrives behind the scan
    /// position of its domain would be skipped by both.
    pub(crate) fn accepts_csn(&self, domain: &Dn, csn: Csn) -> bool {
        self.wait_for_phase(|state| {
            state
                .last_csn
                .get(&(domain.clone(), csn.server_id()))
                .map_or(true, |last| csn > *last)
        })
    }

    /// Returns true if a notification for `change_number` must be
    /// delivered. Blocks while the scan is transitioning.
    pub(crate) fn accepts_change_number(&self, change_number: u64) -> bool {
        self.wait_for_phase(|state| change_number > state.last_change_number)
    }

    fn wait_for_phase(&self, newer: impl Fn(&PhaseState) -> bool) -> bool {
        let mut state = self.phase.lock();
        loop {
            match state.phase {
                SearchPhase::Initial => return false,
                SearchPhase::Persistent => return newer(&state),
                SearchPhase::Transitioning => {
                    if self.op.is_canceled() {
                        return false;
                    }
                    self.phase_changed.wait_for(&mut state, PHASE_WAIT);
                }
            }
        }
    }

    /// Keeps the scan's cursors open until the search ends.
    pub(crate) fn retain_cursors(&self, cursors: RetainedCursors) {
        *self.cursors.lock() = Some(cursors);
    }

    /// Returns true while cursors are retained.
    pub fn has_retained_cursors(&self) -> bool {
        self.cursors.lock().is_some()
    }

    /// Closes the retained cursors.
    pub(crate) fn release_cursors(&self) {
        self.cursors.lock().take();
    }

    pub(crate) fn initial_search_guard(self: &Arc<Self>) -> InitialSearchGuard {
        InitialSearchGuard(Arc::clone(self))
    }
}

/// Ends the initial scan on every exit path.
pub(crate) struct InitialSearchGuard(Arc<EntrySender>);

impl Drop for InitialSearchGuard {
    fn drop(&mut self) {
        self.0.finish_initial_search();
    }
}

//! Request and response controls understood by the changelog.

use crate::cookie::Cookie;
use serde::{Deserialize, Serialize};

/// OID of the cookie exchange request control.
pub const OID_ECL_COOKIE_EXCHANGE_CONTROL: &str = "1.3.6.1.4.1.26027.1.5.4";

/// OID of the response control that carries the cookie of each entry.
pub const OID_ECL_ENTRY_NOTIFICATION_CONTROL: &str = "1.3.6.1.4.1.26027.1.5.5";

/// OID of the persistent search request control.
pub const OID_PERSISTENT_SEARCH: &str = "2.16.840.1.113730.3.4.3";

/// Persistent search request parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentSearchControl {
    /// Skip the initial scan and only return changes made after registration.
    pub changes_only: bool,
    /// Attach entry change notification controls to returned entries.
    pub return_ecs: bool,
}

impl PersistentSearchControl {
    /// A persistent search that replays history before going live.
    pub fn with_history() -> Self {
        Self {
            changes_only: false,
            return_ecs: true,
        }
    }

    /// A persistent search that only reports new changes.
    pub fn changes_only() -> Self {
        Self {
            changes_only: true,
            return_ecs: true,
        }
    }
}

/// A control attached to a search request or a returned entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Control {
    /// Request: search the changelog in cookie mode, resuming after the cookie.
    CookieExchange(Cookie),
    /// Response: the cookie valid once the client has consumed the entry.
    EntryChangelogNotification {
        /// Cookie string as of the entry.
        cookie: String,
    },
    /// Request: keep the search open after the initial scan.
    PersistentSearch(PersistentSearchControl),
}

impl Control {
    /// The control's OID.
    pub fn oid(&self) -> &'static str {
        match self {
            Control::CookieExchange(_) => OID_ECL_COOKIE_EXCHANGE_CONTROL,
            Control::EntryChangelogNotification { .. } => OID_ECL_ENTRY_NOTIFICATION_CONTROL,
            Control::PersistentSearch(_) => OID_PERSISTENT_SEARCH,
        }
    }

    /// Builds an entry notification control.
    pub fn entry_notification(cookie: impl Into<String>) -> Self {
        Control::EntryChangelogNotification {
            cookie: cookie.into(),
        }
    }

    /// The cookie carried by an entry notification control.
    pub fn notification_cookie(&self) -> Option<&str> {
        match self {
            Control::EntryChangelogNotification { cookie } => Some(cookie),
            _ => None,
        }
    }
}

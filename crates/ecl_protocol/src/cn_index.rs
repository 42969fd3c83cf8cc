//! Rows of the global change-number index.

use crate::cookie::Cookie;
use crate::csn::Csn;
use crate::dn::Dn;
use crate::error::ProtocolResult;
use serde::{Deserialize, Serialize};

/// Associates a global change number with the change it stands for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNumberIndexRecord {
    /// Global change number, starting at 1.
    pub change_number: u64,
    /// Domain the change was applied to.
    pub domain: Dn,
    /// CSN of the change.
    pub csn: Csn,
    /// Cookie of the server just before this change was indexed.
    pub previous_cookie: String,
}

impl ChangeNumberIndexRecord {
    /// Creates a record.
    pub fn new(change_number: u64, domain: Dn, csn: Csn, previous_cookie: impl Into<String>) -> Self {
        Self {
            change_number,
            domain,
            csn,
            previous_cookie: previous_cookie.into(),
        }
    }

    /// The cookie a client holds once it has consumed this change: the
    /// previous cookie advanced by this record's CSN.
    pub fn cookie_after(&self) -> ProtocolResult<Cookie> {
        let mut cookie = Cookie::parse(&self.previous_cookie)?;
        cookie.update(&self.domain, self.csn);
        Ok(cookie)
    }
}

//! # ECL Protocol
//!
//! Data model of the external changelog (`cn=changelog`).
//!
//! This crate provides:
//! - `Csn` commit sequence numbers and their canonical hex form
//! - `Dn` / `Rdn` distinguished names
//! - `Cookie`, the per-domain resume position of cookie-mode searches
//! - `UpdateMsg`, the replicated change payloads (add/modify/delete/modrdn)
//! - `ChangeNumberIndexRecord`, one row of the global change-number index
//! - `Entry`, `Filter` and `SearchScope` for synthetic changelog entries
//! - LDIF value rendering and CBOR encoding of update messages
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod cn_index;
mod control;
mod cookie;
mod csn;
mod dn;
mod entry;
mod error;
mod filter;
pub mod ldif;
mod update_msg;

pub use cn_index::ChangeNumberIndexRecord;
pub use control::{
    Control, PersistentSearchControl, OID_ECL_COOKIE_EXCHANGE_CONTROL,
    OID_ECL_ENTRY_NOTIFICATION_CONTROL, OID_PERSISTENT_SEARCH,
};
pub use cookie::Cookie;
pub use csn::{Csn, CSN_STRING_LEN};
pub use dn::{Dn, Rdn};
pub use entry::{Attribute, Entry, SearchScope};
pub use error::{ProtocolError, ProtocolResult};
pub use filter::Filter;
pub use update_msg::{
    AddMsg, ChangeType, DeleteMsg, ModificationType, Modification, ModifyDnMsg, ModifyMsg,
    MsgHeader, UpdateMsg,
};

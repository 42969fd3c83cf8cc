//! Commit sequence numbers.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Length of the canonical CSN string: 16 hex digits of timestamp,
/// 4 of server id, 8 of sequence number.
pub const CSN_STRING_LEN: usize = 28;

/// A commit sequence number.
///
/// Identifies one change applied to a replication domain. CSNs are totally
/// ordered by `(timestamp, seqnum, server_id)` and never change once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Csn {
    timestamp: u64,
    seqnum: u32,
    server_id: u16,
}

impl Csn {
    /// Creates a CSN from its parts. `timestamp` is in milliseconds since the epoch.
    #[must_use]
    pub const fn new(timestamp: u64, seqnum: u32, server_id: u16) -> Self {
        Self {
            timestamp,
            seqnum,
            server_id,
        }
    }

    /// Milliseconds since the epoch at which the change was made.
    #[must_use]
    pub const fn timestamp(self) -> u64 {
        self.timestamp
    }

    /// Sequence number within the timestamp.
    #[must_use]
    pub const fn seqnum(self) -> u32 {
        self.seqnum
    }

    /// Identifier of the replica that generated the change.
    #[must_use]
    pub const fn server_id(self) -> u16 {
        self.server_id
    }

    /// Returns true if `self` sorts strictly after `other`.
    #[must_use]
    pub fn is_newer_than(self, other: Csn) -> bool {
        self > other
    }
}

impl Ord for Csn {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then(self.seqnum.cmp(&other.seqnum))
            .then(self.server_id.cmp(&other.server_id))
    }
}

impl PartialOrd for Csn {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Csn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:016x}{:04x}{:08x}",
            self.timestamp, self.server_id, self.seqnum
        )
    }
}

impl FromStr for Csn {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        if s.len() != CSN_STRING_LEN {
            return Err(ProtocolError::invalid_csn(
                s,
                format!("expected {CSN_STRING_LEN} hex digits, got {}", s.len()),
            ));
        }
        if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ProtocolError::invalid_csn(s, "not a hex string"));
        }
        let parse_err = |e: std::num::ParseIntError| ProtocolError::invalid_csn(s, e.to_string());
        let timestamp = u64::from_str_radix(&s[0..16], 16).map_err(parse_err)?;
        let server_id = u16::from_str_radix(&s[16..20], 16).map_err(parse_err)?;
        let seqnum = u32::from_str_radix(&s[20..28], 16).map_err(parse_err)?;
        Ok(Self::new(timestamp, seqnum, server_id))
    }
}

impl Serialize for Csn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Csn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn canonical_string_layout() {
        let csn = Csn::new(0x0000_0148_3b6a_1c2f, 7, 0x0102);
        assert_eq!(csn.to_string(), "000001483b6a1c2f010200000007");
        assert_eq!(csn.to_string().len(), CSN_STRING_LEN);
    }

    #[test]
    fn ordering_is_time_then_seqnum_then_server() {
        let base = Csn::new(100, 5, 9);
        assert!(Csn::new(101, 0, 0) > base);
        assert!(Csn::new(100, 6, 0) > base);
        assert!(Csn::new(100, 5, 10) > base);
        assert!(Csn::new(99, u32::MAX, u16::MAX) < base);
        assert!(Csn::new(101, 0, 0).is_newer_than(base));
    }

    #[test]
    fn rejects_bad_strings() {
        assert!("abc".parse::<Csn>().is_err());
        assert!("zz0001483b6a1c2f010200000007".parse::<Csn>().is_err());
    }

    #[test]
    fn serde_uses_string_form() {
        let csn = Csn::new(42, 1, 3);
        let json = serde_json::to_string(&csn).unwrap();
        assert_eq!(json, format!("\"{csn}\""));
        let back: Csn = serde_json::from_str(&json).unwrap();
        assert_eq!(back, csn);
    }

    proptest! {
        #[test]
        fn parse_display_roundtrip(ts in any::<u64>(), seq in any::<u32>(), sid in any::<u16>()) {
            let csn = Csn::new(ts, seq, sid);
            prop_assert_eq!(csn.to_string().parse::<Csn>().unwrap(), csn);
        }
    }
}

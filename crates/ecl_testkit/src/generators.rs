//! Property-based test generators using proptest.
//!
//! Provides strategies for generating CSNs, cookies, change-number
//! filters and changelog workloads.

use ecl_protocol::{Csn, Dn, Filter};
use proptest::prelude::*;

/// Domains used by generated workloads, including values with escaped
/// separators.
pub const DOMAINS: [&str; 5] = ["o=a", "o=b", "dc=example,dc=com", "o=a\\;b", "o=x\\,y"];

/// Strategy for generating CSNs.
pub fn csn_strategy() -> impl Strategy<Value = Csn> {
    (0u64..1 << 44, any::<u32>(), 1u16..64).prop_map(|(ts, seq, sid)| Csn::new(ts, seq, sid))
}

/// Strategy for generating one of [`DOMAINS`].
pub fn domain_strategy() -> impl Strategy<Value = Dn> {
    prop::sample::select(DOMAINS.to_vec())
        .prop_map(|s| Dn::parse(s).expect("valid domain"))
}

/// Strategy for generating sequences of cookie updates.
pub fn cookie_updates_strategy() -> impl Strategy<Value = Vec<(Dn, Csn)>> {
    prop::collection::vec((domain_strategy(), csn_strategy()), 0..32)
}

/// Strategy for generating filters over `changeNumber` and other attributes,
/// nested with AND, OR and NOT.
pub fn change_number_filter_strategy() -> impl Strategy<Value = Filter> {
    let leaf = prop_oneof![
        (0i64..40).prop_map(|n| Filter::GreaterOrEqual {
            attr: "changeNumber".into(),
            value: n.to_string(),
        }),
        (0i64..40).prop_map(|n| Filter::LessOrEqual {
            attr: "changeNumber".into(),
            value: n.to_string(),
        }),
        (0i64..40).prop_map(|n| Filter::equality("changeNumber", n.to_string())),
        prop::sample::select(vec!["add", "delete", "modify"])
            .prop_map(|t| Filter::equality("changeType", t)),
        Just(Filter::match_all()),
    ];
    leaf.prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..4).prop_map(Filter::And),
            prop::collection::vec(inner.clone(), 1..4).prop_map(Filter::Or),
            inner.prop_map(|f| Filter::Not(Box::new(f))),
        ]
    })
}

/// One step of a generated changelog workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadStep {
    /// Publish and index a change in `DOMAINS[domain]`.
    Change {
        /// Index into [`DOMAINS`].
        domain: usize,
    },
    /// Purge the replica log of `DOMAINS[domain]` up to its newest change.
    Purge {
        /// Index into [`DOMAINS`].
        domain: usize,
    },
}

/// Strategy for generating changelog workloads mixing changes and purges.
pub fn workload_strategy() -> impl Strategy<Value = Vec<WorkloadStep>> {
    let step = prop_oneof![
        6 => (0..DOMAINS.len()).prop_map(|domain| WorkloadStep::Change { domain }),
        1 => (0..DOMAINS.len()).prop_map(|domain| WorkloadStep::Purge { domain }),
    ];
    prop::collection::vec(step, 1..40)
}

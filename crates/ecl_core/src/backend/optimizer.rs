//! Derives scan bounds from a search's base DN and filter.
//!
//! The bounds only prune the scan. Every candidate entry is still matched
//! against the client filter before it is returned.

use crate::error::{ChangelogError, ChangelogResult};
use ecl_protocol::{Csn, Dn, Filter};
use tracing::debug;

const CHANGE_NUMBER: &str = "changeNumber";
const REPLICATION_CSN: &str = "replicationCSN";

/// Bounds of a changelog scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchParams {
    /// Lowest change number to return (inclusive). `None` means unbounded.
    pub lowest_change_number: Option<u64>,
    /// Highest change number to return (inclusive). `None` means unbounded.
    pub highest_change_number: Option<u64>,
    /// The only CSN that can match.
    pub exact_csn: Option<Csn>,
}

impl SearchParams {
    /// Returns true if `change_number` is not above the upper bound.
    pub fn change_number_in_range(&self, change_number: u64) -> bool {
        self.highest_change_number
            .map_or(true, |highest| change_number <= highest)
    }

    /// Returns true if a change with `csn` can match.
    pub fn csn_may_match(&self, csn: Csn) -> bool {
        self.exact_csn.map_or(true, |exact| exact == csn)
    }

    fn intersect(self, other: SearchParams) -> SearchParams {
        let highest_change_number = match (self.highest_change_number, other.highest_change_number) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        SearchParams {
            lowest_change_number: self.lowest_change_number.max(other.lowest_change_number),
            highest_change_number,
            exact_csn: self.exact_csn.or(other.exact_csn),
        }
    }
}

/// Analyzes `base` (relative to the changelog `root`) and `filter`.
///
/// - the root itself: bounds come from the filter
/// - `changeNumber=N,<root>`: exactly N; any other single RDN below the root
///   falls back to the filter
/// - `replicationCSN=X,<domain>,<root>`: exactly CSN X
pub fn optimize_search(root: &Dn, base: &Dn, filter: &Filter) -> ChangelogResult<SearchParams> {
    let depth = base.relative_to(root).map_or(0, |relative| relative.size());
    let rdn_filter = match depth {
        0 => None,
        1 => rdn_equality(base, CHANGE_NUMBER),
        _ => rdn_equality(base, REPLICATION_CSN),
    };
    let params = optimize_filter(rdn_filter.as_ref().unwrap_or(filter))?;
    debug!(%base, ?params, "optimized changelog search");
    Ok(params)
}

fn rdn_equality(base: &Dn, attr: &str) -> Option<Filter> {
    base.rdn()
        .and_then(|rdn| rdn.value_of(attr))
        .map(|value| Filter::equality(attr, value))
}

fn optimize_filter(filter: &Filter) -> ChangelogResult<SearchParams> {
    let mut params = SearchParams::default();
    match filter {
        Filter::GreaterOrEqual { attr, value } if is(attr, CHANGE_NUMBER) => {
            params.lowest_change_number = lower_bound(decode_change_number(value)?);
        }
        Filter::LessOrEqual { attr, value } if is(attr, CHANGE_NUMBER) => {
            params.highest_change_number = Some(upper_bound(decode_change_number(value)?));
        }
        Filter::Equality { attr, value } if is(attr, CHANGE_NUMBER) => {
            let number = decode_change_number(value)?;
            params.lowest_change_number = lower_bound(number);
            params.highest_change_number = Some(upper_bound(number));
        }
        Filter::Equality { attr, value } if is(attr, REPLICATION_CSN) => {
            params.exact_csn = Some(value.parse()?);
        }
        Filter::And(components) => {
            for component in components {
                params = params.intersect(optimize_filter(component)?);
            }
        }
        _ => {}
    }
    Ok(params)
}

fn is(attr: &str, name: &str) -> bool {
    attr.split(';').next().unwrap_or_default().eq_ignore_ascii_case(name)
}

fn decode_change_number(value: &str) -> ChangelogResult<i64> {
    value
        .trim()
        .parse()
        .map_err(|_| ChangelogError::invalid_attribute_syntax(CHANGE_NUMBER, value))
}

/// Negative lower bounds constrain nothing.
fn lower_bound(n: i64) -> Option<u64> {
    u64::try_from(n).ok()
}

/// Negative upper bounds exclude every change number.
fn upper_bound(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> Dn {
        Dn::parse("cn=changelog").unwrap()
    }

    fn optimize(base: &str, filter: &str) -> ChangelogResult<SearchParams> {
        optimize_search(&root(), &Dn::parse(base).unwrap(), &Filter::parse(filter).unwrap())
    }

    fn bounds(base: &str, filter: &str) -> (Option<u64>, Option<u64>) {
        let params = optimize(base, filter).unwrap();
        (params.lowest_change_number, params.highest_change_number)
    }

    #[test]
    fn change_number_bounds_from_filters() {
        let cases: &[(&str, &str, Option<u64>, Option<u64>)] = &[
            ("cn=changelog", "(objectclass=*)", None, None),
            ("cn=changelog", "(changenumber>=2)", Some(2), None),
            ("cn=changelog", "(&(changenumber>=2)(changenumber<=5))", Some(2), Some(5)),
            ("cn=changelog", "(&(dc=x)(&(changenumber>=2)(changenumber<=5)))", Some(2), Some(5)),
            (
                "cn=changelog",
                "(&(&(changenumber>=3)(changenumber<=4))(&(|(dc=y)(dc=x))(&(changenumber>=2)(changenumber<=5))))",
                Some(3),
                Some(4),
            ),
            (
                "cn=changelog",
                "(|(objectclass=*)(&(changenumber>=2)(changenumber<=5)))",
                None,
                None,
            ),
            ("cn=changelog", "(changenumber=8)", Some(8), Some(8)),
            ("changeNumber=8,cn=changelog", "(changenumber>=2)", Some(8), Some(8)),
            ("changeNumber=8,cn=changelog", "(objectclass=*)", Some(8), Some(8)),
        ];
        for (base, filter, lowest, highest) in cases {
            assert_eq!(bounds(base, filter), (*lowest, *highest), "{base} {filter}");
        }
    }

    #[test]
    fn and_with_many_operands() {
        assert_eq!(
            bounds(
                "cn=changelog",
                "(&(changenumber>=2)(changenumber<=9)(changenumber>=4)(changenumber<=7))"
            ),
            (Some(4), Some(7))
        );
    }

    #[test]
    fn negation_yields_no_bounds() {
        assert_eq!(bounds("cn=changelog", "(!(changenumber<=5))"), (None, None));
    }

    #[test]
    fn domain_rdn_falls_back_to_filter() {
        assert_eq!(bounds("o=test,cn=changelog", "(changenumber<=3)"), (None, Some(3)));
    }

    #[test]
    fn replication_csn_sets_exact_bound() {
        let csn = Csn::new(0x1234, 1, 2);
        let params = optimize("cn=changelog", &format!("(replicationcsn={csn})")).unwrap();
        assert_eq!(params.exact_csn, Some(csn));
        assert_eq!(params.lowest_change_number, None);
        assert_eq!(params.highest_change_number, None);

        let params = optimize(&format!("replicationCSN={csn},o=test,cn=changelog"), "(objectclass=*)").unwrap();
        assert_eq!(params.exact_csn, Some(csn));
        assert!(params.csn_may_match(csn));
        assert!(!params.csn_may_match(Csn::new(1, 0, 0)));
    }

    #[test]
    fn invalid_assertions() {
        let err = optimize("cn=changelog", "(changenumber>=abc)").unwrap_err();
        assert!(matches!(err, ChangelogError::InvalidAttributeSyntax { .. }));

        let err = optimize("cn=changelog", "(replicationcsn=nothex)").unwrap_err();
        assert!(matches!(err, ChangelogError::Protocol(_)));

        let err = optimize("changeNumber=x,cn=changelog", "(objectclass=*)").unwrap_err();
        assert!(matches!(err, ChangelogError::InvalidAttributeSyntax { .. }));
    }

    #[test]
    fn negative_numbers() {
        assert_eq!(bounds("cn=changelog", "(changenumber>=-4)"), (None, None));
        let params = optimize("cn=changelog", "(changenumber<=-1)").unwrap();
        assert!(!params.change_number_in_range(1));
    }

    #[test]
    fn in_range() {
        let params = SearchParams {
            highest_change_number: Some(5),
            ..Default::default()
        };
        assert!(params.change_number_in_range(5));
        assert!(!params.change_number_in_range(6));
        assert!(SearchParams::default().change_number_in_range(u64::MAX));
    }
}

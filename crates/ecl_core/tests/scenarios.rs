//! Integration tests for cookie-mode and change-number-mode searches.

use ecl_core::{ChangelogConfig, ChangelogError, ResultCode, SearchRequest};
use ecl_protocol::{Cookie, Entry, Filter, PersistentSearchControl, SearchScope};
use ecl_testkit::prelude::*;

fn filtered(filter: &str) -> SearchRequest {
    SearchRequest::new(
        dn("cn=changelog"),
        SearchScope::WholeSubtree,
        Filter::parse(filter).expect("valid filter"),
    )
}

fn is_base(entry: &Entry) -> bool {
    entry.dn == dn("cn=changelog")
}

// ============================================================================
// Cookie mode
// ============================================================================

#[test]
fn empty_cookie_replays_every_domain() {
    let changelog = TestChangelog::new();
    let (a1, _) = changelog.add_change("o=a", 1);
    let (b1, _) = changelog.add_change("o=b", 2);

    let entries = changelog
        .search_with_controls(changelog_request().with_cookie(Cookie::new()))
        .unwrap();

    assert_eq!(entries.len(), 3);
    assert!(is_base(&entries[0].0));
    assert!(entries[0].1.is_empty());
    assert_eq!(
        entries[1].0.dn,
        dn(&format!("replicationCSN={a1},o=a,cn=changelog"))
    );
    assert_eq!(
        entries[2].0.dn,
        dn(&format!("replicationCSN={b1},o=b,cn=changelog"))
    );
    assert_eq!(
        last_notification_cookie(&entries),
        Some(format!("o=a:{a1};o=b:{b1}"))
    );
}

#[test]
fn cookie_mode_entries_have_no_change_number() {
    let changelog = TestChangelog::populated(3);

    let entries = changelog
        .search(changelog_request().with_cookie(Cookie::new()))
        .unwrap();

    assert_eq!(entries.len(), 4);
    assert!(change_numbers(&entries).is_empty());
    assert_eq!(replication_csns(&entries).len(), 3);
}

#[test]
fn resuming_from_a_returned_cookie_continues_after_it() {
    let changelog = TestChangelog::populated(4);
    let first = changelog
        .search_with_controls(changelog_request().with_cookie(Cookie::new()))
        .unwrap();
    let all: Vec<Entry> = first.iter().map(|(e, _)| e.clone()).collect();
    let resume_from = first[2]
        .1
        .iter()
        .find_map(|c| c.notification_cookie())
        .expect("change entries carry a cookie");

    let resumed = changelog
        .search(changelog_request().with_cookie(Cookie::parse(resume_from).unwrap()))
        .unwrap();

    assert!(is_base(&resumed[0]));
    assert_eq!(replication_csns(&resumed), replication_csns(&all)[2..].to_vec());
}

#[test]
fn newest_cookie_resumes_with_nothing_new() {
    let changelog = TestChangelog::populated(4);
    let cookie = changelog.backend.newest_cookie();

    let entries = changelog.search(changelog_request().with_cookie(cookie)).unwrap();

    assert_eq!(entries.len(), 1);
    assert!(is_base(&entries[0]));
}

#[test]
fn cookie_with_unknown_domain_is_rejected() {
    let changelog = TestChangelog::populated(2);
    let cookie = Cookie::parse(&format!("o=unknown:{}", changelog.next_csn(9))).unwrap();

    let err = changelog
        .search(changelog_request().with_cookie(cookie))
        .unwrap_err();

    assert!(matches!(err, ChangelogError::MalformedCookie { .. }));
    assert_eq!(err.result_code(), ResultCode::UnwillingToPerform);
}

#[test]
fn cookie_before_purged_changes_is_rejected() {
    let changelog = TestChangelog::new();
    let (a1, _) = changelog.add_change("o=a", 1);
    let (a2, _) = changelog.add_change("o=a", 1);
    let (a3, _) = changelog.add_change("o=a", 1);
    changelog.db.replica_db().purge_before(&dn("o=a"), a3);

    let err = changelog
        .search(changelog_request().with_cookie(Cookie::parse(&format!("o=a:{a1}")).unwrap()))
        .unwrap_err();
    assert!(matches!(err, ChangelogError::MalformedCookie { .. }));
    assert_eq!(err.result_code(), ResultCode::UnwillingToPerform);

    let entries = changelog
        .search(changelog_request().with_cookie(Cookie::parse(&format!("o=a:{a2}")).unwrap()))
        .unwrap();
    assert_eq!(replication_csns(&entries), vec![a3]);
}

#[test]
fn outdated_cookie_does_not_register_a_persistent_search() {
    let changelog = TestChangelog::new();
    let (a1, _) = changelog.add_change("o=a", 1);
    changelog.add_change("o=a", 1);
    let (a3, _) = changelog.add_change("o=a", 1);
    changelog.db.replica_db().purge_before(&dn("o=a"), a3);

    let request = changelog_request()
        .with_cookie(Cookie::parse(&format!("o=a:{a1}")).unwrap())
        .persistent(PersistentSearchControl::with_history());
    assert!(changelog.search(request).is_err());
    assert_eq!(changelog.backend.persistent_search_count(), 0);
}

#[test]
fn excluded_domains_are_hidden() {
    let changelog = TestChangelog::with_config(
        ChangelogConfig::new().exclude_domain(dn("o=private")),
    );
    let (public, _) = changelog.add_change("o=a", 1);
    let (hidden, _) = changelog.add_change("o=private", 2);

    let entries = changelog
        .search(changelog_request().with_cookie(Cookie::new()))
        .unwrap();
    assert_eq!(replication_csns(&entries), vec![public]);

    let cookie = Cookie::parse(&format!("o=private:{hidden}")).unwrap();
    let err = changelog
        .search(changelog_request().with_cookie(cookie))
        .unwrap_err();
    assert!(matches!(err, ChangelogError::MalformedCookie { .. }));
    assert!(!changelog.backend.newest_cookie().contains(&dn("o=private")));
}

#[test]
fn replication_csn_base_returns_one_entry() {
    let changelog = TestChangelog::populated(5);
    let entries = changelog
        .search(changelog_request().with_cookie(Cookie::new()))
        .unwrap();
    let target = &entries[3];

    let request = SearchRequest::new(target.dn.clone(), SearchScope::BaseObject, Filter::match_all())
        .with_cookie(Cookie::new());
    let found = changelog.search(request).unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].dn, target.dn);
}

// ============================================================================
// Change-number mode
// ============================================================================

#[test]
fn change_number_search_returns_base_then_changes() {
    let changelog = TestChangelog::populated(4);

    let entries = changelog.search(changelog_request()).unwrap();

    assert_eq!(entries.len(), 5);
    assert!(is_base(&entries[0]));
    assert_eq!(entries[0].first_value("hasSubordinates"), Some("true"));
    assert_eq!(change_numbers(&entries), vec![1, 2, 3, 4]);
    assert_eq!(
        entries[1].dn,
        dn("changeNumber=1,cn=changelog")
    );
}

#[test]
fn change_number_range_is_honored() {
    let changelog = TestChangelog::populated(6);

    let entries = changelog
        .search(filtered("(&(changeNumber>=2)(changeNumber<=4))"))
        .unwrap();

    assert_eq!(change_numbers(&entries), vec![2, 3, 4]);
}

#[test]
fn change_number_below_retention_is_a_gap() {
    let changelog = TestChangelog::populated(12);
    changelog.db.cn_index_db().purge_up_to(10);
    assert_eq!(
        changelog.db.cn_index_db().oldest_record().map(|r| r.change_number),
        Some(10)
    );

    // the base entry has no changeNumber, so the filter rejects it too
    let entries = changelog.search(filtered("(changeNumber=5)")).unwrap();
    assert!(entries.is_empty());

    let entries = changelog
        .search(filtered("(|(changeNumber=5)(objectClass=container))"))
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert!(is_base(&entries[0]));
}

#[test]
fn low_bound_starts_at_oldest_record() {
    let changelog = TestChangelog::populated(6);
    changelog.db.cn_index_db().purge_up_to(3);

    let entries = changelog.search(filtered("(changeNumber>=1)")).unwrap();

    assert_eq!(change_numbers(&entries), vec![3, 4, 5, 6]);
}

#[test]
fn change_number_base_returns_one_entry() {
    let changelog = TestChangelog::populated(5);
    let request = SearchRequest::new(
        dn("changeNumber=3,cn=changelog"),
        SearchScope::BaseObject,
        Filter::match_all(),
    );

    let entries = changelog.search(request).unwrap();

    assert_eq!(change_numbers(&entries), vec![3]);
    assert_eq!(entries.len(), 1);
}

#[test]
fn purged_changes_leave_gaps() {
    let changelog = TestChangelog::new();
    changelog.add_change("o=a", 1);
    changelog.add_change("o=a", 1);
    let (third, _) = changelog.add_change("o=a", 1);
    changelog.add_change("o=b", 2);
    changelog.db.replica_db().purge_before(&dn("o=a"), third);

    let entries = changelog.search(changelog_request()).unwrap();

    assert_eq!(change_numbers(&entries), vec![3, 4]);
}

#[test]
fn draft_entries_carry_the_cookie_after_the_change() {
    let changelog = TestChangelog::new();
    let (a1, _) = changelog.add_change("o=a", 1);
    let (b1, _) = changelog.add_change("o=b", 2);

    let entries = changelog.search_with_controls(changelog_request()).unwrap();

    assert!(entries.iter().all(|(_, controls)| controls.is_empty()));
    assert_eq!(
        entries[1].0.first_value("changeLogCookie"),
        Some(format!("o=a:{a1}").as_str())
    );
    assert_eq!(
        entries[2].0.first_value("changeLogCookie"),
        Some(format!("o=a:{a1};o=b:{b1}").as_str())
    );
}

#[test]
fn index_without_replica_change_is_a_consistency_violation() {
    let changelog = TestChangelog::new();
    changelog.add_change("o=a", 1);
    let phantom = changelog.next_csn(1);
    changelog.db.cn_index_db().add_record(&dn("o=a"), phantom, "");

    let err = changelog.search(changelog_request()).unwrap_err();

    assert!(matches!(err, ChangelogError::ConsistencyViolation { .. }));
    assert_eq!(err.result_code(), ResultCode::OperationsError);
}

#[test]
fn filter_selects_change_types() {
    let changelog = TestChangelog::new();
    let a = dn("o=a");
    changelog.store_msg("o=a", &add_msg(&a, changelog.next_csn(1)));
    changelog.store_msg("o=a", &modify_msg(&a, changelog.next_csn(1)));
    changelog.store_msg("o=a", &rename_msg(&a, changelog.next_csn(1)));
    changelog.store_msg("o=a", &delete_msg(&a, changelog.next_csn(1)));

    let adds = changelog.search(filtered("(changeType=add)")).unwrap();
    assert_eq!(change_numbers(&adds), vec![1]);
    assert!(adds[0].first_value("changes").is_some());
    assert_eq!(
        adds[0].first_value("changeInitiatorsName"),
        Some("cn=Directory Manager")
    );

    let renames = changelog.search(filtered("(changeType=modrdn)")).unwrap();
    assert_eq!(change_numbers(&renames), vec![3]);
    assert_eq!(renames[0].first_value("newRDN"), Some("uid=renamed3"));
    assert_eq!(renames[0].first_value("deleteOldRDN"), Some("true"));

    let modifies = changelog.search(filtered("(changeType=modify)")).unwrap();
    assert_eq!(change_numbers(&modifies), vec![2]);
    assert_eq!(
        modifies[0].first_value("changeInitiatorsName"),
        Some("cn=Directory Manager")
    );
}

// ============================================================================
// Limits, access and surface
// ============================================================================

#[test]
fn size_limit_stops_the_search() {
    let changelog = TestChangelog::populated(5);
    let (op, listener) = operation(changelog_request().with_size_limit(3));

    changelog.backend.search(op.clone()).unwrap();

    assert_eq!(listener.len(), 3);
    assert_eq!(change_numbers(&listener.entries()), vec![1, 2]);
    assert!(op.size_limit_exceeded());
}

#[test]
fn base_scope_on_root_returns_only_the_root() {
    let changelog = TestChangelog::populated(3);
    let request = SearchRequest::new(dn("cn=changelog"), SearchScope::BaseObject, Filter::match_all());

    let entries = changelog.search(request).unwrap();

    assert_eq!(entries.len(), 1);
    assert!(is_base(&entries[0]));
}

#[test]
fn empty_changelog_root_has_no_subordinates() {
    let changelog = TestChangelog::new();

    let entries = changelog.search(changelog_request()).unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].first_value("hasSubordinates"), Some("false"));
}

#[test]
fn base_outside_changelog_is_no_such_object() {
    let changelog = TestChangelog::populated(1);
    let request = SearchRequest::new(dn("o=a"), SearchScope::WholeSubtree, Filter::match_all());

    let err = changelog.search(request).unwrap_err();

    assert_eq!(err.result_code(), ResultCode::NoSuchObject);
}

#[test]
fn search_without_privilege_is_refused() {
    let changelog = TestChangelog::populated(1);
    let (op, listener) = operation(changelog_request());
    let op = std::sync::Arc::new(
        ecl_core::SearchOperation::new(op.request().clone(), listener.clone())
            .with_changelog_read(false),
    );

    let err = changelog.backend.search(op).unwrap_err();

    assert_eq!(err.result_code(), ResultCode::InsufficientAccessRights);
    assert!(listener.is_empty());
}

#[test]
fn root_dse_reports_change_number_range() {
    let changelog = TestChangelog::populated(5);
    changelog.db.cn_index_db().purge_up_to(2);

    let attributes = changelog.backend.root_dse_attributes();
    let value = |name: &str| {
        attributes
            .iter()
            .find(|a| a.is_named(name))
            .and_then(|a| a.first_value())
            .map(str::to_string)
    };

    assert_eq!(value("firstChangeNumber").as_deref(), Some("2"));
    assert_eq!(value("lastChangeNumber").as_deref(), Some("5"));
    assert_eq!(
        value("lastExternalChangelogCookie"),
        Some(changelog.backend.newest_cookie().to_string())
    );
}

#[test]
fn subordinate_counts() {
    let changelog = TestChangelog::populated(5);
    let backend = &changelog.backend;

    assert_eq!(backend.num_subordinates(&dn("cn=changelog"), true).unwrap(), 5);
    assert_eq!(backend.num_subordinates(&dn("o=a,cn=changelog"), false).unwrap(), 3);
    assert_eq!(backend.num_subordinates(&dn("o=b,cn=changelog"), true).unwrap(), 2);
    assert!(backend.has_subordinates(&dn("cn=changelog")).unwrap());
    assert!(!backend.has_subordinates(&dn("changeNumber=1,cn=changelog")).unwrap());
}

#[test]
fn changelog_is_read_only() {
    let changelog = TestChangelog::populated(1);
    let entry = changelog.search(changelog_request()).unwrap().remove(1);

    for err in [
        changelog.backend.add_entry(&entry).unwrap_err(),
        changelog.backend.replace_entry(&entry).unwrap_err(),
        changelog.backend.delete_entry(&entry.dn).unwrap_err(),
        changelog
            .backend
            .rename_entry(&entry.dn, &dn("changeNumber=9,cn=changelog"))
            .unwrap_err(),
    ] {
        assert_eq!(err.result_code(), ResultCode::UnwillingToPerform);
    }
}

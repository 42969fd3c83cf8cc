//! Builds the synthetic entries of the changelog.
//!
//! Change entries are named either by change number
//! (`changeNumber=N,cn=changelog`) or by domain and CSN
//! (`replicationCSN=X,<domain>,cn=changelog`).

use chrono::{DateTime, Utc};
use ecl_protocol::ldif::{attributes_to_ldif, modifications_to_ldif};
use ecl_protocol::{Csn, Dn, Entry, ModificationType, Rdn, UpdateMsg};
use tracing::warn;

const BASE_OBJECT_CLASSES: [&str; 2] = ["top", "container"];
const CHANGE_OBJECT_CLASSES: [&str; 2] = ["top", "changeLogEntry"];

/// Name of the changelog root entry.
pub fn changelog_root() -> Dn {
    Dn::from_rdns(vec![Rdn::new("cn", "changelog")])
}

/// DN of a change entry. A change number of 0 selects the cookie-mode name.
pub fn change_entry_dn(root: &Dn, domain: &Dn, change_number: u64, csn: Csn) -> Dn {
    if change_number > 0 {
        root.child(Rdn::new("changeNumber", change_number.to_string()))
    } else {
        domain
            .concat(root)
            .child(Rdn::new("replicationCSN", csn.to_string()))
    }
}

/// The changelog root entry. It never carries `numSubordinates`.
pub fn base_entry(root: &Dn, schema_dn: &Dn, has_subordinates: bool) -> Entry {
    let mut entry = Entry::new(root.clone(), BASE_OBJECT_CLASSES);
    let cn = root.rdn().map(|rdn| rdn.value().to_string()).unwrap_or_default();
    entry.put("cn", cn);
    entry.put("subschemaSubentry", schema_dn.to_string());
    entry.put("hasSubordinates", has_subordinates.to_string());
    entry.put("entryDN", root.to_string());
    entry
}

/// GeneralizedTime of a CSN timestamp, e.g. `20240131235959Z`.
pub fn change_time(csn: Csn) -> String {
    let time = i64::try_from(csn.timestamp())
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_else(|| {
            warn!(%csn, "CSN timestamp out of range, using the epoch as changeTime");
            DateTime::<Utc>::default()
        });
    time.format("%Y%m%d%H%M%SZ").to_string()
}

/// Builds the change entry for `msg`.
///
/// `change_number` is 0 for cookie-mode entries. `cookie` is the cookie
/// valid once the client has consumed this change.
pub fn change_entry(
    root: &Dn,
    schema_dn: &Dn,
    domain: &Dn,
    change_number: u64,
    cookie: &str,
    msg: &UpdateMsg,
) -> Entry {
    let header = msg.header();
    let csn = header.csn;
    let dn = change_entry_dn(root, domain, change_number, csn);

    let (changes, derived_initiator) = match msg {
        UpdateMsg::Add(add) => {
            let creator = add
                .attributes
                .iter()
                .find(|a| a.is_named("creatorsName"))
                .and_then(|a| a.first_value())
                .map(str::to_string);
            (Some(attributes_to_ldif(&add.attributes)), creator)
        }
        UpdateMsg::Modify(modify) => (
            Some(modifications_to_ldif(&modify.modifications)),
            modifiers_name(&modify.modifications),
        ),
        UpdateMsg::ModifyDn(rename) if !rename.modifications.is_empty() => (
            Some(modifications_to_ldif(&rename.modifications)),
            modifiers_name(&rename.modifications),
        ),
        UpdateMsg::ModifyDn(_) | UpdateMsg::Delete(_) => (None, None),
    };
    let initiator = header.initiator.clone().or(derived_initiator);

    let mut entry = Entry::new(dn.clone(), CHANGE_OBJECT_CLASSES);
    entry.put("subschemaSubentry", schema_dn.to_string());
    entry.put("numSubordinates", "0");
    entry.put("hasSubordinates", "false");
    entry.put("entryDN", dn.to_string());
    if change_number > 0 {
        entry.put("changeNumber", change_number.to_string());
    }
    entry.put("changeTime", change_time(csn));
    entry.put("changeType", msg.change_type().as_str());
    entry.put("targetDN", header.target_dn.to_string());
    entry.put("replicationCSN", csn.to_string());
    entry.put("replicaIdentifier", csn.server_id().to_string());
    if let Some(changes) = changes {
        entry.put("changes", changes);
    }
    if let Some(initiator) = initiator {
        entry.put("changeInitiatorsName", initiator);
    }
    if let Some(uuid) = header.entry_uuid {
        entry.put("targetEntryUUID", uuid.to_string());
    }
    entry.put("changeLogCookie", cookie);
    if !header.ecl_includes.is_empty() {
        entry.put("includedAttributes", attributes_to_ldif(&header.ecl_includes));
    }
    if let UpdateMsg::ModifyDn(rename) = msg {
        entry.put("newRDN", rename.new_rdn.clone());
        if let Some(superior) = &rename.new_superior {
            entry.put("newSuperior", superior.to_string());
        }
        entry.put("deleteOldRDN", rename.delete_old_rdn.to_string());
    }
    entry
}

fn modifiers_name(modifications: &[ecl_protocol::Modification]) -> Option<String> {
    modifications
        .iter()
        .find(|m| m.mod_type == ModificationType::Replace && m.attribute.is_named("modifiersName"))
        .and_then(|m| m.attribute.first_value())
        .map(str::to_string)
}

//! LDIF rendering of attribute values and change records.
//!
//! Values that are not LDIF-safe (RFC 2849) are written base64-encoded
//! after a `::` separator.

use crate::entry::{Attribute, Entry};
use crate::update_msg::Modification;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// Returns true if `value` must be base64-encoded in LDIF.
pub fn needs_base64(value: &str) -> bool {
    let bytes = value.as_bytes();
    match bytes.first() {
        None => return false,
        Some(b' ' | b':' | b'<') => return true,
        Some(_) => {}
    }
    if bytes.last() == Some(&b' ') {
        return true;
    }
    bytes
        .iter()
        .any(|&b| b == 0 || b == b'\n' || b == b'\r' || b > 0x7f)
}

/// Appends `name: value` (or `name:: base64`) and a newline.
pub fn append_value(buf: &mut String, name: &str, value: &str) {
    buf.push_str(name);
    if needs_base64(value) {
        buf.push_str(":: ");
        buf.push_str(&BASE64.encode(value.as_bytes()));
    } else {
        buf.push_str(": ");
        buf.push_str(value);
    }
    buf.push('\n');
}

/// One line per value, for the `changes` of an add and for
/// `includedAttributes`.
pub fn attributes_to_ldif(attributes: &[Attribute]) -> String {
    let mut buf = String::with_capacity(256);
    for attribute in attributes {
        for value in &attribute.values {
            append_value(&mut buf, &attribute.name, value);
        }
    }
    buf
}

/// LDIF modify body: `<op>: <attr>`, the values, then `-`.
pub fn modifications_to_ldif(modifications: &[Modification]) -> String {
    let mut buf = String::with_capacity(128);
    for m in modifications {
        buf.push_str(&m.mod_type.to_string());
        buf.push_str(": ");
        buf.push_str(&m.attribute.name);
        buf.push('\n');
        for value in &m.attribute.values {
            append_value(&mut buf, &m.attribute.name, value);
        }
        buf.push_str("-\n");
    }
    buf
}

/// A whole entry as an LDIF content record, ending with a blank line.
pub fn entry_to_ldif(entry: &Entry) -> String {
    let mut buf = String::with_capacity(512);
    append_value(&mut buf, "dn", &entry.dn.to_string());
    for oc in &entry.object_classes {
        append_value(&mut buf, "objectClass", oc);
    }
    buf.push_str(&attributes_to_ldif(&entry.attributes));
    buf.push('\n');
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dn::Dn;
    use crate::update_msg::ModificationType;

    #[test]
    fn safe_values_are_plain() {
        let mut buf = String::new();
        append_value(&mut buf, "cn", "Bob Smith");
        assert_eq!(buf, "cn: Bob Smith\n");
    }

    #[test]
    fn unsafe_values_are_base64() {
        assert!(needs_base64(" leading"));
        assert!(needs_base64("trailing "));
        assert!(needs_base64(":colon"));
        assert!(needs_base64("<url"));
        assert!(needs_base64("two\nlines"));
        assert!(needs_base64("caf\u{e9}"));
        assert!(!needs_base64(""));

        let mut buf = String::new();
        append_value(&mut buf, "description", "caf\u{e9}");
        assert_eq!(buf, "description:: Y2Fmw6k=\n");
    }

    #[test]
    fn add_changes() {
        let ldif = attributes_to_ldif(&[
            Attribute::new("objectClass", ["top", "person"]),
            Attribute::single("sn", "smith"),
        ]);
        assert_eq!(ldif, "objectClass: top\nobjectClass: person\nsn: smith\n");
    }

    #[test]
    fn modify_changes() {
        let ldif = modifications_to_ldif(&[
            Modification::new(ModificationType::Replace, Attribute::single("sn", "jones")),
            Modification::new(ModificationType::Delete, Attribute::new("mail", Vec::<String>::new())),
        ]);
        assert_eq!(ldif, "replace: sn\nsn: jones\n-\ndelete: mail\n-\n");
    }

    #[test]
    fn entry_record() {
        let mut entry = Entry::new(Dn::parse("changeNumber=1,cn=changelog").unwrap(), ["top", "changeLogEntry"]);
        entry.put("changeNumber", "1");
        entry.put("changes", "sn: smith\n");
        assert_eq!(
            entry_to_ldif(&entry),
            "dn: changeNumber=1,cn=changelog\nobjectClass: top\nobjectClass: changeLogEntry\n\
             changeNumber: 1\nchanges:: c246IHNtaXRoCg==\n\n"
        );
    }
}

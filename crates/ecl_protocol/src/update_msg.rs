//! Replicated change payloads.
//!
//! An [`UpdateMsg`] is one change applied to a replication domain. The
//! replica log stores messages in their CBOR form ([`UpdateMsg::encode`]).

use crate::csn::Csn;
use crate::dn::{Dn, Rdn};
use crate::entry::Attribute;
use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Fields shared by every kind of update message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgHeader {
    /// CSN assigned to the change.
    pub csn: Csn,
    /// DN of the entry the change applies to.
    pub target_dn: Dn,
    /// `entryUUID` of the target entry.
    #[serde(default)]
    pub entry_uuid: Option<Uuid>,
    /// DN of the user who made the change, when known.
    #[serde(default)]
    pub initiator: Option<String>,
    /// Attributes of the target entry to publish alongside the change.
    #[serde(default)]
    pub ecl_includes: Vec<Attribute>,
}

impl MsgHeader {
    /// Creates a header with no optional fields set.
    pub fn new(csn: Csn, target_dn: Dn) -> Self {
        Self {
            csn,
            target_dn,
            entry_uuid: None,
            initiator: None,
            ecl_includes: Vec::new(),
        }
    }

    /// Sets the target entry UUID.
    #[must_use]
    pub fn with_entry_uuid(mut self, uuid: Uuid) -> Self {
        self.entry_uuid = Some(uuid);
        self
    }

    /// Sets the change initiator.
    #[must_use]
    pub fn with_initiator(mut self, initiator: impl Into<String>) -> Self {
        self.initiator = Some(initiator.into());
        self
    }

    /// Adds an attribute to publish with the change.
    #[must_use]
    pub fn with_ecl_include(mut self, attribute: Attribute) -> Self {
        self.ecl_includes.push(attribute);
        self
    }
}

/// Kind of modification applied to one attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModificationType {
    /// Add values.
    Add,
    /// Remove values, or the whole attribute when none are given.
    Delete,
    /// Replace all values.
    Replace,
    /// Increment an integer value.
    Increment,
}

impl fmt::Display for ModificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModificationType::Add => "add",
            ModificationType::Delete => "delete",
            ModificationType::Replace => "replace",
            ModificationType::Increment => "increment",
        })
    }
}

/// One attribute modification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modification {
    /// What to do.
    pub mod_type: ModificationType,
    /// The attribute and the values involved.
    pub attribute: Attribute,
}

impl Modification {
    /// Creates a modification.
    pub fn new(mod_type: ModificationType, attribute: Attribute) -> Self {
        Self {
            mod_type,
            attribute,
        }
    }
}

/// An entry was added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddMsg {
    /// Common fields.
    pub header: MsgHeader,
    /// Attributes of the new entry, object classes included.
    pub attributes: Vec<Attribute>,
}

/// An entry was modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyMsg {
    /// Common fields.
    pub header: MsgHeader,
    /// Modifications in the order they were applied.
    pub modifications: Vec<Modification>,
}

/// An entry was deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteMsg {
    /// Common fields.
    pub header: MsgHeader,
}

/// An entry was renamed or moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyDnMsg {
    /// Common fields.
    pub header: MsgHeader,
    /// The new RDN, e.g. `uid=new`.
    pub new_rdn: String,
    /// New parent, if the entry moved.
    #[serde(default)]
    pub new_superior: Option<Dn>,
    /// Whether the old RDN value was removed from the entry.
    pub delete_old_rdn: bool,
    /// Operational modifications applied with the rename.
    #[serde(default)]
    pub modifications: Vec<Modification>,
}

/// The change type written to `changeType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    /// `add`
    Add,
    /// `modify`
    Modify,
    /// `delete`
    Delete,
    /// `modrdn`
    ModRdn,
}

impl ChangeType {
    /// LDIF keyword for this change type.
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::Add => "add",
            ChangeType::Modify => "modify",
            ChangeType::Delete => "delete",
            ChangeType::ModRdn => "modrdn",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A replicated change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMsg {
    /// Entry added.
    Add(AddMsg),
    /// Entry modified.
    Modify(ModifyMsg),
    /// Entry deleted.
    Delete(DeleteMsg),
    /// Entry renamed.
    ModifyDn(ModifyDnMsg),
}

impl UpdateMsg {
    /// Builds an add message.
    pub fn add(header: MsgHeader, attributes: Vec<Attribute>) -> Self {
        UpdateMsg::Add(AddMsg { header, attributes })
    }

    /// Builds a modify message.
    pub fn modify(header: MsgHeader, modifications: Vec<Modification>) -> Self {
        UpdateMsg::Modify(ModifyMsg {
            header,
            modifications,
        })
    }

    /// Builds a delete message.
    pub fn delete(header: MsgHeader) -> Self {
        UpdateMsg::Delete(DeleteMsg { header })
    }

    /// Builds a rename message.
    pub fn modify_dn(
        header: MsgHeader,
        new_rdn: impl Into<String>,
        new_superior: Option<Dn>,
        delete_old_rdn: bool,
    ) -> Self {
        UpdateMsg::ModifyDn(ModifyDnMsg {
            header,
            new_rdn: new_rdn.into(),
            new_superior,
            delete_old_rdn,
            modifications: Vec::new(),
        })
    }

    /// Common fields.
    pub fn header(&self) -> &MsgHeader {
        match self {
            UpdateMsg::Add(m) => &m.header,
            UpdateMsg::Modify(m) => &m.header,
            UpdateMsg::Delete(m) => &m.header,
            UpdateMsg::ModifyDn(m) => &m.header,
        }
    }

    /// The change's CSN.
    pub fn csn(&self) -> Csn {
        self.header().csn
    }

    /// DN of the changed entry.
    pub fn target_dn(&self) -> &Dn {
        &self.header().target_dn
    }

    /// The change type.
    pub fn change_type(&self) -> ChangeType {
        match self {
            UpdateMsg::Add(_) => ChangeType::Add,
            UpdateMsg::Modify(_) => ChangeType::Modify,
            UpdateMsg::Delete(_) => ChangeType::Delete,
            UpdateMsg::ModifyDn(_) => ChangeType::ModRdn,
        }
    }

    /// Encodes the message as CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| ProtocolError::Codec(e.to_string()))?;
        Ok(buf)
    }

    /// Decodes a message produced by [`UpdateMsg::encode`].
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        ciborium::from_reader(bytes).map_err(|e| ProtocolError::Codec(e.to_string()))
    }
}

impl ModifyDnMsg {
    /// The DN the entry has after the rename.
    pub fn new_dn(&self) -> ProtocolResult<Dn> {
        let rdn: Dn = self.new_rdn.parse()?;
        let leaf = rdn
            .rdn()
            .cloned()
            .ok_or_else(|| ProtocolError::invalid_dn(&self.new_rdn, "empty RDN"))?;
        let parent = match &self.new_superior {
            Some(superior) => superior.clone(),
            None => self.header.target_dn.parent().unwrap_or_default(),
        };
        Ok(parent.child(Rdn::new(leaf.attr(), leaf.value())))
    }
}

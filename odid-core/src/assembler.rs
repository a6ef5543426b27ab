//! Combine decoded messages into a per-aircraft snapshot.
//!
//! Pure logic, no I/O. A Message Pack produces a fresh snapshot holding
//! exactly what the pack carried. Single messages are upserted into the
//! prior snapshot for the same source: Basic IDs by ID type, Auth pages by
//! page number, everything else last-message-wins.

use serde::Serialize;

use crate::types::{
    AuthPage, BasicIdRecord, IdType, LocationRecord, Message, MessagePack, OperatorIdRecord,
    SelfIdRecord, SystemRecord, PROTOCOL_VERSION,
};

/// Everything currently known about one aircraft.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UasSnapshot {
    /// Version nibble of the last applied message.
    pub protocol_version: u8,
    /// At most one entry per ID type, in arrival order.
    pub basic_ids: Vec<BasicIdRecord>,
    pub location: Option<LocationRecord>,
    /// At most one entry per page number, sorted by page number.
    pub auth_pages: Vec<AuthPage>,
    pub self_id: Option<SelfIdRecord>,
    pub system: Option<SystemRecord>,
    pub operator_id: Option<OperatorIdRecord>,
}

impl Default for UasSnapshot {
    fn default() -> Self {
        UasSnapshot {
            protocol_version: PROTOCOL_VERSION,
            basic_ids: Vec::new(),
            location: None,
            auth_pages: Vec::new(),
            self_id: None,
            system: None,
            operator_id: None,
        }
    }
}

impl UasSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert one message in place.
    pub fn apply(&mut self, message: &Message) {
        match message {
            Message::BasicId(record) => {
                match self.basic_ids.iter_mut().find(|b| b.id_type == record.id_type) {
                    Some(existing) => *existing = record.clone(),
                    None => self.basic_ids.push(record.clone()),
                }
            }
            Message::Location(record) => self.location = Some(record.clone()),
            Message::Auth(page) => {
                match self
                    .auth_pages
                    .binary_search_by_key(&page.page_number, |p| p.page_number)
                {
                    Ok(i) => self.auth_pages[i] = page.clone(),
                    Err(i) => self.auth_pages.insert(i, page.clone()),
                }
            }
            Message::SelfId(record) => self.self_id = Some(record.clone()),
            Message::System(record) => self.system = Some(record.clone()),
            Message::OperatorId(record) => self.operator_id = Some(record.clone()),
        }
    }

    pub fn basic_id(&self, id_type: IdType) -> Option<&BasicIdRecord> {
        self.basic_ids.iter().find(|b| b.id_type == id_type)
    }

    /// First non-empty UAS ID, preferring serial numbers.
    pub fn primary_id(&self) -> Option<&str> {
        self.basic_id(IdType::SerialNumber)
            .filter(|b| !b.uas_id.is_empty())
            .or_else(|| self.basic_ids.iter().find(|b| !b.uas_id.is_empty()))
            .map(|b| b.uas_id.as_str())
    }

    pub fn has_position(&self) -> bool {
        self.location
            .as_ref()
            .is_some_and(|l| l.latitude.is_some() && l.longitude.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.basic_ids.is_empty()
            && self.location.is_none()
            && self.auth_pages.is_empty()
            && self.self_id.is_none()
            && self.system.is_none()
            && self.operator_id.is_none()
    }
}

/// Build a snapshot from exactly the messages carried by a pack.
pub fn assemble_pack(pack: &MessagePack) -> UasSnapshot {
    let mut snapshot = UasSnapshot {
        protocol_version: pack.protocol_version,
        ..UasSnapshot::default()
    };
    for message in &pack.messages {
        snapshot.apply(message);
    }
    snapshot
}

/// Upsert `message` into a copy of `prior` (or an empty snapshot).
///
/// `protocol_version` is the version nibble of the frame that carried
/// `message` and becomes the snapshot's version.
pub fn merge(prior: Option<&UasSnapshot>, message: &Message, protocol_version: u8) -> UasSnapshot {
    let mut snapshot = prior.cloned().unwrap_or_default();
    snapshot.apply(message);
    snapshot.protocol_version = protocol_version;
    snapshot
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

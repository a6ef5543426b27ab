//! Shared types, error enums, and decoded record types for odid-core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Encoded size of every single Open Drone ID message.
pub const MESSAGE_SIZE: usize = 25;
/// Length of the UAS ID and Operator ID string fields.
pub const ID_SIZE: usize = 20;
/// Length of the Self ID description field.
pub const STR_SIZE: usize = 23;
/// Message Pack header: type/version byte, message size, message count.
pub const PACK_HEADER_SIZE: usize = 3;
/// Maximum number of messages carried in one Message Pack.
pub const PACK_MAX_MESSAGES: usize = 9;
/// Authentication data pages per message set (page numbers 0..=15).
pub const AUTH_MAX_PAGES: usize = 16;
/// Protocol version written by the encoders (ASTM F3411-22a).
pub const PROTOCOL_VERSION: u8 = 2;
/// Unix time of the Open Drone ID epoch, 2019-01-01T00:00:00Z.
pub const ODID_EPOCH_UNIX: u64 = 1_546_300_800;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Category of a decode failure, without location details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DecodeErrorKind {
    EmptyInput,
    BufferTooShort,
    InvalidEncoding,
    ValueOutOfRange,
    UnknownMessageType,
}

impl std::fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DecodeErrorKind::EmptyInput => "empty_input",
            DecodeErrorKind::BufferTooShort => "buffer_too_short",
            DecodeErrorKind::InvalidEncoding => "invalid_encoding",
            DecodeErrorKind::ValueOutOfRange => "value_out_of_range",
            DecodeErrorKind::UnknownMessageType => "unknown_message_type",
        };
        f.write_str(name)
    }
}

/// All decode errors produced by odid-core.
///
/// Offsets are relative to the start of the buffer handed to the decoder.
/// Errors raised inside a Message Pack are shifted so they point into the
/// pack buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum DecodeError {
    #[error("empty input buffer")]
    EmptyInput,
    #[error("buffer too short at offset {offset}: need {required} bytes, got {actual}")]
    BufferTooShort {
        offset: usize,
        required: usize,
        actual: usize,
    },
    #[error("invalid UTF-8 in string field at offset {offset}")]
    InvalidEncoding { offset: usize },
    #[error("{field} out of range at offset {offset} (raw value {raw})")]
    ValueOutOfRange {
        offset: usize,
        field: &'static str,
        raw: i64,
    },
    #[error("unknown message type {message_type:#x} at offset {offset}")]
    UnknownMessageType { offset: usize, message_type: u8 },
}

impl DecodeError {
    pub fn kind(&self) -> DecodeErrorKind {
        match self {
            DecodeError::EmptyInput => DecodeErrorKind::EmptyInput,
            DecodeError::BufferTooShort { .. } => DecodeErrorKind::BufferTooShort,
            DecodeError::InvalidEncoding { .. } => DecodeErrorKind::InvalidEncoding,
            DecodeError::ValueOutOfRange { .. } => DecodeErrorKind::ValueOutOfRange,
            DecodeError::UnknownMessageType { .. } => DecodeErrorKind::UnknownMessageType,
        }
    }

    /// Byte offset of the field that failed.
    pub fn offset(&self) -> usize {
        match self {
            DecodeError::EmptyInput => 0,
            DecodeError::BufferTooShort { offset, .. }
            | DecodeError::InvalidEncoding { offset }
            | DecodeError::ValueOutOfRange { offset, .. }
            | DecodeError::UnknownMessageType { offset, .. } => *offset,
        }
    }

    /// Re-base the error onto an enclosing buffer starting `base` bytes earlier.
    pub fn shifted(self, base: usize) -> Self {
        match self {
            DecodeError::EmptyInput => DecodeError::BufferTooShort {
                offset: base,
                required: base + 1,
                actual: base,
            },
            DecodeError::BufferTooShort {
                offset,
                required,
                actual,
            } => DecodeError::BufferTooShort {
                offset: offset + base,
                required: required + base,
                actual: actual + base,
            },
            DecodeError::InvalidEncoding { offset } => DecodeError::InvalidEncoding {
                offset: offset + base,
            },
            DecodeError::ValueOutOfRange { offset, field, raw } => DecodeError::ValueOutOfRange {
                offset: offset + base,
                field,
                raw,
            },
            DecodeError::UnknownMessageType {
                offset,
                message_type,
            } => DecodeError::UnknownMessageType {
                offset: offset + base,
                message_type,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, DecodeError>;

/// Errors produced while building encoded frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("message pack holds 1 to {max} messages, got {count}")]
    PackSize { count: usize, max: usize },
}

// ---------------------------------------------------------------------------
// Message type metadata
// ---------------------------------------------------------------------------

/// Metadata for a message type nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageInfo {
    pub name: &'static str,
    /// Minimum encoded length in bytes.
    pub size: usize,
}

/// Known message type table.
pub const MESSAGE_TABLE: &[(u8, MessageInfo)] = &[
    (
        0x0,
        MessageInfo {
            name: "Basic ID",
            size: MESSAGE_SIZE,
        },
    ),
    (
        0x1,
        MessageInfo {
            name: "Location",
            size: MESSAGE_SIZE,
        },
    ),
    (
        0x2,
        MessageInfo {
            name: "Authentication",
            size: MESSAGE_SIZE,
        },
    ),
    (
        0x3,
        MessageInfo {
            name: "Self ID",
            size: MESSAGE_SIZE,
        },
    ),
    (
        0x4,
        MessageInfo {
            name: "System",
            size: MESSAGE_SIZE,
        },
    ),
    (
        0x5,
        MessageInfo {
            name: "Operator ID",
            size: MESSAGE_SIZE,
        },
    ),
    (
        0xF,
        MessageInfo {
            name: "Message Pack",
            size: PACK_HEADER_SIZE,
        },
    ),
];

/// Look up message metadata. Returns `None` for unassigned nibbles.
pub fn message_info(nibble: u8) -> Option<&'static MessageInfo> {
    MESSAGE_TABLE
        .iter()
        .find(|(n, _)| *n == nibble)
        .map(|(_, info)| info)
}

/// Message type carried in the high nibble of byte 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MessageType {
    BasicId,
    Location,
    Auth,
    SelfId,
    System,
    OperatorId,
    MessagePack,
    Unknown(u8),
}

impl MessageType {
    pub fn from_nibble(nibble: u8) -> Self {
        match nibble & 0x0F {
            0x0 => MessageType::BasicId,
            0x1 => MessageType::Location,
            0x2 => MessageType::Auth,
            0x3 => MessageType::SelfId,
            0x4 => MessageType::System,
            0x5 => MessageType::OperatorId,
            0xF => MessageType::MessagePack,
            other => MessageType::Unknown(other),
        }
    }

    pub fn nibble(self) -> u8 {
        match self {
            MessageType::BasicId => 0x0,
            MessageType::Location => 0x1,
            MessageType::Auth => 0x2,
            MessageType::SelfId => 0x3,
            MessageType::System => 0x4,
            MessageType::OperatorId => 0x5,
            MessageType::MessagePack => 0xF,
            MessageType::Unknown(n) => n & 0x0F,
        }
    }

    pub fn name(self) -> &'static str {
        message_info(self.nibble())
            .map(|info| info.name)
            .unwrap_or("Unknown")
    }

    /// Minimum encoded length. Unassigned types fall back to one message.
    pub fn size(self) -> usize {
        message_info(self.nibble()).map_or(MESSAGE_SIZE, |info| info.size)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageType::Unknown(n) => write!(f, "Unknown({n:#x})"),
            other => f.write_str(other.name()),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire enums
// ---------------------------------------------------------------------------

/// Declare a fieldless enum with a fixed raw value per variant.
/// Reserved raw values map to `None`.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $variant:ident = $raw:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        pub enum $name {
            $( $variant ),+
        }

        impl $name {
            pub fn from_raw(raw: u8) -> Option<Self> {
                match raw {
                    $( $raw => Some($name::$variant), )+
                    _ => None,
                }
            }

            pub fn raw(self) -> u8 {
                match self {
                    $( $name::$variant => $raw, )+
                }
            }
        }
    };
}

wire_enum! {
    /// Unmanned aircraft type (Basic ID byte 1, low nibble).
    pub enum UaType {
        None = 0,
        Aeroplane = 1,
        HelicopterOrMultirotor = 2,
        Gyroplane = 3,
        HybridLift = 4,
        Ornithopter = 5,
        Glider = 6,
        Kite = 7,
        FreeBalloon = 8,
        CaptiveBalloon = 9,
        Airship = 10,
        FreeFallParachute = 11,
        Rocket = 12,
        TetheredPoweredAircraft = 13,
        GroundObstacle = 14,
        Other = 15,
    }
}

wire_enum! {
    /// Kind of identifier carried by a Basic ID message.
    pub enum IdType {
        None = 0,
        SerialNumber = 1,
        CaaRegistrationId = 2,
        UtmAssignedUuid = 3,
        SpecificSessionId = 4,
    }
}

wire_enum! {
    pub enum OperationalStatus {
        Undeclared = 0,
        Ground = 1,
        Airborne = 2,
        Emergency = 3,
        RemoteIdSystemFailure = 4,
    }
}

wire_enum! {
    pub enum HeightType {
        AboveTakeoff = 0,
        AboveGround = 1,
    }
}

wire_enum! {
    pub enum HorizontalAccuracy {
        Unknown = 0,
        Nm10 = 1,
        Nm4 = 2,
        Nm2 = 3,
        Nm1 = 4,
        Nm05 = 5,
        Nm03 = 6,
        Nm01 = 7,
        Nm005 = 8,
        Meters30 = 9,
        Meters10 = 10,
        Meters3 = 11,
        Meters1 = 12,
    }
}

wire_enum! {
    /// Used for both geodetic and barometric altitude accuracy.
    pub enum VerticalAccuracy {
        Unknown = 0,
        Meters150 = 1,
        Meters45 = 2,
        Meters25 = 3,
        Meters10 = 4,
        Meters3 = 5,
        Meters1 = 6,
    }
}

wire_enum! {
    pub enum SpeedAccuracy {
        Unknown = 0,
        Mps10 = 1,
        Mps3 = 2,
        Mps1 = 3,
        Mps03 = 4,
    }
}

wire_enum! {
    /// Where the operator position in a System message comes from.
    pub enum OperatorLocationType {
        Takeoff = 0,
        LiveGnss = 1,
        Fixed = 2,
    }
}

wire_enum! {
    pub enum ClassificationType {
        Undeclared = 0,
        EuropeanUnion = 1,
    }
}

wire_enum! {
    pub enum EuCategory {
        Undeclared = 0,
        Open = 1,
        Specific = 2,
        Certified = 3,
    }
}

wire_enum! {
    pub enum EuClass {
        Undeclared = 0,
        Class0 = 1,
        Class1 = 2,
        Class2 = 3,
        Class3 = 4,
        Class4 = 5,
        Class5 = 6,
        Class6 = 7,
    }
}

impl HorizontalAccuracy {
    /// Upper bound of the horizontal error in meters. `None` when unknown.
    pub fn meters(self) -> Option<f32> {
        match self {
            HorizontalAccuracy::Unknown => None,
            HorizontalAccuracy::Nm10 => Some(18520.0),
            HorizontalAccuracy::Nm4 => Some(7408.0),
            HorizontalAccuracy::Nm2 => Some(3704.0),
            HorizontalAccuracy::Nm1 => Some(1852.0),
            HorizontalAccuracy::Nm05 => Some(926.0),
            HorizontalAccuracy::Nm03 => Some(555.6),
            HorizontalAccuracy::Nm01 => Some(185.2),
            HorizontalAccuracy::Nm005 => Some(92.6),
            HorizontalAccuracy::Meters30 => Some(30.0),
            HorizontalAccuracy::Meters10 => Some(10.0),
            HorizontalAccuracy::Meters3 => Some(3.0),
            HorizontalAccuracy::Meters1 => Some(1.0),
        }
    }

    /// Smallest category that still covers `meters`.
    pub fn from_meters(meters: f32) -> Self {
        if meters >= 18520.0 {
            HorizontalAccuracy::Unknown
        } else if meters > 7408.0 {
            HorizontalAccuracy::Nm10
        } else if meters > 3704.0 {
            HorizontalAccuracy::Nm4
        } else if meters > 1852.0 {
            HorizontalAccuracy::Nm2
        } else if meters > 926.0 {
            HorizontalAccuracy::Nm1
        } else if meters > 555.6 {
            HorizontalAccuracy::Nm05
        } else if meters > 185.2 {
            HorizontalAccuracy::Nm03
        } else if meters > 92.6 {
            HorizontalAccuracy::Nm01
        } else if meters > 30.0 {
            HorizontalAccuracy::Nm005
        } else if meters > 10.0 {
            HorizontalAccuracy::Meters30
        } else if meters > 3.0 {
            HorizontalAccuracy::Meters10
        } else if meters > 1.0 {
            HorizontalAccuracy::Meters3
        } else if meters > 0.0 {
            HorizontalAccuracy::Meters1
        } else {
            HorizontalAccuracy::Unknown
        }
    }
}

impl VerticalAccuracy {
    pub fn meters(self) -> Option<f32> {
        match self {
            VerticalAccuracy::Unknown => None,
            VerticalAccuracy::Meters150 => Some(150.0),
            VerticalAccuracy::Meters45 => Some(45.0),
            VerticalAccuracy::Meters25 => Some(25.0),
            VerticalAccuracy::Meters10 => Some(10.0),
            VerticalAccuracy::Meters3 => Some(3.0),
            VerticalAccuracy::Meters1 => Some(1.0),
        }
    }

    pub fn from_meters(meters: f32) -> Self {
        if meters >= 150.0 {
            VerticalAccuracy::Unknown
        } else if meters > 45.0 {
            VerticalAccuracy::Meters150
        } else if meters > 25.0 {
            VerticalAccuracy::Meters45
        } else if meters > 10.0 {
            VerticalAccuracy::Meters25
        } else if meters > 3.0 {
            VerticalAccuracy::Meters10
        } else if meters > 1.0 {
            VerticalAccuracy::Meters3
        } else if meters > 0.0 {
            VerticalAccuracy::Meters1
        } else {
            VerticalAccuracy::Unknown
        }
    }
}

impl SpeedAccuracy {
    /// Upper bound of the speed error in m/s.
    pub fn meters_per_second(self) -> Option<f32> {
        match self {
            SpeedAccuracy::Unknown => None,
            SpeedAccuracy::Mps10 => Some(10.0),
            SpeedAccuracy::Mps3 => Some(3.0),
            SpeedAccuracy::Mps1 => Some(1.0),
            SpeedAccuracy::Mps03 => Some(0.3),
        }
    }

    pub fn from_meters_per_second(mps: f32) -> Self {
        if mps >= 10.0 {
            SpeedAccuracy::Unknown
        } else if mps > 3.0 {
            SpeedAccuracy::Mps10
        } else if mps > 1.0 {
            SpeedAccuracy::Mps3
        } else if mps > 0.3 {
            SpeedAccuracy::Mps1
        } else if mps > 0.0 {
            SpeedAccuracy::Mps03
        } else {
            SpeedAccuracy::Unknown
        }
    }
}

/// Authentication scheme (Auth byte 1, high nibble).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AuthType {
    None,
    UasIdSignature,
    OperatorIdSignature,
    MessageSetSignature,
    NetworkRemoteId,
    SpecificAuthentication,
    /// 0xA..=0xF
    PrivateUse(u8),
}

impl AuthType {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(AuthType::None),
            1 => Some(AuthType::UasIdSignature),
            2 => Some(AuthType::OperatorIdSignature),
            3 => Some(AuthType::MessageSetSignature),
            4 => Some(AuthType::NetworkRemoteId),
            5 => Some(AuthType::SpecificAuthentication),
            0xA..=0xF => Some(AuthType::PrivateUse(raw)),
            _ => None,
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            AuthType::None => 0,
            AuthType::UasIdSignature => 1,
            AuthType::OperatorIdSignature => 2,
            AuthType::MessageSetSignature => 3,
            AuthType::NetworkRemoteId => 4,
            AuthType::SpecificAuthentication => 5,
            AuthType::PrivateUse(raw) => raw,
        }
    }
}

/// Meaning of the Self ID description text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DescriptionType {
    Text,
    Emergency,
    ExtendedStatus,
    /// 201..=255
    PrivateUse(u8),
}

impl DescriptionType {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(DescriptionType::Text),
            1 => Some(DescriptionType::Emergency),
            2 => Some(DescriptionType::ExtendedStatus),
            201..=255 => Some(DescriptionType::PrivateUse(raw)),
            _ => None,
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            DescriptionType::Text => 0,
            DescriptionType::Emergency => 1,
            DescriptionType::ExtendedStatus => 2,
            DescriptionType::PrivateUse(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OperatorIdType {
    Caa,
    /// 201..=255
    PrivateUse(u8),
}

impl OperatorIdType {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(OperatorIdType::Caa),
            201..=255 => Some(OperatorIdType::PrivateUse(raw)),
            _ => None,
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            OperatorIdType::Caa => 0,
            OperatorIdType::PrivateUse(raw) => raw,
        }
    }
}

/// Payload framing handed over by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Framing {
    /// Payload starts directly with an Open Drone ID header byte.
    #[default]
    #[serde(rename = "bare")]
    Bare,
    /// Bluetooth service data: application code and message counter first.
    #[serde(rename = "ble")]
    BleServiceData,
    /// Complete Wi-Fi NAN service discovery action frame, 802.11 header included.
    #[serde(rename = "wifi-nan")]
    WifiNan,
}

// ---------------------------------------------------------------------------
// Decoded records
// ---------------------------------------------------------------------------

/// Message type 0: aircraft identification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BasicIdRecord {
    pub ua_type: UaType,
    pub id_type: IdType,
    pub uas_id: String,
}

/// Message type 1: position and vector.
///
/// `None` marks a field the aircraft reported as unknown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationRecord {
    pub status: OperationalStatus,
    /// Track direction, degrees clockwise from true north.
    pub direction: Option<f32>,
    /// m/s
    pub speed_horizontal: Option<f32>,
    /// m/s, positive up
    pub speed_vertical: Option<f32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// meters, reference 29.92 inHg
    pub altitude_baro: Option<f32>,
    /// meters, WGS84 height above ellipsoid
    pub altitude_geo: Option<f32>,
    pub height_type: HeightType,
    pub height: Option<f32>,
    pub horizontal_accuracy: HorizontalAccuracy,
    pub vertical_accuracy: VerticalAccuracy,
    pub baro_accuracy: VerticalAccuracy,
    pub speed_accuracy: SpeedAccuracy,
    /// Seconds after the full hour.
    pub timestamp: Option<f32>,
    /// Seconds.
    pub timestamp_accuracy: Option<f32>,
}

/// Message type 2: one page of authentication data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthPage {
    pub auth_type: AuthType,
    pub page_number: u8,
    /// Page 0 only.
    pub last_page_index: Option<u8>,
    /// Page 0 only: total auth data length in bytes.
    pub length: Option<u8>,
    /// Page 0 only: seconds since the Open Drone ID epoch.
    pub timestamp: Option<u32>,
    pub data: Vec<u8>,
}

/// Message type 3: free-text description.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelfIdRecord {
    pub description_type: DescriptionType,
    pub description: String,
}

/// EU category and class, present when the classification type is EU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EuClassification {
    pub category: EuCategory,
    pub class: EuClass,
}

/// Message type 4: operator position and area of operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemRecord {
    pub operator_location_type: OperatorLocationType,
    pub classification: Option<EuClassification>,
    pub operator_latitude: Option<f64>,
    pub operator_longitude: Option<f64>,
    pub area_count: u16,
    /// meters
    pub area_radius: u16,
    pub area_ceiling: Option<f32>,
    pub area_floor: Option<f32>,
    pub operator_altitude_geo: Option<f32>,
    /// Seconds since the Open Drone ID epoch.
    pub timestamp: u32,
}

impl SystemRecord {
    pub fn unix_timestamp(&self) -> u64 {
        ODID_EPOCH_UNIX + self.timestamp as u64
    }
}

/// Message type 5: operator registration identifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperatorIdRecord {
    pub operator_id_type: OperatorIdType,
    pub operator_id: String,
}

/// Union type for all single (non-pack) messages.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Message {
    BasicId(BasicIdRecord),
    Location(LocationRecord),
    Auth(AuthPage),
    SelfId(SelfIdRecord),
    System(SystemRecord),
    OperatorId(OperatorIdRecord),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::BasicId(_) => MessageType::BasicId,
            Message::Location(_) => MessageType::Location,
            Message::Auth(_) => MessageType::Auth,
            Message::SelfId(_) => MessageType::SelfId,
            Message::System(_) => MessageType::System,
            Message::OperatorId(_) => MessageType::OperatorId,
        }
    }
}

/// Sub-message of a pack that could not be decoded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedMessage {
    /// Position inside the pack, starting at 0.
    pub index: usize,
    pub error: DecodeError,
}

/// Message type 15: several messages in one transmission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessagePack {
    pub protocol_version: u8,
    pub messages: Vec<Message>,
    pub skipped: Vec<SkippedMessage>,
}

// ---------------------------------------------------------------------------
// Hex utilities
// ---------------------------------------------------------------------------

/// Decode a hex string into bytes. Case-insensitive, must be even length.
pub fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    let hex = hex.trim();
    if hex.len() % 2 != 0 {
        return None;
    }
    let mut bytes = Vec::with_capacity(hex.len() / 2);
    for chunk in hex.as_bytes().chunks(2) {
        let high = hex_digit(chunk[0])?;
        let low = hex_digit(chunk[1])?;
        bytes.push((high << 4) | low);
    }
    Some(bytes)
}

/// Encode bytes as uppercase hex string.
pub fn hex_encode(data: &[u8]) -> String {
    let mut s = String::with_capacity(data.len() * 2);
    for &b in data {
        s.push(HEX_CHARS[(b >> 4) as usize] as char);
        s.push(HEX_CHARS[(b & 0x0F) as usize] as char);
    }
    s
}

const HEX_CHARS: &[u8; 16] = b"0123456789ABCDEF";

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_nibbles() {
        for nibble in 0..16u8 {
            assert_eq!(MessageType::from_nibble(nibble).nibble(), nibble);
        }
        assert_eq!(MessageType::from_nibble(0x7), MessageType::Unknown(7));
        assert_eq!(MessageType::from_nibble(0xF), MessageType::MessagePack);
    }

    #[test]
    fn test_message_info() {
        assert_eq!(message_info(1).unwrap().name, "Location");
        assert_eq!(message_info(1).unwrap().size, MESSAGE_SIZE);
        assert_eq!(MessageType::Location.size(), MESSAGE_SIZE);
        assert_eq!(MessageType::MessagePack.size(), PACK_HEADER_SIZE);
        assert_eq!(MessageType::Unknown(9).size(), MESSAGE_SIZE);
        assert!(message_info(9).is_none());
        assert_eq!(MessageType::Unknown(9).to_string(), "Unknown(0x9)");
    }

    #[test]
    fn test_wire_enum_reserved_values() {
        assert_eq!(IdType::from_raw(1), Some(IdType::SerialNumber));
        assert_eq!(IdType::from_raw(5), None);
        assert_eq!(OperationalStatus::from_raw(4), Some(OperationalStatus::RemoteIdSystemFailure));
        assert_eq!(OperationalStatus::from_raw(9), None);
        for raw in 0..16u8 {
            assert_eq!(UaType::from_raw(raw).map(UaType::raw), Some(raw));
        }
    }

    #[test]
    fn test_private_use_ranges() {
        assert_eq!(AuthType::from_raw(7), None);
        assert_eq!(AuthType::from_raw(0xB), Some(AuthType::PrivateUse(0xB)));
        assert_eq!(DescriptionType::from_raw(100), None);
        assert_eq!(DescriptionType::from_raw(250).map(DescriptionType::raw), Some(250));
        assert_eq!(OperatorIdType::from_raw(1), None);
        assert_eq!(OperatorIdType::from_raw(0), Some(OperatorIdType::Caa));
    }

    #[test]
    fn test_accuracy_tables() {
        assert_eq!(HorizontalAccuracy::Meters10.meters(), Some(10.0));
        assert_eq!(HorizontalAccuracy::Unknown.meters(), None);
        assert_eq!(HorizontalAccuracy::from_meters(5.0), HorizontalAccuracy::Meters10);
        assert_eq!(HorizontalAccuracy::from_meters(20000.0), HorizontalAccuracy::Unknown);
        assert_eq!(VerticalAccuracy::from_meters(2.0), VerticalAccuracy::Meters3);
        assert_eq!(VerticalAccuracy::Meters45.meters(), Some(45.0));
        assert_eq!(SpeedAccuracy::from_meters_per_second(0.5), SpeedAccuracy::Mps1);
        assert_eq!(SpeedAccuracy::from_meters_per_second(0.0), SpeedAccuracy::Unknown);
    }

    #[test]
    fn test_error_kind_and_offset() {
        let err = DecodeError::InvalidEncoding { offset: 4 };
        assert_eq!(err.kind(), DecodeErrorKind::InvalidEncoding);
        assert_eq!(err.offset(), 4);
        let shifted = err.shifted(28);
        assert_eq!(shifted.offset(), 32);
        assert_eq!(DecodeError::EmptyInput.offset(), 0);
    }

    #[test]
    fn test_error_display() {
        let err = DecodeError::BufferTooShort {
            offset: 0,
            required: 25,
            actual: 10,
        };
        assert_eq!(
            err.to_string(),
            "buffer too short at offset 0: need 25 bytes, got 10"
        );
    }

    #[test]
    fn test_system_unix_timestamp() {
        let system = SystemRecord {
            operator_location_type: OperatorLocationType::Takeoff,
            classification: None,
            operator_latitude: None,
            operator_longitude: None,
            area_count: 1,
            area_radius: 0,
            area_ceiling: None,
            area_floor: None,
            operator_altitude_geo: None,
            timestamp: 100,
        };
        assert_eq!(system.unix_timestamp(), 1_546_300_900);
    }

    #[test]
    fn test_hex_decode() {
        assert_eq!(hex_decode("0D12ff"), Some(vec![0x0D, 0x12, 0xFF]));
        assert_eq!(hex_decode("abc"), None);
        assert_eq!(hex_decode("ZZ"), None);
    }

    #[test]
    fn test_hex_encode() {
        assert_eq!(hex_encode(&[0x0D, 0x12, 0xFF]), "0D12FF");
    }
}

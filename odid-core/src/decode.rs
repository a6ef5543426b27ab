//! Decode Open Drone ID messages from their 25-byte wire form.
//!
//! Each decoder validates length first, then the type nibble, then extracts
//! fields at their fixed offsets. Malformed input is reported as a
//! `DecodeError` carrying the failing byte offset, never as a panic.
//!
//! Wire layout (byte 0 is always `type << 4 | version`):
//! - Basic ID:     1 id/ua type, 2..22 UAS ID
//! - Location:     1 flags, 2 direction, 3 speed, 4 vspeed, 5..9 lat, 9..13 lon,
//!                 13..15 baro alt, 15..17 geo alt, 17..19 height,
//!                 19..21 accuracies, 21..23 timestamp, 23 ts accuracy
//! - Auth:         1 type/page, page 0: 2 last page, 3 length, 4..8 ts, 8..25 data
//! - Self ID:      1 description type, 2..25 description
//! - System:       1 flags, 2..6 lat, 6..10 lon, 10..12 area count, 12 radius,
//!                 13..15 ceiling, 15..17 floor, 17 category/class,
//!                 18..20 operator alt, 20..24 timestamp
//! - Operator ID:  1 id type, 2..22 operator ID
//! - Message Pack: 1 message size, 2 count, then `count` messages

use crate::codec::{
    decode_altitude, decode_area_radius, decode_direction, decode_latitude, decode_longitude,
    decode_speed_horizontal, decode_speed_vertical, decode_timestamp, decode_timestamp_accuracy,
    field, read_i32_le, read_i8, read_string, read_u16_le, read_u32_le, read_u8, require_len,
};
use crate::frame::classify;
use crate::types::{
    AuthPage, AuthType, BasicIdRecord, ClassificationType, DecodeError, DescriptionType,
    EuCategory, EuClass, EuClassification, HeightType, HorizontalAccuracy, IdType,
    LocationRecord, Message, MessagePack, MessageType, OperationalStatus, OperatorIdRecord,
    OperatorIdType, OperatorLocationType, Result, SelfIdRecord, SkippedMessage, SpeedAccuracy,
    SystemRecord, UaType, VerticalAccuracy, AUTH_MAX_PAGES, ID_SIZE, MESSAGE_SIZE,
    PACK_HEADER_SIZE, PACK_MAX_MESSAGES, STR_SIZE,
};

const AUTH_PAGE0_DATA: usize = 17;
const AUTH_PAGE_DATA: usize = 23;
const AUTH_MAX_PAGE_INDEX: u8 = (AUTH_MAX_PAGES - 1) as u8;

fn reserved(offset: usize, field: &'static str, raw: u8) -> DecodeError {
    DecodeError::ValueOutOfRange {
        offset,
        field,
        raw: raw as i64,
    }
}

/// Map a raw enum value, rejecting reserved values.
fn wire<T>(value: Option<T>, offset: usize, field: &'static str, raw: u8) -> Result<T> {
    value.ok_or_else(|| reserved(offset, field, raw))
}

/// Check length and type nibble shared by all single-message decoders.
fn check_header(buf: &[u8], expected: MessageType) -> Result<()> {
    require_len(buf, expected.size())?;
    let header = classify(buf)?;
    if header.message_type != expected {
        return Err(reserved(0, "message_type", buf[0] >> 4));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Single messages
// ---------------------------------------------------------------------------

/// Type 0: UA type, ID type, UAS ID.
pub fn decode_basic_id(buf: &[u8]) -> Result<BasicIdRecord> {
    check_header(buf, MessageType::BasicId)?;
    let types = read_u8(buf, 1)?;
    let id_type = wire(IdType::from_raw(types >> 4), 1, "id_type", types >> 4)?;
    let ua_type = wire(UaType::from_raw(types & 0x0F), 1, "ua_type", types & 0x0F)?;
    Ok(BasicIdRecord {
        ua_type,
        id_type,
        uas_id: read_string(buf, 2, ID_SIZE)?,
    })
}

/// Type 1: position, speed and accuracy.
pub fn decode_location(buf: &[u8]) -> Result<LocationRecord> {
    check_header(buf, MessageType::Location)?;
    let flags = read_u8(buf, 1)?;
    let status = wire(
        OperationalStatus::from_raw(flags >> 4),
        1,
        "status",
        flags >> 4,
    )?;
    let height_type = wire(
        HeightType::from_raw((flags >> 2) & 0x01),
        1,
        "height_type",
        (flags >> 2) & 0x01,
    )?;
    let east_west = flags & 0x02 != 0;
    let multiplier = flags & 0x01 != 0;

    let accuracy = read_u8(buf, 19)?;
    let vertical = accuracy >> 4;
    let horizontal = accuracy & 0x0F;
    let speed_accuracy = read_u8(buf, 20)?;
    let baro = speed_accuracy >> 4;
    let speed = speed_accuracy & 0x0F;

    Ok(LocationRecord {
        status,
        direction: decode_direction(read_u8(buf, 2)?, east_west, 2)?,
        speed_horizontal: decode_speed_horizontal(read_u8(buf, 3)?, multiplier),
        speed_vertical: decode_speed_vertical(read_i8(buf, 4)?, 4)?,
        latitude: decode_latitude(read_i32_le(buf, 5)?, 5)?,
        longitude: decode_longitude(read_i32_le(buf, 9)?, 9)?,
        altitude_baro: decode_altitude(read_u16_le(buf, 13)?),
        altitude_geo: decode_altitude(read_u16_le(buf, 15)?),
        height_type,
        height: decode_altitude(read_u16_le(buf, 17)?),
        horizontal_accuracy: wire(
            HorizontalAccuracy::from_raw(horizontal),
            19,
            "horizontal_accuracy",
            horizontal,
        )?,
        vertical_accuracy: wire(
            VerticalAccuracy::from_raw(vertical),
            19,
            "vertical_accuracy",
            vertical,
        )?,
        baro_accuracy: wire(VerticalAccuracy::from_raw(baro), 20, "baro_accuracy", baro)?,
        speed_accuracy: wire(SpeedAccuracy::from_raw(speed), 20, "speed_accuracy", speed)?,
        timestamp: decode_timestamp(read_u16_le(buf, 21)?, 21)?,
        timestamp_accuracy: decode_timestamp_accuracy(read_u8(buf, 23)?),
    })
}

/// Type 2: one authentication data page.
pub fn decode_auth(buf: &[u8]) -> Result<AuthPage> {
    check_header(buf, MessageType::Auth)?;
    let byte = read_u8(buf, 1)?;
    let auth_type = wire(AuthType::from_raw(byte >> 4), 1, "auth_type", byte >> 4)?;
    let page_number = byte & 0x0F;

    if page_number == 0 {
        let last_page_index = read_u8(buf, 2)?;
        if last_page_index > AUTH_MAX_PAGE_INDEX {
            return Err(reserved(2, "last_page_index", last_page_index));
        }
        Ok(AuthPage {
            auth_type,
            page_number,
            last_page_index: Some(last_page_index),
            length: Some(read_u8(buf, 3)?),
            timestamp: Some(read_u32_le(buf, 4)?),
            data: field(buf, 8, AUTH_PAGE0_DATA)?.to_vec(),
        })
    } else {
        Ok(AuthPage {
            auth_type,
            page_number,
            last_page_index: None,
            length: None,
            timestamp: None,
            data: field(buf, 2, AUTH_PAGE_DATA)?.to_vec(),
        })
    }
}

/// Type 3: free-text description.
pub fn decode_self_id(buf: &[u8]) -> Result<SelfIdRecord> {
    check_header(buf, MessageType::SelfId)?;
    let raw = read_u8(buf, 1)?;
    Ok(SelfIdRecord {
        description_type: wire(DescriptionType::from_raw(raw), 1, "description_type", raw)?,
        description: read_string(buf, 2, STR_SIZE)?,
    })
}

/// Type 4: operator location, area and classification.
pub fn decode_system(buf: &[u8]) -> Result<SystemRecord> {
    check_header(buf, MessageType::System)?;
    let flags = read_u8(buf, 1)?;
    let location_raw = flags & 0x03;
    let classification_raw = (flags >> 2) & 0x07;
    let operator_location_type = wire(
        OperatorLocationType::from_raw(location_raw),
        1,
        "operator_location_type",
        location_raw,
    )?;
    let classification_type = wire(
        ClassificationType::from_raw(classification_raw),
        1,
        "classification_type",
        classification_raw,
    )?;

    let classification = match classification_type {
        ClassificationType::Undeclared => None,
        ClassificationType::EuropeanUnion => {
            let byte = read_u8(buf, 17)?;
            Some(EuClassification {
                category: wire(EuCategory::from_raw(byte >> 4), 17, "eu_category", byte >> 4)?,
                class: wire(EuClass::from_raw(byte & 0x0F), 17, "eu_class", byte & 0x0F)?,
            })
        }
    };

    Ok(SystemRecord {
        operator_location_type,
        classification,
        operator_latitude: decode_latitude(read_i32_le(buf, 2)?, 2)?,
        operator_longitude: decode_longitude(read_i32_le(buf, 6)?, 6)?,
        area_count: read_u16_le(buf, 10)?,
        area_radius: decode_area_radius(read_u8(buf, 12)?),
        area_ceiling: decode_altitude(read_u16_le(buf, 13)?),
        area_floor: decode_altitude(read_u16_le(buf, 15)?),
        operator_altitude_geo: decode_altitude(read_u16_le(buf, 18)?),
        timestamp: read_u32_le(buf, 20)?,
    })
}

/// Type 5: operator registration ID.
pub fn decode_operator_id(buf: &[u8]) -> Result<OperatorIdRecord> {
    check_header(buf, MessageType::OperatorId)?;
    let raw = read_u8(buf, 1)?;
    Ok(OperatorIdRecord {
        operator_id_type: wire(OperatorIdType::from_raw(raw), 1, "operator_id_type", raw)?,
        operator_id: read_string(buf, 2, ID_SIZE)?,
    })
}

/// Decode any single message, dispatching on the type nibble.
///
/// Message Packs are rejected here; use `decode_message_pack`.
pub fn decode_message(buf: &[u8]) -> Result<Message> {
    let header = classify(buf)?;
    match header.message_type {
        MessageType::BasicId => decode_basic_id(buf).map(Message::BasicId),
        MessageType::Location => decode_location(buf).map(Message::Location),
        MessageType::Auth => decode_auth(buf).map(Message::Auth),
        MessageType::SelfId => decode_self_id(buf).map(Message::SelfId),
        MessageType::System => decode_system(buf).map(Message::System),
        MessageType::OperatorId => decode_operator_id(buf).map(Message::OperatorId),
        MessageType::MessagePack => Err(reserved(0, "message_type", MessageType::MessagePack.nibble())),
        MessageType::Unknown(message_type) => Err(DecodeError::UnknownMessageType {
            offset: 0,
            message_type,
        }),
    }
}

// ---------------------------------------------------------------------------
// Message Pack
// ---------------------------------------------------------------------------

/// Type 15: header, message size, count, then `count` 25-byte messages.
///
/// Header problems fail the whole pack. A sub-message that fails to decode
/// is recorded in `skipped` with its error offset relative to the pack, and
/// the remaining sub-messages are still decoded.
pub fn decode_message_pack(buf: &[u8]) -> Result<MessagePack> {
    let header = classify(buf)?;
    if header.message_type != MessageType::MessagePack {
        return Err(reserved(0, "message_type", buf[0] >> 4));
    }
    let size = read_u8(buf, 1)?;
    if size as usize != MESSAGE_SIZE {
        return Err(reserved(1, "message_size", size));
    }
    let count = read_u8(buf, 2)?;
    if count == 0 || count as usize > PACK_MAX_MESSAGES {
        return Err(reserved(2, "message_count", count));
    }
    let required = PACK_HEADER_SIZE + MESSAGE_SIZE * count as usize;
    if buf.len() < required {
        return Err(DecodeError::BufferTooShort {
            offset: PACK_HEADER_SIZE,
            required,
            actual: buf.len(),
        });
    }

    let mut messages = Vec::with_capacity(count as usize);
    let mut skipped = Vec::new();
    for index in 0..count as usize {
        let base = PACK_HEADER_SIZE + index * MESSAGE_SIZE;
        let sub = &buf[base..base + MESSAGE_SIZE];
        match decode_message(sub) {
            Ok(message) => messages.push(message),
            Err(error) => skipped.push(SkippedMessage {
                index,
                error: error.shifted(base),
            }),
        }
    }

    Ok(MessagePack {
        protocol_version: header.protocol_version,
        messages,
        skipped,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

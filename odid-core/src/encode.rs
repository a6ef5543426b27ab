//! Encode records back into 25-byte Open Drone ID messages.
//!
//! Values outside the representable range are clamped; `None` fields are
//! written as their unknown sentinel. Reserved bytes are zero.

use crate::codec::{
    encode_altitude, encode_area_radius, encode_direction, encode_latitude, encode_longitude,
    encode_speed_horizontal, encode_speed_vertical, encode_timestamp, encode_timestamp_accuracy,
    write_string,
};
use crate::types::{
    AuthPage, BasicIdRecord, ClassificationType, EncodeError, LocationRecord, Message,
    MessageType, OperatorIdRecord, SelfIdRecord, SystemRecord, ID_SIZE, MESSAGE_SIZE,
    PACK_HEADER_SIZE, PACK_MAX_MESSAGES, PROTOCOL_VERSION, STR_SIZE,
};

pub type Encoded = [u8; MESSAGE_SIZE];

fn header(message_type: MessageType) -> u8 {
    (message_type.nibble() << 4) | PROTOCOL_VERSION
}

fn new_message(message_type: MessageType) -> Encoded {
    let mut buf = [0u8; MESSAGE_SIZE];
    buf[0] = header(message_type);
    buf
}

fn put_u16(buf: &mut Encoded, offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_i32(buf: &mut Encoded, offset: usize, value: i32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut Encoded, offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn encode_basic_id(record: &BasicIdRecord) -> Encoded {
    let mut buf = new_message(MessageType::BasicId);
    buf[1] = (record.id_type.raw() << 4) | (record.ua_type.raw() & 0x0F);
    write_string(&mut buf, 2, ID_SIZE, &record.uas_id);
    buf
}

pub fn encode_location(record: &LocationRecord) -> Encoded {
    let mut buf = new_message(MessageType::Location);
    let (direction, east_west) = encode_direction(record.direction);
    let (speed, multiplier) = encode_speed_horizontal(record.speed_horizontal);

    buf[1] = (record.status.raw() << 4)
        | (record.height_type.raw() << 2)
        | ((east_west as u8) << 1)
        | multiplier as u8;
    buf[2] = direction;
    buf[3] = speed;
    buf[4] = encode_speed_vertical(record.speed_vertical) as u8;
    put_i32(&mut buf, 5, encode_latitude(record.latitude));
    put_i32(&mut buf, 9, encode_longitude(record.longitude));
    put_u16(&mut buf, 13, encode_altitude(record.altitude_baro));
    put_u16(&mut buf, 15, encode_altitude(record.altitude_geo));
    put_u16(&mut buf, 17, encode_altitude(record.height));
    buf[19] = (record.vertical_accuracy.raw() << 4) | record.horizontal_accuracy.raw();
    buf[20] = (record.baro_accuracy.raw() << 4) | record.speed_accuracy.raw();
    put_u16(&mut buf, 21, encode_timestamp(record.timestamp));
    buf[23] = encode_timestamp_accuracy(record.timestamp_accuracy);
    buf
}

/// Page 0 carries the page count, length and timestamp; data beyond the
/// page capacity is dropped.
pub fn encode_auth(page: &AuthPage) -> Encoded {
    let mut buf = new_message(MessageType::Auth);
    buf[1] = (page.auth_type.raw() << 4) | (page.page_number & 0x0F);
    let data_start = if page.page_number == 0 {
        buf[2] = page.last_page_index.unwrap_or(0).min(15);
        buf[3] = page.length.unwrap_or(page.data.len() as u8);
        put_u32(&mut buf, 4, page.timestamp.unwrap_or(0));
        8
    } else {
        2
    };
    let len = page.data.len().min(MESSAGE_SIZE - data_start);
    buf[data_start..data_start + len].copy_from_slice(&page.data[..len]);
    buf
}

pub fn encode_self_id(record: &SelfIdRecord) -> Encoded {
    let mut buf = new_message(MessageType::SelfId);
    buf[1] = record.description_type.raw();
    write_string(&mut buf, 2, STR_SIZE, &record.description);
    buf
}

pub fn encode_system(record: &SystemRecord) -> Encoded {
    let mut buf = new_message(MessageType::System);
    let classification_type = match record.classification {
        Some(_) => ClassificationType::EuropeanUnion,
        None => ClassificationType::Undeclared,
    };
    buf[1] = (classification_type.raw() << 2) | record.operator_location_type.raw();
    put_i32(&mut buf, 2, encode_latitude(record.operator_latitude));
    put_i32(&mut buf, 6, encode_longitude(record.operator_longitude));
    put_u16(&mut buf, 10, record.area_count);
    buf[12] = encode_area_radius(record.area_radius);
    put_u16(&mut buf, 13, encode_altitude(record.area_ceiling));
    put_u16(&mut buf, 15, encode_altitude(record.area_floor));
    if let Some(eu) = record.classification {
        buf[17] = (eu.category.raw() << 4) | eu.class.raw();
    }
    put_u16(&mut buf, 18, encode_altitude(record.operator_altitude_geo));
    put_u32(&mut buf, 20, record.timestamp);
    buf
}

pub fn encode_operator_id(record: &OperatorIdRecord) -> Encoded {
    let mut buf = new_message(MessageType::OperatorId);
    buf[1] = record.operator_id_type.raw();
    write_string(&mut buf, 2, ID_SIZE, &record.operator_id);
    buf
}

pub fn encode_message(message: &Message) -> Encoded {
    match message {
        Message::BasicId(r) => encode_basic_id(r),
        Message::Location(r) => encode_location(r),
        Message::Auth(r) => encode_auth(r),
        Message::SelfId(r) => encode_self_id(r),
        Message::System(r) => encode_system(r),
        Message::OperatorId(r) => encode_operator_id(r),
    }
}

/// Wrap 1 to 9 messages in a Message Pack.
pub fn encode_message_pack(messages: &[Message]) -> Result<Vec<u8>, EncodeError> {
    if messages.is_empty() || messages.len() > PACK_MAX_MESSAGES {
        return Err(EncodeError::PackSize {
            count: messages.len(),
            max: PACK_MAX_MESSAGES,
        });
    }
    let mut buf = Vec::with_capacity(PACK_HEADER_SIZE + messages.len() * MESSAGE_SIZE);
    buf.push(header(MessageType::MessagePack));
    buf.push(MESSAGE_SIZE as u8);
    buf.push(messages.len() as u8);
    for message in messages {
        buf.extend_from_slice(&encode_message(message));
    }
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Classify raw Open Drone ID payloads and carry them through the pipeline.
//!
//! Responsibilities:
//! - Split byte 0 into message type (high nibble) and protocol version (low nibble)
//! - Package transport payloads with signal strength and source into `RawFrame`
//! - Unwrap Bluetooth service data and Wi-Fi NAN action frame framing

use crate::types::{DecodeError, MessageType, Result};

/// Application code that prefixes Open Drone ID Bluetooth service data.
pub const BLE_APP_CODE: u8 = 0x0D;

/// Wi-Fi Alliance OUI carried in NAN service discovery frames.
pub const WIFI_ALLIANCE_OUI: [u8; 3] = [0x50, 0x6F, 0x9A];

/// NAN service ID of Open Drone ID.
pub const ODID_NAN_SERVICE_ID: [u8; 6] = [0x88, 0x69, 0x19, 0x9D, 0x92, 0x09];

/// 802.11 management header (24) + NAN service discovery (6) + service
/// descriptor attribute (13) + message counter (1).
pub const NAN_HEADER_SIZE: usize = 44;

// Byte offsets inside a NAN action frame.
const NAN_SA: usize = 10;
const NAN_CATEGORY: usize = 24;
const NAN_ACTION_CODE: usize = 25;
const NAN_OUI: usize = 26;
const NAN_OUI_TYPE: usize = 29;
const NAN_ATTRIBUTE_ID: usize = 30;
const NAN_SERVICE_ID: usize = 33;
const NAN_INSTANCE_ID: usize = 39;
const NAN_SERVICE_CONTROL: usize = 41;
const NAN_SERVICE_INFO_LEN: usize = 42;
const NAN_COUNTER: usize = 43;
// Bytes ahead of the service info that service_info_length does not cover.
const NAN_SERVICE_INFO_START: usize = 43;

/// Header of every Open Drone ID message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub message_type: MessageType,
    pub protocol_version: u8,
}

impl MessageHeader {
    pub fn from_byte(byte: u8) -> Self {
        MessageHeader {
            message_type: MessageType::from_nibble(byte >> 4),
            protocol_version: byte & 0x0F,
        }
    }

    pub fn to_byte(self) -> u8 {
        (self.message_type.nibble() << 4) | (self.protocol_version & 0x0F)
    }
}

/// Read the message header from byte 0.
///
/// Length and content are validated by the decoders, not here.
pub fn classify(buf: &[u8]) -> Result<MessageHeader> {
    match buf.first() {
        Some(&byte) => Ok(MessageHeader::from_byte(byte)),
        None => Err(DecodeError::EmptyInput),
    }
}

/// Strip Bluetooth service data framing.
///
/// Returns the message counter and the Open Drone ID payload, or `None` when
/// the buffer does not start with the Open Drone ID application code.
pub fn strip_ble_service_header(buf: &[u8]) -> Option<(u8, &[u8])> {
    match buf {
        [BLE_APP_CODE, counter, rest @ ..] => Some((*counter, rest)),
        _ => None,
    }
}

/// Open Drone ID content of a Wi-Fi NAN action frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NanFrame<'a> {
    /// 802.11 source address of the transmitter.
    pub source_mac: [u8; 6],
    pub counter: u8,
    /// Message Pack bytes.
    pub pack: &'a [u8],
}

impl NanFrame<'_> {
    pub fn source_mac_string(&self) -> String {
        self.source_mac
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(":")
    }
}

fn expect_byte(buf: &[u8], offset: usize, field: &'static str, want: u8) -> Result<()> {
    match buf[offset] {
        b if b == want => Ok(()),
        b => Err(DecodeError::ValueOutOfRange {
            offset,
            field,
            raw: b as i64,
        }),
    }
}

fn expect_bytes(buf: &[u8], offset: usize, field: &'static str, want: &[u8]) -> Result<()> {
    let got = &buf[offset..offset + want.len()];
    if got == want {
        return Ok(());
    }
    Err(DecodeError::ValueOutOfRange {
        offset,
        field,
        raw: got.iter().fold(0i64, |acc, &b| (acc << 8) | b as i64),
    })
}

/// Unwrap a Wi-Fi NAN service discovery action frame carrying Open Drone ID.
///
/// The buffer must hold the whole frame from the 802.11 frame control field
/// on. Every fixed field is checked and `service_info_length` must account
/// for exactly the bytes after the attribute header.
pub fn strip_wifi_nan_action_frame(buf: &[u8]) -> Result<NanFrame<'_>> {
    if buf.is_empty() {
        return Err(DecodeError::EmptyInput);
    }
    if buf.len() < NAN_HEADER_SIZE {
        return Err(DecodeError::BufferTooShort {
            offset: 0,
            required: NAN_HEADER_SIZE,
            actual: buf.len(),
        });
    }

    // Management frame (type 0), action subtype (13).
    let frame_control = u16::from_le_bytes([buf[0], buf[1]]);
    if frame_control & 0x00FC != 0x00D0 {
        return Err(DecodeError::ValueOutOfRange {
            offset: 0,
            field: "frame_control",
            raw: frame_control as i64,
        });
    }

    expect_byte(buf, NAN_CATEGORY, "nan_category", 0x04)?;
    expect_byte(buf, NAN_ACTION_CODE, "nan_action_code", 0x09)?;
    expect_bytes(buf, NAN_OUI, "nan_oui", &WIFI_ALLIANCE_OUI)?;
    expect_byte(buf, NAN_OUI_TYPE, "nan_oui_type", 0x13)?;
    expect_byte(buf, NAN_ATTRIBUTE_ID, "nan_attribute_id", 0x03)?;
    expect_bytes(buf, NAN_SERVICE_ID, "nan_service_id", &ODID_NAN_SERVICE_ID)?;
    expect_byte(buf, NAN_INSTANCE_ID, "nan_instance_id", 0x01)?;
    expect_byte(buf, NAN_SERVICE_CONTROL, "nan_service_control", 0x10)?;

    let info_len = buf[NAN_SERVICE_INFO_LEN] as usize;
    if NAN_SERVICE_INFO_START + info_len != buf.len() {
        return Err(DecodeError::ValueOutOfRange {
            offset: NAN_SERVICE_INFO_LEN,
            field: "service_info_length",
            raw: info_len as i64,
        });
    }

    let mut source_mac = [0u8; 6];
    source_mac.copy_from_slice(&buf[NAN_SA..NAN_SA + 6]);
    Ok(NanFrame {
        source_mac,
        counter: buf[NAN_COUNTER],
        pack: &buf[NAN_HEADER_SIZE..],
    })
}

/// A received payload as handed over by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub payload: Vec<u8>,
    /// Signal strength in dBm, if the transport reports it.
    pub rssi: Option<i32>,
    /// Stable per-aircraft identifier (MAC address, Wi-Fi BSSID, ...).
    pub source: String,
    /// Unix seconds at reception.
    pub timestamp: Option<f64>,
}

impl RawFrame {
    pub fn new(source: impl Into<String>, payload: Vec<u8>) -> Self {
        RawFrame {
            payload,
            rssi: None,
            source: source.into(),
            timestamp: None,
        }
    }

    pub fn with_rssi(mut self, rssi: i32) -> Self {
        self.rssi = Some(rssi);
        self
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn header(&self) -> Result<MessageHeader> {
        classify(&self.payload)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_location() {
        let header = classify(&[0x12, 0x00]).unwrap();
        assert_eq!(header.message_type, MessageType::Location);
        assert_eq!(header.protocol_version, 2);
    }

    #[test]
    fn test_classify_pack() {
        let header = classify(&[0xF2]).unwrap();
        assert_eq!(header.message_type, MessageType::MessagePack);
    }

    #[test]
    fn test_classify_unknown_is_not_error() {
        let header = classify(&[0x91]).unwrap();
        assert_eq!(header.message_type, MessageType::Unknown(9));
        assert_eq!(header.protocol_version, 1);
    }

    #[test]
    fn test_classify_empty() {
        assert_eq!(classify(&[]), Err(DecodeError::EmptyInput));
    }

    #[test]
    fn test_header_byte_roundtrip() {
        for byte in 0..=255u8 {
            assert_eq!(MessageHeader::from_byte(byte).to_byte(), byte);
        }
    }

    #[test]
    fn test_strip_ble_service_header() {
        let buf = [0x0D, 0x07, 0x02, 0xAA];
        let (counter, payload) = strip_ble_service_header(&buf).unwrap();
        assert_eq!(counter, 7);
        assert_eq!(payload, &[0x02, 0xAA]);
        assert!(strip_ble_service_header(&[0x0C, 0x00, 0x02]).is_none());
        assert!(strip_ble_service_header(&[0x0D]).is_none());
    }

    #[test]
    fn test_raw_frame_builder() {
        let frame = RawFrame::new("aa:bb", vec![0x22])
            .with_rssi(-70)
            .with_timestamp(12.5);
        assert_eq!(frame.rssi, Some(-70));
        assert_eq!(frame.timestamp, Some(12.5));
        assert_eq!(frame.header().unwrap().message_type, MessageType::Auth);
    }

    /// Action frame around `pack`, as a NAN transmitter lays it out.
    fn nan_frame(pack: &[u8]) -> Vec<u8> {
        let mut buf = vec![0xD0, 0x00, 0x00, 0x00];
        buf.extend_from_slice(&[0x51, 0x6F, 0x9A, 0x01, 0x00, 0x00]); // da
        buf.extend_from_slice(&[0x02, 0x11, 0x22, 0x33, 0x44, 0x55]); // sa
        buf.extend_from_slice(&[0x02, 0x11, 0x22, 0x33, 0x44, 0x55]); // bssid
        buf.extend_from_slice(&[0x00, 0x00]);
        buf.extend_from_slice(&[0x04, 0x09, 0x50, 0x6F, 0x9A, 0x13]);
        let info_len = 1 + pack.len();
        let attr_len = 9 + info_len;
        buf.push(0x03);
        buf.extend_from_slice(&(attr_len as u16).to_le_bytes());
        buf.extend_from_slice(&ODID_NAN_SERVICE_ID);
        buf.extend_from_slice(&[0x01, 0x00, 0x10, info_len as u8]);
        buf.push(0x2A); // counter
        buf.extend_from_slice(pack);
        buf
    }

    #[test]
    fn test_strip_wifi_nan_action_frame() {
        let pack = [0xF2, 0x19, 0x00];
        let buf = nan_frame(&pack);
        assert_eq!(buf.len(), NAN_HEADER_SIZE + pack.len());
        let nan = strip_wifi_nan_action_frame(&buf).unwrap();
        assert_eq!(nan.source_mac, [0x02, 0x11, 0x22, 0x33, 0x44, 0x55]);
        assert_eq!(nan.source_mac_string(), "02:11:22:33:44:55");
        assert_eq!(nan.counter, 0x2A);
        assert_eq!(nan.pack, &pack);
    }

    #[test]
    fn test_nan_short_buffers() {
        assert_eq!(strip_wifi_nan_action_frame(&[]), Err(DecodeError::EmptyInput));
        let buf = nan_frame(&[0xF2]);
        for len in 1..NAN_HEADER_SIZE {
            assert_eq!(
                strip_wifi_nan_action_frame(&buf[..len]),
                Err(DecodeError::BufferTooShort {
                    offset: 0,
                    required: NAN_HEADER_SIZE,
                    actual: len,
                })
            );
        }
    }

    #[test]
    fn test_nan_rejects_wrong_fields() {
        let good = nan_frame(&[0xF2, 0x19, 0x00]);
        let cases: &[(usize, &str)] = &[
            (0, "frame_control"),
            (NAN_CATEGORY, "nan_category"),
            (NAN_ACTION_CODE, "nan_action_code"),
            (NAN_OUI + 1, "nan_oui"),
            (NAN_OUI_TYPE, "nan_oui_type"),
            (NAN_ATTRIBUTE_ID, "nan_attribute_id"),
            (NAN_SERVICE_ID + 5, "nan_service_id"),
            (NAN_INSTANCE_ID, "nan_instance_id"),
            (NAN_SERVICE_CONTROL, "nan_service_control"),
            (NAN_SERVICE_INFO_LEN, "service_info_length"),
        ];
        for &(at, name) in cases {
            let mut buf = good.clone();
            buf[at] ^= 0x10;
            match strip_wifi_nan_action_frame(&buf) {
                Err(DecodeError::ValueOutOfRange { field, .. }) => assert_eq!(field, name),
                other => panic!("byte {at}: {other:?}"),
            }
        }
    }

    #[test]
    fn test_nan_trailing_bytes_rejected() {
        let mut buf = nan_frame(&[0xF2, 0x19, 0x00]);
        buf.push(0x00);
        assert!(matches!(
            strip_wifi_nan_action_frame(&buf),
            Err(DecodeError::ValueOutOfRange {
                offset: NAN_SERVICE_INFO_LEN,
                field: "service_info_length",
                ..
            })
        ));
    }
}

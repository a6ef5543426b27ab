//! Field-level primitives shared by all message decoders and encoders.
//!
//! Every read is bounds-checked against the buffer before indexing and
//! reports the failing offset. Scaled fields map their sentinel raw value to
//! `None`; the encode side maps `None` back to the sentinel and clamps
//! everything else into the representable range.

use crate::types::{DecodeError, Result};

const LATLON_DIVISOR: f64 = 1e7;
const MAX_LATITUDE: f64 = 90.0;
const MAX_LONGITUDE: f64 = 180.0;

/// Raw value for an unknown vertical speed (63 m/s).
pub const SPEED_VERTICAL_UNKNOWN: i8 = 126;
/// Largest valid vertical speed magnitude in m/s.
pub const MAX_SPEED_VERTICAL: f64 = 62.0;
/// Raw horizontal speed for unknown when the multiplier bit is set (255 m/s).
pub const SPEED_HORIZONTAL_UNKNOWN: u8 = 255;
/// Direction value meaning unknown.
pub const DIRECTION_UNKNOWN: u16 = 361;
/// Raw location timestamp meaning unknown.
pub const TIMESTAMP_UNKNOWN: u16 = 0xFFFF;
/// Tenths of a second in one hour.
pub const MAX_TIMESTAMP: u16 = 36_000;

// ---------------------------------------------------------------------------
// Scaling
// ---------------------------------------------------------------------------

/// `value = raw * factor + offset`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Linear {
    pub factor: f64,
    pub offset: f64,
}

impl Linear {
    pub const fn new(factor: f64, offset: f64) -> Self {
        Linear { factor, offset }
    }

    pub fn apply(self, raw: f64) -> f64 {
        raw * self.factor + self.offset
    }

    pub fn invert(self, value: f64) -> f64 {
        (value - self.offset) / self.factor
    }
}

/// Two linear ranges selected by a multiplier bit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Piecewise {
    pub low: Linear,
    pub high: Linear,
}

impl Piecewise {
    pub fn apply(self, raw: f64, multiplier: bool) -> f64 {
        if multiplier {
            self.high.apply(raw)
        } else {
            self.low.apply(raw)
        }
    }
}

/// Altitudes, height, area ceiling and floor: 0.5 m steps from -1000 m.
pub const ALTITUDE: Linear = Linear::new(0.5, -1000.0);
/// Vertical speed: 0.5 m/s steps.
pub const SPEED_VERTICAL: Linear = Linear::new(0.5, 0.0);
/// Horizontal speed: 0.25 m/s steps up to 63.75 m/s, then 0.75 m/s steps.
pub const SPEED_HORIZONTAL: Piecewise = Piecewise {
    low: Linear::new(0.25, 0.0),
    high: Linear::new(0.75, 63.75),
};

// ---------------------------------------------------------------------------
// Bounds-checked extraction
// ---------------------------------------------------------------------------

/// Borrow `len` bytes at `offset`.
pub fn field(buf: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    buf.get(offset..offset + len)
        .ok_or(DecodeError::BufferTooShort {
            offset,
            required: offset + len,
            actual: buf.len(),
        })
}

/// Fail unless `buf` holds at least `required` bytes.
pub fn require_len(buf: &[u8], required: usize) -> Result<()> {
    if buf.is_empty() {
        return Err(DecodeError::EmptyInput);
    }
    if buf.len() < required {
        return Err(DecodeError::BufferTooShort {
            offset: 0,
            required,
            actual: buf.len(),
        });
    }
    Ok(())
}

pub fn read_u8(buf: &[u8], offset: usize) -> Result<u8> {
    Ok(field(buf, offset, 1)?[0])
}

pub fn read_i8(buf: &[u8], offset: usize) -> Result<i8> {
    Ok(read_u8(buf, offset)? as i8)
}

pub fn read_u16_le(buf: &[u8], offset: usize) -> Result<u16> {
    let b = field(buf, offset, 2)?;
    Ok(u16::from_le_bytes([b[0], b[1]]))
}

pub fn read_i32_le(buf: &[u8], offset: usize) -> Result<i32> {
    let b = field(buf, offset, 4)?;
    Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

pub fn read_u32_le(buf: &[u8], offset: usize) -> Result<u32> {
    let b = field(buf, offset, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Read a fixed-length string field.
///
/// The value ends at the first NUL, must be UTF-8, and is trimmed of
/// whitespace and control characters at both ends.
pub fn read_string(buf: &[u8], offset: usize, len: usize) -> Result<String> {
    let bytes = field(buf, offset, len)?;
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let text = std::str::from_utf8(&bytes[..end])
        .map_err(|_| DecodeError::InvalidEncoding { offset })?;
    Ok(text
        .trim_matches(|c: char| c.is_whitespace() || c.is_control())
        .to_string())
}

fn out_of_range(offset: usize, field: &'static str, raw: i64) -> DecodeError {
    DecodeError::ValueOutOfRange { offset, field, raw }
}

// ---------------------------------------------------------------------------
// Field decoders
// ---------------------------------------------------------------------------

fn decode_degrees(raw: i32, limit: f64, offset: usize, name: &'static str) -> Result<Option<f64>> {
    if raw == 0 {
        return Ok(None);
    }
    let degrees = raw as f64 / LATLON_DIVISOR;
    if degrees.abs() > limit {
        return Err(out_of_range(offset, name, raw as i64));
    }
    Ok(Some(degrees))
}

pub fn decode_latitude(raw: i32, offset: usize) -> Result<Option<f64>> {
    decode_degrees(raw, MAX_LATITUDE, offset, "latitude")
}

pub fn decode_longitude(raw: i32, offset: usize) -> Result<Option<f64>> {
    decode_degrees(raw, MAX_LONGITUDE, offset, "longitude")
}

/// Altitude, height, area ceiling or floor. Raw 0 (-1000 m) is unknown.
pub fn decode_altitude(raw: u16) -> Option<f32> {
    match raw {
        0 => None,
        raw => Some(ALTITUDE.apply(raw as f64) as f32),
    }
}

pub fn decode_speed_horizontal(raw: u8, multiplier: bool) -> Option<f32> {
    if multiplier && raw == SPEED_HORIZONTAL_UNKNOWN {
        return None;
    }
    Some(SPEED_HORIZONTAL.apply(raw as f64, multiplier) as f32)
}

pub fn decode_speed_vertical(raw: i8, offset: usize) -> Result<Option<f32>> {
    if raw == SPEED_VERTICAL_UNKNOWN {
        return Ok(None);
    }
    let speed = SPEED_VERTICAL.apply(raw as f64);
    if speed.abs() > MAX_SPEED_VERTICAL {
        return Err(out_of_range(offset, "speed_vertical", raw as i64));
    }
    Ok(Some(speed as f32))
}

/// Track direction. `east_west` adds 180 degrees to the raw byte.
pub fn decode_direction(raw: u8, east_west: bool, offset: usize) -> Result<Option<f32>> {
    let degrees = raw as u16 + if east_west { 180 } else { 0 };
    match degrees {
        DIRECTION_UNKNOWN => Ok(None),
        d if d > 360 => Err(out_of_range(offset, "direction", d as i64)),
        d => Ok(Some(d as f32)),
    }
}

/// Tenths of a second after the full hour.
pub fn decode_timestamp(raw: u16, offset: usize) -> Result<Option<f32>> {
    match raw {
        TIMESTAMP_UNKNOWN => Ok(None),
        t if t > MAX_TIMESTAMP => Err(out_of_range(offset, "timestamp", t as i64)),
        t => Ok(Some(t as f32 / 10.0)),
    }
}

pub fn decode_timestamp_accuracy(nibble: u8) -> Option<f32> {
    match nibble & 0x0F {
        0 => None,
        n => Some(n as f32 / 10.0),
    }
}

pub fn decode_area_radius(raw: u8) -> u16 {
    raw as u16 * 10
}

// ---------------------------------------------------------------------------
// Field encoders
// ---------------------------------------------------------------------------

pub fn encode_latitude(value: Option<f64>) -> i32 {
    encode_degrees(value, MAX_LATITUDE)
}

pub fn encode_longitude(value: Option<f64>) -> i32 {
    encode_degrees(value, MAX_LONGITUDE)
}

fn encode_degrees(value: Option<f64>, limit: f64) -> i32 {
    match value {
        None => 0,
        Some(deg) => (deg.clamp(-limit, limit) * LATLON_DIVISOR).round() as i32,
    }
}

pub fn encode_altitude(value: Option<f32>) -> u16 {
    match value {
        None => 0,
        Some(alt) => ALTITUDE
            .invert(alt as f64)
            .round()
            .clamp(0.0, u16::MAX as f64) as u16,
    }
}

/// Returns the raw byte and the multiplier bit.
pub fn encode_speed_horizontal(value: Option<f32>) -> (u8, bool) {
    let speed = match value {
        None => return (SPEED_HORIZONTAL_UNKNOWN, true),
        Some(s) => s.max(0.0) as f64,
    };
    let low_max = SPEED_HORIZONTAL.low.apply(u8::MAX as f64);
    if speed <= low_max {
        let raw = SPEED_HORIZONTAL.low.invert(speed).round();
        (raw.clamp(0.0, 255.0) as u8, false)
    } else {
        let raw = SPEED_HORIZONTAL.high.invert(speed).round();
        (raw.clamp(0.0, (SPEED_HORIZONTAL_UNKNOWN - 1) as f64) as u8, true)
    }
}

pub fn encode_speed_vertical(value: Option<f32>) -> i8 {
    match value {
        None => SPEED_VERTICAL_UNKNOWN,
        Some(speed) => {
            let clamped = (speed as f64).clamp(-MAX_SPEED_VERTICAL, MAX_SPEED_VERTICAL);
            SPEED_VERTICAL.invert(clamped).round() as i8
        }
    }
}

/// Returns the raw byte and the east/west bit.
pub fn encode_direction(value: Option<f32>) -> (u8, bool) {
    let degrees = match value {
        None => DIRECTION_UNKNOWN,
        Some(d) => (d.round() as i32).clamp(0, 360) as u16,
    };
    if degrees < 180 {
        (degrees as u8, false)
    } else {
        ((degrees - 180) as u8, true)
    }
}

pub fn encode_timestamp(value: Option<f32>) -> u16 {
    match value {
        None => TIMESTAMP_UNKNOWN,
        Some(seconds) => ((seconds as f64 * 10.0).round().clamp(0.0, MAX_TIMESTAMP as f64)) as u16,
    }
}

pub fn encode_timestamp_accuracy(value: Option<f32>) -> u8 {
    match value {
        None => 0,
        Some(seconds) => (seconds as f64 * 10.0).round().clamp(1.0, 15.0) as u8,
    }
}

pub fn encode_area_radius(meters: u16) -> u8 {
    (meters / 10).min(u8::MAX as u16) as u8
}

/// Write `text` into a fixed-length, NUL-padded field.
///
/// Text longer than the field is cut at the last whole character that fits.
pub fn write_string(buf: &mut [u8], offset: usize, len: usize, text: &str) {
    let mut end = text.len().min(len);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let dest = &mut buf[offset..offset + len];
    dest.fill(0);
    dest[..end].copy_from_slice(&text.as_bytes()[..end]);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_bounds() {
        let buf = [1, 2, 3];
        assert_eq!(field(&buf, 1, 2).unwrap(), &[2, 3]);
        assert_eq!(
            field(&buf, 2, 2),
            Err(DecodeError::BufferTooShort {
                offset: 2,
                required: 4,
                actual: 3
            })
        );
    }

    #[test]
    fn test_little_endian_reads() {
        let buf = [0x34, 0x12, 0xFF, 0xFF, 0xFF, 0xFF];
        assert_eq!(read_u16_le(&buf, 0).unwrap(), 0x1234);
        assert_eq!(read_i32_le(&buf, 2).unwrap(), -1);
        assert_eq!(read_u32_le(&buf, 2).unwrap(), u32::MAX);
        assert_eq!(read_i8(&buf, 2).unwrap(), -1);
        assert!(read_u32_le(&buf, 3).is_err());
    }

    #[test]
    fn test_require_len() {
        assert_eq!(require_len(&[], 25), Err(DecodeError::EmptyInput));
        assert!(matches!(
            require_len(&[0; 24], 25),
            Err(DecodeError::BufferTooShort { required: 25, actual: 24, .. })
        ));
        assert!(require_len(&[0; 25], 25).is_ok());
    }

    #[test]
    fn test_latitude_scaling() {
        assert_eq!(decode_latitude(0, 5).unwrap(), None);
        assert_eq!(decode_latitude(100_000_000, 5).unwrap(), Some(10.0));
        assert_eq!(decode_latitude(-900_000_000, 5).unwrap(), Some(-90.0));
        assert!(matches!(
            decode_latitude(900_000_001, 5),
            Err(DecodeError::ValueOutOfRange { offset: 5, field: "latitude", .. })
        ));
        assert!(decode_longitude(1_800_000_000, 9).is_ok());
    }

    #[test]
    fn test_altitude_scaling() {
        assert_eq!(decode_altitude(0), None);
        assert_eq!(decode_altitude(2000), Some(0.0));
        assert_eq!(decode_altitude(2250), Some(125.0));
        assert_eq!(encode_altitude(Some(125.0)), 2250);
        assert_eq!(encode_altitude(None), 0);
        assert_eq!(encode_altitude(Some(-5000.0)), 0);
        assert_eq!(encode_altitude(Some(1e9)), u16::MAX);
    }

    #[test]
    fn test_horizontal_speed() {
        assert_eq!(decode_speed_horizontal(40, false), Some(10.0));
        assert_eq!(decode_speed_horizontal(10, true), Some(71.25));
        assert_eq!(decode_speed_horizontal(255, true), None);
        assert_eq!(decode_speed_horizontal(255, false), Some(63.75));
        assert_eq!(encode_speed_horizontal(Some(10.0)), (40, false));
        assert_eq!(encode_speed_horizontal(Some(71.25)), (10, true));
        assert_eq!(encode_speed_horizontal(None), (255, true));
        assert_eq!(encode_speed_horizontal(Some(1000.0)), (254, true));
    }

    #[test]
    fn test_vertical_speed() {
        assert_eq!(decode_speed_vertical(126, 4).unwrap(), None);
        assert_eq!(decode_speed_vertical(-10, 4).unwrap(), Some(-5.0));
        assert_eq!(decode_speed_vertical(124, 4).unwrap(), Some(62.0));
        assert!(decode_speed_vertical(125, 4).is_err());
        assert!(decode_speed_vertical(-128, 4).is_err());
        assert_eq!(encode_speed_vertical(None), 126);
        assert_eq!(encode_speed_vertical(Some(100.0)), 124);
        assert_eq!(encode_speed_vertical(Some(-2.5)), -5);
    }

    #[test]
    fn test_direction() {
        assert_eq!(decode_direction(90, false, 2).unwrap(), Some(90.0));
        assert_eq!(decode_direction(90, true, 2).unwrap(), Some(270.0));
        assert_eq!(decode_direction(180, true, 2).unwrap(), Some(360.0));
        assert_eq!(decode_direction(181, true, 2).unwrap(), None);
        assert!(decode_direction(200, true, 2).is_err());
        assert_eq!(encode_direction(Some(270.0)), (90, true));
        assert_eq!(encode_direction(None), (181, true));
    }

    #[test]
    fn test_timestamps() {
        assert_eq!(decode_timestamp(0xFFFF, 21).unwrap(), None);
        assert_eq!(decode_timestamp(36000, 21).unwrap(), Some(3600.0));
        assert!(decode_timestamp(36001, 21).is_err());
        assert_eq!(encode_timestamp(Some(12.3)), 123);
        assert_eq!(decode_timestamp_accuracy(0), None);
        assert_eq!(decode_timestamp_accuracy(5), Some(0.5));
        assert_eq!(encode_timestamp_accuracy(Some(9.0)), 15);
        assert_eq!(encode_timestamp_accuracy(None), 0);
    }

    #[test]
    fn test_area_radius() {
        assert_eq!(decode_area_radius(25), 250);
        assert_eq!(encode_area_radius(250), 25);
        assert_eq!(encode_area_radius(60000), 255);
    }

    #[test]
    fn test_read_string_trims_padding() {
        let mut buf = [0u8; 20];
        buf[..12].copy_from_slice(b"TestOperator");
        assert_eq!(read_string(&buf, 0, 20).unwrap(), "TestOperator");
    }

    #[test]
    fn test_read_string_cuts_at_nul() {
        let buf = *b"  abc\0garbage\x01";
        assert_eq!(read_string(&buf, 0, buf.len()).unwrap(), "abc");
    }

    #[test]
    fn test_read_string_invalid_utf8() {
        let buf = [0x41, 0xFF, 0xFE, 0x00];
        assert_eq!(
            read_string(&buf, 0, 4),
            Err(DecodeError::InvalidEncoding { offset: 0 })
        );
    }

    #[test]
    fn test_write_string_truncates_on_char_boundary() {
        let mut buf = [0xAAu8; 4];
        write_string(&mut buf, 0, 4, "abé!");
        // "abé" is 4 bytes, so '!' is dropped
        assert_eq!(&buf, "abé".as_bytes());
        write_string(&mut buf, 0, 3, "abé");
        assert_eq!(&buf[..3], b"ab\0");
    }
}

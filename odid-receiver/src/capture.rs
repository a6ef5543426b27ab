//! Capture line parsing and frame feeding.
//!
//! A capture holds one frame per line; blank lines and `#` comments are
//! ignored. Tokens are whitespace separated:
//!
//! ```text
//! HEX
//! SOURCE HEX
//! SOURCE RSSI HEX
//! TIMESTAMP SOURCE RSSI HEX
//! ```
//!
//! `HEX` may be wrapped as `*HEX;`. Lines without a source are attributed to
//! `unknown`. Lines without a timestamp produce untimed frames, which never
//! age out of the ingestor.

use odid_core::{hex_decode, RawFrame};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ReceiverError, Result};
use crate::pipeline::Pipeline;

/// Source name for lines that carry only a payload.
pub const UNKNOWN_SOURCE: &str = "unknown";

/// Counters from one capture feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub lines: u64,
    pub frames: u64,
    pub rejected: u64,
}

/// Extract the payload from a hex token, accepting the `*HEX;` wrapper.
pub fn clean_hex_token(token: &str) -> Option<Vec<u8>> {
    let token = token
        .strip_prefix('*')
        .and_then(|t| t.strip_suffix(';'))
        .unwrap_or(token);
    if token.is_empty() {
        return None;
    }
    hex_decode(token)
}

/// Parse one capture line.
///
/// Returns `Ok(None)` for blank and comment lines.
pub fn parse_capture_line(line: &str, line_no: usize) -> Result<Option<RawFrame>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let reject = |reason: String| ReceiverError::Capture {
        line: line_no,
        reason,
    };
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let (timestamp, source, rssi, hex) = match tokens.as_slice() {
        [hex] => (None, UNKNOWN_SOURCE, None, *hex),
        [source, hex] => (None, *source, None, *hex),
        [source, rssi, hex] => (None, *source, Some(*rssi), *hex),
        [ts, source, rssi, hex] => (Some(*ts), *source, Some(*rssi), *hex),
        _ => return Err(reject(format!("expected 1 to 4 fields, got {}", tokens.len()))),
    };

    let payload = clean_hex_token(hex).ok_or_else(|| reject(format!("invalid hex payload {hex:?}")))?;
    let mut frame = RawFrame::new(source, payload);
    if let Some(ts) = timestamp {
        let ts = ts
            .parse::<f64>()
            .map_err(|_| reject(format!("invalid timestamp {ts:?}")))?;
        frame = frame.with_timestamp(ts);
    }
    if let Some(rssi) = rssi {
        let rssi = rssi
            .parse::<i32>()
            .map_err(|_| reject(format!("invalid rssi {rssi:?}")))?;
        frame = frame.with_rssi(rssi);
    }
    Ok(Some(frame))
}

/// Read capture lines and submit them to the pipeline until EOF or cancellation.
///
/// Malformed lines are logged and counted, not fatal.
pub async fn feed<R>(reader: R, pipeline: &Pipeline, cancel: &CancellationToken) -> Result<FeedStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut stats = FeedStats::default();

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Capture feed cancelled");
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            debug!("Capture input ended after {} lines", stats.lines);
            break;
        };
        stats.lines += 1;

        match parse_capture_line(&line, stats.lines as usize) {
            Ok(Some(frame)) => {
                pipeline.submit(frame).await?;
                stats.frames += 1;
            }
            Ok(None) => {}
            Err(e) => {
                stats.rejected += 1;
                warn!("{e}");
            }
        }
    }

    Ok(stats)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_blank_and_comments() {
        assert_eq!(parse_capture_line("", 1).unwrap(), None);
        assert_eq!(parse_capture_line("   ", 1).unwrap(), None);
        assert_eq!(parse_capture_line("# recorded at the field", 1).unwrap(), None);
    }

    #[test]
    fn test_bare_hex() {
        let frame = parse_capture_line("0D05", 1).unwrap().unwrap();
        assert_eq!(frame.source, UNKNOWN_SOURCE);
        assert_eq!(frame.payload, vec![0x0D, 0x05]);
        assert_eq!(frame.timestamp, None);
        assert_eq!(frame.rssi, None);
    }

    #[test]
    fn test_wrapped_hex() {
        let frame = parse_capture_line("*52ab;", 1).unwrap().unwrap();
        assert_eq!(frame.payload, vec![0x52, 0xAB]);
    }

    #[test]
    fn test_source_and_rssi() {
        let frame = parse_capture_line("aa:bb:cc -71 5200", 1).unwrap().unwrap();
        assert_eq!(frame.source, "aa:bb:cc");
        assert_eq!(frame.rssi, Some(-71));
        assert_eq!(frame.payload, vec![0x52, 0x00]);

        let frame = parse_capture_line("drone-1 5200", 1).unwrap().unwrap();
        assert_eq!(frame.source, "drone-1");
        assert_eq!(frame.rssi, None);
    }

    #[test]
    fn test_full_line_uses_recorded_timestamp() {
        let frame = parse_capture_line("1700000000.25 src -60 32", 1).unwrap().unwrap();
        assert_eq!(frame.timestamp, Some(1_700_000_000.25));
        assert_eq!(frame.source, "src");
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(matches!(
            parse_capture_line("src -60 XYZ", 7),
            Err(ReceiverError::Capture { line: 7, .. })
        ));
        assert!(parse_capture_line("src loud 52", 1).is_err());
        assert!(parse_capture_line("soon src -60 52", 1).is_err());
        assert!(parse_capture_line("a b c d e", 1).is_err());
        assert!(parse_capture_line("*;", 1).is_err());
        assert!(parse_capture_line("abc", 1).is_err());
    }

}

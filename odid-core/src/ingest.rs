//! Per-source ingestion state machine.
//!
//! Pure logic, no I/O. Produces `IngestEvent` outputs that the caller
//! (CLI/receiver pipeline) forwards to observers. Each source identifier
//! owns one `UasSnapshot`; frames for a source are applied in the order
//! `process()` is called.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, trace};

use crate::assembler::{assemble_pack, merge, UasSnapshot};
use crate::decode::{decode_message, decode_message_pack};
use crate::frame::{
    classify, strip_ble_service_header, strip_wifi_nan_action_frame, RawFrame, BLE_APP_CODE,
};
use crate::types::{DecodeError, Framing, MessagePack, MessageType};

/// Sources considered stale after this many seconds of silence.
pub const STALE_TIMEOUT: f64 = 300.0;

// ---------------------------------------------------------------------------
// Ingest events (output)
// ---------------------------------------------------------------------------

/// What produced a snapshot update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UpdateOrigin {
    /// A Message Pack replaced the snapshot.
    MessagePack { messages: usize, skipped: usize },
    /// A single message was merged into the prior snapshot.
    Single { message_type: MessageType },
}

/// New state for one aircraft.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotUpdate {
    pub source: String,
    pub rssi: Option<i32>,
    pub timestamp: Option<f64>,
    pub origin: UpdateOrigin,
    pub snapshot: UasSnapshot,
}

/// A frame (or pack sub-message) that could not be decoded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub source: String,
    pub timestamp: Option<f64>,
    pub error: DecodeError,
    /// Pack position when the error came from a skipped sub-message.
    pub skipped_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum IngestEvent {
    Snapshot(SnapshotUpdate),
    Diagnostic(Diagnostic),
}

// ---------------------------------------------------------------------------
// Source state
// ---------------------------------------------------------------------------

/// Mutable state for a single source identifier.
///
/// `first_seen`/`last_seen` stay `None` until a timestamped frame arrives.
#[derive(Debug, Clone)]
pub struct SourceState {
    pub snapshot: UasSnapshot,
    pub first_seen: Option<f64>,
    pub last_seen: Option<f64>,
    pub frames: u64,
    pub last_rssi: Option<i32>,
}

impl SourceState {
    fn new() -> Self {
        SourceState {
            snapshot: UasSnapshot::new(),
            first_seen: None,
            last_seen: None,
            frames: 0,
            last_rssi: None,
        }
    }

    fn seen_at(&mut self, timestamp: f64) {
        self.first_seen = Some(self.first_seen.map_or(timestamp, |t| t.min(timestamp)));
        self.last_seen = Some(self.last_seen.map_or(timestamp, |t| t.max(timestamp)));
    }

    /// Seconds since the last timestamped frame, `None` if there never was one.
    pub fn age(&self, now: f64) -> Option<f64> {
        self.last_seen.map(|t| now - t)
    }
}

// ---------------------------------------------------------------------------
// Ingestor
// ---------------------------------------------------------------------------

/// Decode frames and keep one snapshot per source.
///
/// Call `process()` with each received frame and forward the returned events.
/// Decode failures come back as `Diagnostic` events and never touch the
/// source's snapshot.
pub struct Ingestor {
    pub framing: Framing,
    pub stale_timeout: f64,
    sources: HashMap<String, SourceState>,

    // Counters
    pub total_frames: u64,
    pub snapshots_emitted: u64,
    pub diagnostics_emitted: u64,
}

impl Ingestor {
    pub fn new(framing: Framing, stale_timeout: f64) -> Self {
        Ingestor {
            framing,
            stale_timeout,
            sources: HashMap::new(),
            total_frames: 0,
            snapshots_emitted: 0,
            diagnostics_emitted: 0,
        }
    }

    /// Process one frame. Returns the events it produced, in order.
    pub fn process(&mut self, frame: &RawFrame) -> Vec<IngestEvent> {
        self.total_frames += 1;
        trace!(source = %frame.source, len = frame.payload.len(), "frame");

        let payload = match self.unwrap_payload(&frame.payload) {
            Ok(payload) => payload,
            Err(error) => return vec![self.diagnostic(frame, error, None)],
        };

        let header = match classify(payload) {
            Ok(header) => header,
            Err(error) => return vec![self.diagnostic(frame, error, None)],
        };

        match header.message_type {
            MessageType::MessagePack => match decode_message_pack(payload) {
                Ok(pack) => self.apply_pack(frame, pack),
                Err(error) => vec![self.diagnostic(frame, error, None)],
            },
            MessageType::Unknown(message_type) => {
                let error = DecodeError::UnknownMessageType {
                    offset: 0,
                    message_type,
                };
                vec![self.diagnostic(frame, error, None)]
            }
            message_type => match decode_message(payload) {
                Ok(message) => {
                    let state = self.touch(frame);
                    let snapshot = merge(Some(&state.snapshot), &message, header.protocol_version);
                    state.snapshot = snapshot.clone();
                    vec![self.snapshot_event(frame, UpdateOrigin::Single { message_type }, snapshot)]
                }
                Err(error) => vec![self.diagnostic(frame, error, None)],
            },
        }
    }

    fn unwrap_payload<'a>(&self, payload: &'a [u8]) -> Result<&'a [u8], DecodeError> {
        match self.framing {
            Framing::Bare => Ok(payload),
            Framing::BleServiceData => match payload.first() {
                None => Err(DecodeError::EmptyInput),
                Some(&code) if code != BLE_APP_CODE => Err(DecodeError::ValueOutOfRange {
                    offset: 0,
                    field: "ble_app_code",
                    raw: code as i64,
                }),
                Some(_) => strip_ble_service_header(payload)
                    .map(|(_, rest)| rest)
                    .ok_or(DecodeError::BufferTooShort {
                        offset: 1,
                        required: 2,
                        actual: payload.len(),
                    }),
            },
            Framing::WifiNan => strip_wifi_nan_action_frame(payload).map(|nan| nan.pack),
        }
    }

    fn apply_pack(&mut self, frame: &RawFrame, pack: MessagePack) -> Vec<IngestEvent> {
        let mut events = Vec::with_capacity(1 + pack.skipped.len());

        // A pack where every sub-message failed leaves the snapshot alone.
        if !pack.messages.is_empty() {
            let snapshot = assemble_pack(&pack);
            let state = self.touch(frame);
            state.snapshot = snapshot.clone();
            let origin = UpdateOrigin::MessagePack {
                messages: pack.messages.len(),
                skipped: pack.skipped.len(),
            };
            events.push(self.snapshot_event(frame, origin, snapshot));
        }

        for skipped in pack.skipped {
            events.push(self.diagnostic(frame, skipped.error, Some(skipped.index)));
        }
        events
    }

    /// Get or create the state for a frame's source and record the reception.
    fn touch(&mut self, frame: &RawFrame) -> &mut SourceState {
        let state = self.sources.entry(frame.source.clone()).or_insert_with(|| {
            debug!(source = %frame.source, "new source");
            SourceState::new()
        });
        if let Some(ts) = frame.timestamp {
            state.seen_at(ts);
        }
        if frame.rssi.is_some() {
            state.last_rssi = frame.rssi;
        }
        state.frames += 1;
        state
    }

    fn snapshot_event(
        &mut self,
        frame: &RawFrame,
        origin: UpdateOrigin,
        snapshot: UasSnapshot,
    ) -> IngestEvent {
        self.snapshots_emitted += 1;
        IngestEvent::Snapshot(SnapshotUpdate {
            source: frame.source.clone(),
            rssi: frame.rssi,
            timestamp: frame.timestamp,
            origin,
            snapshot,
        })
    }

    fn diagnostic(
        &mut self,
        frame: &RawFrame,
        error: DecodeError,
        skipped_index: Option<usize>,
    ) -> IngestEvent {
        self.diagnostics_emitted += 1;
        debug!(
            source = %frame.source,
            kind = %error.kind(),
            offset = error.offset(),
            skipped_index,
            "decode failed: {error}"
        );
        IngestEvent::Diagnostic(Diagnostic {
            source: frame.source.clone(),
            timestamp: frame.timestamp,
            error,
            skipped_index,
        })
    }

    pub fn snapshot(&self, source: &str) -> Option<&UasSnapshot> {
        self.sources.get(source).map(|s| &s.snapshot)
    }

    pub fn source(&self, source: &str) -> Option<&SourceState> {
        self.sources.get(source)
    }

    /// Number of sources currently tracked.
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Remove sources not heard from within the stale timeout. Returns count removed.
    ///
    /// Sources that never carried a timestamp have no age and are kept.
    pub fn prune_stale(&mut self, now: f64) -> usize {
        let timeout = self.stale_timeout;
        let before = self.sources.len();
        self.sources.retain(|source, state| {
            let keep = state.age(now).is_none_or(|age| age <= timeout);
            if !keep {
                debug!(%source, last_seen = ?state.last_seen, "source stale");
            }
            keep
        });
        before - self.sources.len()
    }
}

impl Default for Ingestor {
    fn default() -> Self {
        Ingestor::new(Framing::Bare, STALE_TIMEOUT)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

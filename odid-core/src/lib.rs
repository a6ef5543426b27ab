//! odid-core: Pure decode + assembly library for Open Drone ID (ASTM F3411).
//!
//! No async, no I/O, just codecs and per-source state. This crate is the
//! shared core used by `odid-receiver` (capture replay, stdin listener and
//! the sharded ingestion pipeline).

pub mod assembler;
pub mod codec;
pub mod decode;
pub mod encode;
pub mod frame;
pub mod ingest;
pub mod types;

// Re-export commonly used types at crate root
pub use assembler::{assemble_pack, merge, UasSnapshot};
pub use decode::{decode_message, decode_message_pack};
pub use encode::{encode_message, encode_message_pack};
pub use frame::{classify, strip_wifi_nan_action_frame, MessageHeader, NanFrame, RawFrame};
pub use ingest::{Diagnostic, IngestEvent, Ingestor, SnapshotUpdate, UpdateOrigin};
pub use types::*;

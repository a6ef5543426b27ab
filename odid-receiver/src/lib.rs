//! odid-receiver: Open Drone ID ingestion runtime.
//!
//! Wraps the synchronous `odid_core::Ingestor` in a sharded Tokio pipeline
//! with bounded per-consumer output queues, and provides the capture
//! parsing and configuration used by the `odid` binary.

pub mod capture;
pub mod config;
pub mod error;
pub mod pipeline;

pub use config::{Config, LogConfig, PipelineConfig};
pub use error::{ReceiverError, Result};
pub use pipeline::{Observer, Pipeline, PipelineStats};

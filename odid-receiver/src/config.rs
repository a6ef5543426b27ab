//! Configuration file management for odid-decode.
//!
//! Reads/writes `~/.odid-decode/config.yaml` with pipeline sizing, payload
//! framing, and the default log filter. Every key is optional.

use std::path::{Path, PathBuf};

use odid_core::ingest::STALE_TIMEOUT;
use odid_core::Framing;
use serde::{Deserialize, Serialize};

use crate::error::{ReceiverError, Result};

/// Full configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Worker tasks; each source is always handled by the same one.
    pub shards: usize,
    /// Per-shard input queue capacity.
    pub frame_queue: usize,
    /// Per-consumer capacity of the snapshot and diagnostic channels.
    pub event_queue: usize,
    pub framing: Framing,
    /// Seconds of silence before a source is dropped.
    pub stale_timeout: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive.
    pub filter: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            shards: 4,
            frame_queue: 1024,
            event_queue: 1024,
            framing: Framing::Bare,
            stale_timeout: STALE_TIMEOUT,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            filter: "info".into(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        let p = &self.pipeline;
        if p.shards == 0 {
            return Err(ReceiverError::Config("pipeline.shards must be at least 1".into()));
        }
        if p.frame_queue == 0 || p.event_queue == 0 {
            return Err(ReceiverError::Config("pipeline queue capacities must be at least 1".into()));
        }
        if !p.stale_timeout.is_finite() || p.stale_timeout <= 0.0 {
            return Err(ReceiverError::Config(format!(
                "pipeline.stale_timeout must be positive, got {}",
                p.stale_timeout
            )));
        }
        Ok(())
    }
}

/// Get the config directory path (`~/.odid-decode/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".odid-decode")
}

/// Get the config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.yaml")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load config from `path`. Returns the default config if the file doesn't exist.
pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| ReceiverError::File {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&text)
}

/// Parse and validate YAML config text.
pub fn parse_config(text: &str) -> Result<Config> {
    let blank = text
        .lines()
        .map(str::trim)
        .all(|l| l.is_empty() || l.starts_with('#'));
    if blank {
        return Ok(Config::default());
    }
    let config: Config = serde_yaml_ng::from_str(text)?;
    config.validate()?;
    Ok(config)
}

pub fn save_config_to(path: &Path, config: &Config) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let text = serde_yaml_ng::to_string(config)?;
    std::fs::write(path, text)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! odid: Open Drone ID capture decoder and live listener.
//!
//! Supports:
//! - Decoding a capture file into JSON snapshot updates
//! - Listening on stdin for frames piped from a scanner
//! - Printing or initialising the config file

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use odid_core::{Diagnostic, Framing, SnapshotUpdate};
use odid_receiver::capture::{self, FeedStats};
use odid_receiver::config::{self, Config, LogConfig};
use odid_receiver::{Observer, Pipeline, ReceiverError, Result};

#[derive(Parser)]
#[command(name = "odid", version, about = "Open Drone ID decoder and receiver")]
struct Cli {
    /// Config file (default: ~/.odid-decode/config.yaml)
    #[arg(long, global = true, env = "ODID_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter, overrides RUST_LOG and the config file (e.g. "debug", "odid_core=trace")
    #[arg(long, global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a capture file and print one JSON snapshot update per line
    Decode {
        /// Capture file with one frame per line
        file: PathBuf,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Decode frames read from stdin until EOF or Ctrl-C
    Listen {
        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Print the resolved configuration
    Config {
        /// Write a default config file instead
        #[arg(long)]
        init: bool,

        /// Overwrite an existing file with --init
        #[arg(long, requires = "init")]
        force: bool,
    },
}

#[derive(clap::Args)]
struct PipelineArgs {
    /// Payload framing
    #[arg(long, value_enum)]
    framing: Option<FramingArg>,

    /// Number of decoder shards
    #[arg(long)]
    shards: Option<usize>,
}

#[derive(Clone, Copy, ValueEnum)]
enum FramingArg {
    /// Payload starts with the message header
    Bare,
    /// Bluetooth service data (application code + counter)
    Ble,
    /// Wi-Fi NAN service discovery action frame, from the 802.11 header on
    WifiNan,
}

impl From<FramingArg> for Framing {
    fn from(arg: FramingArg) -> Self {
        match arg {
            FramingArg::Bare => Framing::Bare,
            FramingArg::Ble => Framing::BleServiceData,
            FramingArg::WifiNan => Framing::WifiNan,
        }
    }
}

impl PipelineArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(framing) = self.framing {
            config.pipeline.framing = framing.into();
        }
        if let Some(shards) = self.shards {
            config.pipeline.shards = shards;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(config::config_file);
    let mut config = match config::load_config_from(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading {}: {e}", config_path.display());
            return ExitCode::FAILURE;
        }
    };

    init_logging(cli.log.as_deref(), &config.log);

    let result = match cli.command {
        Commands::Decode { file, pipeline } => {
            pipeline.apply(&mut config);
            cmd_decode(file, config).await
        }
        Commands::Listen { pipeline } => {
            pipeline.apply(&mut config);
            cmd_listen(config).await
        }
        Commands::Config { init, force } => cmd_config(config_path, &config, init, force),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr so stdout carries only JSON. `--log` wins over RUST_LOG,
/// which wins over the config file.
fn init_logging(cli_filter: Option<&str>, config: &LogConfig) {
    let filter = cli_filter
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(&config.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_decode(file: PathBuf, config: Config) -> Result<()> {
    let handle = tokio::fs::File::open(&file)
        .await
        .map_err(|source| ReceiverError::File {
            path: file.clone(),
            source,
        })?;
    info!(file = %file.display(), "Decoding capture");
    run(BufReader::new(handle), config).await
}

async fn cmd_listen(config: Config) -> Result<()> {
    info!("Listening on stdin");
    run(BufReader::new(tokio::io::stdin()), config).await
}

fn cmd_config(path: PathBuf, config: &Config, init: bool, force: bool) -> Result<()> {
    if init {
        if path.exists() && !force {
            return Err(ReceiverError::Config(format!(
                "{} already exists (use --force to overwrite)",
                path.display()
            )));
        }
        config::save_config_to(&path, &Config::default())?;
        eprintln!("Wrote {}", path.display());
        return Ok(());
    }

    config.validate()?;
    print!("{}", serde_yaml_ng::to_string(config)?);
    Ok(())
}

/// Feed `reader` through a fresh pipeline, printing updates as JSON lines.
async fn run<R>(reader: R, config: Config) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    config.validate()?;
    let pipeline = Pipeline::spawn(&config.pipeline);
    let printer = pipeline.register_observer(JsonLinesObserver::new());

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, draining pipeline");
            interrupt.cancel();
        }
    });

    let fed = capture::feed(reader, &pipeline, &cancel).await;
    let stats = pipeline.shutdown().await?;
    let printer = printer.await?;
    let FeedStats {
        lines, rejected, ..
    } = fed?;

    eprintln!(
        "{lines} lines, {} frames, {} snapshot updates, {} diagnostics, {} sources, {rejected} rejected lines",
        stats.frames, stats.snapshots, stats.diagnostics, stats.sources
    );
    if printer.failed > 0 {
        warn!(failed = printer.failed, "Some updates could not be written");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Prints snapshot updates to stdout as JSON lines; diagnostics go to the log.
struct JsonLinesObserver {
    out: std::io::Stdout,
    failed: u64,
}

impl JsonLinesObserver {
    fn new() -> Self {
        JsonLinesObserver {
            out: std::io::stdout(),
            failed: 0,
        }
    }

    fn write(&mut self, update: &SnapshotUpdate) -> Result<()> {
        let mut out = self.out.lock();
        serde_json::to_writer(&mut out, update)?;
        writeln!(out)?;
        Ok(())
    }
}

impl Observer for JsonLinesObserver {
    fn on_snapshot(&mut self, update: &SnapshotUpdate) {
        if let Err(e) = self.write(update) {
            self.failed += 1;
            warn!(source = %update.source, "Output failed: {e}");
        }
    }

    fn on_diagnostic(&mut self, diagnostic: &Diagnostic) {
        warn!(
            source = %diagnostic.source,
            kind = %diagnostic.error.kind(),
            offset = diagnostic.error.offset(),
            skipped_index = diagnostic.skipped_index,
            "{}",
            diagnostic.error
        );
    }

    fn on_lagged(&mut self, missed: u64) {
        warn!(missed, "Output fell behind, events dropped");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framing_flag() {
        let cli = Cli::try_parse_from(["odid", "listen", "--framing", "wifi-nan"]).unwrap();
        let Commands::Listen { pipeline } = cli.command else {
            panic!("expected listen");
        };
        let mut config = Config::default();
        pipeline.apply(&mut config);
        assert_eq!(config.pipeline.framing, Framing::WifiNan);

        assert!(Cli::try_parse_from(["odid", "listen", "--framing", "ble"]).is_ok());
        assert!(Cli::try_parse_from(["odid", "listen", "--framing", "nan"]).is_err());
    }
}

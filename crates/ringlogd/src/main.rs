//! Ring log daemon
//!
//! Listens for line-oriented TCP clients and answers every completed line
//! with the retained log.
//!
//! ## Usage
//!
//! ```bash
//! # In-memory ring of the last 10 lines on port 9000
//! ringlogd
//!
//! # File mode with a timestamp line every 10 seconds
//! ringlogd --file /var/tmp/aesdsocketdata
//!
//! # Load a JSON config, then override the port
//! ringlogd --config ringlog.json --port 9100 -v
//!
//! # Also write JSONL diagnostics
//! ringlogd --log-dir ./logs
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ringlog_core::logging::{filter_for_verbosity, init_logging};
use ringlog_core::{ConnectionServer, ServerConfig, StoreMode};

/// Ring log daemon - bounded line log served over TCP
#[derive(Parser, Debug)]
#[command(name = "ringlogd")]
#[command(version = "0.1.0")]
#[command(about = "Ring log daemon - bounded line log served over TCP")]
struct Args {
    /// Increase verbosity (-v, -vv, -vvv); info is always on
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// JSON config file, applied before the other flags
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address (default: 0.0.0.0:9000)
    #[arg(short, long)]
    bind: Option<String>,

    /// Listen port, keeping the host of the bind address
    #[arg(short, long)]
    port: Option<u16>,

    /// Use a plain file as the backing store
    #[arg(long, conflicts_with = "capacity")]
    file: Option<PathBuf>,

    /// Use an in-memory ring holding this many lines
    #[arg(long)]
    capacity: Option<usize>,

    /// Disable timestamp lines in file mode
    #[arg(long)]
    no_timestamps: bool,

    /// Seconds between timestamp lines
    #[arg(long)]
    interval: Option<u64>,

    /// Also write JSONL diagnostics into this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

impl Args {
    fn server_config(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => ServerConfig::default(),
        };

        if let Some(bind) = &self.bind {
            config.bind_addr = bind.clone();
        }
        if let Some(port) = self.port {
            config.set_port(port);
        }
        if let Some(path) = &self.file {
            config.mode = StoreMode::File { path: path.clone() };
        }
        if let Some(capacity) = self.capacity {
            config.mode = StoreMode::Ring { capacity };
        }
        if self.no_timestamps {
            config.timestamps = false;
        }
        if let Some(secs) = self.interval {
            config.timestamp_interval_ms = secs.saturating_mul(1000);
            config.timestamp_delay_ms = None;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = filter_for_verbosity(args.verbose.saturating_add(1));
    let jsonl = init_logging(filter, "ringlogd", args.log_dir.as_deref())
        .context("setting up logging")?;
    if let Some(path) = jsonl {
        tracing::info!(path = %path.display(), "Writing JSONL diagnostics");
    }

    let config = args.server_config().inspect_err(|e| {
        tracing::error!(error = %e, "Invalid configuration");
    })?;

    let server = ConnectionServer::bind(config).inspect_err(|e| {
        tracing::error!(error = %e, "Server setup failed");
    })?;

    let handle = server.shutdown_handle();
    ctrlc::set_handler(move || {
        tracing::info!("Caught signal, exiting");
        handle.trigger();
    })
    .context("installing signal handler")?;

    let report = server.run();
    tracing::info!(
        handlers = report.handlers_joined,
        panicked = report.handlers_panicked,
        lines = report.lines_committed,
        bytes_sent = report.bytes_sent,
        timestamps = report.timestamps_written,
        "Exited cleanly"
    );
    Ok(())
}

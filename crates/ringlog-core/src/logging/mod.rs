//! Diagnostic logging setup.
//!
//! Console output always goes to stderr through `tracing_subscriber::fmt`. When a log
//! directory is given, every event is also appended as one JSON object per
//! line to `<dir>/<date>_<instance>.jsonl`.
//!
//! ```bash
//! # Every rejected seek
//! jq 'select(.msg == "Seek rejected")' logs/*.jsonl
//! ```

pub mod layer;

use std::path::{Path, PathBuf};

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

pub use layer::{DiagnosticRecord, JsonlLayer};

/// Map a `-v` count to a filter directive.
pub fn filter_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. `RUST_LOG` overrides `default_filter`.
///
/// Returns the JSONL file path when `log_dir` is set.
pub fn init_logging(
    default_filter: &str,
    instance: &str,
    log_dir: Option<&Path>,
) -> std::io::Result<Option<PathBuf>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let jsonl = log_dir
        .map(|dir| JsonlLayer::new(dir, instance))
        .transpose()?;
    let jsonl_path = jsonl.as_ref().map(|layer| layer.log_path().to_path_buf());

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(jsonl)
        .try_init()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    Ok(jsonl_path)
}

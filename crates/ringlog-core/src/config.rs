//! Server configuration.
//!
//! Configuration can be built in code, loaded from a JSON file, or both:
//! the daemon loads the file first (if any) and then applies its flags.
//!
//! ```json
//! {
//!   "bind_addr": "0.0.0.0:9000",
//!   "mode": { "kind": "file", "path": "/var/tmp/aesdsocketdata" },
//!   "timestamps": true,
//!   "timestamp_interval_ms": 10000
//! }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::buffer::DEFAULT_CAPACITY;
use crate::error::{LogError, LogResult};
use crate::store::file::DEFAULT_DATA_FILE;

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 9000;

/// Default delay between timestamp lines.
pub const DEFAULT_TIMESTAMP_INTERVAL: Duration = Duration::from_secs(10);

/// Which backing store the server uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreMode {
    /// In-memory ring of at most `capacity` entries
    Ring { capacity: usize },
    /// Plain file, truncated at start and removed at shutdown
    File { path: PathBuf },
}

impl StoreMode {
    pub fn default_file() -> Self {
        StoreMode::File {
            path: PathBuf::from(DEFAULT_DATA_FILE),
        }
    }
}

impl Default for StoreMode {
    fn default() -> Self {
        StoreMode::Ring {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl fmt::Display for StoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreMode::Ring { capacity } => write!(f, "ring(capacity={})", capacity),
            StoreMode::File { path } => write!(f, "file({})", path.display()),
        }
    }
}

/// Everything [`ConnectionServer`](crate::server::ConnectionServer) needs to start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on (e.g. "0.0.0.0:9000")
    pub bind_addr: String,

    /// Backing store selection
    pub mode: StoreMode,

    /// Append timestamp lines (only honoured by stores that support them)
    pub timestamps: bool,

    /// Interval between timestamp lines in milliseconds
    pub timestamp_interval_ms: u64,

    /// Delay before the first timestamp line; defaults to the interval
    pub timestamp_delay_ms: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{}", DEFAULT_PORT),
            mode: StoreMode::default(),
            timestamps: true,
            timestamp_interval_ms: DEFAULT_TIMESTAMP_INTERVAL.as_millis() as u64,
            timestamp_delay_ms: None,
        }
    }
}

impl ServerConfig {
    /// Load and validate a JSON config file. Missing fields use defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> LogResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> LogResult<Self> {
        let config: ServerConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Replace the port of `bind_addr`, keeping its host.
    pub fn set_port(&mut self, port: u16) {
        let host = match self.bind_addr.rsplit_once(':') {
            Some((host, _)) if !host.is_empty() => host.to_string(),
            _ => "0.0.0.0".to_string(),
        };
        self.bind_addr = format!("{}:{}", host, port);
    }

    pub fn timestamp_interval(&self) -> Duration {
        Duration::from_millis(self.timestamp_interval_ms)
    }

    pub fn timestamp_delay(&self) -> Duration {
        Duration::from_millis(self.timestamp_delay_ms.unwrap_or(self.timestamp_interval_ms))
    }

    pub fn validate(&self) -> LogResult<()> {
        if self.bind_addr.trim().is_empty() {
            return Err(LogError::Config("bind address must not be empty".into()));
        }
        match &self.mode {
            StoreMode::Ring { capacity: 0 } => {
                return Err(LogError::Config("ring capacity must be at least 1".into()));
            }
            StoreMode::File { path } if path.as_os_str().is_empty() => {
                return Err(LogError::Config("file path must not be empty".into()));
            }
            _ => {}
        }
        if self.timestamps && self.timestamp_interval_ms == 0 {
            return Err(LogError::Config(
                "timestamp interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

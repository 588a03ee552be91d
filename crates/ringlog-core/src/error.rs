//! Error types for the ring log

use thiserror::Error;

/// Main error type for ring log operations
#[derive(Error, Debug)]
pub enum LogError {
    /// Server setup failed before the accept loop started
    #[error("Setup failed at {step}: {source}")]
    Setup {
        step: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// General I/O error (socket or backing store)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Seek target is not a live entry, or the offset is past its end
    #[error("Seek out of range: entry {entry_index}, offset {byte_offset}")]
    SeekOutOfRange { entry_index: u32, byte_offset: u32 },

    /// Control line could not be parsed
    #[error("Malformed command: {0}")]
    MalformedCommand(String),

    /// Fewer bytes were transferred than requested
    #[error("Short write: expected {expected} bytes, wrote {written}")]
    ShortWrite { expected: usize, written: usize },

    /// Backing store was already torn down
    #[error("Backing store is closed")]
    StoreClosed,

    /// Configuration value rejected by validation
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// Handler thread could not be spawned
    #[error("Failed to spawn thread: {0}")]
    Spawn(#[source] std::io::Error),
}

impl LogError {
    /// Whether this error should only be logged, leaving the connection open
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LogError::SeekOutOfRange { .. } | LogError::MalformedCommand(_)
        )
    }
}

/// Result type alias using LogError
pub type LogResult<T> = Result<T, LogError>;

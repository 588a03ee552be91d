//! Ringlog Core Library
//!
//! A bounded-history, append-only line log served over TCP.
//!
//! ## Overview
//!
//! Clients connect, send newline-terminated lines, and receive the whole
//! retained log back after each completed line. The log is either an
//! in-memory ring of the most recent entries or a plain file that also
//! collects periodic timestamp lines.
//!
//! ## Core Pieces
//!
//! - **Ring buffer**: [`CircularLogBuffer`] keeps the last N entries and
//!   resolves byte offsets across them
//! - **Backing stores**: [`BackingStore`] gives handlers device-shaped access
//!   to either a [`RingDevice`] or a [`FileStore`]
//! - **Server**: [`ConnectionServer`] runs one OS thread per connection and
//!   joins them all on shutdown
//! - **Seek**: a `SEEK:<entry>,<offset>` line positions the next response
//!
//! ## Quick Start
//!
//! ```ignore
//! use ringlog_core::{ConnectionServer, ServerConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = ConnectionServer::bind(ServerConfig::default())?;
//!     let handle = server.shutdown_handle();
//!     ctrlc::set_handler(move || handle.trigger())?;
//!
//!     let report = server.run();
//!     println!("joined {} handlers", report.handlers_joined);
//!     Ok(())
//! }
//! ```

pub mod buffer;
pub mod client;
pub mod config;
pub mod entry;
pub mod error;
pub mod handler;
pub mod logging;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod store;
pub mod timestamper;

// Re-exports
pub use buffer::CircularLogBuffer;
pub use client::LogClient;
pub use config::{ServerConfig, StoreMode};
pub use entry::LogEntry;
pub use error::{LogError, LogResult};
pub use handler::{ConnectionHandler, HandlerSummary};
pub use protocol::Command;
pub use registry::ThreadRegistry;
pub use server::{ConnectionServer, ServerContext, ShutdownHandle, ShutdownReport};
pub use store::{BackingStore, FileStore, RingDevice, SharedStore};
pub use timestamper::Timestamper;

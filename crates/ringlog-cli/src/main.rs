//! Ring log CLI
//!
//! Thin client for a running `ringlogd`, plus the standalone file writer.
//!
//! ## Usage
//!
//! ```bash
//! # Append two lines and print each response
//! ringlog send "hello" "world"
//!
//! # Read from entry 1, byte 2
//! ringlog seek 1 2
//!
//! # Print the whole retained log
//! ringlog dump --addr 10.0.0.5:9000
//!
//! # Create or truncate a file and write a string into it
//! ringlog write /tmp/out.txt "some text"
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ringlog_core::logging::{filter_for_verbosity, init_logging};
use ringlog_core::LogClient;

/// Ring log - client for the ring log daemon
#[derive(Parser)]
#[command(name = "ringlog")]
#[command(version = "0.1.0")]
#[command(about = "Ring log - client for the ring log daemon")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Connection {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:9000")]
    addr: String,

    /// Milliseconds of silence that end a response
    #[arg(long, default_value_t = 500)]
    timeout_ms: u64,
}

impl Connection {
    fn connect(&self) -> Result<LogClient> {
        LogClient::connect(self.addr.as_str(), Duration::from_millis(self.timeout_ms))
            .with_context(|| format!("connecting to {}", self.addr))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Send lines and print the response to each
    Send {
        #[command(flatten)]
        conn: Connection,

        /// Lines to send; a newline is appended when missing
        #[arg(required = true)]
        lines: Vec<String>,
    },

    /// Print the log starting at an entry and byte offset
    Seek {
        #[command(flatten)]
        conn: Connection,

        /// Zero-based entry index, oldest first
        entry: u32,

        /// Byte offset inside the entry
        offset: u32,
    },

    /// Print the whole retained log
    Dump {
        #[command(flatten)]
        conn: Connection,
    },

    /// Create or truncate a file and write a string into it
    Write {
        /// File to write
        file: PathBuf,

        /// Text to write
        text: String,
    },
}

fn write_file(file: &Path, text: &str) -> Result<()> {
    tracing::debug!("Writing {} to {}", text, file.display());
    let mut handle = std::fs::File::create(file)
        .with_context(|| format!("creating {}", file.display()))?;
    handle
        .write_all(text.as_bytes())
        .with_context(|| format!("writing {}", file.display()))?;
    Ok(())
}

fn print_response(response: &[u8]) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(response)?;
    stdout.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(filter_for_verbosity(cli.verbose), "ringlog", None)
        .context("setting up logging")?;

    match cli.command {
        Commands::Send { conn, lines } => {
            let mut client = conn.connect()?;
            for line in &lines {
                let response = client.send_line(line)?;
                print_response(&response)?;
            }
        }

        Commands::Seek {
            conn,
            entry,
            offset,
        } => {
            let mut client = conn.connect()?;
            let response = client.seek(entry, offset)?;
            print_response(&response)?;
        }

        Commands::Dump { conn } => {
            let mut client = conn.connect()?;
            // Out of range on an empty log, which still returns everything
            let response = client.seek(0, 0)?;
            print_response(&response)?;
        }

        Commands::Write { file, text } => {
            if let Err(e) = write_file(&file, &text) {
                tracing::error!(error = %e, "Write failed");
                return Err(e);
            }
        }
    }

    Ok(())
}

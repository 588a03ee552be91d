//! Line protocol spoken over each connection.
//!
//! Every newline-terminated line is one command:
//! - `SEEK:<entryIndex>,<byteOffset>` repositions the next response
//! - anything else is payload appended to the log verbatim

use crate::error::{LogError, LogResult};

/// Prefix that marks a line as a seek control line.
pub const SEEK_PREFIX: &[u8] = b"SEEK:";

/// A parsed protocol line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// Store this line (terminator included)
    Append(&'a [u8]),
    /// Stream the next response from this entry and offset
    Seek { entry_index: u32, byte_offset: u32 },
}

impl<'a> Command<'a> {
    /// Classify one line. A `SEEK:` line that fails to parse is an error and
    /// is never treated as payload.
    pub fn parse(line: &'a [u8]) -> LogResult<Self> {
        match line.strip_prefix(SEEK_PREFIX) {
            Some(args) => parse_seek_args(args),
            None => Ok(Command::Append(line)),
        }
    }
}

fn parse_seek_args(args: &[u8]) -> LogResult<Command<'static>> {
    let args = args.strip_suffix(b"\n").unwrap_or(args);
    let args = args.strip_suffix(b"\r").unwrap_or(args);

    let text = std::str::from_utf8(args)
        .map_err(|_| LogError::MalformedCommand("seek arguments are not UTF-8".into()))?;

    let (index, offset) = text.split_once(',').ok_or_else(|| {
        LogError::MalformedCommand(format!("expected SEEK:<entry>,<offset>, got {:?}", text))
    })?;

    let entry_index = parse_field(index, "entry index")?;
    let byte_offset = parse_field(offset, "byte offset")?;

    Ok(Command::Seek {
        entry_index,
        byte_offset,
    })
}

fn parse_field(value: &str, name: &str) -> LogResult<u32> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|e| LogError::MalformedCommand(format!("invalid {} {:?}: {}", name, value, e)))
}

/// Build the control line for a seek.
pub fn seek_line(entry_index: u32, byte_offset: u32) -> String {
    format!("SEEK:{},{}\n", entry_index, byte_offset)
}

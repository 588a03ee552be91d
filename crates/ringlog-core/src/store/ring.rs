//! In-memory ring device.
//!
//! Behaves like the character device front end of [`CircularLogBuffer`]:
//! - writes are collected until a newline completes an entry
//! - a read returns bytes from at most one entry
//! - `seek_to` maps an entry index and offset onto a read position

use std::num::NonZeroUsize;

use tracing::trace;

use super::BackingStore;
use crate::buffer::CircularLogBuffer;
use crate::entry::LogEntry;
use crate::error::LogResult;

/// Ring-backed store. Only completed lines are readable.
#[derive(Debug)]
pub struct RingDevice {
    buffer: CircularLogBuffer,
    /// Bytes written since the last newline
    pending: Vec<u8>,
}

impl RingDevice {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            buffer: CircularLogBuffer::new(capacity),
            pending: Vec::new(),
        }
    }

    pub fn buffer(&self) -> &CircularLogBuffer {
        &self.buffer
    }

    /// Number of bytes waiting for a newline.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn commit_complete_lines(&mut self) {
        while let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
            let rest = self.pending.split_off(end + 1);
            let line = std::mem::replace(&mut self.pending, rest);
            if let Some(evicted) = self.buffer.add_entry(LogEntry::new(line)) {
                trace!(evicted_bytes = evicted.len(), "Evicted oldest entry");
            }
        }
    }
}

impl BackingStore for RingDevice {
    fn append(&mut self, bytes: &[u8]) -> LogResult<usize> {
        self.pending.extend_from_slice(bytes);
        self.commit_complete_lines();
        Ok(bytes.len())
    }

    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> LogResult<usize> {
        let Ok(pos) = usize::try_from(pos) else {
            return Ok(0);
        };
        let Some((entry, offset)) = self.buffer.find_entry_for_offset(pos) else {
            return Ok(0);
        };

        let available = &entry.as_bytes()[offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }

    fn seek_to(&mut self, entry_index: u32, byte_offset: u32) -> LogResult<u64> {
        self.buffer.seek_to(entry_index, byte_offset)
    }

    fn len(&self) -> u64 {
        self.buffer.total_len() as u64
    }

    fn teardown(&mut self) -> LogResult<()> {
        self.buffer.clear();
        self.pending.clear();
        Ok(())
    }
}

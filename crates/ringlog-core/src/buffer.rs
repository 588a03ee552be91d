//! Fixed-capacity ring of log entries.
//!
//! The buffer holds at most `N` entries. Once full, every append overwrites
//! the oldest entry. Eviction is purely by entry count, never by byte volume.
//!
//! Reads address the buffer as one byte stream: the live entries are
//! concatenated oldest first, and offset 0 is the first byte of the oldest
//! live entry.
//!
//! ```text
//!  slots:  [ e3 | e4 | e0 | e1 | e2 ]      capacity 5, full
//!                     ^read_index
//!                     ^write_index
//!  logical: e0 e1 e2 e3 e4
//! ```
//!
//! Any locking is the caller's responsibility.

use std::num::NonZeroUsize;

use crate::entry::LogEntry;
use crate::error::{LogError, LogResult};

/// Default number of entries kept by the ring.
pub const DEFAULT_CAPACITY: usize = 10;

const DEFAULT_RING_CAPACITY: NonZeroUsize = match NonZeroUsize::new(DEFAULT_CAPACITY) {
    Some(capacity) => capacity,
    None => panic!("default capacity must be non-zero"),
};

/// Fixed-capacity circular buffer of [`LogEntry`] values.
#[derive(Debug)]
pub struct CircularLogBuffer {
    slots: Box<[LogEntry]>,
    /// Slot the next entry is written to
    write_index: usize,
    /// Slot holding the oldest live entry
    read_index: usize,
    full: bool,
}

impl CircularLogBuffer {
    /// Create an empty ring holding at most `capacity` entries.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            slots: vec![LogEntry::default(); capacity.get()].into_boxed_slice(),
            write_index: 0,
            read_index: 0,
            full: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        if self.full {
            self.capacity()
        } else if self.write_index >= self.read_index {
            self.write_index - self.read_index
        } else {
            self.capacity() - self.read_index + self.write_index
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.full && self.write_index == self.read_index
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Store `entry` in the next slot.
    ///
    /// If the ring was full, the oldest entry is overwritten and returned.
    pub fn add_entry(&mut self, entry: LogEntry) -> Option<LogEntry> {
        let capacity = self.capacity();
        let previous = std::mem::replace(&mut self.slots[self.write_index], entry);

        self.write_index = (self.write_index + 1) % capacity;

        if self.full {
            self.read_index = (self.read_index + 1) % capacity;
            Some(previous)
        } else {
            if self.write_index == self.read_index {
                self.full = true;
            }
            None
        }
    }

    /// Physical slot indices of the live entries, oldest first.
    ///
    /// When full this runs from `read_index` to the end of the slots and then
    /// wraps from slot 0 up to (excluding) `read_index`.
    fn live_slots(&self) -> impl Iterator<Item = usize> + '_ {
        let capacity = self.capacity();
        (0..self.len()).map(move |i| (self.read_index + i) % capacity)
    }

    /// Iterate over the live entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> + '_ {
        self.live_slots().map(move |slot| &self.slots[slot])
    }

    /// Get the live entry at `index`, where 0 is the oldest.
    pub fn get(&self, index: usize) -> Option<&LogEntry> {
        if index >= self.len() {
            return None;
        }
        Some(&self.slots[(self.read_index + index) % self.capacity()])
    }

    /// Total number of bytes across all live entries.
    pub fn total_len(&self) -> usize {
        self.iter().map(LogEntry::len).sum()
    }

    /// Concatenation of every live entry, oldest first.
    pub fn contents(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_len());
        for entry in self.iter() {
            out.extend_from_slice(entry.as_bytes());
        }
        out
    }

    /// Resolve a global byte offset to the entry containing it.
    ///
    /// Returns the entry and the offset within that entry, or `None` if
    /// `offset` is at or past the end of the live content.
    pub fn find_entry_for_offset(&self, offset: usize) -> Option<(&LogEntry, usize)> {
        let mut remaining = offset;
        for entry in self.iter() {
            if remaining < entry.len() {
                return Some((entry, remaining));
            }
            remaining -= entry.len();
        }
        None
    }

    /// Convert `(entry_index, byte_offset)` into a global offset.
    ///
    /// `entry_index` counts from the oldest live entry. The offset must fall
    /// inside that entry. Nothing is mutated on failure.
    pub fn seek_to(&self, entry_index: u32, byte_offset: u32) -> LogResult<u64> {
        let index = entry_index as usize;
        let offset = byte_offset as usize;

        let in_range = self
            .get(index)
            .map(|entry| offset < entry.len())
            .unwrap_or(false);
        if !in_range {
            return Err(LogError::SeekOutOfRange {
                entry_index,
                byte_offset,
            });
        }

        let preceding: usize = self.iter().take(index).map(LogEntry::len).sum();
        Ok((preceding + offset) as u64)
    }

    /// Release every entry and reset the ring to empty.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = LogEntry::default();
        }
        self.write_index = 0;
        self.read_index = 0;
        self.full = false;
    }
}

impl Default for CircularLogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_RING_CAPACITY)
    }
}

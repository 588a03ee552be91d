//! Byte-oriented backing stores for the log.
//!
//! Connection handlers never touch a concrete store. They go through
//! [`BackingStore`], which has the shape of a character device:
//! appending writes, positioned reads, and a seek control operation.
//!
//! Two stores exist:
//! - [`RingDevice`]: the in-memory ring of entries (device mode)
//! - [`FileStore`]: a plain file on disk (file mode, with timestamps)

pub mod file;
pub mod ring;

use std::num::NonZeroUsize;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::StoreMode;
use crate::error::{LogError, LogResult};

pub use file::FileStore;
pub use ring::RingDevice;

/// Device-shaped access to the log content.
///
/// Implementations do no locking of their own. Callers share a store through
/// [`SharedStore`] and hold the mutex for each individual call.
pub trait BackingStore: Send {
    /// Append `bytes`, returning how many were accepted.
    fn append(&mut self, bytes: &[u8]) -> LogResult<usize>;

    /// Read content starting at the absolute position `pos`.
    ///
    /// Returns 0 once `pos` reaches the end of the content.
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> LogResult<usize>;

    /// Resolve `(entry_index, byte_offset)` to an absolute read position.
    fn seek_to(&mut self, entry_index: u32, byte_offset: u32) -> LogResult<u64>;

    /// Current length of the readable content in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether periodic timestamp lines belong in this store.
    fn supports_timestamps(&self) -> bool {
        false
    }

    /// Release the storage. Safe to call more than once.
    fn teardown(&mut self) -> LogResult<()>;
}

/// The single mutex every reader and writer of the log goes through.
pub type SharedStore = Arc<Mutex<Box<dyn BackingStore>>>;

/// Wrap a store so it can be shared between handler threads.
pub fn shared(store: impl BackingStore + 'static) -> SharedStore {
    Arc::new(Mutex::new(Box::new(store)))
}

/// Open the store selected by `mode`.
pub fn open_store(mode: &StoreMode) -> LogResult<Box<dyn BackingStore>> {
    match mode {
        StoreMode::Ring { capacity } => {
            let capacity = NonZeroUsize::new(*capacity)
                .ok_or_else(|| LogError::Config("ring capacity must be at least 1".into()))?;
            Ok(Box::new(RingDevice::new(capacity)))
        }
        StoreMode::File { path } => {
            let store = FileStore::open(path).map_err(|source| LogError::Setup {
                step: "open backing file",
                source,
            })?;
            Ok(Box::new(store))
        }
    }
}

/// Read the whole content of a store, one positioned read at a time.
pub fn read_all(store: &mut dyn BackingStore) -> LogResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = store.read_at(out.len() as u64, &mut chunk)?;
        if n == 0 {
            return Ok(out);
        }
        out.extend_from_slice(&chunk[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_ring_store() {
        let mut store = open_store(&StoreMode::Ring { capacity: 3 }).unwrap();
        assert!(!store.supports_timestamps());
        store.append(b"abc\n").unwrap();
        assert_eq!(read_all(store.as_mut()).unwrap(), b"abc\n");
    }

    #[test]
    fn test_open_ring_store_rejects_zero_capacity() {
        let result = open_store(&StoreMode::Ring { capacity: 0 });
        assert!(matches!(result, Err(LogError::Config(_))));
    }

    #[test]
    fn test_open_file_store() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data");
        let mut store = open_store(&StoreMode::File { path: path.clone() }).unwrap();
        assert!(store.supports_timestamps());
        store.append(b"x\n").unwrap();
        assert_eq!(read_all(store.as_mut()).unwrap(), b"x\n");
        store.teardown().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_open_file_store_missing_dir() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing").join("data");
        let result = open_store(&StoreMode::File { path });
        assert!(matches!(result, Err(LogError::Setup { .. })));
    }

    #[test]
    fn test_shared_store_serializes_access() {
        let store = shared(RingDevice::new(NonZeroUsize::new(8).unwrap()));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let line = format!("writer-{}\n", i);
                    store.lock().append(line.as_bytes()).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut guard = store.lock();
        let content = read_all(&mut **guard).unwrap();
        let text = String::from_utf8(content).unwrap();
        for i in 0..4 {
            assert_eq!(text.matches(&format!("writer-{}\n", i)).count(), 1);
        }
    }
}

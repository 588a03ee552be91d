//! File-backed store.
//!
//! The file is truncated when the store opens and removed at teardown.
//! Entries are the newline-terminated lines of the file.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::BackingStore;
use crate::error::{LogError, LogResult};

/// Default location of the data file.
pub const DEFAULT_DATA_FILE: &str = "/var/tmp/aesdsocketdata";

/// Plain on-disk log file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    /// `None` once torn down
    file: Option<File>,
    len: u64,
}

impl FileStore {
    /// Create or truncate the file at `path`.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(&path)?;

        debug!(path = %path.display(), "Opened backing file");

        Ok(Self {
            path,
            file: Some(file),
            len: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file(&mut self) -> LogResult<&mut File> {
        self.file.as_mut().ok_or(LogError::StoreClosed)
    }

    fn read_contents(&mut self) -> LogResult<Vec<u8>> {
        let file = self.file()?;
        let mut contents = Vec::new();
        file.seek(SeekFrom::Start(0))?;
        file.read_to_end(&mut contents)?;
        Ok(contents)
    }
}

impl BackingStore for FileStore {
    fn append(&mut self, bytes: &[u8]) -> LogResult<usize> {
        let file = self.file()?;
        file.seek(SeekFrom::End(0))?;
        let written = file.write(bytes)?;
        self.len += written as u64;
        Ok(written)
    }

    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> LogResult<usize> {
        let file = self.file()?;
        file.seek(SeekFrom::Start(pos))?;
        Ok(file.read(buf)?)
    }

    fn seek_to(&mut self, entry_index: u32, byte_offset: u32) -> LogResult<u64> {
        let contents = self.read_contents()?;
        let mut position = 0u64;

        for (index, line) in contents.split_inclusive(|b| *b == b'\n').enumerate() {
            if index == entry_index as usize {
                if (byte_offset as usize) < line.len() {
                    return Ok(position + byte_offset as u64);
                }
                break;
            }
            position += line.len() as u64;
        }

        Err(LogError::SeekOutOfRange {
            entry_index,
            byte_offset,
        })
    }

    fn len(&self) -> u64 {
        self.len
    }

    fn supports_timestamps(&self) -> bool {
        true
    }

    fn teardown(&mut self) -> LogResult<()> {
        if self.file.take().is_none() {
            return Ok(());
        }
        self.len = 0;

        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Removed backing file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            warn!(path = %self.path.display(), error = %e, "Failed to remove backing file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::read_all;
    use tempfile::TempDir;

    fn open_in(temp: &TempDir) -> FileStore {
        FileStore::open(temp.path().join("aesdsocketdata")).unwrap()
    }

    #[test]
    fn test_open_truncates_existing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("aesdsocketdata");
        std::fs::write(&path, b"stale content\n").unwrap();

        let mut store = FileStore::open(&path).unwrap();
        assert!(store.is_empty());
        assert_eq!(read_all(&mut store).unwrap(), b"");
    }

    #[test]
    fn test_write_appends() {
        let temp = TempDir::new().unwrap();
        let mut store = open_in(&temp);

        assert_eq!(store.append(b"hello\n").unwrap(), 6);
        assert_eq!(store.append(b"world\n").unwrap(), 6);
        assert_eq!(store.len(), 12);
        assert_eq!(read_all(&mut store).unwrap(), b"hello\nworld\n");
    }

    #[test]
    fn test_read_at_position() {
        let temp = TempDir::new().unwrap();
        let mut store = open_in(&temp);
        store.append(b"hello\nworld\n").unwrap();

        let mut buf = [0u8; 3];
        let n = store.read_at(6, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"wor");
        assert_eq!(store.read_at(12, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_seek_uses_line_framing() {
        let temp = TempDir::new().unwrap();
        let mut store = open_in(&temp);
        store.append(b"hello\nworld\npartial").unwrap();

        assert_eq!(store.seek_to(0, 0).unwrap(), 0);
        assert_eq!(store.seek_to(1, 2).unwrap(), 8);
        assert_eq!(store.seek_to(2, 6).unwrap(), 18);
        assert!(store.seek_to(1, 6).is_err());
        assert!(store.seek_to(3, 0).is_err());
    }

    #[test]
    fn test_teardown_removes_file() {
        let temp = TempDir::new().unwrap();
        let mut store = open_in(&temp);
        let path = store.path().to_path_buf();
        store.append(b"data\n").unwrap();
        assert!(path.exists());

        store.teardown().unwrap();
        assert!(!path.exists());
        store.teardown().unwrap();

        assert!(matches!(store.append(b"late\n"), Err(LogError::StoreClosed)));
    }

    #[test]
    fn test_drop_removes_file() {
        let temp = TempDir::new().unwrap();
        let path = {
            let store = open_in(&temp);
            store.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}

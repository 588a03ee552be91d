//! A single committed log record.

/// One committed line of the log.
///
/// The bytes are always owned by the entry, so evicting a slot simply drops
/// the previous value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogEntry {
    data: Vec<u8>,
}

impl LogEntry {
    /// Create an entry that takes ownership of `data`.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    /// Create an entry by copying `bytes`.
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            data: bytes.to_vec(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl From<&str> for LogEntry {
    fn from(s: &str) -> Self {
        Self::from_slice(s.as_bytes())
    }
}

impl From<Vec<u8>> for LogEntry {
    fn from(data: Vec<u8>) -> Self {
        Self { data }
    }
}

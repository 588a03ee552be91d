//! Per-connection protocol loop.
//!
//! ```text
//! serve:  read --newline--> commit --> respond --> read
//!           |
//!           +--peer closed / fatal error--> run closes the stream
//! ```
//!
//! The shared store is locked for each individual write or read, never for
//! the whole connection. A response is therefore not a snapshot: content
//! committed by other connections while it streams may or may not appear.

use std::io::{ErrorKind, Read, Write};

use tracing::{debug, info, warn};

use crate::error::{LogError, LogResult};
use crate::protocol::Command;
use crate::registry::{CompletionFlag, ConnectionId};
use crate::store::SharedStore;

/// Size of a single socket read and of each streamed response chunk.
pub const CHUNK_SIZE: usize = 1024;

/// What a handler did over the life of its connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandlerSummary {
    pub lines_committed: usize,
    pub seeks_applied: usize,
    pub seeks_rejected: usize,
    pub bytes_sent: u64,
}

/// Serves one client connection.
pub struct ConnectionHandler<S> {
    id: ConnectionId,
    peer: String,
    stream: S,
    store: SharedStore,
    /// Bytes received since the last newline
    pending: Vec<u8>,
    /// Read position for the next response only
    position: u64,
    summary: HandlerSummary,
}

impl<S: Read + Write> ConnectionHandler<S> {
    pub fn new(id: ConnectionId, peer: impl Into<String>, stream: S, store: SharedStore) -> Self {
        Self {
            id,
            peer: peer.into(),
            stream,
            store,
            pending: Vec::new(),
            position: 0,
            summary: HandlerSummary::default(),
        }
    }

    /// Serve the connection until the peer closes it or an error occurs.
    ///
    /// The stream is closed before `completed` is marked, and marking is the
    /// last thing this does.
    pub fn run(mut self, completed: CompletionFlag) -> HandlerSummary {
        match self.serve() {
            Ok(()) => debug!(conn = self.id, peer = %self.peer, "Peer closed connection"),
            Err(e) => warn!(conn = self.id, peer = %self.peer, error = %e, "Connection handler failed"),
        }

        let Self {
            id,
            peer,
            stream,
            summary,
            ..
        } = self;
        drop(stream);

        info!(
            conn = id,
            lines = summary.lines_committed,
            bytes_sent = summary.bytes_sent,
            "Closed connection from {}",
            peer
        );
        completed.mark();
        summary
    }

    fn serve(&mut self) -> LogResult<()> {
        let mut buf = [0u8; CHUNK_SIZE];
        loop {
            let n = match self.stream.read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            self.pending.extend_from_slice(&buf[..n]);

            while let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
                let rest = self.pending.split_off(end + 1);
                let line = std::mem::replace(&mut self.pending, rest);

                self.commit(&line)?;
                self.respond()?;
            }
        }
    }

    /// Apply one complete line: store it, or resolve a seek.
    fn commit(&mut self, line: &[u8]) -> LogResult<()> {
        match Command::parse(line) {
            Ok(Command::Append(bytes)) => {
                let written = self.store.lock().append(bytes)?;
                if written != bytes.len() {
                    return Err(LogError::ShortWrite {
                        expected: bytes.len(),
                        written,
                    });
                }
                self.summary.lines_committed += 1;
            }
            Ok(Command::Seek {
                entry_index,
                byte_offset,
            }) => {
                let result = self.store.lock().seek_to(entry_index, byte_offset);
                match result {
                    Ok(position) => {
                        debug!(conn = self.id, entry_index, byte_offset, position, "Seek applied");
                        self.position = position;
                        self.summary.seeks_applied += 1;
                    }
                    Err(e) if e.is_recoverable() => {
                        warn!(conn = self.id, peer = %self.peer, error = %e, "Seek rejected");
                        self.summary.seeks_rejected += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
            Err(e) => {
                warn!(conn = self.id, peer = %self.peer, error = %e, "Ignoring malformed control line");
                self.summary.seeks_rejected += 1;
            }
        }
        Ok(())
    }

    /// Stream the store from the current position, then reset the position.
    fn respond(&mut self) -> LogResult<()> {
        let mut chunk = [0u8; CHUNK_SIZE];
        let mut position = std::mem::take(&mut self.position);

        loop {
            let n = self.store.lock().read_at(position, &mut chunk)?;
            if n == 0 {
                break;
            }

            let sent = self.stream.write(&chunk[..n])?;
            if sent != n {
                return Err(LogError::ShortWrite {
                    expected: n,
                    written: sent,
                });
            }
            position += n as u64;
            self.summary.bytes_sent += n as u64;
        }

        self.stream.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{self, read_all, BackingStore, RingDevice};
    use parking_lot::Mutex;
    use std::io::Cursor;
    use std::num::NonZeroUsize;
    use std::sync::Arc;

    /// In-memory stream: reads from a fixed script, records everything written.
    struct ScriptedStream {
        input: Cursor<Vec<u8>>,
        output: Arc<Mutex<Vec<u8>>>,
        max_write: Option<usize>,
    }

    impl ScriptedStream {
        fn new(input: &[u8]) -> (Self, Arc<Mutex<Vec<u8>>>) {
            let output = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    input: Cursor::new(input.to_vec()),
                    output: output.clone(),
                    max_write: None,
                },
                output,
            )
        }
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for ScriptedStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let n = self.max_write.map(|m| m.min(buf.len())).unwrap_or(buf.len());
            self.output.lock().extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn ring_store(capacity: usize) -> SharedStore {
        store::shared(RingDevice::new(NonZeroUsize::new(capacity).unwrap()))
    }

    fn run(input: &[u8], store: &SharedStore) -> (HandlerSummary, Vec<u8>, CompletionFlag) {
        let (stream, output) = ScriptedStream::new(input);
        let completed = CompletionFlag::new();
        let handler = ConnectionHandler::new(1, "127.0.0.1", stream, store.clone());
        let summary = handler.run(completed.clone());
        let bytes = output.lock().clone();
        (summary, bytes, completed)
    }

    #[test]
    fn test_echoes_full_log_after_each_line() {
        let store = ring_store(10);
        let (summary, output, completed) = run(b"hello\nworld\n", &store);

        assert_eq!(output, b"hello\nhello\nworld\n");
        assert_eq!(summary.lines_committed, 2);
        assert_eq!(summary.bytes_sent, 18);
        assert!(completed.is_set());
    }

    #[test]
    fn test_partial_line_is_not_committed() {
        let store = ring_store(10);
        let (summary, output, _) = run(b"no newline", &store);

        assert!(output.is_empty());
        assert_eq!(summary.lines_committed, 0);
        assert!(read_all(&mut **store.lock()).unwrap().is_empty());
    }

    #[test]
    fn test_seek_applies_to_next_response_only() {
        let store = ring_store(10);
        let (summary, output, _) = run(b"hello\nworld\nSEEK:1,2\nagain\n", &store);

        let expected = [
            &b"hello\n"[..],
            b"hello\nworld\n",
            b"rld\n",
            b"hello\nworld\nagain\n",
        ]
        .concat();
        assert_eq!(output, expected);
        assert_eq!(summary.seeks_applied, 1);
        assert_eq!(summary.lines_committed, 3);
    }

    #[test]
    fn test_seek_line_is_not_stored() {
        let store = ring_store(10);
        run(b"a\nSEEK:0,0\n", &store);
        assert_eq!(read_all(&mut **store.lock()).unwrap(), b"a\n");
    }

    #[test]
    fn test_out_of_range_seek_streams_full_content() {
        let store = ring_store(10);
        let (summary, output, _) = run(b"abc\nSEEK:5,0\nSEEK:0,4\n", &store);

        assert_eq!(output, b"abc\nabc\nabc\n");
        assert_eq!(summary.seeks_rejected, 2);
        assert_eq!(summary.seeks_applied, 0);
    }

    #[test]
    fn test_malformed_seek_is_ignored() {
        let store = ring_store(10);
        let (summary, output, completed) = run(b"abc\nSEEK:x\nnext\n", &store);

        assert_eq!(output, b"abc\nabc\nabc\nnext\n");
        assert_eq!(summary.seeks_rejected, 1);
        assert_eq!(summary.lines_committed, 2);
        assert!(completed.is_set());
    }

    #[test]
    fn test_short_socket_write_closes_connection() {
        let store = ring_store(10);
        let (mut stream, output) = ScriptedStream::new(b"hello\nworld\n");
        stream.max_write = Some(3);
        let completed = CompletionFlag::new();

        let summary =
            ConnectionHandler::new(2, "127.0.0.1", stream, store.clone()).run(completed.clone());

        assert_eq!(summary.lines_committed, 1);
        assert_eq!(output.lock().as_slice(), b"hel");
        assert!(completed.is_set());
    }

    #[test]
    fn test_large_response_is_chunked() {
        let store = ring_store(4);
        let long_line = format!("{}\n", "x".repeat(3 * CHUNK_SIZE));
        let (summary, output, _) = run(long_line.as_bytes(), &store);

        assert_eq!(output, long_line.as_bytes());
        assert_eq!(summary.bytes_sent, long_line.len() as u64);
    }

    /// Store that accepts one byte less than every append asks for.
    struct ShortStore {
        appended: usize,
    }

    impl BackingStore for ShortStore {
        fn append(&mut self, bytes: &[u8]) -> LogResult<usize> {
            let accepted = bytes.len().saturating_sub(1);
            self.appended += accepted;
            Ok(accepted)
        }

        fn read_at(&mut self, _pos: u64, _buf: &mut [u8]) -> LogResult<usize> {
            Ok(0)
        }

        fn seek_to(&mut self, entry_index: u32, byte_offset: u32) -> LogResult<u64> {
            Err(LogError::SeekOutOfRange {
                entry_index,
                byte_offset,
            })
        }

        fn len(&self) -> u64 {
            self.appended as u64
        }

        fn teardown(&mut self) -> LogResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_short_store_write_closes_connection() {
        let short = store::shared(ShortStore { appended: 0 });
        let (summary, output, completed) = run(b"first
second
", &short);

        assert_eq!(summary.lines_committed, 0);
        assert_eq!(summary.bytes_sent, 0);
        assert!(output.is_empty());
        assert!(completed.is_set());
        // Only the first line reached the store before the handler gave up
        assert_eq!(short.lock().len(), 5);
    }

    #[test]
    fn test_store_failure_ends_handler() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut file = store::FileStore::open(temp.path().join("data")).unwrap();
        file.teardown().unwrap();
        let closed = store::shared(file);

        let (summary, output, completed) = run(b"lost\n", &closed);
        assert_eq!(summary.lines_committed, 0);
        assert!(output.is_empty());
        assert!(completed.is_set());
    }
}

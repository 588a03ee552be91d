//! Blocking client for a running log server.
//!
//! The server never frames its responses, so the client reads until the
//! server has been quiet for `idle_timeout` or closes the connection.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::error::{LogError, LogResult};
use crate::protocol::seek_line;

/// Default quiet period that ends a response.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(500);

pub struct LogClient {
    stream: TcpStream,
}

impl LogClient {
    pub fn connect(addr: impl ToSocketAddrs, idle_timeout: Duration) -> LogResult<Self> {
        let stream = TcpStream::connect(addr).map_err(|source| LogError::Setup {
            step: "connect",
            source,
        })?;
        stream.set_read_timeout(Some(idle_timeout))?;
        Ok(Self { stream })
    }

    /// Send one line and collect the response.
    ///
    /// A trailing newline is added when `line` lacks one.
    pub fn send_line(&mut self, line: &str) -> LogResult<Vec<u8>> {
        self.write_line(line)?;
        self.read_response(None)
    }

    /// Send a seek command and collect the response it positions.
    pub fn seek(&mut self, entry_index: u32, byte_offset: u32) -> LogResult<Vec<u8>> {
        self.send_line(&seek_line(entry_index, byte_offset))
    }

    /// Send one line and read until `expected_len` bytes have arrived.
    ///
    /// Stops early on EOF or after the idle timeout.
    pub fn send_and_read(&mut self, line: &str, expected_len: usize) -> LogResult<Vec<u8>> {
        self.write_line(line)?;
        self.read_response(Some(expected_len))
    }

    /// Close the sending half; the server answers what is pending and hangs up.
    pub fn finish(mut self) -> LogResult<Vec<u8>> {
        self.stream.shutdown(Shutdown::Write)?;
        self.read_response(None)
    }

    fn write_line(&mut self, line: &str) -> LogResult<()> {
        self.stream.write_all(line.as_bytes())?;
        if !line.ends_with('\n') {
            self.stream.write_all(b"\n")?;
        }
        self.stream.flush()?;
        Ok(())
    }

    fn read_response(&mut self, expected_len: Option<usize>) -> LogResult<Vec<u8>> {
        let mut response = Vec::new();
        let mut chunk = [0u8; 1024];

        loop {
            if expected_len.is_some_and(|n| response.len() >= n) {
                break;
            }
            match self.stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => response.extend_from_slice(&chunk[..n]),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        debug!(bytes = response.len(), "Received response");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use std::thread;

    /// Answers every line with "ok:<line>" and never closes first.
    fn echo_server() -> (std::net::SocketAddr, thread::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let mut seen = Vec::new();
            for line in BufReader::new(stream).lines() {
                let line = line.unwrap();
                writer.write_all(format!("ok:{}\n", line).as_bytes()).unwrap();
                seen.push(line);
            }
            seen
        });
        (addr, handle)
    }

    #[test]
    fn test_send_line_appends_newline() {
        let (addr, server) = echo_server();
        let mut client = LogClient::connect(addr, Duration::from_millis(200)).unwrap();

        assert_eq!(client.send_line("hello").unwrap(), b"ok:hello\n");
        assert_eq!(client.send_line("again\n").unwrap(), b"ok:again\n");
        drop(client);

        assert_eq!(server.join().unwrap(), vec!["hello", "again"]);
    }

    #[test]
    fn test_seek_sends_command_line() {
        let (addr, server) = echo_server();
        let mut client = LogClient::connect(addr, Duration::from_millis(200)).unwrap();

        assert_eq!(client.seek(1, 2).unwrap(), b"ok:SEEK:1,2\n");
        drop(client);

        assert_eq!(server.join().unwrap(), vec!["SEEK:1,2"]);
    }

    #[test]
    fn test_send_and_read_stops_at_expected_len() {
        let (addr, server) = echo_server();
        let mut client = LogClient::connect(addr, Duration::from_secs(5)).unwrap();

        let response = client.send_and_read("abc", 7).unwrap();
        assert_eq!(response, b"ok:abc\n");
        drop(client);
        server.join().unwrap();
    }

    #[test]
    fn test_connect_failure_is_setup_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        match LogClient::connect(addr, DEFAULT_IDLE_TIMEOUT) {
            Err(LogError::Setup { step, .. }) => assert_eq!(step, "connect"),
            other => panic!("expected connect failure, got ok={}", other.is_ok()),
        }
    }
}

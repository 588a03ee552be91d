//! Thread-per-connection TCP front end for the log.
//!
//! ```text
//!            accept loop (caller's thread)
//!                 |
//!     +-----------+-----------+
//!     |           |           |
//!  handler     handler     handler      one OS thread per connection
//!     \           |           /
//!      +---- SharedStore ----+          one mutex, held per read/write
//!                 |
//!            timestamper                (file mode only)
//! ```
//!
//! The accept thread owns the [`ThreadRegistry`] and reaps finished handlers
//! after every accepted connection. Shutdown hard-joins whatever is left.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::{LogError, LogResult};
use crate::handler::ConnectionHandler;
use crate::registry::{CompletionFlag, ConnectionId, JoinedHandler, ThreadRecord, ThreadRegistry};
use crate::store::{self, BackingStore, SharedStore};
use crate::timestamper::Timestamper;

/// Pause after a failed accept before trying again.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// State shared by every component of a running server.
#[derive(Clone)]
pub struct ServerContext {
    store: SharedStore,
    config: Arc<ServerConfig>,
    shutdown: Arc<AtomicBool>,
}

impl std::fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerContext")
            .field("store", &"<SharedStore>")
            .field("config", &self.config)
            .field("shutdown", &self.is_shutting_down())
            .finish()
    }
}

impl ServerContext {
    pub fn new(config: ServerConfig, store: Box<dyn BackingStore>) -> Self {
        Self {
            store: Arc::new(parking_lot::Mutex::new(store)),
            config: Arc::new(config),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

/// Requests shutdown from any thread, including a signal handler thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    wake_addr: SocketAddr,
}

impl ShutdownHandle {
    /// Set the shutdown flag and wake the blocked accept call.
    pub fn trigger(&self) {
        if self.flag.swap(true, Ordering::SeqCst) {
            return;
        }
        // The accept loop checks the flag after every accepted connection
        if let Err(e) = TcpStream::connect_timeout(&self.wake_addr, Duration::from_secs(1)) {
            debug!(addr = %self.wake_addr, error = %e, "Wake-up connection failed");
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Totals gathered from every joined handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub handlers_joined: usize,
    pub handlers_panicked: usize,
    pub lines_committed: usize,
    pub bytes_sent: u64,
    pub timestamps_written: u64,
}

impl ShutdownReport {
    fn record(&mut self, joined: &JoinedHandler) {
        self.handlers_joined += 1;
        match joined.summary {
            Some(summary) => {
                self.lines_committed += summary.lines_committed;
                self.bytes_sent += summary.bytes_sent;
            }
            None => self.handlers_panicked += 1,
        }
    }
}

/// Listening socket, shared log and handler bookkeeping.
pub struct ConnectionServer {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    context: ServerContext,
    registry: ThreadRegistry,
    timestamper: Option<Timestamper>,
    next_id: ConnectionId,
    report: ShutdownReport,
    torn_down: bool,
}

impl ConnectionServer {
    /// Open the configured store and bind the listener.
    pub fn bind(config: ServerConfig) -> LogResult<Self> {
        config.validate()?;
        let store = store::open_store(&config.mode)?;
        Self::with_store(config, store)
    }

    /// Bind the listener around an already opened store.
    pub fn with_store(config: ServerConfig, store: Box<dyn BackingStore>) -> LogResult<Self> {
        let listener = TcpListener::bind(config.bind_addr.as_str()).map_err(|source| {
            LogError::Setup {
                step: "bind",
                source,
            }
        })?;
        let local_addr = listener.local_addr().map_err(|source| LogError::Setup {
            step: "local_addr",
            source,
        })?;

        let wants_timestamps = config.timestamps && store.supports_timestamps();
        let context = ServerContext::new(config, store);

        let timestamper = if wants_timestamps {
            let ts = Timestamper::start(
                context.store().clone(),
                context.config().timestamp_delay(),
                context.config().timestamp_interval(),
            )
            .map_err(|source| LogError::Setup {
                step: "start timestamper",
                source,
            })?;
            Some(ts)
        } else {
            None
        };

        info!(
            addr = %local_addr,
            mode = %context.config().mode,
            timestamps = timestamper.is_some(),
            "Listening for connections"
        );

        Ok(Self {
            listener: Some(listener),
            local_addr,
            context,
            registry: ThreadRegistry::new(),
            timestamper,
            next_id: 0,
            report: ShutdownReport::default(),
            torn_down: false,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn context(&self) -> &ServerContext {
        &self.context
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            flag: self.context.shutdown.clone(),
            wake_addr: wake_addr(self.local_addr),
        }
    }

    /// Accept connections until shutdown is triggered, then tear down.
    pub fn run(mut self) -> ShutdownReport {
        self.accept_loop();
        self.shutdown()
    }

    fn accept_loop(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };

        loop {
            let accepted = listener.accept();
            if self.context.is_shutting_down() {
                break;
            }
            match accepted {
                Ok((stream, peer)) => {
                    self.spawn_handler(stream, peer);
                    self.reap();
                }
                Err(e) => self.recover_from_accept_error(&e),
            }
        }

        drop(listener);
        info!(addr = %self.local_addr, "Stopped accepting connections");
    }

    /// Join finished handlers and pause before the next accept.
    fn recover_from_accept_error(&mut self, e: &std::io::Error) {
        error!(error = %e, "Accept failed");
        self.reap();
        thread::sleep(ACCEPT_RETRY_DELAY);
    }

    fn spawn_handler(&mut self, stream: TcpStream, peer: SocketAddr) {
        let id = self.next_id;
        self.next_id += 1;

        let peer_ip = peer.ip().to_string();
        info!(conn = id, "Accepted connection from {}", peer_ip);

        let completed = CompletionFlag::new();
        let handler = ConnectionHandler::new(id, peer_ip.clone(), stream, self.context.store().clone());
        let flag = completed.clone();

        let spawned = thread::Builder::new()
            .name(format!("ringlog-conn-{}", id))
            .spawn(move || handler.run(flag));

        match spawned {
            Ok(handle) => {
                self.registry
                    .insert(ThreadRecord::new(id, peer_ip, completed, handle));
            }
            Err(e) => {
                // The handler and its stream were dropped with the closure
                let err = LogError::Spawn(e);
                error!(conn = id, peer = %peer_ip, error = %err, "Closing connection");
            }
        }
    }

    /// Join handlers that have finished.
    pub fn reap(&mut self) -> usize {
        let joined = self.registry.reap_completed();
        for handler in &joined {
            debug!(conn = handler.id, peer = %handler.peer, "Reaped handler");
            self.report.record(handler);
        }
        joined.len()
    }

    /// Stop accepting, join every handler and release the store.
    ///
    /// Only the first call does anything. Blocks until all handlers return.
    pub fn shutdown(&mut self) -> ShutdownReport {
        if self.torn_down {
            return self.report;
        }
        self.torn_down = true;
        self.context.shutdown.store(true, Ordering::SeqCst);

        if let Some(listener) = self.listener.take() {
            drop(listener);
        }

        if let Some(ts) = self.timestamper.take() {
            self.report.timestamps_written = ts.stop();
        }

        let outstanding = self.registry.len();
        if outstanding > 0 {
            info!(outstanding, "Waiting for connection handlers to finish");
        }
        for handler in self.registry.join_all() {
            self.report.record(&handler);
        }

        if let Err(e) = self.context.store().lock().teardown() {
            warn!(error = %e, "Failed to tear down backing store");
        }

        info!(
            handlers = self.report.handlers_joined,
            lines = self.report.lines_committed,
            "Server shut down"
        );
        self.report
    }
}

impl Drop for ConnectionServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Address a local client can use to reach a listener bound to `addr`.
fn wake_addr(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => SocketAddr::new(Ipv4Addr::LOCALHOST.into(), addr.port()),
        IpAddr::V6(ip) if ip.is_unspecified() => SocketAddr::new(Ipv6Addr::LOCALHOST.into(), addr.port()),
        _ => addr,
    }
}

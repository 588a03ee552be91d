//! Periodic timestamp writer.
//!
//! Appends `timestamp:<RFC 2822 time>\n` to the store on a fixed interval,
//! taking the same lock as connection handlers.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, TimeZone};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::store::SharedStore;

/// strftime format of the time portion of a timestamp line.
pub const TIMESTAMP_FORMAT: &str = "%a, %d %b %Y %T %z";

/// Render one timestamp line.
pub fn format_timestamp<Tz: TimeZone>(time: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("timestamp:{}\n", time.format(TIMESTAMP_FORMAT))
}

/// Wakes the timestamper thread early when it should exit.
#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    cvar: Condvar,
}

impl StopSignal {
    fn raise(&self) {
        *self.stopped.lock() = true;
        self.cvar.notify_all();
    }

    /// Sleep for `timeout` unless stopped first. Returns true if stopped.
    fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.cvar.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }
}

/// Handle to the background timestamp thread.
pub struct Timestamper {
    signal: Arc<StopSignal>,
    handle: Option<JoinHandle<u64>>,
}

impl Timestamper {
    /// Spawn the thread. The first line is written after `first_delay`, then
    /// one every `interval`.
    pub fn start(
        store: SharedStore,
        first_delay: Duration,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let signal = Arc::new(StopSignal::default());
        let thread_signal = signal.clone();

        let handle = thread::Builder::new()
            .name("ringlog-timestamper".into())
            .spawn(move || run(store, thread_signal, first_delay, interval))?;

        debug!(?first_delay, ?interval, "Timestamper started");

        Ok(Self {
            signal,
            handle: Some(handle),
        })
    }

    /// Stop the thread and wait for it. Returns the number of lines written.
    pub fn stop(mut self) -> u64 {
        self.halt()
    }

    fn halt(&mut self) -> u64 {
        self.signal.raise();
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(ticks)) => ticks,
            Some(Err(_)) => {
                warn!("Timestamper thread panicked");
                0
            }
            None => 0,
        }
    }
}

impl Drop for Timestamper {
    fn drop(&mut self) {
        self.halt();
    }
}

fn run(store: SharedStore, signal: Arc<StopSignal>, first_delay: Duration, interval: Duration) -> u64 {
    let mut ticks = 0;
    let mut wait = first_delay;

    while !signal.wait(wait) {
        let line = format_timestamp(&Local::now());
        let result = store.lock().append(line.as_bytes());
        match result {
            Ok(n) if n == line.len() => {
                ticks += 1;
                debug!(line = line.trim_end(), "Wrote timestamp");
            }
            Ok(n) => warn!(expected = line.len(), written = n, "Short timestamp write"),
            Err(e) => warn!(error = %e, "Failed to write timestamp"),
        }
        wait = interval;
    }

    ticks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{self, read_all, RingDevice};
    use chrono::FixedOffset;
    use std::num::NonZeroUsize;

    #[test]
    fn test_format_timestamp() {
        let offset = FixedOffset::east_opt(0).unwrap();
        let time = offset.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        assert_eq!(
            format_timestamp(&time),
            "timestamp:Tue, 05 Mar 2024 14:07:09 +0000\n"
        );
    }

    #[test]
    fn test_writes_timestamps_until_stopped() {
        let shared = store::shared(RingDevice::new(NonZeroUsize::new(64).unwrap()));
        let ts = Timestamper::start(
            shared.clone(),
            Duration::from_millis(10),
            Duration::from_millis(20),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(150));
        let ticks = ts.stop();
        assert!(ticks >= 2, "expected at least two ticks, got {}", ticks);

        let content = read_all(&mut **shared.lock()).unwrap();
        let text = String::from_utf8(content).unwrap();
        assert_eq!(text.lines().count() as u64, ticks);
        assert!(text.lines().all(|l| l.starts_with("timestamp:")));
    }

    #[test]
    fn test_stop_before_first_tick() {
        let shared = store::shared(RingDevice::new(NonZeroUsize::new(4).unwrap()));
        let ts = Timestamper::start(shared.clone(), Duration::from_secs(60), Duration::from_secs(60))
            .unwrap();

        let started = Instant::now();
        assert_eq!(ts.stop(), 0);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(shared.lock().is_empty());
    }
}

//! Bookkeeping for connection handler threads.
//!
//! Records live in an arena of slots. Reaping walks every slot index, so
//! removing one record never causes the next one to be skipped.
//!
//! The registry is owned by the accept thread and has no lock of its own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::error;

use crate::handler::HandlerSummary;

/// Identifier assigned to each accepted connection.
pub type ConnectionId = u64;

/// Set by a handler as the last thing it does before returning.
#[derive(Debug, Clone, Default)]
pub struct CompletionFlag(Arc<AtomicBool>);

impl CompletionFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// One spawned handler thread.
#[derive(Debug)]
pub struct ThreadRecord {
    id: ConnectionId,
    peer: String,
    completed: CompletionFlag,
    handle: JoinHandle<HandlerSummary>,
}

impl ThreadRecord {
    pub fn new(
        id: ConnectionId,
        peer: impl Into<String>,
        completed: CompletionFlag,
        handle: JoinHandle<HandlerSummary>,
    ) -> Self {
        Self {
            id,
            peer: peer.into(),
            completed,
            handle,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_completed(&self) -> bool {
        self.completed.is_set()
    }

    fn join(self) -> JoinedHandler {
        let summary = match self.handle.join() {
            Ok(summary) => Some(summary),
            Err(_) => {
                error!(conn = self.id, peer = %self.peer, "Handler thread panicked");
                None
            }
        };
        JoinedHandler {
            id: self.id,
            peer: self.peer,
            summary,
        }
    }
}

/// Result of joining a handler thread.
#[derive(Debug, Clone)]
pub struct JoinedHandler {
    pub id: ConnectionId,
    pub peer: String,
    /// `None` if the thread panicked
    pub summary: Option<HandlerSummary>,
}

/// Arena of live [`ThreadRecord`]s.
#[derive(Debug, Default)]
pub struct ThreadRegistry {
    slots: Vec<Option<ThreadRecord>>,
    free: Vec<usize>,
    live: usize,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records not yet joined.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Store a record, reusing a freed slot when one exists.
    pub fn insert(&mut self, record: ThreadRecord) -> usize {
        self.live += 1;
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(record);
                index
            }
            None => {
                self.slots.push(Some(record));
                self.slots.len() - 1
            }
        }
    }

    /// Iterate over the records not yet joined.
    pub fn records(&self) -> impl Iterator<Item = &ThreadRecord> + '_ {
        self.slots.iter().flatten()
    }

    /// Join and remove every record whose handler has finished.
    pub fn reap_completed(&mut self) -> Vec<JoinedHandler> {
        let mut joined = Vec::new();
        for index in 0..self.slots.len() {
            let done = self.slots[index]
                .as_ref()
                .map(ThreadRecord::is_completed)
                .unwrap_or(false);
            if !done {
                continue;
            }
            if let Some(record) = self.slots[index].take() {
                self.free.push(index);
                self.live -= 1;
                joined.push(record.join());
            }
        }
        joined
    }

    /// Join every record, finished or not. Blocks until all handlers return.
    pub fn join_all(&mut self) -> Vec<JoinedHandler> {
        let joined = self
            .slots
            .drain(..)
            .flatten()
            .map(ThreadRecord::join)
            .collect();
        self.free.clear();
        self.live = 0;
        joined
    }
}

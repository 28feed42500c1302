//! Room record
//!
//! One live published session: the worker it drives and the subscribers
//! watching its output.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::fanout::{BroadcastOutcome, Broadcaster};
use crate::stats::RoomStats;
use crate::worker::{InputSink, OutputSource, WorkerHandle};

use super::key::{OutputMode, SessionKey};

/// Why a room was torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Publisher finished its input cleanly
    ProducerEnded,
    /// Publisher transport or the worker's input failed
    ProducerError,
    /// Worker process exited on its own
    WorkerExited,
    /// Server is shutting down
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloseReason::ProducerEnded => "producer ended",
            CloseReason::ProducerError => "producer error",
            CloseReason::WorkerExited => "worker exited",
            CloseReason::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// A live published session
pub struct Room {
    id: u64,
    key: SessionKey,
    mode: OutputMode,
    created_at: Instant,
    worker: WorkerHandle,
    fanout: Broadcaster,
    bytes_in: AtomicU64,
    closed: AtomicBool,
}

impl Room {
    pub(super) fn new(id: u64, key: SessionKey, mode: OutputMode, worker: WorkerHandle) -> Self {
        Self {
            id,
            key,
            mode,
            created_at: Instant::now(),
            worker,
            fanout: Broadcaster::new(),
            bytes_in: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Registry-assigned ID, unique for the life of the process
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn worker(&self) -> &WorkerHandle {
        &self.worker
    }

    /// Live subscriber set (empty in segmented mode)
    pub fn fanout(&self) -> &Broadcaster {
        &self.fanout
    }

    /// Relay one chunk of worker output to every subscriber
    ///
    /// The first chunk also marks the worker ready.
    pub fn broadcast(&self, chunk: &Bytes) -> BroadcastOutcome {
        if !self.worker.is_ready() {
            self.worker.mark_ready();
        }
        self.fanout.broadcast(chunk)
    }

    /// Count bytes accepted from the publisher
    pub fn record_ingest(&self, bytes: usize) {
        self.bytes_in.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn bytes_in(&self) -> u64 {
        self.bytes_in.load(Ordering::Relaxed)
    }

    /// True once teardown has begun
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Claim the teardown. Only the first caller gets `true`.
    pub(super) fn begin_close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    pub fn stats(&self) -> RoomStats {
        RoomStats {
            key: self.key.clone(),
            room_id: self.id,
            mode: self.mode,
            age_secs: self.age().as_secs(),
            subscribers: self.fanout.len(),
            bytes_in: self.bytes_in(),
            chunks_out: self.fanout.chunks_sent(),
            bytes_out: self.fanout.bytes_delivered(),
            subscribers_dropped: self.fanout.dropped_count(),
            worker_pid: self.worker.pid(),
            ready: self.worker.is_ready(),
        }
    }
}

impl fmt::Debug for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("mode", &self.mode)
            .field("subscribers", &self.fanout.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A room just registered by a successful publish, with the worker
/// endpoints the publisher drives
pub struct PublishedRoom {
    pub room: Arc<Room>,
    pub input: InputSink,
    pub output: Option<OutputSource>,
}

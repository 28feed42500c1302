//! One-to-many relay of live worker output
//!
//! The attached sink set sits behind a short synchronous lock. Broadcasting
//! never awaits while holding it: each sink gets a non-blocking delivery
//! attempt and is dropped on failure, so one stalled subscriber costs the
//! others nothing.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use bytes::Bytes;
use parking_lot::Mutex;
use uuid::Uuid;

use super::sink::{ChunkSink, DeliveryError};

/// Per-attachment identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberToken(Uuid);

impl SubscriberToken {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriberToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

struct Attachment {
    sink: Box<dyn ChunkSink>,
    attached_at: Instant,
}

struct Inner {
    sinks: HashMap<SubscriberToken, Attachment>,
    closed: bool,
}

/// Result of one broadcast pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Sinks that accepted the chunk
    pub delivered: usize,
    /// Sinks removed during this pass
    pub dropped: usize,
}

/// Set of subscriber sinks for one room
pub struct Broadcaster {
    inner: Mutex<Inner>,
    chunks: AtomicU64,
    bytes: AtomicU64,
    dropped: AtomicU64,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                sinks: HashMap::new(),
                closed: false,
            }),
            chunks: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Add a sink. It sees only chunks broadcast after this call.
    ///
    /// Returns `None` once the broadcaster has been closed.
    pub fn attach(&self, sink: impl ChunkSink + 'static) -> Option<SubscriberToken> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return None;
        }

        let token = SubscriberToken::new();
        inner.sinks.insert(
            token,
            Attachment {
                sink: Box::new(sink),
                attached_at: Instant::now(),
            },
        );
        Some(token)
    }

    /// Remove a sink. Returns false if it was already gone.
    pub fn detach(&self, token: SubscriberToken) -> bool {
        match self.inner.lock().sinks.remove(&token) {
            Some(attachment) => {
                tracing::debug!(
                    subscriber = %token,
                    attached_secs = attachment.attached_at.elapsed().as_secs(),
                    "Subscriber detached"
                );
                true
            }
            None => false,
        }
    }

    /// Hand `chunk` to every attached sink, dropping the ones that fail
    ///
    /// A sink that panics in `deliver` is treated as failed and dropped.
    pub fn broadcast(&self, chunk: &Bytes) -> BroadcastOutcome {
        let mut outcome = BroadcastOutcome::default();
        let mut inner = self.inner.lock();

        inner.sinks.retain(|token, attachment| match deliver(attachment.sink.as_ref(), chunk) {
            Ok(()) => {
                outcome.delivered += 1;
                true
            }
            Err(DeliveryError::Closed) => {
                tracing::debug!(subscriber = %token, "Subscriber gone, removing");
                outcome.dropped += 1;
                false
            }
            Err(e) => {
                tracing::warn!(subscriber = %token, error = %e, "Dropping subscriber");
                outcome.dropped += 1;
                false
            }
        });
        drop(inner);

        self.chunks.fetch_add(1, Ordering::Relaxed);
        self.bytes
            .fetch_add(chunk.len() as u64 * outcome.delivered as u64, Ordering::Relaxed);
        self.dropped
            .fetch_add(outcome.dropped as u64, Ordering::Relaxed);

        outcome
    }

    /// Drop every sink and refuse new attachments
    pub fn close(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.closed = true;
        let count = inner.sinks.len();
        inner.sinks.clear();
        count
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Number of attached sinks
    pub fn len(&self) -> usize {
        self.inner.lock().sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Chunks broadcast so far
    pub fn chunks_sent(&self) -> u64 {
        self.chunks.load(Ordering::Relaxed)
    }

    /// Bytes delivered across all sinks
    pub fn bytes_delivered(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Sinks dropped for failing delivery
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

fn deliver(sink: &dyn ChunkSink, chunk: &Bytes) -> Result<(), DeliveryError> {
    panic::catch_unwind(AssertUnwindSafe(|| sink.deliver(chunk)))
        .unwrap_or_else(|_| Err(DeliveryError::Failed("sink panicked".to_string())))
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

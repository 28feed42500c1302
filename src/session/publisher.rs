//! Publish session
//!
//! Drives one room from the publisher's side: forwards ingested bytes into
//! the worker, relays worker output to subscribers, and tears the room down
//! on whichever of producer end, producer error or worker exit comes first.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::error::{IngestError, Result};
use crate::ingest::{ByteSink, WriteStatus};
use crate::registry::{CloseReason, Room, RoomRegistry, SessionKey};
use crate::worker::{InputSink, OutputSource};

use super::context::PublishContext;

/// Worker input that also counts ingested bytes on the room
pub struct RoomInput {
    inner: InputSink,
    room: Arc<Room>,
}

impl ByteSink for RoomInput {
    fn write(&mut self, chunk: Bytes) -> std::result::Result<WriteStatus, IngestError> {
        let len = chunk.len();
        let status = self.inner.write(chunk)?;
        self.room.record_ingest(len);
        Ok(status)
    }

    async fn drained(&mut self) -> std::result::Result<(), IngestError> {
        self.inner.drained().await
    }
}

/// How a publish session ended
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub key: SessionKey,
    pub room_id: u64,
    pub reason: CloseReason,
    pub bytes_in: u64,
    pub duration: Duration,
    /// Producer or worker failure, if any
    pub error: Option<String>,
}

/// A registered room plus the worker endpoints its publisher drives
pub struct PublishSession {
    registry: Arc<RoomRegistry>,
    room: Arc<Room>,
    input: InputSink,
    output: Option<OutputSource>,
    context: PublishContext,
}

impl PublishSession {
    /// Register the room and start its worker
    ///
    /// Fails with a conflict if the key is already live, or with a worker
    /// error if the transcoder cannot be started.
    pub async fn open(registry: &Arc<RoomRegistry>, context: PublishContext) -> Result<Self> {
        let published = registry.publish(&context.key, context.mode).await?;

        Ok(Self {
            registry: Arc::clone(registry),
            room: published.room,
            input: published.input,
            output: published.output,
            context,
        })
    }

    pub fn room(&self) -> &Arc<Room> {
        &self.room
    }

    pub fn context(&self) -> &PublishContext {
        &self.context
    }

    /// Run until the room ends
    ///
    /// `ingest` receives the worker input and must forward the producer's
    /// bytes into it, returning when input ends. A clean end gives the
    /// worker the drain window to flush before teardown; an error tears the
    /// room down at once.
    pub async fn run<F, Fut>(self, ingest: F) -> SessionSummary
    where
        F: FnOnce(RoomInput) -> Fut,
        Fut: Future<Output = std::result::Result<u64, IngestError>>,
    {
        let PublishSession {
            registry,
            room,
            input,
            output,
            context,
        } = self;

        let started = Instant::now();
        let drain_timeout = registry.config().drain_timeout;

        tracing::info!(
            key = %context.key,
            room_id = room.id(),
            mode = %context.mode,
            transport = %context.transport,
            peer = ?context.peer_addr,
            "Publish session started"
        );

        let mut relay = output.map(|output| tokio::spawn(relay_output(Arc::clone(&room), output)));
        let sink = RoomInput {
            inner: input,
            room: Arc::clone(&room),
        };

        let (reason, error) = tokio::select! {
            result = ingest(sink) => match result {
                Ok(_) => (CloseReason::ProducerEnded, None),
                Err(e) => (CloseReason::ProducerError, Some(e.to_string())),
            },
            exit = room.worker().wait() => {
                let error = (!exit.success()).then(|| format!("worker {exit}"));
                (CloseReason::WorkerExited, error)
            }
        };

        if reason != CloseReason::ProducerError {
            if tokio::time::timeout(drain_timeout, room.worker().wait())
                .await
                .is_err()
            {
                tracing::warn!(
                    key = %context.key,
                    drain_ms = drain_timeout.as_millis() as u64,
                    "Worker did not exit within drain window"
                );
            }
            if let Some(handle) = relay.as_mut() {
                let _ = tokio::time::timeout(drain_timeout, handle).await;
            }
        }

        registry.close_room(&room, reason).await;
        if let Some(handle) = relay {
            handle.abort();
        }

        let summary = SessionSummary {
            key: context.key.clone(),
            room_id: room.id(),
            reason,
            bytes_in: room.bytes_in(),
            duration: started.elapsed(),
            error,
        };

        tracing::info!(
            key = %summary.key,
            room_id = summary.room_id,
            reason = %summary.reason,
            bytes_in = summary.bytes_in,
            duration_ms = summary.duration.as_millis() as u64,
            error = ?summary.error,
            "Publish session ended"
        );

        summary
    }
}

/// Forward worker output to the room's subscribers, in emission order
async fn relay_output(room: Arc<Room>, mut output: OutputSource) {
    let mut chunks = 0u64;

    while let Some(chunk) = output.next_chunk().await {
        match chunk {
            Ok(chunk) => {
                room.broadcast(&chunk);
                chunks += 1;
            }
            Err(e) => {
                tracing::warn!(key = %room.key(), error = %e, "Worker output read failed");
                break;
            }
        }
    }

    tracing::debug!(key = %room.key(), chunks = chunks, "Worker output ended");
}

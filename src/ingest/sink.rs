//! Downstream side of ingestion
//!
//! A [`ByteSink`] accepts every chunk handed to it but reports when its queue
//! has grown past its high-water mark. Callers must then wait on
//! [`ByteSink::drained`] before pulling more input.

use std::future::Future;

use bytes::Bytes;

use crate::error::IngestError;

/// Result of a non-blocking write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// Chunk queued, room for more
    Accepted,
    /// Chunk queued, but the queue is over its high-water mark
    Backlogged,
}

/// Byte sink with an explicit backlog signal
pub trait ByteSink: Send {
    /// Queue a chunk. Never blocks.
    fn write(&mut self, chunk: Bytes) -> Result<WriteStatus, IngestError>;

    /// Resolve once the queue is back under its high-water mark.
    fn drained(&mut self) -> impl Future<Output = Result<(), IngestError>> + Send;
}

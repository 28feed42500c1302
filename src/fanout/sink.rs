//! Subscriber sinks

use bytes::Bytes;
use tokio::sync::mpsc;

/// Why a chunk could not be handed to a subscriber
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// Subscriber's buffer is full; it is not keeping up
    #[error("subscriber buffer full")]
    Full,
    /// Subscriber went away
    #[error("subscriber closed")]
    Closed,
    /// Any other sink failure
    #[error("delivery failed: {0}")]
    Failed(String),
}

/// Destination for one subscriber's copy of the output
///
/// Delivery must not block: a sink that cannot take the chunk right now
/// reports [`DeliveryError::Full`] and gets dropped by the broadcaster. A
/// panic in `deliver` drops the sink the same way.
pub trait ChunkSink: Send + Sync {
    fn deliver(&self, chunk: &Bytes) -> Result<(), DeliveryError>;
}

impl ChunkSink for mpsc::Sender<Bytes> {
    fn deliver(&self, chunk: &Bytes) -> Result<(), DeliveryError> {
        // Bytes clone is a refcount bump; every subscriber shares the allocation
        self.try_send(chunk.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

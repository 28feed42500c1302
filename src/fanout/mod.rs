//! Fan-out of live worker output
//!
//! ```text
//!   worker stdout ──► relay task ──► Broadcaster::broadcast(chunk)
//!                                        │ try_send, never awaits
//!                     ┌──────────────────┼──────────────────┐
//!                     ▼                  ▼                  ▼
//!               [mpsc sink]        [mpsc sink]        [mpsc sink]
//!                HTTP body          HTTP body          (full → dropped)
//! ```
//!
//! Chunks are `bytes::Bytes`, so every subscriber shares one allocation.

pub mod broadcaster;
pub mod sink;

pub use broadcaster::{BroadcastOutcome, Broadcaster, SubscriberToken};
pub use sink::{ChunkSink, DeliveryError};

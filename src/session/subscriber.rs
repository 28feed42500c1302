//! Live subscription
//!
//! A subscriber's attachment to a room's fan-out, exposed as a stream of
//! chunks suitable for a streaming HTTP body. Dropping the stream (client
//! went away) detaches it; the room is unaffected.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tokio::sync::mpsc;

use crate::fanout::SubscriberToken;
use crate::registry::Room;

pub struct LiveSubscription {
    rx: mpsc::Receiver<Bytes>,
    token: SubscriberToken,
    room: Arc<Room>,
}

impl LiveSubscription {
    /// Attach to `room` with a queue of `buffer` chunks
    ///
    /// Returns `None` if the room has already closed.
    pub fn attach(room: Arc<Room>, buffer: usize) -> Option<Self> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let token = room.fanout().attach(tx)?;

        tracing::info!(
            key = %room.key(),
            token = %token,
            subscribers = room.fanout().len(),
            "Subscriber attached"
        );

        Some(Self { rx, token, room })
    }

    pub fn token(&self) -> SubscriberToken {
        self.token
    }

    pub fn room(&self) -> &Arc<Room> {
        &self.room
    }
}

impl Stream for LiveSubscription {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx).map(|chunk| chunk.map(Ok))
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        if self.room.fanout().detach(self.token) {
            tracing::debug!(key = %self.room.key(), token = %self.token, "Subscriber detached");
        }
    }
}

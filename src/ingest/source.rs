//! Inbound chunk sources and the pass-through pump

use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::error::IngestError;

use super::sink::{ByteSink, WriteStatus};

/// Sequential source of producer chunks
///
/// The next chunk is only requested when `next_chunk` is called, so pulling
/// lazily is the backpressure signal towards the producer.
pub trait ChunkSource: Send {
    /// `None` is a clean end of input
    fn next_chunk(&mut self) -> impl Future<Output = Option<Result<Bytes, IngestError>>> + Send;
}

/// Adapts any fallible byte stream (request body, socket reader, HTTP
/// response) into a [`ChunkSource`]
pub struct StreamSource<S> {
    inner: Pin<Box<S>>,
}

impl<S> StreamSource<S> {
    pub fn new(stream: S) -> Self {
        Self {
            inner: Box::pin(stream),
        }
    }
}

impl<S, E> ChunkSource for StreamSource<S>
where
    S: Stream<Item = Result<Bytes, E>> + Send,
    E: Display,
{
    async fn next_chunk(&mut self) -> Option<Result<Bytes, IngestError>> {
        self.inner
            .next()
            .await
            .map(|r| r.map_err(|e| IngestError::Transport(e.to_string())))
    }
}

/// Copy `source` into `sink` until end of input
///
/// After a backlogged write the next chunk is not pulled until the sink
/// drains. Returns the number of bytes forwarded.
pub async fn pump<S, K>(source: &mut S, sink: &mut K) -> Result<u64, IngestError>
where
    S: ChunkSource,
    K: ByteSink,
{
    let mut total = 0u64;

    while let Some(chunk) = source.next_chunk().await {
        let chunk = chunk?;
        if chunk.is_empty() {
            continue;
        }
        total += chunk.len() as u64;

        if sink.write(chunk)? == WriteStatus::Backlogged {
            sink.drained().await?;
        }
    }

    Ok(total)
}

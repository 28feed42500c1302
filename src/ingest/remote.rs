//! Remote pull source
//!
//! Instead of reading from the local connection, the room can be fed from a
//! remote HTTP resource. The local connection stays open only to hold the
//! session; when it closes the cancel token fires and the fetch is abandoned.

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::error::IngestError;

use super::source::ChunkSource;

/// Chunk source backed by a streaming HTTP GET
pub struct RemoteSource {
    stream: BoxStream<'static, reqwest::Result<Bytes>>,
    cancel: CancellationToken,
}

impl RemoteSource {
    /// Issue the request and wait for response headers
    pub async fn open(
        client: &reqwest::Client,
        url: &str,
        cancel: CancellationToken,
    ) -> Result<Self, IngestError> {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(IngestError::Cancelled),
            response = client.get(url).send() => response?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::RemoteStatus(status.as_u16()));
        }

        tracing::info!(url = %url, "Pulling remote source");

        Ok(Self {
            stream: response.bytes_stream().boxed(),
            cancel,
        })
    }
}

impl ChunkSource for RemoteSource {
    async fn next_chunk(&mut self) -> Option<Result<Bytes, IngestError>> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Some(Err(IngestError::Cancelled)),
            chunk = self.stream.next() => chunk.map(|r| r.map_err(IngestError::from)),
        }
    }
}

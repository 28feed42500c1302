//! Worker output source (live mode)

use std::io;
use std::pin::Pin;

use bytes::Bytes;
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

/// Chunked view over the worker's stdout
pub struct OutputSource {
    inner: ReaderStream<Pin<Box<dyn AsyncRead + Send>>>,
}

impl OutputSource {
    pub fn new<R>(reader: R, chunk_size: usize) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        let reader: Pin<Box<dyn AsyncRead + Send>> = Box::pin(reader);
        Self {
            inner: ReaderStream::with_capacity(reader, chunk_size.max(1)),
        }
    }

    /// Next chunk in emission order, `None` at end of output
    pub async fn next_chunk(&mut self) -> Option<io::Result<Bytes>> {
        self.inner.next().await
    }
}

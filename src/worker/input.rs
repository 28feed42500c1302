//! Worker input sink
//!
//! Chunks are queued to a writer task that owns the worker's stdin. The sink
//! tracks how many bytes are queued but not yet written, which is what the
//! backlog signal is based on.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Notify};

use crate::error::IngestError;
use crate::ingest::{ByteSink, WriteStatus};
use crate::registry::SessionKey;

struct Shared {
    pending: AtomicUsize,
    high_water: usize,
    failed: AtomicBool,
    drained: Notify,
}

impl Shared {
    fn is_drained(&self) -> bool {
        self.pending.load(Ordering::Acquire) <= self.high_water
    }
}

/// Write side of a worker's stdin
///
/// Dropping the sink lets the writer task flush what is queued and then
/// close the worker's stdin, which is how end-of-input reaches the worker.
pub struct InputSink {
    tx: mpsc::UnboundedSender<Bytes>,
    shared: Arc<Shared>,
}

impl InputSink {
    /// Start a writer task feeding `writer`
    pub fn spawn<W>(writer: W, high_water: usize, key: SessionKey) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            pending: AtomicUsize::new(0),
            high_water,
            failed: AtomicBool::new(false),
            drained: Notify::new(),
        });

        tokio::spawn(write_loop(writer, rx, Arc::clone(&shared), key));

        Self { tx, shared }
    }

    /// Bytes queued but not yet accepted by the worker
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// True once a write to the worker has failed
    pub fn is_closed(&self) -> bool {
        self.shared.failed.load(Ordering::Acquire) || self.tx.is_closed()
    }
}

impl ByteSink for InputSink {
    fn write(&mut self, chunk: Bytes) -> Result<WriteStatus, IngestError> {
        if self.is_closed() {
            return Err(IngestError::SinkClosed);
        }

        let len = chunk.len();
        let pending = self.shared.pending.fetch_add(len, Ordering::AcqRel) + len;

        if self.tx.send(chunk).is_err() {
            self.shared.pending.fetch_sub(len, Ordering::AcqRel);
            return Err(IngestError::SinkClosed);
        }

        if pending > self.shared.high_water {
            Ok(WriteStatus::Backlogged)
        } else {
            Ok(WriteStatus::Accepted)
        }
    }

    async fn drained(&mut self) -> Result<(), IngestError> {
        loop {
            let notified = self.shared.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.shared.failed.load(Ordering::Acquire) {
                return Err(IngestError::SinkClosed);
            }
            if self.shared.is_drained() {
                return Ok(());
            }

            notified.await;
        }
    }
}

async fn write_loop<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    shared: Arc<Shared>,
    key: SessionKey,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(chunk) = rx.recv().await {
        let len = chunk.len();

        if let Err(e) = writer.write_all(&chunk).await {
            tracing::debug!(key = %key, error = %e, "Worker input write failed");
            shared.failed.store(true, Ordering::Release);
            shared.drained.notify_waiters();
            return;
        }

        let before = shared.pending.fetch_sub(len, Ordering::AcqRel);
        if before > shared.high_water && before - len <= shared.high_water {
            shared.drained.notify_waiters();
        }
    }

    if let Err(e) = writer.shutdown().await {
        tracing::debug!(key = %key, error = %e, "Worker input close failed");
    }
    tracing::debug!(key = %key, "Worker input closed");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::AsyncReadExt;

    use super::*;

    fn key() -> SessionKey {
        SessionKey::parse("input_test").unwrap()
    }

    #[tokio::test]
    async fn test_write_accepted_under_high_water() {
        let (writer, mut reader) = tokio::io::duplex(1024);
        let mut sink = InputSink::spawn(writer, 100, key());

        assert_eq!(
            sink.write(Bytes::from_static(b"hello")).unwrap(),
            WriteStatus::Accepted
        );

        let mut buf = [0u8; 5];
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn test_backlog_then_drain() {
        // 8 byte pipe: the writer task stalls until the reader catches up
        let (writer, mut reader) = tokio::io::duplex(8);
        let mut sink = InputSink::spawn(writer, 16, key());

        assert_eq!(
            sink.write(Bytes::from(vec![1u8; 32])).unwrap(),
            WriteStatus::Backlogged
        );

        let drained = tokio::time::timeout(Duration::from_millis(50), sink.drained()).await;
        assert!(drained.is_err(), "must not drain while the pipe is full");

        let mut buf = vec![0u8; 32];
        let reading = tokio::spawn(async move {
            reader.read_exact(&mut buf).await.unwrap();
            buf
        });

        tokio::time::timeout(Duration::from_secs(5), sink.drained())
            .await
            .expect("drain signal")
            .unwrap();
        assert_eq!(sink.pending(), 0);
        assert_eq!(reading.await.unwrap(), vec![1u8; 32]);
    }

    #[tokio::test]
    async fn test_write_after_reader_gone_fails() {
        let (writer, reader) = tokio::io::duplex(8);
        drop(reader);
        let mut sink = InputSink::spawn(writer, 4, key());

        // First write is queued; the writer task then discovers the broken pipe
        let _ = sink.write(Bytes::from_static(b"0123456789"));
        let result = tokio::time::timeout(Duration::from_secs(5), sink.drained())
            .await
            .expect("failure must wake drain waiters");
        assert!(matches!(result, Err(IngestError::SinkClosed)));
        assert!(matches!(
            sink.write(Bytes::from_static(b"x")),
            Err(IngestError::SinkClosed)
        ));
    }

    #[tokio::test]
    async fn test_drop_closes_input() {
        let (writer, mut reader) = tokio::io::duplex(64);
        let mut sink = InputSink::spawn(writer, 64, key());
        sink.write(Bytes::from_static(b"tail")).unwrap();
        drop(sink);

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"tail");
    }

    #[tokio::test]
    async fn test_chunks_written_in_order() {
        let writer = tokio_test::io::Builder::new()
            .write(b"first ")
            .write(b"second ")
            .write(b"third")
            .build();
        let mut sink = InputSink::spawn(writer, 1024, key());

        for chunk in ["first ", "second ", "third"] {
            sink.write(Bytes::from(chunk)).unwrap();
        }

        tokio::time::timeout(Duration::from_secs(5), async {
            while sink.pending() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("all chunks written");
    }
}

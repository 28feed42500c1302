//! Credit-based flow control for duplex transports
//!
//! The server tells the producer when it may send: `ready` once on connect,
//! then `next` after each chunk has been accepted downstream. A chunk that
//! leaves the sink backlogged holds back the next credit until the sink
//! drains, so a producer never has more than one unacknowledged chunk in
//! flight.

use std::future::Future;

use crate::error::IngestError;

use super::sink::{ByteSink, WriteStatus};
use super::source::ChunkSource;

/// Credit message sent to the producer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credit {
    /// Initial grant on connection
    Ready,
    /// Grant after an acknowledged chunk
    Next,
}

impl Credit {
    pub fn as_str(self) -> &'static str {
        match self {
            Credit::Ready => "ready",
            Credit::Next => "next",
        }
    }
}

/// Duplex transport that can both deliver chunks and carry credits back
pub trait CreditChannel: ChunkSource {
    fn grant(&mut self, credit: Credit) -> impl Future<Output = Result<(), IngestError>> + Send;
}

/// Run the credit protocol until the producer closes
///
/// Returns the number of bytes forwarded into `sink`.
pub async fn run_credit_protocol<C, K>(channel: &mut C, sink: &mut K) -> Result<u64, IngestError>
where
    C: CreditChannel,
    K: ByteSink,
{
    channel.grant(Credit::Ready).await?;

    let mut total = 0u64;
    while let Some(chunk) = channel.next_chunk().await {
        let chunk = chunk?;
        total += chunk.len() as u64;

        if !chunk.is_empty() && sink.write(chunk)? == WriteStatus::Backlogged {
            sink.drained().await?;
        }

        channel.grant(Credit::Next).await?;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    use bytes::Bytes;
    use parking_lot::Mutex;

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Event {
        Grant,
        Recv,
        Write(WriteStatus),
        Drained,
    }

    type Log = Arc<Mutex<Vec<Event>>>;

    /// Producer that only sends when it holds a credit
    struct FakeProducer {
        pending: VecDeque<Bytes>,
        credits: usize,
        log: Log,
    }

    impl ChunkSource for FakeProducer {
        async fn next_chunk(&mut self) -> Option<Result<Bytes, IngestError>> {
            let chunk = self.pending.pop_front()?;
            assert!(self.credits > 0, "producer asked for a chunk without credit");
            self.credits -= 1;
            self.log.lock().push(Event::Recv);
            Some(Ok(chunk))
        }
    }

    impl CreditChannel for FakeProducer {
        async fn grant(&mut self, _credit: Credit) -> Result<(), IngestError> {
            self.credits += 1;
            self.log.lock().push(Event::Grant);
            Ok(())
        }
    }

    /// Sink that reports backlog on every `every`-th write and drains slowly
    struct SlowSink {
        writes: usize,
        every: usize,
        log: Log,
    }

    impl ByteSink for SlowSink {
        fn write(&mut self, _chunk: Bytes) -> Result<WriteStatus, IngestError> {
            self.writes += 1;
            let status = if self.writes % self.every == 0 {
                WriteStatus::Backlogged
            } else {
                WriteStatus::Accepted
            };
            self.log.lock().push(Event::Write(status));
            Ok(status)
        }

        async fn drained(&mut self) -> Result<(), IngestError> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.log.lock().push(Event::Drained);
            Ok(())
        }
    }

    fn producer(chunks: usize, log: &Log) -> FakeProducer {
        FakeProducer {
            pending: (0..chunks).map(|i| Bytes::from(vec![i as u8; 4])).collect(),
            credits: 0,
            log: Arc::clone(log),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_credit_never_outpaces_acknowledged_writes() {
        let log: Log = Default::default();
        let mut channel = producer(10, &log);
        let mut sink = SlowSink {
            writes: 0,
            every: 3,
            log: Arc::clone(&log),
        };

        let total = run_credit_protocol(&mut channel, &mut sink).await.unwrap();
        assert_eq!(total, 40);

        let events = log.lock().clone();
        let mut in_flight: i64 = 0;
        let mut waiting_for_drain = false;

        for event in &events {
            match event {
                Event::Grant => {
                    assert!(!waiting_for_drain, "credit granted before sink drained");
                    in_flight += 1;
                    assert!(in_flight <= 1, "more than one outstanding credit");
                }
                Event::Recv => in_flight -= 1,
                Event::Write(WriteStatus::Backlogged) => waiting_for_drain = true,
                Event::Write(WriteStatus::Accepted) => {}
                Event::Drained => waiting_for_drain = false,
            }
        }

        // ready + one credit per chunk
        assert_eq!(events.iter().filter(|e| **e == Event::Grant).count(), 11);
        assert_eq!(events.iter().filter(|e| **e == Event::Drained).count(), 3);
    }

    #[tokio::test]
    async fn test_ready_sent_before_first_chunk() {
        let log: Log = Default::default();
        let mut channel = producer(1, &log);
        let mut sink = SlowSink {
            writes: 0,
            every: usize::MAX,
            log: Arc::clone(&log),
        };

        run_credit_protocol(&mut channel, &mut sink).await.unwrap();

        let events = log.lock().clone();
        assert_eq!(events[0], Event::Grant);
        assert_eq!(events[1], Event::Recv);
    }

    #[tokio::test]
    async fn test_sink_failure_stops_protocol() {
        struct ClosedSink;

        impl ByteSink for ClosedSink {
            fn write(&mut self, _chunk: Bytes) -> Result<WriteStatus, IngestError> {
                Err(IngestError::SinkClosed)
            }

            async fn drained(&mut self) -> Result<(), IngestError> {
                Err(IngestError::SinkClosed)
            }
        }

        let log: Log = Default::default();
        let mut channel = producer(3, &log);
        let result = run_credit_protocol(&mut channel, &mut ClosedSink).await;

        assert!(matches!(result, Err(IngestError::SinkClosed)));
        // only the initial credit went out
        assert_eq!(log.lock().iter().filter(|e| **e == Event::Grant).count(), 1);
    }
}

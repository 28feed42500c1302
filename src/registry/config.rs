//! Registry configuration

use std::time::Duration;

use crate::worker::WorkerConfig;

/// Room registry configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Chunks queued per live subscriber before it is dropped
    pub subscriber_buffer: usize,

    /// How long an early subscriber waits for its publisher
    pub wait_timeout: Duration,

    /// How long a cleanly finished worker may take to flush and exit
    pub drain_timeout: Duration,

    /// Transcoder launch settings
    pub worker: WorkerConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: 256,
            wait_timeout: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(5),
            worker: WorkerConfig::default(),
        }
    }
}

impl RegistryConfig {
    /// Set the per-subscriber queue depth
    pub fn subscriber_buffer(mut self, chunks: usize) -> Self {
        self.subscriber_buffer = chunks.max(1);
        self
    }

    /// Set the early-subscriber wait window
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Set the drain window
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Set the worker configuration
    pub fn worker(mut self, worker: WorkerConfig) -> Self {
        self.worker = worker;
        self
    }
}

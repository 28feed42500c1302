//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::registry::OutputMode;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP/WebSocket front door binds to
    pub bind_addr: SocketAddr,

    /// Address for raw pipe ingestion (disabled when `None`)
    pub raw_ingest_addr: Option<SocketAddr>,

    /// Maximum concurrent raw pipe connections (0 = unlimited)
    pub max_connections: usize,

    /// Enable TCP_NODELAY on raw pipe sockets
    pub tcp_nodelay: bool,

    /// Raw pipe header line must arrive within this time
    pub handshake_timeout: Duration,

    /// Output mode when a publisher does not ask for one
    pub default_mode: OutputMode,

    /// Content type of live subscribe responses
    pub live_content_type: String,

    /// Segment files older than this are swept
    pub retention: Duration,

    /// Time between sweeps
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 80)),
            raw_ingest_addr: None,
            max_connections: 0, // Unlimited
            tcp_nodelay: true,
            handshake_timeout: Duration::from_secs(10),
            default_mode: OutputMode::LiveStream,
            live_content_type: "video/mp2t".to_string(),
            retention: Duration::from_secs(6 * 60 * 60),
            sweep_interval: Duration::from_secs(60 * 60),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Enable raw pipe ingestion on `addr`
    pub fn raw_ingest(mut self, addr: SocketAddr) -> Self {
        self.raw_ingest_addr = Some(addr);
        self
    }

    /// Set maximum raw pipe connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the default output mode
    pub fn default_mode(mut self, mode: OutputMode) -> Self {
        self.default_mode = mode;
        self
    }

    /// Set the segment retention window
    pub fn retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Set the sweep interval
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval.max(Duration::from_secs(1));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), 80);
        assert!(config.raw_ingest_addr.is_none());
        assert_eq!(config.max_connections, 0);
        assert!(config.tcp_nodelay);
        assert_eq!(config.default_mode, OutputMode::LiveStream);
        assert_eq!(config.live_content_type, "video/mp2t");
        assert_eq!(config.retention, Duration::from_secs(21_600));
        assert_eq!(config.sweep_interval, Duration::from_secs(3_600));
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let config = ServerConfig::with_addr(addr);

        assert_eq!(config.bind_addr.port(), 8080);
    }

    #[test]
    fn test_sweep_interval_floor() {
        let config = ServerConfig::default().sweep_interval(Duration::ZERO);

        assert_eq!(config.sweep_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:8000".parse().unwrap();
        let raw: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .raw_ingest(raw)
            .max_connections(50)
            .default_mode(OutputMode::SegmentedFile)
            .retention(Duration::from_secs(60));

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.raw_ingest_addr, Some(raw));
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.default_mode, OutputMode::SegmentedFile);
        assert_eq!(config.retention, Duration::from_secs(60));
    }
}

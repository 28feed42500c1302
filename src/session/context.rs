//! Publish context
//!
//! Connection details carried through a publish session for logging.

use std::fmt;
use std::net::SocketAddr;

use crate::registry::{OutputMode, SessionKey};

/// Inbound transport a publisher arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Streaming HTTP request body
    HttpBody,
    /// WebSocket with the credit protocol
    WebSocket,
    /// Remote HTTP resource pulled on behalf of a WebSocket client
    RemotePull,
    /// One-shot raw TCP pipe
    RawPipe,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Transport::HttpBody => "http-body",
            Transport::WebSocket => "websocket",
            Transport::RemotePull => "remote-pull",
            Transport::RawPipe => "raw-pipe",
        };
        f.write_str(s)
    }
}

/// Who is publishing what, and how
#[derive(Debug, Clone)]
pub struct PublishContext {
    /// Session key being published
    pub key: SessionKey,

    /// Requested output mode
    pub mode: OutputMode,

    /// Inbound transport
    pub transport: Transport,

    /// Remote peer address, when known
    pub peer_addr: Option<SocketAddr>,
}

impl PublishContext {
    pub fn new(key: SessionKey, mode: OutputMode, transport: Transport) -> Self {
        Self {
            key,
            mode,
            transport,
            peer_addr: None,
        }
    }

    /// Attach the remote peer address
    pub fn with_peer(mut self, peer_addr: SocketAddr) -> Self {
        self.peer_addr = Some(peer_addr);
        self
    }
}

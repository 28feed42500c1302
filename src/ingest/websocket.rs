//! WebSocket transport for the credit protocol
//!
//! Producer chunks arrive as binary frames; credits go back as text frames.

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;

use crate::error::IngestError;

use super::credit::{Credit, CreditChannel};
use super::source::ChunkSource;

/// Close code sent when the session key is already live
pub const CLOSE_CONFLICT: u16 = 4409;

/// Close code sent when the worker could not be started
pub const CLOSE_WORKER_FAILED: u16 = 4500;

/// Close code sent for an unknown or invalid key
pub const CLOSE_NOT_FOUND: u16 = 4404;

/// Close code sent for a malformed query parameter
pub const CLOSE_BAD_REQUEST: u16 = 4400;

pub struct WsChannel {
    socket: WebSocket,
}

impl WsChannel {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }

    /// Read and discard frames until the peer closes
    ///
    /// Used when the room is fed from elsewhere and the socket only holds
    /// the session open.
    pub async fn wait_closed(&mut self) {
        loop {
            match self.socket.recv().await {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {}
            }
        }
    }

    /// Send a close frame with an application code and reason
    pub async fn close_with(mut self, code: u16, reason: &str) {
        let frame = axum::extract::ws::CloseFrame {
            code,
            reason: reason.to_string().into(),
        };
        if let Err(e) = self.socket.send(Message::Close(Some(frame))).await {
            tracing::debug!(error = %e, "Failed to send close frame");
        }
    }
}

impl ChunkSource for WsChannel {
    async fn next_chunk(&mut self) -> Option<Result<Bytes, IngestError>> {
        loop {
            match self.socket.recv().await {
                Some(Ok(Message::Binary(data))) => return Some(Ok(data)),
                Some(Ok(Message::Close(_))) | None => return None,
                // text, ping and pong carry no media
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Some(Err(IngestError::Transport(e.to_string()))),
            }
        }
    }
}

impl CreditChannel for WsChannel {
    async fn grant(&mut self, credit: Credit) -> Result<(), IngestError> {
        self.socket
            .send(Message::Text(credit.as_str().to_string().into()))
            .await
            .map_err(|e| IngestError::Transport(e.to_string()))
    }
}

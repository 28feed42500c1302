//! Raw pipe ingestion
//!
//! A bare TCP publish path for encoders that cannot speak HTTP. The client
//! sends one header line, `<session-key> [mode]\n`, and the server answers
//! `OK\n` or `ERR <reason>\n`. After `OK` every remaining byte on the
//! socket is input media; closing the socket ends the room.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::io::ReaderStream;

use crate::error::IngestError;
use crate::ingest::{pump, StreamSource};
use crate::registry::{OutputMode, SessionKey};
use crate::session::{PublishContext, PublishSession, Transport};

use super::routes::AppState;

/// Longest accepted header line
const MAX_HEADER_LEN: u64 = 512;

/// Parse a `<session-key> [mode]` header line
pub fn parse_header(line: &str) -> Result<(SessionKey, Option<OutputMode>), IngestError> {
    let mut parts = line.split_whitespace();

    let raw_key = parts
        .next()
        .ok_or_else(|| IngestError::Handshake("missing session key".to_string()))?;
    let key = SessionKey::parse(raw_key).map_err(|e| IngestError::Handshake(e.to_string()))?;

    let mode = parts
        .next()
        .map(str::parse::<OutputMode>)
        .transpose()
        .map_err(IngestError::Handshake)?;

    if parts.next().is_some() {
        return Err(IngestError::Handshake("unexpected trailing fields".to_string()));
    }

    Ok((key, mode))
}

/// Accept raw pipe connections until the task is aborted
pub async fn accept_loop(listener: TcpListener, state: AppState) {
    let semaphore = match state.config.max_connections {
        0 => None,
        max => Some(Arc::new(Semaphore::new(max))),
    };

    loop {
        match listener.accept().await {
            Ok((socket, peer_addr)) => {
                handle_connection(socket, peer_addr, &state, semaphore.as_ref());
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to accept raw connection");
            }
        }
    }
}

fn handle_connection(
    socket: TcpStream,
    peer_addr: SocketAddr,
    state: &AppState,
    semaphore: Option<&Arc<Semaphore>>,
) {
    // Check connection limit
    let permit = match semaphore {
        Some(sem) => match Arc::clone(sem).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::warn!(peer = %peer_addr, "Raw connection rejected: limit reached");
                return;
            }
        },
        None => None,
    };

    if state.config.tcp_nodelay {
        if let Err(e) = socket.set_nodelay(true) {
            tracing::error!(error = %e, "Failed to configure socket");
            return;
        }
    }

    tracing::debug!(peer = %peer_addr, "New raw connection");

    let state = state.clone();
    tokio::spawn(async move {
        let _permit = permit;
        if let Err(e) = handle_pipe(socket, peer_addr, state).await {
            tracing::debug!(peer = %peer_addr, error = %e, "Raw connection error");
        }
        tracing::debug!(peer = %peer_addr, "Raw connection closed");
    });
}

async fn handle_pipe(socket: TcpStream, peer_addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let (reader, mut writer) = socket.into_split();
    let mut reader = BufReader::new(reader);

    let mut line = String::new();
    let read = tokio::time::timeout(
        state.config.handshake_timeout,
        (&mut reader).take(MAX_HEADER_LEN).read_line(&mut line),
    )
    .await;

    let header = match read {
        Ok(Ok(n)) if n > 0 && line.ends_with('\n') => parse_header(&line),
        Ok(Ok(_)) => Err(IngestError::Handshake("header line missing or too long".to_string())),
        Ok(Err(e)) => Err(IngestError::Transport(e.to_string())),
        Err(_) => Err(IngestError::Handshake("timed out waiting for header".to_string())),
    };

    let (key, mode) = match header {
        Ok(parsed) => parsed,
        Err(e) => {
            writer.write_all(format!("ERR {e}\n").as_bytes()).await?;
            return writer.shutdown().await;
        }
    };

    let mode = mode.unwrap_or(state.config.default_mode);
    let context = PublishContext::new(key, mode, Transport::RawPipe).with_peer(peer_addr);

    let session = match PublishSession::open(&state.registry, context).await {
        Ok(session) => session,
        Err(e) => {
            writer.write_all(format!("ERR {e}\n").as_bytes()).await?;
            return writer.shutdown().await;
        }
    };

    writer.write_all(b"OK\n").await?;

    // Bytes already buffered past the header line stay in the BufReader
    let mut source = StreamSource::new(ReaderStream::new(reader));
    session
        .run(move |mut sink| async move { pump(&mut source, &mut sink).await })
        .await;

    Ok(())
}

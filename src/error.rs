//! Error types
//!
//! One crate-level [`Error`] wraps the per-layer errors so handlers can use
//! `?` across registry, worker and ingestion calls.

use std::io;

pub use crate::registry::RegistryError;

/// Crate-level result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Segment(#[from] SegmentError),

    /// Malformed request parameter
    #[error("{0}")]
    BadRequest(String),
}

/// Errors raised while starting or talking to a transcode worker
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The external executable could not be started
    #[error("failed to spawn worker `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The segment output directory could not be prepared
    #[error("failed to prepare output directory {path}: {source}")]
    OutputDir {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Errors on the inbound side of a room
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Read failure on the producer's transport
    #[error("transport error: {0}")]
    Transport(String),

    /// The worker's input sink is closed (worker died or input finished)
    #[error("worker input closed")]
    SinkClosed,

    /// Remote source could not be fetched
    #[error("remote source error: {0}")]
    Remote(#[from] reqwest::Error),

    /// Remote source answered with a non-success status
    #[error("remote source returned status {0}")]
    RemoteStatus(u16),

    /// The local connection closed and the pull was abandoned
    #[error("ingestion cancelled")]
    Cancelled,

    /// Raw pipe header line was missing or malformed
    #[error("bad handshake: {0}")]
    Handshake(String),
}

/// Errors serving files from the segment store
#[derive(Debug, thiserror::Error)]
pub enum SegmentError {
    /// Requested name is not a plain file name
    #[error("invalid segment name: {0:?}")]
    InvalidName(String),

    #[error("segment not found: {0}")]
    NotFound(String),

    #[error("segment I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// True when the error is a conflict on an already-live session key
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Registry(RegistryError::SessionConflict(_)))
    }

    /// True when the error means "nothing here"
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Registry(e) => e.is_not_found(),
            Error::Segment(SegmentError::NotFound(_) | SegmentError::InvalidName(_)) => true,
            _ => false,
        }
    }
}

//! Statistics for rooms and the server

use std::time::Duration;

use serde::Serialize;

use crate::registry::{OutputMode, SessionKey};

/// Snapshot of one live room
#[derive(Debug, Clone, Serialize)]
pub struct RoomStats {
    /// Session key
    pub key: SessionKey,
    /// Registry-assigned room ID
    pub room_id: u64,
    /// Output mode
    pub mode: OutputMode,
    /// Seconds since the room was created
    pub age_secs: u64,
    /// Currently attached live subscribers
    pub subscribers: usize,
    /// Bytes accepted from the publisher
    pub bytes_in: u64,
    /// Chunks broadcast to subscribers
    pub chunks_out: u64,
    /// Bytes delivered, summed over subscribers
    pub bytes_out: u64,
    /// Subscribers dropped for falling behind or failing
    pub subscribers_dropped: u64,
    /// Worker process ID
    pub worker_pid: Option<u32>,
    /// Whether the worker has produced output yet
    pub ready: bool,
}

impl RoomStats {
    /// Ingest bitrate in bits per second
    pub fn ingest_bitrate(&self) -> u64 {
        if self.age_secs > 0 {
            (self.bytes_in * 8) / self.age_secs
        } else {
            0
        }
    }
}

/// Server-wide statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServerStats {
    /// Seconds since the server started
    pub uptime_secs: u64,
    /// Live rooms
    pub active_rooms: usize,
    /// Live subscribers across all rooms
    pub total_subscribers: usize,
    /// Bytes accepted across all live rooms
    pub total_bytes_in: u64,
    /// Per-room detail
    pub rooms: Vec<RoomStats>,
}

impl ServerStats {
    /// Aggregate room snapshots
    pub fn from_rooms(uptime: Duration, mut rooms: Vec<RoomStats>) -> Self {
        rooms.sort_by(|a, b| a.key.cmp(&b.key));

        Self {
            uptime_secs: uptime.as_secs(),
            active_rooms: rooms.len(),
            total_subscribers: rooms.iter().map(|r| r.subscribers).sum(),
            total_bytes_in: rooms.iter().map(|r| r.bytes_in).sum(),
            rooms,
        }
    }
}

//! Room and server statistics

pub mod metrics;

pub use metrics::{RoomStats, ServerStats};

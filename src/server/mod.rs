//! HTTP/WebSocket front door and raw pipe listener

pub mod config;
pub mod error;
pub mod listener;
pub mod raw;
pub mod routes;

pub use config::ServerConfig;
pub use listener::RelayServer;
pub use routes::{router, AppState};

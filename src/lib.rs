//! # relay-rs
//!
//! Live media relay. A publisher streams raw media bytes under a session
//! key; the relay pipes them through one external transcoder per session
//! and either fans the transcoder's output out to live subscribers or
//! serves the segment files it writes.
//!
//! ## Quick start
//!
//! ```no_run
//! use relay_rs::{RelayServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> relay_rs::Result<()> {
//!     let config = ServerConfig::with_addr("0.0.0.0:8080".parse().unwrap());
//!     let server = RelayServer::new(config);
//!     server.run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```
//!
//! ## Modules
//!
//! - [`worker`]: transcoder subprocess handle
//! - [`ingest`]: transport adapters and the credit protocol
//! - [`registry`]: live rooms keyed by session
//! - [`fanout`]: per-room broadcaster
//! - [`segments`]: segment store and retention sweeper
//! - [`session`]: publish and subscribe sessions
//! - [`server`]: HTTP/WebSocket routes and the raw pipe listener

pub mod error;
pub mod fanout;
pub mod ingest;
pub mod registry;
pub mod segments;
pub mod server;
pub mod session;
pub mod stats;
pub mod worker;

pub use error::{Error, Result};
pub use registry::{OutputMode, RegistryConfig, RoomRegistry, SessionKey};
pub use server::{RelayServer, ServerConfig};
pub use worker::WorkerConfig;

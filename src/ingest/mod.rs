//! Ingestion adapter
//!
//! Every inbound transport ends up as a [`ChunkSource`] feeding a
//! [`ByteSink`]:
//!
//! - streaming request bodies and raw pipes go through [`StreamSource`] and
//!   [`pump`]
//! - WebSocket producers go through [`run_credit_protocol`]
//! - remote pulls go through [`RemoteSource`] and [`pump`]
//!
//! In all cases the next chunk is not pulled while the sink is backlogged.

pub mod credit;
pub mod remote;
pub mod sink;
pub mod source;
pub mod websocket;

pub use credit::{run_credit_protocol, Credit, CreditChannel};
pub use remote::RemoteSource;
pub use sink::{ByteSink, WriteStatus};
pub use source::{pump, ChunkSource, StreamSource};
pub use websocket::WsChannel;

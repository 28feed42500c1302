//! Room registry
//!
//! The registry maps session keys to live rooms and enforces one publisher
//! per key.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<RoomRegistry>
//!                     ┌─────────────────────────┐
//!                     │ rooms: HashMap<Key,     │
//!                     │   Arc<Room> {           │
//!                     │     worker,             │
//!                     │     fanout,             │
//!                     │   }                     │
//!                     │ >                       │
//!                     │ created: broadcast::Tx  │
//!                     └───────────┬─────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!    [Publisher]            [Subscriber]            [Subscriber]
//!    publish()              lookup()                wait_for_room()
//!         │                       │                       │
//!         └──► worker ──► room.broadcast() ──► mpsc ──► HTTP body
//! ```
//!
//! Teardown always goes through [`RoomRegistry::close_room`], which is safe
//! to call from every path that can end a room.

pub mod config;
pub mod entry;
pub mod error;
pub mod key;
pub mod store;

pub use config::RegistryConfig;
pub use entry::{CloseReason, PublishedRoom, Room};
pub use error::RegistryError;
pub use key::{OutputMode, SessionKey, MAX_KEY_LEN};
pub use store::RoomRegistry;

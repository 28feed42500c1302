//! Publish and subscribe sessions
//!
//! A [`PublishSession`] owns a room's lifecycle from the publisher's side.
//! A [`LiveSubscription`] is one subscriber's attachment to a live room.

pub mod context;
pub mod publisher;
pub mod subscriber;

pub use context::{PublishContext, Transport};
pub use publisher::{PublishSession, RoomInput, SessionSummary};
pub use subscriber::LiveSubscription;

//! Connection roster and presence fan-out for Convoy.
//!
//! The roster is the server's in-memory picture of who is connected
//! right now: one [`Participant`] per live socket, keyed by the random
//! connection id handed out at registration. Position updates land
//! here, and the roster decides whether a movement is large enough to
//! be worth telling everyone else about.
//!
//! Delivery is handled by the [`PresenceBroadcaster`], which owns one
//! bounded sender per connection and never awaits: a peer whose queue
//! is full or whose receiver is gone is reported back to the caller as
//! dead so it can be pruned.
//!
//! # Key types
//!
//! - [`ConnectionRegistry`] — participants and their last known state
//! - [`Participant`] — a single connection's roster entry
//! - [`PresenceBroadcaster`] — per-connection outbound queues

mod broadcast;
mod error;
mod registry;

pub use broadcast::{OUTBOUND_BUFFER, PeerSender, PresenceBroadcaster};
pub use error::RosterError;
pub use registry::{ConnectionRegistry, Participant};

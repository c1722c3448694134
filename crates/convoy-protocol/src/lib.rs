//! Wire protocol for Convoy.
//!
//! This crate defines the "language" that location-sharing clients and the
//! gateway speak:
//!
//! - **Types** ([`ClientMessage`], [`ServerMessage`], [`UserSnapshot`],
//!   [`ClientId`]) — the structures that travel on the wire.
//! - **Geo** ([`Position`], [`Position::distance_meters`]) — coordinates
//!   and the great-circle math behind the rebroadcast threshold.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how messages are
//!   converted to and from wire text.
//! - **Errors** ([`ProtocolError`]) — what can go wrong while encoding
//!   or decoding.
//!
//! # Wire format
//!
//! Every message is one flat JSON object per WebSocket text frame, with a
//! `"type"` field naming the message and the remaining fields alongside it:
//!
//! ```json
//! { "type": "location_update", "lat": 38.7223, "lng": -9.1393 }
//! ```
//!
//! The protocol layer knows nothing about connections or sessions — it only
//! knows how messages look. Transport carries frames; the gateway gives
//! them meaning.

mod codec;
mod error;
mod geo;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use geo::{
    BROADCAST_THRESHOLD_METERS, EARTH_RADIUS_METERS, Position,
    unix_time_millis,
};
pub use types::{ClientId, ClientMessage, ServerMessage, UserSnapshot};

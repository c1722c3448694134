//! # Convoy
//!
//! Real-time location sharing for small groups.
//!
//! Convoy keeps a live roster of connected users and rebroadcasts their
//! positions over WebSockets. Connections start anonymous and may log in
//! to claim an account identity; each account holds at most one session,
//! with forced takeover and reconnection-by-session-id built in.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use convoy::prelude::*;
//!
//! # async fn run(accounts: impl AccountStore) -> Result<(), ConvoyError> {
//! let server = ConvoyServer::<JsonCodec>::builder()
//!     .bind("0.0.0.0:8080")
//!     .build(accounts)
//!     .await?;
//! server.run().await
//! # }
//! ```
//!
//! The only integration point is [`AccountStore`](prelude::AccountStore):
//! implement it against your credential storage and hand it to
//! [`ConvoyServerBuilder::build`].

mod error;
mod handler;
mod hub;
mod server;

pub use error::ConvoyError;
pub use server::{ConvoyServer, ConvoyServerBuilder};

pub mod prelude {
    //! One-stop imports for building a Convoy server binary.

    pub use convoy_protocol::{
        BROADCAST_THRESHOLD_METERS, ClientId, ClientMessage, Codec, JsonCodec, Position,
        ServerMessage, UserSnapshot,
    };
    pub use convoy_session::{AccountError, AccountProfile, AccountStore, SessionConfig};

    pub use crate::error::ConvoyError;
    pub use crate::server::{ConvoyServer, ConvoyServerBuilder};
}

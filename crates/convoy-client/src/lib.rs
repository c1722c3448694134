//! Reconnecting WebSocket client for Convoy servers.
//!
//! [`LocationClient::connect`] spawns a driver task that owns the socket
//! and keeps the link alive: on an abnormal disconnect it redials with
//! exponential backoff (per [`ReconnectPolicy`]), replays the stored
//! credential, and carries on. While a link is up the driver pings the
//! server every [`ClientConfig::keepalive`], so a watcher that never
//! shares a location is not read-idle-closed. The application sees a
//! stream of [`ClientEvent`]s and never touches the socket.
//!
//! Two things make the client cheap to run against a phone-grade
//! network:
//!
//! - **Movement gating.** [`LocationClient::share_location`] skips
//!   updates that moved less than the server's broadcast threshold from
//!   the last position actually sent, so a stationary client stays
//!   silent. The marker resets on every reconnect.
//! - **Session resume.** After a successful login the driver keeps only
//!   the returned session id and resumes with it on every reconnect,
//!   so identity survives connection drops without re-sending the
//!   password.
//!
//! # Example
//!
//! ```no_run
//! use convoy_client::{ClientConfig, ClientEvent, Credentials, LocationClient};
//!
//! # async fn run() -> Result<(), convoy_client::ClientError> {
//! let (client, mut events) = LocationClient::connect(ClientConfig::new("ws://127.0.0.1:8080"));
//! client
//!     .authenticate(Credentials::Password {
//!         email: "ana@example.com".into(),
//!         password: "secret".into(),
//!         force: false,
//!     })
//!     .await?;
//!
//! while let Some(event) = events.recv().await {
//!     if let ClientEvent::Authenticated { session_id, .. } = event {
//!         println!("logged in, session {session_id}");
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod backoff;
mod client;
mod error;
mod events;

pub use backoff::{ConnectionState, ReconnectPolicy};
pub use client::{ClientConfig, Credentials, LocationClient};
pub use error::ClientError;
pub use events::ClientEvent;

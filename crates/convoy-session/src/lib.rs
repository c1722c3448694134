//! Account session management for Convoy.
//!
//! This crate answers "who is logged in right now":
//!
//! 1. **Login verification** — delegated to the consuming application via
//!    the [`AccountStore`] trait (credential storage is not our problem).
//! 2. **Session tracking** — one live session per account, with a random
//!    session id as the reconnect credential ([`SessionStore`]).
//! 3. **Idle expiry** — sessions that see no activity for a configurable
//!    window are swept away.
//!
//! # How it fits in the stack
//!
//! ```text
//! Gateway (above)   ← decides when to create/attach/expire sessions
//!     ↕
//! Session layer (this crate)  ← owns the session and session-id maps
//!     ↕
//! Protocol layer (below)      ← provides ClientId
//! ```
//!
//! A session is an *account's* presence, a connection is a *socket's*;
//! the two have independent lifetimes. A connection can outlive its
//! session (it degrades to anonymous) and a session can outlive its
//! connection (until idle expiry).

mod accounts;
mod error;
mod session;
mod store;

pub use accounts::{AccountError, AccountProfile, AccountStore};
pub use error::SessionError;
pub use session::{Session, SessionConfig};
pub use store::SessionStore;

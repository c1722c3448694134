//! Unified error type for the Convoy server.

use convoy_protocol::ProtocolError;
use convoy_roster::RosterError;
use convoy_session::SessionError;
use convoy_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `convoy` meta-crate, you deal with this single error
/// type instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant auto-generates `From` impls, so the `?`
/// operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ConvoyError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (login conflict, unknown session).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A roster-level error (unknown connection).
    #[error(transparent)]
    Roster(#[from] RosterError),

    /// The gateway hub task stopped. Connections cannot be served
    /// without it, so the server shuts down.
    #[error("gateway hub is no longer running")]
    HubStopped,
}

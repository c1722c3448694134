//! Events surfaced to the consuming application.

use convoy_protocol::{ClientId, Position, UserSnapshot};

use crate::backoff::ConnectionState;

/// Everything a [`LocationClient`] can tell the application.
///
/// Events arrive on the unbounded receiver returned by
/// [`LocationClient::connect`], one per inbound server message plus
/// [`ClientEvent::ConnectionState`] for every lifecycle change. The
/// channel never blocks the driver; if the application stops reading,
/// events are silently dropped.
///
/// [`LocationClient`]: crate::LocationClient
/// [`LocationClient::connect`]: crate::LocationClient::connect
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// The server's hello. First message on every fresh link, carrying
    /// the connection id and placeholder name assigned to us.
    Welcome { connection_id: ClientId, name: String },

    /// A full roster snapshot.
    UsersListUpdate { users: Vec<UserSnapshot> },

    /// Another participant joined.
    UserConnected { connection_id: ClientId, name: String },

    /// A participant left.
    UserDisconnected { connection_id: ClientId, name: String },

    /// A participant changed identity (typically after logging in).
    UserUpdated { connection_id: ClientId, name: String },

    /// A participant moved far enough for the server to fan it out.
    UserLocationUpdate {
        connection_id: ClientId,
        name: String,
        position: Position,
    },

    /// Our login or resume succeeded. The driver has already stored
    /// `session_id` and will resume with it after any reconnect.
    Authenticated {
        connection_id: ClientId,
        name: String,
        session_id: String,
    },

    /// Our login or resume was rejected.
    AuthenticationFailed { reason: String },

    /// The server evicted this connection. The stored session credential
    /// is dropped and the client will not dial again on its own.
    ForceDisconnected { reason: String },

    /// The connection lifecycle moved to a new state.
    ConnectionState(ConnectionState),

    /// A server-reported error, or a client-side failure worth surfacing
    /// (such as exhausting the reconnect schedule).
    Error { message: String },
}

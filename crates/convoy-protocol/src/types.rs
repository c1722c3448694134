//! Core protocol types for Convoy's wire format.
//!
//! This module defines every structure that travels on the wire. Each
//! message is one flat JSON object with a `"type"` field naming it — the
//! shape the original web clients expect:
//!
//! ```json
//! { "type": "authenticate", "session_id": "9f2c..." }
//! { "type": "user_location_update", "connection_id": "3fa2...",
//!   "name": "alice", "position": { "lat": 38.7223, "lng": -9.1393 } }
//! ```
//!
//! That shape maps directly onto serde's *internally tagged* enum
//! representation: `#[serde(tag = "type")]` stores the variant name in the
//! `"type"` field and the variant's fields flat beside it. Two enums split
//! the vocabulary by direction: [`ClientMessage`] is everything a client
//! may send, [`ServerMessage`] everything the gateway may send. The split
//! means a connection handler can decode inbound frames without ever
//! accepting, say, a spoofed `force_disconnect`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geo::Position;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The public identifier of one live connection.
///
/// A newtype over the random hex string the registry assigns at
/// registration. Randomness (rather than a counter) keeps ids from leaking
/// join order, and a string survives JavaScript consumers that would
/// silently mangle 64-bit integers.
///
/// `#[serde(transparent)]` serializes the wrapper as just the inner
/// string, so a `ClientId` appears on the wire as `"3fa29c01d4b2"`, not
/// `{ "0": "3fa29c01d4b2" }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub String);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// Messages a client may send to the gateway.
///
/// Anything that fails to decode into this enum — bad JSON, an unknown
/// `"type"`, a missing required field — is answered with
/// [`ServerMessage::Error`] and the connection stays open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Claim an identity on this connection.
    ///
    /// Two forms. `session_id` alone resumes an existing session and is
    /// the sole reconnect credential. `email` + `password` is a full
    /// login: credentials are verified against the account store and a
    /// fresh session is created; `force: true` additionally evicts a live
    /// session already held by the account.
    Authenticate {
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        email: Option<String>,
        #[serde(default)]
        password: Option<String>,
        #[serde(default)]
        force: bool,
    },

    /// Publish the sender's current position. Allowed for anonymous and
    /// authenticated connections alike.
    LocationUpdate {
        lat: f64,
        lng: f64,
        #[serde(default)]
        accuracy: Option<f64>,
        #[serde(default)]
        timestamp: Option<u64>,
    },

    /// Ask for a fresh roster snapshot.
    GetUsers,

    /// Liveness check; answered with [`ServerMessage::Pong`].
    Ping {
        #[serde(default)]
        timestamp: Option<u64>,
    },
}

impl ClientMessage {
    /// A `location_update` for `position`, flattening it into the wire
    /// fields.
    pub fn location_update(position: Position) -> Self {
        ClientMessage::LocationUpdate {
            lat: position.lat,
            lng: position.lng,
            accuracy: position.accuracy,
            timestamp: position.timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// One entry in a roster snapshot (`users_list`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub connection_id: ClientId,
    pub name: String,
    /// Last stored position, if this participant has published one.
    #[serde(default)]
    pub position: Option<Position>,
    /// Epoch milliseconds of the last position update.
    #[serde(default)]
    pub last_update_at: Option<u64>,
    /// Always true for entries in a live snapshot; the registry only
    /// tracks connected participants.
    pub online: bool,
}

/// Messages the gateway may send to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First message on every connection: your assigned id and
    /// placeholder name.
    Welcome { connection_id: ClientId, name: String },

    /// Full roster snapshot, including the receiving connection itself.
    UsersList { users: Vec<UserSnapshot> },

    /// A new participant joined (sent to everyone else).
    UserConnected { connection_id: ClientId, name: String },

    /// A participant left (sent to everyone else, exactly once).
    UserDisconnected { connection_id: ClientId, name: String },

    /// A participant's identity changed — in practice, the rename that
    /// happens when a connection authenticates. Sent to everyone,
    /// including the renamed connection.
    UserUpdated { connection_id: ClientId, name: String },

    /// A participant moved at least the broadcast threshold.
    UserLocationUpdate {
        connection_id: ClientId,
        name: String,
        position: Position,
    },

    /// Acknowledges a `location_update` from this connection, after the
    /// registry mutation; `broadcasted` reports whether peers were
    /// notified.
    LocationUpdateAck { broadcasted: bool },

    /// Authentication succeeded. `session_id` is the credential to
    /// present when reconnecting.
    AuthenticationSuccess {
        connection_id: ClientId,
        name: String,
        session_id: String,
    },

    /// Authentication failed; the connection remains open and anonymous.
    /// For a login conflict the reason includes when the existing session
    /// logged in and how long it has been idle, so the caller can decide
    /// whether to force.
    AuthenticationFailed { reason: String },

    /// This connection's session was taken over or revoked; the socket
    /// closes right after this message.
    ForceDisconnect { reason: String },

    /// Answer to `ping`; `timestamp` is the server clock in epoch
    /// milliseconds.
    Pong { timestamp: u64 },

    /// The most recent inbound frame could not be understood or applied.
    /// Never fatal to the connection.
    Error { message: String },
}

//! Connection registry: tracks every live connection and its last
//! reported position.

use std::collections::HashMap;
use std::time::SystemTime;

use rand::Rng;

use convoy_protocol::{
    BROADCAST_THRESHOLD_METERS, ClientId, Position, UserSnapshot, unix_time_millis,
};

use crate::RosterError;

/// A single connection's entry in the roster.
///
/// Every accepted socket gets one of these, anonymous at first. A
/// successful login upgrades the entry in place — same connection id,
/// real display name — so peers see the rename rather than a
/// disconnect/reconnect pair.
#[derive(Debug, Clone)]
pub struct Participant {
    /// Server-assigned id, unique for the lifetime of the process.
    pub connection_id: ClientId,

    /// Name shown to other users. Starts as a `Guest-xxxx` placeholder
    /// derived from the connection id.
    pub display_name: String,

    /// Whether the connection has logged in.
    pub authenticated: bool,

    /// Account email, present once authenticated.
    pub account_email: Option<String>,

    /// Most recent position, whether or not it was broadcast.
    pub last_position: Option<Position>,

    /// Server receive time of the last position update, in Unix
    /// milliseconds.
    pub last_update_at: Option<u64>,

    /// When the connection was accepted.
    pub connected_at: SystemTime,
}

impl Participant {
    /// Renders this entry as the wire-level roster row.
    pub fn snapshot(&self) -> UserSnapshot {
        UserSnapshot {
            connection_id: self.connection_id.clone(),
            name: self.display_name.clone(),
            position: self.last_position,
            last_update_at: self.last_update_at,
            online: true,
        }
    }
}

/// All currently-connected participants, keyed by connection id.
///
/// The registry is plain data — no locks, no channels. Whoever owns it
/// (the gateway hub) serializes access.
pub struct ConnectionRegistry {
    entries: HashMap<ClientId, Participant>,
}

impl ConnectionRegistry {
    /// Creates a new, empty registry.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Admits a new connection: assigns a fresh random id and a
    /// placeholder guest name, and returns the new entry.
    pub fn register(&mut self) -> &Participant {
        let connection_id = generate_client_id();
        let display_name = format!("Guest-{}", &connection_id.0[..4]);
        tracing::info!(connection_id = %connection_id, "connection registered");
        let participant = Participant {
            connection_id: connection_id.clone(),
            display_name,
            authenticated: false,
            account_email: None,
            last_position: None,
            last_update_at: None,
            connected_at: SystemTime::now(),
        };
        self.entries.entry(connection_id).or_insert(participant)
    }

    /// Marks a connection as authenticated, replacing the guest
    /// placeholder with the account's display name.
    pub fn upgrade(
        &mut self,
        connection_id: &ClientId,
        account_email: &str,
        display_name: &str,
    ) -> Result<&Participant, RosterError> {
        let participant = self
            .entries
            .get_mut(connection_id)
            .ok_or_else(|| RosterError::UnknownConnection(connection_id.clone()))?;
        participant.authenticated = true;
        participant.account_email = Some(account_email.to_owned());
        participant.display_name = display_name.to_owned();
        tracing::info!(
            connection_id = %connection_id,
            account_email,
            "connection authenticated"
        );
        Ok(&*participant)
    }

    /// Records a position update and reports whether it moved far
    /// enough from the previously *stored* position to be broadcast.
    ///
    /// The new position is stored unconditionally, so repeated small
    /// movements stay suppressed: each one is measured against the last
    /// report, not the last broadcast. The first update from a
    /// connection always broadcasts.
    pub fn update_position(
        &mut self,
        connection_id: &ClientId,
        position: Position,
    ) -> Result<bool, RosterError> {
        let participant = self
            .entries
            .get_mut(connection_id)
            .ok_or_else(|| RosterError::UnknownConnection(connection_id.clone()))?;
        let should_broadcast = match &participant.last_position {
            None => true,
            Some(previous) => {
                previous.distance_meters(&position) >= BROADCAST_THRESHOLD_METERS
            }
        };
        participant.last_position = Some(position);
        participant.last_update_at = Some(unix_time_millis());
        Ok(should_broadcast)
    }

    /// Removes a connection from the roster, returning its final entry
    /// if it was present.
    pub fn remove(&mut self, connection_id: &ClientId) -> Option<Participant> {
        let removed = self.entries.remove(connection_id);
        if removed.is_some() {
            tracing::info!(connection_id = %connection_id, "connection removed");
        }
        removed
    }

    /// Looks up a single connection.
    pub fn get(&self, connection_id: &ClientId) -> Option<&Participant> {
        self.entries.get(connection_id)
    }

    /// Returns a roster snapshot of every connection, ordered by
    /// connection id so repeated calls agree.
    pub fn snapshot_all(&self) -> Vec<UserSnapshot> {
        let mut snapshots: Vec<UserSnapshot> =
            self.entries.values().map(Participant::snapshot).collect();
        snapshots.sort_by(|a, b| a.connection_id.0.cmp(&b.connection_id.0));
        snapshots
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the roster is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Generates a random connection id: 6 bytes, hex-encoded (12 chars).
fn generate_client_id() -> ClientId {
    let mut rng = rand::rng();
    let bytes: [u8; 6] = rng.random();
    ClientId(bytes.iter().map(|b| format!("{b:02x}")).collect())
}

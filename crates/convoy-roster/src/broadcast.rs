//! Presence fan-out: per-connection outbound queues.
//!
//! Each live connection has exactly one bounded channel carrying its
//! outbound [`ServerMessage`]s; a writer task at the other end drains
//! the queue onto the socket. Routing everything through that single
//! channel is what keeps delivery ordered per receiver — a direct
//! reply and a broadcast can never overtake each other.

use std::collections::HashMap;

use tokio::sync::mpsc;

use convoy_protocol::{ClientId, ServerMessage};

/// How many outbound messages may queue per connection before the
/// connection is considered dead.
pub const OUTBOUND_BUFFER: usize = 64;

/// Channel sender for delivering outbound messages to one connection.
pub type PeerSender = mpsc::Sender<ServerMessage>;

/// Fan-out table: one outbound sender per subscribed connection.
///
/// All sends are non-blocking. A peer that cannot accept a message —
/// its queue is full or its writer task is gone — is reported back to
/// the caller so the connection can be torn down; the broadcaster
/// itself never removes entries behind the caller's back.
pub struct PresenceBroadcaster {
    peers: HashMap<ClientId, PeerSender>,
}

impl PresenceBroadcaster {
    /// Creates an empty broadcaster.
    pub fn new() -> Self {
        Self {
            peers: HashMap::new(),
        }
    }

    /// Starts delivering to a connection.
    pub fn subscribe(&mut self, connection_id: ClientId, sender: PeerSender) {
        self.peers.insert(connection_id, sender);
    }

    /// Stops delivering to a connection. Dropping the returned sender
    /// lets the writer task drain what is already queued and exit.
    pub fn unsubscribe(&mut self, connection_id: &ClientId) -> Option<PeerSender> {
        self.peers.remove(connection_id)
    }

    /// Queues a message for a single connection. Returns `false` if the
    /// connection is unknown or could not accept the message.
    pub fn send_to(&self, connection_id: &ClientId, message: ServerMessage) -> bool {
        match self.peers.get(connection_id) {
            Some(sender) => {
                let delivered = sender.try_send(message).is_ok();
                if !delivered {
                    tracing::debug!(
                        connection_id = %connection_id,
                        "dropping message for unresponsive connection"
                    );
                }
                delivered
            }
            None => false,
        }
    }

    /// Queues a message for every connection except `origin`.
    ///
    /// Returns the ids of peers that could not accept the message, so
    /// the caller can prune them.
    pub fn notify_others(
        &self,
        origin: &ClientId,
        message: &ServerMessage,
    ) -> Vec<ClientId> {
        self.fan_out(Some(origin), message)
    }

    /// Queues a message for every connection, sender included.
    pub fn notify_all(&self, message: &ServerMessage) -> Vec<ClientId> {
        self.fan_out(None, message)
    }

    fn fan_out(&self, skip: Option<&ClientId>, message: &ServerMessage) -> Vec<ClientId> {
        let mut dead = Vec::new();
        for (connection_id, sender) in &self.peers {
            if skip == Some(connection_id) {
                continue;
            }
            if sender.try_send(message.clone()).is_err() {
                tracing::debug!(
                    connection_id = %connection_id,
                    "peer queue unavailable during fan-out"
                );
                dead.push(connection_id.clone());
            }
        }
        dead
    }

    /// Number of subscribed connections.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether anyone is subscribed.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

impl Default for PresenceBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

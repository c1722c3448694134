//! Error types for the roster layer.

use convoy_protocol::ClientId;

/// Errors that can occur during roster operations.
#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    /// The connection is not in the registry. Either it was never
    /// registered or it has already been removed.
    #[error("connection {0} is not registered")]
    UnknownConnection(ClientId),
}

//! Per-connection handler: registration, decode, and routing.
//!
//! Each accepted connection gets two tasks. This handler runs the read
//! loop; a writer task drains the connection's outbound queue onto the
//! socket. The flow is:
//!   1. Register with the hub → assigned id, welcome choreography
//!   2. Loop: receive frames → decode → forward to the hub
//!   3. On close, idle timeout, or writer exit → hub `Disconnect`

use std::time::Duration;

use tokio::sync::mpsc;

use convoy_protocol::{ClientId, ClientMessage, Codec, ServerMessage};
use convoy_roster::OUTBOUND_BUFFER;
use convoy_transport::{Connection, WebSocketConnection};

use crate::ConvoyError;
use crate::hub::HubHandle;

/// Drop guard that reports the connection to the hub when the handler
/// exits. This ensures cleanup happens even if the handler panics.
/// Since `Drop` is synchronous, we spawn a fire-and-forget task for the
/// async send.
struct DisconnectGuard {
    connection_id: ClientId,
    hub: HubHandle,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let hub = self.hub.clone();
        let connection_id = self.connection_id.clone();
        tokio::spawn(async move {
            hub.disconnect(connection_id).await;
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C>(
    conn: WebSocketConnection,
    hub: HubHandle,
    codec: C,
    idle_timeout: Duration,
) -> Result<(), ConvoyError>
where
    C: Codec + Clone,
{
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
    // Kept locally so decode errors can be answered without a hub
    // round-trip.
    let error_tx = outbound_tx.clone();

    let Some(connection_id) = hub.register(outbound_tx).await else {
        return Err(ConvoyError::HubStopped);
    };
    let _guard = DisconnectGuard {
        connection_id: connection_id.clone(),
        hub: hub.clone(),
    };

    let mut writer = tokio::spawn(write_outbound(conn.clone(), codec.clone(), outbound_rx));

    tracing::info!(%conn_id, connection_id = %connection_id, "connection admitted");

    loop {
        tokio::select! {
            // The writer exiting first means the hub evicted or pruned
            // this connection.
            _ = &mut writer => {
                tracing::debug!(connection_id = %connection_id, "writer finished");
                break;
            }
            received = tokio::time::timeout(idle_timeout, conn.recv()) => {
                let text = match received {
                    Ok(Ok(Some(text))) => text,
                    Ok(Ok(None)) => {
                        tracing::info!(connection_id = %connection_id, "connection closed cleanly");
                        break;
                    }
                    Ok(Err(error)) => {
                        tracing::debug!(connection_id = %connection_id, error = %error, "recv error");
                        break;
                    }
                    Err(_) => {
                        tracing::info!(connection_id = %connection_id, "connection idle timeout");
                        break;
                    }
                };

                let message: ClientMessage = match codec.decode(&text) {
                    Ok(message) => message,
                    Err(error) => {
                        // Malformed input is answered, never fatal.
                        tracing::debug!(
                            connection_id = %connection_id,
                            error = %error,
                            "undecodable message"
                        );
                        let _ = error_tx.try_send(ServerMessage::Error {
                            message: format!("could not parse message: {error}"),
                        });
                        continue;
                    }
                };

                if !hub.inbound(connection_id.clone(), message).await {
                    return Err(ConvoyError::HubStopped);
                }
            }
        }
    }

    // `_guard` reports the disconnect. The writer closes the socket once
    // the hub unsubscribes this connection and `error_tx` drops.
    Ok(())
}

/// Drains a connection's outbound queue onto its socket.
///
/// Exits when every sender is gone, or right after delivering a
/// `force_disconnect` (eviction must not wait for the handler to give
/// up on an unresponsive peer). Closes the socket on the way out.
async fn write_outbound<C: Codec>(
    conn: WebSocketConnection,
    codec: C,
    mut outbound: mpsc::Receiver<ServerMessage>,
) {
    while let Some(message) = outbound.recv().await {
        let terminal = matches!(message, ServerMessage::ForceDisconnect { .. });

        match codec.encode(&message) {
            Ok(text) => {
                if let Err(error) = conn.send(&text).await {
                    tracing::debug!(conn_id = %conn.id(), error = %error, "outbound send failed");
                    break;
                }
            }
            Err(error) => {
                tracing::error!(conn_id = %conn.id(), error = %error, "outbound encode failed");
            }
        }

        if terminal {
            tracing::debug!(conn_id = %conn.id(), "force disconnect delivered");
            break;
        }
    }
    let _ = conn.close().await;
}

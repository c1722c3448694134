//! The client handle and its driver task.
//!
//! A [`LocationClient`] is a thin clonable handle; one spawned driver
//! task owns the socket, the stored credentials, and the last-sent
//! position marker. The handle talks to the driver over a command
//! channel and the driver reports everything back through an unbounded
//! event channel, so the application never touches the socket directly
//! and reconnection is invisible to it apart from
//! [`ClientEvent::ConnectionState`] changes.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use convoy_protocol::{
    BROADCAST_THRESHOLD_METERS, ClientMessage, Codec, JsonCodec, Position, ServerMessage,
    unix_time_millis,
};

use crate::backoff::{ConnectionState, ReconnectPolicy};
use crate::error::ClientError;
use crate::events::ClientEvent;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Size of the handle-to-driver command queue.
const COMMAND_BUFFER: usize = 16;

/// Default interval between keepalive pings on a live link.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Configuration and credentials
// ---------------------------------------------------------------------------

/// Configuration for a [`LocationClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the server, e.g. `ws://127.0.0.1:8080`.
    pub url: String,

    /// Backoff schedule for automatic reconnection.
    pub policy: ReconnectPolicy,

    /// Interval between keepalive pings while the link is up. Must stay
    /// under the server's read-idle limit (90 s by default) or a quiet
    /// watcher gets hung up on.
    pub keepalive: Duration,
}

impl ClientConfig {
    /// Configuration for `url` with the default reconnect policy.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            policy: ReconnectPolicy::default(),
            keepalive: KEEPALIVE_INTERVAL,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("ws://127.0.0.1:8080")
    }
}

/// Login material the driver replays after every reconnect.
///
/// A successful authentication replaces whatever is stored with
/// [`Credentials::SessionId`], which from then on is the sole resume
/// credential. An eviction clears the stored credential entirely.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// Full login. `force` evicts a live session the account already
    /// holds elsewhere.
    Password {
        email: String,
        password: String,
        force: bool,
    },

    /// Resume an existing session.
    SessionId(String),
}

// ---------------------------------------------------------------------------
// LocationClient
// ---------------------------------------------------------------------------

enum ClientCommand {
    Authenticate(Credentials),
    ShareLocation { position: Position, force: bool },
    Reconnect,
    Close,
}

/// Clonable handle to a running client driver.
#[derive(Clone)]
pub struct LocationClient {
    commands: mpsc::Sender<ClientCommand>,
}

impl LocationClient {
    /// Spawns the driver task, which starts dialing immediately, and
    /// returns the handle plus the event stream.
    ///
    /// Dropping every handle shuts the driver down the same way
    /// [`close`] does.
    ///
    /// [`close`]: LocationClient::close
    pub fn connect(config: ClientConfig) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let driver = ClientDriver {
            url: config.url,
            policy: config.policy,
            keepalive: config.keepalive,
            commands: command_rx,
            events: event_tx,
            codec: JsonCodec,
            credentials: None,
            last_sent: None,
            state: ConnectionState::Idle,
        };
        tokio::spawn(driver.run());
        (
            Self {
                commands: command_tx,
            },
            event_rx,
        )
    }

    /// Stores `credentials` and sends an `authenticate` right away if the
    /// link is up. The driver re-sends whatever is stored after every
    /// reconnect, so a login survives connection drops.
    pub async fn authenticate(&self, credentials: Credentials) -> Result<(), ClientError> {
        self.send(ClientCommand::Authenticate(credentials)).await
    }

    /// Publishes a position. Movement under the broadcast threshold from
    /// the last position actually sent on this link is skipped unless
    /// `force` is set. While disconnected, updates are dropped.
    pub async fn share_location(&self, position: Position, force: bool) -> Result<(), ClientError> {
        self.send(ClientCommand::ShareLocation { position, force })
            .await
    }

    /// Resets the retry counter and dials again from any state. This is
    /// the only way out of [`ConnectionState::GivenUp`].
    pub async fn reconnect(&self) -> Result<(), ClientError> {
        self.send(ClientCommand::Reconnect).await
    }

    /// Shuts the driver down: the socket is closed and no reconnection
    /// is attempted.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.send(ClientCommand::Close).await
    }

    async fn send(&self, command: ClientCommand) -> Result<(), ClientError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ClientError::Stopped)
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// How a live link ended.
enum LinkEnd {
    /// The server closed with a normal close frame.
    Clean,
    /// Socket error, EOF, or a non-normal close code.
    Abnormal,
    /// The server sent `force_disconnect`.
    Evicted,
    /// `reconnect()` while connected: drop this link, dial again now.
    Redial,
    /// `close()` was called or every handle is gone.
    Closed,
}

/// What to do once a backoff delay has been waited out.
enum Step {
    Retry,
    RetryNow,
    Stop,
}

struct ClientDriver {
    url: String,
    policy: ReconnectPolicy,
    keepalive: Duration,
    commands: mpsc::Receiver<ClientCommand>,
    events: mpsc::UnboundedSender<ClientEvent>,
    codec: JsonCodec,
    credentials: Option<Credentials>,
    /// Last position actually written to the socket on the current link.
    last_sent: Option<Position>,
    state: ConnectionState,
}

impl ClientDriver {
    async fn run(mut self) {
        let mut attempt: u32 = 0;

        loop {
            self.set_state(ConnectionState::Connecting);

            let mut socket = match connect_async(self.url.as_str()).await {
                Ok((socket, _)) => socket,
                Err(error) => {
                    tracing::debug!(url = %self.url, error = %error, "dial failed");
                    if self.schedule_retry(&mut attempt).await {
                        continue;
                    }
                    break;
                }
            };

            tracing::info!(url = %self.url, "connected");
            attempt = 0;
            // A fresh link always gets the first location update.
            self.last_sent = None;
            self.set_state(ConnectionState::Connected);

            if let Some(credentials) = self.credentials.clone() {
                self.send_message(&mut socket, &authenticate_message(&credentials))
                    .await;
            }

            match self.drive_link(&mut socket).await {
                LinkEnd::Closed => break,
                LinkEnd::Redial => {
                    attempt = 0;
                }
                LinkEnd::Abnormal => {
                    if !self.schedule_retry(&mut attempt).await {
                        break;
                    }
                }
                LinkEnd::Clean | LinkEnd::Evicted => {
                    self.set_state(ConnectionState::Idle);
                    if !self.wait_for_reconnect().await {
                        break;
                    }
                    attempt = 0;
                }
            }
        }

        self.set_state(ConnectionState::Idle);
        tracing::debug!("client driver stopped");
    }

    /// Serves a live link, multiplexing inbound frames with handle
    /// commands and the keepalive timer, until the link ends.
    async fn drive_link(&mut self, socket: &mut WsStream) -> LinkEnd {
        // Persistent timer, first fire one full period in; a watcher
        // that never shares a location still stays inside the server's
        // read-idle limit.
        let mut keepalive = tokio::time::interval_at(
            tokio::time::Instant::now() + self.keepalive,
            self.keepalive,
        );
        loop {
            tokio::select! {
                frame = socket.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(end) = self.handle_frame(text.as_str()) {
                            return end;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let normal = frame
                            .as_ref()
                            .is_none_or(|frame| frame.code == CloseCode::Normal);
                        if normal {
                            tracing::info!("server closed the connection");
                            return LinkEnd::Clean;
                        }
                        tracing::debug!(?frame, "abnormal close");
                        return LinkEnd::Abnormal;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        tracing::debug!(error = %error, "socket error");
                        return LinkEnd::Abnormal;
                    }
                    None => {
                        tracing::debug!("socket ended without a close frame");
                        return LinkEnd::Abnormal;
                    }
                },
                command = self.commands.recv() => match command {
                    None | Some(ClientCommand::Close) => {
                        let _ = socket.close(None).await;
                        return LinkEnd::Closed;
                    }
                    Some(ClientCommand::Reconnect) => {
                        let _ = socket.close(None).await;
                        return LinkEnd::Redial;
                    }
                    Some(ClientCommand::Authenticate(credentials)) => {
                        self.credentials = Some(credentials.clone());
                        self.send_message(socket, &authenticate_message(&credentials))
                            .await;
                    }
                    Some(ClientCommand::ShareLocation { position, force }) => {
                        self.share_position(socket, position, force).await;
                    }
                },
                _ = keepalive.tick() => {
                    let ping = ClientMessage::Ping {
                        timestamp: Some(unix_time_millis()),
                    };
                    self.send_message(socket, &ping).await;
                }
            }
        }
    }

    /// Decodes and dispatches one inbound text frame. Returns `Some`
    /// when the frame ends the link.
    fn handle_frame(&mut self, text: &str) -> Option<LinkEnd> {
        let message: ServerMessage = match self.codec.decode(text) {
            Ok(message) => message,
            Err(error) => {
                tracing::debug!(error = %error, "undecodable server message ignored");
                return None;
            }
        };

        match message {
            ServerMessage::Welcome {
                connection_id,
                name,
            } => {
                self.emit(ClientEvent::Welcome {
                    connection_id,
                    name,
                });
            }
            ServerMessage::UsersList { users } => {
                self.emit(ClientEvent::UsersListUpdate { users });
            }
            ServerMessage::UserConnected {
                connection_id,
                name,
            } => {
                self.emit(ClientEvent::UserConnected {
                    connection_id,
                    name,
                });
            }
            ServerMessage::UserDisconnected {
                connection_id,
                name,
            } => {
                self.emit(ClientEvent::UserDisconnected {
                    connection_id,
                    name,
                });
            }
            ServerMessage::UserUpdated {
                connection_id,
                name,
            } => {
                self.emit(ClientEvent::UserUpdated {
                    connection_id,
                    name,
                });
            }
            ServerMessage::UserLocationUpdate {
                connection_id,
                name,
                position,
            } => {
                self.emit(ClientEvent::UserLocationUpdate {
                    connection_id,
                    name,
                    position,
                });
            }
            ServerMessage::AuthenticationSuccess {
                connection_id,
                name,
                session_id,
            } => {
                // The session id supersedes password credentials for
                // every later resume.
                self.credentials = Some(Credentials::SessionId(session_id.clone()));
                self.emit(ClientEvent::Authenticated {
                    connection_id,
                    name,
                    session_id,
                });
            }
            ServerMessage::AuthenticationFailed { reason } => {
                self.emit(ClientEvent::AuthenticationFailed { reason });
            }
            ServerMessage::ForceDisconnect { reason } => {
                tracing::warn!(reason = %reason, "evicted by the server");
                self.credentials = None;
                self.emit(ClientEvent::ForceDisconnected { reason });
                return Some(LinkEnd::Evicted);
            }
            ServerMessage::LocationUpdateAck { broadcasted } => {
                tracing::trace!(broadcasted, "location update acknowledged");
            }
            ServerMessage::Pong { timestamp } => {
                tracing::trace!(timestamp, "pong");
            }
            ServerMessage::Error { message } => {
                self.emit(ClientEvent::Error { message });
            }
        }
        None
    }

    /// Sends a location update unless the movement is too small to
    /// matter.
    async fn share_position(&mut self, socket: &mut WsStream, position: Position, force: bool) {
        if !should_send(self.last_sent.as_ref(), &position, force) {
            tracing::trace!("movement under broadcast threshold, not sent");
            return;
        }
        if self
            .send_message(socket, &ClientMessage::location_update(position))
            .await
        {
            self.last_sent = Some(position);
        }
    }

    /// Encodes and writes one message. Returns `true` on success; on a
    /// write failure the link is left to die on its next read.
    async fn send_message(&mut self, socket: &mut WsStream, message: &ClientMessage) -> bool {
        let text = match self.codec.encode(message) {
            Ok(text) => text,
            Err(error) => {
                tracing::error!(error = %error, "outbound encode failed");
                return false;
            }
        };
        match socket.send(Message::Text(text.into())).await {
            Ok(()) => true,
            Err(error) => {
                tracing::debug!(error = %error, "outbound send failed");
                false
            }
        }
    }

    /// Records a failed link and waits out the backoff schedule. Returns
    /// `false` when the driver should stop instead of dialing again.
    async fn schedule_retry(&mut self, attempt: &mut u32) -> bool {
        *attempt += 1;
        if !self.policy.allows(*attempt) {
            tracing::warn!(
                attempts = self.policy.max_attempts,
                "giving up on automatic reconnection"
            );
            self.set_state(ConnectionState::GivenUp);
            self.emit(ClientEvent::Error {
                message: format!(
                    "gave up after {} reconnection attempts",
                    self.policy.max_attempts
                ),
            });
            if self.wait_for_reconnect().await {
                *attempt = 0;
                return true;
            }
            return false;
        }

        let delay = self.policy.delay(*attempt);
        self.set_state(ConnectionState::Backoff { attempt: *attempt });
        tracing::debug!(
            attempt = *attempt,
            delay_ms = delay.as_millis() as u64,
            "waiting before next dial"
        );
        match self.wait_backoff(delay).await {
            Step::Retry => true,
            Step::RetryNow => {
                *attempt = 0;
                true
            }
            Step::Stop => false,
        }
    }

    /// Sleeps for `delay` while still serving commands.
    async fn wait_backoff(&mut self, delay: Duration) -> Step {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return Step::Retry,
                command = self.commands.recv() => match command {
                    None | Some(ClientCommand::Close) => return Step::Stop,
                    Some(ClientCommand::Reconnect) => return Step::RetryNow,
                    Some(ClientCommand::Authenticate(credentials)) => {
                        self.credentials = Some(credentials);
                    }
                    Some(ClientCommand::ShareLocation { .. }) => {
                        tracing::debug!("not connected, location update dropped");
                    }
                },
            }
        }
    }

    /// Parks in `Idle` or `GivenUp` until told to dial again. Returns
    /// `false` when the driver should stop.
    async fn wait_for_reconnect(&mut self) -> bool {
        while let Some(command) = self.commands.recv().await {
            match command {
                ClientCommand::Reconnect => return true,
                ClientCommand::Close => return false,
                ClientCommand::Authenticate(credentials) => {
                    self.credentials = Some(credentials);
                }
                ClientCommand::ShareLocation { .. } => {
                    tracing::debug!("not connected, location update dropped");
                }
            }
        }
        false
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            self.state = state;
            self.emit(ClientEvent::ConnectionState(state));
        }
    }

    fn emit(&self, event: ClientEvent) {
        // A dropped receiver means the application stopped listening.
        let _ = self.events.send(event);
    }
}

/// The wire message for a stored credential.
fn authenticate_message(credentials: &Credentials) -> ClientMessage {
    match credentials {
        Credentials::Password {
            email,
            password,
            force,
        } => ClientMessage::Authenticate {
            session_id: None,
            email: Some(email.clone()),
            password: Some(password.clone()),
            force: *force,
        },
        Credentials::SessionId(session_id) => ClientMessage::Authenticate {
            session_id: Some(session_id.clone()),
            email: None,
            password: None,
            force: false,
        },
    }
}

/// Client-side mirror of the server's broadcast threshold: only movement
/// of at least [`BROADCAST_THRESHOLD_METERS`] from the last position
/// actually sent is worth the bytes.
fn should_send(last_sent: Option<&Position>, next: &Position, force: bool) -> bool {
    if force {
        return true;
    }
    match last_sent {
        Some(last) => last.distance_meters(next) >= BROADCAST_THRESHOLD_METERS,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use convoy_protocol::EARTH_RADIUS_METERS;

    fn lisbon() -> Position {
        Position::new(38.7223, -9.1393)
    }

    /// Degrees of latitude spanning `meters` on the reference sphere.
    fn lat_degrees_for(meters: f64) -> f64 {
        (meters / EARTH_RADIUS_METERS).to_degrees()
    }

    #[test]
    fn test_should_send_first_update_always_goes_out() {
        assert!(should_send(None, &lisbon(), false));
    }

    #[test]
    fn test_should_send_suppresses_small_movement() {
        let last = lisbon();
        let next = Position::new(last.lat + lat_degrees_for(4.0), last.lng);
        assert!(!should_send(Some(&last), &next, false));
    }

    #[test]
    fn test_should_send_passes_threshold_movement() {
        let last = lisbon();
        let next = Position::new(last.lat + lat_degrees_for(25.0), last.lng);
        assert!(should_send(Some(&last), &next, false));
    }

    #[test]
    fn test_should_send_force_overrides_suppression() {
        let last = lisbon();
        assert!(should_send(Some(&last), &last, true));
    }

    #[test]
    fn test_authenticate_message_from_password() {
        let message = authenticate_message(&Credentials::Password {
            email: "ana@example.com".into(),
            password: "hunter2".into(),
            force: true,
        });
        match message {
            ClientMessage::Authenticate {
                session_id,
                email,
                password,
                force,
            } => {
                assert_eq!(session_id, None);
                assert_eq!(email.as_deref(), Some("ana@example.com"));
                assert_eq!(password.as_deref(), Some("hunter2"));
                assert!(force);
            }
            other => panic!("expected authenticate, got {other:?}"),
        }
    }

    #[test]
    fn test_authenticate_message_from_session_id() {
        let message = authenticate_message(&Credentials::SessionId("abc123".into()));
        match message {
            ClientMessage::Authenticate {
                session_id,
                email,
                password,
                force,
            } => {
                assert_eq!(session_id.as_deref(), Some("abc123"));
                assert_eq!(email, None);
                assert_eq!(password, None);
                assert!(!force);
            }
            other => panic!("expected authenticate, got {other:?}"),
        }
    }
}

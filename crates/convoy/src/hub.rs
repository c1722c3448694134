//! Gateway hub: a single actor that owns all shared server state.
//!
//! The hub task owns the connection registry, the session store, and the
//! presence broadcaster outright — no locks, no shared mutability. Every
//! handler talks to it through a command channel and the hub processes
//! one command at a time, so compound operations (forced eviction, login
//! conflict checks, the idle sweep) cannot interleave.
//!
//! Handlers never block on the hub's fan-out either: all outbound
//! delivery goes through each connection's bounded queue via `try_send`.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use convoy_protocol::{ClientId, ClientMessage, Position, ServerMessage, unix_time_millis};
use convoy_roster::{ConnectionRegistry, PeerSender, PresenceBroadcaster};
use convoy_session::{AccountProfile, AccountStore, SessionConfig, SessionError, SessionStore};

/// Size of the hub's command queue. Senders await when it is full, which
/// back-pressures connection read loops rather than dropping commands.
const COMMAND_BUFFER: usize = 256;

/// Commands sent to the hub through its channel.
pub(crate) enum HubCommand {
    /// A freshly accepted connection: subscribe its outbound channel,
    /// admit it to the roster, reply with the assigned id.
    Register {
        outbound: PeerSender,
        reply: oneshot::Sender<ClientId>,
    },

    /// A decoded message from a live connection.
    Inbound {
        connection_id: ClientId,
        message: ClientMessage,
    },

    /// The connection's handler is done (close frame, read error, or
    /// idle timeout).
    Disconnect { connection_id: ClientId },
}

/// Clonable handle for talking to the hub from handler tasks.
#[derive(Clone)]
pub(crate) struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Registers a connection and returns its assigned id, or `None` if
    /// the hub has stopped.
    pub(crate) async fn register(&self, outbound: PeerSender) -> Option<ClientId> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(HubCommand::Register {
                outbound,
                reply: reply_tx,
            })
            .await
            .ok()?;
        reply_rx.await.ok()
    }

    /// Forwards a decoded message. Returns `false` if the hub has
    /// stopped.
    pub(crate) async fn inbound(&self, connection_id: ClientId, message: ClientMessage) -> bool {
        self.tx
            .send(HubCommand::Inbound {
                connection_id,
                message,
            })
            .await
            .is_ok()
    }

    /// Reports that a connection's handler has exited.
    pub(crate) async fn disconnect(&self, connection_id: ClientId) {
        let _ = self.tx.send(HubCommand::Disconnect { connection_id }).await;
    }
}

/// Spawns the hub task and returns a handle plus the task itself, so the
/// server can notice if the hub ever stops.
pub(crate) fn spawn_hub<A: AccountStore>(
    accounts: A,
    session_config: SessionConfig,
) -> (HubHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let hub = GatewayHub {
        commands: rx,
        registry: ConnectionRegistry::new(),
        sessions: SessionStore::new(session_config.clone()),
        broadcaster: PresenceBroadcaster::new(),
        accounts,
        sweep_interval: session_config.sweep_interval,
    };
    let task = tokio::spawn(hub.run());
    (HubHandle { tx }, task)
}

struct GatewayHub<A: AccountStore> {
    commands: mpsc::Receiver<HubCommand>,
    registry: ConnectionRegistry,
    sessions: SessionStore,
    broadcaster: PresenceBroadcaster,
    accounts: A,
    sweep_interval: Duration,
}

impl<A: AccountStore> GatewayHub<A> {
    async fn run(mut self) {
        let mut sweep = tokio::time::interval(self.sweep_interval);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                _ = sweep.tick() => self.sweep_idle_sessions(),
            }
        }

        tracing::debug!("gateway hub stopped");
    }

    async fn handle_command(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register { outbound, reply } => {
                let connection_id = self.admit(outbound);
                let _ = reply.send(connection_id);
            }
            HubCommand::Inbound {
                connection_id,
                message,
            } => self.dispatch(connection_id, message).await,
            HubCommand::Disconnect { connection_id } => {
                let dead = self.drop_participant(&connection_id);
                self.prune(dead);
            }
        }
    }

    /// Admits a new connection: roster entry, outbound subscription,
    /// welcome choreography.
    fn admit(&mut self, outbound: PeerSender) -> ClientId {
        let participant = self.registry.register();
        let connection_id = participant.connection_id.clone();
        let name = participant.display_name.clone();

        self.broadcaster.subscribe(connection_id.clone(), outbound);

        // The newcomer hears `welcome` first, then the current roster.
        self.broadcaster.send_to(
            &connection_id,
            ServerMessage::Welcome {
                connection_id: connection_id.clone(),
                name: name.clone(),
            },
        );
        self.broadcaster.send_to(
            &connection_id,
            ServerMessage::UsersList {
                users: self.registry.snapshot_all(),
            },
        );

        // Everyone else hears the announcement, then the fresh roster.
        let announcement = ServerMessage::UserConnected {
            connection_id: connection_id.clone(),
            name,
        };
        let dead = self.broadcaster.notify_others(&connection_id, &announcement);
        self.prune(dead);
        self.push_roster_to_others(&connection_id);

        connection_id
    }

    async fn dispatch(&mut self, connection_id: ClientId, message: ClientMessage) {
        // Any traffic from an authenticated connection counts as
        // activity for idle-expiry purposes.
        let email = self
            .registry
            .get(&connection_id)
            .and_then(|p| p.account_email.clone());
        if let Some(email) = email {
            self.sessions.touch(&email);
        }

        match message {
            ClientMessage::Authenticate {
                session_id,
                email,
                password,
                force,
            } => {
                self.authenticate(connection_id, session_id, email, password, force)
                    .await;
            }
            ClientMessage::LocationUpdate {
                lat,
                lng,
                accuracy,
                timestamp,
            } => {
                self.update_location(
                    connection_id,
                    Position {
                        lat,
                        lng,
                        accuracy,
                        timestamp,
                    },
                );
            }
            ClientMessage::GetUsers => {
                self.broadcaster.send_to(
                    &connection_id,
                    ServerMessage::UsersList {
                        users: self.registry.snapshot_all(),
                    },
                );
            }
            ClientMessage::Ping { .. } => {
                self.broadcaster.send_to(
                    &connection_id,
                    ServerMessage::Pong {
                        timestamp: unix_time_millis(),
                    },
                );
            }
        }
    }

    async fn authenticate(
        &mut self,
        connection_id: ClientId,
        session_id: Option<String>,
        email: Option<String>,
        password: Option<String>,
        force: bool,
    ) {
        match (session_id, email, password) {
            (Some(session_id), _, _) => self.resume_session(connection_id, &session_id),
            (None, Some(email), Some(password)) => {
                self.login(connection_id, &email, &password, force).await;
            }
            _ => {
                self.broadcaster.send_to(
                    &connection_id,
                    ServerMessage::AuthenticationFailed {
                        reason: "provide a session_id, or an email and password".into(),
                    },
                );
            }
        }
    }

    /// Reconnect path: the session id is the sole credential.
    fn resume_session(&mut self, connection_id: ClientId, session_id: &str) {
        // If another live connection currently embodies this session,
        // it loses: same account, newest connection wins.
        let displaced = self
            .sessions
            .lookup_by_id(session_id)
            .and_then(|s| s.attached_connection.clone())
            .filter(|attached| *attached != connection_id);
        if let Some(old_connection) = displaced {
            self.evict_connection(&old_connection, "session resumed from another connection");
        }

        match self.sessions.attach(session_id, connection_id.clone()) {
            Ok(session) => {
                let email = session.account_email.clone();
                let name = session.display_name.clone();
                let session_id = session.session_id.clone();
                self.finish_authentication(connection_id, &email, &name, session_id);
            }
            Err(error) => {
                tracing::debug!(
                    connection_id = %connection_id,
                    error = %error,
                    "session resume rejected"
                );
                self.broadcaster.send_to(
                    &connection_id,
                    ServerMessage::AuthenticationFailed {
                        reason: error.to_string(),
                    },
                );
            }
        }
    }

    /// Full-login path: verify credentials, then claim the account's
    /// single session slot.
    async fn login(&mut self, connection_id: ClientId, email: &str, password: &str, force: bool) {
        let profile = match self.accounts.verify_credentials(email, password).await {
            Ok(profile) => profile,
            Err(error) => {
                tracing::info!(
                    connection_id = %connection_id,
                    email,
                    error = %error,
                    "login rejected"
                );
                self.broadcaster.send_to(
                    &connection_id,
                    ServerMessage::AuthenticationFailed {
                        reason: error.to_string(),
                    },
                );
                return;
            }
        };

        match self.establish_session(connection_id.clone(), &profile) {
            Ok(()) => {}
            Err(SessionError::AlreadyLoggedIn { .. }) if force => {
                // Takeover: evict the old session's connection, delete
                // the session, create the replacement. All of it happens
                // in this one hub turn, so no lookup can observe the old
                // and new sessions side by side.
                if let Some(old) = self.sessions.force_replace(&profile.email) {
                    // A connection refreshing its own login keeps its
                    // seat; only a different connection is displaced.
                    if let Some(old_connection) = old
                        .attached_connection
                        .filter(|attached| *attached != connection_id)
                    {
                        self.evict_connection(&old_connection, "signed in from another device");
                    }
                }
                if let Err(error) = self.establish_session(connection_id.clone(), &profile) {
                    self.broadcaster.send_to(
                        &connection_id,
                        ServerMessage::AuthenticationFailed {
                            reason: error.to_string(),
                        },
                    );
                }
            }
            Err(error) => {
                self.broadcaster.send_to(
                    &connection_id,
                    ServerMessage::AuthenticationFailed {
                        reason: error.to_string(),
                    },
                );
            }
        }
    }

    /// Creates a session for a verified account, binds it to the
    /// connection, and announces the rename.
    fn establish_session(
        &mut self,
        connection_id: ClientId,
        profile: &AccountProfile,
    ) -> Result<(), SessionError> {
        let session_id = self
            .sessions
            .create(&profile.email, &profile.display_name)?
            .session_id
            .clone();
        // A session created this turn cannot be missing.
        let _ = self.sessions.attach(&session_id, connection_id.clone());
        self.finish_authentication(
            connection_id,
            &profile.email,
            &profile.display_name,
            session_id,
        );
        Ok(())
    }

    /// Shared tail of both authentication paths: upgrade the roster
    /// entry and tell the world.
    fn finish_authentication(
        &mut self,
        connection_id: ClientId,
        email: &str,
        display_name: &str,
        session_id: String,
    ) {
        match self.registry.upgrade(&connection_id, email, display_name) {
            Ok(participant) => {
                let name = participant.display_name.clone();
                self.broadcaster.send_to(
                    &connection_id,
                    ServerMessage::AuthenticationSuccess {
                        connection_id: connection_id.clone(),
                        name: name.clone(),
                        session_id,
                    },
                );
                // Everyone sees the rename, then the refreshed roster.
                let update = ServerMessage::UserUpdated {
                    connection_id: connection_id.clone(),
                    name,
                };
                let dead = self.broadcaster.notify_all(&update);
                self.prune(dead);
                self.push_roster_to_all();
            }
            Err(error) => {
                // The connection was pruned between its message and this
                // turn. Leave the session resumable, but not bound to a
                // connection that no longer exists.
                tracing::debug!(
                    connection_id = %connection_id,
                    error = %error,
                    "authenticated connection vanished"
                );
                self.sessions.detach(email);
            }
        }
    }

    fn update_location(&mut self, connection_id: ClientId, position: Position) {
        let broadcasted = match self.registry.update_position(&connection_id, position) {
            Ok(flag) => flag,
            Err(error) => {
                tracing::debug!(
                    connection_id = %connection_id,
                    error = %error,
                    "location update for missing connection"
                );
                return;
            }
        };

        // Ack only once the registry holds the update.
        self.broadcaster.send_to(
            &connection_id,
            ServerMessage::LocationUpdateAck { broadcasted },
        );

        if broadcasted {
            let name = match self.registry.get(&connection_id) {
                Some(participant) => participant.display_name.clone(),
                None => return,
            };
            let update = ServerMessage::UserLocationUpdate {
                connection_id: connection_id.clone(),
                name,
                position,
            };
            let dead = self.broadcaster.notify_others(&connection_id, &update);
            self.prune(dead);
        }
    }

    /// Forced-eviction choreography. The notice is queued before the
    /// unsubscribe, so the connection's writer delivers it and then
    /// drains shut.
    fn evict_connection(&mut self, connection_id: &ClientId, reason: &str) {
        tracing::info!(connection_id = %connection_id, reason, "evicting connection");
        self.broadcaster.send_to(
            connection_id,
            ServerMessage::ForceDisconnect {
                reason: reason.to_owned(),
            },
        );
        let dead = self.drop_participant(connection_id);
        self.prune(dead);
    }

    /// Removes a connection from every table and announces the
    /// departure. Idempotent: a connection that is already gone (evicted
    /// earlier, then its handler exits) does nothing. Returns peers
    /// found dead while announcing.
    fn drop_participant(&mut self, connection_id: &ClientId) -> Vec<ClientId> {
        self.broadcaster.unsubscribe(connection_id);
        let Some(participant) = self.registry.remove(connection_id) else {
            return Vec::new();
        };

        // Detach only if this connection still owns the session; after a
        // forced replacement the same email's session belongs to someone
        // else.
        if let Some(email) = &participant.account_email {
            let owns_session = self
                .sessions
                .lookup_by_email(email)
                .is_some_and(|s| s.attached_connection.as_ref() == Some(connection_id));
            if owns_session {
                self.sessions.detach(email);
            }
        }

        let farewell = ServerMessage::UserDisconnected {
            connection_id: participant.connection_id.clone(),
            name: participant.display_name.clone(),
        };
        let mut dead = self.broadcaster.notify_all(&farewell);
        dead.extend(self.broadcaster.notify_all(&ServerMessage::UsersList {
            users: self.registry.snapshot_all(),
        }));
        dead
    }

    /// Tears down connections whose outbound queues rejected a message,
    /// following any further casualties the teardown broadcasts reveal.
    fn prune(&mut self, mut dead: Vec<ClientId>) {
        while let Some(connection_id) = dead.pop() {
            tracing::warn!(
                connection_id = %connection_id,
                "removing unresponsive connection"
            );
            let more = self.drop_participant(&connection_id);
            dead.extend(more);
        }
    }

    fn push_roster_to_all(&mut self) {
        let roster = ServerMessage::UsersList {
            users: self.registry.snapshot_all(),
        };
        let dead = self.broadcaster.notify_all(&roster);
        self.prune(dead);
    }

    fn push_roster_to_others(&mut self, origin: &ClientId) {
        let roster = ServerMessage::UsersList {
            users: self.registry.snapshot_all(),
        };
        let dead = self.broadcaster.notify_others(origin, &roster);
        self.prune(dead);
    }

    /// Removes sessions idle past the configured maximum. A connection
    /// whose session expires stays on the roster under its current name;
    /// only the resume credential dies with the session.
    fn sweep_idle_sessions(&mut self) {
        for session in self.sessions.expire_idle() {
            tracing::info!(
                email = %session.account_email,
                attached = session.is_attached(),
                "idle session expired"
            );
        }
    }
}

//! The session store: tracks every live login.
//!
//! This is the central piece of the session layer. It's responsible for:
//! - Creating a session when an account logs in
//! - Enforcing at most one live session per account
//! - Resolving session ids presented by reconnecting clients
//! - Recording which connection currently embodies each session
//! - Expiring sessions that have gone idle
//!
//! # Concurrency note
//!
//! `SessionStore` is NOT thread-safe by itself — it uses plain `HashMap`s,
//! not concurrent ones. This is intentional: the store is owned by the
//! gateway hub task and every mutation goes through that single owner, so
//! the forced-eviction sequence and the idle sweep can never interleave
//! with a concurrent login.
//!
//! ## Lifecycle
//!
//! ```text
//! create() ──→ attach() ──→ touch()* ──→ detach()
//!    │                                      │
//!    │   (conflict: AlreadyLoggedIn)        ▼
//!    │◄── force_replace() ◄── new login  expire_idle()
//!    │                                      │
//!    ▼                                      ▼
//! remove() (logout)                    session gone
//! ```

use std::collections::HashMap;
use std::time::Instant;

use convoy_protocol::ClientId;
use rand::Rng;

use crate::{Session, SessionConfig, SessionError};

/// All live sessions, keyed two ways.
///
/// `sessions` is keyed by account email because the single-session rule
/// is per account. `by_id` maps the random session id back to the email so
/// a reconnecting client's credential resolves in O(1) without scanning.
/// Every public method leaves the two maps consistent.
pub struct SessionStore {
    sessions: HashMap<String, Session>,
    by_id: HashMap<String, String>,
    config: SessionConfig,
}

impl SessionStore {
    /// Creates a new, empty store with the given config.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            by_id: HashMap::new(),
            config,
        }
    }

    /// Creates a session for an account that just passed credential
    /// verification.
    ///
    /// The new session starts detached; the gateway attaches the winning
    /// connection separately.
    ///
    /// # Errors
    /// Returns [`SessionError::AlreadyLoggedIn`] if the account already
    /// has a live session — attached or not — with enough information for
    /// a human to decide whether to force the login. Never evicts on its
    /// own; that decision belongs to the caller.
    pub fn create(
        &mut self,
        email: &str,
        display_name: &str,
    ) -> Result<&Session, SessionError> {
        if let Some(existing) = self.sessions.get(email) {
            return Err(SessionError::AlreadyLoggedIn {
                email: email.to_owned(),
                logged_in_at_ms: existing.created_at_millis(),
                idle_secs: existing.idle_for().as_secs(),
            });
        }

        let session_id = generate_session_id();
        let session = Session {
            session_id: session_id.clone(),
            account_email: email.to_owned(),
            display_name: display_name.to_owned(),
            created_at: std::time::SystemTime::now(),
            last_activity: Instant::now(),
            attached_connection: None,
        };

        // Insert into both maps to keep them in sync.
        self.by_id.insert(session_id, email.to_owned());
        tracing::info!(email, "session created");
        Ok(self.sessions.entry(email.to_owned()).or_insert(session))
    }

    /// Removes and returns the account's current session so the caller
    /// can evict its attached connection *before* creating the
    /// replacement.
    ///
    /// The returned session carries `attached_connection`, which is
    /// everything the gateway needs to deliver the eviction notice. The
    /// replacement session does not exist until the caller creates it, so
    /// no lookup can observe both at once.
    pub fn force_replace(&mut self, email: &str) -> Option<Session> {
        let session = self.remove_entry(email)?;
        tracing::info!(email, "session removed for forced replacement");
        Some(session)
    }

    /// Resolves a session id presented by a connection and attaches that
    /// connection to the session.
    ///
    /// This is the reconnect path: the session id is the sole credential.
    /// Attaching counts as activity.
    ///
    /// # Errors
    /// Returns [`SessionError::UnknownSession`] if the id resolves to
    /// nothing.
    pub fn attach(
        &mut self,
        session_id: &str,
        connection: ClientId,
    ) -> Result<&Session, SessionError> {
        let email = self
            .by_id
            .get(session_id)
            .cloned()
            .ok_or(SessionError::UnknownSession)?;
        let session = self
            .sessions
            .get_mut(&email)
            .ok_or(SessionError::UnknownSession)?;

        session.attached_connection = Some(connection);
        session.last_activity = Instant::now();

        tracing::info!(email, "connection attached to session");
        Ok(&*session)
    }

    /// Refreshes the account's activity clock. Called for every message
    /// arriving on an authenticated connection.
    ///
    /// Returns `false` if the account has no session (it may have expired
    /// under a silent connection — not an error, the connection just
    /// continues as anonymous-equivalent).
    pub fn touch(&mut self, email: &str) -> bool {
        match self.sessions.get_mut(email) {
            Some(session) => {
                session.last_activity = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Clears the session's attached connection when that connection
    /// drops. The session itself stays alive until idle expiry, which is
    /// what lets a client reconnect with its session id.
    ///
    /// Returns `false` if the account has no session.
    pub fn detach(&mut self, email: &str) -> bool {
        match self.sessions.get_mut(email) {
            Some(session) => {
                session.attached_connection = None;
                tracing::debug!(email, "connection detached from session");
                true
            }
            None => false,
        }
    }

    /// Explicit logout: destroys the account's session immediately.
    pub fn remove(&mut self, email: &str) -> Option<Session> {
        let session = self.remove_entry(email)?;
        tracing::info!(email, "session removed (logout)");
        Some(session)
    }

    /// Removes every session idle longer than the configured maximum and
    /// returns them, attached or not (an attached-but-silent session
    /// expires too; its connection survives as anonymous-equivalent).
    ///
    /// Driven by the gateway's sweep timer. Because the store has a
    /// single owner, a sweep can never interleave with `touch` or
    /// `create`.
    pub fn expire_idle(&mut self) -> Vec<Session> {
        let max_idle = self.config.max_idle;
        let stale: Vec<String> = self
            .sessions
            .values()
            .filter(|s| s.idle_for() > max_idle)
            .map(|s| s.account_email.clone())
            .collect();

        let mut removed = Vec::with_capacity(stale.len());
        for email in stale {
            if let Some(session) = self.remove_entry(&email) {
                tracing::info!(
                    email,
                    idle_secs = session.idle_for().as_secs(),
                    "session expired (idle)"
                );
                removed.push(session);
            }
        }
        removed
    }

    /// Looks up a session by account email.
    pub fn lookup_by_email(&self, email: &str) -> Option<&Session> {
        self.sessions.get(email)
    }

    /// Looks up a session by its session id.
    pub fn lookup_by_id(&self, session_id: &str) -> Option<&Session> {
        let email = self.by_id.get(session_id)?;
        self.sessions.get(email)
    }

    /// Returns the number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if no account is logged in.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Removes one session from both maps.
    fn remove_entry(&mut self, email: &str) -> Option<Session> {
        let session = self.sessions.remove(email)?;
        self.by_id.remove(&session.session_id);
        Some(session)
    }
}

/// Generates a random 32-character hex string (128 bits of entropy).
///
/// Handed to the client as its session id, so it doubles as a bearer
/// credential: guessing a live one is infeasible at 2^128 possibilities.
fn generate_session_id() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// =========================================================================
// Tests
// =========================================================================

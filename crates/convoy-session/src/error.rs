//! Error types for the session layer.

/// Errors that can occur during session management.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The account already has a live session.
    ///
    /// Carries when that session logged in (epoch milliseconds) and how
    /// long it has been idle, so the login surface can show the conflict
    /// to a human and offer a forced login. Never resolved automatically.
    #[error(
        "account {email} is already logged in (since {logged_in_at_ms}, \
         idle for {idle_secs}s)"
    )]
    AlreadyLoggedIn {
        email: String,
        logged_in_at_ms: u64,
        idle_secs: u64,
    },

    /// The presented session id resolves to nothing — it was never
    /// issued, belonged to a session that expired, or was revoked.
    /// Deliberately carries no detail a credential-guesser could use.
    #[error("unknown or expired session")]
    UnknownSession,
}

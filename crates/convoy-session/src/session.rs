//! Session types: the server's record of a logged-in account.
//!
//! A session tracks:
//! - WHO is logged in (`account_email`, `display_name`)
//! - HOW the client can prove it later (`session_id`, the reconnect
//!   credential)
//! - WHICH connection currently embodies it (`attached_connection`)
//! - WHEN it was last active (`last_activity`, for idle expiry)

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use convoy_protocol::ClientId;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for session lifetime behavior.
///
/// Build one with `SessionConfig::default()` and override the fields you
/// care about.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a session may go without any authenticated activity
    /// before the sweep removes it.
    ///
    /// Default: 30 minutes.
    pub max_idle: Duration,

    /// How often the gateway runs the idle sweep.
    ///
    /// Default: 5 minutes. A session can therefore outlive its deadline
    /// by up to one sweep interval; idleness is measured from activity,
    /// never extended by the sweep itself.
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_idle: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One account's live session.
///
/// Created on successful login, destroyed by explicit logout, forced
/// replacement, or idle expiry. There is never more than one per account.
///
/// Two clocks on purpose: `created_at` is wall time because humans see it
/// in login-conflict messages; `last_activity` is monotonic because the
/// idle computation must not jump when the system clock does.
#[derive(Debug, Clone)]
pub struct Session {
    /// Random 32-character hex secret (128 bits). Presenting it is how a
    /// reconnecting client proves it owns this session.
    pub session_id: String,

    /// The account this session belongs to.
    pub account_email: String,

    /// The account's stored username, used as the roster display name.
    pub display_name: String,

    /// Wall-clock login time.
    pub created_at: SystemTime,

    /// Last authenticated activity; refreshed by `touch`.
    pub last_activity: Instant,

    /// The connection currently authenticated against this session, if
    /// any. Cleared when that connection drops; the session itself
    /// survives until idle expiry.
    pub attached_connection: Option<ClientId>,
}

impl Session {
    /// Whether a live connection currently embodies this session.
    pub fn is_attached(&self) -> bool {
        self.attached_connection.is_some()
    }

    /// How long since the last authenticated activity.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Login time as epoch milliseconds, for wire-facing conflict info.
    pub fn created_at_millis(&self) -> u64 {
        self.created_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

//! Reconnection policy and connection lifecycle states.

use std::time::Duration;

// ---------------------------------------------------------------------------
// ReconnectPolicy
// ---------------------------------------------------------------------------

/// Exponential backoff schedule for automatic reconnection.
///
/// Attempt `n` (1-indexed) waits `base_delay * 2^(n-1)` before dialing
/// again. With the defaults that is 1s, 2s, 4s, 8s, 16s, after which the
/// client gives up until [`LocationClient::reconnect`] is called.
///
/// [`LocationClient::reconnect`]: crate::LocationClient::reconnect
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the first retry. Doubles on every further attempt.
    pub base_delay: Duration,

    /// How many automatic retries to make before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// The delay before retry `attempt` (1-indexed).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    /// Returns `true` if retry `attempt` is still within the schedule.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }
}

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// Where the client currently stands with its server.
///
/// Every change is surfaced as a [`ClientEvent::ConnectionState`], so an
/// application can drive its UI straight off this enum.
///
/// [`ClientEvent::ConnectionState`]: crate::ClientEvent::ConnectionState
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected and not trying. The starting state, and where a
    /// deliberate close, a server-side close, or an eviction lands.
    Idle,

    /// A dial is in flight.
    Connecting,

    /// The link is up.
    Connected,

    /// Waiting out the delay before retry `attempt`.
    Backoff { attempt: u32 },

    /// Automatic reconnection exhausted its schedule. Only
    /// [`LocationClient::reconnect`] leaves this state.
    ///
    /// [`LocationClient::reconnect`]: crate::LocationClient::reconnect
    GivenUp,
}

impl ConnectionState {
    /// Returns `true` if the link is up and messages can be sent.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` if the client will dial again on its own.
    pub fn is_retrying(&self) -> bool {
        matches!(self, Self::Connecting | Self::Backoff { .. })
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Backoff { attempt } => write!(f, "Backoff(attempt {attempt})"),
            Self::GivenUp => write!(f, "GivenUp"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_per_attempt() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(3), Duration::from_secs(4));
        assert_eq!(policy.delay(4), Duration::from_secs(8));
        assert_eq!(policy.delay(5), Duration::from_secs(16));
    }

    #[test]
    fn test_delay_scales_with_custom_base() {
        let policy = ReconnectPolicy {
            base_delay: Duration::from_millis(100),
            max_attempts: 3,
        };
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(3), Duration::from_millis(400));
    }

    #[test]
    fn test_allows_stops_after_max_attempts() {
        let policy = ReconnectPolicy::default();
        assert!(policy.allows(1));
        assert!(policy.allows(5));
        assert!(!policy.allows(6));
    }

    #[test]
    fn test_default_policy() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_attempts, 5);
    }

    #[test]
    fn test_connection_state_predicates() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Idle.is_connected());
        assert!(ConnectionState::Connecting.is_retrying());
        assert!(ConnectionState::Backoff { attempt: 2 }.is_retrying());
        assert!(!ConnectionState::GivenUp.is_retrying());
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Idle.to_string(), "Idle");
        assert_eq!(
            ConnectionState::Backoff { attempt: 3 }.to_string(),
            "Backoff(attempt 3)"
        );
    }
}

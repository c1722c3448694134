//! Coordinates and great-circle distance.
//!
//! The gateway rebroadcasts a position only when its owner has moved at
//! least [`BROADCAST_THRESHOLD_METERS`] from the previously stored one,
//! and the client library mirrors the same threshold against the last
//! position it actually sent. Both sides use this module, so the two
//! filters can never disagree about what "10 meters" means.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters, the sphere the distance math assumes.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Minimum movement, in meters, before a position update is fanned out to
/// peers. The comparison is inclusive: exactly 10.0 m rebroadcasts.
/// Fixed by the protocol, not configurable per client.
pub const BROADCAST_THRESHOLD_METERS: f64 = 10.0;

/// A geographic position as reported by a client.
///
/// `lat` and `lng` are decimal degrees. `accuracy` (meters) and
/// `timestamp` (epoch milliseconds, client clock) are whatever the
/// reporting device offered; the server stores them verbatim and never
/// interprets them — all distance decisions use `lat`/`lng` only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<u64>,
}

impl Position {
    /// A bare position with no accuracy or timestamp metadata.
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng, accuracy: None, timestamp: None }
    }

    /// Great-circle distance to `other`, in meters, by the Haversine
    /// formula on a sphere of radius [`EARTH_RADIUS_METERS`].
    ///
    /// Spherical error versus the real ellipsoid stays well under 0.5%,
    /// which is noise at a 10 m threshold. The intermediate term is
    /// clamped before `asin` so antipodal points cannot produce NaN from
    /// floating-point overshoot.
    pub fn distance_meters(&self, other: &Position) -> f64 {
        let phi1 = self.lat.to_radians();
        let phi2 = other.lat.to_radians();
        let dphi = (other.lat - self.lat).to_radians();
        let dlambda = (other.lng - self.lng).to_radians();

        let a = (dphi / 2.0).sin().powi(2)
            + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_METERS * a.sqrt().min(1.0).asin()
    }
}

/// Current wall-clock time as epoch milliseconds — the timestamp unit
/// used everywhere on the wire.
pub fn unix_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

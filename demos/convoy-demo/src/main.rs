//! Demo: a Convoy server plus one simulated participant.
//!
//! Starts the server with two seeded accounts, then spawns a roaming
//! client that logs in as Alice and drifts north-east from the Lisbon
//! riverfront, publishing a position every couple of seconds. Watch the
//! logs, or point more clients at the printed address:
//!
//! ```text
//! RUST_LOG=debug cargo run -p convoy-demo [bind-addr]
//! ```

use std::time::Duration;

use convoy::prelude::*;
use convoy_client::{ClientConfig, ClientEvent, Credentials, LocationClient};
use convoy_protocol::EARTH_RADIUS_METERS;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// Fixed demo accounts, the in-memory stand-in for a user database.
struct StaticAccounts {
    /// `(email, password, display name)` triples.
    accounts: Vec<(String, String, String)>,
}

impl StaticAccounts {
    fn seeded() -> Self {
        Self {
            accounts: vec![
                (
                    "alice@example.com".into(),
                    "wonderland".into(),
                    "Alice".into(),
                ),
                ("bob@example.com".into(), "builder".into(), "Bob".into()),
            ],
        }
    }
}

impl AccountStore for StaticAccounts {
    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AccountProfile, AccountError> {
        self.accounts
            .iter()
            .find(|(e, p, _)| e.as_str() == email && p.as_str() == password)
            .map(|(email, _, display_name)| AccountProfile {
                email: email.clone(),
                display_name: display_name.clone(),
            })
            .ok_or(AccountError::InvalidCredentials)
    }
}

// ---------------------------------------------------------------------------
// Roaming participant
// ---------------------------------------------------------------------------

/// Moves `meters` towards the north-east, split evenly between the two
/// axes.
fn drift(from: Position, meters: f64) -> Position {
    let step = meters / 2f64.sqrt();
    let lat = from.lat + (step / EARTH_RADIUS_METERS).to_degrees();
    let lng = from.lng + (step / EARTH_RADIUS_METERS).to_degrees() / from.lat.to_radians().cos();
    Position::new(lat, lng)
}

/// Connects one simulated participant: logs in as Alice, then drifts
/// along a fixed heading, publishing a position every two seconds.
async fn roam(addr: String) {
    let (client, mut events) = LocationClient::connect(ClientConfig::new(format!("ws://{addr}")));

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            log_event(&event);
        }
    });

    let login = Credentials::Password {
        email: "alice@example.com".into(),
        password: "wonderland".into(),
        force: false,
    };
    if client.authenticate(login).await.is_err() {
        return;
    }

    // Start at the riverfront.
    let mut position = Position::new(38.7075, -9.1364);
    let mut ticker = tokio::time::interval(Duration::from_secs(2));
    for step in 0u32.. {
        ticker.tick().await;
        // Every third step is a shuffle too small to broadcast.
        let meters = if step % 3 == 2 { 4.0 } else { 15.0 };
        position = drift(position, meters);
        if client.share_location(position, false).await.is_err() {
            return;
        }
    }
}

fn log_event(event: &ClientEvent) {
    match event {
        ClientEvent::Welcome {
            connection_id,
            name,
        } => {
            tracing::info!(%connection_id, %name, "joined");
        }
        ClientEvent::Authenticated { name, .. } => {
            tracing::info!(%name, "logged in");
        }
        ClientEvent::UserConnected { name, .. } => {
            tracing::info!(%name, "user connected");
        }
        ClientEvent::UserDisconnected { name, .. } => {
            tracing::info!(%name, "user disconnected");
        }
        ClientEvent::UserLocationUpdate { name, position, .. } => {
            tracing::info!(%name, lat = position.lat, lng = position.lng, "moved");
        }
        ClientEvent::ConnectionState(state) => {
            tracing::info!(%state, "connection state");
        }
        other => {
            tracing::debug!(?other, "event");
        }
    }
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let bind_addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8080".to_owned());

    let server = ConvoyServer::<JsonCodec>::builder()
        .bind(&bind_addr)
        .build(StaticAccounts::seeded())
        .await?;
    let addr = server.local_addr()?;
    tracing::info!(%addr, "convoy server listening");
    tracing::info!("seeded accounts: alice@example.com/wonderland, bob@example.com/builder");

    tokio::spawn(roam(addr.to_string()));

    server.run().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use convoy_protocol::BROADCAST_THRESHOLD_METERS;

    #[tokio::test]
    async fn test_static_accounts_accepts_seeded_credentials() {
        let accounts = StaticAccounts::seeded();
        let profile = accounts
            .verify_credentials("alice@example.com", "wonderland")
            .await
            .expect("seeded login should verify");
        assert_eq!(profile.display_name, "Alice");
        assert_eq!(profile.email, "alice@example.com");
    }

    #[tokio::test]
    async fn test_static_accounts_rejects_wrong_password() {
        let accounts = StaticAccounts::seeded();
        let outcome = accounts
            .verify_credentials("alice@example.com", "guessed")
            .await;
        assert!(matches!(outcome, Err(AccountError::InvalidCredentials)));
    }

    #[test]
    fn test_drift_moves_the_requested_distance() {
        let start = Position::new(38.7075, -9.1364);
        let moved = drift(start, 15.0);
        let distance = start.distance_meters(&moved);
        assert!((distance - 15.0).abs() < 0.1, "moved {distance} m");
    }

    #[test]
    fn test_drift_steps_straddle_the_broadcast_threshold() {
        let start = Position::new(38.7075, -9.1364);
        assert!(start.distance_meters(&drift(start, 15.0)) >= BROADCAST_THRESHOLD_METERS);
        assert!(start.distance_meters(&drift(start, 4.0)) < BROADCAST_THRESHOLD_METERS);
    }
}

//! Integration tests for the Convoy server: connection choreography,
//! authentication, presence fan-out, eviction, and cleanup.
//!
//! Clients here are raw WebSockets speaking JSON by hand, so these tests
//! pin the wire protocol itself, not just the Rust types.

use std::time::Duration;

use convoy::prelude::*;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Account fixture
// =========================================================================

/// Two fixed accounts: alice and bob.
struct TestAccounts;

impl AccountStore for TestAccounts {
    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AccountProfile, AccountError> {
        let known = [
            ("alice@example.com", "alice-pass", "Alice"),
            ("bob@example.com", "bob-pass", "Bob"),
        ];
        known
            .iter()
            .find(|(e, p, _)| *e == email && *p == password)
            .map(|(e, _, name)| AccountProfile {
                email: (*e).to_owned(),
                display_name: (*name).to_owned(),
            })
            .ok_or(AccountError::InvalidCredentials)
    }
}

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Starts a server on a random port and returns the address.
async fn start_server() -> String {
    start_server_with(SessionConfig::default(), Duration::from_secs(90)).await
}

async fn start_server_with(session_config: SessionConfig, idle_timeout: Duration) -> String {
    let server = ConvoyServerBuilder::new()
        .bind("127.0.0.1:0")
        .session_config(session_config)
        .idle_timeout(idle_timeout)
        .build(TestAccounts)
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    addr
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send_json(ws: &mut ClientWs, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("send");
}

async fn recv_json(ws: &mut ClientWs) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .expect("recv");
        match msg {
            Message::Text(text) => {
                return serde_json::from_str(&text).expect("server sent invalid JSON");
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Waits for the server to close the socket.
async fn expect_close(ws: &mut ClientWs) {
    let result = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(result.is_ok(), "expected the server to close the connection");
}

/// Connects and consumes the opening `welcome` + `users_list`, returning
/// the socket and its assigned connection id.
async fn join(addr: &str) -> (ClientWs, String) {
    let mut ws = connect(addr).await;
    let welcome = recv_json(&mut ws).await;
    assert_eq!(welcome["type"], "welcome");
    let connection_id = welcome["connection_id"]
        .as_str()
        .expect("welcome carries an id")
        .to_owned();
    let roster = recv_json(&mut ws).await;
    assert_eq!(roster["type"], "users_list");
    (ws, connection_id)
}

/// Logs in on an open socket and returns the session id. Consumes the
/// success, rename, and roster messages.
async fn login(ws: &mut ClientWs, email: &str, password: &str) -> String {
    send_json(
        ws,
        json!({"type": "authenticate", "email": email, "password": password}),
    )
    .await;
    let success = recv_json(ws).await;
    assert_eq!(success["type"], "authentication_success", "got {success}");
    let session_id = success["session_id"]
        .as_str()
        .expect("success carries a session id")
        .to_owned();
    let updated = recv_json(ws).await;
    assert_eq!(updated["type"], "user_updated");
    let roster = recv_json(ws).await;
    assert_eq!(roster["type"], "users_list");
    session_id
}

// =========================================================================
// Connection choreography
// =========================================================================

#[tokio::test]
async fn test_connect_receives_welcome_then_roster() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    let welcome = recv_json(&mut ws).await;
    assert_eq!(welcome["type"], "welcome");
    let connection_id = welcome["connection_id"].as_str().unwrap();
    assert_eq!(connection_id.len(), 12);
    let name = welcome["name"].as_str().unwrap();
    assert!(name.starts_with("Guest-"), "placeholder name, got {name}");

    let roster = recv_json(&mut ws).await;
    assert_eq!(roster["type"], "users_list");
    let users = roster["users"].as_array().unwrap();
    assert_eq!(users.len(), 1, "roster includes the new connection itself");
    assert_eq!(users[0]["connection_id"], connection_id);
    assert_eq!(users[0]["online"], true);
}

#[tokio::test]
async fn test_second_connection_announced_to_first() {
    let addr = start_server().await;
    let (mut first, _) = join(&addr).await;
    let (_second, second_id) = join(&addr).await;

    let announcement = recv_json(&mut first).await;
    assert_eq!(announcement["type"], "user_connected");
    assert_eq!(announcement["connection_id"], second_id.as_str());

    let roster = recv_json(&mut first).await;
    assert_eq!(roster["type"], "users_list");
    assert_eq!(roster["users"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_departure_announced_exactly_once() {
    let addr = start_server().await;
    let (mut stayer, _) = join(&addr).await;
    let (mut leaver, leaver_id) = join(&addr).await;
    let _ = recv_json(&mut stayer).await; // user_connected
    let _ = recv_json(&mut stayer).await; // users_list

    leaver.close(None).await.expect("close");

    let farewell = recv_json(&mut stayer).await;
    assert_eq!(farewell["type"], "user_disconnected");
    assert_eq!(farewell["connection_id"], leaver_id.as_str());
    let roster = recv_json(&mut stayer).await;
    assert_eq!(roster["type"], "users_list");
    assert_eq!(roster["users"].as_array().unwrap().len(), 1);

    // No duplicate farewell: the next server message is the pong.
    send_json(&mut stayer, json!({"type": "ping"})).await;
    assert_eq!(recv_json(&mut stayer).await["type"], "pong");
}

#[tokio::test]
async fn test_idle_connection_closed_by_server() {
    let addr = start_server_with(SessionConfig::default(), Duration::from_millis(200)).await;
    let (mut ws, _) = join(&addr).await;

    // Send nothing; the server hangs up after the read-idle limit.
    expect_close(&mut ws).await;
}

// =========================================================================
// Authentication
// =========================================================================

#[tokio::test]
async fn test_authenticate_with_valid_credentials_succeeds() {
    let addr = start_server().await;
    let (mut ws, connection_id) = join(&addr).await;

    send_json(
        &mut ws,
        json!({"type": "authenticate", "email": "alice@example.com", "password": "alice-pass"}),
    )
    .await;

    let success = recv_json(&mut ws).await;
    assert_eq!(success["type"], "authentication_success");
    assert_eq!(success["connection_id"], connection_id.as_str());
    assert_eq!(success["name"], "Alice");
    assert_eq!(success["session_id"].as_str().unwrap().len(), 32);

    // The rename goes to everyone, requester included, followed by a
    // refreshed roster.
    let updated = recv_json(&mut ws).await;
    assert_eq!(updated["type"], "user_updated");
    assert_eq!(updated["name"], "Alice");
    let roster = recv_json(&mut ws).await;
    assert_eq!(roster["type"], "users_list");
    assert_eq!(roster["users"][0]["name"], "Alice");
}

#[tokio::test]
async fn test_authenticate_wrong_password_fails_but_connection_survives() {
    let addr = start_server().await;
    let (mut ws, _) = join(&addr).await;

    send_json(
        &mut ws,
        json!({"type": "authenticate", "email": "alice@example.com", "password": "wrong"}),
    )
    .await;
    let failed = recv_json(&mut ws).await;
    assert_eq!(failed["type"], "authentication_failed");
    assert_eq!(failed["reason"], "invalid email or password");

    // Still anonymous, still serviceable.
    send_json(&mut ws, json!({"type": "ping"})).await;
    let pong = recv_json(&mut ws).await;
    assert_eq!(pong["type"], "pong");
    assert!(pong["timestamp"].as_u64().unwrap() > 1_577_836_800_000);
}

#[tokio::test]
async fn test_authenticate_without_credentials_fails() {
    let addr = start_server().await;
    let (mut ws, _) = join(&addr).await;

    send_json(&mut ws, json!({"type": "authenticate"})).await;

    let failed = recv_json(&mut ws).await;
    assert_eq!(failed["type"], "authentication_failed");
    assert!(
        failed["reason"].as_str().unwrap().contains("session_id"),
        "reason should say what was missing"
    );
}

#[tokio::test]
async fn test_duplicate_login_without_force_is_rejected() {
    let addr = start_server().await;
    let (mut first, _) = join(&addr).await;
    login(&mut first, "alice@example.com", "alice-pass").await;

    let (mut second, _) = join(&addr).await;
    send_json(
        &mut second,
        json!({"type": "authenticate", "email": "alice@example.com", "password": "alice-pass"}),
    )
    .await;

    let failed = recv_json(&mut second).await;
    assert_eq!(failed["type"], "authentication_failed");
    let reason = failed["reason"].as_str().unwrap();
    assert!(
        reason.contains("already logged in"),
        "reason should explain the conflict: {reason}"
    );
}

// =========================================================================
// Forced eviction and session resumption
// =========================================================================

#[tokio::test]
async fn test_forced_login_evicts_older_session() {
    let addr = start_server().await;
    let (mut first, first_id) = join(&addr).await;
    let old_session = login(&mut first, "alice@example.com", "alice-pass").await;

    let (mut second, _) = join(&addr).await;
    let _ = recv_json(&mut first).await; // user_connected
    let _ = recv_json(&mut first).await; // users_list

    send_json(
        &mut second,
        json!({
            "type": "authenticate",
            "email": "alice@example.com",
            "password": "alice-pass",
            "force": true
        }),
    )
    .await;

    // Exactly one force_disconnect, then the socket closes.
    let eviction = recv_json(&mut first).await;
    assert_eq!(eviction["type"], "force_disconnect");
    assert_eq!(eviction["reason"], "signed in from another device");
    expect_close(&mut first).await;

    // The winner sees the old connection leave, then its own success.
    let mut new_session = None;
    let mut departures = 0;
    for _ in 0..8 {
        let msg = recv_json(&mut second).await;
        match msg["type"].as_str().unwrap() {
            "authentication_success" => {
                new_session = Some(msg["session_id"].as_str().unwrap().to_owned());
                break;
            }
            "user_disconnected" => {
                assert_eq!(msg["connection_id"], first_id.as_str());
                departures += 1;
            }
            "users_list" => {}
            other => panic!("unexpected message during takeover: {other}"),
        }
    }
    let new_session = new_session.expect("takeover should succeed");
    assert_ne!(new_session, old_session, "takeover issues a fresh session id");
    assert_eq!(departures, 1, "exactly one departure for the evicted connection");

    // Tail of the rename choreography; the roster has shrunk to one.
    let updated = recv_json(&mut second).await;
    assert_eq!(updated["type"], "user_updated");
    let roster = recv_json(&mut second).await;
    assert_eq!(roster["type"], "users_list");
    let users = roster["users"].as_array().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["name"], "Alice");

    // The evicted session id is dead.
    let (mut third, _) = join(&addr).await;
    send_json(
        &mut third,
        json!({"type": "authenticate", "session_id": old_session}),
    )
    .await;
    let failed = recv_json(&mut third).await;
    assert_eq!(failed["type"], "authentication_failed");
    assert_eq!(failed["reason"], "unknown or expired session");
}

#[tokio::test]
async fn test_forced_relogin_on_same_connection_refreshes_the_session() {
    let addr = start_server().await;
    let (mut ws, connection_id) = join(&addr).await;
    let old_session = login(&mut ws, "alice@example.com", "alice-pass").await;

    // Same account, same connection, force set: the session is replaced
    // but the connection keeps its seat.
    send_json(
        &mut ws,
        json!({
            "type": "authenticate",
            "email": "alice@example.com",
            "password": "alice-pass",
            "force": true
        }),
    )
    .await;

    let success = recv_json(&mut ws).await;
    assert_eq!(success["type"], "authentication_success", "got {success}");
    assert_eq!(success["connection_id"], connection_id.as_str());
    let new_session = success["session_id"].as_str().unwrap().to_owned();
    assert_ne!(new_session, old_session, "re-login issues a fresh session id");

    let updated = recv_json(&mut ws).await;
    assert_eq!(updated["type"], "user_updated");
    let roster = recv_json(&mut ws).await;
    assert_eq!(roster["type"], "users_list");
    assert_eq!(roster["users"].as_array().unwrap().len(), 1);

    // Still connected: no force_disconnect was queued for this socket.
    send_json(&mut ws, json!({"type": "ping"})).await;
    assert_eq!(recv_json(&mut ws).await["type"], "pong");

    // The superseded session id no longer resumes.
    let (mut second, _) = join(&addr).await;
    send_json(
        &mut second,
        json!({"type": "authenticate", "session_id": old_session}),
    )
    .await;
    let failed = recv_json(&mut second).await;
    assert_eq!(failed["type"], "authentication_failed");
    assert_eq!(failed["reason"], "unknown or expired session");
}

#[tokio::test]
async fn test_session_id_resumes_after_disconnect() {
    let addr = start_server().await;
    let (mut first, _) = join(&addr).await;
    let session_id = login(&mut first, "alice@example.com", "alice-pass").await;
    first.close(None).await.expect("close");

    // Let the departure land before reconnecting.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (mut second, second_id) = join(&addr).await;
    send_json(
        &mut second,
        json!({"type": "authenticate", "session_id": session_id}),
    )
    .await;

    let success = recv_json(&mut second).await;
    assert_eq!(success["type"], "authentication_success");
    assert_eq!(success["name"], "Alice");
    assert_eq!(success["session_id"], session_id.as_str());
    assert_eq!(success["connection_id"], second_id.as_str());
}

#[tokio::test]
async fn test_session_resume_from_second_connection_evicts_first() {
    let addr = start_server().await;
    let (mut first, _) = join(&addr).await;
    let session_id = login(&mut first, "alice@example.com", "alice-pass").await;

    let (mut second, _) = join(&addr).await;
    let _ = recv_json(&mut first).await; // user_connected
    let _ = recv_json(&mut first).await; // users_list

    send_json(
        &mut second,
        json!({"type": "authenticate", "session_id": session_id}),
    )
    .await;

    let eviction = recv_json(&mut first).await;
    assert_eq!(eviction["type"], "force_disconnect");
    assert_eq!(eviction["reason"], "session resumed from another connection");
    expect_close(&mut first).await;
}

#[tokio::test]
async fn test_expired_session_id_cannot_resume() {
    let addr = start_server_with(
        SessionConfig {
            max_idle: Duration::ZERO,
            sweep_interval: Duration::from_millis(50),
        },
        Duration::from_secs(90),
    )
    .await;
    let (mut ws, _) = join(&addr).await;
    let session_id = login(&mut ws, "alice@example.com", "alice-pass").await;

    // Let at least one sweep run with the session past its deadline.
    tokio::time::sleep(Duration::from_millis(150)).await;

    send_json(
        &mut ws,
        json!({"type": "authenticate", "session_id": session_id}),
    )
    .await;
    let failed = recv_json(&mut ws).await;
    assert_eq!(failed["type"], "authentication_failed");
    assert_eq!(failed["reason"], "unknown or expired session");
}

// =========================================================================
// Location sharing
// =========================================================================

#[tokio::test]
async fn test_location_update_acked_and_broadcast() {
    let addr = start_server().await;
    let (mut mover, mover_id) = join(&addr).await;
    let (mut watcher, _) = join(&addr).await;
    let _ = recv_json(&mut mover).await; // user_connected
    let _ = recv_json(&mut mover).await; // users_list

    send_json(
        &mut mover,
        json!({"type": "location_update", "lat": 38.7223, "lng": -9.1393, "accuracy": 5.0}),
    )
    .await;

    let ack = recv_json(&mut mover).await;
    assert_eq!(ack["type"], "location_update_ack");
    assert_eq!(ack["broadcasted"], true, "first report always broadcasts");

    let update = recv_json(&mut watcher).await;
    assert_eq!(update["type"], "user_location_update");
    assert_eq!(update["connection_id"], mover_id.as_str());
    assert_eq!(update["position"]["lat"], 38.7223);
    assert_eq!(update["position"]["lng"], -9.1393);
}

#[tokio::test]
async fn test_small_movement_suppressed_large_movement_broadcast() {
    let addr = start_server().await;
    let (mut mover, _) = join(&addr).await;
    let (mut watcher, _) = join(&addr).await;
    let _ = recv_json(&mut mover).await; // user_connected
    let _ = recv_json(&mut mover).await; // users_list

    // Anchor position.
    send_json(
        &mut mover,
        json!({"type": "location_update", "lat": 38.7223, "lng": -9.1393}),
    )
    .await;
    assert_eq!(recv_json(&mut mover).await["broadcasted"], true);
    assert_eq!(recv_json(&mut watcher).await["type"], "user_location_update");

    // ~1 m north: stored, but suppressed.
    send_json(
        &mut mover,
        json!({"type": "location_update", "lat": 38.72230899, "lng": -9.1393}),
    )
    .await;
    let ack = recv_json(&mut mover).await;
    assert_eq!(ack["type"], "location_update_ack");
    assert_eq!(ack["broadcasted"], false);

    // ~100 m north: broadcast again. The watcher's next message is this
    // update — nothing arrived for the suppressed step.
    send_json(
        &mut mover,
        json!({"type": "location_update", "lat": 38.7232, "lng": -9.1393}),
    )
    .await;
    assert_eq!(recv_json(&mut mover).await["broadcasted"], true);
    let update = recv_json(&mut watcher).await;
    assert_eq!(update["type"], "user_location_update");
    assert_eq!(update["position"]["lat"], 38.7232);
}

#[tokio::test]
async fn test_get_users_returns_fresh_snapshot() {
    let addr = start_server().await;
    let (mut ws, connection_id) = join(&addr).await;
    login(&mut ws, "bob@example.com", "bob-pass").await;

    send_json(&mut ws, json!({"type": "get_users"})).await;

    let roster = recv_json(&mut ws).await;
    assert_eq!(roster["type"], "users_list");
    let users = roster["users"].as_array().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["connection_id"], connection_id.as_str());
    assert_eq!(users[0]["name"], "Bob");
}

// =========================================================================
// Robustness
// =========================================================================

#[tokio::test]
async fn test_malformed_message_answered_never_fatal() {
    let addr = start_server().await;
    let (mut ws, _) = join(&addr).await;

    ws.send(Message::Text("this is not json".into()))
        .await
        .expect("send");
    let error = recv_json(&mut ws).await;
    assert_eq!(error["type"], "error");
    assert!(
        error["message"].as_str().unwrap().contains("could not parse"),
        "got {error}"
    );

    send_json(&mut ws, json!({"type": "warp_drive"})).await;
    let error = recv_json(&mut ws).await;
    assert_eq!(error["type"], "error");

    // The connection is still serviceable.
    send_json(&mut ws, json!({"type": "ping"})).await;
    assert_eq!(recv_json(&mut ws).await["type"], "pong");
}

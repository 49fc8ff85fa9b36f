//! Shared helpers for the integration tests: an embedded dev server plus
//! a client wired to it with test-friendly timings.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use skillnet::auth::{AuthApi, TokenStore};
use skillnet::chat::SessionEvent;
use skillnet::config::ClientConfig;
use skillnet::rest::RestClient;
use skillnet_devserver::config::DevConfig;
use skillnet_devserver::server::{DevState, start_server_with_state};
use skillnet_proto::auth::Credentials;

/// Start an in-process dev server with `alice` and `bob` seeded.
///
/// Returns the server state (for seeding data and reading counters) and
/// the API base URL.
pub async fn spawn_server() -> (Arc<DevState>, String) {
    spawn_server_with(DevConfig::default()).await
}

/// Start an in-process dev server with a custom configuration.
pub async fn spawn_server_with(config: DevConfig) -> (Arc<DevState>, String) {
    let state = Arc::new(DevState::new(&config));
    state
        .store
        .add_user("alice", "alice@example.com", "pw")
        .unwrap();
    state.store.add_user("bob", "bob@example.com", "pw").unwrap();
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("failed to start dev server");
    (state, format!("http://{addr}/"))
}

/// A client configuration pointed at the test server, with fast reconnects
/// and a short impression window.
pub fn test_config(api_url: &str) -> ClientConfig {
    let mut config = ClientConfig::for_server(api_url).expect("valid test server url");
    config.reconnect_delay = Duration::from_millis(200);
    config.impression_window = Duration::from_millis(400);
    config
}

/// Build a REST client and log in as the given user.
pub async fn login(config: &ClientConfig, email: &str) -> (RestClient, AuthApi) {
    let rest = RestClient::new(config, Arc::new(TokenStore::new())).expect("client builds");
    let auth = AuthApi::new(rest.clone());
    auth.login(&Credentials {
        email: email.to_string(),
        password: "pw".to_string(),
    })
    .await
    .expect("login succeeds");
    (rest, auth)
}

/// Wait for a session event matching a predicate, skipping others.
///
/// Panics on timeout or channel close.
pub async fn wait_for_event<F>(
    rx: &mut mpsc::Receiver<SessionEvent>,
    timeout: Duration,
    description: &str,
    pred: F,
) -> SessionEvent
where
    F: Fn(&SessionEvent) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        let remaining = deadline - tokio::time::Instant::now();
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Some(event)) if pred(&event) => return event,
            Ok(Some(_other)) => continue,
            Ok(None) => panic!("channel closed while waiting for {description}"),
            Err(_) => break,
        }
    }
    panic!("timeout waiting for {description}");
}

/// Wait for the session to report `Connected`.
pub async fn wait_for_connected(rx: &mut mpsc::Receiver<SessionEvent>) {
    wait_for_event(rx, Duration::from_secs(5), "Connected", |e| {
        matches!(e, SessionEvent::Connected)
    })
    .await;
}

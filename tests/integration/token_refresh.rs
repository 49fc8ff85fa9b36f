// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::needless_continue,
    clippy::match_same_arms,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::redundant_pub_crate,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! Integration tests for token refresh.
//!
//! Covers the client-side expiry margin (refresh before sending), the
//! refresh-and-retry on a server-side 401, the single-flight guarantee
//! under concurrency, and the teardown when the refresh token itself is
//! rejected.

mod common;

use std::time::Duration;

use skillnet::chat::ChatService;
use skillnet::error::ApiError;
use skillnet_devserver::auth::TokenIssuer;
use skillnet_devserver::config::DevConfig;
use skillnet_devserver::store::UserRecord;

use common::{login, spawn_server, spawn_server_with, test_config};

/// A token the client believes is fresh (far-future expiry) but the
/// server rejects (wrong signature).
fn plausible_but_invalid_token(username: &str) -> String {
    let forger = TokenIssuer::new(
        "not-the-server-secret".into(),
        Duration::from_secs(3600),
        Duration::from_secs(3600),
    );
    let user = UserRecord {
        id: 1,
        username: username.to_string(),
        email: format!("{username}@example.com"),
        password: "pw".into(),
        first_name: String::new(),
        last_name: String::new(),
        profile_picture: None,
    };
    forger.access(&user).unwrap()
}

#[tokio::test]
async fn near_expiry_access_is_refreshed_before_sending() {
    // Access tokens live 5 seconds: inside the client's 10-second margin
    // from the moment they are issued, so every request refreshes first.
    let config = DevConfig {
        access_ttl: Duration::from_secs(5),
        ..DevConfig::default()
    };
    let (state, api_url) = spawn_server_with(config).await;

    let client_config = test_config(&api_url);
    let (rest, _auth) = login(&client_config, "alice@example.com").await;
    let chat = ChatService::new(rest, &client_config);

    let conversations = chat.conversations().await.unwrap();
    assert!(conversations.is_empty());
    assert!(
        state.refresh_calls() >= 1,
        "client must refresh a token inside the expiry margin before using it"
    );
}

#[tokio::test]
async fn rejected_access_is_refreshed_once_and_retried() {
    let (state, api_url) = spawn_server().await;
    let config = test_config(&api_url);
    let (rest, auth) = login(&config, "alice@example.com").await;

    // The stored access now passes the client-side check but fails on the
    // server, forcing the 401 path.
    rest.tokens()
        .rotate(plausible_but_invalid_token("alice"), None);

    let profile = auth.profile().await.unwrap();
    assert_eq!(profile.username, "alice");
    assert_eq!(state.refresh_calls(), 1);
}

#[tokio::test]
async fn concurrent_requests_share_one_refresh() {
    let (state, api_url) = spawn_server().await;
    let config = test_config(&api_url);
    let (rest, _auth) = login(&config, "alice@example.com").await;
    rest.tokens()
        .rotate(plausible_but_invalid_token("alice"), None);

    let chat = ChatService::new(rest, &config);
    let (a, b, c, d) = tokio::join!(
        chat.conversations(),
        chat.conversations(),
        chat.conversations(),
        chat.conversations(),
    );
    assert!(a.is_ok() && b.is_ok() && c.is_ok() && d.is_ok());
    assert_eq!(
        state.refresh_calls(),
        1,
        "concurrent 401s must be served by a single refresh exchange"
    );
}

#[tokio::test]
async fn rejected_refresh_clears_the_session() {
    let (_state, api_url) = spawn_server().await;
    let config = test_config(&api_url);
    let (rest, auth) = login(&config, "alice@example.com").await;

    // Both tokens invalid: the retry path dead-ends and the store empties.
    rest.tokens().rotate(
        plausible_but_invalid_token("alice"),
        Some(plausible_but_invalid_token("alice")),
    );

    let result = auth.profile().await;
    assert!(matches!(result, Err(ApiError::Auth { .. })));
    assert!(!rest.tokens().is_authenticated());
    assert!(rest.tokens().access().is_none());
}

#[tokio::test]
async fn logout_clears_the_local_session() {
    let (_state, api_url) = spawn_server().await;
    let config = test_config(&api_url);
    let (rest, auth) = login(&config, "alice@example.com").await;
    assert!(rest.tokens().is_authenticated());

    auth.logout().await;
    assert!(!rest.tokens().is_authenticated());
    assert!(rest.tokens().username().is_none());
}

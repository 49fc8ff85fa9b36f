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

//! Integration tests for socket reconnection.
//!
//! The dev server can close every chat socket on demand, which from the
//! client's side looks like a server-side drop. The session must announce
//! the disconnect with the fixed retry delay, dial again after it, and
//! stand down entirely once closed.

mod common;

use std::time::Duration;

use skillnet::chat::{ChatService, SessionEvent, SessionPhase};
use skillnet_proto::room::RoomId;

use common::{login, spawn_server, test_config, wait_for_connected, wait_for_event};

#[tokio::test]
async fn reconnects_after_server_drop() {
    let (state, api_url) = spawn_server().await;
    let config = test_config(&api_url);
    let (rest, _auth) = login(&config, "alice@example.com").await;
    let chat = ChatService::new(rest, &config);

    let (session, mut events) = chat.open("bob").await.unwrap();
    wait_for_connected(&mut events).await;

    state.rooms.close_all().await;

    // The disconnect announces the configured fixed delay.
    let event = wait_for_event(&mut events, Duration::from_secs(5), "Disconnected", |e| {
        matches!(e, SessionEvent::Disconnected { .. })
    })
    .await;
    let SessionEvent::Disconnected { retry_in } = event else {
        unreachable!()
    };
    assert_eq!(retry_in, config.reconnect_delay);

    // And the session comes back on its own.
    wait_for_connected(&mut events).await;
    assert_eq!(session.phase(), SessionPhase::Open);

    // The recovered socket is fully usable.
    session.send("still here").await.unwrap();
    let event = wait_for_event(&mut events, Duration::from_secs(5), "MessageReceived", |e| {
        matches!(e, SessionEvent::MessageReceived(_))
    })
    .await;
    let SessionEvent::MessageReceived(message) = event else {
        unreachable!()
    };
    assert_eq!(message.message, "still here");

    session.close().await;
}

#[tokio::test]
async fn survives_repeated_drops() {
    let (state, api_url) = spawn_server().await;
    let config = test_config(&api_url);
    let (rest, _auth) = login(&config, "alice@example.com").await;
    let chat = ChatService::new(rest, &config);

    let (session, mut events) = chat.open("bob").await.unwrap();
    wait_for_connected(&mut events).await;

    // No attempt cap: the session recovers from every drop.
    for _ in 0..3 {
        state.rooms.close_all().await;
        wait_for_event(&mut events, Duration::from_secs(5), "Disconnected", |e| {
            matches!(e, SessionEvent::Disconnected { .. })
        })
        .await;
        wait_for_connected(&mut events).await;
    }
    assert_eq!(session.phase(), SessionPhase::Open);

    session.close().await;
}

#[tokio::test]
async fn close_supersedes_pending_retry() {
    let (state, api_url) = spawn_server().await;
    let mut config = test_config(&api_url);
    // A long delay so the close lands while the loop is still waiting.
    config.reconnect_delay = Duration::from_millis(800);

    let (rest, _auth) = login(&config, "alice@example.com").await;
    let chat = ChatService::new(rest, &config);

    let (session, mut events) = chat.open("bob").await.unwrap();
    wait_for_connected(&mut events).await;

    state.rooms.close_all().await;
    wait_for_event(&mut events, Duration::from_secs(5), "Disconnected", |e| {
        matches!(e, SessionEvent::Disconnected { .. })
    })
    .await;

    // Close during the retry wait: the sleeping loop must observe the
    // supersession and never dial again.
    session.close().await;
    tokio::time::sleep(Duration::from_millis(2000)).await;

    assert_eq!(session.phase(), SessionPhase::Closed);
    while let Ok(event) = events.try_recv() {
        assert!(
            !matches!(event, SessionEvent::Connected),
            "superseded session must not reconnect"
        );
    }
}

#[tokio::test]
async fn close_right_after_open_leaves_no_socket() {
    let (state, api_url) = spawn_server().await;
    let config = test_config(&api_url);
    let (rest, _auth) = login(&config, "alice@example.com").await;
    let chat = ChatService::new(rest, &config);

    // Close immediately, without waiting for Connected: the teardown may
    // land while the very first dial is still in flight, and the session
    // must stay closed instead of registering the late socket.
    let (session, _events) = chat.open("bob").await.unwrap();
    session.close().await;

    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(session.phase(), SessionPhase::Closed);
    let room = RoomId::for_pair("alice", "bob");
    assert_eq!(state.rooms.member_count(&room).await, 0);
}

#[tokio::test]
async fn switching_peers_leaves_one_connection() {
    let (state, api_url) = spawn_server().await;
    state
        .store
        .add_user("carol", "carol@example.com", "pw")
        .unwrap();
    let config = test_config(&api_url);
    let (rest, _auth) = login(&config, "alice@example.com").await;
    let chat = ChatService::new(rest, &config);

    let (first, mut first_events) = chat.open("bob").await.unwrap();
    wait_for_connected(&mut first_events).await;

    // Tear down the bob conversation and switch straight to carol.
    first.close().await;
    let (second, mut second_events) = chat.open("carol").await.unwrap();
    wait_for_connected(&mut second_events).await;

    // Outlast several retry windows: the closed session must not sneak a
    // socket back into its old room.
    tokio::time::sleep(config.reconnect_delay * 3).await;

    assert_eq!(
        state
            .rooms
            .member_count(&RoomId::for_pair("alice", "bob"))
            .await,
        0
    );
    assert_eq!(
        state
            .rooms
            .member_count(&RoomId::for_pair("alice", "carol"))
            .await,
        1
    );
    assert_eq!(first.phase(), SessionPhase::Closed);
    assert_eq!(second.phase(), SessionPhase::Open);

    second.close().await;
}

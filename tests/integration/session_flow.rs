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

//! Integration tests for the conversation session lifecycle.
//!
//! Verifies the open sequence (history before socket), live message
//! delivery through the server echo, client-side validation, and the
//! terminal states.

mod common;

use std::sync::Arc;
use std::time::Duration;

use skillnet::auth::TokenStore;
use skillnet::chat::{ChatService, SessionError, SessionEvent, SessionPhase};
use skillnet::rest::RestClient;
use skillnet_proto::room::RoomId;

use common::{login, spawn_server, test_config, wait_for_connected, wait_for_event};

#[tokio::test]
async fn history_arrives_before_the_socket_opens() {
    let (state, api_url) = spawn_server().await;
    state.store.append_message("bob", "alice", "are you there?");
    state.store.append_message("alice", "bob", "yes!");

    let config = test_config(&api_url);
    let (rest, _auth) = login(&config, "alice@example.com").await;
    let chat = ChatService::new(rest, &config);

    let (session, mut events) = chat.open("bob").await.unwrap();

    // The very first event is the history load, before any socket event.
    let first = events.recv().await.unwrap();
    match first {
        SessionEvent::HistoryLoaded { count } => assert_eq!(count, 2),
        other => panic!("expected HistoryLoaded first, got {other:?}"),
    }
    assert_eq!(session.messages().len(), 2);
    assert_eq!(session.messages()[0].message, "are you there?");

    wait_for_connected(&mut events).await;
    assert_eq!(session.phase(), SessionPhase::Open);
    session.close().await;
}

#[tokio::test]
async fn echo_delivers_to_both_sides() {
    let (_state, api_url) = spawn_server().await;
    let config = test_config(&api_url);

    let (alice_rest, _a) = login(&config, "alice@example.com").await;
    let (bob_rest, _b) = login(&config, "bob@example.com").await;
    let alice_chat = ChatService::new(alice_rest, &config);
    let bob_chat = ChatService::new(bob_rest, &config);

    let (alice_session, mut alice_events) = alice_chat.open("bob").await.unwrap();
    let (bob_session, mut bob_events) = bob_chat.open("alice").await.unwrap();
    wait_for_connected(&mut alice_events).await;
    wait_for_connected(&mut bob_events).await;

    alice_session.send("hello bob").await.unwrap();

    // Both sides receive the stored record, the sender included.
    for events in [&mut alice_events, &mut bob_events] {
        let event = wait_for_event(events, Duration::from_secs(5), "MessageReceived", |e| {
            matches!(e, SessionEvent::MessageReceived(_))
        })
        .await;
        let SessionEvent::MessageReceived(message) = event else {
            unreachable!()
        };
        assert_eq!(message.sender, "alice");
        assert_eq!(message.message, "hello bob");
        assert!(message.id.is_some());
    }

    // The transcript holds the echo exactly once: nothing was appended
    // locally at send time.
    let transcript = alice_session.messages();
    assert_eq!(
        transcript
            .iter()
            .filter(|m| m.message == "hello bob")
            .count(),
        1
    );

    alice_session.close().await;
    bob_session.close().await;
}

#[tokio::test]
async fn blank_message_is_rejected_before_the_wire() {
    let (_state, api_url) = spawn_server().await;
    let config = test_config(&api_url);
    let (rest, _auth) = login(&config, "alice@example.com").await;
    let chat = ChatService::new(rest, &config);

    let (session, mut events) = chat.open("bob").await.unwrap();
    wait_for_connected(&mut events).await;

    let result = session.send("   \n  ").await;
    assert!(matches!(result, Err(SessionError::InvalidMessage(_))));
    assert!(session.messages().is_empty());

    session.close().await;
}

#[tokio::test]
async fn send_after_close_is_rejected() {
    let (_state, api_url) = spawn_server().await;
    let config = test_config(&api_url);
    let (rest, _auth) = login(&config, "alice@example.com").await;
    let chat = ChatService::new(rest, &config);

    let (session, mut events) = chat.open("bob").await.unwrap();
    wait_for_connected(&mut events).await;
    session.close().await;

    assert_eq!(session.phase(), SessionPhase::Closed);
    let result = session.send("too late").await;
    assert!(matches!(result, Err(SessionError::NotConnected)));
}

#[tokio::test]
async fn open_without_login_fails() {
    let (_state, api_url) = spawn_server().await;
    let config = test_config(&api_url);
    let rest = RestClient::new(&config, Arc::new(TokenStore::new())).unwrap();
    let chat = ChatService::new(rest, &config);

    let result = chat.open("bob").await;
    assert!(matches!(result, Err(SessionError::NotLoggedIn)));
}

#[tokio::test]
async fn server_error_frame_warns_without_closing() {
    let (state, api_url) = spawn_server().await;
    let config = test_config(&api_url);
    let (rest, _auth) = login(&config, "alice@example.com").await;
    let chat = ChatService::new(rest, &config);

    let (session, mut events) = chat.open("bob").await.unwrap();
    wait_for_connected(&mut events).await;

    // Deliver a per-frame error payload on the open socket, the shape the
    // server uses when it cannot store a message. The client reports
    // Connected on handshake completion, which can land a beat before the
    // server task registers the socket in the room.
    let room = RoomId::for_pair("alice", "bob");
    while state.rooms.member_count(&room).await == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    state
        .rooms
        .broadcast(&room, r#"{"error": "Failed to process message"}"#)
        .await;

    let event = wait_for_event(&mut events, Duration::from_secs(5), "Warning", |e| {
        matches!(e, SessionEvent::Warning(_))
    })
    .await;
    let SessionEvent::Warning(reason) = event else {
        unreachable!()
    };
    assert_eq!(reason, "Failed to process message");

    // The error is transient: no transcript entry, the socket stays open,
    // and the next send goes through.
    assert!(session.messages().is_empty());
    assert_eq!(session.phase(), SessionPhase::Open);

    session.send("still talking").await.unwrap();
    let event = wait_for_event(&mut events, Duration::from_secs(5), "MessageReceived", |e| {
        matches!(e, SessionEvent::MessageReceived(_))
    })
    .await;
    let SessionEvent::MessageReceived(message) = event else {
        unreachable!()
    };
    assert_eq!(message.message, "still talking");

    session.close().await;
}

#[tokio::test]
async fn transcript_preserves_arrival_order() {
    let (state, api_url) = spawn_server().await;
    state.store.append_message("bob", "alice", "old message");

    let config = test_config(&api_url);
    let (rest, _auth) = login(&config, "alice@example.com").await;
    let chat = ChatService::new(rest, &config);

    let (session, mut events) = chat.open("bob").await.unwrap();
    wait_for_connected(&mut events).await;

    for text in ["one", "two", "three"] {
        session.send(text).await.unwrap();
        wait_for_event(&mut events, Duration::from_secs(5), "MessageReceived", |e| {
            matches!(e, SessionEvent::MessageReceived(_))
        })
        .await;
    }

    let bodies: Vec<String> = session
        .messages()
        .into_iter()
        .map(|m| m.message)
        .collect();
    assert_eq!(bodies, ["old message", "one", "two", "three"]);

    session.close().await;
}

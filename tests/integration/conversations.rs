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

//! Integration tests for the conversation directory and history endpoints.

mod common;

use skillnet::chat::ChatService;

use common::{login, spawn_server, test_config};

#[tokio::test]
async fn directory_lists_each_partner_once_latest_first() {
    let (state, api_url) = spawn_server().await;
    state
        .store
        .add_user("carol", "carol@example.com", "pw")
        .unwrap();
    state.store.append_message("alice", "bob", "first to bob");
    state.store.append_message("bob", "alice", "bob replies");
    state.store.append_message("carol", "alice", "carol says hi");

    let config = test_config(&api_url);
    let (rest, _auth) = login(&config, "alice@example.com").await;
    let chat = ChatService::new(rest, &config);

    let conversations = chat.conversations().await.unwrap();
    assert_eq!(conversations.len(), 2);

    // Carol's message is newest, so she leads.
    assert_eq!(conversations[0].username, "carol");
    assert_eq!(conversations[0].last_message, "carol says hi");
    assert_eq!(conversations[1].username, "bob");
    assert_eq!(conversations[1].last_message, "bob replies");
}

#[tokio::test]
async fn directory_is_empty_for_a_new_user() {
    let (_state, api_url) = spawn_server().await;
    let config = test_config(&api_url);
    let (rest, _auth) = login(&config, "bob@example.com").await;
    let chat = ChatService::new(rest, &config);

    let conversations = chat.conversations().await.unwrap();
    assert!(conversations.is_empty());
}

#[tokio::test]
async fn history_is_scoped_to_one_partner() {
    let (state, api_url) = spawn_server().await;
    state
        .store
        .add_user("carol", "carol@example.com", "pw")
        .unwrap();
    state.store.append_message("alice", "bob", "for bob");
    state.store.append_message("alice", "carol", "for carol");

    let config = test_config(&api_url);
    let (rest, _auth) = login(&config, "alice@example.com").await;
    let chat = ChatService::new(rest, &config);

    let history = chat.history("bob").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].message, "for bob");
}

#[tokio::test]
async fn directory_reflects_profile_names() {
    let (state, api_url) = spawn_server().await;
    state
        .store
        .update_profile(
            "bob",
            &serde_json::json!({ "firstName": "Bob", "lastName": "Builder" }),
        )
        .unwrap();
    state.store.append_message("bob", "alice", "hi");

    let config = test_config(&api_url);
    let (rest, _auth) = login(&config, "alice@example.com").await;
    let chat = ChatService::new(rest, &config);

    let conversations = chat.conversations().await.unwrap();
    assert_eq!(conversations[0].first_name, "Bob");
    assert_eq!(conversations[0].display_name(), "Bob Builder");
}

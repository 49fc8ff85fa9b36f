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

//! Integration tests for engagement tracking: impressions deduplicate per
//! window, clicks count unconditionally, and the server-side counters
//! reflect exactly what the client sent.

mod common;

use std::sync::Arc;
use std::time::Duration;

use skillnet::gigs::GigApi;
use skillnet::track::ImpressionTracker;
use skillnet_devserver::server::DevState;
use skillnet_proto::gig::GigDraft;

use common::{login, spawn_server, test_config};

fn seed_gig(state: &Arc<DevState>, owner: &str, title: &str) -> u64 {
    let draft = GigDraft {
        title: title.to_string(),
        description: "demo".to_string(),
        offering: "rust".to_string(),
        looking_for: "go".to_string(),
        tags: vec![],
    };
    state.store.create_gig(owner, &draft, None).id
}

#[tokio::test]
async fn impression_is_sent_once_per_window() {
    let (state, api_url) = spawn_server().await;
    let gig_id = seed_gig(&state, "bob", "Guitar lessons");

    let config = test_config(&api_url);
    let (rest, _auth) = login(&config, "alice@example.com").await;
    let tracker = ImpressionTracker::new(rest, &config);

    assert!(tracker.record(gig_id).await.unwrap());
    assert!(!tracker.record(gig_id).await.unwrap());
    assert!(!tracker.record(gig_id).await.unwrap());
    assert_eq!(state.store.gig(gig_id).unwrap().impressions, 1);
}

#[tokio::test]
async fn impression_records_again_after_the_window() {
    let (state, api_url) = spawn_server().await;
    let gig_id = seed_gig(&state, "bob", "Guitar lessons");

    // The test window is 400ms.
    let config = test_config(&api_url);
    let (rest, _auth) = login(&config, "alice@example.com").await;
    let tracker = ImpressionTracker::new(rest, &config);

    assert!(tracker.record(gig_id).await.unwrap());
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(tracker.record(gig_id).await.unwrap());
    assert_eq!(state.store.gig(gig_id).unwrap().impressions, 2);
}

#[tokio::test]
async fn batch_deduplicates_each_gig_independently() {
    let (state, api_url) = spawn_server().await;
    let first = seed_gig(&state, "bob", "Guitar lessons");
    let second = seed_gig(&state, "bob", "Sourdough basics");

    let config = test_config(&api_url);
    let (rest, _auth) = login(&config, "alice@example.com").await;
    let tracker = ImpressionTracker::new(rest, &config);

    // The same page rendered twice: each listing counts once.
    tracker.record_batch(&[first, second]).await;
    tracker.record_batch(&[first, second]).await;

    assert_eq!(state.store.gig(first).unwrap().impressions, 1);
    assert_eq!(state.store.gig(second).unwrap().impressions, 1);
}

#[tokio::test]
async fn reset_forgets_dedup_state() {
    let (state, api_url) = spawn_server().await;
    let gig_id = seed_gig(&state, "bob", "Guitar lessons");

    let config = test_config(&api_url);
    let (rest, _auth) = login(&config, "alice@example.com").await;
    let tracker = ImpressionTracker::new(rest, &config);

    assert!(tracker.record(gig_id).await.unwrap());
    tracker.reset();
    assert!(tracker.record(gig_id).await.unwrap());
    assert_eq!(state.store.gig(gig_id).unwrap().impressions, 2);
}

#[tokio::test]
async fn clicks_count_every_time() {
    let (state, api_url) = spawn_server().await;
    let gig_id = seed_gig(&state, "bob", "Guitar lessons");

    let config = test_config(&api_url);
    let (rest, _auth) = login(&config, "alice@example.com").await;
    let gigs = GigApi::new(rest);

    gigs.record_click(gig_id).await.unwrap();
    gigs.record_click(gig_id).await.unwrap();
    assert_eq!(state.store.gig(gig_id).unwrap().clicks, 2);
}

#[tokio::test]
async fn owner_dashboard_shows_the_counters() {
    let (state, api_url) = spawn_server().await;
    let gig_id = seed_gig(&state, "bob", "Guitar lessons");

    let config = test_config(&api_url);
    let (alice_rest, _a) = login(&config, "alice@example.com").await;
    let tracker = ImpressionTracker::new(alice_rest.clone(), &config);
    let alice_gigs = GigApi::new(alice_rest);
    tracker.record(gig_id).await.unwrap();
    alice_gigs.record_click(gig_id).await.unwrap();

    let (bob_rest, _b) = login(&config, "bob@example.com").await;
    let mine = GigApi::new(bob_rest).my_gigs().await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].impressions, 1);
    assert_eq!(mine[0].clicks, 1);
}

//! Engagement tracking: gig impressions with client-side dedup.
//!
//! An impression means "this listing was shown to the user". To keep the
//! counters meaningful, repeat sightings of the same listing within the
//! dedup window are dropped client-side and never reach the server. The
//! window resets each time an impression is actually recorded, not on
//! every sighting.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::json;

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::rest::RestClient;

/// Records gig impressions, at most once per gig per window.
///
/// Cloning shares the dedup state, so every surface that displays gigs
/// can hold a copy without double-counting.
#[derive(Clone)]
pub struct ImpressionTracker {
    rest: RestClient,
    window: Duration,
    last_sent: Arc<Mutex<HashMap<u64, Instant>>>,
}

impl ImpressionTracker {
    /// Create a tracker with the configured dedup window.
    #[must_use]
    pub fn new(rest: RestClient, config: &ClientConfig) -> Self {
        Self {
            rest,
            window: config.impression_window,
            last_sent: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record that `gig_id` was displayed. Returns `true` when the
    /// impression was sent, `false` when it was deduplicated.
    ///
    /// A failed send does not consume the window slot, so the next
    /// sighting retries.
    ///
    /// # Errors
    ///
    /// See [`ApiError`] for the taxonomy.
    pub async fn record(&self, gig_id: u64) -> Result<bool, ApiError> {
        if !self.should_record(gig_id, Instant::now()) {
            tracing::trace!(gig_id, "impression deduplicated");
            return Ok(false);
        }

        let result: Result<serde_json::Value, ApiError> = self
            .rest
            .post(&format!("/api/gigs/track-impression/{gig_id}/"), &json!({}))
            .await;
        match result {
            Ok(_) => Ok(true),
            Err(e) => {
                self.last_sent.lock().remove(&gig_id);
                Err(e)
            }
        }
    }

    /// Record impressions for a whole result page, deduplicating each gig
    /// independently. Send failures are logged and skipped; a tracking
    /// hiccup must never break the page that triggered it.
    pub async fn record_batch(&self, gig_ids: &[u64]) {
        for &gig_id in gig_ids {
            if let Err(e) = self.record(gig_id).await {
                tracing::debug!(gig_id, error = %e, "impression send failed");
            }
        }
    }

    /// Dedup decision: claims the window slot when it returns `true`.
    fn should_record(&self, gig_id: u64, now: Instant) -> bool {
        let mut last_sent = self.last_sent.lock();
        match last_sent.get(&gig_id) {
            Some(&sent) if now.duration_since(sent) < self.window => false,
            _ => {
                last_sent.insert(gig_id, now);
                true
            }
        }
    }

    /// Forget all dedup state, e.g. on logout.
    pub fn reset(&self) {
        self.last_sent.lock().clear();
    }
}

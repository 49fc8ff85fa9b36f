//! Gig listing and swap request wire types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A gig listing: a skill offered and a skill wanted by its creator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gig {
    /// Server-assigned listing id.
    pub id: u64,
    /// Username of the listing's creator.
    pub owner: String,
    /// Listing title.
    pub title: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Skill the creator is offering.
    #[serde(default)]
    pub offered_skills: String,
    /// Skill the creator wants in exchange.
    #[serde(default)]
    pub desired_skills: String,
    /// Search tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Relative URL of the listing image, if any.
    #[serde(default)]
    pub gig_image: Option<String>,
    /// Times the listing appeared in a result list.
    #[serde(default)]
    pub impressions: u64,
    /// Times the listing detail page was opened.
    #[serde(default)]
    pub clicks: u64,
    /// Completed swaps originating from this listing.
    #[serde(default)]
    pub swaps: u64,
    /// Whether the listing is visible in search.
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

const fn default_true() -> bool {
    true
}

/// Fields for creating or updating a gig listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GigDraft {
    /// Listing title.
    pub title: String,
    /// Free-text description.
    pub description: String,
    /// Skill being offered.
    pub offering: String,
    /// Skill wanted in exchange.
    pub looking_for: String,
    /// Search tags.
    pub tags: Vec<String>,
}

/// Lifecycle state of a swap request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapStatus {
    /// Sent, awaiting a response from the gig's creator.
    Pending,
    /// Accepted; a delivery is expected from both sides.
    Accepted,
    /// Declined by the gig's creator.
    Declined,
    /// Withdrawn by the requestor before a response.
    Withdrawn,
    /// Both deliverables marked complete.
    Completed,
}

/// A proposal from one user to exchange skills with a gig's creator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    /// Server-assigned request id.
    pub id: u64,
    /// Id of the gig the request targets.
    pub gig_id: u64,
    /// Username of the requesting user.
    pub requestor: String,
    /// Current lifecycle state.
    pub status: SwapStatus,
    /// Message attached by the requestor.
    #[serde(default)]
    pub message: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Response of the "has the current user already requested this gig" check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequestCheck {
    /// Whether a request from the current user exists.
    pub has_requested: bool,
    /// Id of the existing request, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap_id: Option<u64>,
}

/// One side's deliverable within an accepted swap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deliverable {
    /// Username of the delivering user.
    pub user: String,
    /// Uploaded file name, if a file was delivered.
    #[serde(default)]
    pub file_name: Option<String>,
    /// Free-text comment accompanying the delivery.
    #[serde(default)]
    pub comment: String,
    /// Whether this side marked its delivery complete.
    #[serde(default)]
    pub completed: bool,
}

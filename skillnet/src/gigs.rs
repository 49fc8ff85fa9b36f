//! Gig listings and the swap request lifecycle.
//!
//! Thin typed wrappers over the gig REST surface. Auth, refresh-on-401,
//! and error normalization all happen in [`crate::rest::RestClient`];
//! impression dedup lives in [`crate::track`].

use reqwest::multipart::{Form, Part};
use serde_json::json;

use skillnet_proto::gig::{Deliverable, Gig, GigDraft, SwapRequest, SwapRequestCheck};

use crate::error::ApiError;
use crate::rest::RestClient;

/// Gig marketplace operations for the logged-in user.
#[derive(Clone)]
pub struct GigApi {
    rest: RestClient,
}

impl GigApi {
    /// Create a gig API bound to a REST client.
    #[must_use]
    pub const fn new(rest: RestClient) -> Self {
        Self { rest }
    }

    /// List all active gig listings.
    ///
    /// # Errors
    ///
    /// See [`ApiError`] for the taxonomy.
    pub async fn list(&self) -> Result<Vec<Gig>, ApiError> {
        self.rest.get("/api/gigs/all-gigs/").await
    }

    /// List gigs matching a free-text search query.
    ///
    /// # Errors
    ///
    /// See [`ApiError`] for the taxonomy.
    pub async fn search(&self, query: &str) -> Result<Vec<Gig>, ApiError> {
        let mut url =
            url::form_urlencoded::Serializer::new(String::from("/api/gigs/all-gigs/?"));
        url.append_pair("search", query);
        self.rest.get(&url.finish()).await
    }

    /// Fetch one gig listing by id.
    ///
    /// # Errors
    ///
    /// See [`ApiError`] for the taxonomy.
    pub async fn detail(&self, gig_id: u64) -> Result<Gig, ApiError> {
        self.rest
            .get(&format!("/api/gigs/gig-detail/{gig_id}/"))
            .await
    }

    /// The logged-in user's own listings, counters included. This doubles
    /// as the dashboard view: impressions, clicks, and swaps per listing.
    ///
    /// # Errors
    ///
    /// See [`ApiError`] for the taxonomy.
    pub async fn my_gigs(&self) -> Result<Vec<Gig>, ApiError> {
        self.rest.get("/api/gigs/my-gigs/").await
    }

    /// Create a listing without an image.
    ///
    /// # Errors
    ///
    /// `ApiError::Validation` when the server rejects the fields.
    pub async fn create(&self, draft: &GigDraft) -> Result<Gig, ApiError> {
        self.rest.post("/api/gigs/create-gig/", draft).await
    }

    /// Create a listing with an image attachment.
    ///
    /// # Errors
    ///
    /// `ApiError::Validation` when the server rejects the fields.
    pub async fn create_with_image(
        &self,
        draft: &GigDraft,
        image: Vec<u8>,
        file_name: &str,
    ) -> Result<Gig, ApiError> {
        let file_name = file_name.to_string();
        self.rest
            .post_multipart("/api/gigs/create-gig/", || {
                draft_form(draft).part(
                    "gigImage",
                    Part::bytes(image.clone()).file_name(file_name.clone()),
                )
            })
            .await
    }

    /// Replace the fields of an existing listing.
    ///
    /// # Errors
    ///
    /// `ApiError::Auth` when the listing belongs to someone else.
    pub async fn update(&self, gig_id: u64, draft: &GigDraft) -> Result<Gig, ApiError> {
        self.rest
            .put(&format!("/api/gigs/update-gig/{gig_id}/"), draft)
            .await
    }

    /// Delete a listing.
    ///
    /// # Errors
    ///
    /// `ApiError::Auth` when the listing belongs to someone else.
    pub async fn delete(&self, gig_id: u64) -> Result<(), ApiError> {
        self.rest
            .delete(&format!("/api/gigs/delete-gig/{gig_id}/"))
            .await
    }

    /// Record a click on a listing. Clicks are counted unconditionally,
    /// unlike impressions.
    ///
    /// # Errors
    ///
    /// See [`ApiError`] for the taxonomy.
    pub async fn record_click(&self, gig_id: u64) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .rest
            .post(&format!("/api/gigs/track-click/{gig_id}/"), &json!({}))
            .await?;
        Ok(())
    }

    // -- swap requests --

    /// Propose a swap against someone else's listing.
    ///
    /// # Errors
    ///
    /// `ApiError::Validation` when a request already exists or the listing
    /// is the caller's own.
    pub async fn request_swap(
        &self,
        gig_id: u64,
        message: &str,
    ) -> Result<SwapRequest, ApiError> {
        self.rest
            .post(
                &format!("/api/gigs/{gig_id}/request-swap/"),
                &json!({ "message": message }),
            )
            .await
    }

    /// Whether the logged-in user already has a request against a listing.
    ///
    /// # Errors
    ///
    /// See [`ApiError`] for the taxonomy.
    pub async fn check_swap(&self, gig_id: u64) -> Result<SwapRequestCheck, ApiError> {
        self.rest
            .get(&format!("/api/gigs/{gig_id}/check-request/"))
            .await
    }

    /// Incoming swap requests against the logged-in user's listings.
    ///
    /// # Errors
    ///
    /// See [`ApiError`] for the taxonomy.
    pub async fn incoming_swaps(&self) -> Result<Vec<SwapRequest>, ApiError> {
        self.rest.get("/api/gigs/swap-requests/").await
    }

    /// Accept or decline an incoming swap request.
    ///
    /// # Errors
    ///
    /// `ApiError::Validation` when the request is no longer pending.
    pub async fn respond_swap(
        &self,
        swap_id: u64,
        accept: bool,
    ) -> Result<SwapRequest, ApiError> {
        self.rest
            .post(
                &format!("/api/gigs/swaps/{swap_id}/respond/"),
                &json!({ "accept": accept }),
            )
            .await
    }

    /// Withdraw an outgoing swap request before it is answered.
    ///
    /// # Errors
    ///
    /// `ApiError::Validation` when the request is no longer pending.
    pub async fn withdraw_swap(&self, swap_id: u64) -> Result<SwapRequest, ApiError> {
        self.rest
            .post(
                &format!("/api/gigs/swaps/{swap_id}/withdraw/"),
                &json!({}),
            )
            .await
    }

    /// Both sides' deliverables for an accepted swap.
    ///
    /// # Errors
    ///
    /// See [`ApiError`] for the taxonomy.
    pub async fn deliverables(&self, swap_id: u64) -> Result<Vec<Deliverable>, ApiError> {
        self.rest
            .get(&format!("/api/gigs/swaps/{swap_id}/deliverables/"))
            .await
    }

    /// Submit this side's deliverable for an accepted swap: a comment and
    /// an optional file.
    ///
    /// # Errors
    ///
    /// `ApiError::Validation` when the swap is not in the accepted state.
    pub async fn submit_deliverable(
        &self,
        swap_id: u64,
        comment: &str,
        file: Option<(Vec<u8>, String)>,
    ) -> Result<Deliverable, ApiError> {
        let comment = comment.to_string();
        self.rest
            .post_multipart(&format!("/api/gigs/swaps/{swap_id}/deliverables/"), || {
                let mut form = Form::new().text("comment", comment.clone());
                if let Some((bytes, name)) = &file {
                    form = form.part(
                        "file",
                        Part::bytes(bytes.clone()).file_name(name.clone()),
                    );
                }
                form
            })
            .await
    }
}

/// The text fields of a draft as a multipart form. Tags travel as a JSON
/// array in a single field.
fn draft_form(draft: &GigDraft) -> Form {
    Form::new()
        .text("title", draft.title.clone())
        .text("description", draft.description.clone())
        .text("offering", draft.offering.clone())
        .text("lookingFor", draft.looking_for.clone())
        .text(
            "tags",
            serde_json::to_string(&draft.tags).unwrap_or_else(|_| "[]".to_string()),
        )
}

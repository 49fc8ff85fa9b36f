//! Session token store and authentication operations.
//!
//! The token pair is process-wide mutable state with a single writer (the
//! refresh flow) and many readers (every outgoing request). It is owned by
//! an explicit [`TokenStore`] injected into the REST client — never read
//! from ambient globals — and cleared on logout or irrecoverable auth
//! failure.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use parking_lot::RwLock;
use serde::Deserialize;

use skillnet_proto::auth::{Credentials, LoginResponse, RegisterRequest, UserProfile};

use crate::error::ApiError;
use crate::rest::RestClient;

/// Safety margin applied before a token's declared expiry, in seconds.
/// A token within this window of expiring is treated as already expired.
const EXPIRY_MARGIN_SECS: i64 = 10;

/// The access/refresh pair plus the identity it belongs to.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    /// Bearer token attached to every authenticated request.
    pub access: String,
    /// Token redeemed for a new access token when it expires.
    pub refresh: String,
    /// Username of the logged-in user.
    pub username: String,
    /// Server-assigned id of the logged-in user.
    pub user_id: u64,
}

/// Owned session state: initialized on login, torn down on logout.
///
/// The `refresh_gate` serializes refresh attempts: only one refresh request
/// is ever in flight, and callers that observe an in-flight refresh await
/// its result instead of redeeming the refresh token themselves (concurrent
/// redemption would invalidate a rotated token).
pub struct TokenStore {
    inner: RwLock<Option<SessionTokens>>,
    refresh_gate: tokio::sync::Mutex<()>,
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore {
    /// Creates an empty (logged-out) store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: RwLock::new(None),
            refresh_gate: tokio::sync::Mutex::const_new(()),
        }
    }

    /// Seed the store after a successful login or refresh.
    pub fn set(&self, tokens: SessionTokens) {
        *self.inner.write() = Some(tokens);
    }

    /// Replace the access token (and optionally the refresh token) after a
    /// refresh exchange, keeping the identity fields.
    pub fn rotate(&self, access: String, refresh: Option<String>) {
        let mut guard = self.inner.write();
        if let Some(tokens) = guard.as_mut() {
            tokens.access = access;
            if let Some(refresh) = refresh {
                tokens.refresh = refresh;
            }
        }
    }

    /// Clear the store. The external effect of logout or an irrecoverable
    /// auth failure.
    pub fn clear(&self) {
        *self.inner.write() = None;
    }

    /// Username of the logged-in user, if any.
    #[must_use]
    pub fn username(&self) -> Option<String> {
        self.inner.read().as_ref().map(|t| t.username.clone())
    }

    /// Id of the logged-in user, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<u64> {
        self.inner.read().as_ref().map(|t| t.user_id)
    }

    /// The raw access token, regardless of expiry.
    #[must_use]
    pub fn access(&self) -> Option<String> {
        self.inner.read().as_ref().map(|t| t.access.clone())
    }

    /// The refresh token, if present.
    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.inner.read().as_ref().map(|t| t.refresh.clone())
    }

    /// The access token, only when it passes the client-side expiry check.
    #[must_use]
    pub fn fresh_access(&self) -> Option<String> {
        let guard = self.inner.read();
        let tokens = guard.as_ref()?;
        if is_expired(&tokens.access) {
            None
        } else {
            Some(tokens.access.clone())
        }
    }

    /// Whether a usable session exists (tokens present, access not expired
    /// or refresh still redeemable).
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        let guard = self.inner.read();
        guard
            .as_ref()
            .is_some_and(|t| !is_expired(&t.access) || !is_expired(&t.refresh))
    }

    /// The gate serializing refresh attempts.
    pub(crate) const fn refresh_gate(&self) -> &tokio::sync::Mutex<()> {
        &self.refresh_gate
    }
}

#[derive(Debug, Deserialize)]
struct ExpiryClaim {
    exp: i64,
}

/// Read the `exp` claim from a JWT without verifying its signature.
///
/// Returns `None` when the token is not three dot-separated base64url
/// segments with a JSON payload carrying `exp`.
fn token_expiry(token: &str) -> Option<i64> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claim: ExpiryClaim = serde_json::from_slice(&bytes).ok()?;
    Some(claim.exp)
}

/// Client-side expiry check with the safety margin. A token whose payload
/// cannot be read is treated as expired.
fn is_expired(token: &str) -> bool {
    token_expiry(token).is_none_or(|exp| Utc::now().timestamp() >= exp - EXPIRY_MARGIN_SECS)
}

/// Authentication operations against the auth REST endpoints.
///
/// Login and registration are unauthenticated calls; profile reads and
/// updates go through the bearer-injecting path and inherit its
/// refresh-on-401 behavior.
#[derive(Clone)]
pub struct AuthApi {
    rest: RestClient,
}

impl AuthApi {
    /// Create an auth API bound to a REST client (and its token store).
    #[must_use]
    pub const fn new(rest: RestClient) -> Self {
        Self { rest }
    }

    /// The token store backing this API.
    #[must_use]
    pub fn store(&self) -> &Arc<TokenStore> {
        self.rest.tokens()
    }

    /// Log in and seed the token store.
    ///
    /// # Errors
    ///
    /// `ApiError::Auth` for rejected credentials, `ApiError::Network` for
    /// transport failures.
    pub async fn login(&self, credentials: &Credentials) -> Result<UserProfile, ApiError> {
        let response: LoginResponse = self
            .rest
            .post_public("/api/auth/login/", credentials)
            .await?;

        self.store().set(SessionTokens {
            access: response.access,
            refresh: response.refresh,
            username: response.user.username.clone(),
            user_id: response.user.id,
        });
        tracing::info!(username = %response.user.username, "logged in");
        Ok(response.user)
    }

    /// Register a new account. Does not log in.
    ///
    /// # Errors
    ///
    /// `ApiError::Validation` when the server rejects the fields.
    pub async fn register(&self, request: &RegisterRequest) -> Result<(), ApiError> {
        self.rest
            .post_public::<_, serde_json::Value>("/api/auth/registration/", request)
            .await?;
        Ok(())
    }

    /// Log out: notify the server (best-effort) and clear the store.
    pub async fn logout(&self) {
        let result = self
            .rest
            .post::<_, serde_json::Value>("/api/auth/logout/", &serde_json::json!({}))
            .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, "server logout failed, clearing local session anyway");
        }
        self.store().clear();
    }

    /// Fetch the logged-in user's profile.
    ///
    /// # Errors
    ///
    /// `ApiError::Auth` when the session cannot be refreshed.
    pub async fn profile(&self) -> Result<UserProfile, ApiError> {
        self.rest.get("/api/auth/user/profile/").await
    }

    /// Apply a partial update to the logged-in user's profile.
    ///
    /// # Errors
    ///
    /// `ApiError::Validation` when the server rejects the fields.
    pub async fn update_profile(
        &self,
        fields: &serde_json::Value,
    ) -> Result<UserProfile, ApiError> {
        self.rest.patch("/api/auth/user/profile/", fields).await
    }
}

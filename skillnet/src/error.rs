//! Error taxonomy for the REST boundary.
//!
//! Transport-level failures are caught at the [`crate::rest::RestClient`]
//! boundary and normalized into [`ApiError`]. Callers decide whether to
//! retry (manual action), render a fallback, or redirect — only `Auth`
//! failures force a session teardown.

/// Normalized error for every REST operation.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing, expired, or irrecoverable credentials. The token store has
    /// already been cleared when this surfaces.
    #[error("authentication failed: {detail}")]
    Auth {
        /// Server-provided or client-derived reason.
        detail: String,
    },

    /// The server rejected the request body (400/422). Surfaced inline to
    /// the relevant form.
    #[error("request rejected: {detail}")]
    Validation {
        /// Server-provided detail message.
        detail: String,
    },

    /// Transport failure (DNS, connect, timeout). Retryable by user action.
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    /// The server failed (5xx).
    #[error("server error: status {status}")]
    Server {
        /// HTTP status code.
        status: u16,
    },

    /// The response body did not match the expected shape.
    #[error("malformed response: {0}")]
    Decode(#[source] serde_json::Error),
}

impl ApiError {
    /// Whether this error should trigger a logout/redirect.
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

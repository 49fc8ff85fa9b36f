//! Authentication wire types.

use serde::{Deserialize, Serialize};

/// Login request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Account email address.
    pub email: String,
    /// Account password.
    pub password: String,
}

/// Registration request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Desired username.
    pub username: String,
    /// Account email address.
    pub email: String,
    /// Account password.
    pub password: String,
}

/// Successful login response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Access token (JWT).
    pub access: String,
    /// Refresh token (JWT).
    pub refresh: String,
    /// Profile of the authenticated user.
    pub user: UserProfile,
}

/// Token refresh request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    /// The refresh token to redeem.
    pub refresh: String,
}

/// Token refresh response.
///
/// The server always returns a new access token and may rotate the
/// refresh token alongside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    /// The new access token.
    pub access: String,
    /// The rotated refresh token, when the server rotates on refresh.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
}

/// A user profile as returned by the auth endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Server-assigned user id.
    pub id: u64,
    /// Unique username.
    pub username: String,
    /// Account email address.
    #[serde(default)]
    pub email: String,
    /// First name, if set.
    #[serde(default)]
    pub first_name: String,
    /// Last name, if set.
    #[serde(default)]
    pub last_name: String,
    /// Relative URL of the avatar, if set.
    #[serde(default)]
    pub profile_picture: Option<String>,
}

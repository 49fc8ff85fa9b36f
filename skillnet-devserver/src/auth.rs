//! JWT issuing and verification for the dev server.
//!
//! Tokens are HMAC-signed with a per-server secret. Access and refresh
//! tokens share one claims shape and are told apart by the `typ` claim,
//! so a refresh token can never be replayed as a bearer.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::store::UserRecord;

/// Claims carried by every dev-server token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Username the token was issued to.
    pub sub: String,
    /// Server-assigned user id.
    pub user_id: u64,
    /// `"access"` or `"refresh"`.
    pub typ: String,
    /// Expiry as a unix timestamp.
    pub exp: i64,
}

/// Token verification failures.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Signature, shape, or expiry check failed.
    #[error("invalid token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
    /// The token is valid but of the wrong kind.
    #[error("wrong token type: expected {expected}")]
    WrongType {
        /// The kind the caller required.
        expected: &'static str,
    },
}

/// Issues and verifies the server's tokens.
pub struct TokenIssuer {
    secret: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    /// Create an issuer with the given signing secret and lifetimes.
    #[must_use]
    pub const fn new(secret: String, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            secret,
            access_ttl,
            refresh_ttl,
        }
    }

    /// Sign an access token for a user.
    ///
    /// # Errors
    ///
    /// Propagates signing failures from `jsonwebtoken`.
    pub fn access(&self, user: &UserRecord) -> Result<String, TokenError> {
        self.sign(user, "access", self.access_ttl)
    }

    /// Sign a refresh token for a user.
    ///
    /// # Errors
    ///
    /// Propagates signing failures from `jsonwebtoken`.
    pub fn refresh(&self, user: &UserRecord) -> Result<String, TokenError> {
        self.sign(user, "refresh", self.refresh_ttl)
    }

    fn sign(
        &self,
        user: &UserRecord,
        typ: &'static str,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            sub: user.username.clone(),
            user_id: user.id,
            typ: typ.to_string(),
            exp: Utc::now().timestamp() + ttl.as_secs().cast_signed(),
        };
        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;
        Ok(token)
    }

    /// Verify a token and require it to be of the given kind.
    ///
    /// Expiry is checked with zero leeway, so short-TTL tokens behave
    /// deterministically in tests.
    ///
    /// # Errors
    ///
    /// [`TokenError::Invalid`] for bad signatures or expired tokens,
    /// [`TokenError::WrongType`] for a token of the other kind.
    pub fn verify(&self, token: &str, expected: &'static str) -> Result<Claims, TokenError> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        let data = jsonwebtoken::decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )?;
        if data.claims.typ != expected {
            return Err(TokenError::WrongType { expected });
        }
        Ok(data.claims)
    }
}

//! Generic REST client with bearer-token injection and refresh-on-401.
//!
//! Every authenticated call attaches `Authorization: Bearer <access>`.
//! When the stored access token fails the client-side expiry check, the
//! token is refreshed before the request is sent. When the server still
//! answers 401, the client performs exactly one refresh exchange and one
//! retry of the original request; a second 401 (or a refresh failure)
//! clears the token store and surfaces [`ApiError::Auth`].

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use skillnet_proto::auth::{RefreshRequest, RefreshResponse};

use crate::auth::TokenStore;
use crate::config::ClientConfig;
use crate::error::ApiError;

/// Shared HTTP client bound to an API base URL and a token store.
///
/// Cheap to clone: the underlying connection pool and token store are
/// shared between clones.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    api_base: Url,
    tokens: Arc<TokenStore>,
}

impl RestClient {
    /// Build a client from the resolved configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Network`] if the underlying HTTP client cannot
    /// be constructed.
    pub fn new(config: &ClientConfig, tokens: Arc<TokenStore>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(ApiError::Network)?;
        Ok(Self {
            http,
            api_base: config.api_base.clone(),
            tokens,
        })
    }

    /// The token store this client reads from and refreshes into.
    #[must_use]
    pub const fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    /// Resolve a path against the API base URL.
    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.api_base
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::Validation {
                detail: format!("invalid request path {path}: {e}"),
            })
    }

    /// `GET` an authenticated endpoint.
    ///
    /// # Errors
    ///
    /// See [`ApiError`] for the taxonomy.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request_json(Method::GET, path, None).await
    }

    /// `POST` a JSON body to an authenticated endpoint.
    ///
    /// # Errors
    ///
    /// See [`ApiError`] for the taxonomy.
    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body).map_err(ApiError::Decode)?;
        self.request_json(Method::POST, path, Some(body)).await
    }

    /// `PUT` a JSON body to an authenticated endpoint.
    ///
    /// # Errors
    ///
    /// See [`ApiError`] for the taxonomy.
    pub async fn put<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body).map_err(ApiError::Decode)?;
        self.request_json(Method::PUT, path, Some(body)).await
    }

    /// `PATCH` a JSON body to an authenticated endpoint.
    ///
    /// # Errors
    ///
    /// See [`ApiError`] for the taxonomy.
    pub async fn patch<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body).map_err(ApiError::Decode)?;
        self.request_json(Method::PATCH, path, Some(body)).await
    }

    /// `DELETE` an authenticated endpoint, ignoring the response body.
    ///
    /// # Errors
    ///
    /// See [`ApiError`] for the taxonomy.
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let response = self.authed_round_trip(Method::DELETE, path, None).await?;
        // 204 carries no body; any other success is accepted too.
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::status_error(response).await)
        }
    }

    /// `POST` a multipart form to an authenticated endpoint.
    ///
    /// Multipart bodies cannot be replayed, so `make_form` is invoked
    /// again if the request is retried after a token refresh.
    ///
    /// # Errors
    ///
    /// See [`ApiError`] for the taxonomy.
    pub async fn post_multipart<T, F>(&self, path: &str, make_form: F) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::multipart::Form,
    {
        self.multipart_round_trip(Method::POST, path, make_form)
            .await
    }

    /// `PUT` a multipart form to an authenticated endpoint.
    ///
    /// # Errors
    ///
    /// See [`ApiError`] for the taxonomy.
    pub async fn put_multipart<T, F>(&self, path: &str, make_form: F) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::multipart::Form,
    {
        self.multipart_round_trip(Method::PUT, path, make_form).await
    }

    /// `POST` a JSON body to an unauthenticated endpoint (login,
    /// registration, refresh). No bearer is attached and no refresh/retry
    /// is performed.
    ///
    /// # Errors
    ///
    /// See [`ApiError`] for the taxonomy.
    pub async fn post_public<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.endpoint(path)?;
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(ApiError::Network)?;
        Self::decode_response(response).await
    }

    // -- internals --

    /// One authenticated JSON request with the single refresh-and-retry.
    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, ApiError> {
        let response = self.authed_round_trip(method, path, body).await?;
        Self::decode_response(response).await
    }

    /// Dispatch with a fresh bearer; on 401, refresh once and retry once.
    async fn authed_round_trip(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response, ApiError> {
        let access = self.ensure_fresh_access().await?;
        let response = self
            .dispatch(method.clone(), path, body.as_ref(), &access)
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::debug!(%method, path, "request returned 401, refreshing token");
        let access = self.refresh_access(&access).await?;
        let retry = self.dispatch(method, path, body.as_ref(), &access).await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            // Refreshed token was rejected too. Give up and tear down.
            self.tokens.clear();
            return Err(ApiError::Auth {
                detail: "request rejected after token refresh".into(),
            });
        }
        Ok(retry)
    }

    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        access: &str,
    ) -> Result<reqwest::Response, ApiError> {
        let url = self.endpoint(path)?;
        let mut request = self.http.request(method, url).bearer_auth(access);
        if let Some(body) = body {
            request = request.json(body);
        }
        request.send().await.map_err(ApiError::Network)
    }

    /// Same 401 handling for multipart requests; the form is rebuilt for
    /// the retry because multipart bodies are consumed on send.
    async fn multipart_round_trip<T, F>(
        &self,
        method: Method,
        path: &str,
        make_form: F,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::multipart::Form,
    {
        let url = self.endpoint(path)?;
        let access = self.ensure_fresh_access().await?;
        let response = self
            .http
            .request(method.clone(), url.clone())
            .bearer_auth(&access)
            .multipart(make_form())
            .send()
            .await
            .map_err(ApiError::Network)?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::decode_response(response).await;
        }

        let access = self.refresh_access(&access).await?;
        let retry = self
            .http
            .request(method, url)
            .bearer_auth(&access)
            .multipart(make_form())
            .send()
            .await
            .map_err(ApiError::Network)?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            self.tokens.clear();
            return Err(ApiError::Auth {
                detail: "request rejected after token refresh".into(),
            });
        }
        Self::decode_response(retry).await
    }

    /// An access token that passes the client-side expiry check,
    /// refreshing first when necessary.
    pub(crate) async fn ensure_fresh_access(&self) -> Result<String, ApiError> {
        if let Some(access) = self.tokens.fresh_access() {
            return Ok(access);
        }
        let stale = self.tokens.access().unwrap_or_default();
        self.refresh_access(&stale).await
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// Serialized through the store's refresh gate: if another caller
    /// already replaced `failed_access` while we waited, its result is
    /// reused instead of redeeming the refresh token again.
    async fn refresh_access(&self, failed_access: &str) -> Result<String, ApiError> {
        let _gate = self.tokens.refresh_gate().lock().await;

        match self.tokens.access() {
            Some(current) if current != failed_access => return Ok(current),
            Some(_) => {}
            None => {
                return Err(ApiError::Auth {
                    detail: "not logged in".into(),
                });
            }
        }

        let Some(refresh) = self.tokens.refresh_token() else {
            self.tokens.clear();
            return Err(ApiError::Auth {
                detail: "no refresh token available".into(),
            });
        };

        let result: Result<RefreshResponse, ApiError> = self
            .post_public("/api/auth/token/refresh/", &RefreshRequest { refresh })
            .await;

        match result {
            Ok(response) => {
                tracing::debug!("access token refreshed");
                let access = response.access.clone();
                self.tokens.rotate(response.access, response.refresh);
                Ok(access)
            }
            Err(ApiError::Network(e)) => Err(ApiError::Network(e)),
            Err(e) => {
                // The refresh token itself was rejected: session is over.
                tracing::warn!(error = %e, "token refresh failed, clearing session");
                self.tokens.clear();
                Err(ApiError::Auth {
                    detail: "token refresh failed".into(),
                })
            }
        }
    }

    /// Map a response to the error taxonomy or decode its JSON body.
    async fn decode_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        if response.status().is_success() {
            return response.json().await.map_err(|e| {
                // Body read failures and JSON shape mismatches both land
                // here; reqwest wraps the serde error.
                ApiError::Network(e)
            });
        }
        Err(Self::status_error(response).await)
    }

    /// Normalize a non-success status into the taxonomy.
    async fn status_error(response: reqwest::Response) -> ApiError {
        let status = response.status();
        let detail = response
            .text()
            .await
            .ok()
            .and_then(|body| extract_detail(&body))
            .unwrap_or_else(|| status.to_string());

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            ApiError::Auth { detail }
        } else if status.is_client_error() {
            ApiError::Validation { detail }
        } else {
            ApiError::Server {
                status: status.as_u16(),
            }
        }
    }
}

/// Pull the `detail` field out of an error body, falling back to the raw
/// text for non-JSON bodies.
fn extract_detail(body: &str) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => value
            .get("detail")
            .or_else(|| value.get("error"))
            .and_then(|d| d.as_str())
            .map(String::from)
            .or_else(|| Some(body.to_string())),
        Err(_) => Some(body.to_string()),
    }
}

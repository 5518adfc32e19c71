//! # vigil-auth
//!
//! Credential acquisition for the Vigil console client.
//!
//! The realtime core treats the token as an opaque string; this crate is
//! the collaborator that obtains one, speaking the assistant's fixed HTTP
//! paths:
//!
//! - `POST /api/auth/login` — exchange username/password for a token
//! - `POST /api/auth/register` — create an account, returns a token
//! - `GET  /api/auth/verify` — check a stored token before reusing it

#![deny(unsafe_code)]

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use vigil_core::UserInfo;

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// A successful login/register exchange.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque bearer token, handed to `connect`.
    pub access_token: String,
    /// Token scheme, always `bearer`.
    pub token_type: String,
    /// The authenticated user.
    pub user: UserInfo,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    username: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
}

#[derive(Deserialize)]
struct VerifyResponse {
    valid: bool,
    user: UserInfo,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors from the credential supplier.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Username/password rejected.
    #[error("invalid username or password")]
    InvalidCredentials,

    /// A stored token was rejected (expired or revoked).
    #[error("invalid or expired token")]
    InvalidToken,

    /// Registration or another request was rejected by the server.
    #[error("auth server rejected request ({status}): {detail}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Server-provided detail.
        detail: String,
    },

    /// Transport-level failure.
    #[error("auth request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, AuthError>;

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP client for the auth endpoints.
#[derive(Clone, Debug)]
pub struct AuthClient {
    http: reqwest::Client,
    base_url: String,
}

impl AuthClient {
    /// Create a client for the given base URL (no trailing slash).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            let _ = base_url.pop();
        }
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    /// Exchange username/password for a session token.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session> {
        debug!(username, "logging in");
        let response = self
            .http
            .post(format!("{}/api/auth/login", self.base_url))
            .json(&LoginRequest { username, password })
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED => Err(AuthError::InvalidCredentials),
            status if status.is_success() => Ok(response.json().await?),
            status => Err(rejected(status, response).await),
        }
    }

    /// Create an account and return its first session.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        email: Option<&str>,
    ) -> Result<Session> {
        debug!(username, "registering");
        let response = self
            .http
            .post(format!("{}/api/auth/register", self.base_url))
            .json(&RegisterRequest {
                username,
                password,
                email,
            })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            Err(rejected(status, response).await)
        }
    }

    /// Check whether a stored token is still accepted.
    pub async fn verify(&self, token: &str) -> Result<UserInfo> {
        let response = self
            .http
            .get(format!("{}/api/auth/verify", self.base_url))
            .bearer_auth(token)
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED => Err(AuthError::InvalidToken),
            status if status.is_success() => {
                let body: VerifyResponse = response.json().await?;
                if body.valid {
                    Ok(body.user)
                } else {
                    Err(AuthError::InvalidToken)
                }
            }
            status => Err(rejected(status, response).await),
        }
    }
}

async fn rejected(status: StatusCode, response: reqwest::Response) -> AuthError {
    let detail = response
        .json::<ErrorBody>()
        .await
        .map(|body| body.detail)
        .unwrap_or_default();
    AuthError::Rejected {
        status: status.as_u16(),
        detail,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

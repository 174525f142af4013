//! HTTP client for the `/api/auth` endpoints of the Auth service.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::models::{LoginResponse, TokenPair, User};
use crate::storage::AuthCookieJar;

use super::{AuthError, AuthGateway};

// ============================================================================
// Constants
// ============================================================================

/// Path prefix of the auth endpoints below the service base URL
const AUTH_PATH: &str = "/api/auth";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Auth service client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct AuthClient {
    client: Client,
    auth_base: String,
}

impl AuthClient {
    /// Create a client for the service at `base_url`.
    ///
    /// Cookies the service sets (HttpOnly session cookies) land in `cookies`
    /// and are sent back on later requests.
    pub fn new(base_url: &str, cookies: Arc<AuthCookieJar>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .cookie_provider(cookies)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            auth_base: format!("{}{}", base_url.trim_end_matches('/'), AUTH_PATH),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.auth_base, path)
    }

    async fn parse_json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T, AuthError> {
        response
            .json()
            .await
            .map_err(|e| AuthError::NetworkError(format!("Failed to parse {} response: {}", what, e)))
    }
}

#[async_trait]
impl AuthGateway for AuthClient {
    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, AuthError> {
        let url = self.endpoint("/login");
        let response = self
            .client
            .post(&url)
            .json(&LoginRequest { username, password })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(%status, "Login rejected");
            return Err(AuthError::from_login_status(status, &body));
        }

        Self::parse_json(response, "login").await
    }

    async fn current_user(&self, access_token: &str) -> Result<User, AuthError> {
        let url = self.endpoint("/me");
        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            debug!(status = %response.status(), "Current user request rejected");
            return Err(AuthError::Unauthorized);
        }

        Self::parse_json(response, "current user").await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let url = self.endpoint("/refresh");
        let response = self
            .client
            .post(&url)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;

        if !response.status().is_success() {
            debug!(status = %response.status(), "Refresh rejected");
            return Err(AuthError::RefreshRejected);
        }

        Self::parse_json(response, "refresh").await
    }

    async fn logout(&self, access_token: &str) -> Result<(), AuthError> {
        let url = self.endpoint("/logout");
        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .send()
            .await?;

        // The status is irrelevant: the local session is cleared either way.
        if !response.status().is_success() {
            debug!(status = %response.status(), "Server logout returned an error status");
        }
        Ok(())
    }
}

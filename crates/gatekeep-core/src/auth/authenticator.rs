use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::api::{AuthError, AuthGateway};
use crate::models::User;

use super::store::{SessionStore, StoreError};

/// Login and logout on top of the session store.
///
/// Establishing a session always goes through one contract: the service
/// returns an explicit token pair and user, whatever cookies it also sets.
pub struct Authenticator {
    store: Arc<SessionStore>,
    gateway: Arc<dyn AuthGateway>,
}

impl Authenticator {
    pub fn new(store: Arc<SessionStore>, gateway: Arc<dyn AuthGateway>) -> Self {
        Self { store, gateway }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Log in and populate the store.
    ///
    /// Surrounding whitespace is trimmed from both fields. A failed login
    /// leaves the store exactly as it was.
    pub async fn login(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let username = username.trim();
        let password = password.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let response = match self.gateway.login(username, password).await {
            Ok(response) => response,
            Err(e) => {
                warn!(username, error = %e, "Login failed");
                return Err(e);
            }
        };

        let user = response.user.clone();
        self.store
            .set_auth_tokens(response.access_token, response.refresh_token, response.user)
            .map_err(|e| AuthError::SessionStorage(e.to_string()))?;

        info!(username = %user.username, admin = user.is_superuser, "Login successful");
        Ok(user)
    }

    /// Revoke on the server (best effort), then clear the local session.
    pub async fn logout(&self) {
        if let Some(access_token) = self.store.access_token() {
            if let Err(e) = self.gateway.logout(&access_token).await {
                warn!(error = %e, "Server logout failed, clearing local session anyway");
            }
        }
        self.store.logout();
    }

    /// Hydrate the store from durable storage; no network call.
    pub fn restore(&self) -> Result<bool, StoreError> {
        self.store.initialize_auth()
    }

    /// Confirm the session with the server and load the user's profile.
    ///
    /// A restored session is only provisional until this (or a refresh)
    /// succeeds. An answer that ends the session (`Unauthorized`) logs out;
    /// network errors leave it in place.
    pub async fn verify_session(&self) -> Result<User, AuthError> {
        let Some(access_token) = self.store.access_token() else {
            return Err(AuthError::NotAuthenticated);
        };

        match self.gateway.current_user(&access_token).await {
            Ok(user) => {
                if !self.store.confirm_user(&access_token, user.clone()) {
                    debug!("Session changed while verifying, profile not applied");
                }
                Ok(user)
            }
            Err(e) if e.ends_session() => {
                if self.store.logout_if_token(&access_token) {
                    let failures = self.store.record_authentication_error();
                    warn!(failures, error = %e, "Stored session was rejected by the server");
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

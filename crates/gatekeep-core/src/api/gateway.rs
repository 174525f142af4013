use async_trait::async_trait;

use crate::models::{LoginResponse, TokenPair, User};

use super::AuthError;

/// The four operations of the Auth service.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// Exchange credentials for a token pair and the user's profile.
    ///
    /// Fails with `InvalidCredentials` when the service rejects the request
    /// as a client error and `NetworkError` for everything else.
    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, AuthError>;

    /// Fetch the profile behind an access token. Fails with `Unauthorized`.
    async fn current_user(&self, access_token: &str) -> Result<User, AuthError>;

    /// Rotate the token pair. Fails with `RefreshRejected` when the refresh
    /// token is expired or revoked.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError>;

    /// Best-effort server-side revoke.
    async fn logout(&self, access_token: &str) -> Result<(), AuthError>;
}

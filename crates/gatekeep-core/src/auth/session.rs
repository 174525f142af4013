use crate::models::User;

/// The authenticated-identity state, owned by `SessionStore`.
#[derive(Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Session {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<User>,
    pub is_authenticated: bool,
    pub is_admin: bool,
    /// Unknown (`None`) until the deployment reports its auto-login mode
    pub auto_login: Option<bool>,
    pub api_key: Option<String>,
    pub authentication_error_count: u32,
    /// Bumped by every logout
    pub generation: u64,
}

impl Session {
    /// Whether the refresh timer should be armed for this session
    pub fn is_refreshable(&self) -> bool {
        self.is_authenticated && self.refresh_token.is_some()
    }
}

fn redact(value: &Option<String>) -> Option<&'static str> {
    value.as_ref().map(|_| "<redacted>")
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("user", &self.user.as_ref().map(|u| &u.username))
            .field("is_authenticated", &self.is_authenticated)
            .field("is_admin", &self.is_admin)
            .field("auto_login", &self.auto_login)
            .field("api_key", &redact(&self.api_key))
            .field("authentication_error_count", &self.authentication_error_count)
            .field("generation", &self.generation)
            .finish()
    }
}

/// What the refresh timer watches. Published by the store on every change
/// that matters to it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthStatus {
    pub authenticated: bool,
    pub has_refresh_token: bool,
    pub generation: u64,
    /// Bumped whenever either token is written; profile updates leave it alone
    pub token_revision: u64,
}

impl AuthStatus {
    pub fn is_refreshable(&self) -> bool {
        self.authenticated && self.has_refresh_token
    }
}

/// Identifies the session a refresh was started for.
///
/// The store only applies a refresh result (or the forced logout after a
/// failed one) while the session is still the one the ticket was issued for.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshTicket {
    pub(crate) refresh_token: String,
    pub(crate) generation: u64,
    pub(crate) token_revision: u64,
}

impl RefreshTicket {
    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }
}

impl std::fmt::Debug for RefreshTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshTicket")
            .field("generation", &self.generation)
            .field("token_revision", &self.token_revision)
            .finish_non_exhaustive()
    }
}

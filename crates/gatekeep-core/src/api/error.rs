use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Failure outcomes of authentication operations.
///
/// `Clone` so a single in-flight refresh can hand its outcome to every
/// caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("{0}")]
    InvalidCredentials(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Refresh token rejected - session has ended")]
    RefreshRejected,

    #[error("Username and password required")]
    MissingCredentials,

    #[error("No active session")]
    NotAuthenticated,

    #[error("Failed to persist session: {0}")]
    SessionStorage(String),
}

/// Fallback message when a rejected login carries no usable detail
const LOGIN_FAILED: &str = "Login failed";

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AuthError::NetworkError("request timed out".to_string())
        } else {
            AuthError::NetworkError(e.to_string())
        }
    }
}

impl AuthError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        match body.char_indices().nth(MAX_ERROR_BODY_LENGTH) {
            None => body.to_string(),
            Some((cut, _)) => format!(
                "{}... (truncated, {} total bytes)",
                &body[..cut],
                body.len()
            ),
        }
    }

    /// Pull the human readable `detail` out of an error body.
    ///
    /// The service answers either `{"detail": "..."}` or, for request
    /// validation failures, `{"detail": [{"msg": "..."}, ...]}`.
    fn detail(body: &str) -> Option<String> {
        let value: Value = serde_json::from_str(body).ok()?;
        match value.get("detail")? {
            Value::String(message) if !message.is_empty() => Some(message.clone()),
            Value::Array(items) => {
                let messages: Vec<&str> = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(Value::as_str))
                    .collect();
                (!messages.is_empty()).then(|| messages.join("; "))
            }
            _ => None,
        }
    }

    /// Classify a non-success `/login` response.
    pub fn from_login_status(status: StatusCode, body: &str) -> Self {
        if status.is_client_error() {
            AuthError::InvalidCredentials(
                Self::detail(body).unwrap_or_else(|| LOGIN_FAILED.to_string()),
            )
        } else {
            AuthError::NetworkError(format!(
                "Status {}: {}",
                status,
                Self::truncate_body(body)
            ))
        }
    }

    /// Whether the error means the session can no longer be used
    pub fn ends_session(&self) -> bool {
        matches!(self, AuthError::Unauthorized | AuthError::RefreshRejected)
    }

    /// Message suitable for showing in a login form
    pub fn user_message(&self) -> String {
        match self {
            AuthError::InvalidCredentials(detail) => detail.clone(),
            AuthError::NetworkError(detail) if detail.contains("timed out") => {
                "Connection timed out. Please try again.".to_string()
            }
            AuthError::NetworkError(_) => {
                "Unable to connect to server. Check your internet connection.".to_string()
            }
            AuthError::Unauthorized | AuthError::RefreshRejected | AuthError::NotAuthenticated => {
                "Your session has ended. Please log in again.".to_string()
            }
            AuthError::MissingCredentials => "Please enter both username and password".to_string(),
            AuthError::SessionStorage(_) => {
                "Logged in, but the session could not be saved.".to_string()
            }
        }
    }
}

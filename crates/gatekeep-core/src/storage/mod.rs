//! Credential storage for the session store.
//!
//! This module provides:
//! - `CredentialStorage`: the key-value persistence the session store writes through
//! - `FileStorage`: a JSON file in the data directory, survives restarts
//! - `KeyringStorage`: OS-level credential storage via keyring
//! - `MemoryStorage`: process-lifetime storage for transient flags
//! - `AuthCookieJar`: the HTTP cookie jar whose auth cookies are cleared on logout

pub mod cookies;
pub mod file;
pub mod keychain;
pub mod memory;

use thiserror::Error;

pub use cookies::{AuthCookieJar, CookieManager, AUTH_COOKIE_NAMES};
pub use file::FileStorage;
pub use keychain::KeyringStorage;
pub use memory::MemoryStorage;

/// Durable key holding the access token
pub const ACCESS_TOKEN_KEY: &str = "gatekeep_access_token";

/// Durable key holding the refresh token
pub const REFRESH_TOKEN_KEY: &str = "gatekeep_refresh_token";

/// Durable key holding the API key
pub const API_KEY_KEY: &str = "gatekeep_api_key";

/// Every durable key written by the session store; all of them are wiped on logout.
pub const DURABLE_KEYS: [&str; 3] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, API_KEY_KEY];

/// Transient key that forces the route guard to redirect to login.
/// Only ever set in transient storage, never persisted.
pub const TEST_AUTO_LOGIN_OVERRIDE_KEY: &str = "gatekeep_test_auto_login";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage file is corrupt: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Keychain error: {0}")]
    Keyring(String),
}

/// Key-value persistence for credentials.
///
/// Removing a key that is not present is not an error.
pub trait CredentialStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Check whether a non-empty value is stored under `key`.
    /// Read errors count as absent.
    fn contains(&self, key: &str) -> bool {
        matches!(self.get(key), Ok(Some(value)) if !value.is_empty())
    }
}

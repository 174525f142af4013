//! Shared fixtures for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::api::{AuthError, AuthGateway};
use crate::models::{LoginResponse, TokenPair, User};
use crate::storage::{CredentialStorage, MemoryStorage, StorageError};

pub(crate) fn sample_user(is_superuser: bool) -> User {
    User {
        id: 7,
        username: "ada".to_string(),
        email: "ada@example.com".to_string(),
        full_name: Some("Ada Lovelace".to_string()),
        is_active: true,
        is_superuser,
        org_id: 1,
        role: if is_superuser { "super_admin" } else { "user" }.to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 3, 5, 14, 30, 0).unwrap(),
    }
}

/// Memory storage that refuses writes to one key.
pub(crate) struct FailingStorage {
    pub inner: MemoryStorage,
    failing_key: &'static str,
}

impl FailingStorage {
    pub fn failing_on(key: &'static str) -> Self {
        Self {
            inner: MemoryStorage::new(),
            failing_key: key,
        }
    }
}

impl CredentialStorage for FailingStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if key == self.failing_key {
            return Err(StorageError::Io(std::io::Error::other("disk full")));
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key)
    }
}

/// Scripted Auth service.
///
/// Refresh answers are consumed in order; once the script runs out every
/// refresh is rejected. Each call waits `delay` first, so tests running on
/// paused time can interleave other work with an in-flight call.
#[derive(Default)]
pub(crate) struct FakeGateway {
    refresh_script: Mutex<VecDeque<Result<TokenPair, AuthError>>>,
    login_result: Mutex<Option<Result<LoginResponse, AuthError>>>,
    current_user_result: Mutex<Option<Result<User, AuthError>>>,
    logout_result: Mutex<Option<Result<(), AuthError>>>,
    delay: Duration,
    pub refresh_calls: AtomicUsize,
    pub login_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn refresh_ok(self, access: &str, refresh: &str) -> Self {
        self.refresh_script
            .lock()
            .unwrap()
            .push_back(Ok(TokenPair::new(access, refresh)));
        self
    }

    pub fn refresh_err(self, error: AuthError) -> Self {
        self.refresh_script.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn login_result(self, result: Result<LoginResponse, AuthError>) -> Self {
        *self.login_result.lock().unwrap() = Some(result);
        self
    }

    pub fn current_user_result(self, result: Result<User, AuthError>) -> Self {
        *self.current_user_result.lock().unwrap() = Some(result);
        self
    }

    pub fn logout_result(self, result: Result<(), AuthError>) -> Self {
        *self.logout_result.lock().unwrap() = Some(result);
        self
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl AuthGateway for FakeGateway {
    async fn login(&self, _username: &str, _password: &str) -> Result<LoginResponse, AuthError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.login_result
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Err(AuthError::InvalidCredentials("Login failed".to_string())))
    }

    async fn current_user(&self, _access_token: &str) -> Result<User, AuthError> {
        self.pause().await;
        self.current_user_result
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(Err(AuthError::Unauthorized))
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenPair, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.refresh_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(AuthError::RefreshRejected))
    }

    async fn logout(&self, _access_token: &str) -> Result<(), AuthError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.logout_result.lock().unwrap().clone().unwrap_or(Ok(()))
    }
}

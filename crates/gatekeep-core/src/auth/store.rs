//! The session store: single authority over session state.
//!
//! Every mutation runs under one lock and writes durable storage before the
//! lock is released, so readers never observe memory and storage out of
//! step. No network I/O happens here.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::models::{TokenPair, User};
use crate::storage::{
    CookieManager, CredentialStorage, StorageError, ACCESS_TOKEN_KEY, API_KEY_KEY, DURABLE_KEYS,
    REFRESH_TOKEN_KEY,
};

use super::session::{AuthStatus, RefreshTicket, Session};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Cannot mark session authenticated without an access token")]
    MissingAccessToken,

    #[error("Cannot grant admin to an unauthenticated session")]
    NotAuthenticated,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

struct State {
    session: Session,
    // Bumped by token writes only, so a profile update never voids a refresh ticket
    token_revision: u64,
}

impl State {
    fn status(&self) -> AuthStatus {
        AuthStatus {
            authenticated: self.session.is_authenticated,
            has_refresh_token: self.session.refresh_token.is_some(),
            generation: self.session.generation,
            token_revision: self.token_revision,
        }
    }
}

pub struct SessionStore {
    state: Mutex<State>,
    storage: Arc<dyn CredentialStorage>,
    cookies: Arc<dyn CookieManager>,
    status_tx: watch::Sender<AuthStatus>,
}

impl SessionStore {
    /// Create an empty store. Call `initialize_auth` to hydrate it from storage.
    pub fn new(storage: Arc<dyn CredentialStorage>, cookies: Arc<dyn CookieManager>) -> Self {
        let (status_tx, _) = watch::channel(AuthStatus::default());
        Self {
            state: Mutex::new(State {
                session: Session::default(),
                token_revision: 0,
            }),
            storage,
            cookies,
            status_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish the status while still holding the lock so subscribers see
    /// changes in mutation order.
    fn publish(&self, state: &State) {
        let next = state.status();
        self.status_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn write_key(&self, key: &str, value: Option<&str>) -> Result<(), StorageError> {
        match value {
            Some(value) => self.storage.set(key, value),
            None => self.storage.remove(key),
        }
    }

    /// Write both tokens, putting the access token back if the second write fails.
    fn persist_tokens(&self, access_token: &str, refresh_token: &str) -> Result<(), StorageError> {
        let previous_access = self.storage.get(ACCESS_TOKEN_KEY)?;
        self.storage.set(ACCESS_TOKEN_KEY, access_token)?;

        if let Err(e) = self.storage.set(REFRESH_TOKEN_KEY, refresh_token) {
            if let Err(restore_err) = self.write_key(ACCESS_TOKEN_KEY, previous_access.as_deref()) {
                warn!(error = %restore_err, "Failed to restore access token after storage error");
            }
            return Err(e);
        }
        Ok(())
    }

    // =========================================================================
    // Selectors
    // =========================================================================

    /// Receive an `AuthStatus` every time authentication state changes
    pub fn subscribe(&self) -> watch::Receiver<AuthStatus> {
        self.status_tx.subscribe()
    }

    pub fn status(&self) -> AuthStatus {
        self.lock().status()
    }

    /// Copy of the whole session
    pub fn snapshot(&self) -> Session {
        self.lock().session.clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.lock().session.access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.lock().session.refresh_token.clone()
    }

    pub fn user(&self) -> Option<User> {
        self.lock().session.user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().session.is_authenticated
    }

    pub fn is_admin(&self) -> bool {
        self.lock().session.is_admin
    }

    pub fn auto_login(&self) -> Option<bool> {
        self.lock().session.auto_login
    }

    pub fn api_key(&self) -> Option<String> {
        self.lock().session.api_key.clone()
    }

    pub fn authentication_error_count(&self) -> u32 {
        self.lock().session.authentication_error_count
    }

    /// Capture what a refresh needs, or `None` when there is nothing to refresh
    pub fn refresh_ticket(&self) -> Option<RefreshTicket> {
        let state = self.lock();
        let session = &state.session;
        if !session.is_authenticated {
            return None;
        }
        session.refresh_token.as_ref().map(|token| RefreshTicket {
            refresh_token: token.clone(),
            generation: session.generation,
            token_revision: state.token_revision,
        })
    }

    // =========================================================================
    // Field setters
    // =========================================================================

    /// Replace the access token. Clearing it also ends authentication.
    pub fn set_access_token(&self, access_token: Option<String>) -> Result<(), StoreError> {
        let mut state = self.lock();
        self.write_key(ACCESS_TOKEN_KEY, access_token.as_deref())?;

        let session = &mut state.session;
        if access_token.is_none() {
            session.is_authenticated = false;
            session.is_admin = false;
        }
        session.access_token = access_token;
        state.token_revision += 1;
        self.publish(&state);
        Ok(())
    }

    /// Replace the refresh token. Clearing it disarms the refresh timer.
    pub fn set_refresh_token(&self, refresh_token: Option<String>) -> Result<(), StoreError> {
        let mut state = self.lock();
        self.write_key(REFRESH_TOKEN_KEY, refresh_token.as_deref())?;
        state.session.refresh_token = refresh_token;
        state.token_revision += 1;
        self.publish(&state);
        Ok(())
    }

    /// Replace the user; admin status follows `is_superuser`.
    pub fn set_user(&self, user: Option<User>) {
        let mut state = self.lock();
        let session = &mut state.session;
        session.is_admin =
            session.is_authenticated && user.as_ref().is_some_and(|u| u.is_superuser);
        session.user = user;
    }

    pub fn set_is_authenticated(&self, is_authenticated: bool) -> Result<(), StoreError> {
        let mut state = self.lock();
        let session = &mut state.session;
        if is_authenticated && session.access_token.is_none() {
            return Err(StoreError::MissingAccessToken);
        }
        session.is_authenticated = is_authenticated;
        if !is_authenticated {
            session.is_admin = false;
        }
        self.publish(&state);
        Ok(())
    }

    pub fn set_is_admin(&self, is_admin: bool) -> Result<(), StoreError> {
        let mut state = self.lock();
        if is_admin && !state.session.is_authenticated {
            return Err(StoreError::NotAuthenticated);
        }
        state.session.is_admin = is_admin;
        Ok(())
    }

    pub fn set_auto_login(&self, auto_login: Option<bool>) {
        self.lock().session.auto_login = auto_login;
    }

    /// Replace the API key. It is persisted independently of the JWT pair.
    pub fn set_api_key(&self, api_key: Option<String>) -> Result<(), StoreError> {
        let mut state = self.lock();
        self.write_key(API_KEY_KEY, api_key.as_deref())?;
        state.session.api_key = api_key;
        Ok(())
    }

    pub fn set_authentication_error_count(&self, count: u32) {
        self.lock().session.authentication_error_count = count;
    }

    /// Count one more consecutive authentication failure
    pub fn record_authentication_error(&self) -> u32 {
        let mut state = self.lock();
        let session = &mut state.session;
        session.authentication_error_count = session.authentication_error_count.saturating_add(1);
        session.authentication_error_count
    }

    // =========================================================================
    // Composite operations
    // =========================================================================

    /// Establish a session from a login: token pair, user and derived flags,
    /// all persisted before this returns.
    ///
    /// On a storage failure the in-memory session is left as it was.
    pub fn set_auth_tokens(
        &self,
        access_token: String,
        refresh_token: String,
        user: User,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        self.persist_tokens(&access_token, &refresh_token)?;

        let session = &mut state.session;
        session.is_admin = user.is_superuser;
        session.access_token = Some(access_token);
        session.refresh_token = Some(refresh_token);
        session.user = Some(user);
        session.is_authenticated = true;
        session.authentication_error_count = 0;
        state.token_revision += 1;
        self.publish(&state);

        debug!(generation = state.session.generation, "Session tokens set");
        Ok(())
    }

    /// Apply a refreshed token pair, keeping the current user.
    ///
    /// Returns `false` without touching anything when the session the ticket
    /// was issued for has since logged out or been replaced.
    pub fn apply_refresh(&self, ticket: &RefreshTicket, tokens: TokenPair) -> Result<bool, StoreError> {
        let mut state = self.lock();
        if !Self::is_current(&state, ticket) {
            debug!(
                ticket_generation = ticket.generation,
                generation = state.session.generation,
                "Dropping refresh result for a session that no longer exists"
            );
            return Ok(false);
        }

        self.persist_tokens(&tokens.access_token, &tokens.refresh_token)?;

        state.session.access_token = Some(tokens.access_token);
        state.session.refresh_token = Some(tokens.refresh_token);
        state.token_revision += 1;
        self.publish(&state);
        Ok(true)
    }

    fn is_current(state: &State, ticket: &RefreshTicket) -> bool {
        state.session.is_authenticated
            && state.session.generation == ticket.generation
            && state.token_revision == ticket.token_revision
    }

    /// Hydrate from durable storage at startup.
    ///
    /// When both tokens are stored the session is marked authenticated
    /// without contacting the server; the first API call or refresh
    /// confirms it. Returns whether a session was restored.
    pub fn initialize_auth(&self) -> Result<bool, StoreError> {
        let mut state = self.lock();
        let access_token = self.storage.get(ACCESS_TOKEN_KEY)?;
        let refresh_token = self.storage.get(REFRESH_TOKEN_KEY)?;
        let api_key = self.storage.get(API_KEY_KEY)?;

        if api_key.is_some() {
            state.session.api_key = api_key;
        }

        let (Some(access_token), Some(refresh_token)) = (access_token, refresh_token) else {
            debug!("No stored session to restore");
            return Ok(false);
        };

        let session = &mut state.session;
        session.access_token = Some(access_token);
        session.refresh_token = Some(refresh_token);
        session.user = None;
        session.is_authenticated = true;
        session.is_admin = false;
        state.token_revision += 1;
        self.publish(&state);

        info!("Restored session from storage");
        Ok(true)
    }

    /// Clear the session, durable keys and auth cookies. Safe to call at any time.
    ///
    /// Storage failures are logged; the in-memory session is cleared regardless.
    pub fn logout(&self) {
        let mut state = self.lock();
        self.clear(&mut state);
    }

    /// Forced logout after a failed refresh.
    ///
    /// A no-op returning `false` when the session has already been cleared or
    /// replaced since the ticket was issued.
    pub fn logout_if_current(&self, ticket: &RefreshTicket) -> bool {
        let mut state = self.lock();
        if !Self::is_current(&state, ticket) {
            debug!("Session already replaced, skipping forced logout");
            return false;
        }
        self.clear(&mut state);
        true
    }

    /// Store the confirmed profile for the session holding `access_token`.
    /// Returns `false` when the token has been replaced in the meantime.
    pub fn confirm_user(&self, access_token: &str, user: User) -> bool {
        let mut state = self.lock();
        let session = &mut state.session;
        if !session.is_authenticated || session.access_token.as_deref() != Some(access_token) {
            return false;
        }
        session.is_admin = user.is_superuser;
        session.user = Some(user);
        true
    }

    /// Log out only if `access_token` is still the session's token.
    pub fn logout_if_token(&self, access_token: &str) -> bool {
        let mut state = self.lock();
        if state.session.access_token.as_deref() != Some(access_token) {
            return false;
        }
        self.clear(&mut state);
        true
    }

    fn clear(&self, state: &mut State) {
        for key in DURABLE_KEYS {
            if let Err(e) = self.storage.remove(key) {
                warn!(key, error = %e, "Failed to remove stored credential");
            }
        }
        self.cookies.clear_auth_cookies();

        let was_authenticated = state.session.is_authenticated;
        state.session = Session {
            auto_login: Some(false),
            authentication_error_count: state.session.authentication_error_count,
            generation: state.session.generation + 1,
            ..Session::default()
        };
        state.token_revision += 1;
        self.publish(state);

        if was_authenticated {
            info!("Logged out");
        } else {
            debug!("Logout on a session that was not authenticated");
        }
    }
}

//! gatekeep-core - client-side authentication session management.
//!
//! Holds the current authentication state, persists it across restarts,
//! refreshes short-lived access tokens before they expire, and decides
//! whether protected paths render or redirect to login.
//!
//! One `SessionStore` is created by the process entry point and shared
//! (`Arc`) with the `Authenticator`, `RefreshScheduler` and `RouteGuard`.
//! All session mutation goes through the store.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::{AuthClient, AuthError, AuthGateway};
pub use auth::{
    Authenticator, GuardDecision, Guarded, RefreshHandle, RefreshScheduler, RouteGuard,
    SchedulerState, Session, SessionStore, StoreError,
};
pub use config::{Config, Environment, StorageBackend};
pub use models::{LoginResponse, TokenPair, User};

//! Authentication module for managing the user session.
//!
//! This module provides:
//! - `SessionStore`: the single authority over session state and its persistence
//! - `RefreshScheduler`: background renewal of the access token
//! - `RouteGuard`: render-or-redirect decisions for protected paths
//! - `Authenticator`: login/logout orchestration on top of the store
//!
//! Access tokens expire after 30 minutes; the scheduler renews them before that.

pub mod authenticator;
pub mod guard;
pub mod refresh;
pub mod session;
pub mod store;

pub use authenticator::Authenticator;
pub use guard::{GuardDecision, GuardInputs, Guarded, RouteGuard};
pub use refresh::{RefreshHandle, RefreshScheduler, SchedulerState};
pub use session::{AuthStatus, RefreshTicket, Session};
pub use store::{SessionStore, StoreError};

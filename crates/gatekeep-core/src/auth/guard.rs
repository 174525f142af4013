//! Route guard: decide whether a protected path renders or redirects to login.
//!
//! The decision is a pure function of the session state, the deployment's
//! auto-login setting and a transient override flag. It is re-evaluated on
//! every check and holds no state of its own.

use std::sync::Arc;

use tracing::debug;

use crate::storage::{CredentialStorage, TEST_AUTO_LOGIN_OVERRIDE_KEY};

use super::store::SessionStore;

/// Path of the login page
pub const LOGIN_PATH: &str = "/login";

/// Where a successful login lands when there is nowhere better to go
pub const DEFAULT_LANDING_PATH: &str = "/app";

/// Paths that need no `redirect` parameter; login lands there anyway
const HOME_PATHS: [&str; 2] = ["/", "/flows"];

/// Everything the redirect decision depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GuardInputs {
    pub is_authenticated: bool,
    pub auto_login: Option<bool>,
    /// Whether this deployment permits auto-login at all
    pub auto_login_enabled: bool,
    pub test_override: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Render,
    Redirect(String),
}

/// Outcome of guarding a piece of content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guarded<T> {
    Render(T),
    Redirect(String),
}

/// Redirect when the user is not signed in and auto-login cannot sign them
/// in, or when the override flag is set.
///
/// An unknown auto-login mode never redirects on its own: the deployment
/// has not said yet whether auto-login will take care of the user.
pub fn should_redirect(inputs: &GuardInputs) -> bool {
    let needs_login = !inputs.is_authenticated
        && inputs.auto_login.is_some()
        && (inputs.auto_login == Some(false) || !inputs.auto_login_enabled);
    needs_login || inputs.test_override
}

fn is_home_path(path: &str) -> bool {
    HOME_PATHS.contains(&path)
}

fn is_login_page(path: &str) -> bool {
    path.contains("login")
}

/// Login URL for a redirect from `current_path`, carrying the path along so
/// the user comes back to it.
pub fn login_redirect_target(current_path: &str) -> String {
    if is_home_path(current_path) || is_login_page(current_path) {
        LOGIN_PATH.to_string()
    } else {
        format!("{}?redirect={}", LOGIN_PATH, current_path)
    }
}

pub fn decide(inputs: &GuardInputs, current_path: &str) -> GuardDecision {
    if should_redirect(inputs) {
        GuardDecision::Redirect(login_redirect_target(current_path))
    } else {
        GuardDecision::Render
    }
}

/// Where to send the user after a successful login.
///
/// Honors a `redirect` value only when it is a local absolute path, so a
/// crafted link cannot bounce the user to another origin or back to login.
pub fn post_login_destination(redirect: Option<&str>) -> String {
    match redirect.map(str::trim) {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !is_login_page(path) => {
            path.to_string()
        }
        _ => DEFAULT_LANDING_PATH.to_string(),
    }
}

/// Guards protected paths using the live session.
pub struct RouteGuard {
    store: Arc<SessionStore>,
    transient: Arc<dyn CredentialStorage>,
    auto_login_enabled: bool,
}

impl RouteGuard {
    pub fn new(
        store: Arc<SessionStore>,
        transient: Arc<dyn CredentialStorage>,
        auto_login_enabled: bool,
    ) -> Self {
        Self {
            store,
            transient,
            auto_login_enabled,
        }
    }

    /// Gather the current decision inputs
    pub fn inputs(&self) -> GuardInputs {
        let session = self.store.snapshot();
        GuardInputs {
            is_authenticated: session.is_authenticated,
            auto_login: session.auto_login,
            auto_login_enabled: self.auto_login_enabled,
            test_override: self.test_override(),
        }
    }

    fn test_override(&self) -> bool {
        self.transient.contains(TEST_AUTO_LOGIN_OVERRIDE_KEY)
    }

    pub fn check(&self, current_path: &str) -> GuardDecision {
        let inputs = self.inputs();
        let decision = decide(&inputs, current_path);
        if let GuardDecision::Redirect(ref target) = decision {
            debug!(path = current_path, target = %target, "Redirecting to login");
        }
        decision
    }

    /// Produce protected content only when the guard allows it.
    pub fn protect<T, F>(&self, current_path: &str, render: F) -> Guarded<T>
    where
        F: FnOnce() -> T,
    {
        match self.check(current_path) {
            GuardDecision::Render => Guarded::Render(render()),
            GuardDecision::Redirect(target) => Guarded::Redirect(target),
        }
    }
}

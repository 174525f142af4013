//! Client for the remote Auth service.
//!
//! This module provides the `AuthGateway` trait, the seam the session
//! machinery talks to, and `AuthClient`, its HTTP implementation against
//! the `/api/auth` endpoints.
//!
//! The gateway never retries. Every failure comes back as an `AuthError`
//! and retry policy belongs to the caller.

pub mod client;
pub mod error;
pub mod gateway;

pub use client::AuthClient;
pub use error::AuthError;
pub use gateway::AuthGateway;

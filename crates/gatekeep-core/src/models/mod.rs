//! Data models exchanged with the Auth service.
//!
//! - `User`: the authenticated user's profile
//! - `LoginResponse`, `TokenPair`: token payloads from login and refresh

pub mod tokens;
pub mod user;

pub use tokens::{LoginResponse, TokenPair};
pub use user::User;

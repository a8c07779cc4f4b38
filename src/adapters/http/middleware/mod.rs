//! HTTP middleware for axum.
//!
//! - `auth` - Bearer extractor resolving the acting user

pub mod auth;

pub use auth::{AuthRejection, RequireUser};

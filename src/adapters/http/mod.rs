//! HTTP adapters - reference implementation of the messaging REST API.

pub mod messaging;
pub mod middleware;

// Re-export key types for convenience
pub use messaging::{messaging_router, MessagingAppState};

//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the messaging core to external systems:
//! - `http` - Reference REST server (axum) over the in-memory backend
//! - `http_client` - reqwest client for the messaging API
//! - `memory` - Process-local backend for tests and demos

pub mod http;
pub mod http_client;
pub mod memory;

pub use http::{messaging_router, MessagingAppState};
pub use http_client::HttpMessagingClient;
pub use memory::{BackendOperation, InMemoryMessagingBackend};

//! In-memory adapters.

mod backend;

pub use backend::{BackendOperation, InMemoryMessagingBackend};

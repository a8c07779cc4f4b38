//! HTTP adapter for messaging endpoints.
//!
//! - `GET /conversations` - Conversations of the caller
//! - `POST /conversations` - Create a direct or group conversation
//! - `GET|PATCH|DELETE /conversations/:id` - Load, rename or re-roster, delete
//! - `GET|POST /conversations/:id/messages` - History and send
//! - `POST /conversations/:id/seen` - Mark the conversation seen
//! - `GET /users/search` - Addressable users
//! - `POST /upload` - Multipart file upload
//! - `GET /files/:id` - Uploaded file content

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::*;
pub use handlers::{ApiError, MessagingAppState};
pub use routes::messaging_router;

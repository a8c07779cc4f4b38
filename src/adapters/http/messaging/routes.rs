//! Axum router configuration for messaging endpoints.

use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{
    create_conversation, delete_conversation, get_conversation, get_file, list_conversations,
    list_messages, mark_seen, search_users, send_message, update_conversation, upload,
    MessagingAppState,
};

/// Multipart framing on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Create the messaging API router.
///
/// # Routes
///
/// ## Conversations (require authentication)
/// - `GET /conversations`
/// - `POST /conversations`
/// - `GET /conversations/:id`
/// - `PATCH /conversations/:id`
/// - `DELETE /conversations/:id`
/// - `GET /conversations/:id/messages`
/// - `POST /conversations/:id/messages`
/// - `POST /conversations/:id/seen`
///
/// ## Users and files
/// - `GET /users/search` (requires authentication)
/// - `POST /upload` (requires authentication)
/// - `GET /files/:id` (public, addressed by unguessable id)
pub fn messaging_routes() -> Router<MessagingAppState> {
    Router::new()
        .route(
            "/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route(
            "/conversations/:id",
            get(get_conversation)
                .patch(update_conversation)
                .delete(delete_conversation),
        )
        .route(
            "/conversations/:id/messages",
            get(list_messages).post(send_message),
        )
        .route("/conversations/:id/seen", post(mark_seen))
        .route("/users/search", get(search_users))
        .route("/files/:id", get(get_file))
}

/// Upload route with a body limit derived from the upload policy.
pub fn upload_routes(max_size_bytes: u64) -> Router<MessagingAppState> {
    let limit = usize::try_from(max_size_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);
    Router::new()
        .route("/upload", post(upload))
        .layer(DefaultBodyLimit::max(limit))
}

/// Create the complete messaging router with tracing and request timeout.
pub fn messaging_router(state: MessagingAppState, request_timeout: Duration) -> Router {
    let max_size_bytes = state.backend.upload_policy().max_size_bytes;
    Router::new()
        .merge(messaging_routes())
        .merge(upload_routes(max_size_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

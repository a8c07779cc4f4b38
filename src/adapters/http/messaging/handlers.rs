//! HTTP handlers of the reference messaging API.
//!
//! Every handler resolves the acting user from the bearer token, calls the
//! in-memory backend through its ports and maps `MessagingError` onto
//! status codes.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Json, Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{debug, error};

use crate::adapters::http::middleware::RequireUser;
use super::dto::{
    AttachmentDto, ConversationDto, CreateConversationRequest, ErrorResponse, MessageDto,
    SendMessageRequest, UpdateConversationRequest, UserDto, UserSearchParams,
};
use crate::adapters::memory::InMemoryMessagingBackend;
use crate::domain::foundation::{AttachmentId, ConversationId};
use crate::domain::messaging::{
    ConversationDraft, MessageDraft, MessagingError, NetworkError, SelectedFile, UploadError,
};
use crate::ports::{
    ConversationGateway, ConversationUpdate, FileUploader, MessageGateway, ProgressReporter,
    SeenGateway, UserDirectory, UserSearchQuery,
};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state of the reference server.
#[derive(Clone)]
pub struct MessagingAppState {
    pub backend: Arc<InMemoryMessagingBackend>,
}

impl MessagingAppState {
    pub fn new(backend: Arc<InMemoryMessagingBackend>) -> Self {
        Self { backend }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Conversations
// ════════════════════════════════════════════════════════════════════════════════

/// GET /conversations - the caller's conversations, latest activity first.
pub async fn list_conversations(
    State(state): State<MessagingAppState>,
    RequireUser(user): RequireUser,
) -> Result<impl IntoResponse, ApiError> {
    let conversations = state.backend.list_conversations(&user).await?;
    let body: Vec<ConversationDto> = conversations.iter().map(ConversationDto::from).collect();
    Ok(Json(body))
}

/// POST /conversations - create, with an optional atomic first message.
///
/// # Errors
/// - 400 Bad Request: empty roster, blank group title, unknown user
pub async fn create_conversation(
    State(state): State<MessagingAppState>,
    RequireUser(user): RequireUser,
    Json(body): Json<CreateConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let draft = ConversationDraft::new(
        &user,
        body.is_group,
        body.title,
        body.participant_ids,
        body.initial_message,
    )
    .map_err(MessagingError::from)?;
    let conversation = state.backend.create_conversation(&user, &draft).await?;
    Ok((StatusCode::CREATED, Json(ConversationDto::from(&conversation))))
}

/// GET /conversations/:id
///
/// # Errors
/// - 404 Not Found: missing, or the caller is not a participant
pub async fn get_conversation(
    State(state): State<MessagingAppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_conversation_id(&id)?;
    let conversation = state.backend.get_conversation(&user, &id).await?;
    Ok(Json(ConversationDto::from(&conversation)))
}

/// PATCH /conversations/:id - `{title}` renames, `{participantIds}` sets
/// the complete roster.
///
/// # Errors
/// - 400 Bad Request: neither field present, blank title
/// - 403 Forbidden: the conversation is direct
pub async fn update_conversation(
    State(state): State<MessagingAppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_conversation_id(&id)?;
    let update = match (body.title, body.participant_ids) {
        (Some(title), _) => ConversationUpdate::Rename { title },
        (None, Some(participant_ids)) => ConversationUpdate::SetParticipants { participant_ids },
        (None, None) => {
            return Err(ApiError::BadRequest(
                "expected either title or participantIds".to_string(),
            ))
        }
    };
    let conversation = state.backend.update_conversation(&user, &id, &update).await?;
    Ok(Json(ConversationDto::from(&conversation)))
}

/// DELETE /conversations/:id
pub async fn delete_conversation(
    State(state): State<MessagingAppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_conversation_id(&id)?;
    state.backend.delete_conversation(&user, &id).await?;
    Ok(StatusCode::OK)
}

// ════════════════════════════════════════════════════════════════════════════════
// Messages
// ════════════════════════════════════════════════════════════════════════════════

/// GET /conversations/:id/messages - full history, oldest first.
pub async fn list_messages(
    State(state): State<MessagingAppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_conversation_id(&id)?;
    let messages = state.backend.list_messages(&user, &id).await?;
    let body: Vec<MessageDto> = messages.iter().map(MessageDto::from).collect();
    Ok(Json(body))
}

/// POST /conversations/:id/messages - `{content, fileId?}`.
///
/// # Errors
/// - 400 Bad Request: blank content without file, unknown file
pub async fn send_message(
    State(state): State<MessagingAppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_conversation_id(&id)?;
    let draft = MessageDraft::new(&body.content, body.file_id).map_err(MessagingError::from)?;
    let message = state.backend.send_message(&user, &id, &draft).await?;
    Ok((StatusCode::CREATED, Json(MessageDto::from(&message))))
}

/// POST /conversations/:id/seen
pub async fn mark_seen(
    State(state): State<MessagingAppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_conversation_id(&id)?;
    state.backend.mark_seen(&user, &id).await?;
    Ok(StatusCode::OK)
}

// ════════════════════════════════════════════════════════════════════════════════
// Users
// ════════════════════════════════════════════════════════════════════════════════

/// GET /users/search?q=&role=&establishmentId=
pub async fn search_users(
    State(state): State<MessagingAppState>,
    RequireUser(user): RequireUser,
    Query(params): Query<UserSearchParams>,
) -> Result<impl IntoResponse, ApiError> {
    let mut query = UserSearchQuery::new(params.q.clone());
    if let Some(role) = params.role() {
        query = query.with_role(role);
    }
    if let Some(establishment) = params.establishment() {
        query = query.with_establishment(establishment);
    }
    let users = state.backend.search_users(&user, &query).await?;
    let body: Vec<UserDto> = users.iter().map(UserDto::from).collect();
    Ok(Json(body))
}

// ════════════════════════════════════════════════════════════════════════════════
// Files
// ════════════════════════════════════════════════════════════════════════════════

/// POST /upload - multipart with a single `file` part.
///
/// # Errors
/// - 400 Bad Request: no file part
/// - 413 Payload Too Large: over the size limit or a disallowed type
pub async fn upload(
    State(state): State<MessagingAppState>,
    RequireUser(user): RequireUser,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or("file").to_string();
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(|e| {
            if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                ApiError::from(MessagingError::from(UploadError::Rejected(format!(
                    "{} exceeds the upload limit",
                    name
                ))))
            } else {
                ApiError::BadRequest(format!("failed to read file: {}", e))
            }
        })?;

        debug!(name = %name, size = data.len(), "Receiving upload");
        let file = SelectedFile::from_bytes(name, content_type.as_deref(), data.to_vec());
        let attachment = state
            .backend
            .upload(&user, &file, ProgressReporter::noop())
            .await?;
        return Ok((StatusCode::CREATED, Json(AttachmentDto::from(&attachment))));
    }
    Err(ApiError::BadRequest("missing file part".to_string()))
}

/// GET /files/:id - raw content of an uploaded file.
pub async fn get_file(
    State(state): State<MessagingAppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id: AttachmentId = id
        .parse()
        .map_err(|_| ApiError::NotFound("file".to_string()))?;
    let (attachment, data) = state
        .backend
        .file(&id)
        .ok_or_else(|| ApiError::NotFound("file".to_string()))?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, attachment.mime_type)
        .header(header::CONTENT_LENGTH, data.len())
        .body(Body::from(data))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

fn parse_conversation_id(raw: &str) -> Result<ConversationId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest("Invalid conversation ID format".to_string()))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts domain errors to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    Domain(MessagingError),
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<MessagingError> for ApiError {
    fn from(error: MessagingError) -> Self {
        ApiError::Domain(error)
    }
}

/// Status code for a domain error.
pub fn status_for(error: &MessagingError) -> StatusCode {
    match error {
        MessagingError::Validation(_) => StatusCode::BAD_REQUEST,
        MessagingError::NotFound(_) => StatusCode::NOT_FOUND,
        MessagingError::Forbidden(_) => StatusCode::FORBIDDEN,
        MessagingError::InvalidTransition(_) => StatusCode::CONFLICT,
        MessagingError::Upload(UploadError::Rejected(_)) => StatusCode::PAYLOAD_TOO_LARGE,
        MessagingError::Upload(_) => StatusCode::INTERNAL_SERVER_ERROR,
        MessagingError::Network(NetworkError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
        MessagingError::Network(_) => StatusCode::BAD_GATEWAY,
        MessagingError::Rejected(rejection) => {
            StatusCode::from_u16(rejection.status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Domain(error) => {
                let status = status_for(&error);
                if status.is_server_error() {
                    error!(error = %error, "Request failed");
                }
                (status, ErrorResponse::from(&error))
            }
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    code: "BAD_REQUEST".to_string(),
                    message,
                    field: None,
                },
            ),
            ApiError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    code: "NOT_FOUND".to_string(),
                    message: format!("{} not found", resource),
                    field: None,
                },
            ),
            ApiError::Internal(message) => {
                error!("Internal error: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        code: "INTERNAL".to_string(),
                        message: "An internal error occurred".to_string(),
                        field: None,
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

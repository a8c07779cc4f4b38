//! Messaging error types.
//!
//! Every failure is local to one operation. None of these is fatal to the
//! process and the rest of the client stays usable after any of them.

use thiserror::Error;

use crate::domain::foundation::{ConversationId, ErrorCode, ValidationError};

/// Transport failures talking to the messaging API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Decode(String),
}

/// Failures of the attachment upload step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("Upload failed: {0}")]
    Transfer(String),

    #[error("Upload rejected: {0}")]
    Rejected(String),

    #[error("Upload cancelled")]
    Cancelled,
}

/// A request the messaging API refused with a 4xx answer.
///
/// Keeps the server's message and, for validation answers, the offending
/// field so the UI can still highlight it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Request refused ({status}): {message}")]
pub struct ServerRejection {
    pub status: u16,
    pub message: String,
    pub field: Option<String>,
}

impl ServerRejection {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            field: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

/// Errors surfaced by messaging operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessagingError {
    /// Rejected before any network call; shown next to the field.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The UI degrades to an empty or error state.
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// The dependent send is aborted and the composer keeps the file.
    #[error("{0}")]
    Upload(#[from] UploadError),

    /// The viewer is sent back to the conversation directory.
    #[error("Conversation not found: {0}")]
    NotFound(ConversationId),

    /// Operation not allowed in the current component state.
    #[error("Invalid state: {0}")]
    InvalidTransition(String),

    /// Operation not offered for this conversation or viewer.
    #[error("Not allowed: {0}")]
    Forbidden(String),

    /// The server refused a request the client considered valid.
    #[error("{0}")]
    Rejected(#[from] ServerRejection),
}

impl MessagingError {
    pub fn invalid_transition(message: impl Into<String>) -> Self {
        MessagingError::InvalidTransition(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        MessagingError::Forbidden(message.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            MessagingError::Validation(_) => ErrorCode::ValidationFailed,
            MessagingError::Network(NetworkError::Timeout { .. }) => ErrorCode::Timeout,
            MessagingError::Network(_) => ErrorCode::NetworkError,
            MessagingError::Upload(UploadError::Transfer(_)) => ErrorCode::UploadFailed,
            MessagingError::Upload(UploadError::Rejected(_)) => ErrorCode::UploadRejected,
            MessagingError::Upload(UploadError::Cancelled) => ErrorCode::UploadCancelled,
            MessagingError::NotFound(_) => ErrorCode::ConversationNotFound,
            MessagingError::InvalidTransition(_) => ErrorCode::InvalidStateTransition,
            MessagingError::Forbidden(_) => ErrorCode::Forbidden,
            MessagingError::Rejected(rejection) => match rejection.status {
                400 | 422 => ErrorCode::ValidationFailed,
                403 => ErrorCode::Forbidden,
                409 => ErrorCode::InvalidStateTransition,
                _ => ErrorCode::NetworkError,
            },
        }
    }

    /// True for errors raised locally, before any request was issued.
    pub fn is_client_side(&self) -> bool {
        matches!(
            self,
            MessagingError::Validation(_)
                | MessagingError::InvalidTransition(_)
                | MessagingError::Forbidden(_)
        )
    }

    /// Field to highlight inline, for validation failures.
    pub fn field(&self) -> Option<&str> {
        match self {
            MessagingError::Validation(err) => Some(err.field()),
            MessagingError::Rejected(rejection) => rejection.field.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_convert_and_keep_field() {
        let err: MessagingError = ValidationError::empty_field("title").into();
        assert_eq!(err.code(), ErrorCode::ValidationFailed);
        assert_eq!(err.field(), Some("title"));
        assert!(err.is_client_side());
    }

    #[test]
    fn timeouts_have_their_own_code() {
        let err: MessagingError = NetworkError::Timeout { timeout_secs: 30 }.into();
        assert_eq!(err.code(), ErrorCode::Timeout);
        assert_eq!(err.to_string(), "Network error: Request timed out after 30s");
        assert!(!err.is_client_side());
    }

    #[test]
    fn upload_errors_map_to_codes() {
        let rejected: MessagingError = UploadError::Rejected("too big".into()).into();
        let cancelled: MessagingError = UploadError::Cancelled.into();
        assert_eq!(rejected.code(), ErrorCode::UploadRejected);
        assert_eq!(cancelled.code(), ErrorCode::UploadCancelled);
    }

    #[test]
    fn server_rejections_are_not_client_side() {
        let err: MessagingError = ServerRejection::new(400, "title is required")
            .with_field("title")
            .into();
        assert_eq!(err.code(), ErrorCode::ValidationFailed);
        assert_eq!(err.field(), Some("title"));
        assert!(!err.is_client_side());

        let forbidden: MessagingError = ServerRejection::new(403, "direct").into();
        assert_eq!(forbidden.code(), ErrorCode::Forbidden);
        assert!(!forbidden.is_client_side());
    }

    #[test]
    fn not_found_displays_conversation() {
        let id = ConversationId::new();
        let err = MessagingError::NotFound(id);
        assert_eq!(err.to_string(), format!("Conversation not found: {}", id));
    }
}

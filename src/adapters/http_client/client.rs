//! reqwest implementation of the messaging ports.
//!
//! Talks to the REST API described in `adapters::http::messaging`. The
//! client sends the configured session token as bearer credentials; without
//! one it falls back to the acting user's id, which is what the reference
//! server accepts.

use async_trait::async_trait;
use futures::stream;
use reqwest::{multipart, Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use crate::adapters::http::messaging::dto::{
    AttachmentDto, ConversationDto, CreateConversationRequest, ErrorResponse, MessageDto,
    SendMessageRequest, UpdateConversationRequest, UserDto, UserSearchParams,
};
use crate::config::ApiConfig;
use crate::domain::foundation::{ConversationId, UserId};
use crate::domain::messaging::{
    Attachment, Conversation, ConversationDraft, Message, MessageDraft, MessagingError,
    NetworkError, SelectedFile, ServerRejection, UploadError, UserSummary,
};
use crate::ports::{
    ConversationGateway, ConversationUpdate, FileUploader, MessageGateway, ProgressReporter,
    SeenGateway, UserDirectory, UserSearchQuery,
};

/// Size of the body chunks handed to the transport during upload.
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Messaging API client.
pub struct HttpMessagingClient {
    client: Client,
    upload_client: Client,
    base_url: String,
    session_token: Option<Secret<String>>,
    request_timeout: Duration,
    upload_timeout: Duration,
    chunk_size: usize,
}

impl HttpMessagingClient {
    /// Creates a client from API configuration.
    ///
    /// # Errors
    ///
    /// - `NetworkError::Connection` if the TLS backend cannot be initialised
    pub fn new(config: &ApiConfig) -> Result<Self, MessagingError> {
        let build = |timeout: Duration| {
            Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| NetworkError::Connection(format!("Failed to create HTTP client: {}", e)))
        };

        Ok(Self {
            client: build(config.request_timeout())?,
            upload_client: build(config.upload_timeout())?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session_token: config.session_token.clone(),
            request_timeout: config.request_timeout(),
            upload_timeout: config.upload_timeout(),
            chunk_size: UPLOAD_CHUNK_SIZE,
        })
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder, viewer: &UserId) -> RequestBuilder {
        match &self.session_token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder.bearer_auth(viewer.as_str()),
        }
    }

    /// Sends a request and maps transport failures.
    async fn send(
        &self,
        builder: RequestBuilder,
        timeout: Duration,
    ) -> Result<Response, NetworkError> {
        builder.send().await.map_err(|e| {
            if e.is_timeout() {
                NetworkError::Timeout {
                    timeout_secs: timeout.as_secs(),
                }
            } else if e.is_connect() {
                NetworkError::Connection(format!("Connection failed: {}", e))
            } else {
                NetworkError::Connection(e.to_string())
            }
        })
    }

    /// Sends a request expecting a 2xx response.
    async fn execute(
        &self,
        builder: RequestBuilder,
        conversation: Option<&ConversationId>,
    ) -> Result<Response, MessagingError> {
        let response = self.send(builder, self.request_timeout).await?;
        Self::handle_response_status(response, conversation).await
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        conversation: Option<&ConversationId>,
    ) -> Result<T, MessagingError> {
        let response = self.execute(builder, conversation).await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, MessagingError> {
        response
            .json::<T>()
            .await
            .map_err(|e| NetworkError::Decode(format!("Failed to parse response: {}", e)).into())
    }

    /// Maps a non-2xx response onto the messaging error taxonomy.
    async fn handle_response_status(
        response: Response,
        conversation: Option<&ConversationId>,
    ) -> Result<Response, MessagingError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!(status = %status, body = %body, "Messaging API returned an error");
        Err(Self::error_for(status, &body, conversation))
    }

    fn error_for(
        status: StatusCode,
        body: &str,
        conversation: Option<&ConversationId>,
    ) -> MessagingError {
        let parsed = serde_json::from_str::<ErrorResponse>(body).ok();
        let message = parsed
            .as_ref()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| body.to_string());

        match (status, conversation) {
            (StatusCode::NOT_FOUND, Some(id)) => MessagingError::NotFound(*id),
            (StatusCode::PAYLOAD_TOO_LARGE, _) => UploadError::Rejected(message).into(),
            (StatusCode::BAD_REQUEST | StatusCode::FORBIDDEN | StatusCode::CONFLICT, _)
                if parsed.is_some() =>
            {
                let rejection = ServerRejection::new(status.as_u16(), message);
                match parsed.and_then(|e| e.field) {
                    Some(field) => rejection.with_field(field).into(),
                    None => rejection.into(),
                }
            }
            _ => NetworkError::Status {
                status: status.as_u16(),
                body: body.to_string(),
            }
            .into(),
        }
    }
}

#[async_trait]
impl ConversationGateway for HttpMessagingClient {
    async fn list_conversations(&self, viewer: &UserId) -> Result<Vec<Conversation>, MessagingError> {
        let request = self.authorized(self.client.get(self.url("/conversations")), viewer);
        let body: Vec<ConversationDto> = self.execute_json(request, None).await?;
        Ok(body.into_iter().map(Conversation::from).collect())
    }

    async fn create_conversation(
        &self,
        viewer: &UserId,
        draft: &ConversationDraft,
    ) -> Result<Conversation, MessagingError> {
        let payload = CreateConversationRequest {
            title: draft.title().map(str::to_string),
            is_group: draft.is_group(),
            participant_ids: draft.participant_ids().to_vec(),
            initial_message: draft.initial_message().map(str::to_string),
        };
        let request = self
            .authorized(self.client.post(self.url("/conversations")), viewer)
            .json(&payload);
        let body: ConversationDto = self.execute_json(request, None).await?;
        Ok(body.into())
    }

    async fn get_conversation(
        &self,
        viewer: &UserId,
        id: &ConversationId,
    ) -> Result<Conversation, MessagingError> {
        let request = self.authorized(
            self.client.get(self.url(&format!("/conversations/{}", id))),
            viewer,
        );
        let body: ConversationDto = self.execute_json(request, Some(id)).await?;
        Ok(body.into())
    }

    async fn update_conversation(
        &self,
        viewer: &UserId,
        id: &ConversationId,
        update: &ConversationUpdate,
    ) -> Result<Conversation, MessagingError> {
        let payload = match update {
            ConversationUpdate::Rename { title } => UpdateConversationRequest {
                title: Some(title.clone()),
                participant_ids: None,
            },
            ConversationUpdate::SetParticipants { participant_ids } => UpdateConversationRequest {
                title: None,
                participant_ids: Some(participant_ids.clone()),
            },
        };
        let request = self
            .authorized(
                self.client.patch(self.url(&format!("/conversations/{}", id))),
                viewer,
            )
            .json(&payload);
        let body: ConversationDto = self.execute_json(request, Some(id)).await?;
        Ok(body.into())
    }

    async fn delete_conversation(
        &self,
        viewer: &UserId,
        id: &ConversationId,
    ) -> Result<(), MessagingError> {
        let request = self.authorized(
            self.client.delete(self.url(&format!("/conversations/{}", id))),
            viewer,
        );
        self.execute(request, Some(id)).await?;
        Ok(())
    }
}

#[async_trait]
impl MessageGateway for HttpMessagingClient {
    async fn list_messages(
        &self,
        viewer: &UserId,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, MessagingError> {
        let request = self.authorized(
            self.client
                .get(self.url(&format!("/conversations/{}/messages", conversation_id))),
            viewer,
        );
        let body: Vec<MessageDto> = self.execute_json(request, Some(conversation_id)).await?;
        Ok(body.into_iter().map(Message::from).collect())
    }

    async fn send_message(
        &self,
        viewer: &UserId,
        conversation_id: &ConversationId,
        draft: &MessageDraft,
    ) -> Result<Message, MessagingError> {
        let payload = SendMessageRequest {
            content: draft.content().to_string(),
            file_id: draft.attachment_id().copied(),
        };
        let request = self
            .authorized(
                self.client
                    .post(self.url(&format!("/conversations/{}/messages", conversation_id))),
                viewer,
            )
            .json(&payload);
        let body: MessageDto = self.execute_json(request, Some(conversation_id)).await?;
        Ok(body.into())
    }
}

#[async_trait]
impl SeenGateway for HttpMessagingClient {
    async fn mark_seen(
        &self,
        viewer: &UserId,
        conversation_id: &ConversationId,
    ) -> Result<(), MessagingError> {
        let request = self.authorized(
            self.client
                .post(self.url(&format!("/conversations/{}/seen", conversation_id))),
            viewer,
        );
        self.execute(request, Some(conversation_id)).await?;
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for HttpMessagingClient {
    async fn search_users(
        &self,
        viewer: &UserId,
        query: &UserSearchQuery,
    ) -> Result<Vec<UserSummary>, MessagingError> {
        let params = UserSearchParams {
            q: query.text.clone(),
            role: query.role.as_ref().map(|r| r.as_str().to_string()),
            establishment_id: query
                .establishment_id
                .as_ref()
                .map(|e| e.as_str().to_string()),
        };
        let request = self
            .authorized(self.client.get(self.url("/users/search")), viewer)
            .query(&params);
        let body: Vec<UserDto> = self.execute_json(request, None).await?;
        Ok(body.into_iter().map(UserSummary::from).collect())
    }
}

#[async_trait]
impl FileUploader for HttpMessagingClient {
    async fn upload(
        &self,
        viewer: &UserId,
        file: &SelectedFile,
        progress: ProgressReporter,
    ) -> Result<Attachment, MessagingError> {
        let total = file.size_bytes();
        let mut chunks = Vec::new();
        let mut offset: u64 = 0;
        for chunk in file.data().chunks(self.chunk_size) {
            offset += chunk.len() as u64;
            chunks.push((chunk.to_vec(), offset));
        }

        // Progress follows the bytes the transport pulls from the body.
        let reporter = progress.clone();
        let body = stream::iter(chunks.into_iter().map(move |(chunk, sent)| {
            reporter.report_bytes(sent, total);
            Ok::<Vec<u8>, std::io::Error>(chunk)
        }));

        let part = multipart::Part::stream_with_length(reqwest::Body::wrap_stream(body), total)
            .file_name(file.name().to_string())
            .mime_str(file.mime_type())
            .map_err(|e| UploadError::Rejected(format!("invalid content type: {}", e)))?;
        let form = multipart::Form::new().part("file", part);

        let request = self
            .authorized(self.upload_client.post(self.url("/upload")), viewer)
            .multipart(form);

        let response = self
            .send(request, self.upload_timeout)
            .await
            .map_err(|e| match e {
                NetworkError::Timeout { .. } => MessagingError::from(e),
                other => UploadError::Transfer(other.to_string()).into(),
            })?;
        let response = Self::handle_response_status(response, None)
            .await
            .map_err(|e| match e {
                MessagingError::Network(network) => {
                    warn!(error = %network, "Upload rejected by the messaging API");
                    UploadError::Transfer(network.to_string()).into()
                }
                other => other,
            })?;
        let body: AttachmentDto = Self::decode(response).await?;

        progress.complete();
        Ok(body.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::ErrorCode;

    fn client(token: Option<&str>) -> HttpMessagingClient {
        let config = ApiConfig {
            base_url: "http://api.school.test/".to_string(),
            session_token: token.map(|t| Secret::new(t.to_string())),
            ..ApiConfig::default()
        };
        HttpMessagingClient::new(&config).unwrap()
    }

    fn auth_header(client: &HttpMessagingClient, viewer: &str) -> String {
        let request = client
            .authorized(client.client.get(client.url("/conversations")), &UserId::new(viewer).unwrap())
            .build()
            .unwrap();
        request.headers()["authorization"].to_str().unwrap().to_string()
    }

    #[test]
    fn trailing_slash_is_trimmed_from_base_url() {
        assert_eq!(client(None).url("/upload"), "http://api.school.test/upload");
    }

    #[test]
    fn viewer_id_is_bearer_without_session_token() {
        assert_eq!(auth_header(&client(None), "teacher-1"), "Bearer teacher-1");
    }

    #[test]
    fn session_token_takes_precedence() {
        assert_eq!(auth_header(&client(Some("tok")), "teacher-1"), "Bearer tok");
    }

    #[test]
    fn not_found_maps_to_conversation() {
        let id = ConversationId::new();
        let err = HttpMessagingClient::error_for(StatusCode::NOT_FOUND, "", Some(&id));
        assert_eq!(err, MessagingError::NotFound(id));
    }

    #[test]
    fn validation_body_keeps_field() {
        let body = r#"{"code":"VALIDATION_FAILED","message":"title is required","field":"title"}"#;
        let err = HttpMessagingClient::error_for(StatusCode::BAD_REQUEST, body, None);
        assert_eq!(err.field(), Some("title"));
        assert_eq!(err.code(), ErrorCode::ValidationFailed);
        assert!(!err.is_client_side());
    }

    #[test]
    fn server_refusals_are_not_client_side() {
        let forbidden = r#"{"code":"FORBIDDEN","message":"direct"}"#;
        let conflict = r#"{"code":"INVALID_STATE_TRANSITION","message":"busy"}"#;
        for (status, body) in [
            (StatusCode::FORBIDDEN, forbidden),
            (StatusCode::CONFLICT, conflict),
        ] {
            let err = HttpMessagingClient::error_for(status, body, None);
            assert!(
                matches!(&err, MessagingError::Rejected(r) if r.status == status.as_u16()),
                "{:?}",
                err
            );
            assert!(!err.is_client_side());
        }
    }

    #[test]
    fn forbidden_and_too_large_map_to_domain_errors() {
        let body = r#"{"code":"FORBIDDEN","message":"direct"}"#;
        assert_eq!(
            HttpMessagingClient::error_for(StatusCode::FORBIDDEN, body, None).code(),
            ErrorCode::Forbidden
        );
        assert!(matches!(
            HttpMessagingClient::error_for(StatusCode::PAYLOAD_TOO_LARGE, "too big", None),
            MessagingError::Upload(UploadError::Rejected(_))
        ));
    }

    #[test]
    fn unexpected_status_keeps_body() {
        let err = HttpMessagingClient::error_for(StatusCode::BAD_GATEWAY, "upstream down", None);
        assert_eq!(
            err,
            MessagingError::Network(NetworkError::Status {
                status: 502,
                body: "upstream down".to_string()
            })
        );
    }
}

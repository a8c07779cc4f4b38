//! Wire types of the messaging API.
//!
//! Field names are camelCase on the wire. Both the reqwest client and the
//! reference server use these types, so the two cannot drift apart.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    AttachmentId, ConversationId, EstablishmentId, MessageId, Timestamp, UserId,
};
use crate::domain::messaging::{
    Attachment, Conversation, Message, MessagingError, Participant, Role, UserSummary,
};

// ════════════════════════════════════════════════════════════════════════════════
// Resources
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub email: String,
    pub role: Role,
}

impl From<&UserSummary> for UserDto {
    fn from(user: &UserSummary) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
        }
    }
}

impl From<UserDto> for UserSummary {
    fn from(dto: UserDto) -> Self {
        UserSummary::new(dto.id, dto.name, dto.email, dto.role)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantDto {
    pub user: UserDto,
}

/// Upload response and message attachment: `{id, name, type, size, url}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentDto {
    pub id: AttachmentId,
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: u64,
    pub url: String,
}

impl From<&Attachment> for AttachmentDto {
    fn from(attachment: &Attachment) -> Self {
        Self {
            id: attachment.id,
            name: attachment.name.clone(),
            mime_type: attachment.mime_type.clone(),
            size: attachment.size_bytes,
            url: attachment.url.clone(),
        }
    }
}

impl From<AttachmentDto> for Attachment {
    fn from(dto: AttachmentDto) -> Self {
        Attachment {
            id: dto.id,
            name: dto.name,
            mime_type: dto.mime_type,
            size_bytes: dto.size,
            url: dto.url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: String,
    pub created_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachmentDto>,
}

impl From<&Message> for MessageDto {
    fn from(message: &Message) -> Self {
        Self {
            id: *message.id(),
            conversation_id: *message.conversation_id(),
            sender_id: message.sender_id().clone(),
            content: message.content().to_string(),
            created_at: *message.created_at(),
            attachment: message.attachment().map(AttachmentDto::from),
        }
    }
}

impl From<MessageDto> for Message {
    fn from(dto: MessageDto) -> Self {
        Message::reconstitute(
            dto.id,
            dto.conversation_id,
            dto.sender_id,
            dto.content,
            dto.created_at,
            dto.attachment.map(Attachment::from),
        )
    }
}

/// Conversation with nested participants and its latest message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDto {
    pub id: ConversationId,
    #[serde(default)]
    pub title: Option<String>,
    pub is_group: bool,
    pub last_message_at: Timestamp,
    pub created_at: Timestamp,
    pub participants: Vec<ParticipantDto>,
    #[serde(default)]
    pub messages: Vec<MessageDto>,
}

impl From<&Conversation> for ConversationDto {
    fn from(conversation: &Conversation) -> Self {
        Self {
            id: *conversation.id(),
            title: conversation.title().map(str::to_string),
            is_group: conversation.is_group(),
            last_message_at: *conversation.last_message_at(),
            created_at: *conversation.created_at(),
            participants: conversation
                .participants()
                .iter()
                .map(|p| ParticipantDto {
                    user: UserDto::from(&p.user),
                })
                .collect(),
            messages: conversation.messages().iter().map(MessageDto::from).collect(),
        }
    }
}

impl From<ConversationDto> for Conversation {
    fn from(dto: ConversationDto) -> Self {
        let id = dto.id;
        Conversation::reconstitute(
            id,
            dto.title,
            dto.is_group,
            dto.last_message_at,
            dto.created_at,
            dto.participants
                .into_iter()
                .map(|p| Participant {
                    conversation_id: id,
                    user: p.user.into(),
                })
                .collect(),
            dto.messages.into_iter().map(Message::from).collect(),
        )
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Requests
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    #[serde(default)]
    pub title: Option<String>,
    pub is_group: bool,
    pub participant_ids: Vec<UserId>,
    #[serde(default)]
    pub initial_message: Option<String>,
}

/// PATCH body: either a new title or the complete roster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateConversationRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_ids: Option<Vec<UserId>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<AttachmentId>,
}

/// Query string of `GET /users/search`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSearchParams {
    #[serde(default)]
    pub q: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub establishment_id: Option<String>,
}

impl UserSearchParams {
    pub fn establishment(&self) -> Option<EstablishmentId> {
        self.establishment_id
            .as_deref()
            .and_then(|id| EstablishmentId::new(id).ok())
    }

    pub fn role(&self) -> Option<Role> {
        self.role
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .map(Role::from)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Errors
// ════════════════════════════════════════════════════════════════════════════════

/// Error body of every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl From<&MessagingError> for ErrorResponse {
    fn from(error: &MessagingError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
            field: error.field().map(str::to_string),
        }
    }
}

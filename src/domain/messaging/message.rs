//! Message entity and ordering rules.
//!
//! Messages are immutable once persisted. Within a conversation `created_at`
//! defines a total order; ties keep arrival order.

use serde::{Deserialize, Serialize};

use super::Attachment;
use crate::domain::foundation::{
    AttachmentId, ConversationId, MessageId, Timestamp, UserId, ValidationError,
};

/// A persisted message.
///
/// # Invariants
///
/// - Belongs to exactly one conversation
/// - `content` is non-blank unless an attachment is present
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    conversation_id: ConversationId,
    sender_id: UserId,
    content: String,
    created_at: Timestamp,
    attachment: Option<Attachment>,
}

impl Message {
    /// Creates a message from a validated draft.
    pub fn from_draft(
        conversation_id: ConversationId,
        sender_id: UserId,
        draft: &MessageDraft,
        attachment: Option<Attachment>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: MessageId::new(),
            conversation_id,
            sender_id,
            content: draft.content().to_string(),
            created_at,
            attachment,
        }
    }

    /// Reconstitutes a message from the wire (no validation).
    pub fn reconstitute(
        id: MessageId,
        conversation_id: ConversationId,
        sender_id: UserId,
        content: String,
        created_at: Timestamp,
        attachment: Option<Attachment>,
    ) -> Self {
        Self {
            id,
            conversation_id,
            sender_id,
            content,
            created_at,
            attachment,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn id(&self) -> &MessageId {
        &self.id
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn sender_id(&self) -> &UserId {
        &self.sender_id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn created_at(&self) -> &Timestamp {
        &self.created_at
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    /// Case-insensitive substring match on the content.
    pub fn content_matches(&self, needle_lowercase: &str) -> bool {
        self.content.to_lowercase().contains(needle_lowercase)
    }
}

/// Validated input for sending a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDraft {
    content: String,
    attachment_id: Option<AttachmentId>,
}

impl MessageDraft {
    /// # Errors
    ///
    /// - `EmptyField("content")` if content is blank and no attachment is given
    pub fn new(
        content: impl Into<String>,
        attachment_id: Option<AttachmentId>,
    ) -> Result<Self, ValidationError> {
        let content = content.into().trim().to_string();
        if content.is_empty() && attachment_id.is_none() {
            return Err(ValidationError::empty_field("content"));
        }
        Ok(Self {
            content,
            attachment_id,
        })
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn attachment_id(&self) -> Option<&AttachmentId> {
        self.attachment_id.as_ref()
    }
}

/// Sorts ascending by `created_at`. Stable, so ties keep arrival order.
pub fn sort_chronologically(messages: &mut [Message]) {
    messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
}

/// Position at which a message arriving now belongs.
///
/// After every existing message with the same or an earlier timestamp, so
/// inserting there yields the same order a full re-fetch would.
pub fn insertion_index(messages: &[Message], created_at: &Timestamp) -> usize {
    messages.partition_point(|m| m.created_at <= *created_at)
}

/// Whether the avatar and sender name header is shown above `messages[index]`.
///
/// Only the first message of a run from the same sender gets a header.
pub fn starts_sender_run(messages: &[Message], index: usize) -> bool {
    match index {
        0 => true,
        i => match (messages.get(i - 1), messages.get(i)) {
            (Some(prev), Some(cur)) => prev.sender_id != cur.sender_id,
            _ => true,
        },
    }
}

//! Conversation gateway port.
//!
//! Covers the conversation endpoints of the messaging API: list, create,
//! get, update (rename or roster) and delete.
//!
//! # Design
//!
//! - **Viewer-scoped**: every call names the acting user explicitly
//! - **Server order trusted**: listings come back newest activity first

use async_trait::async_trait;

use crate::domain::foundation::{ConversationId, UserId};
use crate::domain::messaging::{Conversation, ConversationDraft, MessagingError};

/// Partial update of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationUpdate {
    /// New title for a group.
    Rename { title: String },
    /// Complete desired roster of a group.
    SetParticipants { participant_ids: Vec<UserId> },
}

/// Port for conversation persistence owned by the messaging API.
#[async_trait]
pub trait ConversationGateway: Send + Sync {
    /// Conversations the viewer participates in, ordered by
    /// `last_message_at` descending.
    async fn list_conversations(&self, viewer: &UserId) -> Result<Vec<Conversation>, MessagingError>;

    /// Creates a conversation with the viewer as creator. A draft's initial
    /// message is persisted atomically with the conversation.
    async fn create_conversation(
        &self,
        viewer: &UserId,
        draft: &ConversationDraft,
    ) -> Result<Conversation, MessagingError>;

    /// Loads one conversation with its participants.
    ///
    /// # Errors
    ///
    /// - `NotFound` if missing or not accessible to the viewer
    async fn get_conversation(
        &self,
        viewer: &UserId,
        id: &ConversationId,
    ) -> Result<Conversation, MessagingError>;

    /// Applies a rename or roster update and returns the new state.
    async fn update_conversation(
        &self,
        viewer: &UserId,
        id: &ConversationId,
        update: &ConversationUpdate,
    ) -> Result<Conversation, MessagingError>;

    /// Deletes a conversation.
    async fn delete_conversation(
        &self,
        viewer: &UserId,
        id: &ConversationId,
    ) -> Result<(), MessagingError>;
}

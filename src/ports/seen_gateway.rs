//! Seen-marker port.

use async_trait::async_trait;

use crate::domain::foundation::{ConversationId, UserId};
use crate::domain::messaging::MessagingError;

/// Port for recording that a viewer has seen a conversation.
#[async_trait]
pub trait SeenGateway: Send + Sync {
    /// Marks the conversation seen as of now. Idempotent.
    async fn mark_seen(
        &self,
        viewer: &UserId,
        conversation_id: &ConversationId,
    ) -> Result<(), MessagingError>;
}

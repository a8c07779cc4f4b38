//! Message gateway port.

use async_trait::async_trait;

use crate::domain::foundation::{ConversationId, UserId};
use crate::domain::messaging::{Message, MessageDraft, MessagingError};

/// Port for reading and appending messages of one conversation.
#[async_trait]
pub trait MessageGateway: Send + Sync {
    /// Full history, ascending by `created_at`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the conversation is missing or inaccessible
    async fn list_messages(
        &self,
        viewer: &UserId,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, MessagingError>;

    /// Persists a message and advances the conversation's `last_message_at`.
    async fn send_message(
        &self,
        viewer: &UserId,
        conversation_id: &ConversationId,
        draft: &MessageDraft,
    ) -> Result<Message, MessagingError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_gateway_is_object_safe() {
        fn _accepts_dyn(_gateway: &dyn MessageGateway) {}
    }
}

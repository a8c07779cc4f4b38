//! Per-user, per-conversation seen markers.

use serde::{Deserialize, Serialize};

use super::Conversation;
use crate::domain::foundation::{ConversationId, Timestamp, UserId};

/// High-water mark of how far a participant has viewed a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenMarker {
    pub user_id: UserId,
    pub conversation_id: ConversationId,
    pub seen_at: Timestamp,
}

impl SeenMarker {
    pub fn new(user_id: UserId, conversation_id: ConversationId, seen_at: Timestamp) -> Self {
        Self {
            user_id,
            conversation_id,
            seen_at,
        }
    }

    /// Moves the marker forward. Returns false if `at` would regress it.
    pub fn advance(&mut self, at: Timestamp) -> bool {
        if at.is_after(&self.seen_at) {
            self.seen_at = at;
            true
        } else {
            false
        }
    }

    /// True when the conversation has activity newer than this marker.
    pub fn is_behind(&self, conversation: &Conversation) -> bool {
        conversation.last_message_at().is_after(&self.seen_at)
    }
}

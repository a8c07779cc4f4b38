//! ConversationDirectory - the viewer's conversation list.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::domain::foundation::{ConversationId, UserId};
use crate::domain::messaging::{
    Conversation, ConversationDraft, MessagingError, RoleRouter, SeenMarker, Viewer,
};
use crate::ports::ConversationGateway;

/// Command to start a conversation.
#[derive(Debug, Clone, Default)]
pub struct CreateConversationCommand {
    pub is_group: bool,
    pub title: Option<String>,
    /// Other participants; the viewer is always included.
    pub participant_ids: Vec<UserId>,
    pub initial_message: Option<String>,
}

impl CreateConversationCommand {
    pub fn group(title: impl Into<String>, participant_ids: Vec<UserId>) -> Self {
        Self {
            is_group: true,
            title: Some(title.into()),
            participant_ids,
            initial_message: None,
        }
    }

    pub fn direct(other: UserId) -> Self {
        Self {
            is_group: false,
            title: None,
            participant_ids: vec![other],
            initial_message: None,
        }
    }

    pub fn with_initial_message(mut self, message: impl Into<String>) -> Self {
        self.initial_message = Some(message.into());
        self
    }
}

/// Load state of the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryStatus {
    NotLoaded,
    Loaded,
    /// Last load failed; the list is shown empty.
    Failed(String),
}

struct DirectoryState {
    conversations: Vec<Conversation>,
    status: DirectoryStatus,
}

/// Conversation list of one viewer.
pub struct ConversationDirectory {
    gateway: Arc<dyn ConversationGateway>,
    state: Mutex<DirectoryState>,
}

impl ConversationDirectory {
    pub fn new(gateway: Arc<dyn ConversationGateway>) -> Self {
        Self {
            gateway,
            state: Mutex::new(DirectoryState {
                conversations: Vec::new(),
                status: DirectoryStatus::NotLoaded,
            }),
        }
    }

    /// Fetches the viewer's conversations, most recently active first.
    ///
    /// The server order is kept as-is.
    pub async fn list(&self, viewer: &Viewer) -> Result<Vec<Conversation>, MessagingError> {
        debug!(user_id = %viewer.id, "Listing conversations");
        match self.gateway.list_conversations(&viewer.id).await {
            Ok(conversations) => {
                let mut state = self.lock();
                state.conversations = conversations.clone();
                state.status = DirectoryStatus::Loaded;
                Ok(conversations)
            }
            Err(e) => {
                warn!(user_id = %viewer.id, error = %e, "Failed to list conversations");
                let mut state = self.lock();
                state.conversations.clear();
                state.status = DirectoryStatus::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Current directory entries.
    pub fn conversations(&self) -> Vec<Conversation> {
        self.lock().conversations.clone()
    }

    pub fn status(&self) -> DirectoryStatus {
        self.lock().status.clone()
    }

    /// Filters `conversations` by resolved title or message content.
    ///
    /// An empty query returns the list unchanged.
    pub fn search(conversations: &[Conversation], viewer_id: &UserId, query: &str) -> Vec<Conversation> {
        conversations
            .iter()
            .filter(|c| c.matches_query(viewer_id, query))
            .cloned()
            .collect()
    }

    /// [`ConversationDirectory::search`] over the current entries.
    pub fn filtered(&self, viewer_id: &UserId, query: &str) -> Vec<Conversation> {
        Self::search(&self.lock().conversations, viewer_id, query)
    }

    /// Creates a conversation and puts it at the top of the directory.
    ///
    /// Direct conversations are not de-duplicated: starting a second one
    /// with the same user creates a distinct record.
    ///
    /// # Errors
    ///
    /// - `Validation` before any request for an empty roster or a blank
    ///   group title
    pub async fn create_conversation(
        &self,
        viewer: &Viewer,
        cmd: CreateConversationCommand,
    ) -> Result<Conversation, MessagingError> {
        let draft = ConversationDraft::new(
            &viewer.id,
            cmd.is_group,
            cmd.title,
            cmd.participant_ids,
            cmd.initial_message,
        )?;

        let conversation = self.gateway.create_conversation(&viewer.id, &draft).await?;
        info!(
            conversation_id = %conversation.id(),
            is_group = conversation.is_group(),
            participants = conversation.participants().len(),
            "Conversation created"
        );

        let mut state = self.lock();
        state.conversations.retain(|c| c.id() != conversation.id());
        state.conversations.insert(0, conversation.clone());
        Ok(conversation)
    }

    /// Deletes a conversation and drops it from the directory.
    pub async fn delete_conversation(
        &self,
        viewer: &Viewer,
        conversation_id: &ConversationId,
    ) -> Result<(), MessagingError> {
        self.gateway
            .delete_conversation(&viewer.id, conversation_id)
            .await?;
        info!(conversation_id = %conversation_id, "Conversation deleted");
        self.lock().conversations.retain(|c| c.id() != conversation_id);
        Ok(())
    }

    /// Replaces a directory entry after it changed elsewhere.
    pub fn upsert(&self, conversation: Conversation) {
        let mut state = self.lock();
        match state.conversations.iter_mut().find(|c| c.id() == conversation.id()) {
            Some(existing) => *existing = conversation,
            None => state.conversations.insert(0, conversation),
        }
    }

    /// Whether the conversation has activity the viewer has not seen.
    ///
    /// Without a marker, any message counts as unseen.
    pub fn unread(conversation: &Conversation, marker: Option<&SeenMarker>) -> bool {
        match marker {
            Some(marker) => marker.is_behind(conversation),
            None => conversation.last_message().is_some(),
        }
    }

    /// Where to navigate to open `conversation_id`.
    pub fn thread_url(
        viewer: &Viewer,
        conversation_id: &ConversationId,
    ) -> Result<String, MessagingError> {
        RoleRouter::thread_url(&viewer.role, conversation_id, viewer.establishment_id.as_ref())
            .map_err(MessagingError::from)
    }

    fn lock(&self) -> MutexGuard<'_, DirectoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

//! In-memory messaging backend.
//!
//! Implements every messaging port over process-local state. It backs the
//! reference HTTP server and the application tests.
//!
//! Features:
//! - Participant-scoped access (non-participants get `NotFound`)
//! - Request counting per operation, for asserting on network traffic
//! - One-shot failure injection per operation
//! - Chunked uploads that report progress per chunk received

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::domain::foundation::{
    AttachmentId, ConversationId, EstablishmentId, Timestamp, UserId, ValidationError,
};
use crate::domain::messaging::{
    Attachment, Conversation, ConversationDraft, Message, MessageDraft, MessagingError,
    NetworkError, SeenMarker, SelectedFile, UploadError, UploadPolicy, UserSummary,
};
use crate::ports::{
    ConversationGateway, ConversationUpdate, FileUploader, MessageGateway, ProgressReporter,
    SeenGateway, UserDirectory, UserSearchQuery,
};

/// Bytes "received" between two progress reports.
const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// Operations the backend counts and can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOperation {
    ListConversations,
    CreateConversation,
    GetConversation,
    UpdateConversation,
    DeleteConversation,
    ListMessages,
    SendMessage,
    MarkSeen,
    SearchUsers,
    Upload,
}

#[derive(Debug, Clone)]
struct StoredFile {
    attachment: Attachment,
    data: Vec<u8>,
    uploaded_by: UserId,
}

#[derive(Default)]
struct BackendState {
    users: HashMap<UserId, UserSummary>,
    memberships: HashMap<UserId, Vec<EstablishmentId>>,
    conversations: HashMap<ConversationId, Conversation>,
    messages: HashMap<ConversationId, Vec<Message>>,
    seen: HashMap<(UserId, ConversationId), SeenMarker>,
    files: HashMap<AttachmentId, StoredFile>,
    request_counts: HashMap<BackendOperation, usize>,
    search_log: Vec<UserSearchQuery>,
    fail_next: HashSet<BackendOperation>,
}

/// Process-local implementation of all messaging ports.
pub struct InMemoryMessagingBackend {
    state: RwLock<BackendState>,
    policy: UploadPolicy,
    public_base_url: String,
    chunk_size: usize,
}

impl InMemoryMessagingBackend {
    /// Creates an empty backend whose file URLs start with `public_base_url`.
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(BackendState::default()),
            policy: UploadPolicy::default(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_upload_policy(mut self, policy: UploadPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Registers a user that can be addressed and can act.
    pub fn with_user(self, user: UserSummary) -> Self {
        self.add_user(user, Vec::new());
        self
    }

    /// Registers a user belonging to the given establishments.
    pub fn with_user_in(self, user: UserSummary, establishments: Vec<EstablishmentId>) -> Self {
        self.add_user(user, establishments);
        self
    }

    pub fn add_user(&self, user: UserSummary, establishments: Vec<EstablishmentId>) {
        let mut state = self.write();
        state.memberships.insert(user.id.clone(), establishments);
        state.users.insert(user.id.clone(), user);
    }

    pub fn upload_policy(&self) -> &UploadPolicy {
        &self.policy
    }

    // === Test Helpers ===

    /// Makes the next call of `operation` fail with a network error.
    pub fn fail_next(&self, operation: BackendOperation) {
        self.write().fail_next.insert(operation);
    }

    /// Number of requests received for `operation`.
    pub fn request_count(&self, operation: BackendOperation) -> usize {
        self.read()
            .request_counts
            .get(&operation)
            .copied()
            .unwrap_or(0)
    }

    /// Every user search received, oldest first.
    pub fn search_log(&self) -> Vec<UserSearchQuery> {
        self.read().search_log.clone()
    }

    pub fn seen_marker(&self, user: &UserId, conversation: &ConversationId) -> Option<SeenMarker> {
        self.read()
            .seen
            .get(&(user.clone(), *conversation))
            .cloned()
    }

    /// Stored attachment and its content.
    pub fn file(&self, id: &AttachmentId) -> Option<(Attachment, Vec<u8>)> {
        self.read()
            .files
            .get(id)
            .map(|f| (f.attachment.clone(), f.data.clone()))
    }

    pub fn conversation_count(&self) -> usize {
        self.read().conversations.len()
    }

    // === Internals ===

    fn read(&self) -> RwLockReadGuard<'_, BackendState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BackendState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Counts the request and consumes an injected failure, if any.
    fn begin(&self, operation: BackendOperation) -> Result<(), MessagingError> {
        let mut state = self.write();
        *state.request_counts.entry(operation).or_insert(0) += 1;
        if state.fail_next.remove(&operation) {
            return Err(match operation {
                BackendOperation::Upload => {
                    UploadError::Transfer("connection reset during upload".to_string()).into()
                }
                _ => NetworkError::Connection("injected failure".to_string()).into(),
            });
        }
        Ok(())
    }

    fn user(state: &BackendState, id: &UserId) -> Result<UserSummary, MessagingError> {
        state.users.get(id).cloned().ok_or_else(|| {
            ValidationError::invalid_format("participant_ids", format!("unknown user {}", id))
                .into()
        })
    }

    fn accessible<'a>(
        state: &'a BackendState,
        viewer: &UserId,
        id: &ConversationId,
    ) -> Result<&'a Conversation, MessagingError> {
        state
            .conversations
            .get(id)
            .filter(|c| c.has_participant(viewer))
            .ok_or(MessagingError::NotFound(*id))
    }
}

#[async_trait]
impl ConversationGateway for InMemoryMessagingBackend {
    async fn list_conversations(&self, viewer: &UserId) -> Result<Vec<Conversation>, MessagingError> {
        self.begin(BackendOperation::ListConversations)?;
        let state = self.read();
        let mut listed: Vec<Conversation> = state
            .conversations
            .values()
            .filter(|c| c.has_participant(viewer))
            .cloned()
            .map(Conversation::with_latest_message_only)
            .collect();
        listed.sort_by(|a, b| {
            b.last_message_at()
                .cmp(a.last_message_at())
                .then_with(|| b.created_at().cmp(a.created_at()))
        });
        Ok(listed)
    }

    async fn create_conversation(
        &self,
        viewer: &UserId,
        draft: &ConversationDraft,
    ) -> Result<Conversation, MessagingError> {
        self.begin(BackendOperation::CreateConversation)?;
        let mut state = self.write();

        let creator = Self::user(&state, viewer)?;
        let others = draft
            .participant_ids()
            .iter()
            .map(|id| Self::user(&state, id))
            .collect::<Result<Vec<_>, _>>()?;

        let now = Timestamp::now();
        let mut conversation = Conversation::create(creator, draft, others, now)?;
        let mut history = Vec::new();

        if let Some(text) = draft.initial_message() {
            let message_draft = MessageDraft::new(text, None)?;
            let message = Message::from_draft(
                *conversation.id(),
                viewer.clone(),
                &message_draft,
                None,
                now,
            );
            conversation.record_message(message.clone());
            history.push(message);
        }

        let id = *conversation.id();
        state.messages.insert(id, history);
        state
            .conversations
            .insert(id, conversation.clone().with_latest_message_only());
        Ok(conversation)
    }

    async fn get_conversation(
        &self,
        viewer: &UserId,
        id: &ConversationId,
    ) -> Result<Conversation, MessagingError> {
        self.begin(BackendOperation::GetConversation)?;
        let state = self.read();
        Ok(Self::accessible(&state, viewer, id)?
            .clone()
            .with_latest_message_only())
    }

    async fn update_conversation(
        &self,
        viewer: &UserId,
        id: &ConversationId,
        update: &ConversationUpdate,
    ) -> Result<Conversation, MessagingError> {
        self.begin(BackendOperation::UpdateConversation)?;
        let mut state = self.write();
        let mut conversation = Self::accessible(&state, viewer, id)?.clone();

        match update {
            ConversationUpdate::Rename { title } => conversation.rename(title)?,
            ConversationUpdate::SetParticipants { participant_ids } => {
                let users = participant_ids
                    .iter()
                    .map(|uid| Self::user(&state, uid))
                    .collect::<Result<Vec<_>, _>>()?;
                conversation.replace_participants(users)?;
            }
        }

        state.conversations.insert(*id, conversation.clone());
        Ok(conversation.with_latest_message_only())
    }

    async fn delete_conversation(
        &self,
        viewer: &UserId,
        id: &ConversationId,
    ) -> Result<(), MessagingError> {
        self.begin(BackendOperation::DeleteConversation)?;
        let mut state = self.write();
        Self::accessible(&state, viewer, id)?;
        state.conversations.remove(id);
        state.messages.remove(id);
        state.seen.retain(|(_, conversation), _| conversation != id);
        Ok(())
    }
}

#[async_trait]
impl MessageGateway for InMemoryMessagingBackend {
    async fn list_messages(
        &self,
        viewer: &UserId,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, MessagingError> {
        self.begin(BackendOperation::ListMessages)?;
        let state = self.read();
        Self::accessible(&state, viewer, conversation_id)?;
        Ok(state
            .messages
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_message(
        &self,
        viewer: &UserId,
        conversation_id: &ConversationId,
        draft: &MessageDraft,
    ) -> Result<Message, MessagingError> {
        self.begin(BackendOperation::SendMessage)?;
        let mut state = self.write();
        let mut conversation = Self::accessible(&state, viewer, conversation_id)?.clone();

        let attachment = match draft.attachment_id() {
            None => None,
            Some(file_id) => {
                let stored = state
                    .files
                    .get(file_id)
                    .filter(|f| f.uploaded_by == *viewer)
                    .ok_or_else(|| {
                        ValidationError::invalid_format("file_id", format!("unknown file {}", file_id))
                    })?;
                Some(stored.attachment.clone())
            }
        };

        // Never earlier than the conversation's latest activity.
        let created_at = Timestamp::now().latest(*conversation.last_message_at());
        let message = Message::from_draft(
            *conversation_id,
            viewer.clone(),
            draft,
            attachment,
            created_at,
        );

        conversation.record_message(message.clone());
        // Full history lives in `messages`; the record only embeds the latest.
        state
            .conversations
            .insert(*conversation_id, conversation.with_latest_message_only());
        state
            .messages
            .entry(*conversation_id)
            .or_default()
            .push(message.clone());
        Ok(message)
    }
}

#[async_trait]
impl SeenGateway for InMemoryMessagingBackend {
    async fn mark_seen(
        &self,
        viewer: &UserId,
        conversation_id: &ConversationId,
    ) -> Result<(), MessagingError> {
        self.begin(BackendOperation::MarkSeen)?;
        let mut state = self.write();
        Self::accessible(&state, viewer, conversation_id)?;
        let now = Timestamp::now();
        state
            .seen
            .entry((viewer.clone(), *conversation_id))
            .and_modify(|marker| {
                marker.advance(now);
            })
            .or_insert_with(|| SeenMarker::new(viewer.clone(), *conversation_id, now));
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for InMemoryMessagingBackend {
    async fn search_users(
        &self,
        viewer: &UserId,
        query: &UserSearchQuery,
    ) -> Result<Vec<UserSummary>, MessagingError> {
        self.write().search_log.push(query.clone());
        self.begin(BackendOperation::SearchUsers)?;
        let state = self.read();
        let needle = query.text.trim().to_lowercase();

        let mut found: Vec<UserSummary> = state
            .users
            .values()
            .filter(|u| u.id != *viewer)
            .filter(|u| {
                u.email.to_lowercase().contains(&needle)
                    || u
                        .name
                        .as_deref()
                        .is_some_and(|n| n.to_lowercase().contains(&needle))
            })
            .filter(|u| query.role.as_ref().map_or(true, |role| u.role == *role))
            .filter(|u| {
                query.establishment_id.as_ref().map_or(true, |est| {
                    state
                        .memberships
                        .get(&u.id)
                        .is_some_and(|ests| ests.contains(est))
                })
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.display_name().cmp(b.display_name()));
        Ok(found)
    }
}

#[async_trait]
impl FileUploader for InMemoryMessagingBackend {
    async fn upload(
        &self,
        viewer: &UserId,
        file: &SelectedFile,
        progress: ProgressReporter,
    ) -> Result<Attachment, MessagingError> {
        self.begin(BackendOperation::Upload)?;
        self.policy
            .check(file.name(), file.mime_type(), file.size_bytes())?;

        let total = file.size_bytes();
        let mut received: Vec<u8> = Vec::with_capacity(file.data().len());
        for chunk in file.data().chunks(self.chunk_size) {
            received.extend_from_slice(chunk);
            progress.report_bytes(received.len() as u64, total);
            tokio::task::yield_now().await;
        }

        let id = AttachmentId::new();
        let attachment = Attachment {
            id,
            name: file.name().to_string(),
            mime_type: file.mime_type().to_string(),
            size_bytes: total,
            url: format!("{}/files/{}", self.public_base_url, id),
        };
        self.write().files.insert(
            id,
            StoredFile {
                attachment: attachment.clone(),
                data: received,
                uploaded_by: viewer.clone(),
            },
        );
        progress.complete();
        Ok(attachment)
    }
}

//! ConversationSession - one open thread.
//!
//! Ties the message list, composer, attachment pipeline, roster and seen
//! marking of a single conversation together and exposes the rendered
//! [`SessionView`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{
    AttachmentPipeline, AttachmentState, ComposerPhase, MessageRow, MessageStore,
    ParticipantRoster, PendingRemoval, ReadTracker, RosterEntry, SearchSettings, UserSearch,
};
use crate::domain::foundation::{ConversationId, UserId};
use crate::domain::messaging::{
    Conversation, Message, MessagingError, SelectedFile, UploadPolicy, Viewer,
};
use crate::ports::{ConversationGateway, FileUploader, MessageGateway, SeenGateway, UserDirectory};

/// The collaborators a session talks to.
#[derive(Clone)]
pub struct MessagingServices {
    pub conversations: Arc<dyn ConversationGateway>,
    pub messages: Arc<dyn MessageGateway>,
    pub users: Arc<dyn UserDirectory>,
    pub uploader: Arc<dyn FileUploader>,
    pub read_tracker: Arc<ReadTracker>,
    pub upload_policy: UploadPolicy,
    pub search: SearchSettings,
}

impl MessagingServices {
    /// Wires every port to one backend.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: ConversationGateway + MessageGateway + SeenGateway + UserDirectory + FileUploader + 'static,
    {
        Self {
            conversations: backend.clone(),
            messages: backend.clone(),
            users: backend.clone(),
            uploader: backend.clone(),
            read_tracker: Arc::new(ReadTracker::new(backend)),
            upload_policy: UploadPolicy::default(),
            search: SearchSettings::default(),
        }
    }

    pub fn with_upload_policy(mut self, policy: UploadPolicy) -> Self {
        self.upload_policy = policy;
        self
    }

    pub fn with_search_settings(mut self, settings: SearchSettings) -> Self {
        self.search = settings;
        self
    }
}

/// Result of opening a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Opened,
    /// The conversation is gone or not accessible; show the directory.
    ReturnToDirectory,
}

/// Composer part of the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposerView {
    pub phase: ComposerPhase,
    pub attachment: AttachmentState,
    pub accept: String,
}

/// Everything needed to render the thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub title: String,
    pub is_group: bool,
    pub participants: Vec<RosterEntry>,
    pub rows: Vec<MessageRow>,
    pub composer: ComposerView,
}

/// Holds the composer in `Sending` for the whole send, attachment upload
/// included, and releases it when the send finishes or is dropped.
struct SendInFlight<'a>(&'a AtomicBool);

impl Drop for SendInFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// One open conversation for one viewer.
pub struct ConversationSession {
    viewer: Viewer,
    conversation_id: ConversationId,
    services: MessagingServices,
    conversation: Mutex<Option<Conversation>>,
    store: MessageStore,
    attachments: AttachmentPipeline,
    roster: ParticipantRoster,
    user_search: UserSearch,
    sending: AtomicBool,
}

impl ConversationSession {
    pub fn new(viewer: Viewer, conversation_id: ConversationId, services: MessagingServices) -> Self {
        Self {
            store: MessageStore::new(conversation_id, services.messages.clone()),
            attachments: AttachmentPipeline::new(
                services.uploader.clone(),
                services.upload_policy.clone(),
            ),
            roster: ParticipantRoster::new(services.conversations.clone()),
            user_search: UserSearch::new(services.users.clone(), services.search),
            conversation: Mutex::new(None),
            sending: AtomicBool::new(false),
            viewer,
            conversation_id,
            services,
        }
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    /// Loaded conversation, once opened.
    pub fn conversation(&self) -> Option<Conversation> {
        self.lock().clone()
    }

    /// Loads the conversation and its messages, then marks it seen.
    ///
    /// A message-load or mark-seen failure leaves the session open in a
    /// degraded state.
    pub async fn open(&self) -> Result<SessionOutcome, MessagingError> {
        let conversation = match self
            .services
            .conversations
            .get_conversation(&self.viewer.id, &self.conversation_id)
            .await
        {
            Ok(conversation) => conversation,
            Err(MessagingError::NotFound(id)) => {
                warn!(conversation_id = %id, "Conversation not found, returning to directory");
                return Ok(SessionOutcome::ReturnToDirectory);
            }
            Err(e) => return Err(e),
        };
        *self.lock() = Some(conversation);

        match self.store.load_messages(&self.viewer).await {
            Ok(_) => self.mark_seen().await,
            Err(MessagingError::NotFound(_)) => {
                *self.lock() = None;
                return Ok(SessionOutcome::ReturnToDirectory);
            }
            Err(_) => {}
        }
        Ok(SessionOutcome::Opened)
    }

    /// Reloads the message history.
    pub async fn refresh(&self) -> Result<Vec<Message>, MessagingError> {
        let messages = self.store.load_messages(&self.viewer).await?;
        self.mark_seen().await;
        Ok(messages)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Composer
    // ─────────────────────────────────────────────────────────────────────

    pub fn select_file(&self, file: SelectedFile) -> Result<(), MessagingError> {
        self.attachments.select_file(file)
    }

    pub fn cancel_attachment(&self) -> Result<(), MessagingError> {
        self.attachments.cancel()
    }

    pub fn upload_progress(&self) -> mpsc::UnboundedReceiver<u8> {
        self.attachments.progress_events()
    }

    /// Sends the composer content, uploading a selected file first.
    ///
    /// If the upload fails the message is not sent and the file stays
    /// selected for a retry.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` while a send is in flight
    /// - `Upload` if the attachment could not be uploaded
    /// - everything [`MessageStore::send_message`] returns
    pub async fn send(&self, content: &str) -> Result<Message, MessagingError> {
        if self.store.is_sending()
            || self
                .sending
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
        {
            return Err(MessagingError::invalid_transition(
                "a message is already being sent",
            ));
        }
        let _in_flight = SendInFlight(&self.sending);
        let attachment = self.attachments.ensure_uploaded(&self.viewer).await?;
        let message = self
            .store
            .send_message(&self.viewer, content, attachment.map(|a| a.id))
            .await?;
        self.attachments.mark_sent();

        {
            let mut slot = self.lock();
            if let Some(conversation) = slot.as_mut() {
                conversation.record_message(message.clone());
            }
        }
        self.mark_seen().await;
        Ok(message)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Roster
    // ─────────────────────────────────────────────────────────────────────

    pub async fn rename(&self, new_title: &str) -> Result<Conversation, MessagingError> {
        let current = self.require_conversation()?;
        let updated = self.roster.rename_group(&self.viewer, &current, new_title).await?;
        self.replace_conversation(updated.clone());
        Ok(updated)
    }

    pub async fn add_participant(&self, user_id: &UserId) -> Result<Conversation, MessagingError> {
        let current = self.require_conversation()?;
        let updated = self
            .roster
            .add_participant(&self.viewer, &current, user_id)
            .await?;
        self.user_search.clear();
        self.replace_conversation(updated.clone());
        Ok(updated)
    }

    pub fn request_removal(&self, user_id: &UserId) -> Result<PendingRemoval, MessagingError> {
        let current = self.require_conversation()?;
        self.roster.request_removal(&self.viewer, &current, user_id)
    }

    pub async fn confirm_removal(
        &self,
        pending: PendingRemoval,
    ) -> Result<Conversation, MessagingError> {
        let updated = self.roster.confirm_removal(&self.viewer, pending).await?;
        self.replace_conversation(updated.clone());
        Ok(updated)
    }

    /// Participant picker search; current members are excluded.
    pub fn user_search(&self) -> &UserSearch {
        &self.user_search
    }

    /// Current participant ids, for [`UserSearch::search`] exclusion.
    pub fn participant_ids(&self) -> Vec<UserId> {
        self.lock()
            .as_ref()
            .map(Conversation::participant_ids)
            .unwrap_or_default()
    }

    // ─────────────────────────────────────────────────────────────────────
    // View
    // ─────────────────────────────────────────────────────────────────────

    /// Rendered thread. `None` until opened.
    pub fn view(&self) -> Option<SessionView> {
        let conversation = self.lock().clone()?;
        let display = ParticipantRoster::resolve_display(&conversation, &self.viewer.id);
        Some(SessionView {
            title: display.title(),
            is_group: display.is_group(),
            participants: ParticipantRoster::entries(&conversation, &self.viewer.id),
            rows: self.store.rows(&self.viewer),
            composer: ComposerView {
                phase: self.composer_phase(),
                attachment: self.attachments.state(),
                accept: self.attachments.accept_filter(),
            },
        })
    }

    /// `Sending` from the moment a send starts, including while its
    /// attachment is still uploading.
    pub fn composer_phase(&self) -> ComposerPhase {
        if self.sending.load(Ordering::SeqCst) {
            ComposerPhase::Sending
        } else {
            self.store.phase()
        }
    }

    /// Tears the session down: stops any upload and pending search.
    pub fn close(&self) {
        debug!(conversation_id = %self.conversation_id, "Closing conversation session");
        self.attachments.shutdown();
        self.user_search.clear();
    }

    async fn mark_seen(&self) {
        let messages = self.store.messages();
        // failures are logged by the tracker
        let _ = self
            .services
            .read_tracker
            .observe(&self.viewer, &self.conversation_id, &messages)
            .await;
    }

    fn require_conversation(&self) -> Result<Conversation, MessagingError> {
        self.lock()
            .clone()
            .ok_or_else(|| MessagingError::invalid_transition("conversation is not open"))
    }

    fn replace_conversation(&self, updated: Conversation) {
        let mut slot = self.lock();
        let messages = slot
            .as_ref()
            .map(|c| c.messages().to_vec())
            .unwrap_or_default();
        let mut updated = updated;
        for message in messages {
            updated.record_message(message);
        }
        *slot = Some(updated);
    }

    fn lock(&self) -> MutexGuard<'_, Option<Conversation>> {
        self.conversation.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ConversationSession {
    fn drop(&mut self) {
        self.close();
    }
}

//! MessageStore - message history and sending for one conversation.
//!
//! Keeps the local list in the order a full re-fetch would produce, shows
//! an optimistic pending entry while a send is in flight, and allows one
//! send at a time per composer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::domain::foundation::{
    AttachmentId, ConversationId, MessageId, StateMachine, Timestamp,
};
use crate::domain::messaging::{
    sort_chronologically, starts_sender_run, Message, MessageDraft, MessagingError, Viewer,
};
use crate::ports::MessageGateway;

/// Composer phases. One send in flight at most.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposerPhase {
    Ready,
    Sending,
}

impl StateMachine for ComposerPhase {
    fn can_transition_to(&self, target: &Self) -> bool {
        use ComposerPhase::*;
        matches!((self, target), (Ready, Sending) | (Sending, Ready))
    }

    fn valid_transitions(&self) -> Vec<Self> {
        match self {
            ComposerPhase::Ready => vec![ComposerPhase::Sending],
            ComposerPhase::Sending => vec![ComposerPhase::Ready],
        }
    }
}

/// Delivery state of a locally known message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Optimistic entry; the send has not been acknowledged yet.
    Pending,
    Sent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEntry {
    pub message: Message,
    pub status: DeliveryStatus,
}

/// Outcome of the last history load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    NotLoaded,
    Loaded,
    Failed(String),
}

/// One rendered row of the message list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRow {
    pub message: Message,
    pub status: DeliveryStatus,
    /// Avatar and sender name shown above this row.
    pub show_header: bool,
    pub is_own: bool,
}

struct StoreState {
    /// Sent entries in chronological order, then pending entries.
    entries: Vec<MessageEntry>,
    phase: ComposerPhase,
    load: LoadStatus,
}

/// Messages of one conversation.
pub struct MessageStore {
    conversation_id: ConversationId,
    gateway: Arc<dyn MessageGateway>,
    state: Mutex<StoreState>,
}

/// Clears the pending entry and reopens the composer, including when the
/// send future is dropped mid-flight.
struct InFlight<'a> {
    store: &'a MessageStore,
    local_id: MessageId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.store.lock();
        state
            .entries
            .retain(|e| !(e.status == DeliveryStatus::Pending && *e.message.id() == self.local_id));
        state.phase = ComposerPhase::Ready;
    }
}

impl MessageStore {
    pub fn new(conversation_id: ConversationId, gateway: Arc<dyn MessageGateway>) -> Self {
        Self {
            conversation_id,
            gateway,
            state: Mutex::new(StoreState {
                entries: Vec::new(),
                phase: ComposerPhase::Ready,
                load: LoadStatus::NotLoaded,
            }),
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    /// Fetches the full history, ascending by `created_at`.
    ///
    /// On a network failure the list is left as it was and the load status
    /// records the failure.
    pub async fn load_messages(&self, viewer: &Viewer) -> Result<Vec<Message>, MessagingError> {
        debug!(conversation_id = %self.conversation_id, "Loading messages");
        let mut messages = match self
            .gateway
            .list_messages(&viewer.id, &self.conversation_id)
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                warn!(conversation_id = %self.conversation_id, error = %e, "Failed to load messages");
                self.lock().load = LoadStatus::Failed(e.to_string());
                return Err(e);
            }
        };
        sort_chronologically(&mut messages);

        let mut state = self.lock();
        let pending: Vec<MessageEntry> = state
            .entries
            .drain(..)
            .filter(|e| e.status == DeliveryStatus::Pending)
            .collect();
        state.entries = messages
            .iter()
            .cloned()
            .map(|message| MessageEntry {
                message,
                status: DeliveryStatus::Sent,
            })
            .chain(pending)
            .collect();
        state.load = LoadStatus::Loaded;
        Ok(messages)
    }

    /// Sends a message and appends it locally.
    ///
    /// # Errors
    ///
    /// - `Validation` if content is blank and there is no attachment
    /// - `InvalidTransition` if another send from this composer is in flight
    /// - `Network` / `NotFound` from the gateway; nothing is appended
    pub async fn send_message(
        &self,
        viewer: &Viewer,
        content: &str,
        attachment_id: Option<AttachmentId>,
    ) -> Result<Message, MessagingError> {
        let draft = MessageDraft::new(content, attachment_id)?;
        let in_flight = self.begin_send(viewer, &draft)?;

        let result = self
            .gateway
            .send_message(&viewer.id, &self.conversation_id, &draft)
            .await;
        drop(in_flight);

        match result {
            Ok(message) => {
                info!(
                    conversation_id = %self.conversation_id,
                    message_id = %message.id(),
                    has_attachment = message.attachment().is_some(),
                    "Message sent"
                );
                self.insert_sent(message.clone());
                Ok(message)
            }
            Err(e) => {
                warn!(conversation_id = %self.conversation_id, error = %e, "Failed to send message");
                Err(e)
            }
        }
    }

    /// Acknowledged messages in display order.
    pub fn messages(&self) -> Vec<Message> {
        self.lock()
            .entries
            .iter()
            .filter(|e| e.status == DeliveryStatus::Sent)
            .map(|e| e.message.clone())
            .collect()
    }

    /// Every entry including optimistic ones.
    pub fn entries(&self) -> Vec<MessageEntry> {
        self.lock().entries.clone()
    }

    /// Rows with consecutive-sender grouping applied.
    pub fn rows(&self, viewer: &Viewer) -> Vec<MessageRow> {
        let entries = self.entries();
        let messages: Vec<Message> = entries.iter().map(|e| e.message.clone()).collect();
        entries
            .into_iter()
            .enumerate()
            .map(|(i, entry)| MessageRow {
                show_header: starts_sender_run(&messages, i),
                is_own: *entry.message.sender_id() == viewer.id,
                message: entry.message,
                status: entry.status,
            })
            .collect()
    }

    pub fn phase(&self) -> ComposerPhase {
        self.lock().phase
    }

    pub fn is_sending(&self) -> bool {
        self.phase() == ComposerPhase::Sending
    }

    pub fn load_status(&self) -> LoadStatus {
        self.lock().load.clone()
    }

    fn begin_send(
        &self,
        viewer: &Viewer,
        draft: &MessageDraft,
    ) -> Result<InFlight<'_>, MessagingError> {
        let mut state = self.lock();
        state.phase = state
            .phase
            .transition_to(ComposerPhase::Sending)
            .map_err(|_| MessagingError::invalid_transition("a message is already being sent"))?;

        let optimistic = Message::from_draft(
            self.conversation_id,
            viewer.id.clone(),
            draft,
            None,
            Timestamp::now(),
        );
        let local_id = *optimistic.id();
        state.entries.push(MessageEntry {
            message: optimistic,
            status: DeliveryStatus::Pending,
        });
        Ok(InFlight {
            store: self,
            local_id,
        })
    }

    fn insert_sent(&self, message: Message) {
        let mut state = self.lock();
        if state.entries.iter().any(|e| e.message.id() == message.id()) {
            return;
        }
        let at = state.entries.partition_point(|e| {
            e.status == DeliveryStatus::Sent && e.message.created_at() <= message.created_at()
        });
        state.entries.insert(
            at,
            MessageEntry {
                message,
                status: DeliveryStatus::Sent,
            },
        );
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::UserId;
    use crate::domain::messaging::{NetworkError, Role};
    use async_trait::async_trait;
    use tokio::sync::Notify;

    struct MockMessageGateway {
        history: Mutex<Vec<Message>>,
        sends: Mutex<usize>,
        gate: Option<Arc<Notify>>,
        fail_send: bool,
    }

    impl MockMessageGateway {
        fn new() -> Self {
            Self {
                history: Mutex::new(Vec::new()),
                sends: Mutex::new(0),
                gate: None,
                fail_send: false,
            }
        }

        fn with_history(history: Vec<Message>) -> Self {
            Self {
                history: Mutex::new(history),
                ..Self::new()
            }
        }

        fn gated(gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::new()
            }
        }

        fn send_count(&self) -> usize {
            *self.sends.lock().unwrap()
        }
    }

    #[async_trait]
    impl MessageGateway for MockMessageGateway {
        async fn list_messages(
            &self,
            _viewer: &UserId,
            _conversation_id: &ConversationId,
        ) -> Result<Vec<Message>, MessagingError> {
            Ok(self.history.lock().unwrap().clone())
        }

        async fn send_message(
            &self,
            viewer: &UserId,
            conversation_id: &ConversationId,
            draft: &MessageDraft,
        ) -> Result<Message, MessagingError> {
            *self.sends.lock().unwrap() += 1;
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail_send {
                return Err(NetworkError::Status {
                    status: 500,
                    body: "boom".into(),
                }
                .into());
            }
            let message =
                Message::from_draft(*conversation_id, viewer.clone(), draft, None, Timestamp::now());
            self.history.lock().unwrap().push(message.clone());
            Ok(message)
        }
    }

    fn viewer() -> Viewer {
        Viewer::new(UserId::new("me").unwrap(), Role::Student)
    }

    fn message_from(sender: &str, content: &str, at: Timestamp, conversation: ConversationId) -> Message {
        Message::reconstitute(
            MessageId::new(),
            conversation,
            UserId::new(sender).unwrap(),
            content.into(),
            at,
            None,
        )
    }

    #[tokio::test]
    async fn load_sorts_ascending() {
        let conversation = ConversationId::new();
        let t = Timestamp::now();
        let gateway = Arc::new(MockMessageGateway::with_history(vec![
            message_from("a", "third", t.plus_millis(20), conversation),
            message_from("b", "first", t, conversation),
            message_from("a", "second", t.plus_millis(10), conversation),
        ]));
        let store = MessageStore::new(conversation, gateway);

        let loaded = store.load_messages(&viewer()).await.unwrap();
        let contents: Vec<_> = loaded.iter().map(|m| m.content().to_string()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
        assert_eq!(store.load_status(), LoadStatus::Loaded);
    }

    #[tokio::test]
    async fn empty_send_is_rejected_without_request() {
        let gateway = Arc::new(MockMessageGateway::new());
        let store = MessageStore::new(ConversationId::new(), gateway.clone());

        let err = store.send_message(&viewer(), "  ", None).await.unwrap_err();
        assert!(matches!(err, MessagingError::Validation(_)));
        assert_eq!(gateway.send_count(), 0);
        assert!(!store.is_sending());
    }

    #[tokio::test]
    async fn sent_message_is_appended_and_matches_refetch() {
        let gateway = Arc::new(MockMessageGateway::new());
        let conversation = ConversationId::new();
        let store = MessageStore::new(conversation, gateway.clone());

        store.send_message(&viewer(), "one", None).await.unwrap();
        store.send_message(&viewer(), "two", None).await.unwrap();
        let local = store.messages();

        let fresh = MessageStore::new(conversation, gateway);
        let refetched = fresh.load_messages(&viewer()).await.unwrap();
        assert_eq!(local, refetched);
    }

    #[tokio::test]
    async fn second_send_while_in_flight_is_rejected() {
        let gate = Arc::new(Notify::new());
        let gateway = Arc::new(MockMessageGateway::gated(gate.clone()));
        let store = Arc::new(MessageStore::new(ConversationId::new(), gateway.clone()));

        let first = {
            let store = store.clone();
            tokio::spawn(async move { store.send_message(&viewer(), "first", None).await })
        };
        while !store.is_sending() {
            tokio::task::yield_now().await;
        }

        let entries = store.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, DeliveryStatus::Pending);

        let err = store.send_message(&viewer(), "second", None).await.unwrap_err();
        assert!(matches!(err, MessagingError::InvalidTransition(_)));

        gate.notify_one();
        first.await.unwrap().unwrap();
        assert!(!store.is_sending());
        assert_eq!(gateway.send_count(), 1);

        let entries = store.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, DeliveryStatus::Sent);
        assert_eq!(entries[0].message.content(), "first");
    }

    #[tokio::test]
    async fn failed_send_removes_pending_and_reopens_composer() {
        let gateway = Arc::new(MockMessageGateway {
            fail_send: true,
            ..MockMessageGateway::new()
        });
        let store = MessageStore::new(ConversationId::new(), gateway);

        let err = store.send_message(&viewer(), "hello", None).await.unwrap_err();
        assert!(matches!(err, MessagingError::Network(_)));
        assert!(store.entries().is_empty());
        assert_eq!(store.phase(), ComposerPhase::Ready);
    }

    #[tokio::test]
    async fn dropped_send_reopens_composer() {
        let gate = Arc::new(Notify::new());
        let gateway = Arc::new(MockMessageGateway::gated(gate));
        let store = Arc::new(MessageStore::new(ConversationId::new(), gateway));

        let task = {
            let store = store.clone();
            tokio::spawn(async move { store.send_message(&viewer(), "lost", None).await })
        };
        while !store.is_sending() {
            tokio::task::yield_now().await;
        }
        task.abort();
        let _ = task.await;

        assert!(!store.is_sending());
        assert!(store.entries().is_empty());
    }

    #[tokio::test]
    async fn rows_group_consecutive_senders() {
        let conversation = ConversationId::new();
        let t = Timestamp::now();
        let gateway = Arc::new(MockMessageGateway::with_history(vec![
            message_from("bob", "1", t, conversation),
            message_from("bob", "2", t.plus_millis(1), conversation),
            message_from("me", "3", t.plus_millis(2), conversation),
        ]));
        let store = MessageStore::new(conversation, gateway);
        store.load_messages(&viewer()).await.unwrap();

        let rows = store.rows(&viewer());
        let headers: Vec<_> = rows.iter().map(|r| r.show_header).collect();
        let own: Vec<_> = rows.iter().map(|r| r.is_own).collect();
        assert_eq!(headers, vec![true, false, true]);
        assert_eq!(own, vec![false, false, true]);
    }

    #[test]
    fn composer_phase_edges() {
        assert!(ComposerPhase::Ready.can_transition_to(&ComposerPhase::Sending));
        assert!(ComposerPhase::Sending
            .transition_to(ComposerPhase::Sending)
            .is_err());
    }
}

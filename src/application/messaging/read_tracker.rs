//! ReadTracker - marks conversations seen as their message list is shown.
//!
//! Fires once per viewing change: a different conversation, or a different
//! latest message. Re-rendering the same list issues no request.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use crate::domain::foundation::{ConversationId, MessageId, Timestamp};
use crate::domain::messaging::{Message, MessagingError, SeenMarker, Viewer};
use crate::ports::SeenGateway;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Observation {
    conversation_id: ConversationId,
    latest_message: Option<MessageId>,
}

#[derive(Default)]
struct TrackerState {
    last: Option<Observation>,
    markers: HashMap<ConversationId, SeenMarker>,
}

/// Seen-marking for one viewer.
pub struct ReadTracker {
    gateway: Arc<dyn SeenGateway>,
    state: Mutex<TrackerState>,
}

impl ReadTracker {
    pub fn new(gateway: Arc<dyn SeenGateway>) -> Self {
        Self {
            gateway,
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Called whenever the message list of `conversation_id` is displayed
    /// or updated. Returns whether a mark-seen request was issued.
    ///
    /// A failed request is logged and returned; the observation still
    /// counts, so the same view does not re-issue it.
    pub async fn observe(
        &self,
        viewer: &Viewer,
        conversation_id: &ConversationId,
        messages: &[Message],
    ) -> Result<bool, MessagingError> {
        let observation = Observation {
            conversation_id: *conversation_id,
            latest_message: messages.last().map(|m| *m.id()),
        };

        {
            let mut state = self.lock();
            if state.last.as_ref() == Some(&observation) {
                return Ok(false);
            }
            state.last = Some(observation);
        }

        debug!(conversation_id = %conversation_id, "Marking conversation seen");
        if let Err(e) = self.gateway.mark_seen(&viewer.id, conversation_id).await {
            warn!(conversation_id = %conversation_id, error = %e, "Failed to mark conversation seen");
            return Err(e);
        }

        let seen_at = messages
            .last()
            .map(|m| *m.created_at())
            .unwrap_or_else(Timestamp::now);
        let mut state = self.lock();
        state
            .markers
            .entry(*conversation_id)
            .and_modify(|marker| {
                marker.advance(seen_at);
            })
            .or_insert_with(|| SeenMarker::new(viewer.id.clone(), *conversation_id, seen_at));
        Ok(true)
    }

    /// Local high-water mark for a conversation, if it has been marked.
    pub fn marker(&self, conversation_id: &ConversationId) -> Option<SeenMarker> {
        self.lock().markers.get(conversation_id).cloned()
    }

    /// Forgets the current view so the next observation fires again.
    pub fn reset(&self) {
        self.lock().last = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::UserId;
    use crate::domain::messaging::{NetworkError, Role};
    use async_trait::async_trait;

    struct MockSeenGateway {
        calls: Mutex<Vec<ConversationId>>,
        fail: bool,
    }

    impl MockSeenGateway {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl SeenGateway for MockSeenGateway {
        async fn mark_seen(
            &self,
            _viewer: &UserId,
            conversation_id: &ConversationId,
        ) -> Result<(), MessagingError> {
            self.calls.lock().unwrap().push(*conversation_id);
            if self.fail {
                return Err(NetworkError::Connection("down".into()).into());
            }
            Ok(())
        }
    }

    fn viewer() -> Viewer {
        Viewer::new(UserId::new("me").unwrap(), Role::Student)
    }

    fn message(conversation_id: ConversationId, at: Timestamp) -> Message {
        Message::reconstitute(
            MessageId::new(),
            conversation_id,
            UserId::new("bob").unwrap(),
            "hello".into(),
            at,
            None,
        )
    }

    #[tokio::test]
    async fn re_render_does_not_fire_again() {
        let gateway = Arc::new(MockSeenGateway::new());
        let tracker = ReadTracker::new(gateway.clone());
        let conversation = ConversationId::new();
        let messages = vec![message(conversation, Timestamp::now())];

        assert!(tracker.observe(&viewer(), &conversation, &messages).await.unwrap());
        assert!(!tracker.observe(&viewer(), &conversation, &messages).await.unwrap());
        assert!(!tracker.observe(&viewer(), &conversation, &messages).await.unwrap());
        assert_eq!(gateway.call_count(), 1);
    }

    #[tokio::test]
    async fn new_message_fires_again() {
        let gateway = Arc::new(MockSeenGateway::new());
        let tracker = ReadTracker::new(gateway.clone());
        let conversation = ConversationId::new();
        let t = Timestamp::now();
        let mut messages = vec![message(conversation, t)];

        tracker.observe(&viewer(), &conversation, &messages).await.unwrap();
        messages.push(message(conversation, t.plus_millis(5)));
        assert!(tracker.observe(&viewer(), &conversation, &messages).await.unwrap());
        assert_eq!(gateway.call_count(), 2);
        assert_eq!(tracker.marker(&conversation).unwrap().seen_at, t.plus_millis(5));
    }

    #[tokio::test]
    async fn switching_conversation_fires() {
        let gateway = Arc::new(MockSeenGateway::new());
        let tracker = ReadTracker::new(gateway.clone());
        let a = ConversationId::new();
        let b = ConversationId::new();

        tracker.observe(&viewer(), &a, &[]).await.unwrap();
        tracker.observe(&viewer(), &b, &[]).await.unwrap();
        tracker.observe(&viewer(), &a, &[]).await.unwrap();
        assert_eq!(*gateway.calls.lock().unwrap(), vec![a, b, a]);
    }

    #[tokio::test]
    async fn failure_is_surfaced_but_not_retried_for_same_view() {
        let gateway = Arc::new(MockSeenGateway::failing());
        let tracker = ReadTracker::new(gateway.clone());
        let conversation = ConversationId::new();

        let result = tracker.observe(&viewer(), &conversation, &[]).await;
        assert!(matches!(result, Err(MessagingError::Network(_))));
        assert!(!tracker.observe(&viewer(), &conversation, &[]).await.unwrap());
        assert_eq!(gateway.call_count(), 1);
        assert!(tracker.marker(&conversation).is_none());
    }

    #[tokio::test]
    async fn reset_allows_refiring() {
        let gateway = Arc::new(MockSeenGateway::new());
        let tracker = ReadTracker::new(gateway.clone());
        let conversation = ConversationId::new();

        tracker.observe(&viewer(), &conversation, &[]).await.unwrap();
        tracker.reset();
        tracker.observe(&viewer(), &conversation, &[]).await.unwrap();
        assert_eq!(gateway.call_count(), 2);
    }
}

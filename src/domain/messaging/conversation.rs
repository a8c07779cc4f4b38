//! Conversation aggregate.
//!
//! Conversations are either direct (exactly two participants, no title,
//! roster frozen at creation) or group (titled, roster editable). The kind
//! is fixed at creation. Display branches on it in exactly one place,
//! [`Conversation::display`], and every consumer works from the resolved
//! [`ConversationDisplay`].

use serde::{Deserialize, Serialize};

use super::{Message, MessagingError, UserSummary};
use crate::domain::foundation::{ConversationId, Timestamp, UserId, ValidationError};

/// Title shown for a group whose title is blank.
pub const FALLBACK_GROUP_TITLE: &str = "Untitled group";

/// Title shown for a direct conversation whose other side is unresolvable.
pub const FALLBACK_DIRECT_TITLE: &str = "Unknown user";

/// Membership of a user in a conversation.
///
/// Identity is `(conversation_id, user.id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub conversation_id: ConversationId,
    pub user: UserSummary,
}

impl Participant {
    pub fn user_id(&self) -> &UserId {
        &self.user.id
    }
}

/// Resolved display data, computed once per viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationDisplay {
    Group { title: String },
    Direct { other: Option<UserSummary> },
}

impl ConversationDisplay {
    /// Title to render in headers and the directory.
    pub fn title(&self) -> String {
        match self {
            ConversationDisplay::Group { title } if !title.trim().is_empty() => title.clone(),
            ConversationDisplay::Group { .. } => FALLBACK_GROUP_TITLE.to_string(),
            ConversationDisplay::Direct { other: Some(user) } => user.display_name().to_string(),
            ConversationDisplay::Direct { other: None } => FALLBACK_DIRECT_TITLE.to_string(),
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, ConversationDisplay::Group { .. })
    }
}

/// Validated input for creating a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationDraft {
    is_group: bool,
    title: Option<String>,
    participant_ids: Vec<UserId>,
    initial_message: Option<String>,
}

impl ConversationDraft {
    /// `participant_ids` are the *other* participants; the creator is
    /// added by whoever persists the conversation.
    ///
    /// # Errors
    ///
    /// - `EmptyField("participant_ids")` if no participant is given
    /// - `EmptyField("title")` for a group with a blank title
    /// - `InvalidFormat("participant_ids")` for a direct conversation that
    ///   does not name exactly one other user
    pub fn new(
        creator: &UserId,
        is_group: bool,
        title: Option<String>,
        participant_ids: Vec<UserId>,
        initial_message: Option<String>,
    ) -> Result<Self, ValidationError> {
        let mut unique: Vec<UserId> = Vec::with_capacity(participant_ids.len());
        for id in participant_ids {
            if id != *creator && !unique.contains(&id) {
                unique.push(id);
            }
        }
        if unique.is_empty() {
            return Err(ValidationError::empty_field("participant_ids"));
        }

        let title = title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
        if is_group && title.is_none() {
            return Err(ValidationError::empty_field("title"));
        }
        if !is_group && unique.len() != 1 {
            return Err(ValidationError::invalid_format(
                "participant_ids",
                format!(
                    "a direct conversation needs exactly one other participant, got {}",
                    unique.len()
                ),
            ));
        }

        let initial_message = initial_message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());

        Ok(Self {
            is_group,
            title: if is_group { title } else { None },
            participant_ids: unique,
            initial_message,
        })
    }

    pub fn is_group(&self) -> bool {
        self.is_group
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn participant_ids(&self) -> &[UserId] {
        &self.participant_ids
    }

    /// Non-blank first message, sent atomically with creation.
    pub fn initial_message(&self) -> Option<&str> {
        self.initial_message.as_deref()
    }
}

/// A conversation with its roster.
///
/// # Invariants
///
/// - `is_group` never changes after creation
/// - direct conversations have exactly two participants, always
/// - participants are unique by user id
/// - `last_message_at` never decreases
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    id: ConversationId,
    title: Option<String>,
    is_group: bool,
    last_message_at: Timestamp,
    created_at: Timestamp,
    participants: Vec<Participant>,
    /// Messages embedded in listings (at least the latest, when any).
    messages: Vec<Message>,
}

impl Conversation {
    /// Creates a conversation from a validated draft.
    ///
    /// `others` must resolve every id in `draft.participant_ids()`.
    pub fn create(
        creator: UserSummary,
        draft: &ConversationDraft,
        others: Vec<UserSummary>,
        now: Timestamp,
    ) -> Result<Self, ValidationError> {
        if others.len() != draft.participant_ids().len() {
            return Err(ValidationError::invalid_format(
                "participant_ids",
                "unknown participant",
            ));
        }
        let id = ConversationId::new();
        let mut participants = vec![Participant {
            conversation_id: id,
            user: creator,
        }];
        for user in others {
            if !participants.iter().any(|p| p.user.id == user.id) {
                participants.push(Participant {
                    conversation_id: id,
                    user,
                });
            }
        }
        if !draft.is_group() && participants.len() != 2 {
            return Err(ValidationError::invalid_format(
                "participant_ids",
                "a direct conversation has exactly two participants",
            ));
        }

        Ok(Self {
            id,
            title: draft.title().map(str::to_string),
            is_group: draft.is_group(),
            last_message_at: now,
            created_at: now,
            participants,
            messages: Vec::new(),
        })
    }

    /// Reconstitutes a conversation from the wire (no validation).
    pub fn reconstitute(
        id: ConversationId,
        title: Option<String>,
        is_group: bool,
        last_message_at: Timestamp,
        created_at: Timestamp,
        participants: Vec<Participant>,
        messages: Vec<Message>,
    ) -> Self {
        Self {
            id,
            title,
            is_group,
            last_message_at,
            created_at,
            participants,
            messages,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn id(&self) -> &ConversationId {
        &self.id
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn is_group(&self) -> bool {
        self.is_group
    }

    pub fn last_message_at(&self) -> &Timestamp {
        &self.last_message_at
    }

    pub fn created_at(&self) -> &Timestamp {
        &self.created_at
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn participant_ids(&self) -> Vec<UserId> {
        self.participants.iter().map(|p| p.user.id.clone()).collect()
    }

    pub fn has_participant(&self, user_id: &UserId) -> bool {
        self.participants.iter().any(|p| p.user.id == *user_id)
    }

    /// The participant that is not the viewer, for direct conversations.
    pub fn other_participant(&self, viewer_id: &UserId) -> Option<&UserSummary> {
        self.participants
            .iter()
            .map(|p| &p.user)
            .find(|u| u.id != *viewer_id)
    }

    /// Resolves how this conversation is shown to `viewer_id`.
    pub fn display(&self, viewer_id: &UserId) -> ConversationDisplay {
        if self.is_group {
            ConversationDisplay::Group {
                title: self.title.clone().unwrap_or_default(),
            }
        } else {
            ConversationDisplay::Direct {
                other: self.other_participant(viewer_id).cloned(),
            }
        }
    }

    /// Display title for `viewer_id`.
    pub fn title_for(&self, viewer_id: &UserId) -> String {
        self.display(viewer_id).title()
    }

    /// Case-insensitive match on the resolved title or any embedded message.
    pub fn matches_query(&self, viewer_id: &UserId, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.title_for(viewer_id).to_lowercase().contains(&needle)
            || self.messages.iter().any(|m| m.content_matches(&needle))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Records a newly persisted message.
    pub fn record_message(&mut self, message: Message) {
        self.last_message_at = self.last_message_at.latest(*message.created_at());
        if !self.messages.iter().any(|m| m.id() == message.id()) {
            let at = super::insertion_index(&self.messages, message.created_at());
            self.messages.insert(at, message);
        }
    }

    /// Keeps only the latest embedded message, as listings carry.
    pub fn with_latest_message_only(mut self) -> Self {
        if self.messages.len() > 1 {
            let latest = self.messages.split_off(self.messages.len() - 1);
            self.messages = latest;
        }
        self
    }

    /// Renames a group conversation.
    ///
    /// # Errors
    ///
    /// - `Forbidden` for direct conversations
    /// - `Validation` if the title is blank
    pub fn rename(&mut self, new_title: &str) -> Result<(), MessagingError> {
        self.ensure_group("rename")?;
        let title = new_title.trim();
        if title.is_empty() {
            return Err(ValidationError::empty_field("title").into());
        }
        self.title = Some(title.to_string());
        Ok(())
    }

    /// Adds a participant to a group. Adding an existing member is a no-op.
    pub fn add_participant(&mut self, user: UserSummary) -> Result<(), MessagingError> {
        self.ensure_group("add participants to")?;
        if !self.has_participant(&user.id) {
            self.participants.push(Participant {
                conversation_id: self.id,
                user,
            });
        }
        Ok(())
    }

    /// Removes a participant from a group.
    ///
    /// # Errors
    ///
    /// - `Forbidden` for direct conversations
    /// - `Validation` if the user is not a participant or is the last one
    pub fn remove_participant(&mut self, user_id: &UserId) -> Result<(), MessagingError> {
        self.ensure_group("remove participants from")?;
        if !self.has_participant(user_id) {
            return Err(ValidationError::invalid_format(
                "user_id",
                format!("{} is not a participant", user_id),
            )
            .into());
        }
        if self.participants.len() == 1 {
            return Err(ValidationError::invalid_format(
                "participant_ids",
                "a group keeps at least one participant",
            )
            .into());
        }
        self.participants.retain(|p| p.user.id != *user_id);
        Ok(())
    }

    /// Replaces the whole roster of a group.
    pub fn replace_participants(&mut self, users: Vec<UserSummary>) -> Result<(), MessagingError> {
        self.ensure_group("edit the roster of")?;
        let mut participants: Vec<Participant> = Vec::with_capacity(users.len());
        for user in users {
            if !participants.iter().any(|p| p.user.id == user.id) {
                participants.push(Participant {
                    conversation_id: self.id,
                    user,
                });
            }
        }
        if participants.is_empty() {
            return Err(ValidationError::empty_field("participant_ids").into());
        }
        self.participants = participants;
        Ok(())
    }

    fn ensure_group(&self, action: &str) -> Result<(), MessagingError> {
        if self.is_group {
            Ok(())
        } else {
            Err(MessagingError::forbidden(format!(
                "cannot {} a direct conversation",
                action
            )))
        }
    }
}

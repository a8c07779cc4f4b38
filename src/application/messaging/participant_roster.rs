//! ParticipantRoster - display resolution and group roster edits.
//!
//! Removing a participant is two-step: [`ParticipantRoster::request_removal`]
//! checks the rules locally and hands back a [`PendingRemoval`]; only
//! [`ParticipantRoster::confirm_removal`] issues the request.

use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::foundation::{ConversationId, UserId, ValidationError};
use crate::domain::messaging::{
    Conversation, ConversationDisplay, MessagingError, UserSummary, Viewer,
};
use crate::ports::{ConversationGateway, ConversationUpdate};

/// One row of the conversation info panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub user: UserSummary,
    pub display_name: String,
    pub role_label: String,
    pub is_viewer: bool,
    /// Whether the viewer may remove this participant.
    pub removable: bool,
}

/// A removal awaiting explicit confirmation.
///
/// Consumed by [`ParticipantRoster::confirm_removal`]; dropping it
/// abandons the removal.
#[derive(Debug, PartialEq, Eq)]
pub struct PendingRemoval {
    conversation_id: ConversationId,
    user: UserSummary,
    remaining: Vec<UserId>,
}

impl PendingRemoval {
    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    /// The participant about to be removed, for the confirmation prompt.
    pub fn user(&self) -> &UserSummary {
        &self.user
    }
}

/// Roster operations on behalf of a viewer.
pub struct ParticipantRoster {
    gateway: Arc<dyn ConversationGateway>,
}

impl ParticipantRoster {
    pub fn new(gateway: Arc<dyn ConversationGateway>) -> Self {
        Self { gateway }
    }

    /// Display title of `conversation` for `viewer_id`.
    pub fn resolve_title(conversation: &Conversation, viewer_id: &UserId) -> String {
        conversation.title_for(viewer_id)
    }

    pub fn resolve_display(conversation: &Conversation, viewer_id: &UserId) -> ConversationDisplay {
        conversation.display(viewer_id)
    }

    /// Info panel rows, in roster order.
    pub fn entries(conversation: &Conversation, viewer_id: &UserId) -> Vec<RosterEntry> {
        conversation
            .participants()
            .iter()
            .map(|p| {
                let is_viewer = p.user_id() == viewer_id;
                RosterEntry {
                    display_name: p.user.display_name().to_string(),
                    role_label: p.user.role.label().to_string(),
                    is_viewer,
                    removable: conversation.is_group() && !is_viewer,
                    user: p.user.clone(),
                }
            })
            .collect()
    }

    /// Renames a group.
    ///
    /// Direct conversations have no title: the call is a silent no-op that
    /// returns the conversation unchanged.
    ///
    /// # Errors
    ///
    /// - `Validation` before any request if `new_title` is blank
    pub async fn rename_group(
        &self,
        viewer: &Viewer,
        conversation: &Conversation,
        new_title: &str,
    ) -> Result<Conversation, MessagingError> {
        if !conversation.is_group() {
            debug!(conversation_id = %conversation.id(), "Ignoring rename of direct conversation");
            return Ok(conversation.clone());
        }
        let title = new_title.trim();
        if title.is_empty() {
            return Err(ValidationError::empty_field("title").into());
        }

        let updated = self
            .gateway
            .update_conversation(
                &viewer.id,
                conversation.id(),
                &ConversationUpdate::Rename {
                    title: title.to_string(),
                },
            )
            .await?;
        info!(conversation_id = %conversation.id(), "Group renamed");
        Ok(updated)
    }

    /// Adds a user to a group. Adding an existing member issues no request.
    ///
    /// # Errors
    ///
    /// - `Forbidden` before any request for direct conversations
    pub async fn add_participant(
        &self,
        viewer: &Viewer,
        conversation: &Conversation,
        user_id: &UserId,
    ) -> Result<Conversation, MessagingError> {
        if !conversation.is_group() {
            return Err(MessagingError::forbidden(
                "participants can only be added to group conversations",
            ));
        }
        if conversation.has_participant(user_id) {
            return Ok(conversation.clone());
        }

        let mut participant_ids = conversation.participant_ids();
        participant_ids.push(user_id.clone());
        let updated = self
            .gateway
            .update_conversation(
                &viewer.id,
                conversation.id(),
                &ConversationUpdate::SetParticipants { participant_ids },
            )
            .await?;
        info!(conversation_id = %conversation.id(), user_id = %user_id, "Participant added");
        Ok(updated)
    }

    /// First step of removing a participant. Issues no request.
    ///
    /// # Errors
    ///
    /// - `Forbidden` for direct conversations or when `user_id` is the
    ///   viewer
    /// - `Validation` if `user_id` is not a participant
    pub fn request_removal(
        &self,
        viewer: &Viewer,
        conversation: &Conversation,
        user_id: &UserId,
    ) -> Result<PendingRemoval, MessagingError> {
        if !conversation.is_group() {
            return Err(MessagingError::forbidden(
                "participants can only be removed from group conversations",
            ));
        }
        if *user_id == viewer.id {
            return Err(MessagingError::forbidden("you cannot remove yourself"));
        }
        let user = conversation
            .participants()
            .iter()
            .find(|p| p.user_id() == user_id)
            .map(|p| p.user.clone())
            .ok_or_else(|| {
                ValidationError::invalid_format("user_id", format!("{} is not a participant", user_id))
            })?;

        let remaining = conversation
            .participant_ids()
            .into_iter()
            .filter(|id| id != user_id)
            .collect();
        Ok(PendingRemoval {
            conversation_id: *conversation.id(),
            user,
            remaining,
        })
    }

    /// Second step: issues the removal.
    pub async fn confirm_removal(
        &self,
        viewer: &Viewer,
        pending: PendingRemoval,
    ) -> Result<Conversation, MessagingError> {
        let updated = self
            .gateway
            .update_conversation(
                &viewer.id,
                &pending.conversation_id,
                &ConversationUpdate::SetParticipants {
                    participant_ids: pending.remaining,
                },
            )
            .await?;
        info!(
            conversation_id = %pending.conversation_id,
            user_id = %pending.user.id,
            "Participant removed"
        );
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::Timestamp;
    use crate::domain::messaging::{ConversationDraft, Role, FALLBACK_GROUP_TITLE};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records updates and applies them to a stored copy.
    struct MockConversationGateway {
        conversation: Mutex<Conversation>,
        users: Vec<UserSummary>,
        updates: Mutex<Vec<ConversationUpdate>>,
    }

    impl MockConversationGateway {
        fn new(conversation: Conversation, users: Vec<UserSummary>) -> Self {
            Self {
                conversation: Mutex::new(conversation),
                users,
                updates: Mutex::new(Vec::new()),
            }
        }

        fn update_count(&self) -> usize {
            self.updates.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ConversationGateway for MockConversationGateway {
        async fn list_conversations(&self, _viewer: &UserId) -> Result<Vec<Conversation>, MessagingError> {
            Ok(vec![self.conversation.lock().unwrap().clone()])
        }

        async fn create_conversation(
            &self,
            _viewer: &UserId,
            _draft: &ConversationDraft,
        ) -> Result<Conversation, MessagingError> {
            unimplemented!()
        }

        async fn get_conversation(
            &self,
            _viewer: &UserId,
            _id: &ConversationId,
        ) -> Result<Conversation, MessagingError> {
            Ok(self.conversation.lock().unwrap().clone())
        }

        async fn update_conversation(
            &self,
            _viewer: &UserId,
            _id: &ConversationId,
            update: &ConversationUpdate,
        ) -> Result<Conversation, MessagingError> {
            self.updates.lock().unwrap().push(update.clone());
            let mut conversation = self.conversation.lock().unwrap();
            match update {
                ConversationUpdate::Rename { title } => conversation.rename(title)?,
                ConversationUpdate::SetParticipants { participant_ids } => {
                    let users = participant_ids
                        .iter()
                        .filter_map(|id| self.users.iter().find(|u| u.id == *id).cloned())
                        .collect();
                    conversation.replace_participants(users)?;
                }
            }
            Ok(conversation.clone())
        }

        async fn delete_conversation(
            &self,
            _viewer: &UserId,
            _id: &ConversationId,
        ) -> Result<(), MessagingError> {
            Ok(())
        }
    }

    fn user(id: &str, name: Option<&str>, role: Role) -> UserSummary {
        UserSummary::new(
            UserId::new(id).unwrap(),
            name.map(str::to_string),
            format!("{}@school.test", id),
            role,
        )
    }

    fn users() -> Vec<UserSummary> {
        vec![
            user("me", Some("Mrs Teacher"), Role::Teacher),
            user("u1", Some("Ana"), Role::Student),
            user("u2", None, Role::Parent),
            user("u3", Some("Carl"), Role::Staff),
        ]
    }

    fn viewer() -> Viewer {
        Viewer::new(UserId::new("me").unwrap(), Role::Teacher)
    }

    fn group() -> Conversation {
        let all = users();
        let draft = ConversationDraft::new(
            &all[0].id,
            true,
            Some("Club".into()),
            vec![all[1].id.clone(), all[2].id.clone()],
            None,
        )
        .unwrap();
        Conversation::create(all[0].clone(), &draft, vec![all[1].clone(), all[2].clone()], Timestamp::now())
            .unwrap()
    }

    fn direct() -> Conversation {
        let all = users();
        let draft =
            ConversationDraft::new(&all[0].id, false, None, vec![all[2].id.clone()], None).unwrap();
        Conversation::create(all[0].clone(), &draft, vec![all[2].clone()], Timestamp::now()).unwrap()
    }

    fn setup(conversation: Conversation) -> (Arc<MockConversationGateway>, ParticipantRoster) {
        let gateway = Arc::new(MockConversationGateway::new(conversation, users()));
        let roster = ParticipantRoster::new(gateway.clone());
        (gateway, roster)
    }

    #[test]
    fn resolves_titles_for_both_kinds() {
        let me = UserId::new("me").unwrap();
        assert_eq!(ParticipantRoster::resolve_title(&group(), &me), "Club");
        // u2 has no name, falls back to email
        assert_eq!(ParticipantRoster::resolve_title(&direct(), &me), "u2@school.test");
        assert!(ParticipantRoster::resolve_display(&group(), &me).is_group());
    }

    #[test]
    fn entries_carry_role_labels() {
        let me = UserId::new("me").unwrap();
        let entries = ParticipantRoster::entries(&group(), &me);
        let labels: Vec<&str> = entries.iter().map(|e| e.role_label.as_str()).collect();
        assert_eq!(labels, vec!["Teacher", "Student", "Parent"]);
        assert!(entries[0].is_viewer);
        assert!(!entries[0].removable);
        assert!(entries[1].removable);

        let direct_entries = ParticipantRoster::entries(&direct(), &me);
        assert!(direct_entries.iter().all(|e| !e.removable));
    }

    #[tokio::test]
    async fn rename_blank_title_fails_without_request() {
        let (gateway, roster) = setup(group());
        let err = roster.rename_group(&viewer(), &group(), "   ").await.unwrap_err();
        assert_eq!(err.field(), Some("title"));
        assert_eq!(gateway.update_count(), 0);
    }

    #[tokio::test]
    async fn rename_group_updates_title() {
        let (_, roster) = setup(group());
        let updated = roster.rename_group(&viewer(), &group(), " Chess ").await.unwrap();
        assert_eq!(updated.title(), Some("Chess"));
    }

    #[tokio::test]
    async fn rename_direct_is_silent_noop() {
        let conversation = direct();
        let (gateway, roster) = setup(conversation.clone());
        let result = roster.rename_group(&viewer(), &conversation, "New").await.unwrap();
        assert_eq!(result, conversation);
        assert_eq!(gateway.update_count(), 0);
    }

    #[tokio::test]
    async fn add_participant_sends_full_roster() {
        let (gateway, roster) = setup(group());
        let u3 = UserId::new("u3").unwrap();
        let updated = roster.add_participant(&viewer(), &group(), &u3).await.unwrap();

        assert!(updated.has_participant(&u3));
        assert_eq!(updated.participants().len(), 4);
        let updates = gateway.updates.lock().unwrap();
        match &updates[0] {
            ConversationUpdate::SetParticipants { participant_ids } => {
                assert_eq!(participant_ids.len(), 4)
            }
            other => panic!("unexpected update {:?}", other),
        };
    }

    #[tokio::test]
    async fn add_to_direct_is_forbidden() {
        let (gateway, roster) = setup(direct());
        let err = roster
            .add_participant(&viewer(), &direct(), &UserId::new("u3").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, MessagingError::Forbidden(_)));
        assert_eq!(gateway.update_count(), 0);
    }

    #[test]
    fn self_removal_is_rejected_locally() {
        let (gateway, roster) = setup(group());
        let err = roster
            .request_removal(&viewer(), &group(), &UserId::new("me").unwrap())
            .unwrap_err();
        assert!(matches!(err, MessagingError::Forbidden(_)));
        assert_eq!(gateway.update_count(), 0);
    }

    #[test]
    fn removal_from_direct_is_rejected() {
        let (_, roster) = setup(direct());
        let err = roster
            .request_removal(&viewer(), &direct(), &UserId::new("u2").unwrap())
            .unwrap_err();
        assert!(matches!(err, MessagingError::Forbidden(_)));
    }

    #[tokio::test]
    async fn removal_requires_confirmation() {
        let (gateway, roster) = setup(group());
        let u1 = UserId::new("u1").unwrap();

        let pending = roster.request_removal(&viewer(), &group(), &u1).unwrap();
        assert_eq!(pending.user().display_name(), "Ana");
        assert_eq!(gateway.update_count(), 0);

        let updated = roster.confirm_removal(&viewer(), pending).await.unwrap();
        assert!(!updated.has_participant(&u1));
        assert_eq!(updated.participants().len(), 2);
        assert_eq!(gateway.update_count(), 1);
    }

    #[test]
    fn removing_non_member_is_validation_error() {
        let (_, roster) = setup(group());
        let err = roster
            .request_removal(&viewer(), &group(), &UserId::new("u3").unwrap())
            .unwrap_err();
        assert_eq!(err.field(), Some("user_id"));
    }

    #[test]
    fn blank_group_title_falls_back() {
        let conversation = Conversation::reconstitute(
            ConversationId::new(),
            Some("  ".into()),
            true,
            Timestamp::now(),
            Timestamp::now(),
            vec![],
            vec![],
        );
        assert_eq!(
            ParticipantRoster::resolve_title(&conversation, &UserId::new("me").unwrap()),
            FALLBACK_GROUP_TITLE
        );
    }
}

//! Role-aware navigation targets.
//!
//! The only place that maps a role to the area of the application its
//! conversation threads live under.

use super::Role;
use crate::domain::foundation::{ConversationId, EstablishmentId, ValidationError};

/// Pure mapping from roles to thread locations.
pub struct RoleRouter;

impl RoleRouter {
    /// Base path of the messaging area for `role`.
    pub fn base_path(role: &Role) -> &'static str {
        match role {
            Role::Student => "/student/messages",
            Role::Parent => "/parent/messages",
            Role::Teacher => "/teacher/messages",
            Role::Staff | Role::Superadmin => "/admin/messages",
            Role::Other(_) => "/messages",
        }
    }

    /// Whether threads for `role` carry an `establishmentId` query parameter.
    ///
    /// Teachers work across establishments; every other role is scoped to
    /// exactly one.
    pub fn requires_establishment(role: &Role) -> bool {
        matches!(role, Role::Teacher)
    }

    /// Location of a conversation thread.
    ///
    /// # Errors
    ///
    /// - `EmptyField("establishment_id")` for a teacher without establishment
    pub fn thread_url(
        role: &Role,
        conversation_id: &ConversationId,
        establishment_id: Option<&EstablishmentId>,
    ) -> Result<String, ValidationError> {
        let path = format!("{}/{}", Self::base_path(role), conversation_id);
        if !Self::requires_establishment(role) {
            return Ok(path);
        }
        match establishment_id {
            Some(establishment) => {
                let query = url::form_urlencoded::Serializer::new(String::new())
                    .append_pair("establishmentId", establishment.as_str())
                    .finish();
                Ok(format!("{}?{}", path, query))
            }
            None => Err(ValidationError::empty_field("establishment_id")),
        }
    }
}

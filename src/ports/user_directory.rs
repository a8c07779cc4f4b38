//! User directory port (participant search).

use async_trait::async_trait;

use crate::domain::foundation::{EstablishmentId, UserId};
use crate::domain::messaging::{MessagingError, Role, UserSummary};

/// Search criteria for addressable users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSearchQuery {
    pub text: String,
    pub role: Option<Role>,
    pub establishment_id: Option<EstablishmentId>,
}

impl UserSearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            role: None,
            establishment_id: None,
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_establishment(mut self, establishment_id: EstablishmentId) -> Self {
        self.establishment_id = Some(establishment_id);
        self
    }
}

/// Port for finding users to address.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn search_users(
        &self,
        viewer: &UserId,
        query: &UserSearchQuery,
    ) -> Result<Vec<UserSummary>, MessagingError>;
}

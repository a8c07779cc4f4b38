//! User snapshots and the acting viewer.

use serde::{Deserialize, Serialize};

use super::Role;
use crate::domain::foundation::{EstablishmentId, UserId};

/// Snapshot of a user as shown in rosters and search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub name: Option<String>,
    pub email: String,
    pub role: Role,
}

impl UserSummary {
    pub fn new(id: UserId, name: Option<String>, email: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            name,
            email: email.into(),
            role,
        }
    }

    /// Name if set and non-blank, otherwise the email.
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.email,
        }
    }
}

/// The user acting through the client.
///
/// Passed explicitly into every operation that depends on who is acting
/// (roster edits, sending, seen-marking, navigation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub id: UserId,
    pub role: Role,
    /// Establishment the viewer is currently working in.
    ///
    /// Only meaningful for teachers, who operate across establishments.
    pub establishment_id: Option<EstablishmentId>,
}

impl Viewer {
    pub fn new(id: UserId, role: Role) -> Self {
        Self {
            id,
            role,
            establishment_id: None,
        }
    }

    pub fn with_establishment(mut self, establishment_id: EstablishmentId) -> Self {
        self.establishment_id = Some(establishment_id);
        self
    }
}

//! Participant roles.
//!
//! Roles only drive display labels and route selection. Authorization is
//! the account system's concern, so parsing is permissive: a role string
//! this crate does not know is kept verbatim instead of being rejected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a user in the school.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Student,
    Parent,
    Teacher,
    /// School administration staff.
    Staff,
    Superadmin,
    /// A role this crate does not know about, kept as received.
    Other(String),
}

impl Role {
    /// Wire representation (`STUDENT`, `PARENT`, ...).
    pub fn as_str(&self) -> &str {
        match self {
            Role::Student => "STUDENT",
            Role::Parent => "PARENT",
            Role::Teacher => "TEACHER",
            Role::Staff => "STAFF",
            Role::Superadmin => "SUPERADMIN",
            Role::Other(raw) => raw,
        }
    }

    /// Display label shown next to participant names.
    ///
    /// Unknown roles pass through verbatim.
    pub fn label(&self) -> &str {
        match self {
            Role::Student => "Student",
            Role::Parent => "Parent",
            Role::Teacher => "Teacher",
            Role::Staff => "Administration",
            Role::Superadmin => "Super admin",
            Role::Other(raw) => raw,
        }
    }
}

impl From<String> for Role {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "STUDENT" => Role::Student,
            "PARENT" => Role::Parent,
            "TEACHER" => Role::Teacher,
            "STAFF" => Role::Staff,
            "SUPERADMIN" => Role::Superadmin,
            _ => Role::Other(raw),
        }
    }
}

impl From<&str> for Role {
    fn from(raw: &str) -> Self {
        Role::from(raw.to_string())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_roles_have_fixed_labels() {
        assert_eq!(Role::Student.label(), "Student");
        assert_eq!(Role::Parent.label(), "Parent");
        assert_eq!(Role::Teacher.label(), "Teacher");
        assert_eq!(Role::Staff.label(), "Administration");
        assert_eq!(Role::Superadmin.label(), "Super admin");
    }

    #[test]
    fn unknown_role_label_passes_through() {
        let role = Role::from("INSPECTOR");
        assert_eq!(role, Role::Other("INSPECTOR".to_string()));
        assert_eq!(role.label(), "INSPECTOR");
    }

    #[test]
    fn role_deserializes_permissively() {
        let known: Role = serde_json::from_str("\"STAFF\"").unwrap();
        let unknown: Role = serde_json::from_str("\"LIBRARIAN\"").unwrap();
        assert_eq!(known, Role::Staff);
        assert_eq!(unknown.as_str(), "LIBRARIAN");
    }

    #[test]
    fn role_serializes_to_wire_name() {
        assert_eq!(serde_json::to_string(&Role::Teacher).unwrap(), "\"TEACHER\"");
    }
}

//! Staff users and their roles.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Staff role. Stored lowercase in `users.role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Accountant,
    Manager,
    Pending,
    Blocked,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Accountant => "accountant",
            Self::Manager => "manager",
            Self::Pending => "pending",
            Self::Blocked => "blocked",
        }
    }

    /// Full visibility: sees every active account, not just granted ones.
    pub fn is_elevated(self) -> bool {
        matches!(self, Self::Admin)
    }

    /// Whether the role may use statement and balance operations at all.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Admin | Self::Accountant | Self::Manager)
    }

    /// Roles that ignore the per-user day limit.
    pub fn is_unlimited(self) -> bool {
        matches!(self, Self::Admin | Self::Accountant)
    }

    /// Day limit assigned when an administrator approves a user with this role.
    /// `None` keeps whatever limit the user already has.
    pub fn default_max_days(self) -> Option<i32> {
        match self {
            Self::Manager => Some(7),
            Self::Accountant | Self::Admin => Some(0),
            Self::Pending | Self::Blocked => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Registered staff member. `id` is the chat platform's user id.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub full_name: String,
    pub username: Option<String>,
    pub role: Role,
    pub max_days: i32,
}

impl User {
    /// A non-positive `max_days` also means "no limit".
    pub fn has_unlimited_days(&self) -> bool {
        self.role.is_unlimited() || self.max_days <= 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role, max_days: i32) -> User {
        User {
            id: 1,
            full_name: "Test".to_string(),
            username: Some("test".to_string()),
            role,
            max_days,
        }
    }

    #[test]
    fn only_managers_with_positive_limit_are_limited() {
        assert!(!user(Role::Manager, 7).has_unlimited_days());
        assert!(user(Role::Manager, 0).has_unlimited_days());
        assert!(user(Role::Accountant, 3).has_unlimited_days());
        assert!(user(Role::Admin, 3).has_unlimited_days());
    }

    #[test]
    fn pending_and_blocked_are_inactive() {
        assert!(!Role::Pending.is_active());
        assert!(!Role::Blocked.is_active());
        assert!(Role::Manager.is_active());
    }

    #[test]
    fn approval_defaults() {
        assert_eq!(Role::Manager.default_max_days(), Some(7));
        assert_eq!(Role::Accountant.default_max_days(), Some(0));
        assert_eq!(Role::Blocked.default_max_days(), None);
    }
}

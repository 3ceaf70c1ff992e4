//! Per-(user, account) visibility capabilities.

use super::Flow;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Incoming,
    Outgoing,
    /// May see the live balance. Does not affect which transactions are shown.
    Balance,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
            Self::Balance => "balance",
        }
    }
}

/// Normalized permission set. Never empty: `incoming` is always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    pub fn incoming_only() -> Self {
        Self(BTreeSet::from([Permission::Incoming]))
    }

    pub fn full() -> Self {
        Self(BTreeSet::from([
            Permission::Incoming,
            Permission::Outgoing,
            Permission::Balance,
        ]))
    }

    /// Parse a stored or user-supplied permission string.
    ///
    /// Tokens are separated by commas, semicolons or whitespace. Unknown tokens
    /// are dropped, `full` expands to every permission and `incoming` is always
    /// added, so `normalize("")` is `{incoming}` and `normalize("out")` is
    /// `{incoming, outgoing}`.
    pub fn normalize(raw: &str) -> Self {
        Self::from_tokens(raw.split(|c: char| c == ',' || c == ';' || c.is_whitespace()))
    }

    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::from([Permission::Incoming]);
        for token in tokens {
            match token.as_ref().trim().to_ascii_lowercase().as_str() {
                "in" | "incoming" => {
                    set.insert(Permission::Incoming);
                }
                "out" | "outgoing" => {
                    set.insert(Permission::Outgoing);
                }
                "balance" | "bal" => {
                    set.insert(Permission::Balance);
                }
                "full" | "all" => set.extend(Self::full().0),
                _ => {}
            }
        }
        Self(set)
    }

    pub fn contains(&self, permission: Permission) -> bool {
        self.0.contains(&permission)
    }

    pub fn allows(&self, flow: Flow) -> bool {
        match flow {
            Flow::Incoming => self.contains(Permission::Incoming),
            Flow::Outgoing => self.contains(Permission::Outgoing),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        self.0.iter().copied()
    }

    /// Canonical storage form, e.g. `incoming,outgoing`. `full` is never
    /// persisted, which keeps `normalize(to_storage(x)) == x`.
    pub fn to_storage(&self) -> String {
        self.0
            .iter()
            .map(Permission::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Default for PermissionSet {
    fn default() -> Self {
        Self::incoming_only()
    }
}

/// Row of `user_accounts`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AccessGrant {
    pub user_id: i64,
    pub account_id: i64,
    pub permissions: String,
}

impl AccessGrant {
    pub fn permission_set(&self) -> PermissionSet {
        PermissionSet::normalize(&self.permissions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_unknown_become_incoming() {
        assert_eq!(PermissionSet::normalize(""), PermissionSet::incoming_only());
        assert_eq!(
            PermissionSet::normalize("read, write"),
            PermissionSet::incoming_only()
        );
    }

    #[test]
    fn outgoing_implies_incoming() {
        let set = PermissionSet::normalize("out");
        assert!(set.contains(Permission::Incoming));
        assert!(set.contains(Permission::Outgoing));
        assert!(!set.contains(Permission::Balance));
        assert_eq!(set.to_storage(), "incoming,outgoing");
    }

    #[test]
    fn full_is_expanded_before_storage() {
        let set = PermissionSet::normalize("FULL");
        assert_eq!(set, PermissionSet::full());
        assert_eq!(set.to_storage(), "incoming,outgoing,balance");
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in ["", "out", "balance", "in;out balance", "full", "junk,bal"] {
            let once = PermissionSet::normalize(raw);
            let twice = PermissionSet::normalize(&once.to_storage());
            assert_eq!(once, twice, "raw = {raw:?}");
        }
    }

    #[test]
    fn balance_does_not_grant_outgoing_flow() {
        let set = PermissionSet::normalize("balance");
        assert!(set.allows(Flow::Incoming));
        assert!(!set.allows(Flow::Outgoing));
    }
}

//! Organizations (token holders) and their provider accounts.

use super::Credential;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::FromRow;
use std::str::FromStr;

/// Raw `organizations` row. The token is wrapped into a [`Credential`]
/// before it leaves the store.
#[derive(Debug, Clone, FromRow)]
pub struct OrganizationRow {
    pub id: i64,
    pub name: String,
    pub token: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct Organization {
    pub id: i64,
    pub name: String,
    pub credential: Option<Credential>,
    pub is_active: bool,
}

impl From<OrganizationRow> for Organization {
    fn from(row: OrganizationRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            credential: row.token.and_then(Credential::new),
            is_active: row.is_active,
        }
    }
}

impl Organization {
    /// Credential usable for fetching, if the organization is active and has one.
    pub fn active_credential(&self) -> Option<&Credential> {
        if self.is_active {
            self.credential.as_ref()
        } else {
            None
        }
    }
}

/// Provider account onboarded under an organization.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub organization_id: i64,
    /// Account identifier on the provider side.
    pub provider_account_id: String,
    pub name: String,
    pub iban: Option<String>,
    /// ISO 4217 numeric code.
    pub currency_code: Option<i32>,
    pub is_active: bool,
}

impl Account {
    pub fn currency(&self) -> String {
        currency_suffix(self.currency_code)
    }
}

/// Alphabetic suffix for an ISO 4217 numeric code. Accounts onboarded
/// without a code are hryvnia accounts.
pub fn currency_suffix(code: Option<i32>) -> String {
    match code {
        None | Some(980) => "UAH".to_string(),
        Some(840) => "USD".to_string(),
        Some(978) => "EUR".to_string(),
        Some(826) => "GBP".to_string(),
        Some(985) => "PLN".to_string(),
        Some(other) => other.to_string(),
    }
}

/// Which accounts a request covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountSelector {
    All,
    Specific(i64),
}

impl AccountSelector {
    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}

impl std::fmt::Display for AccountSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Specific(id) => write!(f, "{}", id),
        }
    }
}

impl FromStr for AccountSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        s.parse::<i64>()
            .map(Self::Specific)
            .map_err(|_| format!("invalid account selector '{}'", s))
    }
}

impl<'de> Deserialize<'de> for AccountSelector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Id(i64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Id(id) => Ok(Self::Specific(id)),
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

impl Serialize for AccountSelector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::All => serializer.serialize_str("all"),
            Self::Specific(id) => serializer.serialize_i64(*id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_accepts_all_numbers_and_numeric_strings() {
        let all: AccountSelector = serde_json::from_str("\"all\"").unwrap();
        let num: AccountSelector = serde_json::from_str("17").unwrap();
        let text: AccountSelector = serde_json::from_str("\"17\"").unwrap();
        assert_eq!(all, AccountSelector::All);
        assert_eq!(num, AccountSelector::Specific(17));
        assert_eq!(text, AccountSelector::Specific(17));
        assert!(serde_json::from_str::<AccountSelector>("\"card\"").is_err());
    }

    #[test]
    fn inactive_organization_has_no_usable_credential() {
        let org = Organization::from(OrganizationRow {
            id: 1,
            name: "Shop".to_string(),
            token: Some("tok".to_string()),
            is_active: false,
        });
        assert!(org.active_credential().is_none());

        let tokenless = Organization::from(OrganizationRow {
            id: 2,
            name: "Cafe".to_string(),
            token: Some("  ".to_string()),
            is_active: true,
        });
        assert!(tokenless.active_credential().is_none());
    }

    #[test]
    fn currency_suffixes() {
        assert_eq!(currency_suffix(Some(980)), "UAH");
        assert_eq!(currency_suffix(None), "UAH");
        assert_eq!(currency_suffix(Some(840)), "USD");
        assert_eq!(currency_suffix(Some(124)), "124");
    }
}

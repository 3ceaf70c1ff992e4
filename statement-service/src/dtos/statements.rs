use crate::models::{AccountSelector, Permission, TimeRange};
use crate::services::engine::AccountBalance;
use crate::services::period::{PeriodPreset, PeriodSpec};
use crate::services::permissions::VisibleAccount;
use chrono::TimeZone;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

fn default_selector() -> AccountSelector {
    AccountSelector::All
}

/// Statement query: either `period` or both `from` and `to`.
///
/// Bounds are not checked here; the engine resolves them so that a bad
/// period is audited like any other rejected request.
#[derive(Debug, Deserialize)]
pub struct StatementRequest {
    #[serde(default = "default_selector")]
    pub account: AccountSelector,
    pub from: Option<String>,
    pub to: Option<String>,
    pub period: Option<PeriodPreset>,
}

impl StatementRequest {
    /// A preset wins over explicit bounds.
    pub fn period_spec(&self) -> PeriodSpec {
        match self.period {
            Some(preset) => PeriodSpec::Preset(preset),
            None => PeriodSpec::Explicit {
                from: self.from.clone(),
                to: self.to.clone(),
            },
        }
    }

    /// Bounds as shown in the report file name: the caller's text when given,
    /// otherwise local dates of the resolved range.
    pub fn name_bounds(&self, range: TimeRange, tz: Tz) -> (String, String) {
        let local_date = |ts: i64| {
            tz.timestamp_opt(ts, 0)
                .single()
                .map(|dt| dt.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| ts.to_string())
        };
        match (&self.period, &self.from, &self.to) {
            (None, Some(from), Some(to)) => (from.clone(), to.clone()),
            _ => (local_date(range.from), local_date(range.to)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TextStatementResponse {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountView {
    pub id: i64,
    pub organization_id: i64,
    pub name: String,
    pub iban: Option<String>,
    pub currency: String,
    pub permissions: Vec<Permission>,
}

impl From<VisibleAccount> for AccountView {
    fn from(v: VisibleAccount) -> Self {
        Self {
            id: v.account.id,
            organization_id: v.account.organization_id,
            currency: v.account.currency(),
            name: v.account.name,
            iban: v.account.iban,
            permissions: v.permissions.iter().collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountsResponse {
    pub accounts: Vec<AccountView>,
}

#[derive(Debug, Deserialize)]
pub struct BalancesParams {
    pub account: Option<String>,
}

impl BalancesParams {
    pub fn selector(&self) -> Result<AccountSelector, AppError> {
        match self.account.as_deref() {
            None => Ok(AccountSelector::All),
            Some(raw) => raw
                .parse()
                .map_err(|e: String| AppError::BadRequest(anyhow::anyhow!(e))),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BalancesResponse {
    pub balances: Vec<AccountBalance>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::period::PeriodError;
    use chrono::Utc;
    use chrono_tz::Europe::Kyiv;

    #[test]
    fn needs_period_or_both_bounds() {
        let req: StatementRequest =
            serde_json::from_str(r#"{"account":"all","from":"2024-01-01"}"#).unwrap();
        assert_eq!(
            req.period_spec().resolve(Utc::now(), Kyiv),
            Err(PeriodError::Missing)
        );
    }

    #[test]
    fn account_defaults_to_all() {
        let req: StatementRequest = serde_json::from_str(r#"{"period":"today"}"#).unwrap();
        assert_eq!(req.account, AccountSelector::All);
        assert_eq!(req.period_spec(), PeriodSpec::Preset(PeriodPreset::Today));
    }

    #[test]
    fn preset_wins_over_bounds() {
        let req: StatementRequest = serde_json::from_str(
            r#"{"account":3,"from":"","to":"2024-01-01","period":"yesterday"}"#,
        )
        .unwrap();
        assert_eq!(req.period_spec(), PeriodSpec::Preset(PeriodPreset::Yesterday));
    }

    #[test]
    fn file_name_bounds_prefer_caller_text() {
        let req: StatementRequest =
            serde_json::from_str(r#"{"from":"2024-01-01","to":"2024-01-02"}"#).unwrap();
        let range = req.period_spec().resolve(Utc::now(), Kyiv).unwrap();
        assert_eq!(
            req.name_bounds(range, Kyiv),
            ("2024-01-01".to_string(), "2024-01-02".to_string())
        );
    }
}

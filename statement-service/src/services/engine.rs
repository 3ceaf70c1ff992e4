//! Statement aggregation engine.
//!
//! For one caller, account selector and period: resolve accounts and their
//! permissions, gate on the per-credential cool-down, fetch sequentially,
//! filter, and shape the result as text or report rows. Every attempt is
//! written to the audit log.

use crate::models::{
    currency_suffix, AccountSelector, AuditAction, AuditEntry, Credential, Organization,
    Permission, ReportRow, TimeRange, User,
};
use crate::services::aggregation::{build_rows, render_text, AccountStatement};
use crate::services::cooldown::{Clock, CooldownStore};
use crate::services::fetcher::StatementFetcher;
use crate::services::filter::filter_transactions;
use crate::services::metrics::AGGREGATIONS_TOTAL;
use crate::services::period::{PeriodError, PeriodSpec};
use crate::services::permissions::{PermissionResolver, VisibleAccount};
use crate::services::provider::{BankProvider, ProviderError};
use crate::services::store::Store;
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

/// Tolerance for the day-limit comparison.
const DAY_LIMIT_EPSILON: f64 = 1e-6;

#[derive(Debug, Error)]
pub enum StatementError {
    #[error("unknown user")]
    UnknownUser,

    #[error("access denied")]
    AccessDenied,

    #[error(transparent)]
    InvalidPeriod(#[from] PeriodError),

    #[error("the selected period exceeds the allowed limit of {max_days} days")]
    PeriodExceedsLimit { max_days: i32 },

    #[error("account not found")]
    AccountNotFound,

    #[error("no accounts available")]
    NoAccounts,

    #[error("no active source for the selected accounts")]
    NoActiveSource,

    #[error("too many requests to the bank, try again in {wait_secs} seconds")]
    RateLimited { wait_secs: u64 },

    #[error("no transactions in the selected period")]
    NoTransactions,

    #[error("bank provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] AppError),
}

impl StatementError {
    fn outcome_label(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::Provider(_) | Self::Store(_) => "error",
            _ => "rejected",
        }
    }
}

impl From<StatementError> for AppError {
    fn from(err: StatementError) -> Self {
        let message = err.to_string();
        match err {
            StatementError::UnknownUser | StatementError::AccessDenied => {
                AppError::Forbidden(anyhow::anyhow!(message))
            }
            StatementError::InvalidPeriod(_)
            | StatementError::PeriodExceedsLimit { .. }
            | StatementError::NoActiveSource => AppError::BadRequest(anyhow::anyhow!(message)),
            StatementError::AccountNotFound
            | StatementError::NoAccounts
            | StatementError::NoTransactions => AppError::NotFound(anyhow::anyhow!(message)),
            StatementError::RateLimited { wait_secs } => {
                AppError::TooManyRequests(message, Some(wait_secs))
            }
            StatementError::Provider(e) => AppError::BadGateway(e.to_string()),
            StatementError::Store(e) => e,
        }
    }
}

/// Live balance of one provider account.
#[derive(Debug, Clone, Serialize)]
pub struct AccountBalance {
    pub account_id: i64,
    pub account_name: String,
    pub organization_name: String,
    pub balance: Decimal,
    pub currency: String,
}

/// Report rows with the range they were resolved for.
#[derive(Debug, Clone)]
pub struct StatementRows {
    pub range: TimeRange,
    pub rows: Vec<ReportRow>,
}

/// Accounts sharing one credential, each with its position in the request.
struct CredentialGroup {
    credential: Credential,
    members: Vec<(usize, Organization, VisibleAccount)>,
}

#[derive(Clone)]
pub struct StatementEngine {
    store: Arc<dyn Store>,
    permissions: PermissionResolver,
    fetcher: StatementFetcher,
    provider: Arc<dyn BankProvider>,
    cooldown: Arc<dyn CooldownStore>,
    clock: Arc<dyn Clock>,
    timezone: Tz,
}

impl StatementEngine {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn BankProvider>,
        cooldown: Arc<dyn CooldownStore>,
        fetcher: StatementFetcher,
        clock: Arc<dyn Clock>,
        timezone: Tz,
    ) -> Self {
        Self {
            permissions: PermissionResolver::new(store.clone()),
            store,
            fetcher,
            provider,
            cooldown,
            clock,
            timezone,
        }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Chronological text listing of the selected accounts.
    #[instrument(skip(self, period), fields(selector = %selector))]
    pub async fn text_summary(
        &self,
        user_id: i64,
        selector: AccountSelector,
        period: impl Into<PeriodSpec>,
    ) -> Result<String, StatementError> {
        let period = period.into();
        let collected = self.collect(user_id, selector, &period).await;
        let params = audit_params(selector, &period, &collected);
        let result =
            collected.map(|(_, sections)| render_text(&sections, selector, self.timezone));
        self.finish(user_id, AuditAction::StatementText, params, &result)
            .await;
        result
    }

    /// Report rows ordered by organization, account and time.
    #[instrument(skip(self, period), fields(selector = %selector))]
    pub async fn report_rows(
        &self,
        user_id: i64,
        selector: AccountSelector,
        period: impl Into<PeriodSpec>,
    ) -> Result<StatementRows, StatementError> {
        let period = period.into();
        let collected = self.collect(user_id, selector, &period).await;
        let params = audit_params(selector, &period, &collected);
        let result = collected.map(|(range, sections)| StatementRows {
            range,
            rows: build_rows(&sections, self.timezone),
        });
        self.finish(user_id, AuditAction::StatementReport, params, &result)
            .await;
        result
    }

    /// Accounts the caller may query, with effective permissions.
    #[instrument(skip(self))]
    pub async fn visible_accounts(
        &self,
        user_id: i64,
    ) -> Result<Vec<VisibleAccount>, StatementError> {
        let user = self.active_user(user_id).await?;
        Ok(self.permissions.visible_accounts(&user).await?)
    }

    /// Live balances of selected accounts carrying the `balance` capability.
    /// The provider is asked once per distinct credential.
    #[instrument(skip(self), fields(selector = %selector))]
    pub async fn balances(
        &self,
        user_id: i64,
        selector: AccountSelector,
    ) -> Result<Vec<AccountBalance>, StatementError> {
        let result = self.collect_balances(user_id, selector).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.outcome_label(),
        };
        AGGREGATIONS_TOTAL
            .with_label_values(&["balances", outcome])
            .inc();
        let entry = AuditEntry::new(
            user_id,
            AuditAction::Balances,
            json!({ "account": selector }),
        )
        .with_result(&result);
        self.audit(&entry).await;

        result
    }

    async fn collect_balances(
        &self,
        user_id: i64,
        selector: AccountSelector,
    ) -> Result<Vec<AccountBalance>, StatementError> {
        let user = self.active_user(user_id).await?;
        let accounts: Vec<VisibleAccount> = self
            .resolve(&user, selector)
            .await?
            .into_iter()
            .filter(|v| v.permissions.contains(Permission::Balance))
            .collect();
        if accounts.is_empty() {
            return Ok(Vec::new());
        }

        let mut balances = Vec::new();
        for group in self.group_by_credential(accounts).await? {
            let info = match self.provider.client_info(&group.credential).await {
                Ok(info) => info,
                Err(ProviderError::TooManyRequests { retry_after }) => {
                    return Err(StatementError::RateLimited {
                        wait_secs: retry_after.unwrap_or(self.cooldown.window_secs()),
                    });
                }
                Err(e) => return Err(e.into()),
            };

            for (_, organization, visible) in group.members {
                let account = visible.account;
                let Some(remote) = info
                    .accounts
                    .iter()
                    .find(|a| a.id == account.provider_account_id)
                else {
                    warn!(account_id = account.id, "Account missing from provider client info");
                    continue;
                };
                balances.push(AccountBalance {
                    account_id: account.id,
                    account_name: account.name.clone(),
                    organization_name: organization.name.clone(),
                    balance: Decimal::new(remote.balance, 2),
                    currency: currency_suffix(
                        remote.currency_code.or(account.currency_code),
                    ),
                });
            }
        }

        Ok(balances)
    }

    async fn active_user(&self, user_id: i64) -> Result<User, StatementError> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or(StatementError::UnknownUser)?;
        if !user.role.is_active() {
            return Err(StatementError::AccessDenied);
        }
        Ok(user)
    }

    async fn resolve(
        &self,
        user: &User,
        selector: AccountSelector,
    ) -> Result<Vec<VisibleAccount>, StatementError> {
        let accounts = self.permissions.resolve(user, selector).await?;
        if accounts.is_empty() {
            return Err(match selector {
                AccountSelector::Specific(_) => StatementError::AccountNotFound,
                AccountSelector::All => StatementError::NoAccounts,
            });
        }
        Ok(accounts)
    }

    /// Groups accounts by the credential of their organization, in order of
    /// first appearance. Accounts of inactive or tokenless organizations are
    /// dropped; if nothing remains there is no source to fetch from.
    async fn group_by_credential(
        &self,
        accounts: Vec<VisibleAccount>,
    ) -> Result<Vec<CredentialGroup>, StatementError> {
        let mut organizations: HashMap<i64, Option<Organization>> = HashMap::new();
        let mut groups: Vec<CredentialGroup> = Vec::new();

        for (position, visible) in accounts.into_iter().enumerate() {
            let org_id = visible.account.organization_id;
            if !organizations.contains_key(&org_id) {
                let org = self.store.get_organization(org_id).await?;
                organizations.insert(org_id, org);
            }
            let Some(org) = organizations.get(&org_id).and_then(Option::as_ref) else {
                continue;
            };
            let Some(credential) = org.active_credential() else {
                continue;
            };

            let member = (position, org.clone(), visible);
            match groups.iter_mut().find(|g| &g.credential == credential) {
                Some(group) => group.members.push(member),
                None => groups.push(CredentialGroup {
                    credential: credential.clone(),
                    members: vec![member],
                }),
            }
        }

        if groups.is_empty() {
            return Err(StatementError::NoActiveSource);
        }
        Ok(groups)
    }

    async fn collect(
        &self,
        user_id: i64,
        selector: AccountSelector,
        period: &PeriodSpec,
    ) -> Result<(TimeRange, Vec<AccountStatement>), StatementError> {
        let user = self.active_user(user_id).await?;

        let range = period.resolve(self.clock.now(), self.timezone)?;
        if range.from > range.to {
            return Err(PeriodError::Reversed.into());
        }
        if !user.has_unlimited_days()
            && range.span_days() > f64::from(user.max_days) + DAY_LIMIT_EPSILON
        {
            return Err(StatementError::PeriodExceedsLimit {
                max_days: user.max_days,
            });
        }

        let accounts = self.resolve(&user, selector).await?;
        let groups = self.group_by_credential(accounts).await?;

        let mut wait_secs = 0;
        for group in &groups {
            wait_secs = wait_secs.max(self.cooldown.wait_remaining(&group.credential).await?);
        }
        if wait_secs > 0 {
            info!(wait_secs, credentials = groups.len(), "Cool-down in effect, nothing fetched");
            return Err(StatementError::RateLimited { wait_secs });
        }

        let ignore = self.store.list_ignore_ibans().await?;
        let mut sections: Vec<(usize, AccountStatement)> = Vec::new();

        for group in groups {
            for (position, organization, visible) in group.members {
                let account = visible.account;
                let fetched = self
                    .fetcher
                    .fetch(
                        &group.credential,
                        &account.provider_account_id,
                        range.from,
                        range.to,
                    )
                    .await;

                let transactions = match fetched {
                    Ok(txs) => txs,
                    Err(ProviderError::TooManyRequests { retry_after }) => {
                        let wait_secs = match retry_after {
                            Some(secs) if secs > 0 => secs,
                            _ => self.throttle_wait(&group.credential).await,
                        };
                        warn!(account_id = account.id, wait_secs, "Provider throttled, aborting");
                        return Err(StatementError::RateLimited { wait_secs });
                    }
                    Err(e) => {
                        warn!(account_id = account.id, error = %e, "Statement fetch failed");
                        return Err(e.into());
                    }
                };

                if let Err(e) = self.cooldown.mark_used(&group.credential).await {
                    warn!(credential = %group.credential.short_id(), error = %e, "Failed to record cool-down");
                }

                let fetched_count = transactions.len();
                let filtered = filter_transactions(transactions, &ignore, &visible.permissions);
                info!(
                    account_id = account.id,
                    fetched = fetched_count,
                    kept = filtered.kept.len(),
                    "Account statement fetched"
                );
                if filtered.kept.is_empty() {
                    continue;
                }

                sections.push((
                    position,
                    AccountStatement::new(
                        organization.id,
                        organization.name,
                        account,
                        filtered.kept,
                        filtered.flows,
                    ),
                ));
            }
        }

        if sections.is_empty() {
            return Err(StatementError::NoTransactions);
        }

        sections.sort_by_key(|(position, _)| *position);
        Ok((range, sections.into_iter().map(|(_, s)| s).collect()))
    }

    /// Wait to report when the provider throttles without advice.
    async fn throttle_wait(&self, credential: &Credential) -> u64 {
        match self.cooldown.wait_remaining(credential).await {
            Ok(secs) if secs > 0 => secs,
            _ => self.cooldown.window_secs(),
        }
    }

    async fn finish<T>(
        &self,
        user_id: i64,
        action: AuditAction,
        params: Value,
        result: &Result<T, StatementError>,
    ) {
        let mode = match action {
            AuditAction::StatementReport => "report",
            _ => "text",
        };
        let outcome = match result {
            Ok(_) => "ok",
            Err(e) => e.outcome_label(),
        };
        AGGREGATIONS_TOTAL.with_label_values(&[mode, outcome]).inc();

        let entry = AuditEntry::new(user_id, action, params).with_result(result);
        self.audit(&entry).await;
    }

    /// Audit failures are logged and otherwise ignored.
    async fn audit(&self, entry: &AuditEntry) {
        if let Err(e) = self.store.append_audit(entry).await {
            warn!(
                user_id = entry.user_id,
                action = entry.action.as_str(),
                error = %e,
                "Failed to write audit entry"
            );
        }
    }
}

/// The requested period, plus the resolved bounds once they are known.
fn audit_params<T>(
    selector: AccountSelector,
    period: &PeriodSpec,
    collected: &Result<(TimeRange, T), StatementError>,
) -> Value {
    let mut params = json!({ "account": selector, "period": period });
    if let Ok((range, _)) = collected {
        params["from"] = json!(range.from);
        params["to"] = json!(range.to);
    }
    params
}

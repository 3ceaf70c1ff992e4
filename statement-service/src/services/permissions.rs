//! Which accounts a user sees, and which flows on each.

use crate::models::{Account, AccountSelector, PermissionSet, User};
use crate::services::store::Store;
use serde::Serialize;
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

/// An account together with the caller's effective permissions on it.
#[derive(Debug, Clone, Serialize)]
pub struct VisibleAccount {
    pub account: Account,
    pub permissions: PermissionSet,
}

#[derive(Clone)]
pub struct PermissionResolver {
    store: Arc<dyn Store>,
}

impl PermissionResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Active accounts visible to `user`, in store order.
    ///
    /// Elevated users see every active account: an explicit grant wins,
    /// otherwise `{incoming}`. Everyone else sees only granted accounts.
    /// Grants pointing at missing or inactive accounts are skipped.
    #[instrument(skip(self, user), fields(user_id = user.id, role = %user.role))]
    pub async fn visible_accounts(&self, user: &User) -> Result<Vec<VisibleAccount>, AppError> {
        if !user.role.is_active() {
            return Ok(Vec::new());
        }

        let grants: HashMap<i64, PermissionSet> = self
            .store
            .list_grants(user.id)
            .await?
            .into_iter()
            .map(|g| (g.account_id, g.permission_set()))
            .collect();

        let accounts = self.store.list_active_accounts().await?;
        let visible = accounts
            .into_iter()
            .filter_map(|account| {
                let permissions = match grants.get(&account.id) {
                    Some(set) => set.clone(),
                    None if user.role.is_elevated() => PermissionSet::incoming_only(),
                    None => return None,
                };
                Some(VisibleAccount {
                    account,
                    permissions,
                })
            })
            .collect();

        Ok(visible)
    }

    /// Effective permissions of `user` on `account`; `None` means not visible.
    #[instrument(skip(self, user, account), fields(user_id = user.id, account_id = account.id))]
    pub async fn allowed_flows(
        &self,
        user: &User,
        account: &Account,
    ) -> Result<Option<PermissionSet>, AppError> {
        if !account.is_active || !user.role.is_active() {
            return Ok(None);
        }
        let grant = self.store.get_grant(user.id, account.id).await?;
        Ok(match grant {
            Some(grant) => Some(grant.permission_set()),
            None if user.role.is_elevated() => Some(PermissionSet::incoming_only()),
            None => None,
        })
    }

    /// Turns a selector into the concrete accounts to process. A specific id
    /// that is missing or not visible resolves to nothing.
    pub async fn resolve(
        &self,
        user: &User,
        selector: AccountSelector,
    ) -> Result<Vec<VisibleAccount>, AppError> {
        match selector {
            AccountSelector::All => self.visible_accounts(user).await,
            AccountSelector::Specific(id) => {
                let Some(account) = self.store.get_account(id).await? else {
                    return Ok(Vec::new());
                };
                Ok(self
                    .allowed_flows(user, &account)
                    .await?
                    .map(|permissions| VisibleAccount {
                        account,
                        permissions,
                    })
                    .into_iter()
                    .collect())
            }
        }
    }
}

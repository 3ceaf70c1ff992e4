//! User onboarding and grant administration.

use crate::models::{AuditAction, AuditEntry, PermissionSet, Role, User};
use crate::services::store::Store;
use serde_json::json;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument, warn};

#[derive(Clone)]
pub struct AdminService {
    store: Arc<dyn Store>,
}

impl AdminService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// First contact creates a `pending` user; later calls refresh names only.
    #[instrument(skip(self, full_name, username))]
    pub async fn register_user(
        &self,
        user_id: i64,
        full_name: &str,
        username: Option<&str>,
    ) -> Result<User, AppError> {
        let result = self.store.upsert_user(user_id, full_name, username).await;
        self.audit(
            AuditEntry::new(
                user_id,
                AuditAction::RegisterUser,
                json!({ "full_name": full_name, "username": username }),
            )
            .with_result(&result),
        )
        .await;
        result
    }

    /// Sets a user's role and that role's default day limit.
    #[instrument(skip(self), fields(role = %role))]
    pub async fn approve_user(
        &self,
        actor_id: i64,
        user_id: i64,
        role: Role,
    ) -> Result<User, AppError> {
        let result = async {
            self.require_admin(actor_id).await?;
            let user = self
                .store
                .update_user_role(user_id, role, role.default_max_days())
                .await?
                .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User {} not found", user_id)))?;
            info!(user_id, role = %user.role, max_days = user.max_days, "User role updated");
            Ok::<_, AppError>(user)
        }
        .await;

        self.audit(
            AuditEntry::new(
                actor_id,
                AuditAction::ApproveUser,
                json!({ "user_id": user_id, "role": role }),
            )
            .with_result(&result),
        )
        .await;
        result
    }

    /// Normalizes and stores the permissions of a grant, creating it if needed.
    #[instrument(skip(self, raw))]
    pub async fn set_account_permissions(
        &self,
        actor_id: i64,
        user_id: i64,
        account_id: i64,
        raw: &str,
    ) -> Result<PermissionSet, AppError> {
        let result = async {
            self.require_admin(actor_id).await?;
            self.require_target(user_id, account_id).await?;

            let permissions = PermissionSet::normalize(raw);
            self.store
                .set_grant(user_id, account_id, &permissions.to_storage())
                .await?;
            info!(
                user_id,
                account_id,
                permissions = %permissions.to_storage(),
                "Account permissions set"
            );
            Ok::<_, AppError>(permissions)
        }
        .await;

        self.audit(
            AuditEntry::new(
                actor_id,
                AuditAction::SetPermissions,
                json!({ "user_id": user_id, "account_id": account_id, "permissions": raw }),
            )
            .with_result(&result),
        )
        .await;
        result
    }

    #[instrument(skip(self))]
    pub async fn revoke_account(
        &self,
        actor_id: i64,
        user_id: i64,
        account_id: i64,
    ) -> Result<(), AppError> {
        let result = async {
            self.require_admin(actor_id).await?;
            if !self.store.remove_grant(user_id, account_id).await? {
                return Err(AppError::NotFound(anyhow::anyhow!(
                    "User {} has no grant on account {}",
                    user_id,
                    account_id
                )));
            }
            info!(user_id, account_id, "Account access revoked");
            Ok::<_, AppError>(())
        }
        .await;

        self.audit(
            AuditEntry::new(
                actor_id,
                AuditAction::RevokeAccount,
                json!({ "user_id": user_id, "account_id": account_id }),
            )
            .with_result(&result),
        )
        .await;
        result
    }

    async fn require_admin(&self, actor_id: i64) -> Result<User, AppError> {
        match self.store.get_user(actor_id).await? {
            Some(user) if user.role == Role::Admin => Ok(user),
            _ => Err(AppError::Forbidden(anyhow::anyhow!(
                "Only administrators may change access"
            ))),
        }
    }

    async fn require_target(&self, user_id: i64, account_id: i64) -> Result<(), AppError> {
        if self.store.get_user(user_id).await?.is_none() {
            return Err(AppError::NotFound(anyhow::anyhow!("User {} not found", user_id)));
        }
        if self.store.get_account(account_id).await?.is_none() {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Account {} not found",
                account_id
            )));
        }
        Ok(())
    }

    async fn audit(&self, entry: AuditEntry) {
        if let Err(e) = self.store.append_audit(&entry).await {
            warn!(action = entry.action.as_str(), error = %e, "Failed to write audit entry");
        }
    }
}

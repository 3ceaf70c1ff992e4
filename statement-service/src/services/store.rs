//! Read/write surface the engine and admin operations consume.

use crate::models::{AccessGrant, Account, AuditEntry, Organization, Role, User};
use async_trait::async_trait;
use service_core::error::AppError;
use std::collections::HashSet;

/// Day limit given to users on first contact.
pub const NEW_USER_MAX_DAYS: i32 = 3;

/// Relational store holding users, organizations, accounts and grants.
///
/// Each call is atomic on its own; callers never span a transaction across
/// calls. Records are fully typed when they leave the store.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_user(&self, user_id: i64) -> Result<Option<User>, AppError>;

    /// Inserts a `pending` user, or refreshes names of an existing one.
    async fn upsert_user(
        &self,
        user_id: i64,
        full_name: &str,
        username: Option<&str>,
    ) -> Result<User, AppError>;

    /// Sets the role and, when given, the day limit.
    async fn update_user_role(
        &self,
        user_id: i64,
        role: Role,
        max_days: Option<i32>,
    ) -> Result<Option<User>, AppError>;

    async fn get_account(&self, account_id: i64) -> Result<Option<Account>, AppError>;

    async fn get_organization(&self, organization_id: i64)
        -> Result<Option<Organization>, AppError>;

    async fn list_active_accounts(&self) -> Result<Vec<Account>, AppError>;

    async fn list_grants(&self, user_id: i64) -> Result<Vec<AccessGrant>, AppError>;

    async fn get_grant(
        &self,
        user_id: i64,
        account_id: i64,
    ) -> Result<Option<AccessGrant>, AppError>;

    /// Creates or replaces the permission string of a grant.
    async fn set_grant(
        &self,
        user_id: i64,
        account_id: i64,
        permissions: &str,
    ) -> Result<(), AppError>;

    /// Returns whether a grant existed.
    async fn remove_grant(&self, user_id: i64, account_id: i64) -> Result<bool, AppError>;

    /// Normalized (lowercase, no whitespace) counter-party IBANs to exclude.
    async fn list_ignore_ibans(&self) -> Result<HashSet<String>, AppError>;

    async fn append_audit(&self, entry: &AuditEntry) -> Result<(), AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}

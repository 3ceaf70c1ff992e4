//! PostgreSQL-backed [`Store`].

use crate::models::{AccessGrant, Account, AuditEntry, Organization, OrganizationRow, Role, User};
use crate::services::filter::ignore_set;
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{Store, NEW_USER_MAX_DAYS};
use async_trait::async_trait;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{info, instrument};

const USER_COLUMNS: &str = "id, full_name, username, role, max_days";
const ACCOUNT_COLUMNS: &str =
    "id, organization_id, provider_account_id, name, iban, currency_code, is_active";

fn db_err(context: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, e))
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    #[instrument(skip(database_url), fields(service = "statement-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(db_err("Failed to connect"))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl Store for Database {
    #[instrument(skip(self))]
    async fn get_user(&self, user_id: i64) -> Result<Option<User>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_user"])
            .start_timer();

        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to get user"))?;

        timer.observe_duration();
        Ok(user)
    }

    #[instrument(skip(self, full_name, username))]
    async fn upsert_user(
        &self,
        user_id: i64,
        full_name: &str,
        username: Option<&str>,
    ) -> Result<User, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_user"])
            .start_timer();

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, full_name, username, role, max_days)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
                SET full_name = EXCLUDED.full_name,
                    username = EXCLUDED.username,
                    updated_at = NOW()
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(full_name)
        .bind(username)
        .bind(Role::Pending.as_str())
        .bind(NEW_USER_MAX_DAYS)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err("Failed to upsert user"))?;

        timer.observe_duration();
        info!(user_id = user.id, role = %user.role, "User registered");
        Ok(user)
    }

    #[instrument(skip(self), fields(role = %role))]
    async fn update_user_role(
        &self,
        user_id: i64,
        role: Role,
        max_days: Option<i32>,
    ) -> Result<Option<User>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_user_role"])
            .start_timer();

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET role = $2, max_days = COALESCE($3, max_days), updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(role.as_str())
        .bind(max_days)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to update user role"))?;

        timer.observe_duration();
        Ok(user)
    }

    #[instrument(skip(self))]
    async fn get_account(&self, account_id: i64) -> Result<Option<Account>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_account"])
            .start_timer();

        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM accounts WHERE id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to get account"))?;

        timer.observe_duration();
        Ok(account)
    }

    #[instrument(skip(self))]
    async fn get_organization(
        &self,
        organization_id: i64,
    ) -> Result<Option<Organization>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_organization"])
            .start_timer();

        let row = sqlx::query_as::<_, OrganizationRow>(
            "SELECT id, name, token, is_active FROM organizations WHERE id = $1",
        )
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to get organization"))?;

        timer.observe_duration();
        Ok(row.map(Organization::from))
    }

    #[instrument(skip(self))]
    async fn list_active_accounts(&self) -> Result<Vec<Account>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_active_accounts"])
            .start_timer();

        let accounts = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM accounts WHERE is_active ORDER BY organization_id, id",
            ACCOUNT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to list accounts"))?;

        timer.observe_duration();
        Ok(accounts)
    }

    #[instrument(skip(self))]
    async fn list_grants(&self, user_id: i64) -> Result<Vec<AccessGrant>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_grants"])
            .start_timer();

        let grants = sqlx::query_as::<_, AccessGrant>(
            r#"
            SELECT user_id, account_id, permissions
            FROM user_accounts
            WHERE user_id = $1
            ORDER BY account_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to list grants"))?;

        timer.observe_duration();
        Ok(grants)
    }

    #[instrument(skip(self))]
    async fn get_grant(
        &self,
        user_id: i64,
        account_id: i64,
    ) -> Result<Option<AccessGrant>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_grant"])
            .start_timer();

        let grant = sqlx::query_as::<_, AccessGrant>(
            "SELECT user_id, account_id, permissions FROM user_accounts WHERE user_id = $1 AND account_id = $2",
        )
        .bind(user_id)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to get grant"))?;

        timer.observe_duration();
        Ok(grant)
    }

    #[instrument(skip(self))]
    async fn set_grant(
        &self,
        user_id: i64,
        account_id: i64,
        permissions: &str,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_grant"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO user_accounts (user_id, account_id, permissions)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, account_id) DO UPDATE SET permissions = EXCLUDED.permissions
            "#,
        )
        .bind(user_id)
        .bind(account_id)
        .bind(permissions)
        .execute(&self.pool)
        .await
        .map_err(db_err("Failed to set grant"))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_grant(&self, user_id: i64, account_id: i64) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["remove_grant"])
            .start_timer();

        let result = sqlx::query("DELETE FROM user_accounts WHERE user_id = $1 AND account_id = $2")
            .bind(user_id)
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(db_err("Failed to remove grant"))?;

        timer.observe_duration();
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn list_ignore_ibans(&self) -> Result<HashSet<String>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_ignore_ibans"])
            .start_timer();

        let rows: Vec<(String,)> = sqlx::query_as("SELECT iban_norm FROM ignore_counter_iban")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err("Failed to list ignored IBANs"))?;

        timer.observe_duration();
        Ok(ignore_set(rows.into_iter().map(|(iban,)| iban)))
    }

    #[instrument(skip(self, entry), fields(user_id = entry.user_id, action = entry.action.as_str()))]
    async fn append_audit(&self, entry: &AuditEntry) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["append_audit"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO audit_log (user_id, action, params, success, outcome)
            VALUES ($1, $2, $3::jsonb, $4, $5)
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.action.as_str())
        .bind(entry.params.to_string())
        .bind(entry.success)
        .bind(&entry.outcome)
        .execute(&self.pool)
        .await
        .map_err(db_err("Failed to append audit entry"))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err("Health check failed"))?;
        Ok(())
    }
}

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use service_core::config::Config as CoreConfig;
use service_core::error::AppError;
use statement_service::config::{
    CooldownBackend, CooldownConfig, DatabaseConfig, ProviderConfig, ReportConfig,
    StatementServiceConfig,
};
use statement_service::models::{
    AccessGrant, Account, AuditEntry, Credential, Organization, OrganizationRow, Role,
    Transaction, User,
};
use statement_service::services::filter::ignore_set;
use statement_service::services::store::NEW_USER_MAX_DAYS;
use statement_service::services::{
    BankProvider, ClientInfo, Clock, CooldownStore, InMemoryCooldown, ProviderError,
    StatementEngine, StatementFetcher, Store,
};
use statement_service::startup::AppState;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

static INIT_TRACING: Once = Once::new();

pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// 2024-01-15 00:00:00 Europe/Kyiv.
pub const DAY_START: i64 = 1_705_269_600;
pub const DAY: i64 = 86_400;

pub fn tx(time: i64, amount: i64, iban: Option<&str>) -> Transaction {
    Transaction {
        time,
        amount,
        counter_iban: iban.map(str::to_string),
        comment: None,
        description: None,
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: ChronoDuration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// In-memory [`Store`].
#[derive(Default)]
pub struct MemoryStore {
    pub users: Mutex<HashMap<i64, User>>,
    pub organizations: Mutex<HashMap<i64, Organization>>,
    pub accounts: Mutex<Vec<Account>>,
    pub grants: Mutex<HashMap<(i64, i64), String>>,
    pub ignore: Mutex<Vec<String>>,
    pub audit: Mutex<Vec<AuditEntry>>,
    pub fail_audit: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_user(&self, id: i64, role: Role, max_days: i32) {
        self.users.lock().unwrap().insert(
            id,
            User {
                id,
                full_name: format!("User {}", id),
                username: None,
                role,
                max_days,
            },
        );
    }

    pub fn add_organization(&self, id: i64, name: &str, token: Option<&str>, is_active: bool) {
        let org = Organization::from(OrganizationRow {
            id,
            name: name.to_string(),
            token: token.map(str::to_string),
            is_active,
        });
        self.organizations.lock().unwrap().insert(id, org);
    }

    pub fn add_account(&self, id: i64, organization_id: i64, name: &str) {
        self.accounts.lock().unwrap().push(Account {
            id,
            organization_id,
            provider_account_id: format!("acc-{}", id),
            name: name.to_string(),
            iban: None,
            currency_code: Some(980),
            is_active: true,
        });
    }

    pub fn grant(&self, user_id: i64, account_id: i64, permissions: &str) {
        self.grants
            .lock()
            .unwrap()
            .insert((user_id, account_id), permissions.to_string());
    }

    /// Stored as given; normalization happens when the list is read.
    pub fn ignore_iban(&self, iban: &str) {
        self.ignore.lock().unwrap().push(iban.to_string());
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.lock().unwrap().clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_user(&self, user_id: i64) -> Result<Option<User>, AppError> {
        Ok(self.users.lock().unwrap().get(&user_id).cloned())
    }

    async fn upsert_user(
        &self,
        user_id: i64,
        full_name: &str,
        username: Option<&str>,
    ) -> Result<User, AppError> {
        let mut users = self.users.lock().unwrap();
        let user = users.entry(user_id).or_insert_with(|| User {
            id: user_id,
            full_name: String::new(),
            username: None,
            role: Role::Pending,
            max_days: NEW_USER_MAX_DAYS,
        });
        user.full_name = full_name.to_string();
        user.username = username.map(str::to_string);
        Ok(user.clone())
    }

    async fn update_user_role(
        &self,
        user_id: i64,
        role: Role,
        max_days: Option<i32>,
    ) -> Result<Option<User>, AppError> {
        let mut users = self.users.lock().unwrap();
        Ok(users.get_mut(&user_id).map(|user| {
            user.role = role;
            if let Some(days) = max_days {
                user.max_days = days;
            }
            user.clone()
        }))
    }

    async fn get_account(&self, account_id: i64) -> Result<Option<Account>, AppError> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == account_id)
            .cloned())
    }

    async fn get_organization(
        &self,
        organization_id: i64,
    ) -> Result<Option<Organization>, AppError> {
        Ok(self
            .organizations
            .lock()
            .unwrap()
            .get(&organization_id)
            .cloned())
    }

    async fn list_active_accounts(&self) -> Result<Vec<Account>, AppError> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.is_active)
            .cloned()
            .collect())
    }

    async fn list_grants(&self, user_id: i64) -> Result<Vec<AccessGrant>, AppError> {
        let mut grants: Vec<AccessGrant> = self
            .grants
            .lock()
            .unwrap()
            .iter()
            .filter(|((uid, _), _)| *uid == user_id)
            .map(|((uid, aid), perms)| AccessGrant {
                user_id: *uid,
                account_id: *aid,
                permissions: perms.clone(),
            })
            .collect();
        grants.sort_by_key(|g| g.account_id);
        Ok(grants)
    }

    async fn get_grant(
        &self,
        user_id: i64,
        account_id: i64,
    ) -> Result<Option<AccessGrant>, AppError> {
        Ok(self
            .grants
            .lock()
            .unwrap()
            .get(&(user_id, account_id))
            .map(|perms| AccessGrant {
                user_id,
                account_id,
                permissions: perms.clone(),
            }))
    }

    async fn set_grant(
        &self,
        user_id: i64,
        account_id: i64,
        permissions: &str,
    ) -> Result<(), AppError> {
        self.grant(user_id, account_id, permissions);
        Ok(())
    }

    async fn remove_grant(&self, user_id: i64, account_id: i64) -> Result<bool, AppError> {
        Ok(self
            .grants
            .lock()
            .unwrap()
            .remove(&(user_id, account_id))
            .is_some())
    }

    async fn list_ignore_ibans(&self) -> Result<HashSet<String>, AppError> {
        Ok(ignore_set(self.ignore.lock().unwrap().iter()))
    }

    async fn append_audit(&self, entry: &AuditEntry) -> Result<(), AppError> {
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(anyhow::anyhow!("audit table locked")));
        }
        self.audit.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}

/// Provider that replays queued pages per account and counts calls.
#[derive(Default)]
pub struct ScriptedProvider {
    pages: Mutex<HashMap<String, VecDeque<Result<Vec<Transaction>, ProviderError>>>>,
    client_info: Mutex<HashMap<String, ClientInfo>>,
    pub windows: Mutex<Vec<(String, i64, i64)>>,
    statement_calls: AtomicUsize,
    client_info_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_page(&self, account_ref: &str, page: Result<Vec<Transaction>, ProviderError>) {
        self.pages
            .lock()
            .unwrap()
            .entry(account_ref.to_string())
            .or_default()
            .push_back(page);
    }

    /// Client info served for a token.
    pub fn set_client_info(&self, token: &str, info: ClientInfo) {
        let fingerprint = Credential::new(token).unwrap().fingerprint().to_string();
        self.client_info.lock().unwrap().insert(fingerprint, info);
    }

    pub fn statement_calls(&self) -> usize {
        self.statement_calls.load(Ordering::SeqCst)
    }

    pub fn client_info_calls(&self) -> usize {
        self.client_info_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BankProvider for ScriptedProvider {
    async fn statement(
        &self,
        _credential: &Credential,
        account_ref: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<Transaction>, ProviderError> {
        self.statement_calls.fetch_add(1, Ordering::SeqCst);
        self.windows
            .lock()
            .unwrap()
            .push((account_ref.to_string(), from, to));
        self.pages
            .lock()
            .unwrap()
            .get_mut(account_ref)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn client_info(&self, credential: &Credential) -> Result<ClientInfo, ProviderError> {
        self.client_info_calls.fetch_add(1, Ordering::SeqCst);
        self.client_info
            .lock()
            .unwrap()
            .get(credential.fingerprint())
            .cloned()
            .ok_or(ProviderError::Status {
                status: 403,
                body: "unknown token".to_string(),
            })
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub provider: Arc<ScriptedProvider>,
    pub clock: Arc<ManualClock>,
    pub cooldown: Arc<InMemoryCooldown>,
}

impl Harness {
    pub fn new() -> Self {
        init_tracing();
        let clock = Arc::new(ManualClock::new(
            Utc.timestamp_opt(DAY_START + 12 * 3600, 0).unwrap(),
        ));
        Self {
            store: MemoryStore::new(),
            provider: ScriptedProvider::new(),
            cooldown: Arc::new(InMemoryCooldown::new(60, clock.clone())),
            clock,
        }
    }

    pub fn engine(&self) -> StatementEngine {
        StatementEngine::new(
            self.store.clone(),
            self.provider.clone(),
            self.cooldown.clone(),
            StatementFetcher::new(self.provider.clone(), Duration::ZERO),
            self.clock.clone(),
            chrono_tz::Europe::Kyiv,
        )
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(
            test_config(),
            self.store.clone(),
            self.provider.clone(),
            self.cooldown.clone() as Arc<dyn CooldownStore>,
            self.clock.clone(),
        )
    }
}

pub fn test_config() -> StatementServiceConfig {
    StatementServiceConfig {
        common: CoreConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        service_name: "statement-service".to_string(),
        service_version: "test".to_string(),
        log_level: "warn".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 0,
        },
        provider: ProviderConfig {
            page_pause: Duration::ZERO,
            ..ProviderConfig::default()
        },
        cooldown: CooldownConfig {
            backend: CooldownBackend::Memory,
            window_secs: 60,
            redis_url: None,
        },
        report: ReportConfig {
            timezone: chrono_tz::Europe::Kyiv,
        },
    }
}

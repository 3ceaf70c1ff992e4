//! Services for statement-service.

pub mod admin;
pub mod aggregation;
pub mod cooldown;
pub mod database;
pub mod engine;
pub mod fetcher;
pub mod filter;
pub mod metrics;
pub mod period;
pub mod permissions;
pub mod provider;
pub mod report;
pub mod store;

pub use admin::AdminService;
pub use cooldown::{Clock, CooldownStore, InMemoryCooldown, RedisCooldown, SystemClock};
pub use database::Database;
pub use engine::{AccountBalance, StatementEngine, StatementError, StatementRows};
pub use fetcher::{StatementFetcher, PAGE_SIZE};
pub use metrics::{get_metrics, init_metrics};
pub use period::{PeriodError, PeriodPreset, PeriodSpec};
pub use permissions::{PermissionResolver, VisibleAccount};
pub use provider::{BankProvider, ClientInfo, MonobankClient, ProviderAccount, ProviderError};
pub use store::Store;

pub mod accounts;
pub mod admin;
pub mod health;
pub mod statements;

pub use accounts::{list_accounts, list_balances};
pub use admin::{register_user, revoke_account, set_account_permissions, set_user_role};
pub use health::{health_check, metrics_endpoint, readiness_check};
pub use statements::{statement_report, statement_text};

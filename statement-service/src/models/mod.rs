//! Domain models for statement-service.

mod account;
mod audit;
mod credential;
mod permission;
mod transaction;
mod user;

pub use account::{currency_suffix, Account, AccountSelector, Organization, OrganizationRow};
pub use audit::{AuditAction, AuditEntry};
pub use credential::Credential;
pub use permission::{AccessGrant, Permission, PermissionSet};
pub use transaction::{flow_label, Flow, ReportRow, TimeRange, Transaction};
pub use user::{Role, User};

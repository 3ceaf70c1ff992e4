use serde::{Deserialize, Serialize};

/// Kind of operation recorded in `audit_log.action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    StatementText,
    StatementReport,
    Balances,
    SetPermissions,
    RevokeAccount,
    ApproveUser,
    RegisterUser,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StatementText => "statement_text",
            Self::StatementReport => "statement_report",
            Self::Balances => "balances",
            Self::SetPermissions => "set_permissions",
            Self::RevokeAccount => "revoke_account",
            Self::ApproveUser => "approve_user",
            Self::RegisterUser => "register_user",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub user_id: i64,
    pub action: AuditAction,
    pub params: serde_json::Value,
    pub success: bool,
    /// Short human-readable result, e.g. `ok` or the error message.
    pub outcome: String,
}

impl AuditEntry {
    pub fn new(user_id: i64, action: AuditAction, params: serde_json::Value) -> Self {
        Self {
            user_id,
            action,
            params,
            success: true,
            outcome: "ok".to_string(),
        }
    }

    pub fn with_result<T, E: std::fmt::Display>(mut self, result: &Result<T, E>) -> Self {
        if let Err(err) = result {
            self.success = false;
            self.outcome = err.to_string();
        }
        self
    }
}

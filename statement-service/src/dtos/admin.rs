use crate::models::{Role, User};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterUserRequest {
    #[validate(length(min = 1, max = 255, message = "Full name is required"))]
    pub full_name: String,
    #[validate(length(max = 255))]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    pub role: Role,
}

/// Raw permission list, e.g. `"in,out"`, `"balance"` or `"full"`.
#[derive(Debug, Deserialize, Validate)]
pub struct SetPermissionsRequest {
    #[validate(length(max = 64, message = "Permission list is too long"))]
    #[serde(default)]
    pub permissions: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub full_name: String,
    pub username: Option<String>,
    pub role: Role,
    pub max_days: i32,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            full_name: user.full_name,
            username: user.username,
            role: user.role,
            max_days: user.max_days,
        }
    }
}

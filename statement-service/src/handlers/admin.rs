use crate::dtos::{RegisterUserRequest, SetPermissionsRequest, SetRoleRequest, UserResponse};
use crate::middleware::UserId;
use crate::models::Permission;
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use service_core::error::AppError;
use validator::Validate;

/// Self-registration on first contact.
#[tracing::instrument(skip(state, request), fields(user_id = user_id.0))]
pub async fn register_user(
    State(state): State<AppState>,
    user_id: UserId,
    Json(request): Json<RegisterUserRequest>,
) -> Result<Json<UserResponse>, AppError> {
    request.validate()?;
    let user = state
        .admin
        .register_user(user_id.0, &request.full_name, request.username.as_deref())
        .await?;
    Ok(Json(user.into()))
}

#[tracing::instrument(skip(state, request), fields(actor_id = actor.0))]
pub async fn set_user_role(
    State(state): State<AppState>,
    actor: UserId,
    Path(user_id): Path<i64>,
    Json(request): Json<SetRoleRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let user = state
        .admin
        .approve_user(actor.0, user_id, request.role)
        .await?;
    Ok(Json(user.into()))
}

#[tracing::instrument(skip(state, request), fields(actor_id = actor.0))]
pub async fn set_account_permissions(
    State(state): State<AppState>,
    actor: UserId,
    Path((user_id, account_id)): Path<(i64, i64)>,
    Json(request): Json<SetPermissionsRequest>,
) -> Result<Json<Value>, AppError> {
    request.validate()?;
    let permissions = state
        .admin
        .set_account_permissions(actor.0, user_id, account_id, &request.permissions)
        .await?;
    let list: Vec<Permission> = permissions.iter().collect();
    Ok(Json(json!({
        "user_id": user_id,
        "account_id": account_id,
        "permissions": list
    })))
}

#[tracing::instrument(skip(state), fields(actor_id = actor.0))]
pub async fn revoke_account(
    State(state): State<AppState>,
    actor: UserId,
    Path((user_id, account_id)): Path<(i64, i64)>,
) -> Result<StatusCode, AppError> {
    state
        .admin
        .revoke_account(actor.0, user_id, account_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

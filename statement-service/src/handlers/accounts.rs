use crate::dtos::{AccountView, AccountsResponse, BalancesParams, BalancesResponse};
use crate::middleware::UserId;
use crate::startup::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use service_core::error::AppError;

#[tracing::instrument(skip(state), fields(user_id = user_id.0))]
pub async fn list_accounts(
    State(state): State<AppState>,
    user_id: UserId,
) -> Result<Json<AccountsResponse>, AppError> {
    let accounts = state.engine.visible_accounts(user_id.0).await?;
    Ok(Json(AccountsResponse {
        accounts: accounts.into_iter().map(AccountView::from).collect(),
    }))
}

#[tracing::instrument(skip(state, params), fields(user_id = user_id.0))]
pub async fn list_balances(
    State(state): State<AppState>,
    user_id: UserId,
    Query(params): Query<BalancesParams>,
) -> Result<Json<BalancesResponse>, AppError> {
    let selector = params.selector()?;
    let balances = state.engine.balances(user_id.0, selector).await?;
    Ok(Json(BalancesResponse { balances }))
}

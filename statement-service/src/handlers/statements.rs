use crate::dtos::{StatementRequest, TextStatementResponse};
use crate::middleware::UserId;
use crate::services::{report, StatementRows};
use crate::startup::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[tracing::instrument(skip(state, request), fields(user_id = user_id.0, account = %request.account))]
pub async fn statement_text(
    State(state): State<AppState>,
    user_id: UserId,
    Json(request): Json<StatementRequest>,
) -> Result<Json<TextStatementResponse>, AppError> {
    let text = state
        .engine
        .text_summary(user_id.0, request.account, request.period_spec())
        .await?;

    Ok(Json(TextStatementResponse { text }))
}

#[tracing::instrument(skip(state, request), fields(user_id = user_id.0, account = %request.account))]
pub async fn statement_report(
    State(state): State<AppState>,
    user_id: UserId,
    Json(request): Json<StatementRequest>,
) -> Result<impl IntoResponse, AppError> {
    let StatementRows { range, rows } = state
        .engine
        .report_rows(user_id.0, request.account, request.period_spec())
        .await?;

    let bytes = tokio::task::spawn_blocking(move || report::write_xlsx(&rows))
        .await
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Report task failed: {}", e)))??;

    let (from, to) = request.name_bounds(range, state.engine.timezone());
    let disposition = format!(
        "attachment; filename=\"{}\"",
        report::file_name(&from, &to)
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

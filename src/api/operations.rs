use crate::api::{page_limit, AppState};
use crate::domain::{Operation, OperationType};
use crate::error::AppError;
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationsQuery {
    pub limit: Option<u32>,
    #[serde(rename = "type")]
    pub operation_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationsResponse {
    pub operations: Vec<Operation>,
}

pub async fn get_operations(
    Query(params): Query<OperationsQuery>,
    State(state): State<AppState>,
) -> Result<Json<OperationsResponse>, AppError> {
    let limit = page_limit(params.limit)?;
    let type_filter = match params.operation_type.as_deref() {
        Some(t) => Some(OperationType::from_str(t).map_err(AppError::BadRequest)?),
        None => None,
    };

    let workflows = state.session.lock().await;
    let operations = workflows
        .repo
        .list_operations(&workflows.ctx.wallet, limit, type_filter)
        .await?;
    Ok(Json(OperationsResponse { operations }))
}

use crate::api::{page_limit, AppState};
use crate::domain::Position;
use crate::error::AppError;
use crate::orchestration::Resolution;
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionsQuery {
    /// Skip the cache and scan the bin window.
    pub scan: Option<bool>,
    /// Half-width of the scan window in bins.
    pub range: Option<u32>,
}

pub async fn get_positions(
    Query(params): Query<PositionsQuery>,
    State(state): State<AppState>,
) -> Result<Json<Resolution>, AppError> {
    let workflows = state.session.lock().await;
    let scan = params.scan.unwrap_or(false);
    let default_range = if scan {
        workflows.scan.deep
    } else {
        workflows.scan.display
    };
    let range = params.range.unwrap_or(default_range);
    if range > workflows.scan.deep {
        return Err(AppError::BadRequest(format!(
            "range must be at most {}",
            workflows.scan.deep
        )));
    }

    let resolution = workflows.reconciler.resolve_positions(!scan, range).await?;
    Ok(Json(resolution))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub positions: Vec<Position>,
}

/// Closed positions, most recently closed first.
pub async fn get_positions_history(
    Query(params): Query<HistoryQuery>,
    State(state): State<AppState>,
) -> Result<Json<HistoryResponse>, AppError> {
    let limit = page_limit(params.limit)?;
    let workflows = state.session.lock().await;
    let positions = workflows
        .repo
        .list_inactive_positions(&workflows.ctx.scope(), limit)
        .await
        .map_err(|e| AppError::Internal(format!("History query failed: {}", e)))?;
    Ok(Json(HistoryResponse { positions }))
}

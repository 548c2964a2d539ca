use crate::api::AppState;
use crate::domain::ResolvedPosition;
use crate::engine::RebalanceVerdict;
use crate::error::AppError;
use axum::extract::State;
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerdictResponse {
    pub active_bin: i32,
    pub positions: Vec<ResolvedPosition>,
    pub verdict: RebalanceVerdict,
}

/// What the monitor would decide right now, without acting on it.
pub async fn get_verdict(State(state): State<AppState>) -> Result<Json<VerdictResponse>, AppError> {
    let workflows = state.session.lock().await;
    let (resolution, verdict) = workflows.verdict().await?;
    Ok(Json(VerdictResponse {
        active_bin: resolution.active_bin,
        positions: resolution.positions,
        verdict,
    }))
}

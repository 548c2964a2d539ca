use crate::api::AppState;
use crate::error::AppError;
use crate::orchestration::PoolOverview;
use axum::extract::State;
use axum::Json;

/// Active bin, nearby reserves, wallet balances and positions.
pub async fn get_pool(State(state): State<AppState>) -> Result<Json<PoolOverview>, AppError> {
    let workflows = state.session.lock().await;
    let overview = workflows.pool_overview().await?;
    Ok(Json(overview))
}

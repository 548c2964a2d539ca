pub mod health;
pub mod liquidity;
pub mod operations;
pub mod pool;
pub mod positions;
pub mod rebalance;

use crate::orchestration::Session;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Default and maximum page sizes for list endpoints.
pub const DEFAULT_LIST_LIMIT: u32 = 20;
pub const MAX_LIST_LIMIT: u32 = 500;

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Session>,
}

impl AppState {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/pool", get(pool::get_pool))
        .route("/v1/positions", get(positions::get_positions))
        .route(
            "/v1/positions/history",
            get(positions::get_positions_history),
        )
        .route("/v1/operations", get(operations::get_operations))
        .route("/v1/rebalance/verdict", get(rebalance::get_verdict))
        .route("/v1/liquidity/add", post(liquidity::add))
        .route("/v1/liquidity/remove", post(liquidity::remove))
        .route("/v1/liquidity/remove-all", post(liquidity::remove_all))
        .layer(cors)
        .with_state(state)
}

pub(crate) fn page_limit(limit: Option<u32>) -> Result<u32, crate::error::AppError> {
    match limit.unwrap_or(DEFAULT_LIST_LIMIT) {
        0 => Err(crate::error::AppError::BadRequest(
            "limit must be at least 1".into(),
        )),
        n if n > MAX_LIST_LIMIT => Err(crate::error::AppError::BadRequest(format!(
            "limit must be at most {}",
            MAX_LIST_LIMIT
        ))),
        n => Ok(n),
    }
}

use crate::orchestration::{ExecutionError, ReconcileError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Chain error: {0}")]
    Upstream(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::ActiveBin(e) => AppError::Upstream(e.to_string()),
            ReconcileError::Db(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<ExecutionError> for AppError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::Reconcile(e) => e.into(),
            ExecutionError::NothingToWithdraw => AppError::NotFound(err.to_string()),
            ExecutionError::InvalidAmount { .. } => AppError::BadRequest(err.to_string()),
            ExecutionError::Gateway { .. } | ExecutionError::Balances(_) => {
                AppError::Upstream(err.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

use crate::api::AppState;
use crate::domain::Decimal;
use crate::error::AppError;
use crate::orchestration::{AddedLeg, WithdrawOutcome};
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use std::str::FromStr;
use tracing::info;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddQuery {
    pub bin_id: i32,
    /// Token amount; the token follows from the bin's side of the active bin.
    pub amount: String,
}

pub async fn add(
    Query(params): Query<AddQuery>,
    State(state): State<AppState>,
) -> Result<Json<AddedLeg>, AppError> {
    let amount = parse_amount(&params.amount)?;

    let workflows = state.session.lock().await;
    info!(bin_id = params.bin_id, amount = %amount, "Deposit requested");
    let added = workflows.executor.deposit_bin(params.bin_id, amount).await?;
    Ok(Json(added))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveQuery {
    pub bin_id: i32,
    /// LP amount to burn; the whole balance when absent.
    pub amount: Option<String>,
}

pub async fn remove(
    Query(params): Query<RemoveQuery>,
    State(state): State<AppState>,
) -> Result<Json<WithdrawOutcome>, AppError> {
    let amount = params.amount.as_deref().map(parse_amount).transpose()?;

    let workflows = state.session.lock().await;
    info!(bin_id = params.bin_id, amount = ?amount, "Withdrawal requested");
    let outcome = workflows.executor.withdraw_bin(params.bin_id, amount).await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveAllQuery {
    /// Half-width of the scan for held bins.
    pub range: Option<u32>,
}

pub async fn remove_all(
    Query(params): Query<RemoveAllQuery>,
    State(state): State<AppState>,
) -> Result<Json<WithdrawOutcome>, AppError> {
    let workflows = state.session.lock().await;
    let range = params.range.unwrap_or(workflows.scan.withdraw);
    if range > workflows.scan.deep {
        return Err(AppError::BadRequest(format!(
            "range must be at most {}",
            workflows.scan.deep
        )));
    }

    info!(range, "Withdrawal of all liquidity requested");
    let outcome = workflows.executor.withdraw_all(range).await?;
    Ok(Json(outcome))
}

fn parse_amount(raw: &str) -> Result<Decimal, AppError> {
    Decimal::from_str(raw.trim()).map_err(|_| AppError::BadRequest(format!("Invalid amount: {}", raw)))
}

//! Snapshot of the pool around the active bin and of the wallet.

use super::executor::ExecutionError;
use super::Workflows;
use crate::domain::{Address, BinReserves, Decimal, ResolvedPosition, TokenRole};
use serde::Serialize;
use tracing::warn;

/// Bins shown on each side of the active bin.
pub const NEARBY_BINS: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BinSnapshot {
    pub bin_id: i32,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserves: Option<BinReserves>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    pub role: TokenRole,
    pub token: Address,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolOverview {
    pub active_bin: i32,
    pub bins: Vec<BinSnapshot>,
    pub balances: Vec<TokenBalance>,
    pub positions: Vec<ResolvedPosition>,
}

impl Workflows {
    /// Active bin, reserves of the nearby bins, wallet balances and
    /// cache-first positions.
    ///
    /// A bin whose reserves cannot be read is reported with its error; the
    /// other reads fail the whole overview.
    pub async fn pool_overview(&self) -> Result<PoolOverview, ExecutionError> {
        let resolution = self
            .reconciler
            .resolve_positions(true, self.scan.display)
            .await?;
        let active_bin = resolution.active_bin;

        let first = active_bin.saturating_sub(NEARBY_BINS as i32).max(0);
        let last = active_bin.saturating_add(NEARBY_BINS as i32);
        let mut bins = Vec::new();
        for bin_id in first..=last {
            let snapshot = match self.gateway.bin_reserves(bin_id).await {
                Ok(reserves) => BinSnapshot {
                    bin_id,
                    active: bin_id == active_bin,
                    reserves: Some(reserves),
                    error: None,
                },
                Err(e) => {
                    warn!(bin_id, error = %e, "Could not read bin reserves");
                    BinSnapshot {
                        bin_id,
                        active: bin_id == active_bin,
                        reserves: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            bins.push(snapshot);
        }

        let mut balances = Vec::with_capacity(2);
        for role in [TokenRole::Primary, TokenRole::Paired] {
            let token = self.ctx.token_for(role).clone();
            let amount = self
                .gateway
                .token_balance(&token, &self.ctx.wallet)
                .await
                .map_err(ExecutionError::Balances)?;
            balances.push(TokenBalance {
                role,
                token,
                amount,
            });
        }

        Ok(PoolOverview {
            active_bin,
            bins,
            balances,
            positions: resolution.positions,
        })
    }
}

//! Bin-level liquidity positions, stored and resolved.

use crate::domain::{Address, Decimal, TimeMs};
use serde::{Deserialize, Serialize};

/// Reserve amounts held by a single bin, in token units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinReserves {
    pub reserve_x: Decimal,
    pub reserve_y: Decimal,
}

/// A stored position row: one wallet's LP stake in one bin of one pool.
///
/// At most one active row exists per (wallet, pool, bin_id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: i64,
    pub wallet: Address,
    pub pool: Address,
    pub bin_id: i32,
    /// LP-token amount, never negative.
    pub amount: Decimal,
    pub token_x: Address,
    pub token_y: Address,
    /// Last time the amount was observed or changed.
    pub updated_at: TimeMs,
    pub active: bool,
}

/// Fields needed to create or refresh a position row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPosition {
    pub wallet: Address,
    pub pool: Address,
    pub bin_id: i32,
    pub amount: Decimal,
    pub token_x: Address,
    pub token_y: Address,
}

/// A position verified against live chain state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPosition {
    pub bin_id: i32,
    pub lp_balance: Decimal,
    pub reserves: BinReserves,
    /// Signed `bin_id - active_bin`.
    pub distance: i32,
}

impl ResolvedPosition {
    pub fn new(bin_id: i32, lp_balance: Decimal, reserves: BinReserves, active_bin: i32) -> Self {
        Self {
            bin_id,
            lp_balance,
            reserves,
            distance: bin_id - active_bin,
        }
    }
}

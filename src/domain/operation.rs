//! Append-only audit record of liquidity operations.

use crate::domain::{Address, Decimal, TimeMs, TxHash};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Kind of on-chain liquidity mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Add,
    Remove,
    RemoveAll,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Add => "add",
            OperationType::Remove => "remove",
            OperationType::RemoveAll => "remove_all",
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(OperationType::Add),
            "remove" => Ok(OperationType::Remove),
            "remove_all" => Ok(OperationType::RemoveAll),
            other => Err(format!("unknown operation type: {}", other)),
        }
    }
}

/// A recorded operation. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub id: i64,
    pub operation_type: OperationType,
    pub wallet: Address,
    pub pool: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bin_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_x: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_y: Option<Decimal>,
    pub tx_hash: TxHash,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: TimeMs,
}

/// An operation about to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOperation {
    pub operation_type: OperationType,
    pub wallet: Address,
    pub pool: Address,
    pub bin_id: Option<i32>,
    pub amount_x: Option<Decimal>,
    pub amount_y: Option<Decimal>,
    pub tx_hash: TxHash,
    pub note: Option<String>,
}

impl NewOperation {
    pub fn new(
        operation_type: OperationType,
        wallet: Address,
        pool: Address,
        tx_hash: TxHash,
    ) -> Self {
        Self {
            operation_type,
            wallet,
            pool,
            bin_id: None,
            amount_x: None,
            amount_y: None,
            tx_hash,
            note: None,
        }
    }

    pub fn with_bin(mut self, bin_id: i32) -> Self {
        self.bin_id = Some(bin_id);
        self
    }

    pub fn with_amounts(mut self, amount_x: Decimal, amount_y: Decimal) -> Self {
        self.amount_x = Some(amount_x);
        self.amount_y = Some(amount_y);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

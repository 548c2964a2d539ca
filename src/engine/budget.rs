//! Deposit budgeting: how much of each token to add, and where.

use super::decision::optimal_bin;
use crate::config::RebalancePolicy;
use crate::domain::{Decimal, TokenRole};
use serde::Serialize;

/// Wallet balances of the two managed tokens, in token units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalletBalances {
    pub primary: Decimal,
    pub paired: Decimal,
}

/// One single-sided add.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositLeg {
    pub role: TokenRole,
    pub bin_id: i32,
    pub amount: Decimal,
}

/// Up to two independent adds, one per token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositPlan {
    pub primary: Option<DepositLeg>,
    pub paired: Option<DepositLeg>,
}

impl DepositPlan {
    pub fn is_empty(&self) -> bool {
        self.primary.is_none() && self.paired.is_none()
    }

    /// Legs in submission order: primary first.
    pub fn legs(&self) -> impl Iterator<Item = DepositLeg> {
        self.primary.into_iter().chain(self.paired)
    }
}

/// Budget a deposit around `active_bin` from the wallet's balances.
///
/// Each token keeps its reserve in the wallet; the rest is deposited only
/// when strictly above that token's minimum.
pub fn plan_deposit(
    active_bin: i32,
    balances: WalletBalances,
    policy: &RebalancePolicy,
) -> DepositPlan {
    let leg = |role: TokenRole, balance: Decimal, reserve: Decimal, minimum: Decimal| {
        let amount = balance.saturating_sub(reserve);
        (amount > minimum).then(|| DepositLeg {
            role,
            bin_id: optimal_bin(active_bin, role),
            amount,
        })
    };

    DepositPlan {
        primary: leg(
            TokenRole::Primary,
            balances.primary,
            policy.primary_reserve,
            policy.primary_min_deposit,
        ),
        paired: leg(
            TokenRole::Paired,
            balances.paired,
            policy.paired_reserve,
            policy.paired_min_deposit,
        ),
    }
}

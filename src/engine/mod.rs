//! Pure decision logic: no I/O, no clock.

pub mod budget;
pub mod decision;

pub use budget::{plan_deposit, DepositLeg, DepositPlan, WalletBalances};
pub use decision::{optimal_bin, should_rebalance, Breach, RebalanceVerdict};

//! Multi-step liquidity workflows: withdraw, budget, redeposit.
//!
//! Every confirmed transaction is recorded as an operation together with the
//! position rows it changed. A store failure at that point is logged and the
//! workflow carries on; the chain stays authoritative and the next
//! reconciliation repairs the cache.

use super::reconcile::{ReconcileError, Reconciler, ResolutionSource};
use super::PoolContext;
use crate::config::RebalancePolicy;
use crate::db::repo::BinRemainder;
use crate::db::Repository;
use crate::domain::{Decimal, OperationType, TokenRole, TxHash};
use crate::engine::{plan_deposit, DepositLeg, DepositPlan, WalletBalances};
use crate::gateway::{BinWithdrawal, GatewayError, PoolGateway};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error("No liquidity to withdraw")]
    NothingToWithdraw,
    #[error("Invalid amount {amount} for bin {bin_id}: {reason}")]
    InvalidAmount {
        bin_id: i32,
        amount: Decimal,
        reason: String,
    },
    #[error("{operation} failed: {source}")]
    Gateway {
        operation: OperationType,
        #[source]
        source: GatewayError,
    },
    #[error("Failed to read wallet balances: {0}")]
    Balances(GatewayError),
}

/// A confirmed removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawOutcome {
    pub tx_hash: TxHash,
    pub bins: Vec<i32>,
}

/// A confirmed single-sided add.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddedLeg {
    pub leg: DepositLeg,
    pub tx_hash: TxHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedLeg {
    pub leg: DepositLeg,
    pub error: String,
}

/// Result of a deposit phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositOutcome {
    pub active_bin: i32,
    pub plan: DepositPlan,
    pub added: Vec<AddedLeg>,
    pub failed: Vec<FailedLeg>,
}

impl DepositOutcome {
    /// At least one add went through.
    pub fn is_success(&self) -> bool {
        !self.added.is_empty()
    }

    /// Nothing was worth depositing.
    pub fn declined(&self) -> bool {
        self.plan.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RebalanceOutcome {
    /// The withdrawal did not happen; nothing changed.
    Aborted { reason: String },
    /// Liquidity was withdrawn but none of it went back in.
    Withdrawn {
        withdrawal: WithdrawOutcome,
        reason: String,
    },
    Rebalanced {
        withdrawal: WithdrawOutcome,
        deposit: DepositOutcome,
    },
}

impl RebalanceOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RebalanceOutcome::Rebalanced { .. })
    }
}

#[derive(Clone)]
pub struct RebalanceExecutor {
    gateway: Arc<dyn PoolGateway>,
    repo: Arc<Repository>,
    reconciler: Reconciler,
    ctx: PoolContext,
    policy: RebalancePolicy,
}

impl RebalanceExecutor {
    pub fn new(
        gateway: Arc<dyn PoolGateway>,
        repo: Arc<Repository>,
        reconciler: Reconciler,
        ctx: PoolContext,
        policy: RebalancePolicy,
    ) -> Self {
        Self {
            gateway,
            repo,
            reconciler,
            ctx,
            policy,
        }
    }

    /// Withdraw everything the wallet holds in one transaction.
    ///
    /// Covers verified stored positions wherever they sit, plus every bin
    /// held within `half_width` of the active bin.
    pub async fn withdraw_all(&self, half_width: u32) -> Result<WithdrawOutcome, ExecutionError> {
        let bins = self.held_bins(half_width).await?;
        if bins.is_empty() {
            return Err(ExecutionError::NothingToWithdraw);
        }

        let withdrawals: Vec<BinWithdrawal> = bins.iter().copied().map(BinWithdrawal::all).collect();
        info!(wallet = %self.ctx.wallet, ?bins, "Withdrawing liquidity from all bins");

        let tx_hash = self
            .gateway
            .remove_liquidity(&withdrawals)
            .await
            .map_err(|source| {
                error!(wallet = %self.ctx.wallet, ?bins, operation = %OperationType::RemoveAll, error = %source, "Withdrawal failed");
                ExecutionError::Gateway {
                    operation: OperationType::RemoveAll,
                    source,
                }
            })?;

        let note = format!(
            "Removed liquidity from bins: {}",
            bins.iter()
                .map(|b| b.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        let op = self
            .ctx
            .operation(OperationType::RemoveAll, tx_hash.clone())
            .with_note(note);
        let remainders: Vec<BinRemainder> = bins.iter().copied().map(BinRemainder::emptied).collect();
        if let Err(e) = self.repo.record_withdrawal(&op, &remainders).await {
            error!(wallet = %self.ctx.wallet, tx_hash = %tx_hash, ?bins, operation = %OperationType::RemoveAll, error = %e, "Failed to record confirmed withdrawal");
        }

        info!(tx_hash = %tx_hash, ?bins, "Withdrawal confirmed");
        Ok(WithdrawOutcome { tx_hash, bins })
    }

    async fn held_bins(&self, half_width: u32) -> Result<Vec<i32>, ReconcileError> {
        let active_bin = self.gateway.active_bin().await?;
        let cached = self
            .reconciler
            .resolve_at(active_bin, true, half_width)
            .await?;
        let mut bins: BTreeSet<i32> = cached.bins().into_iter().collect();
        // A cache hit does not cover untracked bins in the window.
        if cached.source == ResolutionSource::Cache {
            let scanned = self
                .reconciler
                .resolve_at(active_bin, false, half_width)
                .await?;
            bins.extend(scanned.bins());
        }
        Ok(bins.into_iter().collect())
    }

    /// Withdraw `amount` LP tokens from one bin, or all of them when `None`.
    pub async fn withdraw_bin(
        &self,
        bin_id: i32,
        amount: Option<Decimal>,
    ) -> Result<WithdrawOutcome, ExecutionError> {
        let held = self
            .gateway
            .lp_balance(&self.ctx.wallet, bin_id)
            .await
            .map_err(|source| ExecutionError::Gateway {
                operation: OperationType::Remove,
                source,
            })?;
        if !held.is_positive() {
            return Err(ExecutionError::NothingToWithdraw);
        }

        let requested = match amount {
            Some(a) if !a.is_positive() => {
                return Err(ExecutionError::InvalidAmount {
                    bin_id,
                    amount: a,
                    reason: "must be positive".to_string(),
                })
            }
            Some(a) if a > held => {
                return Err(ExecutionError::InvalidAmount {
                    bin_id,
                    amount: a,
                    reason: format!("exceeds balance {}", held),
                })
            }
            Some(a) if a < held => Some(a),
            _ => None,
        };
        let withdrawal = match requested {
            Some(a) => BinWithdrawal::partial(bin_id, a),
            None => BinWithdrawal::all(bin_id),
        };
        let burned = requested.unwrap_or(held);

        let tx_hash = self
            .gateway
            .remove_liquidity(&[withdrawal])
            .await
            .map_err(|source| {
                error!(wallet = %self.ctx.wallet, bin_id, operation = %OperationType::Remove, error = %source, "Withdrawal failed");
                ExecutionError::Gateway {
                    operation: OperationType::Remove,
                    source,
                }
            })?;

        let remaining = match self.gateway.lp_balance(&self.ctx.wallet, bin_id).await {
            Ok(lp) => lp,
            Err(e) => {
                warn!(bin_id, error = %e, "Could not read post-withdrawal balance, assuming requested amount burned");
                held.saturating_sub(burned)
            }
        };

        let op = self
            .ctx
            .operation(OperationType::Remove, tx_hash.clone())
            .with_bin(bin_id)
            .with_note(format!("Removed {} LP tokens", burned));
        let remainder = BinRemainder { bin_id, remaining };
        if let Err(e) = self.repo.record_withdrawal(&op, &[remainder]).await {
            error!(wallet = %self.ctx.wallet, tx_hash = %tx_hash, bin_id, operation = %OperationType::Remove, error = %e, "Failed to record confirmed withdrawal");
        }

        info!(tx_hash = %tx_hash, bin_id, burned = %burned, remaining = %remaining, "Withdrawal confirmed");
        Ok(WithdrawOutcome {
            tx_hash,
            bins: vec![bin_id],
        })
    }

    /// Deposit the wallet's spare balances around the current active bin.
    pub async fn redeposit(&self, active_bin: i32) -> Result<DepositOutcome, ExecutionError> {
        let primary = self
            .gateway
            .token_balance(self.ctx.token_for(TokenRole::Primary), &self.ctx.wallet)
            .await
            .map_err(ExecutionError::Balances)?;
        let paired = self
            .gateway
            .token_balance(self.ctx.token_for(TokenRole::Paired), &self.ctx.wallet)
            .await
            .map_err(ExecutionError::Balances)?;

        let plan = plan_deposit(active_bin, WalletBalances { primary, paired }, &self.policy);
        if plan.is_empty() {
            info!(
                wallet = %self.ctx.wallet,
                primary = %primary,
                paired = %paired,
                "Balances below deposit minimums, nothing to add"
            );
        }

        let mut added = Vec::new();
        let mut failed = Vec::new();
        for leg in plan.legs() {
            match self.deposit_leg(leg).await {
                Ok(tx_hash) => added.push(AddedLeg { leg, tx_hash }),
                Err(e) => {
                    error!(
                        wallet = %self.ctx.wallet,
                        bin_id = leg.bin_id,
                        role = %leg.role,
                        amount = %leg.amount,
                        operation = %OperationType::Add,
                        error = %e,
                        "Add liquidity failed"
                    );
                    failed.push(FailedLeg {
                        leg,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(DepositOutcome {
            active_bin,
            plan,
            added,
            failed,
        })
    }

    /// Single-sided add of `amount` into one chosen bin.
    ///
    /// Bins above the active bin take the primary token; the active bin and
    /// everything below take the paired token.
    pub async fn deposit_bin(
        &self,
        bin_id: i32,
        amount: Decimal,
    ) -> Result<AddedLeg, ExecutionError> {
        if !amount.is_positive() {
            return Err(ExecutionError::InvalidAmount {
                bin_id,
                amount,
                reason: "must be positive".to_string(),
            });
        }

        let active_bin = self
            .gateway
            .active_bin()
            .await
            .map_err(|source| ExecutionError::Gateway {
                operation: OperationType::Add,
                source,
            })?;
        let role = if bin_id > active_bin {
            TokenRole::Primary
        } else {
            TokenRole::Paired
        };
        let balance = self
            .gateway
            .token_balance(self.ctx.token_for(role), &self.ctx.wallet)
            .await
            .map_err(ExecutionError::Balances)?;
        if amount > balance {
            return Err(ExecutionError::InvalidAmount {
                bin_id,
                amount,
                reason: format!("exceeds {} balance {}", role, balance),
            });
        }

        let leg = DepositLeg {
            role,
            bin_id,
            amount,
        };
        info!(wallet = %self.ctx.wallet, bin_id, active_bin, role = %role, amount = %amount, "Manual deposit requested");
        let tx_hash = self.deposit_leg(leg).await.map_err(|source| {
            error!(wallet = %self.ctx.wallet, bin_id, operation = %OperationType::Add, error = %source, "Add liquidity failed");
            ExecutionError::Gateway {
                operation: OperationType::Add,
                source,
            }
        })?;
        Ok(AddedLeg { leg, tx_hash })
    }

    /// Initial deposit when the wallet holds no positions.
    pub async fn seed(&self, active_bin: i32) -> Result<DepositOutcome, ExecutionError> {
        info!(wallet = %self.ctx.wallet, active_bin, "No positions, seeding");
        self.redeposit(active_bin).await
    }

    /// Withdraw everything, then redeposit around `active_bin`.
    ///
    /// Both legs are placed relative to the bin passed in, the one the
    /// decision was made on. A failed withdrawal aborts before any add is
    /// attempted.
    pub async fn rebalance(&self, active_bin: i32, withdraw_half_width: u32) -> RebalanceOutcome {
        let withdrawal = match self.withdraw_all(withdraw_half_width).await {
            Ok(w) => w,
            Err(e) => {
                warn!(wallet = %self.ctx.wallet, active_bin, error = %e, "Rebalance aborted before redeposit");
                return RebalanceOutcome::Aborted {
                    reason: e.to_string(),
                };
            }
        };

        match self.redeposit(active_bin).await {
            Ok(deposit) if deposit.is_success() => {
                if !deposit.failed.is_empty() {
                    warn!(failed = deposit.failed.len(), "Rebalance completed with a one-sided deposit");
                }
                RebalanceOutcome::Rebalanced {
                    withdrawal,
                    deposit,
                }
            }
            Ok(deposit) => {
                let reason = if deposit.declined() {
                    "balances below deposit minimums".to_string()
                } else {
                    format!("{} add(s) failed", deposit.failed.len())
                };
                error!(wallet = %self.ctx.wallet, tx_hash = %withdrawal.tx_hash, %reason, "Liquidity withdrawn but not redeposited");
                RebalanceOutcome::Withdrawn { withdrawal, reason }
            }
            Err(e) => {
                error!(wallet = %self.ctx.wallet, tx_hash = %withdrawal.tx_hash, error = %e, "Liquidity withdrawn but not redeposited");
                RebalanceOutcome::Withdrawn {
                    withdrawal,
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn deposit_leg(&self, leg: DepositLeg) -> Result<TxHash, GatewayError> {
        let token = self.ctx.token_for(leg.role);
        let allowance = self
            .gateway
            .allowance(token, &self.ctx.wallet, &self.ctx.router)
            .await?;
        if allowance < leg.amount {
            info!(token = %token, amount = %leg.amount, "Approving router");
            self.gateway
                .approve(token, &self.ctx.router, leg.amount)
                .await?;
        }

        let (amount_x, amount_y) = self.ctx.amounts_for(leg.role, leg.amount);
        let tx_hash = self
            .gateway
            .add_liquidity(leg.bin_id, amount_x, amount_y)
            .await?;

        let position = match self.gateway.lp_balance(&self.ctx.wallet, leg.bin_id).await {
            Ok(lp) => Some(self.ctx.new_position(leg.bin_id, lp)),
            Err(e) => {
                warn!(bin_id = leg.bin_id, error = %e, "Could not read post-deposit LP balance");
                None
            }
        };
        let op = self
            .ctx
            .operation(OperationType::Add, tx_hash.clone())
            .with_bin(leg.bin_id)
            .with_amounts(amount_x, amount_y);
        if let Err(e) = self.repo.record_deposit(&op, position.as_ref()).await {
            error!(wallet = %self.ctx.wallet, tx_hash = %tx_hash, bin_id = leg.bin_id, operation = %OperationType::Add, error = %e, "Failed to record confirmed deposit");
        }

        info!(tx_hash = %tx_hash, bin_id = leg.bin_id, role = %leg.role, amount = %leg.amount, "Deposit confirmed");
        Ok(tx_hash)
    }
}

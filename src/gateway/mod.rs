//! Pool gateway abstraction: live reads and confirmed writes against one pool.

use crate::domain::{Address, BinReserves, Decimal, TxHash};
use async_trait::async_trait;
use std::fmt;

pub mod lb;
pub mod mock;
pub mod units;

pub use lb::LbPoolGateway;
pub use mock::{MockCall, MockPoolGateway};

/// Token pair of the managed pool, in the pool's X/Y order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolTokens {
    pub token_x: Address,
    pub token_y: Address,
}

/// One entry of a batched removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinWithdrawal {
    pub bin_id: i32,
    /// LP amount to burn; `None` burns the bin's whole on-chain balance.
    pub amount: Option<Decimal>,
}

impl BinWithdrawal {
    pub fn all(bin_id: i32) -> Self {
        Self {
            bin_id,
            amount: None,
        }
    }

    pub fn partial(bin_id: i32, amount: Decimal) -> Self {
        Self {
            bin_id,
            amount: Some(amount),
        }
    }
}

/// Read and write access to the managed pool and its router.
///
/// The pool, router and signing wallet are bound when the implementation is
/// constructed. Every write blocks until the transaction reaches a terminal
/// state or the confirmation timeout expires.
#[async_trait]
pub trait PoolGateway: Send + Sync + fmt::Debug {
    /// Token X / token Y of the pool.
    async fn pool_tokens(&self) -> Result<PoolTokens, GatewayError>;

    /// Id of the bin matching the pool's current price.
    async fn active_bin(&self) -> Result<i32, GatewayError>;

    /// Live reserves of a bin.
    async fn bin_reserves(&self, bin_id: i32) -> Result<BinReserves, GatewayError>;

    /// ERC-20 balance of `owner`, in token units.
    async fn token_balance(&self, token: &Address, owner: &Address)
        -> Result<Decimal, GatewayError>;

    /// LP-token balance of `owner` in one bin.
    async fn lp_balance(&self, owner: &Address, bin_id: i32) -> Result<Decimal, GatewayError>;

    /// ERC-20 allowance granted by `owner` to `spender`, in token units.
    async fn allowance(
        &self,
        token: &Address,
        owner: &Address,
        spender: &Address,
    ) -> Result<Decimal, GatewayError>;

    /// Approve `spender` for `amount` of `token`.
    async fn approve(
        &self,
        token: &Address,
        spender: &Address,
        amount: Decimal,
    ) -> Result<TxHash, GatewayError>;

    /// Deposit into a single bin.
    async fn add_liquidity(
        &self,
        bin_id: i32,
        amount_x: Decimal,
        amount_y: Decimal,
    ) -> Result<TxHash, GatewayError>;

    /// Burn LP tokens from several bins in one transaction.
    async fn remove_liquidity(&self, withdrawals: &[BinWithdrawal])
        -> Result<TxHash, GatewayError>;
}

/// Error type for gateway operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// A read call failed (network error, RPC error, contract revert on a view)
    Call(String),
    /// A transaction could not be built or submitted
    Submit(String),
    /// A transaction was mined but reverted
    Reverted { tx_hash: TxHash },
    /// A transaction was submitted but no receipt arrived in time
    ConfirmationTimeout { tx_hash: TxHash },
    /// A value could not be converted between raw units and decimals
    Decode(String),
}

impl GatewayError {
    /// Whether retrying the same call later can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Call(_) | GatewayError::Submit(_) | GatewayError::ConfirmationTimeout { .. }
        )
    }

    /// Hash of the submitted transaction, when one exists.
    pub fn tx_hash(&self) -> Option<&TxHash> {
        match self {
            GatewayError::Reverted { tx_hash } | GatewayError::ConfirmationTimeout { tx_hash } => {
                Some(tx_hash)
            }
            _ => None,
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Call(msg) => write!(f, "Call failed: {}", msg),
            GatewayError::Submit(msg) => write!(f, "Submit failed: {}", msg),
            GatewayError::Reverted { tx_hash } => write!(f, "Transaction {} reverted", tx_hash),
            GatewayError::ConfirmationTimeout { tx_hash } => {
                write!(f, "Transaction {} not confirmed before timeout", tx_hash)
            }
            GatewayError::Decode(msg) => write!(f, "Decode error: {}", msg),
        }
    }
}

impl std::error::Error for GatewayError {}

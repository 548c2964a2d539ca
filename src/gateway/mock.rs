//! Mock pool gateway for testing without network calls.
//!
//! Simulates a single wallet in a single pool. LP tokens are minted 1:1 with
//! the deposited amounts and burning them returns a proportional share of what
//! the bin received.

use super::{BinWithdrawal, GatewayError, PoolGateway, PoolTokens};
use crate::domain::{Address, BinReserves, Decimal, TxHash};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A state-changing call received by the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Approve {
        token: Address,
        spender: Address,
        amount: Decimal,
    },
    AddLiquidity {
        bin_id: i32,
        amount_x: Decimal,
        amount_y: Decimal,
    },
    RemoveLiquidity {
        withdrawals: Vec<BinWithdrawal>,
    },
}

#[derive(Debug, Default)]
struct MockState {
    active_bin: i32,
    reserves: HashMap<i32, BinReserves>,
    lp: HashMap<i32, Decimal>,
    // Token amounts backing the wallet's LP in each bin.
    backing: HashMap<i32, BinReserves>,
    balances: HashMap<String, Decimal>,
    allowances: HashMap<(String, String), Decimal>,
    failing_bins: HashSet<i32>,
    unreachable: bool,
    remove_failure: Option<MockFailure>,
    failing_add_tokens: HashSet<String>,
    calls: Vec<MockCall>,
    tx_counter: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MockFailure {
    Revert,
    Timeout,
}

/// Mock gateway with builder-style setup, a call log and failure injection.
#[derive(Debug)]
pub struct MockPoolGateway {
    tokens: PoolTokens,
    router: Address,
    state: Mutex<MockState>,
}

fn key(address: &Address) -> String {
    address.as_str().to_ascii_lowercase()
}

impl MockPoolGateway {
    /// Create a mock pool with no liquidity and empty balances.
    ///
    /// Adds only succeed when `router` holds enough allowance for each token supplied.
    pub fn new(tokens: PoolTokens, router: Address, active_bin: i32) -> Self {
        Self {
            tokens,
            router,
            state: Mutex::new(MockState {
                active_bin,
                ..MockState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Give the wallet an LP balance in a bin, with no tokens backing it.
    pub fn with_lp(self, bin_id: i32, amount: Decimal) -> Self {
        self.state().lp.insert(bin_id, amount);
        self
    }

    /// Give the wallet an LP balance in a bin backed by the given token amounts.
    pub fn with_position(self, bin_id: i32, amount: Decimal, backing: BinReserves) -> Self {
        {
            let mut state = self.state();
            state.lp.insert(bin_id, amount);
            state.backing.insert(bin_id, backing);
            let reserves = state.reserves.entry(bin_id).or_default();
            reserves.reserve_x += backing.reserve_x;
            reserves.reserve_y += backing.reserve_y;
        }
        self
    }

    /// Set the live reserves reported for a bin.
    pub fn with_reserves(self, bin_id: i32, reserves: BinReserves) -> Self {
        self.state().reserves.insert(bin_id, reserves);
        self
    }

    /// Set the wallet's balance of a token.
    pub fn with_balance(self, token: &Address, amount: Decimal) -> Self {
        self.state().balances.insert(key(token), amount);
        self
    }

    /// Pre-approve a spender.
    pub fn with_allowance(self, token: &Address, spender: &Address, amount: Decimal) -> Self {
        self.state()
            .allowances
            .insert((key(token), key(spender)), amount);
        self
    }

    /// Make balance and reserve reads for a bin fail.
    pub fn with_failing_bin(self, bin_id: i32) -> Self {
        self.state().failing_bins.insert(bin_id);
        self
    }

    /// Make every removal revert.
    pub fn with_reverting_remove(self) -> Self {
        self.state().remove_failure = Some(MockFailure::Revert);
        self
    }

    /// Make every removal time out waiting for a receipt.
    pub fn with_unconfirmed_remove(self) -> Self {
        self.state().remove_failure = Some(MockFailure::Timeout);
        self
    }

    /// Make adds that supply `token` revert.
    pub fn with_reverting_add(self, token: &Address) -> Self {
        self.state().failing_add_tokens.insert(key(token));
        self
    }

    /// Move the pool price.
    pub fn set_active_bin(&self, bin_id: i32) {
        self.state().active_bin = bin_id;
    }

    /// Make every read fail (or succeed again).
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    /// Stop failing reads for a bin.
    pub fn heal_bin(&self, bin_id: i32) {
        self.state().failing_bins.remove(&bin_id);
    }

    /// Every state-changing call received so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    pub fn add_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockCall::AddLiquidity { .. }))
            .count()
    }

    pub fn remove_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockCall::RemoveLiquidity { .. }))
            .count()
    }

    /// Current LP balance held in a bin.
    pub fn lp(&self, bin_id: i32) -> Decimal {
        self.state().lp.get(&bin_id).copied().unwrap_or_default()
    }

    /// Current wallet balance of a token.
    pub fn balance(&self, token: &Address) -> Decimal {
        self.state()
            .balances
            .get(&key(token))
            .copied()
            .unwrap_or_default()
    }

    /// Bins where the wallet holds a positive LP balance, ascending.
    pub fn held_bins(&self) -> Vec<i32> {
        let state = self.state();
        let mut bins: Vec<i32> = state
            .lp
            .iter()
            .filter(|(_, amount)| amount.is_positive())
            .map(|(bin, _)| *bin)
            .collect();
        bins.sort_unstable();
        bins
    }

    fn check_read(state: &MockState, bin_id: Option<i32>) -> Result<(), GatewayError> {
        if state.unreachable {
            return Err(GatewayError::Call("connection refused".to_string()));
        }
        if let Some(bin) = bin_id {
            if state.failing_bins.contains(&bin) {
                return Err(GatewayError::Call(format!("bin {} query failed", bin)));
            }
        }
        Ok(())
    }

    fn next_tx(state: &mut MockState) -> TxHash {
        state.tx_counter += 1;
        TxHash::new(format!("0x{:064x}", state.tx_counter))
    }

    fn credit(state: &mut MockState, token: &Address, amount: Decimal) {
        *state.balances.entry(key(token)).or_default() += amount;
    }

    fn debit(state: &mut MockState, token: &Address, amount: Decimal) -> Result<(), String> {
        let balance = state.balances.entry(key(token)).or_default();
        if *balance < amount {
            return Err(format!("insufficient {} balance", token));
        }
        *balance -= amount;
        Ok(())
    }
}

#[async_trait]
impl PoolGateway for MockPoolGateway {
    async fn pool_tokens(&self) -> Result<PoolTokens, GatewayError> {
        Self::check_read(&self.state(), None)?;
        Ok(self.tokens.clone())
    }

    async fn active_bin(&self) -> Result<i32, GatewayError> {
        let state = self.state();
        Self::check_read(&state, None)?;
        Ok(state.active_bin)
    }

    async fn bin_reserves(&self, bin_id: i32) -> Result<BinReserves, GatewayError> {
        let state = self.state();
        Self::check_read(&state, Some(bin_id))?;
        Ok(state.reserves.get(&bin_id).copied().unwrap_or_default())
    }

    async fn token_balance(
        &self,
        token: &Address,
        _owner: &Address,
    ) -> Result<Decimal, GatewayError> {
        let state = self.state();
        Self::check_read(&state, None)?;
        Ok(state.balances.get(&key(token)).copied().unwrap_or_default())
    }

    async fn lp_balance(&self, _owner: &Address, bin_id: i32) -> Result<Decimal, GatewayError> {
        let state = self.state();
        Self::check_read(&state, Some(bin_id))?;
        Ok(state.lp.get(&bin_id).copied().unwrap_or_default())
    }

    async fn allowance(
        &self,
        token: &Address,
        _owner: &Address,
        spender: &Address,
    ) -> Result<Decimal, GatewayError> {
        let state = self.state();
        Self::check_read(&state, None)?;
        Ok(state
            .allowances
            .get(&(key(token), key(spender)))
            .copied()
            .unwrap_or_default())
    }

    async fn approve(
        &self,
        token: &Address,
        spender: &Address,
        amount: Decimal,
    ) -> Result<TxHash, GatewayError> {
        let mut state = self.state();
        state.calls.push(MockCall::Approve {
            token: token.clone(),
            spender: spender.clone(),
            amount,
        });
        state
            .allowances
            .insert((key(token), key(spender)), amount);
        Ok(Self::next_tx(&mut state))
    }

    async fn add_liquidity(
        &self,
        bin_id: i32,
        amount_x: Decimal,
        amount_y: Decimal,
    ) -> Result<TxHash, GatewayError> {
        let mut state = self.state();
        state.calls.push(MockCall::AddLiquidity {
            bin_id,
            amount_x,
            amount_y,
        });
        let tx_hash = Self::next_tx(&mut state);

        let token_x = self.tokens.token_x.clone();
        let token_y = self.tokens.token_y.clone();
        for (token, amount) in [(&token_x, amount_x), (&token_y, amount_y)] {
            if !amount.is_positive() {
                continue;
            }
            if state.failing_add_tokens.contains(&key(token)) {
                return Err(GatewayError::Reverted { tx_hash });
            }
            let allowed = state
                .allowances
                .get(&(key(token), key(&self.router)))
                .copied()
                .unwrap_or_default();
            if allowed < amount {
                return Err(GatewayError::Reverted { tx_hash });
            }
        }

        Self::debit(&mut state, &token_x, amount_x).map_err(GatewayError::Submit)?;
        if let Err(e) = Self::debit(&mut state, &token_y, amount_y) {
            Self::credit(&mut state, &token_x, amount_x);
            return Err(GatewayError::Submit(e));
        }

        *state.lp.entry(bin_id).or_default() += amount_x + amount_y;
        let backing = state.backing.entry(bin_id).or_default();
        backing.reserve_x += amount_x;
        backing.reserve_y += amount_y;
        let reserves = state.reserves.entry(bin_id).or_default();
        reserves.reserve_x += amount_x;
        reserves.reserve_y += amount_y;
        Ok(tx_hash)
    }

    async fn remove_liquidity(
        &self,
        withdrawals: &[BinWithdrawal],
    ) -> Result<TxHash, GatewayError> {
        let mut state = self.state();
        state.calls.push(MockCall::RemoveLiquidity {
            withdrawals: withdrawals.to_vec(),
        });
        let tx_hash = Self::next_tx(&mut state);

        match state.remove_failure {
            Some(MockFailure::Revert) => return Err(GatewayError::Reverted { tx_hash }),
            Some(MockFailure::Timeout) => {
                return Err(GatewayError::ConfirmationTimeout { tx_hash })
            }
            None => {}
        }

        for withdrawal in withdrawals {
            let held = state.lp.get(&withdrawal.bin_id).copied().unwrap_or_default();
            let burn = withdrawal.amount.unwrap_or(held);
            if burn > held || !burn.is_positive() {
                return Err(GatewayError::Reverted { tx_hash });
            }
        }

        let token_x = self.tokens.token_x.clone();
        let token_y = self.tokens.token_y.clone();
        for withdrawal in withdrawals {
            let held = state.lp.get(&withdrawal.bin_id).copied().unwrap_or_default();
            let burn = withdrawal.amount.unwrap_or(held);
            let share = burn / held;
            let backing = state
                .backing
                .get(&withdrawal.bin_id)
                .copied()
                .unwrap_or_default();
            let out_x = backing.reserve_x * share;
            let out_y = backing.reserve_y * share;

            state.lp.insert(withdrawal.bin_id, held - burn);
            state.backing.insert(
                withdrawal.bin_id,
                BinReserves {
                    reserve_x: backing.reserve_x - out_x,
                    reserve_y: backing.reserve_y - out_y,
                },
            );
            if let Some(reserves) = state.reserves.get_mut(&withdrawal.bin_id) {
                reserves.reserve_x = reserves.reserve_x.saturating_sub(out_x);
                reserves.reserve_y = reserves.reserve_y.saturating_sub(out_y);
            }
            Self::credit(&mut state, &token_x, out_x);
            Self::credit(&mut state, &token_y, out_y);
        }
        Ok(tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn tokens() -> PoolTokens {
        PoolTokens {
            token_x: Address::new("0xB31f66AA3C1e785363F0875A1B74E27b85FD66c7"),
            token_y: Address::new("0x152b9d0fdc40c096757f570a51e494bd4b943e50"),
        }
    }

    fn owner() -> Address {
        Address::new("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
    }

    fn router() -> Address {
        Address::new("0x18556DA13313f3532c54711497A8FedAC273220E")
    }

    #[tokio::test]
    async fn test_failing_bin_only_fails_that_bin() {
        let mock = MockPoolGateway::new(tokens(), router(), 100)
            .with_lp(100, d("1"))
            .with_lp(101, d("2"))
            .with_failing_bin(101);

        assert_eq!(mock.lp_balance(&owner(), 100).await.unwrap(), d("1"));
        assert!(mock.lp_balance(&owner(), 101).await.is_err());

        mock.heal_bin(101);
        assert_eq!(mock.lp_balance(&owner(), 101).await.unwrap(), d("2"));
    }

    #[tokio::test]
    async fn test_add_requires_allowance() {
        let t = tokens();
        let mock = MockPoolGateway::new(t.clone(), router(), 100).with_balance(&t.token_x, d("5"));

        let err = mock.add_liquidity(101, d("1"), Decimal::zero()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Reverted { .. }));

        mock.approve(&t.token_x, &router(), d("1")).await.unwrap();
        mock.add_liquidity(101, d("1"), Decimal::zero()).await.unwrap();
        assert_eq!(mock.lp(101), d("1"));
        assert_eq!(mock.balance(&t.token_x), d("4"));
    }

    #[tokio::test]
    async fn test_remove_returns_backing_tokens() {
        let t = tokens();
        let mock = MockPoolGateway::new(t.clone(), router(), 100).with_position(
            99,
            d("4"),
            BinReserves {
                reserve_x: Decimal::zero(),
                reserve_y: d("0.002"),
            },
        );

        mock.remove_liquidity(&[BinWithdrawal::partial(99, d("1"))])
            .await
            .unwrap();
        assert_eq!(mock.lp(99), d("3"));
        assert_eq!(mock.balance(&t.token_y), d("0.0005"));

        mock.remove_liquidity(&[BinWithdrawal::all(99)]).await.unwrap();
        assert!(mock.lp(99).is_zero());
        assert_eq!(mock.balance(&t.token_y), d("0.002"));
        assert!(mock.held_bins().is_empty());
    }

    #[tokio::test]
    async fn test_reverting_remove_leaves_state() {
        let mock = MockPoolGateway::new(tokens(), router(), 100)
            .with_lp(100, d("1"))
            .with_reverting_remove();

        let err = mock
            .remove_liquidity(&[BinWithdrawal::all(100)])
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Reverted { .. }));
        assert_eq!(mock.lp(100), d("1"));
        assert_eq!(mock.remove_calls(), 1);
    }
}

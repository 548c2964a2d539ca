//! Liquidity Book (v2.2) pool gateway over JSON-RPC.

use super::units::{self, LP_DECIMALS};
use super::{BinWithdrawal, GatewayError, PoolGateway, PoolTokens};
use crate::config::{ChainSettings, Config};
use crate::domain::{Address, BinReserves, Decimal, TxHash};
use alloy::network::{Ethereum, EthereumWallet};
use alloy::primitives::aliases::U24;
use alloy::primitives::{Address as EvmAddress, I256, U256};
use alloy::providers::{
    DynProvider, PendingTransactionBuilder, PendingTransactionError, Provider, ProviderBuilder,
    WatchTxError,
};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use chrono::Utc;
use std::fmt;
use std::future::Future;
use tracing::{debug, info, warn};

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    contract ILBPair {
        function getActiveId() external view returns (uint24 activeId);
        function getBin(uint24 id) external view returns (uint128 binReserveX, uint128 binReserveY);
        function getTokenX() external view returns (address tokenX);
        function getTokenY() external view returns (address tokenY);
        function getBinStep() external view returns (uint16);
        function balanceOf(address account, uint256 id) external view returns (uint256);
        function isApprovedForAll(address owner, address spender) external view returns (bool);
        function approveForAll(address spender, bool approved) external;
    }
}

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    contract ILBRouter {
        struct LiquidityParameters {
            address tokenX;
            address tokenY;
            uint256 binStep;
            uint256 amountX;
            uint256 amountY;
            uint256 amountXMin;
            uint256 amountYMin;
            uint256 activeIdDesired;
            uint256 idSlippage;
            int256[] deltaIds;
            uint256[] distributionX;
            uint256[] distributionY;
            address to;
            address refundTo;
            uint256 deadline;
        }

        function addLiquidity(LiquidityParameters calldata liquidityParameters)
            external
            returns (
                uint256 amountXAdded,
                uint256 amountYAdded,
                uint256 amountXLeft,
                uint256 amountYLeft,
                uint256[] memory depositIds,
                uint256[] memory liquidityMinted
            );

        function removeLiquidity(
            address tokenX,
            address tokenY,
            uint16 binStep,
            uint256 amountXMin,
            uint256 amountYMin,
            uint256[] memory ids,
            uint256[] memory amounts,
            address to,
            uint256 deadline
        ) external returns (uint256 amountX, uint256 amountY);
    }
}

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    contract IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function decimals() external view returns (uint8);
    }
}

/// 100% in Liquidity Book distribution precision.
const FULL_DISTRIBUTION: u128 = 1_000_000_000_000_000_000;

/// Gateway bound to one Liquidity Book pair, its router and a signing wallet.
pub struct LbPoolGateway {
    provider: DynProvider,
    pair: ILBPair::ILBPairInstance<DynProvider>,
    router: ILBRouter::ILBRouterInstance<DynProvider>,
    wallet: EvmAddress,
    token_x: EvmAddress,
    token_y: EvmAddress,
    decimals_x: u8,
    decimals_y: u8,
    bin_step: u16,
    settings: ChainSettings,
}

impl fmt::Debug for LbPoolGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LbPoolGateway")
            .field("pool", self.pair.address())
            .field("router", self.router.address())
            .field("wallet", &self.wallet)
            .field("bin_step", &self.bin_step)
            .finish()
    }
}

impl LbPoolGateway {
    /// Connect to the chain and load the pair's static parameters.
    ///
    /// Fails when the endpoint is unreachable, the key is malformed or the
    /// pool does not answer the pair interface.
    pub async fn connect(config: &Config) -> Result<Self, GatewayError> {
        let signer: PrivateKeySigner = config
            .wallet_key
            .expose()
            .parse()
            .map_err(|e| GatewayError::Submit(format!("invalid wallet key: {}", e)))?;
        let wallet = signer.address();

        let url: Url = config
            .rpc_url
            .parse()
            .map_err(|e| GatewayError::Call(format!("invalid RPC URL {}: {}", config.rpc_url, e)))?;
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(url)
            .erased();

        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(|e| GatewayError::Call(format!("eth_chainId: {}", e)))?;
        let block = provider
            .get_block_number()
            .await
            .map_err(|e| GatewayError::Call(format!("eth_blockNumber: {}", e)))?;

        let pool = evm_address(&Address::new(config.pool_address.as_str()))?;
        let router = evm_address(&Address::new(config.router_address.as_str()))?;
        let pair = ILBPair::new(pool, provider.clone());

        let token_x = pair
            .getTokenX()
            .call()
            .await
            .map_err(|e| GatewayError::Call(format!("getTokenX: {}", e)))?;
        let token_y = pair
            .getTokenY()
            .call()
            .await
            .map_err(|e| GatewayError::Call(format!("getTokenY: {}", e)))?;
        let bin_step = pair
            .getBinStep()
            .call()
            .await
            .map_err(|e| GatewayError::Call(format!("getBinStep: {}", e)))?;
        let decimals_x = IERC20::new(token_x, provider.clone())
            .decimals()
            .call()
            .await
            .map_err(|e| GatewayError::Call(format!("decimals of {}: {}", token_x, e)))?;
        let decimals_y = IERC20::new(token_y, provider.clone())
            .decimals()
            .call()
            .await
            .map_err(|e| GatewayError::Call(format!("decimals of {}: {}", token_y, e)))?;

        info!(
            chain_id,
            block,
            pool = %pool,
            %token_x,
            %token_y,
            bin_step,
            wallet = %wallet,
            "Connected to Liquidity Book pair"
        );

        Ok(Self {
            router: ILBRouter::new(router, provider.clone()),
            pair,
            provider,
            wallet,
            token_x,
            token_y,
            decimals_x,
            decimals_y,
            bin_step,
            settings: config.chain,
        })
    }

    /// Address of the signing wallet.
    pub fn wallet_address(&self) -> Address {
        Address::new(self.wallet.to_checksum(None))
    }

    /// Retry a read with exponential backoff until `read_retry` has elapsed.
    async fn read<T, F, Fut>(&self, what: &'static str, mut op: F) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, alloy::contract::Error>>,
    {
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.settings.read_retry),
            ..Default::default()
        };

        retry(backoff, || {
            let fut = op();
            async move {
                fut.await.map_err(|e| {
                    debug!(call = what, error = %e, "Chain read failed");
                    backoff::Error::transient(GatewayError::Call(format!("{}: {}", what, e)))
                })
            }
        })
        .await
    }

    async fn decimals_of(&self, token: EvmAddress) -> Result<u8, GatewayError> {
        if token == self.token_x {
            return Ok(self.decimals_x);
        }
        if token == self.token_y {
            return Ok(self.decimals_y);
        }
        let erc20 = IERC20::new(token, self.provider.clone());
        self.read("decimals", || async { erc20.decimals().call().await })
            .await
    }

    fn deadline(&self) -> U256 {
        let now = u64::try_from(Utc::now().timestamp()).unwrap_or_default();
        U256::from(now + self.settings.tx_deadline.as_secs())
    }

    /// Wait for a submitted transaction to reach a terminal state.
    async fn confirm(
        &self,
        action: &'static str,
        pending: PendingTransactionBuilder<Ethereum>,
    ) -> Result<TxHash, GatewayError> {
        let tx_hash = TxHash::new(pending.tx_hash().to_string());
        info!(action, tx_hash = %tx_hash, "Transaction submitted, waiting for receipt");

        let receipt = match pending
            .with_timeout(Some(self.settings.confirmation_timeout))
            .get_receipt()
            .await
        {
            Ok(receipt) => receipt,
            Err(PendingTransactionError::TxWatcher(WatchTxError::Timeout)) => {
                warn!(action, tx_hash = %tx_hash, "Transaction not confirmed before timeout");
                return Err(GatewayError::ConfirmationTimeout { tx_hash });
            }
            Err(e) => {
                warn!(action, tx_hash = %tx_hash, error = %e, "Lost track of transaction receipt");
                return Err(GatewayError::ConfirmationTimeout { tx_hash });
            }
        };

        if !receipt.status() {
            warn!(action, tx_hash = %tx_hash, "Transaction reverted");
            return Err(GatewayError::Reverted { tx_hash });
        }
        info!(action, tx_hash = %tx_hash, "Transaction confirmed");
        Ok(tx_hash)
    }

    async fn ensure_lp_approval(&self) -> Result<(), GatewayError> {
        let router = *self.router.address();
        let approved = self
            .read("isApprovedForAll", || async {
                self.pair.isApprovedForAll(self.wallet, router).call().await
            })
            .await?;
        if approved {
            return Ok(());
        }

        let pending = self
            .pair
            .approveForAll(router, true)
            .send()
            .await
            .map_err(|e| GatewayError::Submit(format!("approveForAll: {}", e)))?;
        self.confirm("approveForAll", pending).await?;
        Ok(())
    }

    async fn raw_lp_balance(&self, bin_id: i32) -> Result<U256, GatewayError> {
        let id = bin_u256(bin_id)?;
        self.read("balanceOf", || async {
            self.pair.balanceOf(self.wallet, id).call().await
        })
        .await
    }
}

#[async_trait]
impl PoolGateway for LbPoolGateway {
    async fn pool_tokens(&self) -> Result<PoolTokens, GatewayError> {
        Ok(PoolTokens {
            token_x: domain_address(self.token_x),
            token_y: domain_address(self.token_y),
        })
    }

    async fn active_bin(&self) -> Result<i32, GatewayError> {
        let id = self
            .read("getActiveId", || async { self.pair.getActiveId().call().await })
            .await?;
        Ok(id.to::<i32>())
    }

    async fn bin_reserves(&self, bin_id: i32) -> Result<BinReserves, GatewayError> {
        let id = bin_u24(bin_id)?;
        let bin = self
            .read("getBin", || async { self.pair.getBin(id).call().await })
            .await?;
        Ok(BinReserves {
            reserve_x: units::to_decimal(U256::from(bin.binReserveX), self.decimals_x)?,
            reserve_y: units::to_decimal(U256::from(bin.binReserveY), self.decimals_y)?,
        })
    }

    async fn token_balance(
        &self,
        token: &Address,
        owner: &Address,
    ) -> Result<Decimal, GatewayError> {
        let token = evm_address(token)?;
        let owner = evm_address(owner)?;
        let erc20 = IERC20::new(token, self.provider.clone());
        let raw = self
            .read("balanceOf", || async { erc20.balanceOf(owner).call().await })
            .await?;
        units::to_decimal(raw, self.decimals_of(token).await?)
    }

    async fn lp_balance(&self, owner: &Address, bin_id: i32) -> Result<Decimal, GatewayError> {
        let owner = evm_address(owner)?;
        let id = bin_u256(bin_id)?;
        let raw = self
            .read("balanceOf", || async { self.pair.balanceOf(owner, id).call().await })
            .await?;
        units::to_decimal(raw, LP_DECIMALS)
    }

    async fn allowance(
        &self,
        token: &Address,
        owner: &Address,
        spender: &Address,
    ) -> Result<Decimal, GatewayError> {
        let token = evm_address(token)?;
        let owner = evm_address(owner)?;
        let spender = evm_address(spender)?;
        let erc20 = IERC20::new(token, self.provider.clone());
        let raw = self
            .read("allowance", || async {
                erc20.allowance(owner, spender).call().await
            })
            .await?;
        units::to_decimal(raw, self.decimals_of(token).await?)
    }

    async fn approve(
        &self,
        token: &Address,
        spender: &Address,
        amount: Decimal,
    ) -> Result<TxHash, GatewayError> {
        let token = evm_address(token)?;
        let spender = evm_address(spender)?;
        let raw = units::to_raw(amount, self.decimals_of(token).await?)?;

        let pending = IERC20::new(token, self.provider.clone())
            .approve(spender, raw)
            .send()
            .await
            .map_err(|e| GatewayError::Submit(format!("approve: {}", e)))?;
        self.confirm("approve", pending).await
    }

    async fn add_liquidity(
        &self,
        bin_id: i32,
        amount_x: Decimal,
        amount_y: Decimal,
    ) -> Result<TxHash, GatewayError> {
        let active = self.active_bin().await?;
        let delta = I256::try_from(i64::from(bin_id) - i64::from(active))
            .map_err(|e| GatewayError::Decode(format!("bin delta: {}", e)))?;
        let raw_x = units::to_raw(amount_x, self.decimals_x)?;
        let raw_y = units::to_raw(amount_y, self.decimals_y)?;
        let share = |raw: U256| {
            if raw.is_zero() {
                U256::ZERO
            } else {
                U256::from(FULL_DISTRIBUTION)
            }
        };

        let params = ILBRouter::LiquidityParameters {
            tokenX: self.token_x,
            tokenY: self.token_y,
            binStep: U256::from(self.bin_step),
            amountX: raw_x,
            amountY: raw_y,
            amountXMin: U256::ZERO,
            amountYMin: U256::ZERO,
            activeIdDesired: bin_u256(active)?,
            idSlippage: U256::from(self.settings.id_slippage),
            deltaIds: vec![delta],
            distributionX: vec![share(raw_x)],
            distributionY: vec![share(raw_y)],
            to: self.wallet,
            refundTo: self.wallet,
            deadline: self.deadline(),
        };

        let pending = self
            .router
            .addLiquidity(params)
            .send()
            .await
            .map_err(|e| GatewayError::Submit(format!("addLiquidity bin {}: {}", bin_id, e)))?;
        self.confirm("addLiquidity", pending).await
    }

    async fn remove_liquidity(
        &self,
        withdrawals: &[BinWithdrawal],
    ) -> Result<TxHash, GatewayError> {
        let mut ids = Vec::with_capacity(withdrawals.len());
        let mut amounts = Vec::with_capacity(withdrawals.len());
        for withdrawal in withdrawals {
            let raw = match withdrawal.amount {
                Some(amount) => units::to_raw(amount, LP_DECIMALS)?,
                None => self.raw_lp_balance(withdrawal.bin_id).await?,
            };
            if raw.is_zero() {
                debug!(bin_id = withdrawal.bin_id, "Nothing to withdraw from bin");
                continue;
            }
            ids.push(bin_u256(withdrawal.bin_id)?);
            amounts.push(raw);
        }
        if ids.is_empty() {
            return Err(GatewayError::Submit(
                "no LP balance in the requested bins".to_string(),
            ));
        }

        self.ensure_lp_approval().await?;

        let pending = self
            .router
            .removeLiquidity(
                self.token_x,
                self.token_y,
                self.bin_step,
                U256::ZERO,
                U256::ZERO,
                ids,
                amounts,
                self.wallet,
                self.deadline(),
            )
            .send()
            .await
            .map_err(|e| GatewayError::Submit(format!("removeLiquidity: {}", e)))?;
        self.confirm("removeLiquidity", pending).await
    }
}

fn evm_address(address: &Address) -> Result<EvmAddress, GatewayError> {
    address
        .as_str()
        .parse()
        .map_err(|e| GatewayError::Decode(format!("address {}: {}", address, e)))
}

fn domain_address(address: EvmAddress) -> Address {
    Address::new(address.to_checksum(None))
}

fn bin_u24(bin_id: i32) -> Result<U24, GatewayError> {
    u32::try_from(bin_id)
        .ok()
        .and_then(|id| U24::try_from(id).ok())
        .ok_or_else(|| GatewayError::Decode(format!("bin id {} out of range", bin_id)))
}

fn bin_u256(bin_id: i32) -> Result<U256, GatewayError> {
    bin_u24(bin_id).map(U256::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bin_id_bounds() {
        assert_eq!(bin_u24(8_388_608).unwrap().to::<u32>(), 8_388_608);
        assert!(bin_u24(-1).is_err());
        assert!(bin_u24(1 << 24).is_err());
        assert_eq!(bin_u256(42).unwrap(), U256::from(42u64));
    }

    #[test]
    fn test_address_roundtrip_checksums() {
        let lower = Address::new("0x18556da13313f3532c54711497a8fedac273220e");
        let parsed = evm_address(&lower).unwrap();
        let checksummed = domain_address(parsed);
        assert!(checksummed.eq_ignore_case(&lower));
        assert_ne!(checksummed.as_str(), lower.as_str());
        assert_eq!(evm_address(&checksummed).unwrap(), parsed);
        assert!(evm_address(&Address::new("not-an-address")).is_err());
    }
}

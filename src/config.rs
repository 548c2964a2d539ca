use crate::domain::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_DATABASE_PATH: &str = "db/liquidity_tracker.db";
pub const DEFAULT_RPC_URL: &str = "https://api.avax.network/ext/bc/C/rpc";
/// WAVAX / BTC.b Liquidity Book pair.
pub const DEFAULT_POOL_ADDRESS: &str = "0x856b38bf1e2e367f747dd4d3951dda8a35f1bf60";
/// Liquidity Book router v2.2.
pub const DEFAULT_ROUTER_ADDRESS: &str = "0x18556DA13313f3532c54711497A8FedAC273220E";
pub const DEFAULT_PRIMARY_TOKEN: &str = "0xB31f66AA3C1e785363F0875A1B74E27b85FD66c7";
pub const DEFAULT_PAIRED_TOKEN: &str = "0x152b9d0fdc40c096757f570a51e494bd4b943e50";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub rpc_url: String,
    pub wallet_key: WalletKey,
    pub pool_address: String,
    pub router_address: String,
    pub primary_token: String,
    pub paired_token: String,
    pub policy: RebalancePolicy,
    pub scan: ScanRanges,
    pub timing: MonitorTiming,
    pub chain: ChainSettings,
}

/// Private key of the managing wallet. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct WalletKey(String);

impl WalletKey {
    pub fn new(key: impl Into<String>) -> Self {
        WalletKey(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for WalletKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WalletKey(<redacted>)")
    }
}

/// Policy constants of the decision engine and the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebalancePolicy {
    /// Rebalance once any position sits this many bins (or more) from active.
    pub distance_threshold: u32,
    /// Amount of the primary token always left in the wallet.
    pub primary_reserve: Decimal,
    /// Amount of the paired token always left in the wallet.
    pub paired_reserve: Decimal,
    /// A primary-token add is submitted only when the amount is strictly above this.
    pub primary_min_deposit: Decimal,
    /// A paired-token add is submitted only when the amount is strictly above this.
    pub paired_min_deposit: Decimal,
    /// Stored LP amounts are refreshed when live balance differs by more than this.
    pub balance_epsilon: Decimal,
}

impl Default for RebalancePolicy {
    fn default() -> Self {
        Self {
            distance_threshold: 2,
            primary_reserve: Decimal::new(dec!(0.000001)),
            paired_reserve: Decimal::new(dec!(0.0000000001)),
            primary_min_deposit: Decimal::new(dec!(0.01)),
            paired_min_deposit: Decimal::new(dec!(0.0001)),
            balance_epsilon: Decimal::new(dec!(0.000001)),
        }
    }
}

/// Half-widths (in bins) of the windows scanned around the active bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRanges {
    pub display: u32,
    pub reconcile: u32,
    pub withdraw: u32,
    pub deep: u32,
}

impl Default for ScanRanges {
    fn default() -> Self {
        Self {
            display: 10,
            reconcile: 50,
            withdraw: 100,
            deep: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorTiming {
    pub check_interval: Duration,
    pub sleep_slice: Duration,
}

impl Default for MonitorTiming {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(120),
            sleep_slice: Duration::from_secs(5),
        }
    }
}

/// Transaction and read settings for the chain adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainSettings {
    pub confirmation_timeout: Duration,
    pub read_retry: Duration,
    pub tx_deadline: Duration,
    pub id_slippage: u32,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            confirmation_timeout: Duration::from_secs(180),
            read_retry: Duration::from_secs(5),
            tx_deadline: Duration::from_secs(300),
            id_slippage: 5,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = parse_or(&env_map, "PORT", 8080u16, "must be a valid u16")?;

        let database_path = string_or(&env_map, "DATABASE_PATH", DEFAULT_DATABASE_PATH);
        let rpc_url = string_or(&env_map, "RPC_URL", DEFAULT_RPC_URL);

        let wallet_key = env_map
            .get("WALLET_PRIVATE_KEY")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(WalletKey::new)
            .ok_or_else(|| ConfigError::MissingEnv("WALLET_PRIVATE_KEY".to_string()))?;

        let pool_address = address_or(&env_map, "POOL_ADDRESS", DEFAULT_POOL_ADDRESS)?;
        let router_address = address_or(&env_map, "ROUTER_ADDRESS", DEFAULT_ROUTER_ADDRESS)?;
        let primary_token = address_or(&env_map, "PRIMARY_TOKEN", DEFAULT_PRIMARY_TOKEN)?;
        let paired_token = address_or(&env_map, "PAIRED_TOKEN", DEFAULT_PAIRED_TOKEN)?;
        if primary_token.eq_ignore_ascii_case(&paired_token) {
            return Err(ConfigError::InvalidValue(
                "PAIRED_TOKEN".to_string(),
                "must differ from PRIMARY_TOKEN".to_string(),
            ));
        }

        let defaults = RebalancePolicy::default();
        let policy = RebalancePolicy {
            distance_threshold: parse_or(
                &env_map,
                "DISTANCE_THRESHOLD",
                defaults.distance_threshold,
                "must be a non-negative integer",
            )?,
            primary_reserve: amount_or(&env_map, "PRIMARY_RESERVE", defaults.primary_reserve)?,
            paired_reserve: amount_or(&env_map, "PAIRED_RESERVE", defaults.paired_reserve)?,
            primary_min_deposit: amount_or(
                &env_map,
                "PRIMARY_MIN_DEPOSIT",
                defaults.primary_min_deposit,
            )?,
            paired_min_deposit: amount_or(
                &env_map,
                "PAIRED_MIN_DEPOSIT",
                defaults.paired_min_deposit,
            )?,
            balance_epsilon: amount_or(&env_map, "BALANCE_EPSILON", defaults.balance_epsilon)?,
        };
        if policy.distance_threshold == 0 {
            return Err(ConfigError::InvalidValue(
                "DISTANCE_THRESHOLD".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let defaults = ScanRanges::default();
        let scan = ScanRanges {
            display: parse_or(&env_map, "DISPLAY_SCAN_RANGE", defaults.display, "must be a u32")?,
            reconcile: parse_or(
                &env_map,
                "RECONCILE_SCAN_RANGE",
                defaults.reconcile,
                "must be a u32",
            )?,
            withdraw: parse_or(
                &env_map,
                "WITHDRAW_SCAN_RANGE",
                defaults.withdraw,
                "must be a u32",
            )?,
            deep: parse_or(&env_map, "DEEP_SCAN_RANGE", defaults.deep, "must be a u32")?,
        };

        let defaults = MonitorTiming::default();
        let timing = MonitorTiming {
            check_interval: secs_or(&env_map, "CHECK_INTERVAL_SECS", defaults.check_interval)?,
            sleep_slice: secs_or(&env_map, "SLEEP_SLICE_SECS", defaults.sleep_slice)?,
        };
        for (name, value) in [
            ("CHECK_INTERVAL_SECS", timing.check_interval),
            ("SLEEP_SLICE_SECS", timing.sleep_slice),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue(
                    name.to_string(),
                    "must be at least 1".to_string(),
                ));
            }
        }

        let defaults = ChainSettings::default();
        let chain = ChainSettings {
            confirmation_timeout: secs_or(
                &env_map,
                "CONFIRMATION_TIMEOUT_SECS",
                defaults.confirmation_timeout,
            )?,
            read_retry: secs_or(&env_map, "READ_RETRY_SECS", defaults.read_retry)?,
            tx_deadline: secs_or(&env_map, "TX_DEADLINE_SECS", defaults.tx_deadline)?,
            id_slippage: parse_or(&env_map, "ID_SLIPPAGE", defaults.id_slippage, "must be a u32")?,
        };

        Ok(Config {
            port,
            database_path,
            rpc_url,
            wallet_key,
            pool_address,
            router_address,
            primary_token,
            paired_token,
            policy,
            scan,
            timing,
            chain,
        })
    }
}

fn string_or(env_map: &HashMap<String, String>, key: &str, default: &str) -> String {
    env_map
        .get(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_or<T: FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: T,
    expectation: &str,
) -> Result<T, ConfigError> {
    match env_map.get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(key.to_string(), expectation.to_string())),
        None => Ok(default),
    }
}

fn secs_or(
    env_map: &HashMap<String, String>,
    key: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    parse_or(env_map, key, default.as_secs(), "must be a whole number of seconds")
        .map(Duration::from_secs)
}

fn amount_or(
    env_map: &HashMap<String, String>,
    key: &str,
    default: Decimal,
) -> Result<Decimal, ConfigError> {
    let amount = parse_or(env_map, key, default, "must be a decimal number")?;
    if amount.is_negative() {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must not be negative".to_string(),
        ));
    }
    Ok(amount)
}

fn address_or(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
) -> Result<String, ConfigError> {
    let value = string_or(env_map, key, default);
    let hex = value.strip_prefix("0x").unwrap_or("");
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be a 0x-prefixed 20-byte hex address".to_string(),
        ));
    }
    Ok(value)
}

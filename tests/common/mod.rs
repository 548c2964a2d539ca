#![allow(dead_code)]

use binkeeper::config::{RebalancePolicy, ScanRanges};
use binkeeper::db::init_db;
use binkeeper::domain::{Address, BinReserves, Decimal};
use binkeeper::gateway::{MockPoolGateway, PoolGateway, PoolTokens};
use binkeeper::orchestration::{PoolContext, Session, Workflows};
use binkeeper::Repository;
use std::str::FromStr;
use std::sync::Arc;
use tempfile::TempDir;

pub const WALLET: &str = "0x1111111111111111111111111111111111111111";
pub const POOL: &str = "0x2222222222222222222222222222222222222222";
pub const ROUTER: &str = "0x3333333333333333333333333333333333333333";
/// Token X of the pool; the primary token.
pub const WAVAX: &str = "0x4444444444444444444444444444444444444444";
/// Token Y of the pool; the paired token.
pub const BTCB: &str = "0x5555555555555555555555555555555555555555";

pub fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn addr(s: &str) -> Address {
    Address::new(s)
}

pub fn tokens() -> PoolTokens {
    PoolTokens {
        token_x: addr(WAVAX),
        token_y: addr(BTCB),
    }
}

pub fn mock_pool(active_bin: i32) -> MockPoolGateway {
    MockPoolGateway::new(tokens(), addr(ROUTER), active_bin)
}

/// Backing made only of the paired token, as held by a bin below active.
pub fn paired_backing(amount: &str) -> BinReserves {
    BinReserves {
        reserve_x: Decimal::zero(),
        reserve_y: d(amount),
    }
}

/// Backing made only of the primary token, as held by a bin above active.
pub fn primary_backing(amount: &str) -> BinReserves {
    BinReserves {
        reserve_x: d(amount),
        reserve_y: Decimal::zero(),
    }
}

pub fn context() -> PoolContext {
    PoolContext::new(
        addr(WALLET),
        addr(POOL),
        addr(ROUTER),
        tokens(),
        &addr(WAVAX),
        &addr(BTCB),
    )
    .unwrap()
}

pub struct Harness {
    pub session: Arc<Session>,
    pub mock: Arc<MockPoolGateway>,
    pub repo: Arc<Repository>,
    pub ctx: PoolContext,
    _temp: TempDir,
}

pub async fn harness(mock: MockPoolGateway) -> Harness {
    harness_with_policy(mock, RebalancePolicy::default()).await
}

pub async fn harness_with_policy(mock: MockPoolGateway, policy: RebalancePolicy) -> Harness {
    let mock = Arc::new(mock);
    let gateway: Arc<dyn PoolGateway> = mock.clone();
    build_harness(mock, gateway, policy).await
}

/// Harness whose workflows talk to `gateway`, typically a wrapper around `mock`.
pub async fn harness_with_gateway(
    mock: Arc<MockPoolGateway>,
    gateway: Arc<dyn PoolGateway>,
) -> Harness {
    build_harness(mock, gateway, RebalancePolicy::default()).await
}

async fn build_harness(
    mock: Arc<MockPoolGateway>,
    gateway: Arc<dyn PoolGateway>,
    policy: RebalancePolicy,
) -> Harness {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));

    let ctx = context();
    let session = Arc::new(Session::new(Workflows::new(
        gateway,
        repo.clone(),
        ctx.clone(),
        policy,
        ScanRanges::default(),
    )));

    Harness {
        session,
        mock,
        repo,
        ctx,
        _temp: temp_dir,
    }
}

impl Harness {
    /// Bins of the active stored rows, ascending.
    pub async fn stored_bins(&self) -> Vec<i32> {
        self.repo
            .list_active_positions(&self.ctx.scope())
            .await
            .unwrap()
            .iter()
            .map(|p| p.bin_id)
            .collect()
    }
}

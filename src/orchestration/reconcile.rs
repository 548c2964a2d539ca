//! Resolves the wallet's true positions from the store and live chain reads.

use super::PoolContext;
use crate::db::Repository;
use crate::domain::{BinReserves, Decimal, Position, ResolvedPosition};
use crate::gateway::{GatewayError, PoolGateway};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Concurrent balance reads during a window scan.
const SCAN_CONCURRENCY: usize = 8;

/// Where a resolved position set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Cache,
    Scan,
}

/// A bin whose live check failed and was left out of the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedBin {
    pub bin_id: i32,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub active_bin: i32,
    /// Ascending by bin id, one entry per bin.
    pub positions: Vec<ResolvedPosition>,
    pub skipped: Vec<SkippedBin>,
    pub source: ResolutionSource,
}

impl Resolution {
    pub fn bins(&self) -> Vec<i32> {
        self.positions.iter().map(|p| p.bin_id).collect()
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Failed to read active bin: {0}")]
    ActiveBin(#[from] GatewayError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Live state of one bin for the managed wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
enum BinProbe {
    Held { lp: Decimal, reserves: BinReserves },
    Empty,
    Skipped(String),
}

#[derive(Clone)]
pub struct Reconciler {
    gateway: Arc<dyn PoolGateway>,
    repo: Arc<Repository>,
    ctx: PoolContext,
    epsilon: Decimal,
}

impl Reconciler {
    pub fn new(
        gateway: Arc<dyn PoolGateway>,
        repo: Arc<Repository>,
        ctx: PoolContext,
        epsilon: Decimal,
    ) -> Self {
        Self {
            gateway,
            repo,
            ctx,
            epsilon,
        }
    }

    /// Read the active bin, then resolve positions around it.
    ///
    /// # Errors
    /// Fails only when the active bin cannot be read or the store cannot be
    /// read or written. Per-bin read failures end up in `skipped`.
    pub async fn resolve_positions(
        &self,
        prefer_cache: bool,
        half_width: u32,
    ) -> Result<Resolution, ReconcileError> {
        let active_bin = self.gateway.active_bin().await?;
        self.resolve_at(active_bin, prefer_cache, half_width).await
    }

    /// Resolve positions against a known active bin.
    ///
    /// With `prefer_cache`, stored positions are verified bin by bin and
    /// trusted when at least one is still held. Otherwise every bin in
    /// `[max(0, active - half_width), active + half_width]` is scanned.
    pub async fn resolve_at(
        &self,
        active_bin: i32,
        prefer_cache: bool,
        half_width: u32,
    ) -> Result<Resolution, ReconcileError> {
        if prefer_cache {
            let stored = self.repo.list_active_positions(&self.ctx.scope()).await?;
            if !stored.is_empty() {
                let (positions, skipped) = self.verify_cached(&stored, active_bin).await?;
                if !positions.is_empty() {
                    debug!(
                        wallet = %self.ctx.wallet,
                        positions = positions.len(),
                        "Resolved positions from cache"
                    );
                    return Ok(Resolution {
                        active_bin,
                        positions,
                        skipped,
                        source: ResolutionSource::Cache,
                    });
                }
                info!(
                    wallet = %self.ctx.wallet,
                    stored = stored.len(),
                    "No cached position survived verification, scanning"
                );
            }
        }

        let (positions, skipped) = self.scan(active_bin, half_width).await?;
        Ok(Resolution {
            active_bin,
            positions,
            skipped,
            source: ResolutionSource::Scan,
        })
    }

    async fn verify_cached(
        &self,
        stored: &[Position],
        active_bin: i32,
    ) -> Result<(Vec<ResolvedPosition>, Vec<SkippedBin>), ReconcileError> {
        let mut positions = Vec::new();
        let mut skipped = Vec::new();
        let mut seen = BTreeSet::new();

        for record in stored {
            if !seen.insert(record.bin_id) {
                continue;
            }
            match self.probe(record.bin_id).await {
                BinProbe::Held { lp, reserves } => {
                    if lp.differs_from(record.amount, self.epsilon) {
                        debug!(bin_id = record.bin_id, stored = %record.amount, live = %lp, "Refreshing stored amount");
                        self.repo.update_position_amount(record.id, lp).await?;
                    }
                    positions.push(ResolvedPosition::new(record.bin_id, lp, reserves, active_bin));
                }
                BinProbe::Empty => {
                    info!(bin_id = record.bin_id, wallet = %self.ctx.wallet, "Stored position is empty on-chain, deactivating");
                    self.repo.deactivate_position(record.id).await?;
                }
                BinProbe::Skipped(reason) => {
                    warn!(bin_id = record.bin_id, wallet = %self.ctx.wallet, %reason, "Skipping cached bin");
                    skipped.push(SkippedBin {
                        bin_id: record.bin_id,
                        reason,
                    });
                }
            }
        }

        positions.sort_by_key(|p| p.bin_id);
        Ok((positions, skipped))
    }

    async fn scan(
        &self,
        active_bin: i32,
        half_width: u32,
    ) -> Result<(Vec<ResolvedPosition>, Vec<SkippedBin>), ReconcileError> {
        let width = i32::try_from(half_width).unwrap_or(i32::MAX);
        let start = active_bin.saturating_sub(width).max(0);
        let end = active_bin.saturating_add(width);
        debug!(start, end, wallet = %self.ctx.wallet, "Scanning bin window");

        let stored: HashMap<i32, Position> = self
            .repo
            .list_active_positions(&self.ctx.scope())
            .await?
            .into_iter()
            .map(|p| (p.bin_id, p))
            .collect();

        let probes: Vec<(i32, BinProbe)> = stream::iter(start..=end)
            .map(|bin_id| async move { (bin_id, self.probe(bin_id).await) })
            .buffered(SCAN_CONCURRENCY)
            .collect()
            .await;

        let mut positions = Vec::new();
        let mut skipped = Vec::new();
        for (bin_id, probe) in probes {
            match probe {
                BinProbe::Held { lp, reserves } => {
                    match stored.get(&bin_id) {
                        None => {
                            info!(bin_id, lp = %lp, wallet = %self.ctx.wallet, "Tracking untracked position");
                            self.repo
                                .upsert_position(&self.ctx.new_position(bin_id, lp))
                                .await?;
                        }
                        Some(record) if lp.differs_from(record.amount, self.epsilon) => {
                            self.repo.update_position_amount(record.id, lp).await?;
                        }
                        Some(_) => {}
                    }
                    positions.push(ResolvedPosition::new(bin_id, lp, reserves, active_bin));
                }
                BinProbe::Empty => {
                    if let Some(record) = stored.get(&bin_id) {
                        info!(bin_id, wallet = %self.ctx.wallet, "Stored position is empty on-chain, deactivating");
                        self.repo.deactivate_position(record.id).await?;
                    }
                }
                BinProbe::Skipped(reason) => {
                    warn!(bin_id, wallet = %self.ctx.wallet, %reason, "Skipping bin during scan");
                    skipped.push(SkippedBin { bin_id, reason });
                }
            }
        }

        info!(
            start,
            end,
            found = positions.len(),
            skipped = skipped.len(),
            "Bin scan complete"
        );
        Ok((positions, skipped))
    }

    async fn probe(&self, bin_id: i32) -> BinProbe {
        let lp = match self.gateway.lp_balance(&self.ctx.wallet, bin_id).await {
            Ok(lp) => lp,
            Err(e) => return BinProbe::Skipped(e.to_string()),
        };
        if !lp.is_positive() {
            return BinProbe::Empty;
        }
        match self.gateway.bin_reserves(bin_id).await {
            Ok(reserves) => BinProbe::Held { lp, reserves },
            Err(e) => BinProbe::Skipped(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::test_support::{pool, setup_repo, wallet};
    use crate::domain::{Address, NewPosition};
    use crate::gateway::{MockPoolGateway, PoolTokens};
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

    fn router() -> Address {
        Address::new("0x18556DA13313f3532c54711497A8FedAC273220E")
    }

    fn ctx() -> PoolContext {
        let t = tokens();
        PoolContext::new(wallet(), pool(), router(), t.clone(), &t.token_x, &t.token_y).unwrap()
    }

    fn stored(bin_id: i32, amount: &str) -> NewPosition {
        ctx().new_position(bin_id, d(amount))
    }

    fn reconciler(mock: MockPoolGateway, repo: Arc<Repository>) -> (Reconciler, Arc<MockPoolGateway>) {
        let mock = Arc::new(mock);
        let r = Reconciler::new(mock.clone(), repo, ctx(), d("0.000001"));
        (r, mock)
    }

    #[tokio::test]
    async fn test_cache_path_refreshes_and_deactivates() {
        let (repo, _temp) = setup_repo().await;
        let repo = Arc::new(repo);
        repo.upsert_position(&stored(101, "5")).await.unwrap();
        repo.upsert_position(&stored(99, "2")).await.unwrap();

        let mock = MockPoolGateway::new(tokens(), router(), 100).with_lp(101, d("4.5"));
        let (r, _mock) = reconciler(mock, repo.clone());

        let res = r.resolve_positions(true, 10).await.unwrap();
        assert_eq!(res.source, ResolutionSource::Cache);
        assert_eq!(res.bins(), vec![101]);
        assert_eq!(res.positions[0].distance, 1);

        let active = repo.list_active_positions(&ctx().scope()).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].amount, d("4.5"));
        assert_eq!(repo.list_inactive_positions(&ctx().scope(), 20).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cache_failure_keeps_record() {
        let (repo, _temp) = setup_repo().await;
        let repo = Arc::new(repo);
        repo.upsert_position(&stored(101, "5")).await.unwrap();
        repo.upsert_position(&stored(102, "1")).await.unwrap();

        let mock = MockPoolGateway::new(tokens(), router(), 100)
            .with_lp(101, d("5"))
            .with_lp(102, d("1"))
            .with_failing_bin(102);
        let (r, _mock) = reconciler(mock, repo.clone());

        let res = r.resolve_positions(true, 10).await.unwrap();
        assert_eq!(res.bins(), vec![101]);
        assert_eq!(res.skipped.len(), 1);
        assert_eq!(res.skipped[0].bin_id, 102);
        assert!(repo.find_position(&ctx().scope(), 102).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_empty_cache_falls_back_to_scan_and_tracks() {
        let (repo, _temp) = setup_repo().await;
        let repo = Arc::new(repo);
        let mock = MockPoolGateway::new(tokens(), router(), 100)
            .with_lp(97, d("1"))
            .with_lp(104, d("2"))
            .with_lp(200, d("9"));
        let (r, _mock) = reconciler(mock, repo.clone());

        let res = r.resolve_positions(true, 10).await.unwrap();
        assert_eq!(res.source, ResolutionSource::Scan);
        assert_eq!(res.bins(), vec![97, 104]);

        let tracked: Vec<i32> = repo
            .list_active_positions(&ctx().scope())
            .await
            .unwrap()
            .iter()
            .map(|p| p.bin_id)
            .collect();
        assert_eq!(tracked, vec![97, 104]);
    }

    #[tokio::test]
    async fn test_invalidated_cache_falls_back_to_scan() {
        let (repo, _temp) = setup_repo().await;
        let repo = Arc::new(repo);
        repo.upsert_position(&stored(90, "3")).await.unwrap();

        let mock = MockPoolGateway::new(tokens(), router(), 100).with_lp(102, d("1"));
        let (r, _mock) = reconciler(mock, repo.clone());

        let res = r.resolve_positions(true, 5).await.unwrap();
        assert_eq!(res.source, ResolutionSource::Scan);
        assert_eq!(res.bins(), vec![102]);
        assert!(repo.find_position(&ctx().scope(), 90).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_scan_window_clamped_at_zero() {
        let (repo, _temp) = setup_repo().await;
        let repo = Arc::new(repo);
        let mock = MockPoolGateway::new(tokens(), router(), 2).with_lp(0, d("1"));
        let (r, _mock) = reconciler(mock, repo);

        let res = r.resolve_positions(false, 10).await.unwrap();
        assert_eq!(res.bins(), vec![0]);
        assert_eq!(res.positions[0].distance, -2);
    }

    #[tokio::test]
    async fn test_resolution_is_idempotent() {
        let (repo, _temp) = setup_repo().await;
        let repo = Arc::new(repo);
        let mock = MockPoolGateway::new(tokens(), router(), 100)
            .with_lp(99, d("1"))
            .with_lp(101, d("2"));
        let (r, _mock) = reconciler(mock, repo);

        let first = r.resolve_positions(true, 10).await.unwrap();
        let second = r.resolve_positions(true, 10).await.unwrap();
        assert_eq!(first.positions, second.positions);
        assert_eq!(second.source, ResolutionSource::Cache);
    }

    #[tokio::test]
    async fn test_unreachable_active_bin_is_an_error() {
        let (repo, _temp) = setup_repo().await;
        let mock = MockPoolGateway::new(tokens(), router(), 100);
        mock.set_unreachable(true);
        let (r, _mock) = reconciler(mock, Arc::new(repo));

        assert!(matches!(
            r.resolve_positions(true, 10).await,
            Err(ReconcileError::ActiveBin(_))
        ));
    }
}

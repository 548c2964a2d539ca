mod common;

use async_trait::async_trait;
use binkeeper::config::MonitorTiming;
use binkeeper::domain::{Address, BinReserves, Decimal, TxHash};
use binkeeper::gateway::{BinWithdrawal, MockPoolGateway, PoolGateway, PoolTokens};
use binkeeper::orchestration::{
    stop_channel, MonitorError, MonitorLoop, MonitorState, RebalanceOutcome, TickOutcome,
};
use binkeeper::GatewayError;
use common::{
    addr, d, harness, harness_with_gateway, mock_pool, paired_backing, primary_backing, BTCB,
    WAVAX,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

fn timing() -> MonitorTiming {
    MonitorTiming {
        check_interval: Duration::from_secs(3600),
        sleep_slice: Duration::from_millis(50),
    }
}

#[tokio::test]
async fn test_tick_holds_when_positions_are_near() {
    let h = harness(
        mock_pool(103)
            .with_position(102, d("0.002"), paired_backing("0.002"))
            .with_position(104, d("1"), primary_backing("1")),
    )
    .await;
    let mut monitor = MonitorLoop::new(h.session.clone(), timing());

    let outcome = monitor.tick().await.unwrap();

    assert_eq!(
        outcome,
        TickOutcome::Held {
            reason: "All 2 positions within threshold of active bin 103".to_string()
        }
    );
    assert_eq!(monitor.state(), MonitorState::Idle);
    assert!(h.mock.calls().is_empty());
    // The first tick fills the cache from a scan.
    assert_eq!(h.stored_bins().await, vec![102, 104]);
}

#[tokio::test]
async fn test_tick_rebalances_on_drift_then_holds() {
    let h = harness(
        mock_pool(103)
            .with_position(100, d("0.002"), paired_backing("0.002"))
            .with_balance(&addr(WAVAX), d("1.5")),
    )
    .await;
    let mut monitor = MonitorLoop::new(h.session.clone(), timing());

    let first = monitor.tick().await.unwrap();
    match first {
        TickOutcome::Rebalanced(outcome) => {
            assert!(outcome.is_success());
            assert!(matches!(outcome, RebalanceOutcome::Rebalanced { .. }));
        }
        other => panic!("expected Rebalanced, got {:?}", other),
    }
    assert_eq!(monitor.state(), MonitorState::Idle);
    assert_eq!(h.mock.held_bins(), vec![102, 104]);
    assert_eq!(h.stored_bins().await, vec![102, 104]);

    let second = monitor.tick().await.unwrap();
    assert!(matches!(second, TickOutcome::Held { .. }));
    assert_eq!(h.mock.remove_calls(), 1);
}

#[tokio::test]
async fn test_tick_seeds_when_no_positions() {
    let h = harness(
        mock_pool(103)
            .with_balance(&addr(WAVAX), d("1"))
            .with_balance(&addr(BTCB), d("0.01")),
    )
    .await;
    let mut monitor = MonitorLoop::new(h.session.clone(), timing());

    let outcome = monitor.tick().await.unwrap();

    assert_eq!(outcome, TickOutcome::Seeded { added: 2 });
    assert_eq!(h.mock.held_bins(), vec![102, 104]);
    assert_eq!(h.mock.remove_calls(), 0);
}

#[tokio::test]
async fn test_tick_declines_seed_with_empty_wallet() {
    let h = harness(mock_pool(103)).await;
    let mut monitor = MonitorLoop::new(h.session.clone(), timing());

    let outcome = monitor.tick().await.unwrap();

    assert_eq!(outcome, TickOutcome::SeedDeclined);
    assert!(h.mock.calls().is_empty());
    assert_eq!(monitor.state(), MonitorState::Idle);
}

#[tokio::test]
async fn test_tick_error_returns_to_idle() {
    let h = harness(mock_pool(103).with_position(100, d("1"), paired_backing("1"))).await;
    h.mock.set_unreachable(true);
    let mut monitor = MonitorLoop::new(h.session.clone(), timing());

    let err = monitor.tick().await.unwrap_err();
    assert!(matches!(err, MonitorError::Reconcile(_)));
    assert_eq!(monitor.state(), MonitorState::Idle);
    assert!(h.mock.calls().is_empty());

    h.mock.set_unreachable(false);
    let outcome = monitor.tick().await.unwrap();
    // Bin 100 is three away from 103 and the wallet has nothing to redeposit.
    assert!(matches!(
        outcome,
        TickOutcome::Rebalanced(RebalanceOutcome::Withdrawn { .. })
            | TickOutcome::Rebalanced(RebalanceOutcome::Rebalanced { .. })
    ));
    assert_eq!(h.mock.remove_calls(), 1);
}

#[tokio::test]
async fn test_run_stops_on_signal() {
    let h = harness(mock_pool(103)).await;
    let monitor = MonitorLoop::new(h.session.clone(), timing());
    let (stop_tx, stop_rx) = stop_channel();

    let handle = tokio::spawn(monitor.run(stop_rx));
    tokio::time::sleep(Duration::from_millis(100)).await;
    stop_tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("monitor did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_run_stops_when_sender_dropped() {
    let h = harness(mock_pool(103)).await;
    let monitor = MonitorLoop::new(h.session.clone(), timing());
    let (stop_tx, stop_rx) = stop_channel();

    let handle = tokio::spawn(monitor.run(stop_rx));
    tokio::time::sleep(Duration::from_millis(100)).await;
    drop(stop_tx);

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("monitor did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_tick_recovers_position_far_outside_withdraw_window() {
    let h = harness(
        mock_pool(300)
            .with_position(99, d("0.002"), paired_backing("0.002"))
            .with_balance(&addr(WAVAX), d("1.5")),
    )
    .await;
    h.repo
        .upsert_position(&h.ctx.new_position(99, d("0.002")))
        .await
        .unwrap();
    let mut monitor = MonitorLoop::new(h.session.clone(), timing());

    let outcome = monitor.tick().await.unwrap();

    match outcome {
        TickOutcome::Rebalanced(RebalanceOutcome::Rebalanced { withdrawal, deposit }) => {
            assert_eq!(withdrawal.bins, vec![99]);
            assert_eq!(deposit.active_bin, 300);
        }
        other => panic!("expected Rebalanced, got {:?}", other),
    }
    assert_eq!(h.mock.lp(99), d("0"));
    assert_eq!(h.mock.remove_calls(), 1);
    assert_eq!(h.mock.held_bins(), vec![299, 301]);

    let outcome = monitor.tick().await.unwrap();
    assert!(matches!(outcome, TickOutcome::Held { .. }));
    assert_eq!(h.mock.remove_calls(), 1);
}

/// Delegates to the mock; `active_bin` waits for a permit first.
#[derive(Debug)]
struct GatedGateway {
    inner: Arc<MockPoolGateway>,
    gate: Semaphore,
}

#[async_trait]
impl PoolGateway for GatedGateway {
    async fn pool_tokens(&self) -> Result<PoolTokens, GatewayError> {
        self.inner.pool_tokens().await
    }

    async fn active_bin(&self) -> Result<i32, GatewayError> {
        let permit = self.gate.acquire().await.unwrap();
        permit.forget();
        self.inner.active_bin().await
    }

    async fn bin_reserves(&self, bin_id: i32) -> Result<BinReserves, GatewayError> {
        self.inner.bin_reserves(bin_id).await
    }

    async fn token_balance(
        &self,
        token: &Address,
        owner: &Address,
    ) -> Result<Decimal, GatewayError> {
        self.inner.token_balance(token, owner).await
    }

    async fn lp_balance(&self, owner: &Address, bin_id: i32) -> Result<Decimal, GatewayError> {
        self.inner.lp_balance(owner, bin_id).await
    }

    async fn allowance(
        &self,
        token: &Address,
        owner: &Address,
        spender: &Address,
    ) -> Result<Decimal, GatewayError> {
        self.inner.allowance(token, owner, spender).await
    }

    async fn approve(
        &self,
        token: &Address,
        spender: &Address,
        amount: Decimal,
    ) -> Result<TxHash, GatewayError> {
        self.inner.approve(token, spender, amount).await
    }

    async fn add_liquidity(
        &self,
        bin_id: i32,
        amount_x: Decimal,
        amount_y: Decimal,
    ) -> Result<TxHash, GatewayError> {
        self.inner.add_liquidity(bin_id, amount_x, amount_y).await
    }

    async fn remove_liquidity(
        &self,
        withdrawals: &[BinWithdrawal],
    ) -> Result<TxHash, GatewayError> {
        self.inner.remove_liquidity(withdrawals).await
    }
}

#[tokio::test]
async fn test_monitor_state_visible_while_tick_runs() {
    let mock = Arc::new(
        mock_pool(103)
            .with_position(102, d("0.002"), paired_backing("0.002"))
            .with_position(104, d("1"), primary_backing("1")),
    );
    let gated = Arc::new(GatedGateway {
        inner: mock.clone(),
        gate: Semaphore::new(0),
    });
    let h = harness_with_gateway(mock, gated.clone()).await;
    let mut states = h.session.watch_monitor_state();
    let mut monitor = MonitorLoop::new(h.session.clone(), timing());
    assert_eq!(monitor.state(), MonitorState::Idle);

    let handle = tokio::spawn(async move { monitor.tick().await });

    tokio::time::timeout(
        Duration::from_secs(5),
        states.wait_for(|s| *s == MonitorState::Checking),
    )
    .await
    .expect("monitor never reported checking")
    .unwrap();
    assert_eq!(h.session.monitor_state(), MonitorState::Checking);
    assert!(h.session.is_busy());

    gated.gate.add_permits(16);
    let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("tick did not finish")
        .unwrap()
        .unwrap();

    assert!(matches!(outcome, TickOutcome::Held { .. }));
    assert_eq!(h.session.monitor_state(), MonitorState::Idle);
    assert!(!h.session.is_busy());
}

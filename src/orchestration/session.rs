use super::executor::RebalanceExecutor;
use super::reconcile::{ReconcileError, Reconciler, Resolution};
use super::PoolContext;
use crate::config::{RebalancePolicy, ScanRanges};
use crate::db::Repository;
use crate::engine::{should_rebalance, RebalanceVerdict};
use crate::gateway::PoolGateway;
use std::sync::Arc;
use super::monitor::MonitorState;
use tokio::sync::{watch, Mutex, MutexGuard};

/// The wired-up workflows for one wallet in one pool.
pub struct Workflows {
    pub ctx: PoolContext,
    pub gateway: Arc<dyn PoolGateway>,
    pub repo: Arc<Repository>,
    pub reconciler: Reconciler,
    pub executor: RebalanceExecutor,
    pub policy: RebalancePolicy,
    pub scan: ScanRanges,
}

impl Workflows {
    pub fn new(
        gateway: Arc<dyn PoolGateway>,
        repo: Arc<Repository>,
        ctx: PoolContext,
        policy: RebalancePolicy,
        scan: ScanRanges,
    ) -> Self {
        let reconciler = Reconciler::new(
            gateway.clone(),
            repo.clone(),
            ctx.clone(),
            policy.balance_epsilon,
        );
        let executor = RebalanceExecutor::new(
            gateway.clone(),
            repo.clone(),
            reconciler.clone(),
            ctx.clone(),
            policy.clone(),
        );
        Self {
            ctx,
            gateway,
            repo,
            reconciler,
            executor,
            policy,
            scan,
        }
    }

    /// Resolve positions from the cache and run the rebalance check on them.
    pub async fn verdict(&self) -> Result<(Resolution, RebalanceVerdict), ReconcileError> {
        let resolution = self
            .reconciler
            .resolve_positions(true, self.scan.reconcile)
            .await?;
        let verdict = should_rebalance(
            &resolution.positions,
            resolution.active_bin,
            self.policy.distance_threshold,
        );
        Ok((resolution, verdict))
    }
}

/// Shared handle serialising every workflow that touches the store or the chain.
///
/// The monitor and the control API each lock the session for the whole of a
/// tick or request, so their transactions never interleave.
pub struct Session {
    workflows: Mutex<Workflows>,
    monitor_state: watch::Sender<MonitorState>,
}

impl Session {
    pub fn new(workflows: Workflows) -> Self {
        Self {
            workflows: Mutex::new(workflows),
            monitor_state: watch::Sender::new(MonitorState::Idle),
        }
    }

    /// Phase of the monitor loop, readable without the lock.
    pub fn monitor_state(&self) -> MonitorState {
        *self.monitor_state.borrow()
    }

    pub fn watch_monitor_state(&self) -> watch::Receiver<MonitorState> {
        self.monitor_state.subscribe()
    }

    pub(crate) fn set_monitor_state(&self, state: MonitorState) {
        self.monitor_state.send_replace(state);
    }

    pub async fn lock(&self) -> MutexGuard<'_, Workflows> {
        self.workflows.lock().await
    }

    /// Non-blocking attempt, used to report whether a workflow is running.
    pub fn is_busy(&self) -> bool {
        self.workflows.try_lock().is_err()
    }
}

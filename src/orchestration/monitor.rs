//! Periodic check-and-rebalance loop.

use super::executor::{ExecutionError, RebalanceOutcome};
use super::reconcile::ReconcileError;
use super::Session;
use crate::config::MonitorTiming;
use crate::engine::should_rebalance;
use std::sync::Arc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    Idle,
    Checking,
    Rebalancing,
    Seeding,
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Positions are close enough to the active bin.
    Held { reason: String },
    Rebalanced(RebalanceOutcome),
    /// No positions; `added` adds went through.
    Seeded { added: usize },
    /// No positions and nothing worth depositing.
    SeedDeclined,
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// Drives ticks and publishes its phase on the session.
pub struct MonitorLoop {
    session: Arc<Session>,
    timing: MonitorTiming,
}

impl MonitorLoop {
    pub fn new(session: Arc<Session>, timing: MonitorTiming) -> Self {
        Self { session, timing }
    }

    pub fn state(&self) -> MonitorState {
        self.session.monitor_state()
    }

    /// Run one check. The loop always returns to `Idle` afterwards.
    pub async fn tick(&mut self) -> Result<TickOutcome, MonitorError> {
        let result = self.check_and_act().await;
        self.session.set_monitor_state(MonitorState::Idle);
        result
    }

    async fn check_and_act(&self) -> Result<TickOutcome, MonitorError> {
        let workflows = self.session.lock().await;
        self.session.set_monitor_state(MonitorState::Checking);

        let resolution = workflows
            .reconciler
            .resolve_positions(true, workflows.scan.reconcile)
            .await?;
        let active_bin = resolution.active_bin;
        info!(
            active_bin,
            positions = resolution.positions.len(),
            skipped = resolution.skipped.len(),
            "Checked positions"
        );

        if resolution.positions.is_empty() {
            self.session.set_monitor_state(MonitorState::Seeding);
            let deposit = workflows.executor.seed(active_bin).await?;
            return Ok(if deposit.declined() {
                TickOutcome::SeedDeclined
            } else {
                TickOutcome::Seeded {
                    added: deposit.added.len(),
                }
            });
        }

        let verdict = should_rebalance(
            &resolution.positions,
            active_bin,
            workflows.policy.distance_threshold,
        );
        if !verdict.rebalance {
            info!(reason = %verdict.reason, "No rebalance needed");
            return Ok(TickOutcome::Held {
                reason: verdict.reason,
            });
        }

        info!(reason = %verdict.reason, "Rebalancing");
        self.session.set_monitor_state(MonitorState::Rebalancing);
        let outcome = workflows
            .executor
            .rebalance(active_bin, workflows.scan.withdraw)
            .await;
        Ok(TickOutcome::Rebalanced(outcome))
    }

    /// Tick every `check_interval` until `stop` turns true.
    ///
    /// The stop signal is checked between sleep slices; a tick in progress
    /// always runs to completion.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        info!(
            interval_secs = self.timing.check_interval.as_secs(),
            "Monitor started"
        );

        while !*stop.borrow() {
            let span = info_span!("tick", cycle_id = %Uuid::new_v4());
            match self.tick().instrument(span).await {
                Ok(outcome) => info!(?outcome, "Tick complete"),
                Err(e) => error!(error = %e, "Tick failed, retrying next interval"),
            }

            if self.sleep_until_next(&mut stop).await {
                break;
            }
        }

        info!("Monitor stopped");
    }

    /// Returns true when stop was requested while sleeping.
    async fn sleep_until_next(&self, stop: &mut watch::Receiver<bool>) -> bool {
        let mut remaining = self.timing.check_interval;
        while !remaining.is_zero() {
            let slice = remaining.min(self.timing.sleep_slice);
            tokio::select! {
                _ = tokio::time::sleep(slice) => {}
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        return true;
                    }
                }
            }
            remaining = remaining.saturating_sub(slice);
            if *stop.borrow() {
                return true;
            }
        }
        *stop.borrow()
    }
}

/// Convenience for tests and embedding: a stop channel that starts running.
pub fn stop_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

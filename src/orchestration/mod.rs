//! Stateful workflows built on the store, the gateway and the engine.

pub mod context;
pub mod executor;
pub mod monitor;
pub mod overview;
pub mod reconcile;
pub mod session;

pub use context::{ContextError, PoolContext};
pub use executor::{
    AddedLeg, DepositOutcome, ExecutionError, FailedLeg, RebalanceExecutor, RebalanceOutcome,
    WithdrawOutcome,
};
pub use monitor::{stop_channel, MonitorError, MonitorLoop, MonitorState, TickOutcome};
pub use overview::{BinSnapshot, PoolOverview, TokenBalance, NEARBY_BINS};
pub use reconcile::{ReconcileError, Reconciler, Resolution, ResolutionSource, SkippedBin};
pub use session::{Session, Workflows};

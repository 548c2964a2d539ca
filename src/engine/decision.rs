use crate::domain::{ResolvedPosition, TokenRole};
use serde::Serialize;

/// A position far enough from the active bin to trigger a rebalance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Breach {
    pub bin_id: i32,
    /// Absolute distance in bins.
    pub distance: u32,
}

/// Outcome of the rebalance check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceVerdict {
    pub rebalance: bool,
    pub reason: String,
    pub breach: Option<Breach>,
}

impl RebalanceVerdict {
    fn hold(reason: impl Into<String>) -> Self {
        Self {
            rebalance: false,
            reason: reason.into(),
            breach: None,
        }
    }
}

/// Decide whether the positions have drifted too far from `active_bin`.
///
/// Positions are checked in the order given and the first one at or beyond
/// `threshold` is reported. It is not necessarily the farthest.
pub fn should_rebalance(
    positions: &[ResolvedPosition],
    active_bin: i32,
    threshold: u32,
) -> RebalanceVerdict {
    if positions.is_empty() {
        return RebalanceVerdict::hold("No positions");
    }

    let breach = positions
        .iter()
        .map(|p| Breach {
            bin_id: p.bin_id,
            distance: p.bin_id.abs_diff(active_bin),
        })
        .find(|b| b.distance >= threshold);

    match breach {
        Some(b) => RebalanceVerdict {
            rebalance: true,
            reason: format!(
                "Position in bin {} is {} bins from active bin {}",
                b.bin_id, b.distance, active_bin
            ),
            breach: Some(b),
        },
        None => RebalanceVerdict::hold(format!(
            "All {} positions within threshold of active bin {}",
            positions.len(),
            active_bin
        )),
    }
}

/// Bin a single-sided deposit of `role` is placed in.
pub fn optimal_bin(active_bin: i32, role: TokenRole) -> i32 {
    match role {
        TokenRole::Primary => active_bin + 1,
        TokenRole::Paired => active_bin - 1,
    }
}

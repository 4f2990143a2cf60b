//! Damage planning for controlled fault injection.
//!
//! The planner is stateless: given the current liveness partition and the
//! requested target, it decides which nodes to start or stop and returns the
//! plan without executing anything. Sampling is uniform without replacement,
//! done by index sampling rather than a rejection loop.

use rand::Rng;

use crate::error::{RcmError, Result};

/// What a damage plan does to its selected nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageAction {
    Start,
    Stop,
}

/// A computed damage step: the action plus the selected positions in the
/// `nodes_by_state` ordering (up nodes first, down nodes after the split).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DamagePlan {
    pub action: DamageAction,
    pub indices: Vec<usize>,
}

/// Resolve the requested target into a desired up-node count.
///
/// The target is either an absolute count in `[1, node_count]` or a
/// percentage with a trailing `%` in `(0, 100]`, rounded up against the
/// cluster size.
pub fn desired_up_count(node_count: usize, target: &str) -> Result<usize> {
    let target = target.trim();

    if target.is_empty() {
        return Err(RcmError::NodesCountRequired);
    }

    if let Some(percent_str) = target.strip_suffix('%') {
        if percent_str.is_empty() {
            return Err(RcmError::NodesCountRequired);
        }

        let percent: f64 = percent_str
            .parse()
            .map_err(|_| RcmError::IllegalPercentValue)?;

        if !(percent > 0.0 && percent <= 100.0) {
            return Err(RcmError::IllegalPercentValue);
        }

        Ok((node_count as f64 * percent / 100.0).ceil() as usize)
    } else {
        let count: usize = target
            .parse()
            .map_err(|_| RcmError::IllegalNodeCount { node_count })?;

        if count < 1 || count > node_count {
            return Err(RcmError::IllegalNodeCount { node_count });
        }

        Ok(count)
    }
}

/// Decide which nodes to start or stop so that exactly `desired_up` nodes
/// are up afterwards. Returns `None` when the cluster is already in the
/// requested state.
///
/// `up_count` and `node_count` describe the `nodes_by_state` partition the
/// returned indices point into.
pub fn plan(
    up_count: usize,
    node_count: usize,
    desired_up: usize,
    rng: &mut impl Rng,
) -> Option<DamagePlan> {
    if desired_up == up_count {
        return None;
    }

    let (action, pool_start, pool_len, amount) = if desired_up < up_count {
        (DamageAction::Stop, 0, up_count, up_count - desired_up)
    } else {
        (
            DamageAction::Start,
            up_count,
            node_count - up_count,
            desired_up - up_count,
        )
    };

    let indices = rand::seq::index::sample(rng, pool_len, amount)
        .into_iter()
        .map(|i| pool_start + i)
        .collect();

    Some(DamagePlan { action, indices })
}

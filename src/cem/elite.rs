//! Elite selection - keep the best episodes of a round as training targets

use crate::infra::{CemError, Result};

use super::rollout::Trajectory;

/// Flattened (observation, action) pairs of the elite trajectories
#[derive(Debug, Clone, Default)]
pub struct EliteBatch {
    pub observations: Vec<Vec<f32>>,
    pub actions: Vec<usize>,
    /// Reward percentile an episode had to reach to be included
    pub threshold: f32,
    /// Number of trajectories that made the cut
    pub num_trajectories: usize,
}

impl EliteBatch {
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// `p`-th percentile of `values` with linear interpolation between the two
/// nearest ranks (rank = p / 100 * (n - 1))
pub fn percentile(values: &[f32], p: f32) -> Result<f32> {
    exact_percentile(values, p).map(|threshold| threshold as f32)
}

/// Same as [`percentile`], without rounding the result back to f32
fn exact_percentile(values: &[f32], p: f32) -> Result<f64> {
    if values.is_empty() {
        return Err(CemError::InvalidConfig(
            "percentile of an empty set is undefined".to_string(),
        ));
    }
    if !(0.0..=100.0).contains(&p) {
        return Err(CemError::InvalidConfig(format!(
            "percentile must be within [0, 100], got {}",
            p
        )));
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = f64::from(p) / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;

    let low = f64::from(sorted[lower]);
    let high = f64::from(sorted[upper]);
    Ok(low + (high - low) * fraction)
}

/// Keep every trajectory whose total reward is at or above the
/// `elitism_percentile`-th percentile of the batch; ties are kept.
/// Steps are flattened in trajectory order, then step order.
pub fn select_elites(trajectories: &[Trajectory], elitism_percentile: f32) -> Result<EliteBatch> {
    let rewards: Vec<f32> = trajectories.iter().map(Trajectory::total_reward).collect();
    // Compared unrounded: an f32 threshold can round down onto a reward
    // that lies just below the true percentile
    let threshold = exact_percentile(&rewards, elitism_percentile)?;

    let mut batch = EliteBatch {
        threshold: threshold as f32,
        ..EliteBatch::default()
    };

    for trajectory in trajectories
        .iter()
        .filter(|t| f64::from(t.total_reward()) >= threshold)
    {
        batch
            .observations
            .extend(trajectory.observations().iter().cloned());
        batch.actions.extend_from_slice(trajectory.actions());
        batch.num_trajectories += 1;
    }

    Ok(batch)
}

/// Target distribution with all mass on `action`
pub fn one_hot(action: usize, action_dim: usize) -> Result<Vec<f32>> {
    if action >= action_dim {
        return Err(CemError::InvalidAction { action, action_dim });
    }

    let mut target = vec![0.0; action_dim];
    target[action] = 1.0;
    Ok(target)
}

pub fn one_hot_batch(actions: &[usize], action_dim: usize) -> Result<Vec<Vec<f32>>> {
    actions.iter().map(|&a| one_hot(a, action_dim)).collect()
}

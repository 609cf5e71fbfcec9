//! Episode rollouts

use burn::optim::Optimizer;
use burn::tensor::backend::AutodiffBackend;

use crate::env::Environment;
use crate::infra::Result;

use super::agent::Agent;
use super::policy::PolicyNetwork;

/// Recorded (observations, actions, total_reward) of one episode.
///
/// Only grows through [`Trajectory::push`], so observations and actions stay
/// aligned and the total is always the sum of the step rewards.
#[derive(Debug, Clone, Default)]
pub struct Trajectory {
    observations: Vec<Vec<f32>>,
    actions: Vec<usize>,
    rewards: Vec<f32>,
    total_reward: f32,
}

impl Trajectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one step: the observation the action was taken in, the action
    /// and the reward it earned
    pub fn push(&mut self, observation: Vec<f32>, action: usize, reward: f32) {
        self.observations.push(observation);
        self.actions.push(action);
        self.rewards.push(reward);
        self.total_reward += reward;
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn observations(&self) -> &[Vec<f32>] {
        &self.observations
    }

    pub fn actions(&self) -> &[usize] {
        &self.actions
    }

    pub fn rewards(&self) -> &[f32] {
        &self.rewards
    }

    pub fn total_reward(&self) -> f32 {
        self.total_reward
    }
}

/// Run one episode to completion with the current policy
pub fn rollout<B, O, E>(agent: &mut Agent<B, O>, env: &mut E) -> Result<Trajectory>
where
    B: AutodiffBackend,
    O: Optimizer<PolicyNetwork<B>, B>,
    E: Environment + ?Sized,
{
    let mut trajectory = Trajectory::new();
    let mut observation = env.reset()?.into_flat();

    loop {
        let action = agent.act(&observation)?;
        let result = env.step(action)?;

        let next = result.observation.into_flat();
        trajectory.push(std::mem::replace(&mut observation, next), action, result.reward);

        if result.done {
            tracing::debug!(
                "Episode finished: steps={}, reward={:.3}, goal={}, truncated={}",
                result.info.steps,
                trajectory.total_reward(),
                result.info.reached_goal,
                result.info.truncated
            );
            break;
        }
    }

    Ok(trajectory)
}

/// Run `num_episodes` episodes back to back on one environment.
///
/// The policy is only read here; it must not be updated until the whole batch
/// has been collected.
pub fn rollout_batch<B, O, E>(
    agent: &mut Agent<B, O>,
    env: &mut E,
    num_episodes: usize,
) -> Result<Vec<Trajectory>>
where
    B: AutodiffBackend,
    O: Optimizer<PolicyNetwork<B>, B>,
    E: Environment + ?Sized,
{
    (0..num_episodes).map(|_| rollout(agent, env)).collect()
}

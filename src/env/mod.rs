//! Environment contract - gym-like interface the trainer drives

mod grid;

pub use grid::GridNavEnv;

use crate::infra::{CemError, Result};

/// Observation returned by an environment: a row-major buffer and its shape
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Observation {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(CemError::ShapeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// 1-D feature view, row-major
    pub fn flatten(&self) -> &[f32] {
        &self.data
    }

    pub fn into_flat(self) -> Vec<f32> {
        self.data
    }
}

/// Step result from the environment
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Next observation
    pub observation: Observation,
    /// Reward for this transition
    pub reward: f32,
    /// Episode done (goal reached or truncated)
    pub done: bool,
    /// Additional info
    pub info: StepInfo,
}

/// Additional information from a step
#[derive(Debug, Clone, Default)]
pub struct StepInfo {
    /// Steps taken this episode
    pub steps: usize,
    /// Episode hit its step limit
    pub truncated: bool,
    /// Agent reached the goal cell
    pub reached_goal: bool,
}

/// An episodic environment with a discrete action set.
///
/// One environment serves one rollout at a time; `reset` must be called before
/// the first `step` of every episode.
pub trait Environment {
    fn reset(&mut self) -> Result<Observation>;

    fn step(&mut self, action: usize) -> Result<StepResult>;

    fn close(&mut self) {}

    fn action_space_size(&self) -> usize;

    fn observation_shape(&self) -> &[usize];

    /// Length of the flattened observation
    fn observation_size(&self) -> usize {
        self.observation_shape().iter().product()
    }
}

const REGISTERED: [(&str, usize); 4] = [
    ("GridNav-5x5-v0", 5),
    ("GridNav-6x6-v0", 6),
    ("GridNav-8x8-v0", 8),
    ("GridNav-16x16-v0", 16),
];

/// Ids accepted by [`make`]
pub fn registered_ids() -> Vec<&'static str> {
    REGISTERED.iter().map(|(id, _)| *id).collect()
}

/// Build a registered environment by id
pub fn make(env_id: &str) -> Result<Box<dyn Environment>> {
    let (_, size) = REGISTERED
        .iter()
        .find(|(id, _)| *id == env_id)
        .ok_or_else(|| CemError::UnknownEnvironment(env_id.to_string()))?;

    tracing::debug!("Creating environment {}", env_id);
    Ok(Box::new(GridNavEnv::new(*size)?))
}

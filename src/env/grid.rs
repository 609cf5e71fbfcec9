//! Walled single-room navigation task with image-like observations

use crate::infra::{Bounds, CemError, Direction, Position, Result};

use super::{Environment, Observation, StepInfo, StepResult};

/// Channels per cell: wall, agent, goal
const NUM_CHANNELS: usize = 3;

const WALL_CHANNEL: usize = 0;
const AGENT_CHANNEL: usize = 1;
const GOAL_CHANNEL: usize = 2;

/// Square room of `size` x `size` cells whose border is wall. The agent starts
/// in the top-left interior cell and must reach the bottom-right one.
#[derive(Debug, Clone)]
pub struct GridNavEnv {
    size: usize,
    shape: [usize; 3],
    interior: Bounds,
    start: Position,
    goal: Position,
    agent: Position,
    steps: usize,
    max_steps: usize,
    done: bool,
}

impl GridNavEnv {
    pub fn new(size: usize) -> Result<Self> {
        if size < 3 {
            return Err(CemError::InvalidConfig(format!(
                "grid size must be at least 3, got {}",
                size
            )));
        }

        let last = size as i32 - 2;
        let start = Position::new(1, 1);

        Ok(Self {
            size,
            shape: [size, size, NUM_CHANNELS],
            interior: Bounds::new(1, last, 1, last),
            start,
            goal: Position::new(last, last),
            agent: start,
            steps: 0,
            max_steps: 4 * size * size,
            // Forces a reset before the first step
            done: true,
        })
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn agent_position(&self) -> Position {
        self.agent
    }

    fn cell_offset(&self, x: usize, y: usize) -> usize {
        (y * self.size + x) * NUM_CHANNELS
    }

    fn render(&self) -> Result<Observation> {
        let mut data = vec![0.0; self.size * self.size * NUM_CHANNELS];

        for y in 0..self.size {
            for x in 0..self.size {
                if !self.interior.contains(&Position::new(x as i32, y as i32)) {
                    data[self.cell_offset(x, y) + WALL_CHANNEL] = 1.0;
                }
            }
        }

        let agent = self.cell_offset(self.agent.x as usize, self.agent.y as usize);
        data[agent + AGENT_CHANNEL] = 1.0;
        let goal = self.cell_offset(self.goal.x as usize, self.goal.y as usize);
        data[goal + GOAL_CHANNEL] = 1.0;

        Observation::new(self.shape.to_vec(), data)
    }

    /// Goal reward shrinks linearly with the time taken to get there
    fn goal_reward(&self) -> f32 {
        1.0 - 0.9 * (self.steps as f32 / self.max_steps as f32)
    }
}

impl Environment for GridNavEnv {
    fn reset(&mut self) -> Result<Observation> {
        self.agent = self.start;
        self.steps = 0;
        self.done = false;
        self.render()
    }

    fn step(&mut self, action: usize) -> Result<StepResult> {
        if self.done {
            return Err(CemError::Environment(
                "step called on a finished episode, reset first".to_string(),
            ));
        }

        let direction = Direction::from_index(action).ok_or(CemError::InvalidAction {
            action,
            action_dim: Direction::ALL.len(),
        })?;

        self.steps += 1;

        let next = self.agent.moved(direction);
        if self.interior.contains(&next) {
            self.agent = next;
        }

        let mut info = StepInfo {
            steps: self.steps,
            ..StepInfo::default()
        };
        let mut reward = 0.0;

        if self.agent == self.goal {
            reward = self.goal_reward();
            info.reached_goal = true;
            self.done = true;
        } else if self.steps >= self.max_steps {
            info.truncated = true;
            self.done = true;
        }

        Ok(StepResult {
            observation: self.render()?,
            reward,
            done: self.done,
            info,
        })
    }

    fn close(&mut self) {
        tracing::debug!("Closing {}x{} grid environment", self.size, self.size);
        self.done = true;
    }

    fn action_space_size(&self) -> usize {
        Direction::ALL.len()
    }

    fn observation_shape(&self) -> &[usize] {
        &self.shape
    }
}

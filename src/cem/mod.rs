//! Cross-entropy method (CEM) trainer
//!
//! Each round plays a batch of episodes with the current stochastic policy,
//! keeps the episodes whose total reward reaches a percentile threshold, and
//! fits the policy to the actions taken in them with a supervised
//! cross-entropy update.
//!
//! # Architecture
//!
//! ```text
//! Environment (reset / step)
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  rollout_batch()                                            │
//! │  - Agent::act samples an action per flattened observation   │
//! │  - One Trajectory per episode                               │
//! └─────────────────────────────────────────────────────────────┘
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  select_elites()                                            │
//! │  - Percentile threshold over episode rewards                │
//! │  - Flattened (observation, action) pairs of elite episodes  │
//! └─────────────────────────────────────────────────────────────┘
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Agent::update                                              │
//! │  - One-hot targets, mini-batched cross-entropy, Adam        │
//! └─────────────────────────────────────────────────────────────┘
//!     │
//!     ▼
//!  RoundMetrics (threshold, mean reward) → logs / CSV
//! ```

pub mod agent;
pub mod config;
pub mod elite;
pub mod metrics;
pub mod policy;
pub mod rollout;
pub mod selector;
pub mod train;

pub use agent::Agent;
pub use config::CemConfig;
pub use elite::{EliteBatch, one_hot, one_hot_batch, percentile, select_elites};
pub use metrics::{MetricsLogger, MovingAverage, RoundMetrics, TrainingHistory};
pub use policy::{PolicyConfig, PolicyNetwork, categorical_cross_entropy};
pub use rollout::{Trajectory, rollout, rollout_batch};
pub use selector::{
    ActionSelector, EpsilonGreedy, LogOfLogitsSampler, PolicyOutput, SelectorKind, SoftmaxSampler,
};
pub use train::{CemTrainer, train, train_on};

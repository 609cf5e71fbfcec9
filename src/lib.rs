pub mod cem;
pub mod env;
pub mod infra;

// Re-export commonly used types for convenience
pub use cem::{Agent, CemConfig, CemTrainer, SelectorKind, TrainingHistory, train};
pub use env::{Environment, GridNavEnv, Observation};
pub use infra::{CemError, Result};

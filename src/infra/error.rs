use thiserror::Error;

#[derive(Debug, Error)]
pub enum CemError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("numeric domain error: policy output {value} at action {index} is not a positive finite number")]
    NumericDomain { index: usize, value: f32 },

    #[error("action {action} is out of range for {action_dim} actions")]
    InvalidAction { action: usize, action_dim: usize },

    #[error("shape mismatch: expected {expected} values, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("unknown environment id '{0}'")]
    UnknownEnvironment(String),

    #[error("environment error: {0}")]
    Environment(String),

    #[error("sampling failed: {0}")]
    Sampling(String),

    #[error("tensor data error: {0}")]
    Tensor(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CemError>;

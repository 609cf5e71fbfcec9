mod error;
mod types;

pub use error::{CemError, Result};
pub use types::{Bounds, Direction, Position};

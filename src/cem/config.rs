//! Training configuration

use std::env;
use std::str::FromStr;

use crate::infra::{CemError, Result};

use super::selector::SelectorKind;

/// Hyperparameters of a CEM training run. Built once and never mutated by the
/// trainer.
#[derive(Debug, Clone)]
pub struct CemConfig {
    /// Registered environment to train on
    pub env_id: String,
    /// Episodes sampled per round
    pub num_rollouts_per_round: usize,
    /// Reward percentile an episode must reach to be elite, in [0, 100]
    pub elitism_percentile: f32,
    /// Number of rounds; there is no early stopping
    pub num_rounds: usize,
    /// Supervised passes over the elite batch per round
    pub update_epochs: usize,
    /// Mini-batch size for the supervised update
    pub update_batch_size: usize,
    /// Adam learning rate
    pub learning_rate: f64,
    /// Hidden layer size of the policy
    pub hidden_size: usize,
    /// How actions are drawn from the policy outputs
    pub selector: SelectorKind,
    /// Seed for weight init, action sampling and shuffling
    pub seed: Option<u64>,
    /// Directory for the per-round CSV, disabled when unset
    pub metrics_dir: Option<String>,
}

impl Default for CemConfig {
    fn default() -> Self {
        Self {
            env_id: "GridNav-5x5-v0".to_string(),
            num_rollouts_per_round: 100,
            elitism_percentile: 70.0,
            num_rounds: 20,
            update_epochs: 3,
            update_batch_size: 128,
            learning_rate: 1e-3,
            hidden_size: 32,
            selector: SelectorKind::Softmax,
            seed: None,
            metrics_dir: None,
        }
    }
}

impl CemConfig {
    /// Defaults overridden by `CEM_*` environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            env_id: env::var("CEM_ENV_ID").unwrap_or(defaults.env_id),
            num_rollouts_per_round: env_or("CEM_ROLLOUTS", defaults.num_rollouts_per_round)?,
            elitism_percentile: env_or("CEM_PERCENTILE", defaults.elitism_percentile)?,
            num_rounds: env_or("CEM_ROUNDS", defaults.num_rounds)?,
            update_epochs: env_or("CEM_EPOCHS", defaults.update_epochs)?,
            update_batch_size: env_or("CEM_BATCH_SIZE", defaults.update_batch_size)?,
            learning_rate: env_or("CEM_LEARNING_RATE", defaults.learning_rate)?,
            hidden_size: env_or("CEM_HIDDEN_SIZE", defaults.hidden_size)?,
            selector: env_or("CEM_SELECTOR", defaults.selector)?,
            seed: env_opt("CEM_SEED")?,
            metrics_dir: env::var("CEM_METRICS_DIR").ok(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_rollouts_per_round == 0 {
            return Err(invalid("num_rollouts_per_round must be at least 1"));
        }
        if !(0.0..=100.0).contains(&self.elitism_percentile) {
            return Err(invalid("elitism_percentile must be within [0, 100]"));
        }
        if self.num_rounds == 0 {
            return Err(invalid("num_rounds must be at least 1"));
        }
        if self.update_epochs == 0 {
            return Err(invalid("update_epochs must be at least 1"));
        }
        if self.update_batch_size == 0 {
            return Err(invalid("update_batch_size must be at least 1"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(invalid("learning_rate must be a positive number"));
        }
        if self.hidden_size == 0 {
            return Err(invalid("hidden_size must be at least 1"));
        }
        if let SelectorKind::EpsilonGreedy { epsilon } = self.selector {
            if !(0.0..=1.0).contains(&epsilon) {
                return Err(invalid("epsilon must be within [0, 1]"));
            }
        }
        Ok(())
    }
}

fn invalid(message: &str) -> CemError {
    CemError::InvalidConfig(message.to_string())
}

fn env_opt<T: FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| CemError::InvalidConfig(format!("cannot parse {}='{}'", key, value))),
        Err(_) => Ok(None),
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    Ok(env_opt(key)?.unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = CemConfig::default();
        assert_eq!(config.num_rollouts_per_round, 100);
        assert!((config.elitism_percentile - 70.0).abs() < 1e-6);
        assert_eq!(config.update_epochs, 3);
        assert_eq!(config.update_batch_size, 128);
        assert_eq!(config.hidden_size, 32);
        assert_eq!(config.selector, SelectorKind::Softmax);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            CemConfig {
                num_rollouts_per_round: 0,
                ..CemConfig::default()
            },
            CemConfig {
                elitism_percentile: 101.0,
                ..CemConfig::default()
            },
            CemConfig {
                num_rounds: 0,
                ..CemConfig::default()
            },
            CemConfig {
                update_epochs: 0,
                ..CemConfig::default()
            },
            CemConfig {
                update_batch_size: 0,
                ..CemConfig::default()
            },
            CemConfig {
                learning_rate: 0.0,
                ..CemConfig::default()
            },
            CemConfig {
                hidden_size: 0,
                ..CemConfig::default()
            },
            CemConfig {
                selector: SelectorKind::EpsilonGreedy { epsilon: 1.5 },
                ..CemConfig::default()
            },
        ];

        for config in bad {
            assert!(
                matches!(config.validate(), Err(CemError::InvalidConfig(_))),
                "{:?} should be rejected",
                config
            );
        }
    }

    #[test]
    fn test_env_parsing_helpers() {
        // Keys are unique to this test so parallel tests do not interfere
        unsafe {
            env::set_var("CEM_TEST_PARSE_OK", " 42 ");
            env::set_var("CEM_TEST_PARSE_BAD", "forty-two");
        }

        assert_eq!(env_or("CEM_TEST_PARSE_OK", 7usize).unwrap(), 42);
        assert_eq!(env_or("CEM_TEST_PARSE_MISSING", 7usize).unwrap(), 7);
        assert!(env_or::<usize>("CEM_TEST_PARSE_BAD", 7).is_err());
        assert_eq!(env_opt::<u64>("CEM_TEST_PARSE_MISSING").unwrap(), None);
    }
}

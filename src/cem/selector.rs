//! Action selection strategies - turn one row of policy outputs into an action

use std::fmt;
use std::str::FromStr;

use burn::prelude::*;
use burn::tensor::activation::softmax;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::{Rng, RngCore};

use crate::infra::{CemError, Result};

use super::policy::tensor_to_vec;

/// Policy outputs for one observation, with the softmax and the greedy action
/// already computed on the backend
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyOutput {
    /// Raw network outputs
    pub logits: Vec<f32>,
    pub probabilities: Vec<f32>,
    pub greedy_action: usize,
}

impl PolicyOutput {
    /// logits: [1, action_dim]
    pub fn from_logits<B: Backend>(logits: Tensor<B, 2>) -> Result<Self> {
        let [rows, action_dim] = logits.dims();
        if rows != 1 || action_dim == 0 {
            return Err(CemError::Sampling(format!(
                "expected policy outputs for one observation, got shape [{}, {}]",
                rows, action_dim
            )));
        }

        let probabilities = tensor_to_vec(softmax(logits.clone(), 1))?;
        let greedy = logits.clone().argmax(1).into_data();
        let greedy_action = greedy
            .iter::<i64>()
            .next()
            .ok_or_else(|| CemError::Tensor("argmax returned no index".to_string()))?;

        Ok(Self {
            logits: tensor_to_vec(logits)?,
            probabilities,
            greedy_action: greedy_action as usize,
        })
    }

    pub fn action_dim(&self) -> usize {
        self.logits.len()
    }
}

/// Picks an action index from the policy's outputs for one observation
pub trait ActionSelector: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn select(&self, output: &PolicyOutput, rng: &mut dyn RngCore) -> Result<usize>;
}

/// Treats outputs as logits: categorical sample from their softmax
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftmaxSampler;

impl ActionSelector for SoftmaxSampler {
    fn name(&self) -> &'static str {
        "softmax"
    }

    fn select(&self, output: &PolicyOutput, rng: &mut dyn RngCore) -> Result<usize> {
        sample_categorical(&output.probabilities, rng)
    }
}

/// Uses the natural log of the raw outputs as logits, i.e. samples in
/// proportion to the outputs themselves. Only defined for strictly positive
/// outputs; anything else is a `NumericDomain` error.
///
/// Training still fits the outputs with softmax cross-entropy, which never
/// pushes them into the positive range. A freshly initialised network almost
/// always has a non-positive output, so in practice this selector fails on
/// the first step of the first round.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOfLogitsSampler;

impl ActionSelector for LogOfLogitsSampler {
    fn name(&self) -> &'static str {
        "log-logits"
    }

    fn select(&self, output: &PolicyOutput, rng: &mut dyn RngCore) -> Result<usize> {
        for (index, &value) in output.logits.iter().enumerate() {
            if !(value.is_finite() && value > 0.0) {
                return Err(CemError::NumericDomain { index, value });
            }
        }

        // softmax(ln x) is x normalised
        sample_categorical(&output.logits, rng)
    }
}

/// Uniform random action with probability `epsilon`, otherwise argmax
#[derive(Debug, Clone, Copy)]
pub struct EpsilonGreedy {
    pub epsilon: f32,
}

impl ActionSelector for EpsilonGreedy {
    fn name(&self) -> &'static str {
        "epsilon-greedy"
    }

    fn select(&self, output: &PolicyOutput, rng: &mut dyn RngCore) -> Result<usize> {
        if output.action_dim() == 0 {
            return Err(CemError::Sampling("no actions to choose from".to_string()));
        }

        if rng.random::<f32>() < self.epsilon {
            return Ok(rng.random_range(0..output.action_dim()));
        }

        Ok(output.greedy_action)
    }
}

/// Config-level name of an action selector
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SelectorKind {
    #[default]
    Softmax,
    LogOfLogits,
    EpsilonGreedy { epsilon: f32 },
}

impl SelectorKind {
    pub fn build(&self) -> Box<dyn ActionSelector> {
        match *self {
            SelectorKind::Softmax => Box::new(SoftmaxSampler),
            SelectorKind::LogOfLogits => Box::new(LogOfLogitsSampler),
            SelectorKind::EpsilonGreedy { epsilon } => Box::new(EpsilonGreedy { epsilon }),
        }
    }
}

impl fmt::Display for SelectorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SelectorKind::Softmax => write!(formatter, "softmax"),
            SelectorKind::LogOfLogits => write!(formatter, "log-logits"),
            SelectorKind::EpsilonGreedy { epsilon } => {
                write!(formatter, "epsilon-greedy:{}", epsilon)
            }
        }
    }
}

impl FromStr for SelectorKind {
    type Err = CemError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "softmax" => Ok(SelectorKind::Softmax),
            "log-logits" => Ok(SelectorKind::LogOfLogits),
            "epsilon-greedy" => Ok(SelectorKind::EpsilonGreedy { epsilon: 0.1 }),
            other => {
                let epsilon = other
                    .strip_prefix("epsilon-greedy:")
                    .and_then(|eps| eps.parse::<f32>().ok())
                    .ok_or_else(|| {
                        CemError::InvalidConfig(format!("unknown action selector '{}'", other))
                    })?;
                Ok(SelectorKind::EpsilonGreedy { epsilon })
            }
        }
    }
}

fn sample_categorical(weights: &[f32], rng: &mut dyn RngCore) -> Result<usize> {
    let dist = WeightedIndex::new(weights).map_err(|e| CemError::Sampling(e.to_string()))?;
    Ok(dist.sample(rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn output(logits: &[f32]) -> PolicyOutput {
        let tensor = Tensor::<NdArray, 2>::from_data(
            TensorData::new(logits.to_vec(), [1, logits.len()]),
            &Default::default(),
        );
        PolicyOutput::from_logits(tensor).unwrap()
    }

    #[test]
    fn test_policy_output_from_logits() {
        let output = output(&[1.0, 2.0, -3.0, 0.5]);
        let sum: f32 = output.probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(output.probabilities[1] > output.probabilities[0]);
        assert!(output.probabilities.iter().all(|&p| p > 0.0));
        assert_eq!(output.greedy_action, 1);
        assert_eq!(output.logits, vec![1.0, 2.0, -3.0, 0.5]);
    }

    #[test]
    fn test_policy_output_rejects_batches() {
        let tensor = Tensor::<NdArray, 2>::zeros([2, 3], &Default::default());
        assert!(matches!(
            PolicyOutput::from_logits(tensor),
            Err(CemError::Sampling(_))
        ));
    }

    #[test]
    fn test_softmax_sampler_handles_negative_logits() {
        let mut rng = StdRng::seed_from_u64(7);
        let output = output(&[-5.0, -1.0, -20.0]);
        for _ in 0..100 {
            let action = SoftmaxSampler.select(&output, &mut rng).unwrap();
            assert!(action < 3);
        }
    }

    #[test]
    fn test_softmax_sampler_dominant_logit() {
        let mut rng = StdRng::seed_from_u64(1);
        let output = output(&[0.0, 100.0, 0.0]);
        for _ in 0..50 {
            assert_eq!(SoftmaxSampler.select(&output, &mut rng).unwrap(), 1);
        }
    }

    #[test]
    fn test_log_of_logits_rejects_non_positive() {
        let mut rng = StdRng::seed_from_u64(3);

        let err = LogOfLogitsSampler
            .select(&output(&[0.5, -0.2, 1.0]), &mut rng)
            .unwrap_err();
        assert!(matches!(err, CemError::NumericDomain { index: 1, .. }));

        let err = LogOfLogitsSampler
            .select(&output(&[0.0, 1.0]), &mut rng)
            .unwrap_err();
        assert!(matches!(err, CemError::NumericDomain { index: 0, .. }));
    }

    #[test]
    fn test_log_of_logits_samples_proportionally() {
        let mut rng = StdRng::seed_from_u64(11);
        let output = output(&[1.0, 3.0]);
        let mut counts = [0usize; 2];
        for _ in 0..2000 {
            counts[LogOfLogitsSampler.select(&output, &mut rng).unwrap()] += 1;
        }
        // Expect roughly 25% / 75%
        let share = counts[1] as f32 / 2000.0;
        assert!(share > 0.68 && share < 0.82, "share was {}", share);
    }

    #[test]
    fn test_epsilon_greedy() {
        let mut rng = StdRng::seed_from_u64(5);
        let output = output(&[0.1, 0.9, 0.3]);

        let greedy = EpsilonGreedy { epsilon: 0.0 };
        assert_eq!(greedy.select(&output, &mut rng).unwrap(), 1);

        let random = EpsilonGreedy { epsilon: 1.0 };
        for _ in 0..20 {
            assert!(random.select(&output, &mut rng).unwrap() < 3);
        }

        let empty = PolicyOutput {
            logits: vec![],
            probabilities: vec![],
            greedy_action: 0,
        };
        assert!(greedy.select(&empty, &mut rng).is_err());
        assert!(random.select(&empty, &mut rng).is_err());
    }

    #[test]
    fn test_selector_kind_parse() {
        assert_eq!("softmax".parse::<SelectorKind>().unwrap(), SelectorKind::Softmax);
        assert_eq!(
            "log-logits".parse::<SelectorKind>().unwrap(),
            SelectorKind::LogOfLogits
        );
        assert_eq!(
            "epsilon-greedy:0.25".parse::<SelectorKind>().unwrap(),
            SelectorKind::EpsilonGreedy { epsilon: 0.25 }
        );
        assert!("greedy".parse::<SelectorKind>().is_err());

        let kind = SelectorKind::EpsilonGreedy { epsilon: 0.5 };
        assert_eq!(kind.to_string().parse::<SelectorKind>().unwrap(), kind);
        assert_eq!(kind.build().name(), "epsilon-greedy");
    }
}

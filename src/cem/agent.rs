//! Agent - samples actions from the policy and fits it to elite behaviour

use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::TensorData;
use burn::tensor::backend::AutodiffBackend;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::infra::{CemError, Result};

use super::policy::{PolicyNetwork, categorical_cross_entropy, tensor_to_vec};
use super::selector::{ActionSelector, PolicyOutput};

/// Policy network plus the strategy used to act with it and the optimizer
/// used to train it
pub struct Agent<B: AutodiffBackend, O: Optimizer<PolicyNetwork<B>, B>> {
    network: PolicyNetwork<B>,
    optimizer: O,
    selector: Box<dyn ActionSelector>,
    learning_rate: f64,
    device: B::Device,
    rng: StdRng,
}

impl<B: AutodiffBackend, O: Optimizer<PolicyNetwork<B>, B>> Agent<B, O> {
    /// `seed` fixes action sampling and mini-batch shuffling; `None` seeds from the OS
    pub fn new(
        network: PolicyNetwork<B>,
        optimizer: O,
        selector: Box<dyn ActionSelector>,
        learning_rate: f64,
        device: B::Device,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self {
            network,
            optimizer,
            selector,
            learning_rate,
            device,
            rng,
        }
    }

    pub fn network(&self) -> &PolicyNetwork<B> {
        &self.network
    }

    pub fn input_dim(&self) -> usize {
        self.network.input_dim()
    }

    pub fn action_dim(&self) -> usize {
        self.network.action_dim()
    }

    pub fn selector_name(&self) -> &'static str {
        self.selector.name()
    }

    /// Choose an action for one flattened observation
    pub fn act(&mut self, observation: &[f32]) -> Result<usize> {
        let input_dim = self.input_dim();
        if observation.len() != input_dim {
            return Err(CemError::ShapeMismatch {
                expected: input_dim,
                actual: observation.len(),
            });
        }

        // Inference only, no autodiff graph
        let model = self.network.valid();
        let obs = Tensor::<B::InnerBackend, 2>::from_data(
            TensorData::new(observation.to_vec(), [1, input_dim]),
            &self.device,
        );
        let output = PolicyOutput::from_logits(model.forward(obs))?;

        self.selector.select(&output, &mut self.rng)
    }

    /// Supervised update towards `targets` (one distribution per observation).
    ///
    /// Runs `epochs` shuffled passes in mini-batches of `batch_size` and
    /// returns the mean batch loss.
    pub fn update(
        &mut self,
        observations: &[Vec<f32>],
        targets: &[Vec<f32>],
        epochs: usize,
        batch_size: usize,
    ) -> Result<f32> {
        if observations.len() != targets.len() {
            return Err(CemError::ShapeMismatch {
                expected: observations.len(),
                actual: targets.len(),
            });
        }
        if batch_size == 0 {
            return Err(CemError::InvalidConfig(
                "update batch size must be positive".to_string(),
            ));
        }
        if observations.is_empty() {
            tracing::warn!("Empty training batch, skipping policy update");
            return Ok(0.0);
        }

        let input_dim = self.input_dim();
        let action_dim = self.action_dim();
        for (obs, target) in observations.iter().zip(targets) {
            if obs.len() != input_dim {
                return Err(CemError::ShapeMismatch {
                    expected: input_dim,
                    actual: obs.len(),
                });
            }
            if target.len() != action_dim {
                return Err(CemError::ShapeMismatch {
                    expected: action_dim,
                    actual: target.len(),
                });
            }
        }

        let mut indices: Vec<usize> = (0..observations.len()).collect();
        let mut total_loss = 0.0;
        let mut num_batches = 0;

        for epoch in 0..epochs {
            indices.shuffle(&mut self.rng);

            let mut epoch_loss = 0.0;
            let mut epoch_batches = 0;

            for batch in indices.chunks(batch_size) {
                let loss = self.train_batch(batch, observations, targets)?;
                epoch_loss += loss;
                epoch_batches += 1;
            }

            tracing::debug!(
                "Epoch {} complete: avg_loss = {:.4}",
                epoch,
                epoch_loss / epoch_batches as f32
            );

            total_loss += epoch_loss;
            num_batches += epoch_batches;
        }

        if num_batches > 0 {
            Ok(total_loss / num_batches as f32)
        } else {
            Ok(0.0)
        }
    }

    /// Train on a single mini-batch given by sample indices
    fn train_batch(
        &mut self,
        batch: &[usize],
        observations: &[Vec<f32>],
        targets: &[Vec<f32>],
    ) -> Result<f32> {
        let batch_size = batch.len();

        let obs: Vec<f32> = batch
            .iter()
            .flat_map(|&i| observations[i].iter().copied())
            .collect();
        let target: Vec<f32> = batch
            .iter()
            .flat_map(|&i| targets[i].iter().copied())
            .collect();

        let obs_tensor = Tensor::<B, 2>::from_data(
            TensorData::new(obs, [batch_size, self.input_dim()]),
            &self.device,
        );
        let target_tensor = Tensor::<B, 2>::from_data(
            TensorData::new(target, [batch_size, self.action_dim()]),
            &self.device,
        );

        let logits = self.network.forward(obs_tensor);
        let loss = categorical_cross_entropy(logits, target_tensor);

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.network);
        self.network = self
            .optimizer
            .step(self.learning_rate, self.network.clone(), grads);

        Ok(tensor_to_vec(loss)?[0])
    }
}

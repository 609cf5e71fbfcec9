//! Policy network using Burn framework

use burn::module::Module;
use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;
use burn::tensor::activation::log_softmax;

use crate::infra::CemError;

/// Configuration for the policy network
#[derive(Debug, Config)]
pub struct PolicyConfig {
    /// Length of the flattened observation
    pub input_dim: usize,
    /// Number of discrete actions
    pub action_dim: usize,
    /// Hidden layer size
    #[config(default = 32)]
    pub hidden_size: usize,
}

impl PolicyConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> PolicyNetwork<B> {
        PolicyNetwork {
            hidden: LinearConfig::new(self.input_dim, self.hidden_size).init(device),
            output: LinearConfig::new(self.hidden_size, self.action_dim).init(device),
            activation: Relu::new(),
        }
    }
}

/// Two-layer policy: observation -> ReLU hidden layer -> per-action logits
#[derive(Module, Debug)]
pub struct PolicyNetwork<B: Backend> {
    /// Hidden layer
    hidden: Linear<B>,
    /// Output layer (logits for each action)
    output: Linear<B>,
    activation: Relu,
}

impl<B: Backend> PolicyNetwork<B> {
    /// Forward pass returning raw logits
    /// obs: [batch_size, input_dim] -> [batch_size, action_dim]
    pub fn forward(&self, obs: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.activation.forward(self.hidden.forward(obs));
        self.output.forward(x)
    }

    pub fn input_dim(&self) -> usize {
        self.hidden.weight.val().dims()[0]
    }

    pub fn action_dim(&self) -> usize {
        self.output.weight.val().dims()[1]
    }

    /// All weights and biases flattened into one vector, layer by layer
    pub fn parameter_snapshot(&self) -> crate::infra::Result<Vec<f32>> {
        let mut params = Vec::new();

        for layer in [&self.hidden, &self.output] {
            params.extend(tensor_to_vec(layer.weight.val())?);
            if let Some(bias) = &layer.bias {
                params.extend(tensor_to_vec(bias.val())?);
            }
        }

        Ok(params)
    }
}

/// Categorical cross-entropy between logits and target distributions,
/// averaged over the batch
pub fn categorical_cross_entropy<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let log_probs = log_softmax(logits, 1);
    -(targets * log_probs).sum_dim(1).mean()
}

pub(crate) fn tensor_to_vec<B: Backend, const D: usize>(
    tensor: Tensor<B, D>,
) -> crate::infra::Result<Vec<f32>> {
    tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| CemError::Tensor(format!("{:?}", e)))
}

//! CEM training loop

use burn::optim::{AdamConfig, Optimizer};
use burn::tensor::backend::AutodiffBackend;

use crate::env::{self, Environment};
use crate::infra::Result;

use super::agent::Agent;
use super::config::CemConfig;
use super::elite::{one_hot_batch, select_elites};
use super::metrics::{MetricsLogger, MovingAverage, RoundMetrics, TrainingHistory};
use super::policy::{PolicyConfig, PolicyNetwork};
use super::rollout::rollout_batch;

/// Rounds averaged for the reward trend shown in the logs
const REWARD_TREND_WINDOW: usize = 10;

/// CEM trainer - samples episodes, keeps the elite ones and fits the policy
/// to their actions, round after round
pub struct CemTrainer<B: AutodiffBackend, O: Optimizer<PolicyNetwork<B>, B>> {
    agent: Agent<B, O>,
    config: CemConfig,
    history: TrainingHistory,
    reward_trend: MovingAverage,
    metrics_logger: Option<MetricsLogger>,
}

impl<B: AutodiffBackend, O: Optimizer<PolicyNetwork<B>, B>> CemTrainer<B, O> {
    pub fn new(agent: Agent<B, O>, config: CemConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            agent,
            config,
            history: TrainingHistory::new(),
            reward_trend: MovingAverage::new(REWARD_TREND_WINDOW),
            metrics_logger: None,
        })
    }

    /// Also append every round to a CSV file
    pub fn with_metrics_logger(mut self, logger: MetricsLogger) -> Self {
        self.metrics_logger = Some(logger);
        self
    }

    pub fn agent(&self) -> &Agent<B, O> {
        &self.agent
    }

    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    /// One round: rollouts, elite selection, supervised update.
    ///
    /// The policy is only written after every rollout of the round is done.
    pub fn train_round<E>(&mut self, env: &mut E, round: usize) -> Result<RoundMetrics>
    where
        E: Environment + ?Sized,
    {
        let num_rollouts = self.config.num_rollouts_per_round;
        let trajectories = rollout_batch(&mut self.agent, env, num_rollouts)?;

        let mean_reward = trajectories
            .iter()
            .map(|t| t.total_reward())
            .sum::<f32>()
            / trajectories.len() as f32;

        let elites = select_elites(&trajectories, self.config.elitism_percentile)?;
        drop(trajectories);

        let targets = one_hot_batch(&elites.actions, self.agent.action_dim())?;
        let loss = self.agent.update(
            &elites.observations,
            &targets,
            self.config.update_epochs,
            self.config.update_batch_size,
        )?;

        let metrics = RoundMetrics {
            round,
            elite_threshold: elites.threshold,
            mean_reward,
            num_elite_samples: elites.len(),
            num_elite_trajectories: elites.num_trajectories,
            loss,
        };

        self.reward_trend.push(mean_reward);
        tracing::info!(
            "Round {}: elite_threshold={:.3}, mean_reward={:.3} (trend {:.3}), elite={}/{} episodes ({} samples), loss={:.4}",
            round,
            metrics.elite_threshold,
            metrics.mean_reward,
            self.reward_trend.average(),
            metrics.num_elite_trajectories,
            num_rollouts,
            metrics.num_elite_samples,
            metrics.loss
        );

        if let Some(logger) = self.metrics_logger.as_mut() {
            logger.log_round(&metrics)?;
        }
        self.history.record(metrics.clone());

        Ok(metrics)
    }

    /// Run exactly `num_rounds` rounds. Any error aborts training.
    pub fn run<E>(&mut self, env: &mut E) -> Result<TrainingHistory>
    where
        E: Environment + ?Sized,
    {
        tracing::info!(
            "Starting CEM training: {} rounds x {} rollouts, percentile={}, selector={}",
            self.config.num_rounds,
            self.config.num_rollouts_per_round,
            self.config.elitism_percentile,
            self.agent.selector_name()
        );

        for round in 0..self.config.num_rounds {
            if let Err(err) = self.train_round(env, round) {
                tracing::error!("Round {} failed: {}", round, err);
                return Err(err);
            }
        }

        if let Some(logger) = self.metrics_logger.as_mut() {
            logger.close()?;
        }

        tracing::info!("Training complete!");
        Ok(self.history.clone())
    }
}

/// Train a fresh policy on the registered environment `config.env_id`
pub fn train<B: AutodiffBackend>(config: CemConfig, device: B::Device) -> Result<TrainingHistory> {
    config.validate()?;
    let env = env::make(&config.env_id)?;
    train_on::<B>(config, env, device)
}

/// Train a fresh policy on `env`. The environment is closed whether training
/// succeeds or not.
pub fn train_on<B: AutodiffBackend>(
    config: CemConfig,
    mut env: Box<dyn Environment>,
    device: B::Device,
) -> Result<TrainingHistory> {
    let result = build_and_run::<B>(config, env.as_mut(), device);
    env.close();
    result
}

fn build_and_run<B: AutodiffBackend>(
    config: CemConfig,
    env: &mut dyn Environment,
    device: B::Device,
) -> Result<TrainingHistory> {
    config.validate()?;

    if let Some(seed) = config.seed {
        B::seed(seed);
    }

    tracing::info!(
        "Environment {}: observation shape {:?}, {} actions",
        config.env_id,
        env.observation_shape(),
        env.action_space_size()
    );

    let network = PolicyConfig::new(env.observation_size(), env.action_space_size())
        .with_hidden_size(config.hidden_size)
        .init::<B>(&device);
    let optimizer = AdamConfig::new().init::<B, PolicyNetwork<B>>();
    let agent = Agent::new(
        network,
        optimizer,
        config.selector.build(),
        config.learning_rate,
        device,
        config.seed,
    );

    let logger = match &config.metrics_dir {
        Some(dir) => Some(MetricsLogger::create(dir, &config.env_id)?),
        None => None,
    };

    let mut trainer = CemTrainer::new(agent, config)?;
    if let Some(logger) = logger {
        trainer = trainer.with_metrics_logger(logger);
    }

    trainer.run(env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cem::selector::{LogOfLogitsSampler, SoftmaxSampler};
    use crate::cem::test_support::{FixedLengthEnv, TestBackend, test_agent};
    use crate::env::{GridNavEnv, Observation, StepResult};
    use crate::infra::CemError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn small_config() -> CemConfig {
        CemConfig {
            num_rollouts_per_round: 10,
            elitism_percentile: 50.0,
            num_rounds: 1,
            seed: Some(42),
            ..CemConfig::default()
        }
    }

    #[test]
    fn test_constant_reward_round() {
        let mut env = FixedLengthEnv::new(3);
        let agent = test_agent(env.observation_size(), 3, Box::new(SoftmaxSampler));
        let mut trainer = CemTrainer::new(agent, small_config()).unwrap();

        let history = trainer.run(&mut env).unwrap();

        assert_eq!(history.len(), 1);
        let round = &history.rounds()[0];
        assert_eq!(round.round, 0);
        assert_eq!(round.mean_reward, 3.0);
        assert_eq!(round.elite_threshold, 3.0);
        assert_eq!(round.num_elite_trajectories, 10);
        assert_eq!(round.num_elite_samples, 30);
    }

    #[test]
    fn test_runs_exact_round_count() {
        let mut env = FixedLengthEnv::new(2);
        let agent = test_agent(env.observation_size(), 3, Box::new(SoftmaxSampler));
        let config = CemConfig {
            num_rounds: 4,
            num_rollouts_per_round: 3,
            ..small_config()
        };
        let mut trainer = CemTrainer::new(agent, config).unwrap();

        let history = trainer.run(&mut env).unwrap();
        let rounds: Vec<usize> = history.rounds().iter().map(|r| r.round).collect();
        assert_eq!(rounds, vec![0, 1, 2, 3]);
        assert_eq!(trainer.history().len(), 4);
    }

    #[test]
    fn test_round_updates_policy() {
        let mut env = GridNavEnv::new(5).unwrap();
        let agent = test_agent(env.observation_size(), 4, Box::new(SoftmaxSampler));
        let before = agent.network().parameter_snapshot().unwrap();
        let mut trainer = CemTrainer::new(agent, small_config()).unwrap();

        let metrics = trainer.train_round(&mut env, 0).unwrap();

        assert!(metrics.num_elite_samples > 0);
        assert!(metrics.mean_reward >= 0.0 && metrics.mean_reward <= 1.0);
        let after = trainer.agent().network().parameter_snapshot().unwrap();
        assert!(before.iter().zip(&after).any(|(a, b)| a != b));
    }

    #[test]
    fn test_log_of_logits_round_fails_cleanly() {
        let mut env = FixedLengthEnv::new(3);
        let agent = test_agent(env.observation_size(), 3, Box::new(LogOfLogitsSampler));
        let mut trainer = CemTrainer::new(agent, small_config()).unwrap();

        // Raw outputs are rarely all positive; a non-positive one ends the run
        // with a domain error rather than a panic or a NaN policy
        match trainer.run(&mut env) {
            Ok(history) => assert_eq!(history.len(), 1),
            Err(err) => {
                assert!(matches!(err, CemError::NumericDomain { .. }));
                assert!(trainer.history().is_empty());
            }
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let agent = test_agent(4, 3, Box::new(SoftmaxSampler));
        let config = CemConfig {
            num_rollouts_per_round: 0,
            ..small_config()
        };
        assert!(matches!(
            CemTrainer::new(agent, config),
            Err(CemError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_train_unknown_environment() {
        let config = CemConfig {
            env_id: "Nowhere-v0".to_string(),
            ..small_config()
        };
        assert!(matches!(
            train::<TestBackend>(config, Default::default()),
            Err(CemError::UnknownEnvironment(_))
        ));
    }

    /// Records whether `close` was called
    struct ClosingEnv {
        inner: FixedLengthEnv,
        closed: Arc<AtomicBool>,
    }

    impl Environment for ClosingEnv {
        fn reset(&mut self) -> Result<Observation> {
            self.inner.reset()
        }

        fn step(&mut self, action: usize) -> Result<StepResult> {
            self.inner.step(action)
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        fn action_space_size(&self) -> usize {
            self.inner.action_space_size()
        }

        fn observation_shape(&self) -> &[usize] {
            self.inner.observation_shape()
        }
    }

    fn closing_env() -> (Box<dyn Environment>, Arc<AtomicBool>) {
        let closed = Arc::new(AtomicBool::new(false));
        let env = ClosingEnv {
            inner: FixedLengthEnv::new(2),
            closed: Arc::clone(&closed),
        };
        (Box::new(env), closed)
    }

    #[test]
    fn test_train_on_closes_environment() {
        let (env, closed) = closing_env();
        let history = train_on::<TestBackend>(small_config(), env, Default::default()).unwrap();

        assert_eq!(history.len(), 1);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_train_on_closes_environment_when_setup_fails() {
        // A regular file where the metrics directory should be
        let blocker = std::env::temp_dir().join(format!("gridcem-blocker-{}", std::process::id()));
        std::fs::write(&blocker, "not a directory").unwrap();

        let config = CemConfig {
            metrics_dir: Some(blocker.join("metrics").to_string_lossy().into_owned()),
            ..small_config()
        };
        let (env, closed) = closing_env();
        let result = train_on::<TestBackend>(config, env, Default::default());
        std::fs::remove_file(&blocker).ok();

        assert!(matches!(result, Err(CemError::Io(_))));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_train_registered_environment() {
        let config = CemConfig {
            num_rounds: 2,
            ..small_config()
        };
        let history = train::<TestBackend>(config, Default::default()).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.rounds().iter().all(|r| r.loss.is_finite()));
    }
}

//! Per-round training metrics and CSV export

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use time::{OffsetDateTime, format_description};

use crate::infra::{CemError, Result};

/// Moving average calculator
#[derive(Debug, Clone)]
pub struct MovingAverage {
    values: VecDeque<f32>,
    window_size: usize,
    sum: f32,
}

impl MovingAverage {
    pub fn new(window_size: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(window_size),
            window_size,
            sum: 0.0,
        }
    }

    pub fn push(&mut self, value: f32) {
        if self.values.len() >= self.window_size {
            if let Some(old) = self.values.pop_front() {
                self.sum -= old;
            }
        }
        self.values.push_back(value);
        self.sum += value;
    }

    pub fn average(&self) -> f32 {
        if self.values.is_empty() {
            0.0
        } else {
            self.sum / self.values.len() as f32
        }
    }
}

/// What one training round produced
#[derive(Debug, Clone, PartialEq)]
pub struct RoundMetrics {
    pub round: usize,
    pub elite_threshold: f32,
    pub mean_reward: f32,
    /// (observation, action) pairs the policy was fitted to
    pub num_elite_samples: usize,
    pub num_elite_trajectories: usize,
    /// Mean cross-entropy over the round's update batches
    pub loss: f32,
}

/// Round metrics in the order they were recorded
#[derive(Debug, Clone, Default)]
pub struct TrainingHistory {
    rounds: Vec<RoundMetrics>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, metrics: RoundMetrics) {
        self.rounds.push(metrics);
    }

    pub fn rounds(&self) -> &[RoundMetrics] {
        &self.rounds
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    pub fn last(&self) -> Option<&RoundMetrics> {
        self.rounds.last()
    }

    pub fn mean_rewards(&self) -> Vec<f32> {
        self.rounds.iter().map(|r| r.mean_reward).collect()
    }

    pub fn elite_thresholds(&self) -> Vec<f32> {
        self.rounds.iter().map(|r| r.elite_threshold).collect()
    }

    /// Round with the highest mean reward
    pub fn best(&self) -> Option<&RoundMetrics> {
        self.rounds
            .iter()
            .max_by(|a, b| a.mean_reward.total_cmp(&b.mean_reward))
    }
}

/// Appends one CSV row per round, for plotting mean reward against the elite
/// threshold
pub struct MetricsLogger {
    path: PathBuf,
    file: File,
}

impl MetricsLogger {
    const HEADER: &'static str =
        "round,elite_threshold,mean_reward,num_elite_samples,num_elite_trajectories,loss";

    /// Create `<log_dir>/cem_<env_id>_<timestamp>.csv`
    pub fn create(log_dir: &str, env_id: &str) -> Result<Self> {
        std::fs::create_dir_all(log_dir)?;

        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let format =
            format_description::parse_borrowed::<2>("[year][month][day]-[hour][minute][second]")
                .map_err(|e| CemError::InvalidConfig(format!("bad timestamp format: {}", e)))?;
        let stamp = now
            .format(&format)
            .map_err(|e| CemError::InvalidConfig(format!("cannot format timestamp: {}", e)))?;

        let path = Path::new(log_dir).join(format!("cem_{}_{}.csv", env_id, stamp));
        Self::open(path)
    }

    /// Open (or create) a CSV file at an explicit path, writing the header if
    /// the file is new
    pub fn open(path: PathBuf) -> Result<Self> {
        let file_exists = path.exists();
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;

        if !file_exists {
            writeln!(file, "{}", Self::HEADER)?;
        }

        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log_round(&mut self, metrics: &RoundMetrics) -> Result<()> {
        writeln!(
            self.file,
            "{},{},{},{},{},{}",
            metrics.round,
            metrics.elite_threshold,
            metrics.mean_reward,
            metrics.num_elite_samples,
            metrics.num_elite_trajectories,
            metrics.loss
        )?;
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.file.flush()?;
        tracing::info!("Round metrics saved to {}", self.path.display());
        Ok(())
    }
}

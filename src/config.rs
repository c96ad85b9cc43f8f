use std::path::PathBuf;

use crate::error::{ClassifierError, Result};

/// Seed shared by the dataset split and anything else that needs randomness.
pub const DEFAULT_SEED: u64 = 1;
pub const DEFAULT_TEST_FRACTION: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub learning_rate: f64,
    pub epochs: usize,
    pub l2_penalty: f64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.5,
            epochs: 300,
            l2_penalty: 1e-4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub feature_file: PathBuf,
    pub model_file: PathBuf,
    pub seed: u64,
    pub test_fraction: f64,
    pub parallel_decode: bool,
    pub trainer: TrainerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            feature_file: PathBuf::from("packets.tsv"),
            model_file: PathBuf::from("model.bin"),
            seed: DEFAULT_SEED,
            test_fraction: DEFAULT_TEST_FRACTION,
            parallel_decode: false,
            trainer: TrainerConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(ClassifierError::ConfigError(format!(
                "test fraction must be in (0, 1), got {}",
                self.test_fraction
            )));
        }
        if self.trainer.epochs == 0 {
            return Err("epochs must be at least 1".into());
        }
        if !(self.trainer.learning_rate > 0.0) {
            return Err(ClassifierError::ConfigError(format!(
                "learning rate must be positive, got {}",
                self.trainer.learning_rate
            )));
        }
        if self.trainer.l2_penalty < 0.0 {
            return Err("l2 penalty must not be negative".into());
        }
        if self.feature_file == self.model_file {
            return Err("feature file and model file must be different paths".into());
        }
        Ok(())
    }
}

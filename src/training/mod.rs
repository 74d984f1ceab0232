pub mod trainer;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Training configuration.
///
/// Defaults mirror the fitting scheme of the analysis pipeline: 100 epochs,
/// batches of 10, a 10% validation tail and early stopping on validation loss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Number of training epochs
    pub epochs: usize,
    /// Batch size
    pub batch_size: usize,
    /// Learning rate
    pub learning_rate: f64,
    /// Fraction of the training set held out for validation
    pub validation_split: f64,
    /// Epochs without validation-loss improvement before stopping
    pub early_stopping_patience: usize,
    /// Minimum validation-loss improvement to reset patience
    pub early_stopping_min_delta: f64,
    /// Optimizer
    pub optimizer: OptimizerKind,
    /// Random seed
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            batch_size: 10,
            learning_rate: 0.001,
            validation_split: 0.1,
            early_stopping_patience: 3,
            early_stopping_min_delta: 1e-5,
            optimizer: OptimizerKind::Adam,
            seed: 91,
        }
    }
}

impl TrainingConfig {
    /// Create configuration for quick testing
    pub fn quick_test() -> Self {
        Self {
            epochs: 3,
            batch_size: 4,
            ..Default::default()
        }
    }
}

/// Optimizer selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum OptimizerKind {
    Adam,
    #[value(name = "adamw")]
    AdamW,
    Sgd,
    Rmsprop,
}

impl OptimizerKind {
    /// Name used in exported file names and metadata
    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizerKind::Adam => "adam",
            OptimizerKind::AdamW => "adamw",
            OptimizerKind::Sgd => "sgd",
            OptimizerKind::Rmsprop => "rmsprop",
        }
    }
}

/// Training state
#[derive(Debug, Clone)]
pub struct TrainingState {
    /// Epochs completed
    pub epoch: usize,
    /// Best validation loss so far
    pub best_val_loss: f64,
    /// Epochs since the validation loss last improved
    pub epochs_without_improvement: usize,
    /// Training loss per epoch
    pub train_loss_history: Vec<f64>,
    /// Validation loss per epoch (empty when no validation tail exists)
    pub val_loss_history: Vec<f64>,
}

impl TrainingState {
    /// Create new training state
    pub fn new() -> Self {
        Self {
            epoch: 0,
            best_val_loss: f64::INFINITY,
            epochs_without_improvement: 0,
            train_loss_history: Vec::new(),
            val_loss_history: Vec::new(),
        }
    }

    /// Record an epoch; `val_loss` is absent when no validation tail exists
    pub fn update_epoch(&mut self, train_loss: f64, val_loss: Option<f64>, min_delta: f64) {
        self.epoch += 1;
        self.train_loss_history.push(train_loss);

        if let Some(val_loss) = val_loss {
            self.val_loss_history.push(val_loss);

            if val_loss < self.best_val_loss - min_delta {
                self.best_val_loss = val_loss;
                self.epochs_without_improvement = 0;
            } else {
                self.epochs_without_improvement += 1;
            }
        }
    }

    /// Check whether early stopping should trigger
    pub fn should_stop_early(&self, patience: usize) -> bool {
        patience > 0 && self.epochs_without_improvement >= patience
    }
}

impl Default for TrainingState {
    fn default() -> Self {
        Self::new()
    }
}

/// Training result
#[derive(Debug, Clone)]
pub struct TrainingResult {
    /// Final training state
    pub state: TrainingState,
    /// Training duration in seconds
    pub duration_secs: f64,
}

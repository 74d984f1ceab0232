use crate::model::architecture::{create_feature_tensor, create_target_tensor, PbkNetwork};
use crate::training::{OptimizerKind, TrainingConfig, TrainingResult, TrainingState};
use anyhow::{bail, Result};
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, AdamWConfig, GradientsParams, Optimizer, RmsPropConfig, SgdConfig};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use indicatif::{ProgressBar, ProgressStyle};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::time::Instant;
use tracing::{debug, info};

/// Trainer for the biologically-informed classifier.
///
/// Fits with mini-batch cross-entropy, holding out the tail of the training
/// rows as a validation split for early stopping.
pub struct Trainer<B: AutodiffBackend> {
    config: TrainingConfig,
    device: B::Device,
}

impl<B: AutodiffBackend> Trainer<B> {
    /// Create new trainer
    pub fn new(config: TrainingConfig, device: B::Device) -> Self {
        Self { config, device }
    }

    /// Fit the model on row-major features and encoded targets.
    pub fn train(
        &self,
        model: PbkNetwork<B>,
        values: &[f32],
        targets: &[i64],
        n_features: usize,
    ) -> Result<(PbkNetwork<B>, TrainingResult)> {
        match self.config.optimizer {
            OptimizerKind::Adam => {
                self.fit(model, values, targets, n_features, AdamConfig::new().init())
            }
            OptimizerKind::AdamW => {
                self.fit(model, values, targets, n_features, AdamWConfig::new().init())
            }
            OptimizerKind::Sgd => {
                self.fit(model, values, targets, n_features, SgdConfig::new().init())
            }
            OptimizerKind::Rmsprop => {
                self.fit(model, values, targets, n_features, RmsPropConfig::new().init())
            }
        }
    }

    fn fit<O: Optimizer<PbkNetwork<B>, B>>(
        &self,
        mut model: PbkNetwork<B>,
        values: &[f32],
        targets: &[i64],
        n_features: usize,
        mut optim: O,
    ) -> Result<(PbkNetwork<B>, TrainingResult)> {
        let n_samples = targets.len();
        if n_samples == 0 {
            bail!("cannot train on an empty fold");
        }
        if values.len() != n_samples * n_features {
            bail!(
                "feature buffer has {} values, expected {} samples x {} features",
                values.len(),
                n_samples,
                n_features
            );
        }

        // validation tail: the last fraction of the training rows
        let n_train = ((n_samples as f64) * (1.0 - self.config.validation_split)) as usize;
        if n_train == 0 {
            bail!("validation split {} leaves no training rows", self.config.validation_split);
        }
        let n_val = n_samples - n_train;

        let val_tensors = (n_val > 0).then(|| {
            let val_values = &values[n_train * n_features..];
            let val_targets = &targets[n_train..];
            (
                create_feature_tensor::<B::InnerBackend>(val_values, n_features, &self.device),
                create_target_tensor::<B::InnerBackend>(val_targets, &self.device),
            )
        });

        debug!(
            "Fitting on {} rows ({} validation) with {:?}",
            n_train, n_val, self.config.optimizer
        );

        let start_time = Instant::now();
        let mut state = TrainingState::new();
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut indices: Vec<usize> = (0..n_train).collect();

        let pb = ProgressBar::new(self.config.epochs as u64);
        pb.set_style(
            ProgressStyle::with_template("{bar:40} {pos}/{len} epochs {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        for _epoch in 0..self.config.epochs {
            indices.shuffle(&mut rng);

            let mut epoch_loss = 0.0;
            let mut n_batches = 0usize;

            for chunk in indices.chunks(self.config.batch_size) {
                let mut batch_values = Vec::with_capacity(chunk.len() * n_features);
                let mut batch_targets = Vec::with_capacity(chunk.len());
                for &i in chunk {
                    batch_values.extend_from_slice(&values[i * n_features..(i + 1) * n_features]);
                    batch_targets.push(targets[i]);
                }

                let input = create_feature_tensor::<B>(&batch_values, n_features, &self.device);
                let batch_y = create_target_tensor::<B>(&batch_targets, &self.device);

                let output = model.forward_classification(input, batch_y);
                epoch_loss += output.loss.clone().into_scalar().elem::<f64>();
                n_batches += 1;

                let grads = output.loss.backward();
                let grads = GradientsParams::from_grads(grads, &model);
                model = optim.step(self.config.learning_rate, model, grads);
            }

            let train_loss = epoch_loss / n_batches.max(1) as f64;

            let val_loss = val_tensors.as_ref().map(|(val_x, val_y)| {
                let valid_model = model.valid();
                let output = valid_model.forward_classification(val_x.clone(), val_y.clone());
                output.loss.into_scalar().elem::<f64>()
            });

            state.update_epoch(train_loss, val_loss, self.config.early_stopping_min_delta);

            pb.inc(1);
            match val_loss {
                Some(v) => pb.set_message(format!("loss {:.4} val {:.4}", train_loss, v)),
                None => pb.set_message(format!("loss {:.4}", train_loss)),
            }

            if state.should_stop_early(self.config.early_stopping_patience) {
                info!(
                    "Early stopping at epoch {} (best val loss {:.6})",
                    state.epoch, state.best_val_loss
                );
                break;
            }
        }
        pb.finish_and_clear();

        let duration_secs = start_time.elapsed().as_secs_f64();
        info!(
            "Training finished after {} epochs in {:.2}s",
            state.epoch, duration_secs
        );

        Ok((
            model,
            TrainingResult {
                state,
                duration_secs,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::knowledge::HiddenLayerMask;
    use crate::model::architecture::init_model;
    use crate::model::{Activation, ModelConfig};
    use crate::TrainingBackend;
    use ndarray::Array2;

    fn dense_mask(n_genes: usize, n_units: usize) -> HiddenLayerMask {
        HiddenLayerMask {
            genes: (0..n_genes).map(|i| format!("g{}", i)).collect(),
            units: (0..n_units).map(|i| format!("dense_{}", i + 1)).collect(),
            weights: Array2::ones((n_genes, n_units)),
        }
    }

    /// Two well-separated classes along the two input genes.
    fn separable_data(n_per_class: usize) -> (Vec<f32>, Vec<i64>) {
        let mut values = Vec::new();
        let mut targets = Vec::new();
        for i in 0..n_per_class {
            let jitter = (i % 5) as f32 * 0.02;
            values.extend_from_slice(&[1.0 + jitter, 0.0 + jitter]);
            targets.push(0);
            values.extend_from_slice(&[0.0 - jitter, 1.0 - jitter]);
            targets.push(1);
        }
        (values, targets)
    }

    #[test]
    fn test_training_reduces_loss() {
        let device = Default::default();
        let mask = dense_mask(2, 8);
        let model = init_model::<TrainingBackend>(
            &ModelConfig::new(2),
            &mask,
            Activation::Relu,
            91,
            &device,
        );

        let (values, targets) = separable_data(10);
        let config = TrainingConfig {
            epochs: 20,
            batch_size: 4,
            learning_rate: 0.01,
            ..TrainingConfig::default()
        };

        let trainer = Trainer::<TrainingBackend>::new(config, device);
        let (_model, result) = trainer.train(model, &values, &targets, 2).unwrap();

        let history = &result.state.train_loss_history;
        assert!(!history.is_empty());
        assert!(history.iter().all(|l| l.is_finite()));
        assert!(
            history.last().unwrap() < history.first().unwrap(),
            "loss did not decrease: {:?}",
            history
        );
        assert!(result.state.epoch <= 20);
        assert_eq!(result.state.val_loss_history.len(), result.state.epoch);
    }

    #[test]
    fn test_training_rejects_bad_buffer() {
        let device = Default::default();
        let mask = dense_mask(2, 4);
        let model = init_model::<TrainingBackend>(
            &ModelConfig::new(2),
            &mask,
            Activation::Relu,
            91,
            &device,
        );

        let trainer = Trainer::<TrainingBackend>::new(TrainingConfig::quick_test(), device);
        assert!(trainer.train(model, &[1.0, 2.0, 3.0], &[0, 1], 2).is_err());
    }

    #[test]
    fn test_training_without_validation_tail() {
        let device = Default::default();
        let mask = dense_mask(2, 4);
        let model = init_model::<TrainingBackend>(
            &ModelConfig::new(2),
            &mask,
            Activation::Tanh,
            91,
            &device,
        );

        let (values, targets) = separable_data(3);
        let config = TrainingConfig {
            epochs: 2,
            batch_size: 2,
            validation_split: 0.0,
            ..TrainingConfig::default()
        };

        let trainer = Trainer::<TrainingBackend>::new(config, device);
        let (_model, result) = trainer.train(model, &values, &targets, 2).unwrap();

        assert_eq!(result.state.epoch, 2);
        assert!(result.state.val_loss_history.is_empty());
    }
}

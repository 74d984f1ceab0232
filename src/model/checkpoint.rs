use anyhow::{Context, Result};
use burn::module::Module;
use burn::record::{CompactRecorder, Recorder};
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::data::knowledge::HiddenLayerMask;
use crate::model::architecture::{init_model, PbkNetwork};
use crate::model::{Activation, ModelConfig};

/// Sidecar metadata stored next to every exported model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Checkpoint kind: full "model" or "encoding" export
    pub kind: String,
    /// Design name
    pub design: String,
    /// Dataset name
    pub dataset: String,
    /// Analysis mode that produced the checkpoint
    pub analysis: String,
    /// Fold label within the analysis
    pub fold: String,
    /// Optimizer name
    pub optimizer: String,
    /// Activation name
    pub activation: String,
    /// Class vocabulary in index order
    pub classes: Vec<String>,
    /// Number of input genes
    pub n_genes: usize,
    /// Number of first-hidden-layer units
    pub n_hidden_units: usize,
    /// Second hidden layer present
    pub second_hidden_layer: bool,
    /// Second hidden layer width
    pub second_hidden_units: usize,
    /// Epochs actually trained (after early stopping)
    pub epochs_trained: usize,
    /// Best validation loss seen during training
    pub best_val_loss: f64,
    /// Unix timestamp of the export
    pub timestamp: u64,
}

impl CheckpointMetadata {
    /// Model configuration encoded in the metadata
    pub fn model_config(&self) -> ModelConfig {
        ModelConfig::new(self.classes.len())
            .with_second_hidden_layer(self.second_hidden_layer)
            .with_second_hidden_units(self.second_hidden_units)
    }
}

/// Saves and restores trained models with their metadata sidecar.
pub struct ModelExporter;

impl ModelExporter {
    /// Save a model record plus metadata; returns the model path
    pub fn save<B: Backend, P: AsRef<Path>>(
        model: &PbkNetwork<B>,
        path: P,
        metadata: &CheckpointMetadata,
    ) -> Result<PathBuf> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create model directory {:?}", parent))?;
        }

        let record = model.clone().into_record();
        CompactRecorder::new()
            .record(record, path.to_path_buf())
            .with_context(|| format!("failed to save model to {:?}", path))?;

        let metadata_path = path.with_extension("json");
        let metadata_json =
            serde_json::to_string_pretty(metadata).context("failed to serialize metadata")?;
        fs::write(&metadata_path, metadata_json)
            .with_context(|| format!("failed to write metadata to {:?}", metadata_path))?;

        info!("Saved {} checkpoint: {:?}", metadata.kind, path);
        Ok(path.to_path_buf())
    }

    /// Load a model and its metadata; the mask must match the saved layout
    pub fn load<B: Backend, P: AsRef<Path>>(
        path: P,
        mask: &HiddenLayerMask,
        device: &B::Device,
    ) -> Result<(PbkNetwork<B>, CheckpointMetadata)> {
        let path = path.as_ref();
        info!("Loading model from {:?}", path);

        let metadata_path = path.with_extension("json");
        let metadata_json = fs::read_to_string(&metadata_path)
            .with_context(|| format!("failed to read metadata from {:?}", metadata_path))?;
        let metadata: CheckpointMetadata =
            serde_json::from_str(&metadata_json).context("failed to parse metadata")?;

        anyhow::ensure!(
            metadata.n_genes == mask.genes.len() && metadata.n_hidden_units == mask.units.len(),
            "mask shape ({}, {}) does not match checkpoint ({}, {})",
            mask.genes.len(),
            mask.units.len(),
            metadata.n_genes,
            metadata.n_hidden_units
        );

        let record = CompactRecorder::new()
            .load(path.to_path_buf(), device)
            .with_context(|| format!("failed to load model record from {:?}", path))?;

        let activation = match metadata.activation.as_str() {
            "tanh" => Activation::Tanh,
            "sigmoid" => Activation::Sigmoid,
            _ => Activation::Relu,
        };
        let model = init_model::<B>(&metadata.model_config(), mask, activation, 0, device)
            .load_record(record);

        Ok((model, metadata))
    }
}

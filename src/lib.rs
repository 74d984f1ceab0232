//! # pbknet: biologically-informed neural network for single-cell data
//!
//! pbknet trains a feed-forward classifier on single-cell gene-expression
//! matrices whose first hidden layer is wired from prior biological knowledge
//! (a gene-to-pathway membership matrix) combined with freely-connected dense
//! units. Six analysis modes pair a cross-validation/grouping scheme with a
//! downstream behavior: classification evaluation, clustering of the learned
//! encoding, retrieval-model export, or encoder export.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use pbknet::data::loader::ExpressionLoader;
//! use pbknet::data::knowledge::HiddenLayerSpec;
//! use pbknet::data::split::SplitStrategy;
//! use pbknet::cli::Analysis;
//!
//! let data = ExpressionLoader::new().load("data/pbmc/pbmc.csv").unwrap();
//! let mask = HiddenLayerSpec::dense_only(100).build(&data.genes).unwrap();
//!
//! let strategy = SplitStrategy::for_analysis(Analysis::EvaluateSkf);
//! let folds = strategy.generate(&data.labels, 91).unwrap();
//! assert_eq!(folds.len(), 10);
//! assert_eq!(mask.genes.len(), data.genes.len());
//! ```

pub mod analysis;
pub mod cli;
pub mod data;
pub mod model;
pub mod training;
pub mod utils;

use burn::backend::Autodiff;
use burn_ndarray::NdArray;

/// Default backend type for inference
pub type DefaultBackend = NdArray<f32>;

/// Backend type for training (gradient tracking enabled)
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Re-export commonly used types
pub use data::knowledge::{HiddenLayerMask, HiddenLayerSpec};
pub use data::split::{SplitFold, SplitStrategy};
pub use data::{ExpressionMatrix, LabelEncoder};
pub use model::architecture::PbkNetwork;
pub use model::{Activation, ModelConfig};
pub use training::{OptimizerKind, TrainingConfig, TrainingResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn info() -> String {
    format!(
        "{} v{} - biologically-informed neural network for single-cell data",
        NAME, VERSION
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_info() {
        let info_str = info();
        assert!(info_str.contains("pbknet"));
        assert!(info_str.contains(VERSION));
    }
}

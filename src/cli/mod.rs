use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::model::Activation;
use crate::training::OptimizerKind;

/// pbknet: biologically-informed neural network for single-cell data
#[derive(Parser, Debug)]
#[command(name = "pbknet")]
#[command(about = "Train a biologically-informed neural network on single-cell expression data")]
#[command(version)]
pub struct Cli {
    /// Name of the network design, used in all exported file names
    #[arg(long)]
    pub design: String,

    /// Prior biological knowledge matrix (CSV: gene, pathway columns); omit for none
    #[arg(long = "first-hidden-layer-pbk")]
    pub first_hidden_layer_pbk: Option<PathBuf>,

    /// Number of fully-connected dense units added to the first hidden layer
    #[arg(long = "first-hidden-layer-dense", default_value = "0")]
    pub first_hidden_layer_dense: usize,

    /// Insert a second dense hidden layer between the masked layer and the output
    #[arg(long = "second-hidden-layer")]
    pub second_hidden_layer: bool,

    /// Optimizer used for training
    #[arg(long, value_enum, default_value = "adam")]
    pub optimizer: OptimizerKind,

    /// Activation applied to the hidden layers
    #[arg(long, value_enum, default_value = "relu")]
    pub activation: Activation,

    /// Dataset path (CSV/TSV, optionally gzipped; last column is the cell type)
    #[arg(long)]
    pub ds: PathBuf,

    /// Analysis mode, selects the split strategy and the downstream behavior
    #[arg(long, value_enum)]
    pub analysis: Analysis,

    /// Restrict the gene space to the genes of the knowledge matrix
    #[arg(long = "filter-gene-space")]
    pub filter_gene_space: bool,

    /// Root directory for models/, reports/ and logs/
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Random seed for splits, weight init and k-means
    #[arg(long, default_value = "91")]
    pub seed: u64,

    /// Number of training epochs per fold
    #[arg(long, default_value = "100")]
    pub epochs: usize,

    /// Batch size
    #[arg(long = "batch-size", default_value = "10")]
    pub batch_size: usize,

    /// Learning rate
    #[arg(long = "learning-rate", default_value = "0.001")]
    pub learning_rate: f64,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

/// Analysis modes and the split scheme each one drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum Analysis {
    /// Leave-P-cell-types-out, k-means over the learned encoding
    Clustering,
    /// Single train/test split, export the encoder
    Encoding,
    /// No split, export the model fitted on the full dataset
    Retrieval,
    /// Leave-one-cell-type-out, export the model per fold
    RetrievalLof,
    /// Stratified 10-fold classification evaluation
    EvaluateSkf,
    /// Repeated stratified 10-fold classification evaluation
    EvaluateRskf,
}

impl Analysis {
    /// Mode name used in report paths
    pub fn as_str(&self) -> &'static str {
        match self {
            Analysis::Clustering => "clustering",
            Analysis::Encoding => "encoding",
            Analysis::Retrieval => "retrieval",
            Analysis::RetrievalLof => "retrieval_lof",
            Analysis::EvaluateSkf => "evaluate_skf",
            Analysis::EvaluateRskf => "evaluate_rskf",
        }
    }
}

/// Parse CLI arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Setup logging based on verbosity
pub fn setup_logging(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

pub mod architecture;
pub mod checkpoint;
pub mod masked_linear;

use burn::config::Config;
use burn::tensor::activation::{relu, sigmoid};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Model configuration
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// Number of output classes (distinct cell types)
    pub n_classes: usize,

    /// Insert a second dense hidden layer before the output
    #[config(default = "false")]
    pub second_hidden_layer: bool,

    /// Width of the second hidden layer
    #[config(default = "100")]
    pub second_hidden_units: usize,
}

/// Hidden-layer activation selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum Activation {
    Relu,
    Tanh,
    Sigmoid,
}

impl Activation {
    /// Apply the activation to a batch of hidden values
    pub fn apply<B: Backend>(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        match self {
            Activation::Relu => relu(x),
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => sigmoid(x),
        }
    }

    /// Name used in exported file names and metadata
    pub fn as_str(&self) -> &'static str {
        match self {
            Activation::Relu => "relu",
            Activation::Tanh => "tanh",
            Activation::Sigmoid => "sigmoid",
        }
    }

    /// Stable code stored inside the module
    pub fn code(&self) -> u8 {
        match self {
            Activation::Relu => 0,
            Activation::Tanh => 1,
            Activation::Sigmoid => 2,
        }
    }

    /// Activation from a stored code
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Activation::Tanh,
            2 => Activation::Sigmoid,
            _ => Activation::Relu,
        }
    }
}

use crate::data::knowledge::HiddenLayerMask;
use crate::model::masked_linear::MaskedLinear;
use crate::model::{Activation, ModelConfig};
use burn::module::Module;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::activation::softmax;
use burn::tensor::backend::Backend;
use burn::tensor::{Data, Int, Shape, Tensor};

/// Biologically-informed classifier.
///
/// The first hidden layer is a [`MaskedLinear`] wired from the knowledge/dense
/// connectivity table; an optional second dense layer sits between it and the
/// softmax output head. Everything up to the output head is the encoding
/// sub-network.
#[derive(Module, Debug)]
pub struct PbkNetwork<B: Backend> {
    hidden: MaskedLinear<B>,
    hidden2: Option<Linear<B>>,
    output: Linear<B>,
    activation: u8,
}

/// Prediction output
#[derive(Debug, Clone)]
pub struct PredictionOutput<B: Backend> {
    /// Class probabilities `[batch, n_classes]`
    pub probabilities: Tensor<B, 2>,
    /// Predicted class indices `[batch]`
    pub predictions: Tensor<B, 1, Int>,
}

/// Training output
#[derive(Debug)]
pub struct ClassificationOutput<B: Backend> {
    pub loss: Tensor<B, 1>,
    pub logits: Tensor<B, 2>,
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> PbkNetwork<B> {
    /// Forward pass producing class logits
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        self.output.forward(self.encode(input))
    }

    /// Encoding sub-network: the input of the output layer
    pub fn encode(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let activation = Activation::from_code(self.activation);

        let x = activation.apply(self.hidden.forward(input));
        match &self.hidden2 {
            Some(hidden2) => activation.apply(hidden2.forward(x)),
            None => x,
        }
    }

    /// Forward pass with cross-entropy loss for training
    pub fn forward_classification(
        &self,
        input: Tensor<B, 2>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let logits = self.forward(input);

        let loss = CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits.clone(), targets.clone());

        ClassificationOutput {
            loss,
            logits,
            targets,
        }
    }

    /// Predict class probabilities and labels
    pub fn predict(&self, input: Tensor<B, 2>) -> PredictionOutput<B> {
        let logits = self.forward(input);
        let probabilities = softmax(logits, 1);
        let predictions = probabilities.clone().argmax(1).squeeze(1);

        PredictionOutput {
            probabilities,
            predictions,
        }
    }

    /// Width of the encoding produced by [`encode`](Self::encode)
    pub fn encoding_size(&self) -> usize {
        match &self.hidden2 {
            Some(_) => self.output_input_size(),
            None => self.hidden.output_size(),
        }
    }

    fn output_input_size(&self) -> usize {
        // Linear weight is [d_input, d_output]
        self.output.weight.val().dims()[0]
    }
}

/// Initialize the network from its configuration and connectivity table
pub fn init_model<B: Backend>(
    config: &ModelConfig,
    mask: &HiddenLayerMask,
    activation: Activation,
    seed: u64,
    device: &B::Device,
) -> PbkNetwork<B> {
    let n_units = mask.units.len();
    let hidden = MaskedLinear::init(&mask.weights, seed, device);

    let hidden2 = config.second_hidden_layer.then(|| {
        LinearConfig::new(n_units, config.second_hidden_units)
            .with_bias(true)
            .init(device)
    });

    let output_input = if config.second_hidden_layer {
        config.second_hidden_units
    } else {
        n_units
    };
    let output = LinearConfig::new(output_input, config.n_classes)
        .with_bias(true)
        .init(device);

    PbkNetwork {
        hidden,
        hidden2,
        output,
        activation: activation.code(),
    }
}

/// Build a feature tensor from a row-major buffer
pub fn create_feature_tensor<B: Backend>(
    values: &[f32],
    n_features: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    let batch_size = values.len() / n_features;
    Tensor::<B, 1>::from_floats(values, device).reshape([batch_size, n_features])
}

/// Build a class-index tensor from encoded targets
pub fn create_target_tensor<B: Backend>(targets: &[i64], device: &B::Device) -> Tensor<B, 1, Int> {
    let data = Data::new(targets.to_vec(), Shape::new([targets.len()]));
    Tensor::from_data(data.convert(), device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DefaultBackend;
    use ndarray::Array2;

    type TestBackend = DefaultBackend;

    fn test_mask(n_genes: usize, n_units: usize) -> HiddenLayerMask {
        HiddenLayerMask {
            genes: (0..n_genes).map(|i| format!("g{}", i)).collect(),
            units: (0..n_units).map(|i| format!("dense_{}", i + 1)).collect(),
            weights: Array2::ones((n_genes, n_units)),
        }
    }

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let mask = test_mask(6, 4);
        let config = ModelConfig::new(3);
        let model = init_model::<TestBackend>(&config, &mask, Activation::Relu, 91, &device);

        let input = Tensor::<TestBackend, 2>::zeros([5, 6], &device);
        assert_eq!(model.forward(input).dims(), [5, 3]);
    }

    #[test]
    fn test_encode_shape_without_second_layer() {
        let device = Default::default();
        let mask = test_mask(6, 4);
        let config = ModelConfig::new(3);
        let model = init_model::<TestBackend>(&config, &mask, Activation::Relu, 91, &device);

        let input = Tensor::<TestBackend, 2>::zeros([2, 6], &device);
        assert_eq!(model.encode(input).dims(), [2, 4]);
        assert_eq!(model.encoding_size(), 4);
    }

    #[test]
    fn test_encode_shape_with_second_layer() {
        let device = Default::default();
        let mask = test_mask(6, 4);
        let config = ModelConfig::new(3)
            .with_second_hidden_layer(true)
            .with_second_hidden_units(8);
        let model = init_model::<TestBackend>(&config, &mask, Activation::Tanh, 91, &device);

        let input = Tensor::<TestBackend, 2>::zeros([2, 6], &device);
        assert_eq!(model.encode(input).dims(), [2, 8]);
        assert_eq!(model.encoding_size(), 8);
    }

    #[test]
    fn test_predict_probabilities_sum_to_one() {
        let device = Default::default();
        let mask = test_mask(4, 3);
        let config = ModelConfig::new(2);
        let model = init_model::<TestBackend>(&config, &mask, Activation::Relu, 91, &device);

        let input = create_feature_tensor::<TestBackend>(&[0.1, 0.2, 0.3, 0.4], 4, &device);
        let output = model.predict(input);

        assert_eq!(output.probabilities.dims(), [1, 2]);
        assert_eq!(output.predictions.dims(), [1]);

        let probs: Vec<f32> = output.probabilities.into_data().convert::<f32>().value;
        let total: f32 = probs.iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_forward_classification_loss_is_finite() {
        let device = Default::default();
        let mask = test_mask(4, 3);
        let config = ModelConfig::new(2);
        let model = init_model::<TestBackend>(&config, &mask, Activation::Relu, 91, &device);

        let input = create_feature_tensor::<TestBackend>(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8], 4, &device);
        let targets = create_target_tensor::<TestBackend>(&[0, 1], &device);

        let output = model.forward_classification(input, targets);
        let loss: f32 = output.loss.into_scalar();
        assert!(loss.is_finite());
        assert!(loss > 0.0);
    }
}

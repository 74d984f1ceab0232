use burn::module::{Module, Param};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use ndarray::Array2;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Linear layer whose weights are gated by a fixed connectivity mask.
///
/// The mask has one row per input gene and one column per hidden unit;
/// the effective weight is `weight * mask`, applied on every forward pass so
/// connections outside the mask stay dead throughout training.
#[derive(Module, Debug)]
pub struct MaskedLinear<B: Backend> {
    /// Trainable weights `[d_input, d_output]`
    weight: Param<Tensor<B, 2>>,
    /// Trainable bias `[d_output]`
    bias: Param<Tensor<B, 1>>,
    /// Fixed connectivity mask `[d_input, d_output]`, excluded from gradients
    mask: Param<Tensor<B, 2>>,
    input_size: usize,
    output_size: usize,
}

impl<B: Backend> MaskedLinear<B> {
    /// Initialize from a connectivity table with Glorot-uniform weights.
    pub fn init(mask: &Array2<f32>, seed: u64, device: &B::Device) -> Self {
        let (d_input, d_output) = mask.dim();

        let limit = (6.0 / (d_input + d_output) as f64).sqrt() as f32;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let weight_data: Vec<f32> = (0..d_input * d_output)
            .map(|_| rng.gen_range(-limit..limit))
            .collect();

        let weight: Tensor<B, 2> = Tensor::<B, 1>::from_floats(weight_data.as_slice(), device)
            .reshape([d_input, d_output]);

        let mask_data: Vec<f32> = mask.iter().copied().collect();
        let mask_tensor: Tensor<B, 2> = Tensor::<B, 1>::from_floats(mask_data.as_slice(), device)
            .reshape([d_input, d_output])
            .set_require_grad(false);

        Self {
            weight: Param::from_tensor(weight),
            bias: Param::from_tensor(Tensor::zeros([d_output], device)),
            mask: Param::from_tensor(mask_tensor),
            input_size: d_input,
            output_size: d_output,
        }
    }

    /// Forward pass: `input.matmul(weight * mask) + bias`
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let gated = self.weight.val().mul(self.mask.val());
        input.matmul(gated).add(self.bias.val().unsqueeze())
    }

    /// Number of input genes
    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// Number of hidden units
    pub fn output_size(&self) -> usize {
        self.output_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DefaultBackend;
    use ndarray::array;

    type TestBackend = DefaultBackend;

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let mask = Array2::<f32>::ones((4, 3));
        let layer = MaskedLinear::<TestBackend>::init(&mask, 91, &device);

        assert_eq!(layer.input_size(), 4);
        assert_eq!(layer.output_size(), 3);

        let input = Tensor::<TestBackend, 2>::zeros([2, 4], &device);
        let output = layer.forward(input);
        assert_eq!(output.dims(), [2, 3]);
    }

    #[test]
    fn test_masked_connection_is_dead() {
        let device = Default::default();
        // unit 0 only sees gene 0, unit 1 only sees gene 1
        let mask = array![[1.0, 0.0], [0.0, 1.0]];
        let layer = MaskedLinear::<TestBackend>::init(&mask, 91, &device);

        let a = Tensor::<TestBackend, 2>::from_floats([[1.0, 5.0]], &device);
        let b = Tensor::<TestBackend, 2>::from_floats([[1.0, -3.0]], &device);

        let out_a: Vec<f32> = layer.forward(a).into_data().convert::<f32>().value;
        let out_b: Vec<f32> = layer.forward(b).into_data().convert::<f32>().value;

        // changing gene 1 must not move unit 0
        assert!((out_a[0] - out_b[0]).abs() < 1e-6);
        assert!((out_a[1] - out_b[1]).abs() > 1e-6);
    }

    #[test]
    fn test_init_is_deterministic() {
        let device = Default::default();
        let mask = Array2::<f32>::ones((3, 2));
        let input = Tensor::<TestBackend, 2>::from_floats([[0.3, -0.2, 1.0]], &device);

        let a = MaskedLinear::<TestBackend>::init(&mask, 91, &device);
        let b = MaskedLinear::<TestBackend>::init(&mask, 91, &device);
        let c = MaskedLinear::<TestBackend>::init(&mask, 92, &device);

        let out_a: Vec<f32> = a.forward(input.clone()).into_data().convert::<f32>().value;
        let out_b: Vec<f32> = b.forward(input.clone()).into_data().convert::<f32>().value;
        let out_c: Vec<f32> = c.forward(input).into_data().convert::<f32>().value;

        assert_eq!(out_a, out_b);
        assert_ne!(out_a, out_c);
    }
}

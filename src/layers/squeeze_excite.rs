//! Squeeze-and-excitation channel gating.

use burn::{
    module::Module,
    nn::conv::{Conv2d, Conv2dConfig},
    tensor::{Tensor, backend::Backend},
};

use crate::layers::Activation;

/// Configuration for a [`SqueezeExcite`] block.
#[derive(Debug, Clone)]
pub struct SqueezeExciteConfig {
    pub channels: usize,
    pub squeeze_channels: usize,
    /// Activation between the two 1x1 convs.
    pub activation: Activation,
    /// Activation producing the channel gate.
    pub gate: Activation,
}

impl SqueezeExciteConfig {
    pub fn new(channels: usize, squeeze_channels: usize) -> Self {
        Self {
            channels,
            squeeze_channels,
            activation: Activation::Relu,
            gate: Activation::Sigmoid,
        }
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_gate(mut self, gate: Activation) -> Self {
        self.gate = gate;
        self
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> SqueezeExcite<B> {
        let squeeze = self.squeeze_channels.max(1);
        SqueezeExcite {
            reduce: Conv2dConfig::new([self.channels, squeeze], [1, 1]).init(device),
            expand: Conv2dConfig::new([squeeze, self.channels], [1, 1]).init(device),
            activation_id: self.activation.to_id(),
            gate_id: self.gate.to_id(),
        }
    }
}

/// Rescales each channel by a gate computed from its global average.
#[derive(Module, Debug)]
pub struct SqueezeExcite<B: Backend> {
    reduce: Conv2d<B>,
    expand: Conv2d<B>,
    activation_id: u8,
    gate_id: u8,
}

impl<B: Backend> SqueezeExcite<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let squeezed = global_avg_pool(input.clone());
        let s = Activation::from_id(self.activation_id).apply(self.reduce.forward(squeezed));
        let gate = Activation::from_id(self.gate_id).apply(self.expand.forward(s));
        input * gate
    }
}

/// Averages over the spatial dims, keeping them as size 1: `[N, C, 1, 1]`.
pub fn global_avg_pool<B: Backend>(input: Tensor<B, 4>) -> Tensor<B, 4> {
    input.mean_dim(3).mean_dim(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_global_avg_pool() {
        let device = <TestBackend as Backend>::Device::default();
        let input = Tensor::<TestBackend, 1>::from_floats([1.0, 2.0, 3.0, 4.0, 10.0, 10.0, 10.0, 10.0], &device)
            .reshape([1, 2, 2, 2]);

        let pooled = global_avg_pool(input);
        assert_eq!(pooled.dims(), [1, 2, 1, 1]);
        let values: Vec<f32> = pooled.to_data().to_vec().unwrap();
        assert!((values[0] - 2.5).abs() < 1e-6);
        assert!((values[1] - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_squeeze_excite_preserves_shape() {
        let device = <TestBackend as Backend>::Device::default();
        let se: SqueezeExcite<TestBackend> = SqueezeExciteConfig::new(8, 2)
            .with_gate(Activation::HardSigmoid)
            .init(&device);

        let output = se.forward(Tensor::ones([2, 8, 5, 5], &device));
        assert_eq!(output.dims(), [2, 8, 5, 5]);
    }

    #[test]
    fn test_squeeze_excite_gate_bounds_output() {
        let device = <TestBackend as Backend>::Device::default();
        let se: SqueezeExcite<TestBackend> = SqueezeExciteConfig::new(4, 1).init(&device);

        // A sigmoid gate lies in (0, 1), so ones can only shrink.
        let output: Vec<f32> = se
            .forward(Tensor::ones([1, 4, 3, 3], &device))
            .to_data()
            .to_vec()
            .unwrap();
        assert!(output.iter().all(|&v| v > 0.0 && v < 1.0));
    }
}

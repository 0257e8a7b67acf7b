//! Convolution followed by batch normalization.

use burn::{
    module::Module,
    nn::{
        BatchNorm, BatchNormConfig, PaddingConfig2d,
        conv::{Conv2d, Conv2dConfig},
    },
    tensor::{Tensor, backend::Backend},
};

use crate::config::BnConfig;
use crate::layers::Activation;

/// Configuration for a [`ConvBn`] block.
#[derive(Debug, Clone)]
pub struct ConvBnConfig {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub groups: usize,
    pub activation: Activation,
    pub bn_eps: f64,
    pub bn_momentum: f64,
}

impl ConvBnConfig {
    /// Creates a stride-1, ungrouped conv without activation.
    pub fn new(in_channels: usize, out_channels: usize, kernel_size: usize) -> Self {
        let bn = BnConfig::default();
        Self {
            in_channels,
            out_channels,
            kernel_size,
            stride: 1,
            groups: 1,
            activation: Activation::None,
            bn_eps: bn.eps,
            bn_momentum: bn.mom,
        }
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_groups(mut self, groups: usize) -> Self {
        self.groups = groups;
        self
    }

    /// Makes the conv depthwise (one group per input channel).
    pub fn depthwise(mut self) -> Self {
        self.groups = self.in_channels;
        self
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// Uses the batch-norm options of the model configuration.
    pub fn with_bn(mut self, bn: &BnConfig) -> Self {
        self.bn_eps = bn.eps;
        self.bn_momentum = bn.mom;
        self
    }

    /// Initializes the block with the given device.
    ///
    /// Padding is `(kernel_size - 1) / 2`, which keeps the spatial size for
    /// odd kernels at stride 1.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvBn<B> {
        let padding = (self.kernel_size - 1) / 2;
        let conv = Conv2dConfig::new(
            [self.in_channels, self.out_channels],
            [self.kernel_size, self.kernel_size],
        )
        .with_stride([self.stride, self.stride])
        .with_padding(PaddingConfig2d::Explicit(padding, padding))
        .with_groups(self.groups)
        .with_bias(false)
        .init(device);
        let bn = BatchNormConfig::new(self.out_channels)
            .with_epsilon(self.bn_eps)
            .with_momentum(self.bn_momentum)
            .init(device);

        ConvBn {
            conv,
            bn,
            out_channels: self.out_channels,
            activation_id: self.activation.to_id(),
        }
    }
}

/// `activation(bn(conv(x)))` over NCHW tensors.
#[derive(Module, Debug)]
pub struct ConvBn<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
    out_channels: usize,
    activation_id: u8,
}

impl<B: Backend> ConvBn<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.bn.forward(self.conv.forward(input));
        Activation::from_id(self.activation_id).apply(x)
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_conv_bn_keeps_spatial_size() {
        let device = <TestBackend as Backend>::Device::default();
        let block: ConvBn<TestBackend> = ConvBnConfig::new(3, 8, 3)
            .with_activation(Activation::Relu)
            .init(&device);

        let output = block.forward(Tensor::zeros([2, 3, 9, 9], &device));
        assert_eq!(output.dims(), [2, 8, 9, 9]);
        assert_eq!(block.out_channels(), 8);
    }

    #[test]
    fn test_conv_bn_stride_halves_spatial_size() {
        let device = <TestBackend as Backend>::Device::default();
        let block: ConvBn<TestBackend> = ConvBnConfig::new(4, 4, 5)
            .with_stride(2)
            .depthwise()
            .init(&device);

        let output = block.forward(Tensor::zeros([1, 4, 8, 8], &device));
        assert_eq!(output.dims(), [1, 4, 4, 4]);
        // Depthwise 5x5 holds 25 weights per channel, far fewer than a dense conv.
        let dense: ConvBn<TestBackend> = ConvBnConfig::new(4, 4, 5).init(&device);
        assert!(block.num_params() < dense.num_params());
        assert!(block.num_params() >= 4 * 25);
    }
}

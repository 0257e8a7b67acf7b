//! Network stems.

use burn::{
    module::Module,
    nn::{
        PaddingConfig2d,
        pool::{MaxPool2d, MaxPool2dConfig},
    },
    tensor::{Tensor, backend::Backend},
};

use crate::config::{BnConfig, StemType};
use crate::layers::{Activation, ConvBn, ConvBnConfig};

/// Number of channels of the input images.
pub const IMAGE_CHANNELS: usize = 3;

/// Configuration for a [`Stem`]: one conv block, optionally followed by a
/// 3x3 stride-2 max-pool.
#[derive(Debug, Clone)]
pub struct StemConfig {
    pub conv: ConvBnConfig,
    pub max_pool: bool,
}

impl StemConfig {
    pub fn new(out_channels: usize, kernel_size: usize, stride: usize) -> Self {
        Self {
            conv: ConvBnConfig::new(IMAGE_CHANNELS, out_channels, kernel_size).with_stride(stride),
            max_pool: false,
        }
    }

    /// The stem variants selectable from the configuration.
    pub fn from_type(stem_type: StemType, out_channels: usize) -> Self {
        match stem_type {
            StemType::ResStemCifar => Self::new(out_channels, 3, 1),
            StemType::ResStemIn => Self::new(out_channels, 7, 2).with_max_pool(),
            StemType::SimpleStemIn => Self::new(out_channels, 3, 2),
        }
    }

    pub fn with_max_pool(mut self) -> Self {
        self.max_pool = true;
        self
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.conv = self.conv.with_activation(activation);
        self
    }

    pub fn with_bn(mut self, bn: &BnConfig) -> Self {
        self.conv = self.conv.with_bn(bn);
        self
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Stem<B> {
        let pool = self.max_pool.then(|| {
            MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init()
        });
        Stem {
            conv: self.conv.init(device),
            pool,
        }
    }
}

#[derive(Module, Debug)]
pub struct Stem<B: Backend> {
    conv: ConvBn<B>,
    pool: Option<MaxPool2d>,
}

impl<B: Backend> Stem<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(input);
        match &self.pool {
            Some(pool) => pool.forward(x),
            None => x,
        }
    }

    pub fn out_channels(&self) -> usize {
        self.conv.out_channels()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn output_dims(stem_type: StemType) -> [usize; 4] {
        let device = <TestBackend as Backend>::Device::default();
        let stem: Stem<TestBackend> = StemConfig::from_type(stem_type, 8)
            .with_activation(Activation::Relu)
            .init(&device);
        stem.forward(Tensor::zeros([1, IMAGE_CHANNELS, 32, 32], &device))
            .dims()
    }

    #[test]
    fn test_stem_downsampling() {
        assert_eq!(output_dims(StemType::ResStemCifar), [1, 8, 32, 32]);
        assert_eq!(output_dims(StemType::SimpleStemIn), [1, 8, 16, 16]);
        assert_eq!(output_dims(StemType::ResStemIn), [1, 8, 8, 8]);
    }
}

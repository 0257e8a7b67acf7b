//! Classification head shared by all architectures.

use burn::{
    module::Module,
    nn::{Dropout, DropoutConfig},
    tensor::{Tensor, backend::Backend},
};

use crate::config::BnConfig;
use crate::layers::squeeze_excite::global_avg_pool;
use crate::layers::{Activation, ConvBn, ConvBnConfig, Dense, DenseConfig};

/// Configuration for a [`ClassifierHead`].
///
/// The head is `[conv1x1] -> global pool -> [dense] -> [dropout] -> linear`,
/// where the bracketed stages are optional.
#[derive(Debug, Clone)]
pub struct ClassifierHeadConfig {
    pub in_channels: usize,
    pub num_classes: usize,
    /// Output width of the 1x1 conv before pooling; 0 disables it.
    pub conv_w: usize,
    pub conv_activation: Activation,
    /// Width of a hidden dense layer after pooling; 0 disables it.
    pub hidden_w: usize,
    pub hidden_activation: Activation,
    pub dropout: f64,
    pub bn: BnConfig,
}

impl ClassifierHeadConfig {
    pub fn new(in_channels: usize, num_classes: usize) -> Self {
        Self {
            in_channels,
            num_classes,
            conv_w: 0,
            conv_activation: Activation::Relu,
            hidden_w: 0,
            hidden_activation: Activation::None,
            dropout: 0.0,
            bn: BnConfig::default(),
        }
    }

    pub fn with_conv(mut self, width: usize, activation: Activation) -> Self {
        self.conv_w = width;
        self.conv_activation = activation;
        self
    }

    pub fn with_hidden(mut self, width: usize, activation: Activation) -> Self {
        self.hidden_w = width;
        self.hidden_activation = activation;
        self
    }

    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    pub fn with_bn(mut self, bn: &BnConfig) -> Self {
        self.bn = bn.clone();
        self
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ClassifierHead<B> {
        let mut width = self.in_channels;

        let conv = (self.conv_w > 0).then(|| {
            let conv = ConvBnConfig::new(width, self.conv_w, 1)
                .with_activation(self.conv_activation)
                .with_bn(&self.bn)
                .init(device);
            width = self.conv_w;
            conv
        });

        let hidden = (self.hidden_w > 0).then(|| {
            let hidden = DenseConfig::new(width, self.hidden_w)
                .with_activation(self.hidden_activation)
                .init(device);
            width = self.hidden_w;
            hidden
        });

        let dropout = (self.dropout > 0.0).then(|| DropoutConfig::new(self.dropout).init());

        ClassifierHead {
            conv,
            hidden,
            dropout,
            fc: DenseConfig::new(width, self.num_classes).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct ClassifierHead<B: Backend> {
    conv: Option<ConvBn<B>>,
    hidden: Option<Dense<B>>,
    dropout: Option<Dropout>,
    fc: Dense<B>,
}

impl<B: Backend> ClassifierHead<B> {
    /// Maps NCHW features to `[N, num_classes]` logits.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = match &self.conv {
            Some(conv) => conv.forward(input),
            None => input,
        };
        let [batch, channels, _, _] = x.dims();
        let mut x = global_avg_pool(x).reshape([batch, channels]);
        if let Some(hidden) = &self.hidden {
            x = hidden.forward(x);
        }
        if let Some(dropout) = &self.dropout {
            x = dropout.forward(x);
        }
        self.fc.forward(x)
    }

    pub fn num_classes(&self) -> usize {
        self.fc.output_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_plain_head() {
        let device = <TestBackend as Backend>::Device::default();
        let head: ClassifierHead<TestBackend> = ClassifierHeadConfig::new(8, 3).init(&device);

        let logits = head.forward(Tensor::ones([2, 8, 4, 4], &device));
        assert_eq!(logits.dims(), [2, 3]);
        assert_eq!(head.num_classes(), 3);
        assert_eq!(head.num_params(), 8 * 3 + 3);
    }

    #[test]
    fn test_full_head() {
        let device = <TestBackend as Backend>::Device::default();
        let head: ClassifierHead<TestBackend> = ClassifierHeadConfig::new(4, 5)
            .with_conv(16, Activation::HardSwish)
            .with_hidden(12, Activation::HardSwish)
            .with_dropout(0.2)
            .init(&device);

        let logits = head.forward(Tensor::ones([3, 4, 2, 2], &device));
        assert_eq!(logits.dims(), [3, 5]);
        assert_eq!(head.num_classes(), 5);
        // hidden 16*12 + 12 and fc 12*5 + 5 on top of the conv block
        assert!(head.num_params() > 204 + 65 + 64);
    }
}

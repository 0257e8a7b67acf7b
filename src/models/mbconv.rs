//! Inverted residual blocks (MBConv and Fused-MBConv).

use burn::{
    module::Module,
    tensor::{Tensor, backend::Backend},
};

use crate::config::BnConfig;
use crate::layers::{Activation, ConvBn, ConvBnConfig, SqueezeExcite, SqueezeExciteConfig};

/// Configuration for an [`MbConv`] block.
#[derive(Debug, Clone)]
pub struct MbConvConfig {
    pub w_in: usize,
    /// Expanded width; equal to `w_in` when there is no expansion.
    pub w_exp: usize,
    pub w_out: usize,
    pub kernel: usize,
    pub stride: usize,
    /// Squeeze width of the SE gate; 0 disables it.
    pub se_w: usize,
    pub activation: Activation,
    pub se_activation: Activation,
    pub se_gate: Activation,
    /// Replaces the 1x1 expansion and the depthwise conv with one full conv.
    pub fused: bool,
    pub bn: BnConfig,
}

impl MbConvConfig {
    pub fn new(w_in: usize, w_exp: usize, w_out: usize, kernel: usize, stride: usize) -> Self {
        Self {
            w_in,
            w_exp,
            w_out,
            kernel,
            stride,
            se_w: 0,
            activation: Activation::Silu,
            se_activation: Activation::Silu,
            se_gate: Activation::Sigmoid,
            fused: false,
            bn: BnConfig::default(),
        }
    }

    pub fn with_se(mut self, se_w: usize, activation: Activation, gate: Activation) -> Self {
        self.se_w = se_w;
        self.se_activation = activation;
        self.se_gate = gate;
        self
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_fused(mut self, fused: bool) -> Self {
        self.fused = fused;
        self
    }

    pub fn with_bn(mut self, bn: &BnConfig) -> Self {
        self.bn = bn.clone();
        self
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> MbConv<B> {
        let conv = |w_in, w_out, k| ConvBnConfig::new(w_in, w_out, k).with_bn(&self.bn);
        let expands = self.w_exp != self.w_in;

        let (expand, depthwise, project) = if self.fused && !expands {
            // A single full conv does the whole block.
            let single = conv(self.w_in, self.w_out, self.kernel)
                .with_stride(self.stride)
                .with_activation(self.activation)
                .init(device);
            (Some(single), None, None)
        } else if self.fused {
            let expand = conv(self.w_in, self.w_exp, self.kernel)
                .with_stride(self.stride)
                .with_activation(self.activation)
                .init(device);
            (Some(expand), None, Some(conv(self.w_exp, self.w_out, 1).init(device)))
        } else {
            let expand = expands.then(|| {
                conv(self.w_in, self.w_exp, 1)
                    .with_activation(self.activation)
                    .init(device)
            });
            let depthwise = conv(self.w_exp, self.w_exp, self.kernel)
                .with_stride(self.stride)
                .depthwise()
                .with_activation(self.activation)
                .init(device);
            (
                expand,
                Some(depthwise),
                Some(conv(self.w_exp, self.w_out, 1).init(device)),
            )
        };

        // Without a projection the gate sits on the block output.
        let se_channels = if project.is_some() { self.w_exp } else { self.w_out };
        let se = (self.se_w > 0).then(|| {
            SqueezeExciteConfig::new(se_channels, self.se_w)
                .with_activation(self.se_activation)
                .with_gate(self.se_gate)
                .init(device)
        });

        MbConv {
            expand,
            depthwise,
            se,
            project,
            residual: self.stride == 1 && self.w_in == self.w_out,
        }
    }
}

/// `[expand] -> [depthwise] -> [SE] -> [project]`, with an identity
/// shortcut when the block keeps its shape.
#[derive(Module, Debug)]
pub struct MbConv<B: Backend> {
    expand: Option<ConvBn<B>>,
    depthwise: Option<ConvBn<B>>,
    se: Option<SqueezeExcite<B>>,
    project: Option<ConvBn<B>>,
    residual: bool,
}

impl<B: Backend> MbConv<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = input.clone();
        if let Some(expand) = &self.expand {
            x = expand.forward(x);
        }
        if let Some(depthwise) = &self.depthwise {
            x = depthwise.forward(x);
        }
        if let Some(se) = &self.se {
            x = se.forward(x);
        }
        if let Some(project) = &self.project {
            x = project.forward(x);
        }
        if self.residual { x + input } else { x }
    }

    pub fn has_residual(&self) -> bool {
        self.residual
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_mbconv_with_expansion_and_se() {
        let device = <TestBackend as Backend>::Device::default();
        let block: MbConv<TestBackend> = MbConvConfig::new(8, 48, 8, 3, 1)
            .with_se(2, Activation::Silu, Activation::Sigmoid)
            .init(&device);

        assert!(block.has_residual());
        let output = block.forward(Tensor::ones([2, 8, 6, 6], &device));
        assert_eq!(output.dims(), [2, 8, 6, 6]);
    }

    #[test]
    fn test_mbconv_stride_drops_residual() {
        let device = <TestBackend as Backend>::Device::default();
        let block: MbConv<TestBackend> = MbConvConfig::new(8, 8, 16, 5, 2).init(&device);

        assert!(!block.has_residual());
        let output = block.forward(Tensor::ones([1, 8, 8, 8], &device));
        assert_eq!(output.dims(), [1, 16, 4, 4]);
    }

    #[test]
    fn test_fused_mbconv_shapes() {
        let device = <TestBackend as Backend>::Device::default();
        let single: MbConv<TestBackend> = MbConvConfig::new(8, 8, 8, 3, 1)
            .with_fused(true)
            .init(&device);
        let expanded: MbConv<TestBackend> = MbConvConfig::new(8, 32, 16, 3, 2)
            .with_fused(true)
            .with_se(2, Activation::Silu, Activation::Sigmoid)
            .init(&device);

        let x = Tensor::ones([1, 8, 8, 8], &device);
        assert_eq!(single.forward(x.clone()).dims(), [1, 8, 8, 8]);
        assert_eq!(expanded.forward(x).dims(), [1, 16, 4, 4]);
        assert!(expanded.num_params() > single.num_params());
    }

    #[test]
    fn test_fused_mbconv_without_expansion_keeps_se() {
        let device = <TestBackend as Backend>::Device::default();
        let plain: MbConv<TestBackend> = MbConvConfig::new(8, 8, 16, 3, 1)
            .with_fused(true)
            .init(&device);
        let gated: MbConv<TestBackend> = MbConvConfig::new(8, 8, 16, 3, 1)
            .with_fused(true)
            .with_se(4, Activation::Silu, Activation::Sigmoid)
            .init(&device);

        // Squeeze 16 -> 4 and excite 4 -> 16, with biases.
        assert_eq!(gated.num_params(), plain.num_params() + 16 * 4 + 4 + 4 * 16 + 16);
        let output = gated.forward(Tensor::ones([1, 8, 6, 6], &device));
        assert_eq!(output.dims(), [1, 16, 6, 6]);
    }
}

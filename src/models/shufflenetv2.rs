//! ShuffleNetV2.

use burn::{
    module::Module,
    tensor::{Tensor, backend::Backend},
};

use crate::config::{BnConfig, Config, ShuffleNetConfig};
use crate::errors::{BuildError, Result};
use crate::layers::{
    Activation, ClassifierHead, ClassifierHeadConfig, ConvBn, ConvBnConfig, Stem, StemConfig,
};

const STAGE_WIDTHS: [(f64, [usize; 5]); 4] = [
    (0.5, [24, 48, 96, 192, 1024]),
    (1.0, [24, 116, 232, 464, 1024]),
    (1.5, [24, 176, 352, 704, 1024]),
    (2.0, [24, 244, 488, 976, 2048]),
];

/// Returns `[stem, stage 2, stage 3, stage 4, head conv]` widths for the
/// configured width multiplier.
pub fn stage_widths(shufflenet: &ShuffleNetConfig) -> Result<[usize; 5]> {
    if shufflenet.stage_repeats.len() != 3 || shufflenet.stage_repeats.contains(&0) {
        return Err(BuildError::invalid_arch(
            "shufflenetv2",
            "STAGE_REPEATS must hold three positive block counts",
        ));
    }
    STAGE_WIDTHS
        .iter()
        .find(|(mult, _)| (mult - shufflenet.width_mult).abs() < 1e-9)
        .map(|(_, widths)| *widths)
        .ok_or_else(|| {
            BuildError::invalid_arch(
                "shufflenetv2",
                format!(
                    "unsupported WIDTH_MULT {}, expected 0.5, 1.0, 1.5 or 2.0",
                    shufflenet.width_mult
                ),
            )
        })
}

/// Interleaves the channels of `groups` equally sized groups.
pub fn channel_shuffle<B: Backend>(input: Tensor<B, 4>, groups: usize) -> Tensor<B, 4> {
    let [batch, channels, height, width] = input.dims();
    input
        .reshape([batch, groups, channels / groups, height, width])
        .swap_dims(1, 2)
        .reshape([batch, channels, height, width])
}

/// Configuration for a [`ShuffleUnit`].
#[derive(Debug, Clone)]
pub struct ShuffleUnitConfig {
    pub w_in: usize,
    pub w_out: usize,
    /// 1 splits the input channels; 2 downsamples through two branches.
    pub stride: usize,
    pub bn: BnConfig,
}

impl ShuffleUnitConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ShuffleUnit<B> {
        let conv = |w_in, w_out, k| ConvBnConfig::new(w_in, w_out, k).with_bn(&self.bn);
        let branch_w = self.w_out / 2;
        // Stride-1 units only transform half of their input.
        let branch_in = if self.stride == 1 { self.w_in / 2 } else { self.w_in };

        let shortcut = (self.stride > 1).then(|| {
            vec![
                conv(self.w_in, self.w_in, 3)
                    .with_stride(self.stride)
                    .depthwise()
                    .init(device),
                conv(self.w_in, branch_w, 1)
                    .with_activation(Activation::Relu)
                    .init(device),
            ]
        });

        let branch = vec![
            conv(branch_in, branch_w, 1)
                .with_activation(Activation::Relu)
                .init(device),
            conv(branch_w, branch_w, 3)
                .with_stride(self.stride)
                .depthwise()
                .init(device),
            conv(branch_w, branch_w, 1)
                .with_activation(Activation::Relu)
                .init(device),
        ];

        ShuffleUnit { shortcut, branch }
    }
}

/// ShuffleNetV2 unit: two branches concatenated on channels, then shuffled.
#[derive(Module, Debug)]
pub struct ShuffleUnit<B: Backend> {
    /// Downsampling left branch; `None` for stride-1 units, which pass half
    /// of the input through unchanged.
    shortcut: Option<Vec<ConvBn<B>>>,
    branch: Vec<ConvBn<B>>,
}

impl<B: Backend> ShuffleUnit<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let (left, right) = match &self.shortcut {
            Some(shortcut) => (run(shortcut, input.clone()), run(&self.branch, input)),
            None => {
                let half = input.dims()[1] / 2;
                let left = input.clone().narrow(1, 0, half);
                let right = input.narrow(1, half, half);
                (left, run(&self.branch, right))
            }
        };
        channel_shuffle(Tensor::cat(vec![left, right], 1), 2)
    }
}

fn run<B: Backend>(layers: &[ConvBn<B>], input: Tensor<B, 4>) -> Tensor<B, 4> {
    layers.iter().fold(input, |x, layer| layer.forward(x))
}

#[derive(Module, Debug)]
pub struct ShuffleNetV2<B: Backend> {
    stem: Stem<B>,
    units: Vec<ShuffleUnit<B>>,
    head: ClassifierHead<B>,
}

impl<B: Backend> ShuffleNetV2<B> {
    pub fn from_config(config: &Config, device: &B::Device) -> Result<Self> {
        let widths = stage_widths(&config.shufflenet)?;
        if config.model.num_classes == 0 {
            return Err(BuildError::invalid_arch("shufflenetv2", "NUM_CLASSES must be positive"));
        }

        let stem = StemConfig::new(widths[0], 3, 2)
            .with_max_pool()
            .with_activation(Activation::Relu)
            .with_bn(&config.bn)
            .init(device);

        let mut units = Vec::new();
        let mut w_in = widths[0];
        for (&repeats, &w_out) in config.shufflenet.stage_repeats.iter().zip(&widths[1..4]) {
            for i in 0..repeats {
                let unit = ShuffleUnitConfig {
                    w_in,
                    w_out,
                    stride: if i == 0 { 2 } else { 1 },
                    bn: config.bn.clone(),
                };
                units.push(unit.init(device));
                w_in = w_out;
            }
        }

        let head = ClassifierHeadConfig::new(w_in, config.model.num_classes)
            .with_conv(widths[4], Activation::Relu)
            .with_bn(&config.bn)
            .init(device);

        log::debug!(
            "Initialized shufflenetv2 x{} with {} units",
            config.shufflenet.width_mult,
            units.len()
        );
        Ok(Self { stem, units, head })
    }

    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self
            .units
            .iter()
            .fold(self.stem.forward(images), |x, unit| unit.forward(x));
        self.head.forward(x)
    }

    pub fn num_classes(&self) -> usize {
        self.head.num_classes()
    }

    pub fn num_units(&self) -> usize {
        self.units.len()
    }
}

super::impl_classifier!(ShuffleNetV2, "shufflenetv2");

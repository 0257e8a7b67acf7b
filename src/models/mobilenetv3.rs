//! MobileNetV3 small and large.

use burn::{
    module::Module,
    tensor::{Tensor, backend::Backend},
};

use crate::config::{Config, StemType};
use crate::errors::{BuildError, Result};
use crate::layers::{Activation, ClassifierHead, ClassifierHeadConfig, Stem, StemConfig};
use crate::models::Classifier;
use crate::models::mbconv::{MbConv, MbConvConfig};

/// `(kernel, expanded width, output width, squeeze-excite, hard-swish, stride)`.
type BlockRow = (usize, usize, usize, bool, bool, usize);

const LARGE_BLOCKS: [BlockRow; 15] = [
    (3, 16, 16, false, false, 1),
    (3, 64, 24, false, false, 2),
    (3, 72, 24, false, false, 1),
    (5, 72, 40, true, false, 2),
    (5, 120, 40, true, false, 1),
    (5, 120, 40, true, false, 1),
    (3, 240, 80, false, true, 2),
    (3, 200, 80, false, true, 1),
    (3, 184, 80, false, true, 1),
    (3, 184, 80, false, true, 1),
    (3, 480, 112, true, true, 1),
    (3, 672, 112, true, true, 1),
    (5, 672, 160, true, true, 2),
    (5, 960, 160, true, true, 1),
    (5, 960, 160, true, true, 1),
];

const SMALL_BLOCKS: [BlockRow; 11] = [
    (3, 16, 16, true, false, 2),
    (3, 72, 24, false, false, 2),
    (3, 88, 24, false, false, 1),
    (5, 96, 40, true, true, 2),
    (5, 240, 40, true, true, 1),
    (5, 240, 40, true, true, 1),
    (5, 120, 48, true, true, 1),
    (5, 144, 48, true, true, 1),
    (5, 288, 96, true, true, 2),
    (5, 576, 96, true, true, 1),
    (5, 576, 96, true, true, 1),
];

const STEM_W: usize = 16;
const DIVISOR: usize = 8;

/// Rounds `value` to a multiple of `divisor`, never going below 90% of it.
pub fn make_divisible(value: f64, divisor: usize) -> usize {
    let d = divisor as f64;
    let rounded = (((value + d / 2.0) as usize) / divisor * divisor).max(divisor);
    if (rounded as f64) < 0.9 * value {
        rounded + divisor
    } else {
        rounded
    }
}

#[derive(Module, Debug)]
pub struct MobileNetV3<B: Backend> {
    stem: Stem<B>,
    blocks: Vec<MbConv<B>>,
    head: ClassifierHead<B>,
    large: bool,
}

impl<B: Backend> MobileNetV3<B> {
    pub fn small(config: &Config, device: &B::Device) -> Result<Self> {
        Self::init(config, false, device)
    }

    pub fn large(config: &Config, device: &B::Device) -> Result<Self> {
        Self::init(config, true, device)
    }

    fn init(config: &Config, large: bool, device: &B::Device) -> Result<Self> {
        let arch = if large { "mobilenetv3_large" } else { "mobilenetv3_small" };
        let mobilenet = &config.mobilenet;
        if mobilenet.width_mult <= 0.0 {
            return Err(BuildError::invalid_arch(arch, "WIDTH_MULT must be positive"));
        }
        if !(0.0..1.0).contains(&mobilenet.dropout_ratio) {
            return Err(BuildError::invalid_arch(arch, "DROPOUT_RATIO must be in [0, 1)"));
        }
        if config.model.num_classes == 0 {
            return Err(BuildError::invalid_arch(arch, "NUM_CLASSES must be positive"));
        }

        let scale = |w: usize| make_divisible(w as f64 * mobilenet.width_mult, DIVISOR);
        let (rows, last_w, hidden_w): (&[BlockRow], usize, usize) = if large {
            (&LARGE_BLOCKS[..], 960, 1280)
        } else {
            (&SMALL_BLOCKS[..], 576, 1024)
        };

        let stem_w = scale(STEM_W);
        let stem = StemConfig::from_type(StemType::SimpleStemIn, stem_w)
            .with_activation(Activation::HardSwish)
            .with_bn(&config.bn)
            .init(device);

        let mut w_in = stem_w;
        let blocks: Vec<MbConv<B>> = rows
            .iter()
            .map(|&(kernel, exp, out, se, hard_swish, stride)| {
                let (w_exp, w_out) = (scale(exp), scale(out));
                let activation = if hard_swish {
                    Activation::HardSwish
                } else {
                    Activation::Relu
                };
                let se_w = if se {
                    make_divisible(w_exp as f64 / 4.0, DIVISOR)
                } else {
                    0
                };
                let block = MbConvConfig::new(w_in, w_exp, w_out, kernel, stride)
                    .with_activation(activation)
                    .with_se(se_w, Activation::Relu, Activation::HardSigmoid)
                    .with_bn(&config.bn)
                    .init(device);
                w_in = w_out;
                block
            })
            .collect();

        let head = ClassifierHeadConfig::new(w_in, config.model.num_classes)
            .with_conv(scale(last_w), Activation::HardSwish)
            .with_hidden(hidden_w, Activation::HardSwish)
            .with_dropout(mobilenet.dropout_ratio)
            .with_bn(&config.bn)
            .init(device);

        log::debug!("Initialized {arch} with width multiplier {}", mobilenet.width_mult);
        Ok(Self {
            stem,
            blocks,
            head,
            large,
        })
    }

    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self
            .blocks
            .iter()
            .fold(self.stem.forward(images), |x, block| block.forward(x));
        self.head.forward(x)
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }
}

impl<B: Backend> Classifier<B> for MobileNetV3<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        MobileNetV3::forward(self, images)
    }

    fn arch(&self) -> &'static str {
        if self.large {
            "mobilenetv3_large"
        } else {
            "mobilenetv3_small"
        }
    }

    fn num_params(&self) -> usize {
        Module::num_params(self)
    }

    fn num_classes(&self) -> usize {
        self.head.num_classes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn narrow_config() -> Config {
        let mut config = Config::new().num_classes(7);
        config.mobilenet.width_mult = 0.25;
        config
    }

    #[test]
    fn test_make_divisible() {
        assert_eq!(make_divisible(16.0, 8), 16);
        assert_eq!(make_divisible(54.0, 8), 56);
        assert_eq!(make_divisible(4.0, 8), 8);
        // 8 would lose more than 10% of 10.
        assert_eq!(make_divisible(10.0, 8), 16);
    }

    #[test]
    fn test_small_forward() {
        let device = <TestBackend as Backend>::Device::default();
        let model = MobileNetV3::<TestBackend>::small(&narrow_config(), &device).unwrap();

        assert_eq!(model.num_blocks(), 11);
        assert_eq!(Classifier::arch(&model), "mobilenetv3_small");
        let logits = MobileNetV3::forward(&model, Tensor::zeros([2, 3, 32, 32], &device));
        assert_eq!(logits.dims(), [2, 7]);
    }

    #[test]
    fn test_large_forward() {
        let device = <TestBackend as Backend>::Device::default();
        let model = MobileNetV3::<TestBackend>::large(&narrow_config(), &device).unwrap();

        assert_eq!(Classifier::arch(&model), "mobilenetv3_large");
        assert_eq!(model.num_blocks(), 15);
        assert_eq!(Classifier::num_classes(&model), 7);
        let logits = MobileNetV3::forward(&model, Tensor::zeros([1, 3, 32, 32], &device));
        assert_eq!(logits.dims(), [1, 7]);
    }

    #[test]
    fn test_invalid_width_mult() {
        let device = <TestBackend as Backend>::Device::default();
        let mut config = narrow_config();
        config.mobilenet.width_mult = 0.0;

        let err = MobileNetV3::<TestBackend>::small(&config, &device).unwrap_err();
        assert!(matches!(
            err,
            BuildError::InvalidArchitecture { arch: "mobilenetv3_small", .. }
        ));
    }
}

//! EfficientNet (v1) and EfficientNetV2.
//!
//! Both are a simple 3x3 stride-2 stem, a sequence of MBConv stages and a
//! head with a 1x1 conv, dropout and the classifier. They always use SiLU;
//! `MODEL.ACTIVATION_FUN` is ignored.

use burn::{
    module::Module,
    tensor::{Tensor, backend::Backend},
};

use crate::config::{BnConfig, Config, StemType};
use crate::errors::{BuildError, Result};
use crate::layers::{Activation, ClassifierHead, ClassifierHeadConfig, Stem, StemConfig};
use crate::models::mbconv::{MbConv, MbConvConfig};

/// One stage of MBConv blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct MbStage {
    pub depth: usize,
    pub width: usize,
    pub exp_ratio: f64,
    pub stride: usize,
    pub kernel: usize,
    pub se_r: f64,
    pub fused: bool,
}

/// Resolved layout shared by both EfficientNet generations.
#[derive(Debug, Clone)]
struct MbNetLayout {
    stem_w: usize,
    stages: Vec<MbStage>,
    head_w: usize,
    dropout: f64,
    bn: BnConfig,
    num_classes: usize,
}

impl MbNetLayout {
    fn init<B: Backend>(&self, arch: &'static str, device: &B::Device) -> Result<MbNet<B>> {
        if self.num_classes == 0 {
            return Err(BuildError::invalid_arch(arch, "NUM_CLASSES must be positive"));
        }
        if let Some(i) = self
            .stages
            .iter()
            .position(|s| s.width == 0 || s.stride == 0 || s.exp_ratio < 1.0)
        {
            return Err(BuildError::invalid_arch(
                arch,
                format!("stage {i} needs positive width and stride and an expansion ratio >= 1"),
            ));
        }

        let act = Activation::Silu;
        let stem = StemConfig::from_type(StemType::SimpleStemIn, self.stem_w)
            .with_activation(act)
            .with_bn(&self.bn)
            .init(device);

        let mut blocks = Vec::new();
        let mut w_in = self.stem_w;
        for stage in &self.stages {
            for i in 0..stage.depth {
                let stride = if i == 0 { stage.stride } else { 1 };
                let w_exp = (w_in as f64 * stage.exp_ratio) as usize;
                let se_w = (w_in as f64 * stage.se_r) as usize;
                let block = MbConvConfig::new(w_in, w_exp, stage.width, stage.kernel, stride)
                    .with_activation(act)
                    .with_se(se_w, act, Activation::Sigmoid)
                    .with_fused(stage.fused)
                    .with_bn(&self.bn);
                blocks.push(block.init(device));
                w_in = stage.width;
            }
        }

        let head = ClassifierHeadConfig::new(w_in, self.num_classes)
            .with_conv(self.head_w, act)
            .with_dropout(self.dropout)
            .with_bn(&self.bn)
            .init(device);

        log::debug!("Initialized {arch} with {} MBConv blocks", blocks.len());
        Ok(MbNet { stem, blocks, head })
    }
}

/// Stem, MBConv blocks and head.
#[derive(Module, Debug)]
pub struct MbNet<B: Backend> {
    stem: Stem<B>,
    blocks: Vec<MbConv<B>>,
    head: ClassifierHead<B>,
}

impl<B: Backend> MbNet<B> {
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self
            .blocks
            .iter()
            .fold(self.stem.forward(images), |x, block| block.forward(x));
        self.head.forward(x)
    }
}

/// Stages of the `EN` section.
pub fn effnet_v1_stages(config: &Config) -> Result<Vec<MbStage>> {
    let en = &config.en;
    en.check()?;
    Ok((0..en.depths.len())
        .map(|i| MbStage {
            depth: en.depths[i],
            width: en.widths[i],
            exp_ratio: en.exp_ratios[i],
            stride: en.strides[i],
            kernel: en.kernels[i],
            se_r: en.se_r,
            fused: false,
        })
        .collect())
}

/// Stages of the `EN2` section.
pub fn effnet_v2_stages(config: &Config) -> Result<Vec<MbStage>> {
    let en2 = &config.en2;
    en2.check()?;
    Ok((0..en2.depths.len())
        .map(|i| MbStage {
            depth: en2.depths[i],
            width: en2.widths[i],
            exp_ratio: en2.exp_ratios[i],
            stride: en2.strides[i],
            kernel: en2.kernels[i],
            se_r: en2.se_rs[i],
            fused: en2.fused[i],
        })
        .collect())
}

#[derive(Module, Debug)]
pub struct EffNetV1<B: Backend> {
    net: MbNet<B>,
}

impl<B: Backend> EffNetV1<B> {
    pub fn from_config(config: &Config, device: &B::Device) -> Result<Self> {
        let layout = MbNetLayout {
            stem_w: config.en.stem_w,
            stages: effnet_v1_stages(config)?,
            head_w: config.en.head_w,
            dropout: config.en.dropout_ratio,
            bn: config.bn.clone(),
            num_classes: config.model.num_classes,
        };
        Ok(Self {
            net: layout.init("effnet_v1", device)?,
        })
    }

    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.net.forward(images)
    }

    pub fn num_classes(&self) -> usize {
        self.net.head.num_classes()
    }

    pub fn num_blocks(&self) -> usize {
        self.net.blocks.len()
    }
}

super::impl_classifier!(EffNetV1, "effnet_v1");

#[derive(Module, Debug)]
pub struct EffNetV2<B: Backend> {
    net: MbNet<B>,
}

impl<B: Backend> EffNetV2<B> {
    pub fn from_config(config: &Config, device: &B::Device) -> Result<Self> {
        let layout = MbNetLayout {
            stem_w: config.en2.stem_w,
            stages: effnet_v2_stages(config)?,
            head_w: config.en2.head_w,
            dropout: config.en2.dropout_ratio,
            bn: config.bn.clone(),
            num_classes: config.model.num_classes,
        };
        Ok(Self {
            net: layout.init("effnet_v2", device)?,
        })
    }

    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.net.forward(images)
    }

    pub fn num_classes(&self) -> usize {
        self.net.head.num_classes()
    }

    pub fn num_blocks(&self) -> usize {
        self.net.blocks.len()
    }
}

super::impl_classifier!(EffNetV2, "effnet_v2");

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn tiny_v1() -> Config {
        let mut config = Config::new().model_type("effnet_v1").num_classes(6);
        config.en.stem_w = 8;
        config.en.depths = vec![1, 2];
        config.en.widths = vec![8, 16];
        config.en.exp_ratios = vec![1.0, 4.0];
        config.en.strides = vec![1, 2];
        config.en.kernels = vec![3, 5];
        config.en.head_w = 32;
        config
    }

    #[test]
    fn test_default_b0_layout() {
        let stages = effnet_v1_stages(&Config::new()).unwrap();
        assert_eq!(stages.len(), 7);
        assert_eq!(stages.iter().map(|s| s.depth).sum::<usize>(), 16);
        assert!(stages.iter().all(|s| !s.fused && s.se_r == 0.25));
    }

    #[test]
    fn test_default_v2_s_layout() {
        let stages = effnet_v2_stages(&Config::new()).unwrap();
        assert_eq!(stages.iter().filter(|s| s.fused).count(), 3);
        assert_eq!(stages[5].width, 256);
        assert_eq!(stages.iter().map(|s| s.depth).sum::<usize>(), 40);
    }

    #[test]
    fn test_effnet_v1_forward() {
        let device = <TestBackend as Backend>::Device::default();
        let model = EffNetV1::<TestBackend>::from_config(&tiny_v1(), &device).unwrap();

        assert_eq!(model.num_blocks(), 3);
        let logits = model.forward(Tensor::zeros([2, 3, 16, 16], &device));
        assert_eq!(logits.dims(), [2, 6]);
    }

    #[test]
    fn test_effnet_v2_forward() {
        let device = <TestBackend as Backend>::Device::default();
        let mut config = Config::new().model_type("effnet_v2").num_classes(3);
        config.en2.stem_w = 8;
        config.en2.depths = vec![1, 1, 1];
        config.en2.widths = vec![8, 16, 24];
        config.en2.exp_ratios = vec![1.0, 4.0, 4.0];
        config.en2.strides = vec![1, 2, 2];
        config.en2.kernels = vec![3, 3, 3];
        config.en2.fused = vec![true, true, false];
        config.en2.se_rs = vec![0.0, 0.0, 0.25];
        config.en2.head_w = 32;

        let model = EffNetV2::<TestBackend>::from_config(&config, &device).unwrap();
        let logits = model.forward(Tensor::zeros([1, 3, 32, 32], &device));
        assert_eq!(logits.dims(), [1, 3]);
    }

    #[test]
    fn test_effnet_v2_fused_stage_without_expansion_applies_se() {
        let device = <TestBackend as Backend>::Device::default();
        let mut config = Config::new().model_type("effnet_v2").num_classes(3);
        config.en2.stem_w = 8;
        config.en2.depths = vec![1];
        config.en2.widths = vec![16];
        config.en2.exp_ratios = vec![1.0];
        config.en2.strides = vec![1];
        config.en2.kernels = vec![3];
        config.en2.fused = vec![true];
        config.en2.se_rs = vec![0.0];
        config.en2.head_w = 16;
        let plain = EffNetV2::<TestBackend>::from_config(&config, &device).unwrap();

        config.en2.se_rs = vec![0.5];
        let gated = EffNetV2::<TestBackend>::from_config(&config, &device).unwrap();

        // se_w = 8 * 0.5, gating the 16 output channels.
        assert_eq!(gated.num_params(), plain.num_params() + 16 * 4 + 4 + 4 * 16 + 16);
        let logits = gated.forward(Tensor::zeros([1, 3, 16, 16], &device));
        assert_eq!(logits.dims(), [1, 3]);
    }

    #[test]
    fn test_mismatched_stage_lists_are_rejected() {
        let device = <TestBackend as Backend>::Device::default();
        let mut config = tiny_v1();
        config.en.kernels = vec![3];

        let err = EffNetV1::<TestBackend>::from_config(&config, &device).unwrap_err();
        assert!(matches!(err, BuildError::InvalidArchitecture { arch: "effnet_v1", .. }));
    }
}

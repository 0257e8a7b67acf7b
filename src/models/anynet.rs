//! AnyNet: a stem, a sequence of stages of residual blocks, and a head.
//!
//! RegNet and ResNet are AnyNet instances whose stages are derived from
//! their own configuration sections.

use burn::{
    module::Module,
    tensor::{Tensor, backend::Backend},
};

use crate::config::{BlockType, BnConfig, Config, StemType};
use crate::errors::{BuildError, Result};
use crate::layers::{
    Activation, ClassifierHead, ClassifierHeadConfig, ConvBn, ConvBnConfig, SqueezeExcite,
    SqueezeExciteConfig, Stem, StemConfig,
};

/// One stage of an AnyNet, with the bottleneck options already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct StageLayout {
    pub depth: usize,
    pub width: usize,
    /// Stride of the first block of the stage.
    pub stride: usize,
    /// Width of the grouped 3x3 conv in bottleneck blocks.
    pub bottleneck_w: usize,
    pub groups: usize,
}

/// Fully resolved AnyNet layout.
#[derive(Debug, Clone)]
pub struct AnyNetLayout {
    pub stem_type: StemType,
    pub stem_w: usize,
    pub block_type: BlockType,
    pub stages: Vec<StageLayout>,
    /// Squeeze-excitation ratio of bottleneck blocks, relative to the block input.
    pub se_r: Option<f64>,
    /// Put the stride on the first 1x1 conv of bottleneck blocks.
    pub stride_1x1: bool,
    pub head_w: usize,
    pub activation: Activation,
    pub bn: BnConfig,
    pub num_classes: usize,
}

impl AnyNetLayout {
    /// Resolves the `ANYNET` section.
    pub fn from_config(config: &Config) -> Result<Self> {
        let anynet = &config.anynet;
        anynet.check()?;

        let bottleneck = anynet.block_type == BlockType::ResBottleneckBlock;
        let mut stages = Vec::with_capacity(anynet.depths.len());
        for (i, (&depth, &width)) in anynet.depths.iter().zip(&anynet.widths).enumerate() {
            let (bottleneck_w, groups) = if bottleneck {
                let w_b = (width as f64 * anynet.bot_muls[i]).round() as usize;
                let groups = (w_b / anynet.group_ws[i]).max(1);
                (w_b, groups)
            } else {
                (width, 1)
            };
            stages.push(StageLayout {
                depth,
                width,
                stride: anynet.strides[i],
                bottleneck_w,
                groups,
            });
        }

        Ok(Self {
            stem_type: anynet.stem_type,
            stem_w: anynet.stem_w,
            block_type: anynet.block_type,
            stages,
            se_r: anynet.se_on.then_some(anynet.se_r),
            stride_1x1: false,
            head_w: anynet.head_w,
            activation: config.model.activation_fun,
            bn: config.bn.clone(),
            num_classes: config.model.num_classes,
        })
    }

    /// Checks the layout and initializes the network.
    pub fn init<B: Backend>(&self, arch: &'static str, device: &B::Device) -> Result<AnyNet<B>> {
        self.check(arch)?;

        let stem = StemConfig::from_type(self.stem_type, self.stem_w)
            .with_activation(self.activation)
            .with_bn(&self.bn)
            .init(device);

        let mut blocks = Vec::new();
        let mut w_in = self.stem_w;
        for stage in &self.stages {
            for i in 0..stage.depth {
                let stride = if i == 0 { stage.stride } else { 1 };
                blocks.push(self.block(w_in, stage, stride).init(device));
                w_in = stage.width;
            }
        }

        let head = ClassifierHeadConfig::new(w_in, self.num_classes)
            .with_conv(self.head_w, self.activation)
            .with_bn(&self.bn)
            .init(device);

        log::debug!(
            "Initialized {arch} with {} stages and {} blocks",
            self.stages.len(),
            blocks.len()
        );

        Ok(AnyNet {
            stem,
            blocks,
            head,
            num_stages: self.stages.len(),
        })
    }

    fn check(&self, arch: &'static str) -> Result<()> {
        if self.stages.is_empty() {
            return Err(BuildError::invalid_arch(arch, "at least one stage is required"));
        }
        if self.num_classes == 0 {
            return Err(BuildError::invalid_arch(arch, "NUM_CLASSES must be positive"));
        }
        for (i, stage) in self.stages.iter().enumerate() {
            if stage.depth == 0 || stage.width == 0 || stage.stride == 0 {
                return Err(BuildError::invalid_arch(
                    arch,
                    format!("stage {i} needs positive depth, width and stride"),
                ));
            }
            if self.block_type == BlockType::ResBottleneckBlock
                && (stage.bottleneck_w == 0
                    || stage.groups == 0
                    || stage.bottleneck_w % stage.groups != 0)
            {
                return Err(BuildError::invalid_arch(
                    arch,
                    format!(
                        "stage {i}: bottleneck width {} is not divisible into {} groups",
                        stage.bottleneck_w, stage.groups
                    ),
                ));
            }
        }
        Ok(())
    }

    fn block(&self, w_in: usize, stage: &StageLayout, stride: usize) -> ResBlockConfig {
        ResBlockConfig {
            block_type: self.block_type,
            w_in,
            w_out: stage.width,
            stride,
            bottleneck_w: stage.bottleneck_w,
            groups: stage.groups,
            se_w: self
                .se_r
                .map(|r| (w_in as f64 * r).round() as usize)
                .unwrap_or(0),
            stride_1x1: self.stride_1x1,
            activation: self.activation,
            bn: self.bn.clone(),
        }
    }
}

/// Configuration for a single [`ResBlock`].
#[derive(Debug, Clone)]
pub struct ResBlockConfig {
    pub block_type: BlockType,
    pub w_in: usize,
    pub w_out: usize,
    pub stride: usize,
    pub bottleneck_w: usize,
    pub groups: usize,
    /// Squeeze width of the SE gate; 0 disables it.
    pub se_w: usize,
    pub stride_1x1: bool,
    pub activation: Activation,
    pub bn: BnConfig,
}

impl ResBlockConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ResBlock<B> {
        let conv = |w_in, w_out, k| ConvBnConfig::new(w_in, w_out, k).with_bn(&self.bn);
        let act = self.activation;

        let (a, b, se, c) = match self.block_type {
            BlockType::VanillaBlock => (
                conv(self.w_in, self.w_out, 3)
                    .with_stride(self.stride)
                    .with_activation(act),
                conv(self.w_out, self.w_out, 3).with_activation(act),
                None,
                None,
            ),
            BlockType::ResBasicBlock => (
                conv(self.w_in, self.w_out, 3)
                    .with_stride(self.stride)
                    .with_activation(act),
                conv(self.w_out, self.w_out, 3),
                None,
                None,
            ),
            BlockType::ResBottleneckBlock => {
                let (s1, s3) = if self.stride_1x1 {
                    (self.stride, 1)
                } else {
                    (1, self.stride)
                };
                let se = (self.se_w > 0).then(|| {
                    SqueezeExciteConfig::new(self.bottleneck_w, self.se_w).init(device)
                });
                (
                    conv(self.w_in, self.bottleneck_w, 1)
                        .with_stride(s1)
                        .with_activation(act),
                    conv(self.bottleneck_w, self.bottleneck_w, 3)
                        .with_stride(s3)
                        .with_groups(self.groups)
                        .with_activation(act),
                    se,
                    Some(conv(self.bottleneck_w, self.w_out, 1).init(device)),
                )
            }
        };

        let residual = self.block_type != BlockType::VanillaBlock;
        let needs_proj = residual && (self.w_in != self.w_out || self.stride != 1);
        let proj = needs_proj.then(|| {
            conv(self.w_in, self.w_out, 1)
                .with_stride(self.stride)
                .init(device)
        });

        ResBlock {
            a: a.init(device),
            b: b.init(device),
            se,
            c,
            proj,
            residual,
            activation_id: act.to_id(),
        }
    }
}

/// Vanilla, basic residual or bottleneck residual block.
#[derive(Module, Debug)]
pub struct ResBlock<B: Backend> {
    a: ConvBn<B>,
    b: ConvBn<B>,
    se: Option<SqueezeExcite<B>>,
    c: Option<ConvBn<B>>,
    proj: Option<ConvBn<B>>,
    residual: bool,
    activation_id: u8,
}

impl<B: Backend> ResBlock<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = self.b.forward(self.a.forward(input.clone()));
        if let Some(se) = &self.se {
            x = se.forward(x);
        }
        if let Some(c) = &self.c {
            x = c.forward(x);
        }
        if !self.residual {
            return x;
        }
        let shortcut = match &self.proj {
            Some(proj) => proj.forward(input),
            None => input,
        };
        Activation::from_id(self.activation_id).apply(x + shortcut)
    }
}

/// The generic AnyNet network.
#[derive(Module, Debug)]
pub struct AnyNet<B: Backend> {
    stem: Stem<B>,
    blocks: Vec<ResBlock<B>>,
    head: ClassifierHead<B>,
    num_stages: usize,
}

impl<B: Backend> AnyNet<B> {
    /// Builds the network described by the `ANYNET` section.
    pub fn from_config(config: &Config, device: &B::Device) -> Result<Self> {
        AnyNetLayout::from_config(config)?.init("anynet", device)
    }

    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = self.stem.forward(images);
        for block in &self.blocks {
            x = block.forward(x);
        }
        self.head.forward(x)
    }

    pub fn num_classes(&self) -> usize {
        self.head.num_classes()
    }

    pub fn num_stages(&self) -> usize {
        self.num_stages
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }
}

super::impl_classifier!(AnyNet, "anynet");

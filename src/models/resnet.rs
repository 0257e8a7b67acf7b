//! ResNet / ResNeXt for ImageNet and CIFAR inputs.

use burn::{
    module::Module,
    tensor::{Tensor, backend::Backend},
};

use crate::config::{BlockType, Config, StemType, TransFun};
use crate::errors::{BuildError, Result};
use crate::models::anynet::{AnyNet, AnyNetLayout, StageLayout};

/// Stage depths of the ImageNet models, keyed by total depth.
const IMAGENET_STAGE_DEPTHS: [(usize, [usize; 4]); 5] = [
    (18, [2, 2, 2, 2]),
    (34, [3, 4, 6, 3]),
    (50, [3, 4, 6, 3]),
    (101, [3, 4, 23, 3]),
    (152, [3, 8, 36, 3]),
];

/// Returns the per-stage block counts for `MODEL.DEPTH`.
///
/// CIFAR models (`RESNET.STEM_TYPE: res_stem_cifar`) have three stages of
/// `(depth - 2) / 6` blocks; ImageNet models use the standard tables.
pub fn stage_depths(config: &Config) -> Result<Vec<usize>> {
    let depth = config.model.depth;
    if config.resnet.stem_type == StemType::ResStemCifar {
        if depth < 8 || (depth - 2) % 6 != 0 {
            return Err(BuildError::invalid_arch(
                "resnet",
                format!("CIFAR depth must be 6n + 2 with n >= 1, got {depth}"),
            ));
        }
        return Ok(vec![(depth - 2) / 6; 3]);
    }

    IMAGENET_STAGE_DEPTHS
        .iter()
        .find(|(d, _)| *d == depth)
        .map(|(_, depths)| depths.to_vec())
        .ok_or_else(|| {
            BuildError::invalid_arch(
                "resnet",
                format!("unsupported ImageNet depth {depth}, expected 18, 34, 50, 101 or 152"),
            )
        })
}

/// Builds the AnyNet layout of the configured ResNet.
pub fn resnet_layout(config: &Config) -> Result<AnyNetLayout> {
    let resnet = &config.resnet;
    let depths = stage_depths(config)?;
    if resnet.num_groups == 0 || resnet.width_per_group == 0 {
        return Err(BuildError::invalid_arch(
            "resnet",
            "NUM_GROUPS and WIDTH_PER_GROUP must be positive",
        ));
    }

    let bottleneck = resnet.trans_fun == TransFun::BottleneckTransform;
    let cifar = resnet.stem_type == StemType::ResStemCifar;
    let (stem_w, base_w) = match (cifar, bottleneck) {
        (true, _) => (16, 16),
        (false, true) => (64, 256),
        (false, false) => (64, 64),
    };

    let stages = depths
        .iter()
        .enumerate()
        .map(|(i, &depth)| {
            let width = base_w << i;
            let bottleneck_w = if cifar {
                (width / 4).max(1)
            } else {
                (resnet.width_per_group * resnet.num_groups) << i
            };
            StageLayout {
                depth,
                width,
                stride: if i == 0 { 1 } else { 2 },
                bottleneck_w,
                groups: if cifar { 1 } else { resnet.num_groups },
            }
        })
        .collect();

    Ok(AnyNetLayout {
        stem_type: resnet.stem_type,
        stem_w,
        block_type: if bottleneck {
            BlockType::ResBottleneckBlock
        } else {
            BlockType::ResBasicBlock
        },
        stages,
        se_r: None,
        stride_1x1: resnet.stride_1x1,
        head_w: 0,
        activation: config.model.activation_fun,
        bn: config.bn.clone(),
        num_classes: config.model.num_classes,
    })
}

#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    anynet: AnyNet<B>,
}

impl<B: Backend> ResNet<B> {
    pub fn from_config(config: &Config, device: &B::Device) -> Result<Self> {
        let layout = resnet_layout(config)?;
        Ok(Self {
            anynet: layout.init("resnet", device)?,
        })
    }

    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.anynet.forward(images)
    }

    pub fn num_classes(&self) -> usize {
        self.anynet.num_classes()
    }

    pub fn num_blocks(&self) -> usize {
        self.anynet.num_blocks()
    }
}

super::impl_classifier!(ResNet, "resnet");

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn resnet_config(depth: usize) -> Config {
        Config::new().model_type("resnet").depth(depth)
    }

    #[test]
    fn test_imagenet_stage_depths() {
        assert_eq!(stage_depths(&resnet_config(50)).unwrap(), vec![3, 4, 6, 3]);
        assert_eq!(stage_depths(&resnet_config(101)).unwrap(), vec![3, 4, 23, 3]);
        assert!(stage_depths(&resnet_config(42)).is_err());
    }

    #[test]
    fn test_cifar_stage_depths() {
        let mut config = resnet_config(20);
        config.resnet.stem_type = StemType::ResStemCifar;
        assert_eq!(stage_depths(&config).unwrap(), vec![3, 3, 3]);

        config.model.depth = 21;
        assert!(stage_depths(&config).is_err());
    }

    #[test]
    fn test_resnext_bottleneck_widths() {
        let mut config = resnet_config(50);
        config.resnet.trans_fun = TransFun::BottleneckTransform;
        config.resnet.num_groups = 32;
        config.resnet.width_per_group = 4;

        let layout = resnet_layout(&config).unwrap();
        let widths: Vec<usize> = layout.stages.iter().map(|s| s.width).collect();
        let bottlenecks: Vec<usize> = layout.stages.iter().map(|s| s.bottleneck_w).collect();
        assert_eq!(widths, vec![256, 512, 1024, 2048]);
        assert_eq!(bottlenecks, vec![128, 256, 512, 1024]);
        assert!(layout.stages.iter().all(|s| s.groups == 32));
        assert_eq!(layout.stem_w, 64);
        assert!(layout.stride_1x1);
    }

    #[test]
    fn test_cifar_resnet_forward() {
        let device = <TestBackend as Backend>::Device::default();
        let mut config = resnet_config(8).num_classes(10);
        config.resnet.stem_type = StemType::ResStemCifar;

        let model = ResNet::<TestBackend>::from_config(&config, &device).unwrap();
        assert_eq!(model.num_blocks(), 3);

        let logits = model.forward(Tensor::zeros([2, 3, 16, 16], &device));
        assert_eq!(logits.dims(), [2, 10]);
    }

    #[test]
    fn test_cifar_bottleneck_forward() {
        let device = <TestBackend as Backend>::Device::default();
        let mut config = resnet_config(8).num_classes(3);
        config.resnet.stem_type = StemType::ResStemCifar;
        config.resnet.trans_fun = TransFun::BottleneckTransform;

        let model = ResNet::<TestBackend>::from_config(&config, &device).unwrap();
        let logits = model.forward(Tensor::zeros([1, 3, 8, 8], &device));
        assert_eq!(logits.dims(), [1, 3]);
    }
}

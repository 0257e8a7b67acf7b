//! RegNet: AnyNet with stage widths generated by a quantized linear rule.

use burn::{
    module::Module,
    tensor::{Tensor, backend::Backend},
};

use crate::config::{BlockType, Config, RegNetConfig};
use crate::errors::{BuildError, Result};
use crate::models::anynet::{AnyNet, AnyNetLayout, StageLayout};

/// Widths are multiples of this quantum.
const WIDTH_QUANTUM: usize = 8;

/// Generates per-block widths from the linear parameters.
///
/// Block `j` gets the continuous width `w0 + wa * j`, which is snapped to
/// `w0 * wm^k` for the nearest integer `k` and then to a multiple of `q`.
pub fn generate_regnet(wa: f64, w0: usize, wm: f64, depth: usize, q: usize) -> Result<Vec<usize>> {
    if wa < 0.0 || w0 == 0 || wm <= 1.0 || q == 0 || w0 % q != 0 {
        return Err(BuildError::invalid_arch(
            "regnet",
            format!("invalid width parameters wa={wa} w0={w0} wm={wm} (q={q})"),
        ));
    }

    let w0 = w0 as f64;
    let q = q as f64;
    Ok((0..depth)
        .map(|j| {
            let w_cont = j as f64 * wa + w0;
            let k = ((w_cont / w0).ln() / wm.ln()).round_ties_even();
            let w = w0 * wm.powf(k);
            ((w / q).round_ties_even() * q) as usize
        })
        .collect())
}

/// Groups consecutive blocks of equal width into `(width, depth)` stages.
pub fn stages_from_blocks(widths: &[usize]) -> Vec<(usize, usize)> {
    let mut stages: Vec<(usize, usize)> = Vec::new();
    for &w in widths {
        match stages.last_mut() {
            Some((width, depth)) if *width == w => *depth += 1,
            _ => stages.push((w, 1)),
        }
    }
    stages
}

/// Makes widths compatible with their bottleneck multiplier and group width.
///
/// Returns the adjusted widths and the group widths actually used.
pub fn adjust_widths_and_groups(
    widths: &[usize],
    bot_mul: f64,
    group_w: usize,
) -> (Vec<usize>, Vec<usize>) {
    widths
        .iter()
        .map(|&w| {
            let w_bot = (w as f64 * bot_mul) as usize;
            let g = group_w.min(w_bot).max(1);
            let w_bot = quantize(w_bot, g);
            ((w_bot as f64 / bot_mul) as usize, g)
        })
        .unzip()
}

fn quantize(value: usize, q: usize) -> usize {
    ((value as f64 / q as f64).round_ties_even() * q as f64) as usize
}

/// Resolves the `REGNET` section into AnyNet stages.
pub fn regnet_stages(regnet: &RegNetConfig) -> Result<Vec<StageLayout>> {
    if regnet.depth == 0 || regnet.stride == 0 || regnet.group_w == 0 || regnet.bot_mul <= 0.0 {
        return Err(BuildError::invalid_arch(
            "regnet",
            "DEPTH, STRIDE, GROUP_W and BOT_MUL must be positive",
        ));
    }

    let block_widths = generate_regnet(regnet.wa, regnet.w0, regnet.wm, regnet.depth, WIDTH_QUANTUM)?;
    let stages = stages_from_blocks(&block_widths);
    let stage_widths: Vec<usize> = stages.iter().map(|&(w, _)| w).collect();
    let (widths, group_ws) = adjust_widths_and_groups(&stage_widths, regnet.bot_mul, regnet.group_w);

    Ok(stages
        .iter()
        .zip(widths.iter().zip(&group_ws))
        .map(|(&(_, depth), (&width, &group_w))| {
            let bottleneck_w = (width as f64 * regnet.bot_mul).round() as usize;
            StageLayout {
                depth,
                width,
                stride: regnet.stride,
                bottleneck_w,
                groups: (bottleneck_w / group_w).max(1),
            }
        })
        .collect())
}

/// RegNetX / RegNetY (with `SE_ON`).
#[derive(Module, Debug)]
pub struct RegNet<B: Backend> {
    anynet: AnyNet<B>,
}

impl<B: Backend> RegNet<B> {
    pub fn from_config(config: &Config, device: &B::Device) -> Result<Self> {
        let regnet = &config.regnet;
        let stages = regnet_stages(regnet)?;
        log::debug!(
            "RegNet stage widths {:?}, depths {:?}",
            stages.iter().map(|s| s.width).collect::<Vec<_>>(),
            stages.iter().map(|s| s.depth).collect::<Vec<_>>()
        );

        let layout = AnyNetLayout {
            stem_type: regnet.stem_type,
            stem_w: regnet.stem_w,
            block_type: regnet.block_type,
            stages,
            se_r: (regnet.se_on && regnet.block_type == BlockType::ResBottleneckBlock)
                .then_some(regnet.se_r),
            stride_1x1: false,
            head_w: regnet.head_w,
            activation: config.model.activation_fun,
            bn: config.bn.clone(),
            num_classes: config.model.num_classes,
        };

        Ok(Self {
            anynet: layout.init("regnet", device)?,
        })
    }

    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.anynet.forward(images)
    }

    pub fn num_classes(&self) -> usize {
        self.anynet.num_classes()
    }

    pub fn num_stages(&self) -> usize {
        self.anynet.num_stages()
    }
}

super::impl_classifier!(RegNet, "regnet");

//! Model configuration.
//!
//! [`Config`] is a tree of sections keyed the same way as the YAML files the
//! training driver loads (`MODEL.TYPE`, `RESNET.NUM_GROUPS`, ...). A single
//! process-wide instance lives in [`global`]; builders read a snapshot of it.
//!
//! ```
//! use netzoo::config::Config;
//!
//! let mut config = Config::new().model_type("resnet").num_classes(100);
//! config.merge_from_str("RESNET:\n  NUM_GROUPS: 32\n").unwrap();
//!
//! assert_eq!(config.model.model_type, "resnet");
//! assert_eq!(config.resnet.num_groups, 32);
//! ```

pub mod global;
mod merge;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{BuildError, Result};
use crate::layers::Activation;

pub use global::{cfg, load_cfg_from_file, merge_cfg_from_list, reset_cfg, set_cfg, update_cfg};

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Config {
    pub model: ModelConfig,
    pub bn: BnConfig,
    pub resnet: ResNetConfig,
    pub anynet: AnyNetConfig,
    pub regnet: RegNetConfig,
    pub en: EffNetConfig,
    pub en2: EffNetV2Config,
    pub mobilenet: MobileNetConfig,
    pub shufflenet: ShuffleNetConfig,
    pub train: TrainConfig,
}

/// Model selection and classifier options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ModelConfig {
    /// Registry key of the model architecture.
    #[serde(rename = "TYPE")]
    pub model_type: String,
    /// Depth, used by ResNet.
    pub depth: usize,
    /// Number of output classes.
    pub num_classes: usize,
    /// Registry key of the loss function.
    pub loss_fun: String,
    /// Activation used by the AnyNet/RegNet/ResNet families.
    pub activation_fun: Activation,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_type: String::new(),
            depth: 0,
            num_classes: 10,
            loss_fun: "cross_entropy".to_string(),
            activation_fun: Activation::Relu,
        }
    }
}

/// Batch normalization options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct BnConfig {
    pub eps: f64,
    pub mom: f64,
}

impl Default for BnConfig {
    fn default() -> Self {
        Self { eps: 1e-5, mom: 0.1 }
    }
}

/// Stem variants shared by AnyNet, RegNet and ResNet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StemType {
    /// 3x3 conv, stride 1.
    ResStemCifar,
    /// 7x7 conv stride 2, then 3x3 max-pool stride 2.
    ResStemIn,
    /// 3x3 conv, stride 2.
    SimpleStemIn,
}

/// Block variants for AnyNet stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    VanillaBlock,
    ResBasicBlock,
    ResBottleneckBlock,
}

/// Residual transform used by ResNet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransFun {
    BasicTransform,
    BottleneckTransform,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ResNetConfig {
    pub trans_fun: TransFun,
    pub num_groups: usize,
    pub width_per_group: usize,
    /// Apply the stride on the 1x1 conv of the bottleneck instead of the 3x3.
    #[serde(rename = "STRIDE_1X1")]
    pub stride_1x1: bool,
    pub stem_type: StemType,
}

impl Default for ResNetConfig {
    fn default() -> Self {
        Self {
            trans_fun: TransFun::BasicTransform,
            num_groups: 1,
            width_per_group: 64,
            stride_1x1: true,
            stem_type: StemType::ResStemIn,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AnyNetConfig {
    pub stem_type: StemType,
    pub stem_w: usize,
    pub block_type: BlockType,
    pub depths: Vec<usize>,
    pub widths: Vec<usize>,
    pub strides: Vec<usize>,
    pub bot_muls: Vec<f64>,
    pub group_ws: Vec<usize>,
    /// Width of the optional 1x1 conv before pooling; 0 disables it.
    pub head_w: usize,
    pub se_on: bool,
    pub se_r: f64,
}

impl Default for AnyNetConfig {
    fn default() -> Self {
        Self {
            stem_type: StemType::SimpleStemIn,
            stem_w: 32,
            block_type: BlockType::ResBottleneckBlock,
            depths: Vec::new(),
            widths: Vec::new(),
            strides: Vec::new(),
            bot_muls: Vec::new(),
            group_ws: Vec::new(),
            head_w: 0,
            se_on: false,
            se_r: 0.25,
        }
    }
}

impl AnyNetConfig {
    /// Checks that the per-stage lists describe a buildable network.
    pub fn check(&self) -> Result<()> {
        let n = self.depths.len();
        if n == 0 {
            return Err(BuildError::invalid_arch("anynet", "at least one stage is required"));
        }
        let lists = [
            ("WIDTHS", self.widths.len()),
            ("STRIDES", self.strides.len()),
            ("BOT_MULS", self.bot_muls.len()),
            ("GROUP_WS", self.group_ws.len()),
        ];
        for (name, len) in lists {
            // Bottleneck options are ignored by the other block types.
            let optional = matches!(name, "BOT_MULS" | "GROUP_WS")
                && self.block_type != BlockType::ResBottleneckBlock;
            if len != n && !(optional && len == 0) {
                return Err(BuildError::invalid_arch(
                    "anynet",
                    format!("{name} has {len} entries, expected {n}"),
                ));
            }
        }
        if self.stem_w == 0 || self.widths.iter().any(|&w| w == 0) {
            return Err(BuildError::invalid_arch("anynet", "widths must be positive"));
        }
        if self.depths.iter().any(|&d| d == 0) || self.strides.iter().any(|&s| s == 0) {
            return Err(BuildError::invalid_arch(
                "anynet",
                "depths and strides must be positive",
            ));
        }
        if self.group_ws.iter().any(|&g| g == 0) || self.bot_muls.iter().any(|&b| b <= 0.0) {
            return Err(BuildError::invalid_arch(
                "anynet",
                "group widths and bottleneck multipliers must be positive",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RegNetConfig {
    pub stem_type: StemType,
    pub stem_w: usize,
    pub block_type: BlockType,
    pub stride: usize,
    pub se_on: bool,
    pub se_r: f64,
    pub depth: usize,
    #[serde(rename = "W0")]
    pub w0: usize,
    pub wa: f64,
    pub wm: f64,
    pub group_w: usize,
    pub bot_mul: f64,
    pub head_w: usize,
}

impl Default for RegNetConfig {
    fn default() -> Self {
        Self {
            stem_type: StemType::SimpleStemIn,
            stem_w: 32,
            block_type: BlockType::ResBottleneckBlock,
            stride: 2,
            se_on: false,
            se_r: 0.25,
            depth: 10,
            w0: 32,
            wa: 5.0,
            wm: 2.5,
            group_w: 16,
            bot_mul: 1.0,
            head_w: 0,
        }
    }
}

/// EfficientNet (v1) options. Defaults describe EfficientNet-B0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct EffNetConfig {
    pub stem_w: usize,
    pub depths: Vec<usize>,
    pub widths: Vec<usize>,
    pub exp_ratios: Vec<f64>,
    pub strides: Vec<usize>,
    pub kernels: Vec<usize>,
    pub se_r: f64,
    pub head_w: usize,
    pub dropout_ratio: f64,
}

impl Default for EffNetConfig {
    fn default() -> Self {
        Self {
            stem_w: 32,
            depths: vec![1, 2, 2, 3, 3, 4, 1],
            widths: vec![16, 24, 40, 80, 112, 192, 320],
            exp_ratios: vec![1.0, 6.0, 6.0, 6.0, 6.0, 6.0, 6.0],
            strides: vec![1, 2, 2, 2, 1, 2, 1],
            kernels: vec![3, 3, 5, 3, 5, 5, 3],
            se_r: 0.25,
            head_w: 1280,
            dropout_ratio: 0.2,
        }
    }
}

impl EffNetConfig {
    pub fn check(&self) -> Result<()> {
        check_stage_lists(
            "effnet_v1",
            self.stem_w,
            &self.depths,
            &[
                ("WIDTHS", self.widths.len()),
                ("EXP_RATIOS", self.exp_ratios.len()),
                ("STRIDES", self.strides.len()),
                ("KERNELS", self.kernels.len()),
            ],
        )?;
        check_kernels("effnet_v1", &self.kernels)?;
        check_dropout("effnet_v1", self.dropout_ratio)
    }
}

/// EfficientNetV2 options. Defaults describe EfficientNetV2-S.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct EffNetV2Config {
    pub stem_w: usize,
    pub depths: Vec<usize>,
    pub widths: Vec<usize>,
    pub exp_ratios: Vec<f64>,
    pub strides: Vec<usize>,
    pub kernels: Vec<usize>,
    /// Stages built from Fused-MBConv blocks.
    pub fused: Vec<bool>,
    /// Per-stage squeeze-excitation ratio; 0 disables SE for the stage.
    pub se_rs: Vec<f64>,
    pub head_w: usize,
    pub dropout_ratio: f64,
}

impl Default for EffNetV2Config {
    fn default() -> Self {
        Self {
            stem_w: 24,
            depths: vec![2, 4, 4, 6, 9, 15],
            widths: vec![24, 48, 64, 128, 160, 256],
            exp_ratios: vec![1.0, 4.0, 4.0, 4.0, 6.0, 6.0],
            strides: vec![1, 2, 2, 2, 1, 2],
            kernels: vec![3, 3, 3, 3, 3, 3],
            fused: vec![true, true, true, false, false, false],
            se_rs: vec![0.0, 0.0, 0.0, 0.25, 0.25, 0.25],
            head_w: 1280,
            dropout_ratio: 0.2,
        }
    }
}

impl EffNetV2Config {
    pub fn check(&self) -> Result<()> {
        check_stage_lists(
            "effnet_v2",
            self.stem_w,
            &self.depths,
            &[
                ("WIDTHS", self.widths.len()),
                ("EXP_RATIOS", self.exp_ratios.len()),
                ("STRIDES", self.strides.len()),
                ("KERNELS", self.kernels.len()),
                ("FUSED", self.fused.len()),
                ("SE_RS", self.se_rs.len()),
            ],
        )?;
        check_kernels("effnet_v2", &self.kernels)?;
        check_dropout("effnet_v2", self.dropout_ratio)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct MobileNetConfig {
    pub width_mult: f64,
    pub dropout_ratio: f64,
}

impl Default for MobileNetConfig {
    fn default() -> Self {
        Self {
            width_mult: 1.0,
            dropout_ratio: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ShuffleNetConfig {
    /// One of 0.5, 1.0, 1.5 or 2.0.
    pub width_mult: f64,
    pub stage_repeats: Vec<usize>,
}

impl Default for ShuffleNetConfig {
    fn default() -> Self {
        Self {
            width_mult: 1.0,
            stage_repeats: vec![4, 8, 4],
        }
    }
}

/// Training options consumed by the loss helpers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct TrainConfig {
    pub label_smoothing: f64,
}

impl Config {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `MODEL.TYPE`.
    pub fn model_type(mut self, name: impl Into<String>) -> Self {
        self.model.model_type = name.into();
        self
    }

    /// Sets `MODEL.LOSS_FUN`.
    pub fn loss_fun(mut self, name: impl Into<String>) -> Self {
        self.model.loss_fun = name.into();
        self
    }

    /// Sets `MODEL.NUM_CLASSES`.
    pub fn num_classes(mut self, num_classes: usize) -> Self {
        self.model.num_classes = num_classes;
        self
    }

    /// Sets `MODEL.DEPTH`.
    pub fn depth(mut self, depth: usize) -> Self {
        self.model.depth = depth;
        self
    }

    /// Parses a full configuration; keys absent from the text keep their defaults.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let mut config = Self::default();
        config.merge_from_str(text)?;
        Ok(config)
    }

    /// Reads a configuration file on top of the defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        config.merge_from_file(path)?;
        Ok(config)
    }

    /// Overlays the keys present in `text` onto this configuration.
    ///
    /// Keys that do not exist in the configuration tree are rejected with
    /// [`BuildError::UnknownConfigKey`]; the configuration is left untouched
    /// on error.
    pub fn merge_from_str(&mut self, text: &str) -> Result<()> {
        let overlay: serde_yaml::Value = serde_yaml::from_str(text)?;
        self.merge_value(overlay)
    }

    /// Overlays the keys of a YAML file onto this configuration.
    pub fn merge_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        log::info!("Merging configuration from {}", path.display());
        self.merge_from_str(&text)
    }

    /// Overlays `KEY.PATH value` pairs, as passed on a command line.
    ///
    /// Values are parsed as YAML scalars, so `"0.5"` becomes a float and
    /// `"[1, 2]"` a list.
    pub fn merge_from_list<S: AsRef<str>>(&mut self, opts: &[S]) -> Result<()> {
        let overlay = merge::overlay_from_list(opts)?;
        self.merge_value(overlay)
    }

    fn merge_value(&mut self, overlay: serde_yaml::Value) -> Result<()> {
        let mut base = serde_yaml::to_value(&*self)?;
        merge::merge_values(&mut base, overlay, "")?;
        *self = serde_yaml::from_value(base)?;
        Ok(())
    }

    /// Serializes the configuration to YAML.
    pub fn dump(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Checks the options of the selected architecture.
    ///
    /// Unknown model types are not an error here; the registry decides
    /// which names are supported.
    pub fn validate(&self) -> Result<()> {
        if self.model.num_classes == 0 {
            return Err(BuildError::invalid_config("MODEL.NUM_CLASSES must be positive"));
        }
        if self.bn.eps <= 0.0 {
            return Err(BuildError::invalid_config("BN.EPS must be positive"));
        }
        if !(0.0..1.0).contains(&self.train.label_smoothing) {
            return Err(BuildError::invalid_config(
                "TRAIN.LABEL_SMOOTHING must be in [0, 1)",
            ));
        }
        match self.model.model_type.as_str() {
            "anynet" => self.anynet.check(),
            "regnet" => crate::models::regnet::regnet_stages(&self.regnet).map(|_| ()),
            "resnet" => crate::models::resnet::stage_depths(self).map(|_| ()),
            "effnet_v1" => self.en.check(),
            "effnet_v2" => self.en2.check(),
            "shufflenetv2" => crate::models::shufflenetv2::stage_widths(&self.shufflenet).map(|_| ()),
            "mobilenetv3_small" | "mobilenetv3_large" if self.mobilenet.width_mult <= 0.0 => Err(
                BuildError::invalid_config("MOBILENET.WIDTH_MULT must be positive"),
            ),
            _ => Ok(()),
        }
    }
}

fn check_stage_lists(
    arch: &'static str,
    stem_w: usize,
    depths: &[usize],
    lists: &[(&str, usize)],
) -> Result<()> {
    let n = depths.len();
    if n == 0 {
        return Err(BuildError::invalid_arch(arch, "at least one stage is required"));
    }
    for (name, len) in lists {
        if *len != n {
            return Err(BuildError::invalid_arch(
                arch,
                format!("{name} has {len} entries, expected {n}"),
            ));
        }
    }
    if stem_w == 0 || depths.iter().any(|&d| d == 0) {
        return Err(BuildError::invalid_arch(
            arch,
            "stem width and depths must be positive",
        ));
    }
    Ok(())
}

fn check_kernels(arch: &'static str, kernels: &[usize]) -> Result<()> {
    match kernels.iter().find(|&&k| k % 2 == 0) {
        Some(k) => Err(BuildError::invalid_arch(
            arch,
            format!("kernel size {k} must be odd"),
        )),
        None => Ok(()),
    }
}

fn check_dropout(arch: &'static str, ratio: f64) -> Result<()> {
    if (0.0..1.0).contains(&ratio) {
        Ok(())
    } else {
        Err(BuildError::invalid_arch(arch, "DROPOUT_RATIO must be in [0, 1)"))
    }
}

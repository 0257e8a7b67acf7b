//! # netzoo
//!
//! Model and loss builders for image classification, on top of Burn.
//!
//! The network to build is selected by name from a YAML-backed configuration
//! (`MODEL.TYPE`, `MODEL.LOSS_FUN`), looked up in a registry of constructors
//! and instantiated on a Burn device. New architectures and losses can be
//! registered at runtime.
//!
//! ## Features
//!
//! - **Model zoo**: AnyNet, RegNet, ResNet/ResNeXt, EfficientNet v1/v2,
//!   MobileNetV3 (small/large) and ShuffleNetV2, all driven by configuration.
//! - **Registries**: per-backend, thread-safe name to constructor maps with
//!   runtime registration.
//! - **Configuration**: a sectioned `Config` with YAML files and
//!   `KEY.PATH value` overrides.
//!
//! ## Example
//!
//! ```
//! use burn::backend::NdArray;
//! use burn::tensor::Tensor;
//! use netzoo::prelude::*;
//!
//! type Backend = NdArray;
//!
//! let device = <Backend as burn::tensor::backend::Backend>::Device::default();
//!
//! let mut config = Config::new().model_type("mobilenetv3_small").num_classes(10);
//! config.mobilenet.width_mult = 0.25;
//!
//! let builders = Builders::<Backend>::with_defaults();
//! let model = builders.build_model(&config, &device).expect("Failed to build model");
//! assert_eq!(model.arch(), "mobilenetv3_small");
//!
//! let logits = model.forward(Tensor::zeros([1, 3, 32, 32], &device));
//! assert_eq!(logits.dims(), [1, 10]);
//! ```

pub mod builders;
pub mod config;
pub mod errors;
pub mod layers;
pub mod losses;
pub mod models;
pub mod registry;

// Re-exports for convenience
pub use builders::{
    Builders, LossCtor, ModelCtor, build_loss_fun, build_model, get_loss_fun, get_model,
    list_loss_funs, list_models, register_loss_fun, register_model,
};
pub use config::Config;
pub use errors::{BuildError, Result};
pub use layers::Activation;
pub use losses::{LossFn, SoftCrossEntropyLoss};
pub use models::Classifier;

/// Backend type alias for WGPU with autodiff support.
pub type Backend = burn::backend::Autodiff<burn::backend::Wgpu>;

/// Backend type for inference (no autodiff).
pub type InferenceBackend = burn::backend::Wgpu;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::builders::{
        Builders, build_loss_fun, build_model, register_loss_fun, register_model,
    };
    pub use crate::config::{Config, cfg, load_cfg_from_file, merge_cfg_from_list, update_cfg};
    pub use crate::errors::{BuildError, Result};
    pub use crate::layers::Activation;
    pub use crate::losses::{LossFn, SoftCrossEntropyLoss, smooth_one_hot_labels};
    pub use crate::models::Classifier;
    pub use crate::{Backend, InferenceBackend};
}

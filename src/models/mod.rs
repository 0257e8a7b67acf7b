//! Image classification architectures.
//!
//! Each architecture reads its section of [`Config`](crate::config::Config)
//! and is exposed through the [`Classifier`] trait so the builders can hand
//! out any of them behind one type.

pub mod anynet;
pub mod effnet;
pub mod mbconv;
pub mod mobilenetv3;
pub mod regnet;
pub mod resnet;
pub mod shufflenetv2;

use std::fmt::Debug;

use burn::tensor::{Tensor, backend::Backend};

pub use anynet::{AnyNet, AnyNetLayout, StageLayout};
pub use effnet::{EffNetV1, EffNetV2};
pub use mobilenetv3::MobileNetV3;
pub use regnet::RegNet;
pub use resnet::ResNet;
pub use shufflenetv2::ShuffleNetV2;

/// A network mapping NCHW images to class logits.
pub trait Classifier<B: Backend>: Send + Debug {
    /// Runs the network: `[N, 3, H, W]` images to `[N, num_classes]` logits.
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;

    /// Registry name of the architecture.
    fn arch(&self) -> &'static str;

    /// Number of parameters of the network.
    fn num_params(&self) -> usize;

    fn num_classes(&self) -> usize;
}

/// Implements [`Classifier`] for a module with inherent `forward` and
/// `num_classes` methods.
macro_rules! impl_classifier {
    ($model:ident, $arch:expr) => {
        impl<B: burn::tensor::backend::Backend> $crate::models::Classifier<B> for $model<B> {
            fn forward(
                &self,
                images: burn::tensor::Tensor<B, 4>,
            ) -> burn::tensor::Tensor<B, 2> {
                $model::forward(self, images)
            }

            fn arch(&self) -> &'static str {
                $arch
            }

            fn num_params(&self) -> usize {
                burn::module::Module::num_params(self)
            }

            fn num_classes(&self) -> usize {
                $model::num_classes(self)
            }
        }
    };
}

pub(crate) use impl_classifier;

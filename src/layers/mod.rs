//! Network building blocks.
//!
//! Every architecture in [`crate::models`] is assembled from these layers:
//! conv + batch-norm blocks, squeeze-excitation gates, dense layers and a
//! shared classification head.

pub mod activation;
pub mod conv;
pub mod dense;
pub mod head;
pub mod squeeze_excite;
pub mod stem;

pub use activation::Activation;
pub use conv::{ConvBn, ConvBnConfig};
pub use dense::{Dense, DenseConfig};
pub use head::{ClassifierHead, ClassifierHeadConfig};
pub use squeeze_excite::{SqueezeExcite, SqueezeExciteConfig, global_avg_pool};
pub use stem::{IMAGE_CHANNELS, Stem, StemConfig};

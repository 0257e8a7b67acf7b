//! Loss functions for classification training.
//!
//! This module provides:
//! - The [`LossFn`] trait implemented by every registered loss
//! - Soft-target cross entropy
//! - Label smoothing helpers to build soft targets

mod cross_entropy;
mod labels;

use std::fmt::Debug;

use burn::tensor::{Tensor, backend::Backend};

pub use cross_entropy::SoftCrossEntropyLoss;
pub use labels::smooth_one_hot_labels;

/// A loss over `[N, num_classes]` logits and soft targets.
pub trait LossFn<B: Backend>: Send + Sync + Debug {
    /// Computes the scalar loss.
    fn forward(&self, logits: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1>;

    /// Registry name of the loss.
    fn name(&self) -> &'static str;
}

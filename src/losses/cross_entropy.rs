//! Soft-target cross entropy.

use burn::tensor::{Tensor, activation::log_softmax, backend::Backend};

use crate::config::Config;
use crate::errors::Result;
use crate::losses::{LossFn, smooth_one_hot_labels};

/// Cross entropy against soft target distributions.
///
/// `loss = mean_n(sum_c(-targets[n, c] * log_softmax(logits)[n, c]))`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SoftCrossEntropyLoss {
    num_classes: usize,
    label_smoothing: f64,
}

impl SoftCrossEntropyLoss {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            label_smoothing: 0.0,
        }
    }

    pub fn with_label_smoothing(mut self, label_smoothing: f64) -> Self {
        self.label_smoothing = label_smoothing;
        self
    }

    /// Reads `MODEL.NUM_CLASSES` and `TRAIN.LABEL_SMOOTHING`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.model.num_classes).with_label_smoothing(config.train.label_smoothing)
    }

    pub fn label_smoothing(&self) -> f64 {
        self.label_smoothing
    }

    /// Builds the soft targets this loss was configured for from class indices.
    pub fn targets<B: Backend>(&self, labels: &[usize], device: &B::Device) -> Result<Tensor<B, 2>> {
        smooth_one_hot_labels(labels, self.num_classes, self.label_smoothing, device)
    }

    pub fn forward<B: Backend>(&self, logits: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
        let log_probs = log_softmax(logits, 1);
        (targets.neg() * log_probs).sum_dim(1).mean()
    }
}

impl<B: Backend> LossFn<B> for SoftCrossEntropyLoss {
    fn forward(&self, logits: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
        SoftCrossEntropyLoss::forward(self, logits, targets)
    }

    fn name(&self) -> &'static str {
        "cross_entropy"
    }
}

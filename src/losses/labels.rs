//! Soft target construction.

use burn::tensor::{Tensor, TensorData, backend::Backend};

use crate::errors::{BuildError, Result};

/// Converts class indices to smoothed one-hot targets.
///
/// The true class gets `1 - smoothing + smoothing / num_classes` and every
/// other class `smoothing / num_classes`, so each row sums to one.
pub fn smooth_one_hot_labels<B: Backend>(
    labels: &[usize],
    num_classes: usize,
    smoothing: f64,
    device: &B::Device,
) -> Result<Tensor<B, 2>> {
    if num_classes == 0 {
        return Err(BuildError::invalid_config("num_classes must be positive"));
    }
    if !(0.0..1.0).contains(&smoothing) {
        return Err(BuildError::invalid_config(format!(
            "label smoothing {smoothing} is outside [0, 1)"
        )));
    }
    if let Some(&label) = labels.iter().find(|&&label| label >= num_classes) {
        return Err(BuildError::InvalidLabel { label, num_classes });
    }

    let off = (smoothing / num_classes as f64) as f32;
    let on = (1.0 - smoothing) as f32 + off;
    let mut values = vec![off; labels.len() * num_classes];
    for (row, &label) in labels.iter().enumerate() {
        values[row * num_classes + label] = on;
    }

    let data = TensorData::new(values, [labels.len(), num_classes]);
    Ok(Tensor::from_data(data, device))
}

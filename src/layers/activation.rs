//! Activation functions for network layers.

use burn::tensor::{Tensor, backend::Backend};
use serde::{Deserialize, Serialize};

/// Supported activation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// No activation (identity function).
    #[default]
    None,
    /// Rectified Linear Unit: f(x) = max(0, x)
    Relu,
    /// Sigmoid: f(x) = 1 / (1 + exp(-x))
    Sigmoid,
    /// Sigmoid Linear Unit (swish): f(x) = x * sigmoid(x)
    #[serde(alias = "swish")]
    Silu,
    /// Piecewise-linear sigmoid: f(x) = clamp(x + 3, 0, 6) / 6
    HardSigmoid,
    /// f(x) = x * hard_sigmoid(x)
    HardSwish,
    /// Gaussian Error Linear Unit: f(x) = x * 0.5 * (1 + erf(x / sqrt(2)))
    Gelu,
}

impl Activation {
    /// Applies the activation function to a tensor.
    pub fn apply<B: Backend, const D: usize>(&self, tensor: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Activation::None => tensor,
            Activation::Relu => burn::tensor::activation::relu(tensor),
            Activation::Sigmoid => burn::tensor::activation::sigmoid(tensor),
            Activation::Silu => burn::tensor::activation::silu(tensor),
            Activation::HardSigmoid => hard_sigmoid(tensor),
            Activation::HardSwish => tensor.clone() * hard_sigmoid(tensor),
            Activation::Gelu => burn::tensor::activation::gelu(tensor),
        }
    }

    /// Returns the configuration name of the activation.
    pub fn name(&self) -> &'static str {
        match self {
            Activation::None => "none",
            Activation::Relu => "relu",
            Activation::Sigmoid => "sigmoid",
            Activation::Silu => "silu",
            Activation::HardSigmoid => "hard_sigmoid",
            Activation::HardSwish => "hard_swish",
            Activation::Gelu => "gelu",
        }
    }

    /// Converts activation to a numeric ID for storage in Module.
    pub fn to_id(&self) -> u8 {
        match self {
            Activation::None => 0,
            Activation::Relu => 1,
            Activation::Sigmoid => 2,
            Activation::Silu => 3,
            Activation::HardSigmoid => 4,
            Activation::HardSwish => 5,
            Activation::Gelu => 6,
        }
    }

    /// Creates an Activation from a numeric ID.
    pub fn from_id(id: u8) -> Self {
        match id {
            1 => Activation::Relu,
            2 => Activation::Sigmoid,
            3 => Activation::Silu,
            4 => Activation::HardSigmoid,
            5 => Activation::HardSwish,
            6 => Activation::Gelu,
            _ => Activation::None,
        }
    }
}

fn hard_sigmoid<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Tensor<B, D> {
    (tensor + 3.0).clamp(0.0, 6.0) / 6.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::backend::Backend;

    type TestBackend = NdArray;

    fn apply(activation: Activation, values: [f32; 5]) -> Vec<f32> {
        let device = <TestBackend as Backend>::Device::default();
        let input = Tensor::<TestBackend, 1>::from_floats(values, &device);
        activation.apply(input).to_data().to_vec().unwrap()
    }

    #[test]
    fn test_activation_serde_names() {
        let parsed: Activation = serde_yaml::from_str("swish").unwrap();
        assert_eq!(parsed, Activation::Silu);
        let parsed: Activation = serde_yaml::from_str("hard_swish").unwrap();
        assert_eq!(parsed, Activation::HardSwish);
        assert!(serde_yaml::from_str::<Activation>("invalid").is_err());
    }

    #[test]
    fn test_activation_id_and_name_roundtrip() {
        let activations = [
            Activation::None,
            Activation::Relu,
            Activation::Sigmoid,
            Activation::Silu,
            Activation::HardSigmoid,
            Activation::HardSwish,
            Activation::Gelu,
        ];
        for act in activations {
            assert_eq!(Activation::from_id(act.to_id()), act);
            let parsed: Activation = serde_yaml::from_str(act.name()).unwrap();
            assert_eq!(parsed, act);
        }
    }

    #[test]
    fn test_hard_sigmoid_activation() {
        let result = apply(Activation::HardSigmoid, [-4.0, -3.0, 0.0, 3.0, 4.0]);
        let expected = [0.0, 0.0, 0.5, 1.0, 1.0];
        for (r, e) in result.iter().zip(expected) {
            assert!((r - e).abs() < 1e-5, "got {r}, expected {e}");
        }
    }

    #[test]
    fn test_hard_swish_activation() {
        let result = apply(Activation::HardSwish, [-4.0, -1.0, 0.0, 1.0, 4.0]);
        // x * clamp(x + 3, 0, 6) / 6
        let expected = [0.0, -1.0 / 3.0, 0.0, 2.0 / 3.0, 4.0];
        for (r, e) in result.iter().zip(expected) {
            assert!((r - e).abs() < 1e-5, "got {r}, expected {e}");
        }
    }

    #[test]
    fn test_silu_activation() {
        let result = apply(Activation::Silu, [-2.0, -1.0, 0.0, 1.0, 2.0]);
        let expected = [-0.2384, -0.2689, 0.0, 0.7311, 1.7616];
        for (r, e) in result.iter().zip(expected) {
            assert!((r - e).abs() < 1e-3, "got {r}, expected {e}");
        }
    }

    #[test]
    fn test_serde_names() {
        let yaml = serde_yaml::to_string(&Activation::HardSwish).unwrap();
        assert_eq!(yaml.trim(), "hard_swish");
        let parsed: Activation = serde_yaml::from_str("silu").unwrap();
        assert_eq!(parsed, Activation::Silu);
    }
}

//! Builder error types.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, BuildError>;

/// Errors that can occur while configuring or building models and losses.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Model type '{name}' not supported")]
    UnsupportedModel { name: String },

    #[error("Loss function type '{name}' not supported")]
    UnsupportedLoss { name: String },

    #[error("Invalid {arch} architecture: {message}")]
    InvalidArchitecture { arch: &'static str, message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Unknown configuration key: {key}")]
    UnknownConfigKey { key: String },

    #[error("Label {label} out of range for {num_classes} classes")]
    InvalidLabel { label: usize, num_classes: usize },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    pub(crate) fn invalid_arch(arch: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArchitecture {
            arch,
            message: message.into(),
        }
    }

    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns true for the "unsupported identifier" family of errors.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedModel { .. } | Self::UnsupportedLoss { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_messages() {
        let err = BuildError::UnsupportedModel {
            name: "vgg".to_string(),
        };
        assert_eq!(err.to_string(), "Model type 'vgg' not supported");
        assert!(err.is_unsupported());

        let err = BuildError::UnsupportedLoss {
            name: "hinge".to_string(),
        };
        assert_eq!(err.to_string(), "Loss function type 'hinge' not supported");
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_invalid_arch_message() {
        let err = BuildError::invalid_arch("anynet", "no stages");
        assert_eq!(err.to_string(), "Invalid anynet architecture: no stages");
        assert!(!err.is_unsupported());
    }
}

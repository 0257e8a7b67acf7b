//! Error types for configuration, registries and model construction.

mod build_error;

pub use build_error::{BuildError, Result};

use thiserror::Error;

/// The error type for `drn-burn` operations.
///
/// Covers construction-time failures: invalid dilation schedules, unknown model
/// names, and logically inconsistent configurations. Forward passes surface shape
/// errors through the tensor engine and never produce a `DrnError`.
#[derive(Error, Debug)]
pub enum DrnError {
    /// Error for when a layer group is configured with an unsupported dilation.
    /// Dilation must be 1 or an even number.
    #[error("Invalid dilation: {dilation} (must be 1 or even)")]
    InvalidDilation {
        /// The rejected dilation value.
        dilation: usize,
    },

    /// Error for when a model name cannot be resolved to a known architecture.
    #[error("Unknown model name: {name}")]
    UnknownModel {
        /// The unrecognized model name.
        name: String,
    },

    /// Error for when an invalid model configuration is provided.
    #[error("Invalid model configuration: {reason}")]
    InvalidConfiguration {
        /// The reason why the configuration is invalid.
        reason: String,
    },

    /// Error for when a classification or dense forward pass is requested on a
    /// model that was built without a classifier head.
    #[error("Model was built without a classifier head")]
    MissingClassifier,
}

/// A specialized `Result` type for `drn-burn` operations.
pub type DrnResult<T> = Result<T, DrnError>;

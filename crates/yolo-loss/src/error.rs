//! Error types for YOLO loss configuration and input validation.

use thiserror::Error;

/// Errors reported by [`YoloLossConfig::validate`](crate::YoloLossConfig::validate)
/// and [`YoloLoss::try_forward`](crate::YoloLoss::try_forward).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum YoloLossError {
    /// A hyperparameter is outside its valid range.
    #[error("invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        parameter: &'static str,
        reason: String,
    },

    /// Predictions are not `[batch_size, S * S * B * 5]`.
    #[error("predictions must have shape {expected}, got {actual:?}")]
    PredictionShape { expected: String, actual: Vec<usize> },

    /// Targets are not `[batch_size, S, S, >= 5]`.
    #[error("target must have shape {expected}, got {actual:?}")]
    TargetShape { expected: String, actual: Vec<usize> },

    /// Predictions and targets disagree on the batch size.
    #[error("batch size mismatch: predictions have {predictions} images, target has {target}")]
    BatchMismatch { predictions: usize, target: usize },

    /// The batch holds no images.
    #[error("batch must contain at least one image")]
    EmptyBatch,
}

/// A specialized `Result` type for YOLO loss operations.
pub type YoloLossResult<T> = Result<T, YoloLossError>;

//! Error types shared by kernels, the estimator and the localizer.

use thiserror::Error;

/// Failures reported by kernels and robust estimators.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RansacError {
    /// Fewer correspondences than the solver needs.
    #[error("need at least {required} samples, got {actual}")]
    InsufficientSamples { required: usize, actual: usize },
    /// A sample index set is malformed (wrong size, duplicates, out of range).
    #[error("invalid sample: {0}")]
    InvalidSample(String),
    /// No sample drawn during the run produced a valid model.
    #[error("no valid model could be generated in {iterations} iterations")]
    DegenerateData { iterations: usize },
    /// Models were generated but none gathered enough inliers.
    #[error("no solution found after {iterations} iterations (best inlier count {inliers})")]
    NoSolution { iterations: usize, inliers: usize },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// `unnormalize` was called on a model already in the caller's frame.
    #[error("model is already expressed in the original coordinate frame")]
    AlreadyUnnormalized,
    /// The cooperative cancel flag was raised.
    #[error("estimation cancelled after {iterations} iterations")]
    Cancelled { iterations: usize },
    #[error(transparent)]
    Camera(#[from] CameraError),
}

/// Errors raised when updating a camera model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CameraError {
    #[error("expected {expected} intrinsic parameters, got {actual}")]
    ParameterCount { expected: usize, actual: usize },
    #[error("focal length must be positive, got {0}")]
    NonPositiveFocal(f64),
}

pub type Result<T> = std::result::Result<T, RansacError>;

//! Configuration types for the robust estimator and the localizer.

use std::fmt;
use std::str::FromStr;

use crate::error::RansacError;

/// Local optimization strategy run whenever a new best model is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalOptimizationType {
    /// Plain RANSAC, the best minimal hypothesis is kept as is.
    None,
    /// Iteratively reweighted least squares on the inlier set.
    Irls,
    /// Inner RANSAC over non-minimal inlier subsets, each polished by IRLS.
    InnerRansac,
}

/// Robust estimator family used by the localizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimatorKind {
    /// Plain-threshold RANSAC without local optimization.
    Ransac,
    /// LO-RANSAC with IRLS local optimization.
    LoRansac,
}

impl fmt::Display for EstimatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstimatorKind::Ransac => write!(f, "ransac"),
            EstimatorKind::LoRansac => write!(f, "loransac"),
        }
    }
}

impl FromStr for EstimatorKind {
    type Err = RansacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ransac" => Ok(EstimatorKind::Ransac),
            "loransac" | "lo-ransac" => Ok(EstimatorKind::LoRansac),
            other => Err(RansacError::InvalidArgument(format!(
                "unsupported robust estimator '{other}', expected 'ransac' or 'loransac'"
            ))),
        }
    }
}

/// Settings controlling local optimization procedures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalOptimizationSettings {
    /// Reweighting rounds per IRLS call.
    pub irls_iterations: usize,
    /// Non-minimal subsets drawn by the inner RANSAC.
    pub inner_iterations: usize,
    /// Inner subset size as a multiple of the least-squares minimum.
    pub sample_size_multiplier: usize,
    /// The inner RANSAC IRLS starts at `threshold_multiplier * threshold`.
    pub threshold_multiplier: f64,
}

impl Default for LocalOptimizationSettings {
    fn default() -> Self {
        Self {
            irls_iterations: 4,
            inner_iterations: 10,
            sample_size_multiplier: 7,
            threshold_multiplier: std::f64::consts::SQRT_2,
        }
    }
}

/// Main configuration object for a robust estimation run.
#[derive(Debug, Clone, PartialEq)]
pub struct RansacSettings {
    /// Minimum number of iterations, even if the adaptive bound is met.
    pub min_iterations: usize,
    /// Hard cap on the number of iterations.
    pub max_iterations: usize,
    /// Inlier threshold, in the kernel's error units.
    pub inlier_threshold: f64,
    /// Desired confidence in \[0, 1\] of having drawn one all-inlier sample.
    pub confidence: f64,
    /// Floor applied to residuals before computing IRLS weights.
    pub weight_epsilon: f64,
    pub local_optimization: LocalOptimizationType,
    pub local_optimization_settings: LocalOptimizationSettings,
    /// Seed for the sampler. `None` draws one from the OS.
    pub seed: Option<u64>,
}

impl Default for RansacSettings {
    fn default() -> Self {
        Self {
            min_iterations: 0,
            max_iterations: 4096,
            inlier_threshold: 1.0,
            confidence: 0.99,
            weight_epsilon: 0.001,
            local_optimization: LocalOptimizationType::Irls,
            local_optimization_settings: LocalOptimizationSettings::default(),
            seed: None,
        }
    }
}

impl RansacSettings {
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.inlier_threshold = threshold;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_local_optimization(mut self, lo: LocalOptimizationType) -> Self {
        self.local_optimization = lo;
        self
    }

    /// Reject settings the estimator cannot run with.
    pub fn validate(&self) -> Result<(), RansacError> {
        if self.max_iterations == 0 {
            return Err(RansacError::InvalidArgument(
                "max_iterations must be positive".to_string(),
            ));
        }
        if !(self.inlier_threshold > 0.0) {
            return Err(RansacError::InvalidArgument(format!(
                "inlier threshold must be positive, got {}",
                self.inlier_threshold
            )));
        }
        if !(0.0..1.0).contains(&self.confidence) {
            return Err(RansacError::InvalidArgument(format!(
                "confidence must lie in [0, 1), got {}",
                self.confidence
            )));
        }
        if !(self.weight_epsilon > 0.0) {
            return Err(RansacError::InvalidArgument(format!(
                "weight epsilon must be positive, got {}",
                self.weight_epsilon
            )));
        }
        Ok(())
    }
}

/// Options for the nonlinear pose/intrinsics refinement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefineOptions {
    /// Patience handed to Levenberg-Marquardt.
    pub max_iterations: usize,
    /// RMSE (pixels) must drop by more than this to count as an improvement.
    pub min_rmse_decrease: f64,
}

impl Default for RefineOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            min_rmse_decrease: 1e-9,
        }
    }
}

/// Settings used by the localizer.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalizerSettings {
    /// Pixel threshold used when the match data carries no error bound.
    pub default_error_max: f64,
    /// Base settings for the robust estimator. The threshold and the
    /// iteration cap are overridden from the match data.
    pub ransac: RansacSettings,
    pub refine: RefineOptions,
}

impl Default for LocalizerSettings {
    fn default() -> Self {
        Self {
            default_error_max: 4.0,
            ransac: RansacSettings::default(),
            refine: RefineOptions::default(),
        }
    }
}

//! High-level entry points.
//!
//! These functions assemble a kernel and an estimator from
//! [`RansacSettings`] and run it. Thresholds passed to the model-specific
//! helpers are in pixels and converted to the kernel's squared normalized
//! units internally.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use nalgebra::Matrix3;

use crate::choices::{default_termination, LocalOptimizerChoice, SamplerChoice};
use crate::core::{EstimationResult, Kernel, LoRansac};
use crate::error::{RansacError, Result};
use crate::kernel::{DltResectionKernel, FundamentalKernel, HomographyKernel};
use crate::models::{FundamentalMatrix, Homography, ProjectionMatrix};
use crate::scoring::ThresholdScoring;
use crate::settings::RansacSettings;
use crate::types::{DataMatrix, ImageSize};

fn build<K: Kernel>(
    settings: &RansacSettings,
) -> LoRansac<SamplerChoice, ThresholdScoring, LocalOptimizerChoice<K>, crate::choices::TerminationChoice> {
    LoRansac::new(
        settings.clone(),
        SamplerChoice::from_settings(settings),
        ThresholdScoring::new(settings.inlier_threshold),
        LocalOptimizerChoice::from_settings(settings),
        default_termination(settings),
    )
}

/// Run the estimator configured by `settings` on any kernel.
///
/// `settings.inlier_threshold` is interpreted in the kernel's error units.
pub fn estimate<K: Kernel>(kernel: &K, settings: &RansacSettings) -> Result<EstimationResult<K::Model>> {
    build::<K>(settings).run(kernel)
}

/// Same as [`estimate`], polling `cancel` once per iteration.
pub fn estimate_with_cancel<K: Kernel>(
    kernel: &K,
    settings: &RansacSettings,
    cancel: Arc<AtomicBool>,
) -> Result<EstimationResult<K::Model>> {
    build::<K>(settings).with_cancel_flag(cancel).run(kernel)
}

fn pixel_threshold(threshold: f64) -> Result<f64> {
    if threshold > 0.0 && threshold.is_finite() {
        Ok(threshold)
    } else {
        Err(RansacError::InvalidArgument(format!(
            "pixel threshold must be positive and finite, got {threshold}"
        )))
    }
}

/// Estimate a homography from N×2 point correspondences.
///
/// With `image_sizes` the points are preconditioned from the image
/// dimensions, otherwise from the points themselves.
pub fn estimate_homography(
    points1: &DataMatrix,
    points2: &DataMatrix,
    image_sizes: Option<(ImageSize, ImageSize)>,
    threshold: f64,
    settings: Option<RansacSettings>,
) -> Result<EstimationResult<Homography>> {
    let threshold = pixel_threshold(threshold)?;
    let kernel = match image_sizes {
        Some((s1, s2)) => HomographyKernel::new(points1, s1, points2, s2)?,
        None => HomographyKernel::from_points(points1, points2)?,
    };
    let settings = settings
        .unwrap_or_default()
        .with_threshold(kernel.normalize_threshold(threshold));
    estimate(&kernel, &settings)
}

/// Estimate a fundamental matrix from N×2 point correspondences.
pub fn estimate_fundamental_matrix(
    points1: &DataMatrix,
    points2: &DataMatrix,
    image_sizes: Option<(ImageSize, ImageSize)>,
    threshold: f64,
    settings: Option<RansacSettings>,
) -> Result<EstimationResult<FundamentalMatrix>> {
    let threshold = pixel_threshold(threshold)?;
    let kernel = match image_sizes {
        Some((s1, s2)) => FundamentalKernel::new(points1, s1, points2, s2)?,
        None => FundamentalKernel::from_points(points1, points2)?,
    };
    let settings = settings
        .unwrap_or_default()
        .with_threshold(kernel.normalize_threshold(threshold));
    estimate(&kernel, &settings)
}

/// Estimate a camera projection matrix from N×2 image points and N×3 world
/// points.
///
/// With a calibration matrix the image points are normalized by `K^-1`,
/// otherwise they are preconditioned from `image_size`.
pub fn estimate_resection(
    points2d: &DataMatrix,
    points3d: &DataMatrix,
    intrinsics: Option<&Matrix3<f64>>,
    image_size: ImageSize,
    threshold: f64,
    settings: Option<RansacSettings>,
) -> Result<EstimationResult<ProjectionMatrix>> {
    let threshold = pixel_threshold(threshold)?;
    let kernel = match intrinsics {
        Some(k) => DltResectionKernel::with_intrinsics(points2d, points3d, k)?,
        None => DltResectionKernel::uncalibrated(points2d, points3d, image_size)?,
    };
    let settings = settings
        .unwrap_or_default()
        .with_threshold(kernel.normalize_threshold(threshold));
    estimate(&kernel, &settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;
    use std::sync::atomic::Ordering;

    fn grid_correspondences() -> (DataMatrix, DataMatrix) {
        let h = Matrix3::new(1.0, 0.0, 5.0, 0.0, 1.0, -3.0, 0.0, 0.0, 1.0);
        let n = 16;
        let mut x1 = DataMatrix::zeros(n, 2);
        let mut x2 = DataMatrix::zeros(n, 2);
        for i in 0..n {
            let (u, v) = (10.0 * (i % 4) as f64, 10.0 * (i / 4) as f64);
            let p = h * Vector3::new(u, v, 1.0);
            x1[(i, 0)] = u;
            x1[(i, 1)] = v;
            x2[(i, 0)] = p.x;
            x2[(i, 1)] = p.y;
        }
        (x1, x2)
    }

    #[test]
    fn homography_without_image_sizes() {
        let (x1, x2) = grid_correspondences();
        let settings = RansacSettings::default().with_seed(1);
        let result = estimate_homography(&x1, &x2, None, 1.0, Some(settings)).unwrap();
        assert_eq!(result.inliers.len(), 16);
        assert!((result.model.h[(0, 2)] - 5.0).abs() < 1e-8);
        assert!((result.model.h[(1, 2)] + 3.0).abs() < 1e-8);
    }

    #[test]
    fn rejects_non_positive_threshold() {
        let (x1, x2) = grid_correspondences();
        assert!(matches!(
            estimate_homography(&x1, &x2, None, 0.0, None),
            Err(RansacError::InvalidArgument(_))
        ));
    }

    #[test]
    fn cancelled_run_reports_cancellation() {
        let (x1, x2) = grid_correspondences();
        let kernel = HomographyKernel::from_points(&x1, &x2).unwrap();
        let flag = Arc::new(AtomicBool::new(false));
        flag.store(true, Ordering::Relaxed);
        let settings = RansacSettings::default().with_threshold(1e-4).with_seed(2);
        assert_eq!(
            estimate_with_cancel(&kernel, &settings, flag).unwrap_err(),
            RansacError::Cancelled { iterations: 0 }
        );
    }
}

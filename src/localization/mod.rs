//! Camera localization from 2D-3D correspondences.
//!
//! [`localize_from_matches`] runs the robust resection on caller-supplied
//! correspondences. [`refine_pose`] polishes the result by minimizing the
//! reprojection error. The [`Localizer`] trait adds a matching front end on
//! top, see [`TrackObservationLocalizer`].

mod matcher;
mod track;

pub use matcher::{BruteForceMatcher, DescriptorMatch, DescriptorMatcher};
pub use track::{Landmark, QueryRegions, TrackObservationLocalizer};

use log::{debug, info};
use nalgebra::{Vector2, Vector3};

use crate::api::estimate;
use crate::bundle_adjustment::{refine, RefineBlocks, ReprojectionCost};
use crate::camera::Intrinsics;
use crate::error::{RansacError, Result};
use crate::kernel::DltResectionKernel;
use crate::models::AbsolutePose;
use crate::settings::{EstimatorKind, LocalOptimizationType, LocalizerSettings, RefineOptions};
use crate::types::{check_indices, DataMatrix, ImageSize, Mat34};

/// 2D-3D correspondences of one image and the resection result.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchData {
    /// Estimated camera matrix, in pixels.
    pub projection_matrix: Mat34,
    /// N×2 observed (distorted) pixel positions.
    pub pt2d: DataMatrix,
    /// N×3 world points.
    pub pt3d: DataMatrix,
    /// Rows of `pt2d`/`pt3d` consistent with `projection_matrix`.
    pub inliers: Vec<usize>,
    /// Inlier threshold in pixels. Infinite means "use the default".
    pub error_max: f64,
    pub max_iteration: usize,
}

impl MatchData {
    pub fn new(pt2d: DataMatrix, pt3d: DataMatrix) -> Self {
        Self {
            projection_matrix: Mat34::zeros(),
            pt2d,
            pt3d,
            inliers: Vec::new(),
            error_max: f64::INFINITY,
            max_iteration: 4096,
        }
    }

    pub fn from_correspondences(pt2d: &[Vector2<f64>], pt3d: &[Vector3<f64>]) -> Self {
        let p2 = DataMatrix::from_fn(pt2d.len(), 2, |i, j| pt2d[i][j]);
        let p3 = DataMatrix::from_fn(pt3d.len(), 3, |i, j| pt3d[i][j]);
        Self::new(p2, p3)
    }

    pub fn len(&self) -> usize {
        self.pt2d.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_shapes(&self) -> Result<()> {
        if self.pt2d.ncols() != 2 || self.pt3d.ncols() != 3 || self.pt2d.nrows() != self.pt3d.nrows() {
            return Err(RansacError::InvalidArgument(format!(
                "match data holds {}×{} image points and {}×{} world points",
                self.pt2d.nrows(),
                self.pt2d.ncols(),
                self.pt3d.nrows(),
                self.pt3d.ncols()
            )));
        }
        Ok(())
    }

    fn point2d(&self, i: usize) -> Vector2<f64> {
        Vector2::new(self.pt2d[(i, 0)], self.pt2d[(i, 1)])
    }

    fn point3d(&self, i: usize) -> Vector3<f64> {
        Vector3::new(self.pt3d[(i, 0)], self.pt3d[(i, 1)], self.pt3d[(i, 2)])
    }
}

/// Localizes query images against a database of landmarks.
pub trait Localizer {
    /// Build the matching database. Replaces any previous one.
    fn init(&mut self, landmarks: Vec<Landmark>) -> Result<()>;

    /// Match `query` against the database and estimate the camera pose.
    ///
    /// Returns the pose and the match data it was estimated from.
    fn localize(
        &self,
        image_size: ImageSize,
        intrinsics: Option<&dyn Intrinsics>,
        query: &QueryRegions,
    ) -> Result<(AbsolutePose, MatchData)>;
}

/// Estimate the camera pose from the correspondences stored in `data`.
///
/// With `intrinsics` the observations are undistorted and normalized by the
/// calibration, otherwise the camera matrix is estimated in pixels and the
/// calibration is recovered from its decomposition. LO-RANSAC needs known
/// intrinsics.
///
/// On success `data.projection_matrix`, `data.inliers` and `data.error_max`
/// are updated. On failure `data` is left untouched.
pub fn localize_from_matches(
    image_size: ImageSize,
    intrinsics: Option<&dyn Intrinsics>,
    data: &mut MatchData,
    estimator: EstimatorKind,
    settings: &LocalizerSettings,
) -> Result<AbsolutePose> {
    data.check_shapes()?;
    if estimator == EstimatorKind::LoRansac && intrinsics.is_none() {
        return Err(RansacError::InvalidArgument(
            "LO-RANSAC localization requires known intrinsics".to_string(),
        ));
    }

    let error_max = if data.error_max.is_finite() {
        data.error_max
    } else {
        settings.default_error_max
    };
    if !(error_max > 0.0) {
        return Err(RansacError::InvalidArgument(format!(
            "pixel threshold must be positive, got {error_max}"
        )));
    }

    let kernel = match intrinsics {
        Some(camera) => {
            let mut pts = data.pt2d.clone();
            if camera.has_distortion() {
                for i in 0..pts.nrows() {
                    let p = camera.get_undistorted_pixel(&data.point2d(i));
                    pts[(i, 0)] = p.x;
                    pts[(i, 1)] = p.y;
                }
            }
            DltResectionKernel::with_intrinsics(&pts, &data.pt3d, &camera.k_matrix())?
        }
        None => DltResectionKernel::uncalibrated(&data.pt2d, &data.pt3d, image_size)?,
    };

    let mut ransac = settings
        .ransac
        .clone()
        .with_threshold(kernel.normalize_threshold(error_max))
        .with_max_iterations(data.max_iteration);
    ransac.local_optimization = match estimator {
        EstimatorKind::Ransac => LocalOptimizationType::None,
        EstimatorKind::LoRansac if ransac.local_optimization == LocalOptimizationType::None => {
            LocalOptimizationType::Irls
        }
        EstimatorKind::LoRansac => ransac.local_optimization,
    };
    debug!(
        "localizing from {} matches with {estimator}, threshold {error_max} px",
        data.len()
    );

    let result = estimate(&kernel, &ransac)?;
    let (_, r, t) = result.model.decompose().ok_or(RansacError::NoSolution {
        iterations: result.iterations,
        inliers: result.inliers.len(),
    })?;

    info!(
        "localized with {} inliers out of {} matches in {} iterations",
        result.inliers.len(),
        data.len(),
        result.iterations
    );
    data.projection_matrix = result.model.p;
    data.inliers = result.inliers;
    data.error_max = error_max;
    Ok(AbsolutePose::from_rt(r, t))
}

/// Refine `pose` and/or `intrinsics` on the inliers of `data`.
///
/// Returns `Ok(true)` and updates the enabled blocks when the pixel RMSE
/// drops by more than `options.min_rmse_decrease`. Otherwise both inputs are
/// left as they were and `Ok(false)` is returned.
pub fn refine_pose(
    intrinsics: &mut dyn Intrinsics,
    pose: &mut AbsolutePose,
    data: &MatchData,
    refine_pose: bool,
    refine_intrinsics: bool,
    options: &RefineOptions,
) -> Result<bool> {
    let blocks = RefineBlocks {
        pose: refine_pose,
        intrinsics: refine_intrinsics,
    };
    if !blocks.any() {
        return Ok(false);
    }
    data.check_shapes()?;
    check_indices(&data.inliers, data.len()).map_err(RansacError::InvalidArgument)?;

    let points2d = data.inliers.iter().map(|&i| data.point2d(i)).collect();
    let points3d = data.inliers.iter().map(|&i| data.point3d(i)).collect();
    let cost = ReprojectionCost::new(&*intrinsics, pose, points2d, points3d, blocks)?;
    let outcome = refine(&cost, options)?;
    if !outcome.improved(options.min_rmse_decrease) {
        debug!(
            "refinement rejected: rmse {} -> {} px",
            outcome.rmse_before, outcome.rmse_after
        );
        return Ok(false);
    }

    if refine_intrinsics {
        intrinsics.set_params(&outcome.intrinsics_params)?;
    }
    if refine_pose {
        *pose = outcome.pose;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{Pinhole, PinholeRadialK1};
    use crate::settings::RansacSettings;

    fn world_points(n: usize) -> Vec<Vector3<f64>> {
        (0..n)
            .map(|i| {
                let fi = i as f64;
                Vector3::new((fi * 1.9).sin() * 2.0, (fi * 0.8).cos() * 1.5, (fi * 2.3).cos())
            })
            .collect()
    }

    fn ground_truth_pose() -> AbsolutePose {
        AbsolutePose::from_scaled_axis(Vector3::new(0.1, -0.05, 0.2), Vector3::new(-0.3, 0.2, 6.0))
    }

    fn seeded() -> LocalizerSettings {
        LocalizerSettings {
            ransac: RansacSettings::default().with_seed(11),
            ..LocalizerSettings::default()
        }
    }

    fn observe(camera: &dyn Intrinsics, pose: &AbsolutePose, n: usize) -> MatchData {
        let p3 = world_points(n);
        let p2: Vec<_> = p3.iter().map(|x| camera.project(pose, x)).collect();
        MatchData::from_correspondences(&p2, &p3)
    }

    #[test]
    fn lo_ransac_requires_intrinsics() {
        let camera = Pinhole::new(640, 480, 500.0, 320.0, 240.0);
        let mut data = observe(&camera, &ground_truth_pose(), 10);
        let before = data.clone();
        let res = localize_from_matches((640, 480), None, &mut data, EstimatorKind::LoRansac, &seeded());
        assert!(matches!(res, Err(RansacError::InvalidArgument(_))));
        assert_eq!(data, before);
    }

    #[test]
    fn distorted_observations_are_undistorted_first() {
        let camera = PinholeRadialK1::new(640, 480, 500.0, 320.0, 240.0, -0.08);
        let pose = ground_truth_pose();
        let mut data = observe(&camera, &pose, 20);
        let found = localize_from_matches(
            (640, 480),
            Some(&camera),
            &mut data,
            EstimatorKind::LoRansac,
            &seeded(),
        )
        .unwrap();
        assert_eq!(data.inliers.len(), 20);
        assert_eq!(data.error_max, 4.0);
        assert!(found.rotation_error(&pose) < 1e-6);
        assert!(found.translation_error(&pose) < 1e-5);
    }

    #[test]
    fn uncalibrated_ransac_recovers_pose() {
        let camera = Pinhole::new(640, 480, 500.0, 320.0, 240.0);
        let pose = ground_truth_pose();
        let mut data = observe(&camera, &pose, 12);
        data.error_max = 2.0;
        let found =
            localize_from_matches((640, 480), None, &mut data, EstimatorKind::Ransac, &seeded()).unwrap();
        assert_eq!(data.inliers.len(), 12);
        assert_eq!(data.error_max, 2.0);
        assert!(found.rotation_error(&pose) < 1e-6);
        assert!(found.translation_error(&pose) < 1e-5);
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let mut data = MatchData::new(DataMatrix::zeros(6, 2), DataMatrix::zeros(5, 3));
        let res = localize_from_matches((640, 480), None, &mut data, EstimatorKind::Ransac, &seeded());
        assert!(matches!(res, Err(RansacError::InvalidArgument(_))));
    }

    #[test]
    fn refine_without_blocks_does_nothing() {
        let mut camera = Pinhole::new(640, 480, 500.0, 320.0, 240.0);
        let mut pose = ground_truth_pose();
        let data = observe(&camera, &pose, 8);
        let refined = refine_pose(&mut camera, &mut pose, &data, false, false, &RefineOptions::default());
        assert_eq!(refined, Ok(false));
    }

    #[test]
    fn refine_rejects_bad_inlier_indices() {
        let mut camera = Pinhole::new(640, 480, 500.0, 320.0, 240.0);
        let mut pose = ground_truth_pose();
        let mut data = observe(&camera, &pose, 8);
        data.inliers = vec![0, 8];
        assert!(matches!(
            refine_pose(&mut camera, &mut pose, &data, true, false, &RefineOptions::default()),
            Err(RansacError::InvalidArgument(_))
        ));
    }

    #[test]
    fn refine_intrinsics_updates_camera() {
        let truth = Pinhole::new(640, 480, 500.0, 320.0, 240.0);
        let pose = ground_truth_pose();
        let mut data = observe(&truth, &pose, 16);
        data.inliers = (0..16).collect();

        let mut camera = Pinhole::new(640, 480, 520.0, 322.0, 238.0);
        let mut refined_pose = pose.clone();
        let improved = refine_pose(
            &mut camera,
            &mut refined_pose,
            &data,
            false,
            true,
            &RefineOptions::default(),
        )
        .unwrap();
        assert!(improved);
        assert!((camera.focal - 500.0).abs() < 1e-4);
        assert_eq!(refined_pose, pose);
    }
}

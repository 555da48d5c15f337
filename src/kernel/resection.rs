//! Resection kernel for 2D-3D correspondences.

use nalgebra::Matrix3;

use crate::conditioning::{apply_transform, normalization_from_image_size, select_rows};
use crate::core::{validate_sample, ErrorMetric, Kernel, Solver};
use crate::error::{RansacError, Result};
use crate::estimators::{ReprojectionError, ResectionDltSolver};
use crate::models::{Model, ProjectionMatrix};
use crate::types::{DataMatrix, ImageSize};

use super::{check_weights, mark_unnormalized, retain_valid};

/// Kernel estimating a projection matrix from N×2 image points and N×3
/// world points.
///
/// Image points are mapped through a normalizing transform `T`: `K^-1` when
/// the calibration is known, the image-size preconditioner otherwise.
/// Unnormalizing applies `P = T^-1 * P`, i.e. `P = K * P` in the calibrated
/// case.
pub struct ResectionKernel<S, SLS, E> {
    x2d: DataMatrix,
    x3d: DataMatrix,
    t: Matrix3<f64>,
    t_inv: Matrix3<f64>,
    solver: S,
    solver_ls: SLS,
    metric: E,
}

pub type DltResectionKernel = ResectionKernel<ResectionDltSolver, ResectionDltSolver, ReprojectionError>;

impl<S, SLS, E> ResectionKernel<S, SLS, E>
where
    S: Solver<Model = ProjectionMatrix>,
    SLS: Solver<Model = ProjectionMatrix>,
    E: ErrorMetric<ProjectionMatrix>,
{
    pub fn with_components(
        x2d: &DataMatrix,
        x3d: &DataMatrix,
        t: Matrix3<f64>,
        solver: S,
        solver_ls: SLS,
        metric: E,
    ) -> Result<Self> {
        if x2d.nrows() != x3d.nrows() {
            return Err(RansacError::InvalidArgument(format!(
                "{} image points for {} world points",
                x2d.nrows(),
                x3d.nrows()
            )));
        }
        if x2d.ncols() != 2 || x3d.ncols() != 3 {
            return Err(RansacError::InvalidArgument(
                "resection expects N×2 image points and N×3 world points".to_string(),
            ));
        }
        if solver_ls.minimum_samples() < solver.minimum_samples() {
            return Err(RansacError::InvalidArgument(
                "least-squares solver needs fewer samples than the minimal solver".to_string(),
            ));
        }
        let t_inv = t.try_inverse().ok_or_else(|| {
            RansacError::InvalidArgument("normalizing transform is singular".to_string())
        })?;
        Ok(Self {
            x2d: apply_transform(x2d, &t),
            x3d: x3d.clone(),
            t,
            t_inv,
            solver,
            solver_ls,
            metric,
        })
    }

    /// Normalizing transform applied to the image points.
    pub fn transform(&self) -> &Matrix3<f64> {
        &self.t
    }

    /// Convert a pixel threshold to the kernel's squared normalized units.
    pub fn normalize_threshold(&self, pixels: f64) -> f64 {
        (pixels * self.t[(0, 0)]).powi(2)
    }
}

impl<S, SLS, E> ResectionKernel<S, SLS, E>
where
    S: Solver<Model = ProjectionMatrix> + Default,
    SLS: Solver<Model = ProjectionMatrix> + Default,
    E: ErrorMetric<ProjectionMatrix> + Default,
{
    /// Known calibration: image points are normalized by `K^-1`.
    pub fn with_intrinsics(x2d: &DataMatrix, x3d: &DataMatrix, k: &Matrix3<f64>) -> Result<Self> {
        let k_inv = k.try_inverse().ok_or_else(|| {
            RansacError::InvalidArgument("calibration matrix is singular".to_string())
        })?;
        Self::with_components(x2d, x3d, k_inv, S::default(), SLS::default(), E::default())
    }

    /// Unknown calibration: image points are preconditioned from the image
    /// size.
    pub fn uncalibrated(x2d: &DataMatrix, x3d: &DataMatrix, image_size: ImageSize) -> Result<Self> {
        let t = normalization_from_image_size(image_size.0 as f64, image_size.1 as f64);
        Self::with_components(x2d, x3d, t, S::default(), SLS::default(), E::default())
    }
}

impl<S, SLS, E> Kernel for ResectionKernel<S, SLS, E>
where
    S: Solver<Model = ProjectionMatrix>,
    SLS: Solver<Model = ProjectionMatrix>,
    E: ErrorMetric<ProjectionMatrix>,
{
    type Model = ProjectionMatrix;

    fn num_samples(&self) -> usize {
        self.x2d.nrows()
    }

    fn minimum_samples(&self) -> usize {
        self.solver.minimum_samples()
    }

    fn minimum_ls_samples(&self) -> usize {
        self.solver_ls.minimum_samples()
    }

    fn fit(&self, samples: &[usize]) -> Result<Vec<ProjectionMatrix>> {
        validate_sample(samples, self.num_samples(), self.minimum_samples(), true)?;
        let models = self.solver.solve(
            &select_rows(&self.x2d, samples),
            &select_rows(&self.x3d, samples),
            None,
        );
        Ok(retain_valid(models, |m| self.solver.is_valid_model(m)))
    }

    fn fit_ls(&self, inliers: &[usize], weights: Option<&[f64]>) -> Result<Vec<ProjectionMatrix>> {
        validate_sample(inliers, self.num_samples(), self.minimum_ls_samples(), false)?;
        check_weights(inliers, weights)?;
        let models = self.solver_ls.solve(
            &select_rows(&self.x2d, inliers),
            &select_rows(&self.x3d, inliers),
            weights,
        );
        Ok(retain_valid(models, |m| self.solver_ls.is_valid_model(m)))
    }

    fn error(&self, sample: usize, model: &ProjectionMatrix) -> f64 {
        self.metric.error(model, &self.x2d, &self.x3d, sample)
    }

    fn unnormalize(&self, model: &mut ProjectionMatrix) -> Result<()> {
        mark_unnormalized(model, |m| m.p = self.t_inv * m.p)
    }

    fn is_valid_model(&self, model: &ProjectionMatrix) -> bool {
        model.is_finite() && self.solver.is_valid_model(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CoordinateFrame;
    use approx::assert_relative_eq;
    use nalgebra::{Rotation3, Vector3};

    fn scene(k: &Matrix3<f64>) -> (DataMatrix, DataMatrix, Matrix3<f64>, Vector3<f64>) {
        let r = *Rotation3::from_euler_angles(-0.1, 0.25, 0.05).matrix();
        let t = Vector3::new(-0.2, 0.1, 6.0);
        let p = ProjectionMatrix::from_krt(k, &r, &t);
        let n = 10;
        let mut x2d = DataMatrix::zeros(n, 2);
        let mut x3d = DataMatrix::zeros(n, 3);
        for i in 0..n {
            let fi = i as f64;
            let w = Vector3::new((fi * 2.1).sin() * 2.0, (fi * 1.7).cos() * 1.5, (fi * 0.6).cos());
            let h = p.p * w.push(1.0);
            x2d[(i, 0)] = h.x / h.z;
            x2d[(i, 1)] = h.y / h.z;
            for j in 0..3 {
                x3d[(i, j)] = w[j];
            }
        }
        (x2d, x3d, r, t)
    }

    #[test]
    fn calibrated_fit_recovers_pose() {
        let k = Matrix3::new(700.0, 0.0, 320.0, 0.0, 700.0, 240.0, 0.0, 0.0, 1.0);
        let (x2d, x3d, r, t) = scene(&k);
        let kernel = DltResectionKernel::with_intrinsics(&x2d, &x3d, &k).unwrap();
        assert_eq!(kernel.minimum_samples(), 6);

        let mut model = kernel.fit(&[0, 2, 4, 6, 8, 9]).unwrap().remove(0);
        assert!(kernel.is_valid_model(&model));
        assert!(kernel.errors(&model).iter().all(|e| *e < 1e-18));

        kernel.unnormalize(&mut model).unwrap();
        assert_eq!(model.frame(), CoordinateFrame::Original);
        let (k2, r2, t2) = model.decompose().unwrap();
        assert_relative_eq!(k2, k, epsilon = 1e-6);
        assert_relative_eq!(r2, r, epsilon = 1e-9);
        assert_relative_eq!(t2, t, epsilon = 1e-8);

        assert_eq!(
            kernel.unnormalize(&mut model),
            Err(RansacError::AlreadyUnnormalized)
        );
    }

    #[test]
    fn uncalibrated_kernel_reprojects_in_pixels() {
        let k = Matrix3::new(500.0, 0.0, 200.0, 0.0, 520.0, 150.0, 0.0, 0.0, 1.0);
        let (x2d, x3d, _, _) = scene(&k);
        let kernel = DltResectionKernel::uncalibrated(&x2d, &x3d, (400, 300)).unwrap();
        let inliers: Vec<usize> = (0..10).collect();
        let mut model = kernel.fit_ls(&inliers, Some(&[1.0; 10])).unwrap().remove(0);
        kernel.unnormalize(&mut model).unwrap();
        for i in 0..10 {
            let h = model.p * Vector3::new(x3d[(i, 0)], x3d[(i, 1)], x3d[(i, 2)]).push(1.0);
            assert_relative_eq!(h.x / h.z, x2d[(i, 0)], epsilon = 1e-6);
            assert_relative_eq!(h.y / h.z, x2d[(i, 1)], epsilon = 1e-6);
        }
    }

    #[test]
    fn rejects_malformed_inputs() {
        let x2d = DataMatrix::zeros(6, 2);
        let x3d = DataMatrix::zeros(5, 3);
        assert!(DltResectionKernel::with_intrinsics(&x2d, &x3d, &Matrix3::identity()).is_err());
        let x3d = DataMatrix::zeros(6, 3);
        assert!(DltResectionKernel::with_intrinsics(&x2d, &x3d, &Matrix3::zeros()).is_err());
    }

    struct FourPointSolver;

    impl Solver for FourPointSolver {
        type Model = ProjectionMatrix;

        fn minimum_samples(&self) -> usize {
            4
        }

        fn solve(&self, _x1: &DataMatrix, _x2: &DataMatrix, _weights: Option<&[f64]>) -> Vec<ProjectionMatrix> {
            Vec::new()
        }
    }

    #[test]
    fn least_squares_solver_must_not_need_fewer_samples() {
        let x2d = DataMatrix::zeros(6, 2);
        let x3d = DataMatrix::zeros(6, 3);
        let res = ResectionKernel::with_components(
            &x2d,
            &x3d,
            Matrix3::identity(),
            ResectionDltSolver,
            FourPointSolver,
            ReprojectionError,
        );
        assert!(matches!(res, Err(RansacError::InvalidArgument(_))));
    }
}

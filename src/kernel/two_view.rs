//! Symmetric two-view kernel (homography, fundamental matrix).

use nalgebra::Matrix3;

use crate::conditioning::{
    apply_transform, normalization_from_image_size, normalization_from_points, select_rows,
};
use crate::core::{validate_sample, ErrorMetric, Kernel, Solver, Unnormalizer};
use crate::error::{RansacError, Result};
use crate::estimators::{
    FundamentalEightPointSolver, FundamentalSevenPointSolver, FundamentalUnnormalizer,
    HomographyDltSolver, HomographyUnnormalizer, SampsonError, TransferError,
};
use crate::types::{DataMatrix, ImageSize};

use super::{check_weights, mark_unnormalized, retain_valid};

/// Kernel over two N×2 point sets related by a planar or epipolar model.
///
/// - `S` minimal solver, `SLS` least-squares solver
/// - `E` per-correspondence error
/// - `U` maps models back through the two normalizing transforms
pub struct TwoViewKernel<S, SLS, E, U> {
    x1: DataMatrix,
    x2: DataMatrix,
    t1: Matrix3<f64>,
    t2: Matrix3<f64>,
    solver: S,
    solver_ls: SLS,
    metric: E,
    unnormalizer: U,
}

pub type HomographyKernel =
    TwoViewKernel<HomographyDltSolver, HomographyDltSolver, TransferError, HomographyUnnormalizer>;

pub type FundamentalKernel = TwoViewKernel<
    FundamentalSevenPointSolver,
    FundamentalEightPointSolver,
    SampsonError,
    FundamentalUnnormalizer,
>;

impl<S, SLS, E, U> TwoViewKernel<S, SLS, E, U>
where
    S: Solver,
    SLS: Solver<Model = S::Model>,
    E: ErrorMetric<S::Model>,
    U: Unnormalizer<S::Model>,
{
    /// Build a kernel from explicit normalizing transforms for each view.
    #[allow(clippy::too_many_arguments)]
    pub fn with_transforms(
        x1: &DataMatrix,
        t1: Matrix3<f64>,
        x2: &DataMatrix,
        t2: Matrix3<f64>,
        solver: S,
        solver_ls: SLS,
        metric: E,
        unnormalizer: U,
    ) -> Result<Self> {
        if x1.nrows() != x2.nrows() {
            return Err(RansacError::InvalidArgument(format!(
                "point sets differ in size: {} vs {}",
                x1.nrows(),
                x2.nrows()
            )));
        }
        if x1.ncols() != 2 || x2.ncols() != 2 {
            return Err(RansacError::InvalidArgument(
                "two-view points must be N×2".to_string(),
            ));
        }
        if solver_ls.minimum_samples() < solver.minimum_samples() {
            return Err(RansacError::InvalidArgument(
                "least-squares solver needs fewer samples than the minimal solver".to_string(),
            ));
        }
        Ok(Self {
            x1: apply_transform(x1, &t1),
            x2: apply_transform(x2, &t2),
            t1,
            t2,
            solver,
            solver_ls,
            metric,
            unnormalizer,
        })
    }

    /// Transforms applied to the first and second point sets.
    pub fn transforms(&self) -> (&Matrix3<f64>, &Matrix3<f64>) {
        (&self.t1, &self.t2)
    }

    /// Normalized copies of the two point sets.
    pub fn normalized_points(&self) -> (&DataMatrix, &DataMatrix) {
        (&self.x1, &self.x2)
    }

    /// Convert a pixel threshold in the second image to the kernel's squared
    /// normalized units.
    pub fn normalize_threshold(&self, pixels: f64) -> f64 {
        (pixels * self.t2[(0, 0)]).powi(2)
    }
}

impl<S, SLS, E, U> TwoViewKernel<S, SLS, E, U>
where
    S: Solver + Default,
    SLS: Solver<Model = S::Model> + Default,
    E: ErrorMetric<S::Model> + Default,
    U: Unnormalizer<S::Model> + Default,
{
    /// Normalize each view with the image-size preconditioner.
    pub fn new(x1: &DataMatrix, size1: ImageSize, x2: &DataMatrix, size2: ImageSize) -> Result<Self> {
        Self::with_transforms(
            x1,
            normalization_from_image_size(size1.0 as f64, size1.1 as f64),
            x2,
            normalization_from_image_size(size2.0 as f64, size2.1 as f64),
            S::default(),
            SLS::default(),
            E::default(),
            U::default(),
        )
    }

    /// Normalize each view from its own points (isotropic scaling), for
    /// callers that do not know the image sizes.
    pub fn from_points(x1: &DataMatrix, x2: &DataMatrix) -> Result<Self> {
        Self::with_transforms(
            x1,
            normalization_from_points(x1),
            x2,
            normalization_from_points(x2),
            S::default(),
            SLS::default(),
            E::default(),
            U::default(),
        )
    }
}

impl<S, SLS, E, U> Kernel for TwoViewKernel<S, SLS, E, U>
where
    S: Solver,
    SLS: Solver<Model = S::Model>,
    E: ErrorMetric<S::Model>,
    U: Unnormalizer<S::Model>,
{
    type Model = S::Model;

    fn num_samples(&self) -> usize {
        self.x1.nrows()
    }

    fn minimum_samples(&self) -> usize {
        self.solver.minimum_samples()
    }

    fn minimum_ls_samples(&self) -> usize {
        self.solver_ls.minimum_samples()
    }

    fn fit(&self, samples: &[usize]) -> Result<Vec<Self::Model>> {
        validate_sample(samples, self.num_samples(), self.minimum_samples(), true)?;
        let x1 = select_rows(&self.x1, samples);
        let x2 = select_rows(&self.x2, samples);
        let models = self.solver.solve(&x1, &x2, None);
        Ok(retain_valid(models, |m| self.solver.is_valid_model(m)))
    }

    fn fit_ls(&self, inliers: &[usize], weights: Option<&[f64]>) -> Result<Vec<Self::Model>> {
        validate_sample(inliers, self.num_samples(), self.minimum_ls_samples(), false)?;
        check_weights(inliers, weights)?;
        let x1 = select_rows(&self.x1, inliers);
        let x2 = select_rows(&self.x2, inliers);
        let models = self.solver_ls.solve(&x1, &x2, weights);
        Ok(retain_valid(models, |m| self.solver_ls.is_valid_model(m)))
    }

    fn error(&self, sample: usize, model: &Self::Model) -> f64 {
        self.metric.error(model, &self.x1, &self.x2, sample)
    }

    fn unnormalize(&self, model: &mut Self::Model) -> Result<()> {
        mark_unnormalized(model, |m| {
            self.unnormalizer.unnormalize(m, &self.t1, &self.t2)
        })
    }

    fn is_valid_model(&self, model: &Self::Model) -> bool {
        crate::models::Model::is_finite(model) && self.solver.is_valid_model(model)
    }
}

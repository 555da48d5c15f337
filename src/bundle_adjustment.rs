//! Nonlinear refinement of a camera pose and its intrinsics.
//!
//! The reprojection cost is exposed through argmin's [`CostFunction`] as the
//! pixel RMSE, and minimized with Levenberg-Marquardt over a flat parameter
//! vector built from the enabled blocks:
//!
//! - pose block: angle-axis rotation (3) followed by the translation (3),
//! - intrinsics block: [`Intrinsics::params`].

use argmin::core::{ArgminError, CostFunction};
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use log::debug;
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn, Vector2, Vector3};

use crate::camera::Intrinsics;
use crate::error::{RansacError, Result};
use crate::models::AbsolutePose;
use crate::settings::RefineOptions;

const POSE_PARAMS: usize = 6;

/// Which parameter blocks are free during refinement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefineBlocks {
    pub pose: bool,
    pub intrinsics: bool,
}

impl RefineBlocks {
    pub fn any(&self) -> bool {
        self.pose || self.intrinsics
    }
}

/// Pixel reprojection error of a set of 2D-3D observations.
///
/// Blocks that are not refined stay at the values of the camera and pose the
/// cost was built from.
pub struct ReprojectionCost {
    camera: Box<dyn Intrinsics>,
    pose: AbsolutePose,
    points2d: Vec<Vector2<f64>>,
    points3d: Vec<Vector3<f64>>,
    blocks: RefineBlocks,
}

impl ReprojectionCost {
    pub fn new(
        camera: &dyn Intrinsics,
        pose: &AbsolutePose,
        points2d: Vec<Vector2<f64>>,
        points3d: Vec<Vector3<f64>>,
        blocks: RefineBlocks,
    ) -> Result<Self> {
        if points2d.len() != points3d.len() {
            return Err(RansacError::InvalidArgument(format!(
                "{} image points for {} world points",
                points2d.len(),
                points3d.len()
            )));
        }
        if points2d.is_empty() {
            return Err(RansacError::InvalidArgument(
                "refinement needs at least one observation".to_string(),
            ));
        }
        Ok(Self {
            camera: camera.boxed_clone(),
            pose: pose.clone(),
            points2d,
            points3d,
            blocks,
        })
    }

    pub fn num_observations(&self) -> usize {
        self.points2d.len()
    }

    /// Parameter vector of the initial camera and pose.
    pub fn initial_params(&self) -> DVector<f64> {
        let mut x = Vec::new();
        if self.blocks.pose {
            x.extend(self.pose.rotation.scaled_axis().iter());
            x.extend(self.pose.translation.vector.iter());
        }
        if self.blocks.intrinsics {
            x.extend(self.camera.params());
        }
        DVector::from_vec(x)
    }

    /// Rebuild the camera and pose described by `x`.
    pub fn unpack(&self, x: &DVector<f64>) -> Result<(Box<dyn Intrinsics>, AbsolutePose)> {
        let mut offset = 0;
        let pose = if self.blocks.pose {
            if x.len() < POSE_PARAMS {
                return Err(RansacError::InvalidArgument(format!(
                    "pose block needs {POSE_PARAMS} parameters, got {}",
                    x.len()
                )));
            }
            offset = POSE_PARAMS;
            AbsolutePose::from_scaled_axis(
                Vector3::new(x[0], x[1], x[2]),
                Vector3::new(x[3], x[4], x[5]),
            )
        } else {
            self.pose.clone()
        };

        let mut camera = self.camera.boxed_clone();
        if self.blocks.intrinsics {
            camera.set_params(&x.as_slice()[offset..])?;
        } else if x.len() != offset {
            return Err(RansacError::InvalidArgument(format!(
                "expected {offset} parameters, got {}",
                x.len()
            )));
        }
        Ok((camera, pose))
    }

    /// Stacked `[dx, dy]` residuals for every observation.
    pub fn residuals(&self, x: &DVector<f64>) -> Result<DVector<f64>> {
        let (camera, pose) = self.unpack(x)?;
        let mut r = DVector::zeros(2 * self.points2d.len());
        for (i, (p2, p3)) in self.points2d.iter().zip(&self.points3d).enumerate() {
            let e = camera.residual(&pose, p3, p2);
            r[2 * i] = e.x;
            r[2 * i + 1] = e.y;
        }
        Ok(r)
    }

    /// Central-difference Jacobian of [`ReprojectionCost::residuals`].
    pub fn jacobian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>> {
        let mut jac = DMatrix::zeros(2 * self.points2d.len(), x.len());
        let mut probe = x.clone();
        for j in 0..x.len() {
            let step = 1e-6 * x[j].abs().max(1.0);
            probe[j] = x[j] + step;
            let plus = self.residuals(&probe)?;
            probe[j] = x[j] - step;
            let minus = self.residuals(&probe)?;
            probe[j] = x[j];
            jac.set_column(j, &((plus - minus) / (2.0 * step)));
        }
        Ok(jac)
    }

    /// Root mean square of the per-observation pixel errors.
    pub fn rmse(&self, x: &DVector<f64>) -> Result<f64> {
        let r = self.residuals(x)?;
        Ok((r.norm_squared() / self.points2d.len() as f64).sqrt())
    }
}

impl CostFunction for ReprojectionCost {
    type Param = DVector<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        self.rmse(param).map_err(|e| {
            ArgminError::InvalidParameter {
                text: e.to_string(),
            }
            .into()
        })
    }
}

struct LmProblem<'a> {
    cost: &'a ReprojectionCost,
    params: DVector<f64>,
}

impl<'a> LeastSquaresProblem<f64, Dyn, Dyn> for LmProblem<'a> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        self.cost.residuals(&self.params).ok()
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        self.cost.jacobian(&self.params).ok()
    }
}

/// Outcome of [`refine`]. The caller decides whether to adopt it.
#[derive(Debug, Clone)]
pub struct RefineOutcome {
    pub rmse_before: f64,
    pub rmse_after: f64,
    pub pose: AbsolutePose,
    pub intrinsics_params: Vec<f64>,
    pub converged: bool,
}

impl RefineOutcome {
    pub fn improved(&self, min_rmse_decrease: f64) -> bool {
        self.rmse_after < self.rmse_before - min_rmse_decrease
    }
}

/// Minimize the reprojection error of `cost` starting from its initial
/// parameters.
pub fn refine(cost: &ReprojectionCost, options: &RefineOptions) -> Result<RefineOutcome> {
    if !cost.blocks.any() {
        return Err(RansacError::InvalidArgument(
            "no parameter block selected for refinement".to_string(),
        ));
    }
    let x0 = cost.initial_params();
    let rmse_before = cost.rmse(&x0)?;

    let lm = LevenbergMarquardt::new().with_patience(options.max_iterations.max(1));
    let (problem, report) = lm.minimize(LmProblem {
        cost,
        params: x0.clone(),
    });
    let converged = report.termination.was_successful();

    // A failed trial step can leave unusable parameters behind.
    let (x, rmse_after) = match cost.cost(&problem.params) {
        Ok(rmse) if rmse.is_finite() => (problem.params, rmse),
        _ => (x0, rmse_before),
    };
    debug!(
        "reprojection refinement: rmse {rmse_before:.6} -> {rmse_after:.6} px after {} evaluations ({:?})",
        report.number_of_evaluations, report.termination
    );

    let (camera, pose) = cost.unpack(&x)?;
    Ok(RefineOutcome {
        rmse_before,
        rmse_after,
        pose,
        intrinsics_params: camera.params(),
        converged,
    })
}

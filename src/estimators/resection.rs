//! Camera resection from 2D-3D correspondences with the 6-point DLT.

use nalgebra::{DMatrix, Matrix4, Vector3};

use crate::core::{ErrorMetric, Solver};
use crate::models::ProjectionMatrix;
use crate::types::{DataMatrix, Mat34};

use super::{right_null_vectors, row_scales};

/// Direct linear transform for `P`, from six or more (weighted)
/// correspondences. `x1` holds image points, `x2` world points.
///
/// World points are centered and scaled internally; the returned `P` acts
/// on the caller's world coordinates and is signed so that the points lie in
/// front of the camera.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResectionDltSolver;

impl ResectionDltSolver {
    fn world_normalization(x3d: &DataMatrix) -> Matrix4<f64> {
        let n = x3d.nrows() as f64;
        let mut c = Vector3::zeros();
        for i in 0..x3d.nrows() {
            c += Vector3::new(x3d[(i, 0)], x3d[(i, 1)], x3d[(i, 2)]);
        }
        c /= n;
        let mean_dist = (0..x3d.nrows())
            .map(|i| (Vector3::new(x3d[(i, 0)], x3d[(i, 1)], x3d[(i, 2)]) - c).norm())
            .sum::<f64>()
            / n;
        let s = if mean_dist > f64::EPSILON {
            3f64.sqrt() / mean_dist
        } else {
            1.0
        };
        Matrix4::new(
            s, 0.0, 0.0, -s * c.x, //
            0.0, s, 0.0, -s * c.y, //
            0.0, 0.0, s, -s * c.z, //
            0.0, 0.0, 0.0, 1.0,
        )
    }
}

impl Solver for ResectionDltSolver {
    type Model = ProjectionMatrix;

    fn minimum_samples(&self) -> usize {
        6
    }

    fn solve(
        &self,
        x1: &DataMatrix,
        x2: &DataMatrix,
        weights: Option<&[f64]>,
    ) -> Vec<ProjectionMatrix> {
        let n = x1.nrows();
        if n < self.minimum_samples() || x2.nrows() != n || x2.ncols() < 3 {
            return Vec::new();
        }
        let Some(scales) = row_scales(n, weights) else {
            return Vec::new();
        };

        let u = Self::world_normalization(x2);
        let mut a = DMatrix::<f64>::zeros(2 * n, 12);
        for i in 0..n {
            let xw = u * nalgebra::Vector4::new(x2[(i, 0)], x2[(i, 1)], x2[(i, 2)], 1.0);
            let (px, py) = (x1[(i, 0)], x1[(i, 1)]);
            let w = scales[i];
            for j in 0..4 {
                a[(2 * i, j)] = w * xw[j];
                a[(2 * i, 8 + j)] = -w * px * xw[j];
                a[(2 * i + 1, 4 + j)] = w * xw[j];
                a[(2 * i + 1, 8 + j)] = -w * py * xw[j];
            }
        }

        let Some(null) = right_null_vectors(&a, 1) else {
            return Vec::new();
        };
        let p_norm = Mat34::from_row_slice(null[0].as_slice());
        let mut model = ProjectionMatrix::normalized(p_norm * u);

        let in_front: f64 = (0..n)
            .map(|i| {
                model
                    .depth(&Vector3::new(x2[(i, 0)], x2[(i, 1)], x2[(i, 2)]))
                    .signum()
            })
            .sum();
        if in_front < 0.0 {
            model.p = -model.p;
        }
        let norm = model.p.norm();
        if norm > f64::EPSILON {
            model.p /= norm;
        }
        vec![model]
    }

    fn is_valid_model(&self, model: &ProjectionMatrix) -> bool {
        let m = model.m();
        m.determinant().abs() > 1e-12 * m.norm().powi(3)
    }
}

/// Squared reprojection distance, infinite for points behind the camera.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReprojectionError;

impl ReprojectionError {
    pub fn residual(p: &ProjectionMatrix, x: (f64, f64), world: &Vector3<f64>) -> f64 {
        let h = p.p * world.push(1.0);
        if p.depth(world) <= 0.0 || h.z.abs() < f64::EPSILON {
            return f64::INFINITY;
        }
        let (du, dv) = (x.0 - h.x / h.z, x.1 - h.y / h.z);
        du * du + dv * dv
    }
}

impl ErrorMetric<ProjectionMatrix> for ReprojectionError {
    fn error(&self, model: &ProjectionMatrix, x1: &DataMatrix, x2: &DataMatrix, row: usize) -> f64 {
        Self::residual(
            model,
            (x1[(row, 0)], x1[(row, 1)]),
            &Vector3::new(x2[(row, 0)], x2[(row, 1)], x2[(row, 2)]),
        )
    }
}

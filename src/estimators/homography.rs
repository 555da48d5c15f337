//! Homography solvers using the DLT with `h33 = 1`.

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

use crate::core::{ErrorMetric, Solver, Unnormalizer};
use crate::models::Homography;
use crate::types::DataMatrix;
use crate::utils::gauss_elimination;

use super::row_scales;

/// Homography DLT. Exactly four points are solved with Gaussian elimination,
/// larger (optionally weighted) sets in the least-squares sense.
#[derive(Debug, Clone, Copy, Default)]
pub struct HomographyDltSolver;

impl HomographyDltSolver {
    /// Two equations per correspondence in the eight unknowns
    /// `h11..h32`, scaled by the row weights.
    fn build_system(x1: &DataMatrix, x2: &DataMatrix, scales: &[f64]) -> (DMatrix<f64>, DVector<f64>) {
        let n = x1.nrows();
        let mut a = DMatrix::<f64>::zeros(2 * n, 8);
        let mut b = DVector::<f64>::zeros(2 * n);

        for i in 0..n {
            let (u1, v1) = (x1[(i, 0)], x1[(i, 1)]);
            let (u2, v2) = (x2[(i, 0)], x2[(i, 1)]);
            let w = scales[i];

            a[(2 * i, 0)] = -w * u1;
            a[(2 * i, 1)] = -w * v1;
            a[(2 * i, 2)] = -w;
            a[(2 * i, 6)] = w * u2 * u1;
            a[(2 * i, 7)] = w * u2 * v1;
            b[2 * i] = -w * u2;

            a[(2 * i + 1, 3)] = -w * u1;
            a[(2 * i + 1, 4)] = -w * v1;
            a[(2 * i + 1, 5)] = -w;
            a[(2 * i + 1, 6)] = w * v2 * u1;
            a[(2 * i + 1, 7)] = w * v2 * v1;
            b[2 * i + 1] = -w * v2;
        }
        (a, b)
    }

    fn to_model(h: &DVector<f64>) -> Option<Homography> {
        if h.iter().any(|x| !x.is_finite()) {
            return None;
        }
        let m = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);
        Some(Homography::normalized(m))
    }
}

impl Solver for HomographyDltSolver {
    type Model = Homography;

    fn minimum_samples(&self) -> usize {
        4
    }

    fn solve(&self, x1: &DataMatrix, x2: &DataMatrix, weights: Option<&[f64]>) -> Vec<Homography> {
        let n = x1.nrows();
        if n < self.minimum_samples() || x2.nrows() != n {
            return Vec::new();
        }
        let Some(scales) = row_scales(n, weights) else {
            return Vec::new();
        };
        let (a, b) = Self::build_system(x1, x2, &scales);

        let h = if n == self.minimum_samples() {
            let mut augmented = DMatrix::<f64>::zeros(8, 9);
            augmented.view_mut((0, 0), (8, 8)).copy_from(&a);
            augmented.set_column(8, &b);
            let mut h = DVector::<f64>::zeros(8);
            if !gauss_elimination(&mut augmented, &mut h) {
                return Vec::new();
            }
            h
        } else {
            match a.svd(true, true).solve(&b, 1e-12) {
                Ok(h) => h,
                Err(_) => return Vec::new(),
            }
        };

        Self::to_model(&h).into_iter().collect()
    }

    fn is_valid_model(&self, model: &Homography) -> bool {
        let det = model.h.determinant().abs();
        det > 1e-8 && det < 1e8
    }
}

/// Squared forward transfer error `|x2 - H x1|^2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferError;

impl TransferError {
    pub fn residual(h: &Matrix3<f64>, x1: (f64, f64), x2: (f64, f64)) -> f64 {
        let p = h * Vector3::new(x1.0, x1.1, 1.0);
        if p.z.abs() < f64::EPSILON {
            return f64::INFINITY;
        }
        let (du, dv) = (x2.0 - p.x / p.z, x2.1 - p.y / p.z);
        du * du + dv * dv
    }
}

impl ErrorMetric<Homography> for TransferError {
    fn error(&self, model: &Homography, x1: &DataMatrix, x2: &DataMatrix, row: usize) -> f64 {
        Self::residual(
            &model.h,
            (x1[(row, 0)], x1[(row, 1)]),
            (x2[(row, 0)], x2[(row, 1)]),
        )
    }
}

/// `H = T2^-1 * H * T1`, rescaled so that `h33 = 1`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HomographyUnnormalizer;

impl Unnormalizer<Homography> for HomographyUnnormalizer {
    fn unnormalize(&self, model: &mut Homography, t1: &Matrix3<f64>, t2: &Matrix3<f64>) {
        let t2_inv = t2.try_inverse().unwrap_or_else(Matrix3::identity);
        model.h = t2_inv * model.h * t1;
        model.h = model.scaled();
    }
}

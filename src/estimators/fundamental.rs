//! Fundamental matrix solvers (7-point and weighted 8-point) and the Sampson
//! error.

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

use crate::core::{ErrorMetric, Solver, Unnormalizer};
use crate::models::FundamentalMatrix;
use crate::types::DataMatrix;
use crate::utils::{solve_cubic_real, solve_quadratic_real};

use super::{right_null_vectors, row_scales};

/// Epipolar constraint rows `x2^T F x1 = 0`, with `F` stored row-major.
fn epipolar_system(x1: &DataMatrix, x2: &DataMatrix, scales: &[f64]) -> DMatrix<f64> {
    let n = x1.nrows();
    let mut a = DMatrix::<f64>::zeros(n, 9);
    for i in 0..n {
        let (u1, v1) = (x1[(i, 0)], x1[(i, 1)]);
        let (u2, v2) = (x2[(i, 0)], x2[(i, 1)]);
        let w = scales[i];
        a[(i, 0)] = w * u2 * u1;
        a[(i, 1)] = w * u2 * v1;
        a[(i, 2)] = w * u2;
        a[(i, 3)] = w * v2 * u1;
        a[(i, 4)] = w * v2 * v1;
        a[(i, 5)] = w * v2;
        a[(i, 6)] = w * u1;
        a[(i, 7)] = w * v1;
        a[(i, 8)] = w;
    }
    a
}

fn reshape(v: &DVector<f64>) -> Matrix3<f64> {
    Matrix3::from_row_slice(v.as_slice())
}

/// Project onto the closest rank-2 matrix.
fn enforce_rank2(f: &Matrix3<f64>) -> Option<Matrix3<f64>> {
    let svd = f.svd(true, true);
    let (u, v_t) = (svd.u?, svd.v_t?);
    let mut s = svd.singular_values;
    let (min_idx, _) = s.argmin();
    s[min_idx] = 0.0;
    Some(u * Matrix3::from_diagonal(&s) * v_t)
}

fn unit_frobenius(f: Matrix3<f64>) -> Matrix3<f64> {
    let n = f.norm();
    if n > f64::EPSILON {
        f / n
    } else {
        f
    }
}

/// Finite real roots of `c3 l^3 + c2 l^2 + c1 l + c0`, and whether the
/// cubic also has a root at infinity.
///
/// Coefficients below `1e-12 * scale` count as zero, so a vanishing leading
/// term drops the degree instead of blowing up the monic form.
fn pencil_roots(c3: f64, c2: f64, c1: f64, c0: f64, scale: f64) -> (Vec<f64>, bool) {
    let tol = 1e-12 * scale;
    let roots: Vec<f64> = if c3.abs() >= tol {
        let mut roots = [0.0; 3];
        let n = solve_cubic_real(c2 / c3, c1 / c3, c0 / c3, &mut roots);
        roots[..n].to_vec()
    } else {
        let a = if c2.abs() < tol { 0.0 } else { c2 };
        let mut roots = [0.0; 2];
        let n = solve_quadratic_real(a, c1, c0, &mut roots);
        roots[..n].to_vec()
    };
    let roots = roots.into_iter().filter(|l| l.is_finite()).collect();
    (roots, c3.abs() < tol)
}

/// Seven-point solver. The two-dimensional null space `a F1 + F2` is
/// restricted by `det(F) = 0`, a cubic giving one or three solutions.
#[derive(Debug, Clone, Copy, Default)]
pub struct FundamentalSevenPointSolver;

impl Solver for FundamentalSevenPointSolver {
    type Model = FundamentalMatrix;

    fn minimum_samples(&self) -> usize {
        7
    }

    fn solve(
        &self,
        x1: &DataMatrix,
        x2: &DataMatrix,
        weights: Option<&[f64]>,
    ) -> Vec<FundamentalMatrix> {
        let n = x1.nrows();
        if n < self.minimum_samples() || x2.nrows() != n {
            return Vec::new();
        }
        let Some(scales) = row_scales(n, weights) else {
            return Vec::new();
        };
        let a = epipolar_system(x1, x2, &scales);
        let Some(null) = right_null_vectors(&a, 2) else {
            return Vec::new();
        };
        let f1 = reshape(&null[0]);
        let f2 = reshape(&null[1]);

        // det(l F1 + F2) is a cubic in l; recover its coefficients from four
        // evaluations.
        let det_at = |l: f64| (f1 * l + f2).determinant();
        let (d0, d1, dm1, d2) = (det_at(0.0), det_at(1.0), det_at(-1.0), det_at(2.0));
        let c0 = d0;
        let c2 = 0.5 * (d1 + dm1) - d0;
        let odd = 0.5 * (d1 - dm1);
        let c3 = (d2 - d0 - 4.0 * c2 - 2.0 * odd) / 6.0;
        let c1 = odd - c3;

        let scale = c0.abs().max(c1.abs()).max(c2.abs()).max(c3.abs());
        if scale < f64::MIN_POSITIVE {
            return Vec::new();
        }
        let (roots, at_infinity) = pencil_roots(c3, c2, c1, c0, scale);
        let mut models: Vec<_> = roots
            .iter()
            .map(|&l| FundamentalMatrix::normalized(unit_frobenius(f1 * l + f2)))
            .collect();
        if at_infinity {
            // F1 alone is singular.
            models.push(FundamentalMatrix::normalized(unit_frobenius(f1)));
        }
        models
    }

    fn is_valid_model(&self, model: &FundamentalMatrix) -> bool {
        model.f.norm() > f64::EPSILON
    }
}

/// Eight-point least-squares solver with optional per-row weights and
/// rank-2 enforcement.
#[derive(Debug, Clone, Copy, Default)]
pub struct FundamentalEightPointSolver;

impl Solver for FundamentalEightPointSolver {
    type Model = FundamentalMatrix;

    fn minimum_samples(&self) -> usize {
        8
    }

    fn solve(
        &self,
        x1: &DataMatrix,
        x2: &DataMatrix,
        weights: Option<&[f64]>,
    ) -> Vec<FundamentalMatrix> {
        let n = x1.nrows();
        if n < self.minimum_samples() || x2.nrows() != n {
            return Vec::new();
        }
        let Some(scales) = row_scales(n, weights) else {
            return Vec::new();
        };
        let a = epipolar_system(x1, x2, &scales);
        let Some(null) = right_null_vectors(&a, 1) else {
            return Vec::new();
        };
        match enforce_rank2(&reshape(&null[0])) {
            Some(f) => vec![FundamentalMatrix::normalized(unit_frobenius(f))],
            None => Vec::new(),
        }
    }

    fn is_valid_model(&self, model: &FundamentalMatrix) -> bool {
        model.f.norm() > f64::EPSILON
    }
}

/// Squared Sampson distance, the first-order approximation of the squared
/// geometric error to the epipolar lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampsonError;

impl SampsonError {
    pub fn residual(f: &Matrix3<f64>, x1: (f64, f64), x2: (f64, f64)) -> f64 {
        let p1 = Vector3::new(x1.0, x1.1, 1.0);
        let p2 = Vector3::new(x2.0, x2.1, 1.0);
        let f_p1 = f * p1;
        let ft_p2 = f.transpose() * p2;
        let num = p2.dot(&f_p1);
        let den = f_p1.x * f_p1.x + f_p1.y * f_p1.y + ft_p2.x * ft_p2.x + ft_p2.y * ft_p2.y;
        if den <= f64::MIN_POSITIVE {
            return if num.abs() <= f64::MIN_POSITIVE { 0.0 } else { f64::INFINITY };
        }
        num * num / den
    }
}

impl ErrorMetric<FundamentalMatrix> for SampsonError {
    fn error(&self, model: &FundamentalMatrix, x1: &DataMatrix, x2: &DataMatrix, row: usize) -> f64 {
        Self::residual(
            &model.f,
            (x1[(row, 0)], x1[(row, 1)]),
            (x2[(row, 0)], x2[(row, 1)]),
        )
    }
}

/// `F = T2^T * F * T1`, rescaled to unit Frobenius norm.
#[derive(Debug, Clone, Copy, Default)]
pub struct FundamentalUnnormalizer;

impl Unnormalizer<FundamentalMatrix> for FundamentalUnnormalizer {
    fn unnormalize(&self, model: &mut FundamentalMatrix, t1: &Matrix3<f64>, t2: &Matrix3<f64>) {
        model.f = unit_frobenius(t2.transpose() * model.f * t1);
    }
}

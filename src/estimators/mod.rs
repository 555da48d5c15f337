//! Solvers and error metrics for the shipped kernels.
//!
//! - Homography: 4-point DLT minimal solver, weighted DLT least squares,
//!   squared forward transfer error.
//! - Fundamental matrix: 7-point minimal solver, weighted 8-point least
//!   squares, squared Sampson error.
//! - Resection: weighted 6-point DLT, squared reprojection error.
//!
//! All solvers work on points already expressed in the kernel's normalized
//! frame and return models tagged as normalized.

pub mod fundamental;
pub mod homography;
pub mod resection;

pub use fundamental::{
    FundamentalEightPointSolver, FundamentalSevenPointSolver, FundamentalUnnormalizer,
    SampsonError,
};
pub use homography::{HomographyDltSolver, HomographyUnnormalizer, TransferError};
pub use resection::{ReprojectionError, ResectionDltSolver};

use nalgebra::{DMatrix, DVector};

/// Square roots of optional per-row weights, used to scale linear equations
/// so that the solve minimizes `sum w_i r_i^2`.
pub(crate) fn row_scales(n: usize, weights: Option<&[f64]>) -> Option<Vec<f64>> {
    match weights {
        None => Some(vec![1.0; n]),
        Some(w) if w.len() == n && w.iter().all(|v| v.is_finite() && *v >= 0.0) => {
            Some(w.iter().map(|v| v.sqrt()).collect())
        }
        Some(_) => None,
    }
}

/// The `count` right singular vectors of `a` with the smallest singular
/// values, smallest first.
///
/// Wide systems are padded with zero rows so the full null space is
/// available.
pub(crate) fn right_null_vectors(a: &DMatrix<f64>, count: usize) -> Option<Vec<DVector<f64>>> {
    let cols = a.ncols();
    if count > cols {
        return None;
    }
    let a = if a.nrows() < cols {
        let mut padded = DMatrix::zeros(cols, cols);
        padded.view_mut((0, 0), (a.nrows(), cols)).copy_from(a);
        padded
    } else {
        a.clone()
    };

    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
    order.sort_by(|&i, &j| svd.singular_values[i].total_cmp(&svd.singular_values[j]));

    let vectors: Vec<DVector<f64>> = order
        .into_iter()
        .take(count)
        .map(|i| v_t.row(i).transpose())
        .collect();
    if vectors.iter().any(|v| v.iter().any(|x| !x.is_finite())) {
        return None;
    }
    Some(vectors)
}

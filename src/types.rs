//! Core shared types.
//!
//! Correspondences are stored as `nalgebra` dynamic matrices where each row is
//! one sample, so a set of N image points is an N×2 `DataMatrix` and a set of
//! N world points is N×3.

use nalgebra::{DMatrix, Matrix3x4};

/// Dynamic row-per-sample matrix of `f64`.
pub type DataMatrix = DMatrix<f64>;

/// 3×4 matrix, used for camera projection matrices.
pub type Mat34 = Matrix3x4<f64>;

/// Width and height of an image in pixels.
pub type ImageSize = (u32, u32);

/// Check that `indices` are unique and all lie in `[0, n)`.
pub(crate) fn check_indices(indices: &[usize], n: usize) -> Result<(), String> {
    let mut seen = vec![false; n];
    for &idx in indices {
        if idx >= n {
            return Err(format!("index {idx} out of range for {n} samples"));
        }
        if std::mem::replace(&mut seen[idx], true) {
            return Err(format!("index {idx} appears twice"));
        }
    }
    Ok(())
}

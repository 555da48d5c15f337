//! Normalizing transforms applied to point sets before fitting.
//!
//! Minimal and least-squares solvers are conditioned much better when the
//! input points are centered around the origin with unit scale. Kernels
//! normalize their inputs once at construction and map models back with
//! the inverse of these transforms.

use nalgebra::{Matrix3, Vector2};

use crate::types::DataMatrix;

/// Preconditioner derived from the image dimensions.
///
/// Centers the image and scales it by `1 / sqrt(width * height)`.
pub fn normalization_from_image_size(width: f64, height: f64) -> Matrix3<f64> {
    let area = (width * height).max(f64::MIN_POSITIVE);
    let d = 1.0 / area.sqrt();
    Matrix3::new(
        d,
        0.0,
        -0.5 * width * d,
        0.0,
        d,
        -0.5 * height * d,
        0.0,
        0.0,
        1.0,
    )
}

/// Isotropic (Hartley) normalization computed from the points themselves:
/// zero centroid and mean distance `sqrt(2)` from the origin.
pub fn normalization_from_points(points: &DataMatrix) -> Matrix3<f64> {
    let n = points.nrows();
    if n == 0 {
        return Matrix3::identity();
    }
    let mut centroid = Vector2::zeros();
    for i in 0..n {
        centroid += Vector2::new(points[(i, 0)], points[(i, 1)]);
    }
    centroid /= n as f64;

    let mean_dist = (0..n)
        .map(|i| (Vector2::new(points[(i, 0)], points[(i, 1)]) - centroid).norm())
        .sum::<f64>()
        / n as f64;
    let s = if mean_dist > f64::EPSILON {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    Matrix3::new(
        s,
        0.0,
        -s * centroid.x,
        0.0,
        s,
        -s * centroid.y,
        0.0,
        0.0,
        1.0,
    )
}

/// Apply the 2D projective transform `t` to every row of an N×2 point set.
pub fn apply_transform(points: &DataMatrix, t: &Matrix3<f64>) -> DataMatrix {
    let n = points.nrows();
    let mut out = DataMatrix::zeros(n, 2);
    for i in 0..n {
        let p = t * nalgebra::Vector3::new(points[(i, 0)], points[(i, 1)], 1.0);
        out[(i, 0)] = p.x / p.z;
        out[(i, 1)] = p.y / p.z;
    }
    out
}

/// Gather the given rows of `data` into a new matrix.
pub fn select_rows(data: &DataMatrix, rows: &[usize]) -> DataMatrix {
    data.select_rows(rows.iter())
}

//! Kernel adaptors binding correspondence data to solvers and error metrics.
//!
//! A kernel normalizes its input once at construction, fits and scores
//! models in that normalized frame, and maps the final model back with
//! [`Kernel::unnormalize`](crate::core::Kernel::unnormalize).

pub mod resection;
pub mod two_view;

pub use resection::{DltResectionKernel, ResectionKernel};
pub use two_view::{FundamentalKernel, HomographyKernel, TwoViewKernel};

use crate::error::{RansacError, Result};
use crate::models::{CoordinateFrame, Model};

/// Keep the finite candidates accepted by `is_valid`.
pub(crate) fn retain_valid<M: Model>(models: Vec<M>, is_valid: impl Fn(&M) -> bool) -> Vec<M> {
    models
        .into_iter()
        .filter(|m| m.is_finite() && is_valid(m))
        .collect()
}

pub(crate) fn check_weights(inliers: &[usize], weights: Option<&[f64]>) -> Result<()> {
    match weights {
        Some(w) if w.len() != inliers.len() => Err(RansacError::InvalidArgument(format!(
            "{} weights given for {} samples",
            w.len(),
            inliers.len()
        ))),
        _ => Ok(()),
    }
}

/// Flip a model to the original frame, refusing to do it twice.
pub(crate) fn mark_unnormalized<M: Model>(model: &mut M, map: impl FnOnce(&mut M)) -> Result<()> {
    if model.frame() == CoordinateFrame::Original {
        return Err(RansacError::AlreadyUnnormalized);
    }
    map(model);
    model.set_frame(CoordinateFrame::Original);
    Ok(())
}

//! Local optimization run on every new best model.
//!
//! After the hypothesize-and-verify loop finds a better model, a local
//! optimizer can refine it by re-estimating from its inliers.
//!
//! ## Example: custom refinement
//!
//! ```rust
//! use loransac::core::{Kernel, Scoring};
//! use loransac::optimisers::LocalOptimizer;
//! use loransac::scoring::Score;
//!
//! /// Refit once on all inliers and keep the result if it is not worse.
//! struct SingleRefit;
//!
//! impl<K: Kernel> LocalOptimizer<K> for SingleRefit {
//!     fn run(
//!         &mut self,
//!         kernel: &K,
//!         scoring: &dyn Scoring<K>,
//!         inliers: &[usize],
//!         model: &K::Model,
//!         score: &Score,
//!     ) -> (K::Model, Score, Vec<usize>) {
//!         let mut refit_inliers = Vec::new();
//!         if let Ok(models) = kernel.fit_ls(inliers, None) {
//!             for m in models {
//!                 let s = scoring.score(kernel, &m, &mut refit_inliers);
//!                 if s >= *score {
//!                     return (m, s, refit_inliers);
//!                 }
//!             }
//!         }
//!         (model.clone(), *score, inliers.to_vec())
//!     }
//! }
//! ```

pub use crate::core::LocalOptimizer;

use crate::core::{Kernel, Scoring};
use crate::scoring::Score;

/// Local optimizer used when no refinement is desired (plain RANSAC).
pub struct NoopLocalOptimizer;

impl<K: Kernel> LocalOptimizer<K> for NoopLocalOptimizer {
    fn run(
        &mut self,
        _kernel: &K,
        _scoring: &dyn Scoring<K>,
        inliers: &[usize],
        model: &K::Model,
        best_score: &Score,
    ) -> (K::Model, Score, Vec<usize>) {
        (model.clone(), *best_score, inliers.to_vec())
    }
}

/// Concrete optimizers live in their own module to keep the trait lean.
pub mod local;

pub use local::{InnerRansacOptimizer, IrlsOptimizer};

//! Scoring primitives.
//!
//! A model is scored by the number of correspondences whose residual is at or
//! below the inlier threshold. Ties are broken by the sum of those residuals.

use std::cmp::Ordering;

use crate::core::{Kernel, Scoring};

/// Inlier count plus the residual sum over those inliers.
///
/// Ordered so that `a > b` means `a` is the better model: more inliers wins,
/// and for equal counts the lower residual sum wins.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Score {
    pub inlier_count: usize,
    pub residual_sum: f64,
}

impl Score {
    pub fn new(inlier_count: usize, residual_sum: f64) -> Self {
        Self {
            inlier_count,
            residual_sum,
        }
    }
}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.inlier_count.cmp(&other.inlier_count) {
            Ordering::Equal => other.residual_sum.partial_cmp(&self.residual_sum),
            ord => Some(ord),
        }
    }
}

/// Plain threshold scoring over the kernel's residuals.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdScoring {
    threshold: f64,
}

impl ThresholdScoring {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl<K: Kernel> Scoring<K> for ThresholdScoring {
    fn threshold(&self) -> f64 {
        self.threshold
    }

    fn score_at(
        &self,
        kernel: &K,
        model: &K::Model,
        threshold: f64,
        inliers_out: &mut Vec<usize>,
    ) -> Score {
        inliers_out.clear();
        let mut residual_sum = 0.0;
        for (i, e) in kernel.errors(model).into_iter().enumerate() {
            if e <= threshold {
                inliers_out.push(i);
                residual_sum += e;
            }
        }
        Score::new(inliers_out.len(), residual_sum)
    }
}

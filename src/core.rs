//! Core LO-RANSAC traits and the estimation loop.
//!
//! The estimator is expressed as a set of small components:
//! - [`Solver`], [`ErrorMetric`] and [`Unnormalizer`] are the per-model
//!   strategy objects that a kernel is assembled from.
//! - [`Kernel`] adapts a data set plus those strategies to the uniform
//!   interface consumed by the estimator.
//! - [`Sampler`], [`Scoring`], [`LocalOptimizer`] and [`TerminationCriterion`]
//!   drive the hypothesize-and-verify loop in [`LoRansac`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use nalgebra::Matrix3;

use crate::error::{RansacError, Result};
use crate::models::Model;
use crate::scoring::Score;
use crate::settings::RansacSettings;
use crate::types::DataMatrix;

/// Minimal or least-squares solver for one model family.
///
/// `x1` and `x2` hold only the selected rows, already in the kernel's
/// normalized frame. `weights`, when given, is aligned with those rows.
pub trait Solver {
    type Model: Model;

    /// Smallest number of correspondences the solver accepts.
    fn minimum_samples(&self) -> usize;

    fn solve(&self, x1: &DataMatrix, x2: &DataMatrix, weights: Option<&[f64]>) -> Vec<Self::Model>;

    /// Model-specific degeneracy test applied to every candidate.
    fn is_valid_model(&self, _model: &Self::Model) -> bool {
        true
    }
}

/// Residual of one correspondence with respect to a model.
///
/// Implementations return a non-negative value in squared units.
pub trait ErrorMetric<M> {
    fn error(&self, model: &M, x1: &DataMatrix, x2: &DataMatrix, row: usize) -> f64;
}

/// Maps a model fitted on normalized points back to the original frame,
/// given the normalizing transforms of both point sets.
pub trait Unnormalizer<M> {
    fn unnormalize(&self, model: &mut M, t1: &Matrix3<f64>, t2: &Matrix3<f64>);
}

/// Uniform interface between a data set and the robust estimator.
pub trait Kernel {
    type Model: Model;

    /// Number of correspondences `N`.
    fn num_samples(&self) -> usize;

    /// Sample size of the minimal solver.
    fn minimum_samples(&self) -> usize;

    /// Smallest subset the least-squares solver accepts.
    fn minimum_ls_samples(&self) -> usize;

    /// Minimal solve from exactly `minimum_samples()` indices.
    ///
    /// Candidates failing [`Kernel::is_valid_model`] are dropped, so the
    /// result may be empty.
    fn fit(&self, samples: &[usize]) -> Result<Vec<Self::Model>>;

    /// Least-squares solve from at least `minimum_ls_samples()` indices.
    /// `weights` is aligned by position with `inliers`.
    fn fit_ls(&self, inliers: &[usize], weights: Option<&[f64]>) -> Result<Vec<Self::Model>>;

    /// Residual of correspondence `sample`.
    fn error(&self, sample: usize, model: &Self::Model) -> f64;

    fn errors(&self, model: &Self::Model) -> Vec<f64> {
        (0..self.num_samples())
            .map(|i| self.error(i, model))
            .collect()
    }

    /// IRLS weights `1 / max(eps, error)^2`, aligned with `inliers`.
    fn compute_weights(&self, model: &Self::Model, inliers: &[usize], eps: f64) -> Vec<f64> {
        inliers
            .iter()
            .map(|&i| {
                let e = self.error(i, model);
                1.0 / eps.max(e).powi(2)
            })
            .collect()
    }

    /// Express `model` in the caller's frame. Fails without touching the
    /// model if that already happened.
    fn unnormalize(&self, model: &mut Self::Model) -> Result<()>;

    fn is_valid_model(&self, model: &Self::Model) -> bool;
}

/// Validate an index set handed to `fit` or `fit_ls`.
///
/// `exact` requires the set to have exactly `required` entries; otherwise at
/// least `required` are needed.
pub(crate) fn validate_sample(
    samples: &[usize],
    num_samples: usize,
    required: usize,
    exact: bool,
) -> Result<()> {
    if num_samples < required {
        return Err(RansacError::InsufficientSamples {
            required,
            actual: num_samples,
        });
    }
    if (exact && samples.len() != required) || samples.len() < required {
        return Err(RansacError::InvalidSample(format!(
            "expected {}{} indices, got {}",
            if exact { "" } else { "at least " },
            required,
            samples.len()
        )));
    }
    crate::types::check_indices(samples, num_samples).map_err(RansacError::InvalidSample)
}

/// Sampler responsible for drawing minimal samples.
pub trait Sampler {
    /// Draw `out_indices.len()` distinct indices from `[0, num_samples)`.
    ///
    /// Returns `false` if a valid sample could not be drawn.
    fn sample(&mut self, num_samples: usize, out_indices: &mut [usize]) -> bool;

    /// Update the sampler state given the last sample and iteration.
    fn update(&mut self, _sample: &[usize], _iteration: usize) {}
}

/// Scoring strategy used to evaluate model quality and determine inliers.
pub trait Scoring<K: Kernel> {
    /// Inlier/outlier threshold in the kernel's error units.
    fn threshold(&self) -> f64;

    /// Score `model` at an explicit threshold, writing the sorted inliers.
    fn score_at(
        &self,
        kernel: &K,
        model: &K::Model,
        threshold: f64,
        inliers_out: &mut Vec<usize>,
    ) -> Score;

    fn score(&self, kernel: &K, model: &K::Model, inliers_out: &mut Vec<usize>) -> Score {
        self.score_at(kernel, model, self.threshold(), inliers_out)
    }
}

/// Local optimization, run every time a new best model is found.
pub trait LocalOptimizer<K: Kernel> {
    /// Returns `(refined_model, refined_score, refined_inliers)`. When
    /// nothing better is found the inputs are handed back.
    fn run(
        &mut self,
        kernel: &K,
        scoring: &dyn Scoring<K>,
        inliers: &[usize],
        model: &K::Model,
        best_score: &Score,
    ) -> (K::Model, Score, Vec<usize>);
}

/// Termination criterion deciding when the loop can stop.
pub trait TerminationCriterion {
    /// Update the adaptive iteration budget after a new best score.
    ///
    /// Returns `true` if the loop should stop right away.
    fn check(
        &mut self,
        num_samples: usize,
        best_score: &Score,
        sample_size: usize,
        max_iterations: &mut usize,
    ) -> bool;
}

/// Standard adaptive bound
/// `N = log(1 - confidence) / log(1 - inlier_ratio^sample_size)`.
pub struct RansacTerminationCriterion {
    /// Desired confidence in \[0, 1\].
    pub confidence: f64,
}

impl TerminationCriterion for RansacTerminationCriterion {
    fn check(
        &mut self,
        num_samples: usize,
        best_score: &Score,
        sample_size: usize,
        max_iterations: &mut usize,
    ) -> bool {
        if num_samples == 0 {
            return false;
        }

        let inlier_ratio = (best_score.inlier_count as f64 / num_samples as f64).clamp(0.0, 1.0);
        if inlier_ratio >= 1.0 {
            return true;
        }
        if inlier_ratio <= 0.0 {
            return false;
        }

        let p_good_sample = inlier_ratio.powi(sample_size as i32);
        if p_good_sample <= 0.0 {
            return false;
        }
        if p_good_sample >= 1.0 {
            return true;
        }

        let log_one_minus_conf = (1.0 - self.confidence).ln();
        let log_one_minus_p = (1.0 - p_good_sample).ln();
        if !log_one_minus_conf.is_finite() || !log_one_minus_p.is_finite() {
            return false;
        }

        let required = (log_one_minus_conf / log_one_minus_p).ceil().max(1.0);
        if required < *max_iterations as f64 {
            *max_iterations = required as usize;
        }
        false
    }
}

/// Outcome of a successful estimation.
#[derive(Debug, Clone)]
pub struct EstimationResult<M> {
    /// Winning model, in the caller's coordinate frame.
    pub model: M,
    /// Sorted indices of the inliers of `model`.
    pub inliers: Vec<usize>,
    pub score: Score,
    /// Number of hypothesize-and-verify iterations performed.
    pub iterations: usize,
}

/// Generic LO-RANSAC estimator orchestrating the components above.
pub struct LoRansac<Sa, Sc, LO, T>
where
    Sa: Sampler,
    T: TerminationCriterion,
{
    pub settings: RansacSettings,
    pub sampler: Sa,
    pub scoring: Sc,
    pub local_optimizer: LO,
    pub termination: T,
    cancel: Option<Arc<AtomicBool>>,
}

impl<Sa, Sc, LO, T> LoRansac<Sa, Sc, LO, T>
where
    Sa: Sampler,
    T: TerminationCriterion,
{
    pub fn new(
        settings: RansacSettings,
        sampler: Sa,
        scoring: Sc,
        local_optimizer: LO,
        termination: T,
    ) -> Self {
        Self {
            settings,
            sampler,
            scoring,
            local_optimizer,
            termination,
            cancel: None,
        }
    }

    /// Install a cooperative cancel flag, polled once per iteration.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Run the estimator on `kernel`.
    pub fn run<K>(&mut self, kernel: &K) -> Result<EstimationResult<K::Model>>
    where
        K: Kernel,
        Sc: Scoring<K>,
        LO: LocalOptimizer<K>,
    {
        self.settings.validate()?;

        let n = kernel.num_samples();
        let sample_size = kernel.minimum_samples();
        if n < sample_size || sample_size == 0 {
            return Err(RansacError::InsufficientSamples {
                required: sample_size.max(1),
                actual: n,
            });
        }

        let mut sample = vec![0usize; sample_size];
        let mut tmp_inliers = Vec::with_capacity(n);

        let mut best: Option<(K::Model, Score, Vec<usize>)> = None;
        let mut generated_models = false;

        let hard_cap = self.settings.max_iterations;
        let min_iterations = self.settings.min_iterations.min(hard_cap);
        let mut max_iterations = hard_cap;
        let mut iteration = 0usize;

        while iteration < max_iterations || iteration < min_iterations {
            if self.cancelled() {
                warn!("estimation cancelled at iteration {iteration}");
                return Err(RansacError::Cancelled {
                    iterations: iteration,
                });
            }

            if !self.sampler.sample(n, &mut sample) {
                iteration += 1;
                continue;
            }

            let models = match kernel.fit(&sample) {
                Ok(models) => models,
                Err(err) => {
                    debug!("minimal fit failed on {sample:?}: {err}");
                    Vec::new()
                }
            };
            generated_models |= !models.is_empty();

            let mut improved = false;
            for model in models {
                let score = self.scoring.score(kernel, &model, &mut tmp_inliers);
                let better = match &best {
                    None => true,
                    Some((_, best_score, _)) => score > *best_score,
                };
                if better {
                    best = Some((model, score, tmp_inliers.clone()));
                    improved = true;
                }
            }

            if improved {
                if let Some((model, score, inliers)) = best.take() {
                    let (lo_model, lo_score, lo_inliers) = self.local_optimizer.run(
                        kernel,
                        &self.scoring,
                        &inliers,
                        &model,
                        &score,
                    );
                    let adopted = if lo_score.inlier_count >= score.inlier_count {
                        (lo_model, lo_score, lo_inliers)
                    } else {
                        (model, score, inliers)
                    };
                    debug!(
                        "iteration {iteration}: new best with {} inliers (residual sum {:.3e})",
                        adopted.1.inlier_count, adopted.1.residual_sum
                    );

                    let stop = self.termination.check(
                        n,
                        &adopted.1,
                        sample_size,
                        &mut max_iterations,
                    );
                    best = Some(adopted);
                    if stop {
                        iteration += 1;
                        if iteration >= min_iterations {
                            break;
                        }
                        max_iterations = iteration;
                        continue;
                    }
                }
            }

            self.sampler.update(&sample, iteration);
            iteration += 1;
        }

        let Some((mut model, score, inliers)) = best else {
            warn!("no valid model generated in {iteration} iterations");
            return Err(if generated_models {
                RansacError::NoSolution {
                    iterations: iteration,
                    inliers: 0,
                }
            } else {
                RansacError::DegenerateData {
                    iterations: iteration,
                }
            });
        };

        if score.inlier_count < sample_size {
            warn!(
                "best model only has {} inliers, {} required",
                score.inlier_count, sample_size
            );
            return Err(RansacError::NoSolution {
                iterations: iteration,
                inliers: score.inlier_count,
            });
        }

        kernel.unnormalize(&mut model)?;
        info!(
            "estimation finished after {iteration} iterations with {}/{} inliers",
            score.inlier_count, n
        );

        Ok(EstimationResult {
            model,
            inliers,
            score,
            iterations: iteration,
        })
    }
}

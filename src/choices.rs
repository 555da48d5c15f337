//! Lightweight runtime wrappers exposing built-in components via enums while
//! the core `LoRansac` stays fully generic. Each enum holds the concrete
//! variants plus a `Dyn` escape hatch for custom implementations.

use crate::core::{Kernel, LocalOptimizer, RansacTerminationCriterion, Sampler, Scoring, TerminationCriterion};
use crate::optimisers::{InnerRansacOptimizer, IrlsOptimizer, NoopLocalOptimizer};
use crate::samplers::UniformRandomSampler;
use crate::scoring::Score;
use crate::settings::{LocalOptimizationType, RansacSettings};

/// Runtime sampler selection.
pub enum SamplerChoice {
    Uniform(UniformRandomSampler),
    Dyn(Box<dyn Sampler + Send + Sync>),
}

impl SamplerChoice {
    pub fn from_settings(settings: &RansacSettings) -> Self {
        SamplerChoice::Uniform(UniformRandomSampler::new(settings.seed))
    }
}

impl Default for SamplerChoice {
    fn default() -> Self {
        SamplerChoice::Uniform(UniformRandomSampler::default())
    }
}

impl Sampler for SamplerChoice {
    fn sample(&mut self, num_samples: usize, out_indices: &mut [usize]) -> bool {
        match self {
            SamplerChoice::Uniform(s) => s.sample(num_samples, out_indices),
            SamplerChoice::Dyn(s) => s.sample(num_samples, out_indices),
        }
    }

    fn update(&mut self, sample: &[usize], iteration: usize) {
        match self {
            SamplerChoice::Uniform(s) => s.update(sample, iteration),
            SamplerChoice::Dyn(s) => s.update(sample, iteration),
        }
    }
}

/// Runtime termination selection.
pub enum TerminationChoice {
    Ransac(RansacTerminationCriterion),
    Dyn(Box<dyn TerminationCriterion + Send + Sync>),
}

impl TerminationCriterion for TerminationChoice {
    fn check(
        &mut self,
        num_samples: usize,
        best_score: &Score,
        sample_size: usize,
        max_iterations: &mut usize,
    ) -> bool {
        match self {
            TerminationChoice::Ransac(term) => {
                term.check(num_samples, best_score, sample_size, max_iterations)
            }
            TerminationChoice::Dyn(term) => {
                term.check(num_samples, best_score, sample_size, max_iterations)
            }
        }
    }
}

/// Runtime local optimizer selection.
pub enum LocalOptimizerChoice<K: Kernel> {
    None(NoopLocalOptimizer),
    Irls(IrlsOptimizer),
    InnerRansac(InnerRansacOptimizer),
    Dyn(Box<dyn LocalOptimizer<K> + Send + Sync>),
}

impl<K: Kernel> LocalOptimizerChoice<K> {
    /// Build the optimizer named by `settings.local_optimization`.
    pub fn from_settings(settings: &RansacSettings) -> Self {
        match settings.local_optimization {
            LocalOptimizationType::None => LocalOptimizerChoice::None(NoopLocalOptimizer),
            LocalOptimizationType::Irls => {
                LocalOptimizerChoice::Irls(IrlsOptimizer::from_settings(settings))
            }
            LocalOptimizationType::InnerRansac => {
                LocalOptimizerChoice::InnerRansac(InnerRansacOptimizer::from_settings(settings))
            }
        }
    }
}

impl<K: Kernel> LocalOptimizer<K> for LocalOptimizerChoice<K> {
    fn run(
        &mut self,
        kernel: &K,
        scoring: &dyn Scoring<K>,
        inliers: &[usize],
        model: &K::Model,
        best_score: &Score,
    ) -> (K::Model, Score, Vec<usize>) {
        match self {
            LocalOptimizerChoice::None(opt) => opt.run(kernel, scoring, inliers, model, best_score),
            LocalOptimizerChoice::Irls(opt) => opt.run(kernel, scoring, inliers, model, best_score),
            LocalOptimizerChoice::InnerRansac(opt) => {
                opt.run(kernel, scoring, inliers, model, best_score)
            }
            LocalOptimizerChoice::Dyn(opt) => opt.run(kernel, scoring, inliers, model, best_score),
        }
    }
}

/// Helper to build a `TerminationChoice` from settings.
pub fn default_termination(settings: &RansacSettings) -> TerminationChoice {
    TerminationChoice::Ransac(RansacTerminationCriterion {
        confidence: settings.confidence,
    })
}

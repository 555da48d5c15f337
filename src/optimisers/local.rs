use log::trace;

use crate::core::{Kernel, LocalOptimizer, Scoring};
use crate::scoring::Score;
use crate::settings::RansacSettings;
use crate::utils::UniformRandomGenerator;

/// Iteratively reweighted least squares on the inlier set.
///
/// Each round computes `1 / max(eps, e)^2` weights from the residuals of the
/// model currently held (the incoming best on the first round, then the last
/// adopted refit), refits with `fit_ls` on the full inlier set and rescores.
/// A refit is adopted when it keeps at least as many inliers.
pub struct IrlsOptimizer {
    iterations: usize,
    weight_epsilon: f64,
}

impl IrlsOptimizer {
    pub fn new(iterations: usize, weight_epsilon: f64) -> Self {
        Self {
            iterations,
            weight_epsilon,
        }
    }

    pub fn from_settings(settings: &RansacSettings) -> Self {
        Self::new(
            settings.local_optimization_settings.irls_iterations,
            settings.weight_epsilon,
        )
    }
}

impl<K: Kernel> LocalOptimizer<K> for IrlsOptimizer {
    fn run(
        &mut self,
        kernel: &K,
        scoring: &dyn Scoring<K>,
        inliers: &[usize],
        model: &K::Model,
        best_score: &Score,
    ) -> (K::Model, Score, Vec<usize>) {
        let mut current = (model.clone(), *best_score, inliers.to_vec());
        let mut refit_inliers = Vec::with_capacity(inliers.len());

        for round in 0..self.iterations {
            if current.2.len() < kernel.minimum_ls_samples() {
                break;
            }
            let weights = kernel.compute_weights(&current.0, &current.2, self.weight_epsilon);
            let Ok(refits) = kernel.fit_ls(&current.2, Some(&weights)) else {
                break;
            };

            let mut adopted = false;
            for refit in refits {
                let score = scoring.score(kernel, &refit, &mut refit_inliers);
                if score.inlier_count >= current.1.inlier_count {
                    trace!("irls round {round}: {} inliers", score.inlier_count);
                    current = (refit, score, refit_inliers.clone());
                    adopted = true;
                    break;
                }
            }
            if !adopted {
                break;
            }
        }

        current
    }
}

/// Inner RANSAC over non-minimal inlier subsets.
///
/// The model is first refit on all of its inliers. Then random subsets of
/// `min(minimum_ls_samples * sample_size_multiplier, |inliers| / 2)` inliers
/// are fitted with `fit_ls`, and every candidate is polished by IRLS with a
/// threshold shrinking from `threshold_multiplier * threshold` down to
/// `threshold`. The best-scoring model seen is returned.
pub struct InnerRansacOptimizer {
    iterations: usize,
    sample_size_multiplier: usize,
    threshold_multiplier: f64,
    irls_iterations: usize,
    weight_epsilon: f64,
    rng: UniformRandomGenerator,
}

impl InnerRansacOptimizer {
    pub fn from_settings(settings: &RansacSettings) -> Self {
        let lo = &settings.local_optimization_settings;
        Self {
            iterations: lo.inner_iterations,
            sample_size_multiplier: lo.sample_size_multiplier.max(1),
            threshold_multiplier: lo.threshold_multiplier.max(1.0),
            irls_iterations: lo.irls_iterations,
            weight_epsilon: settings.weight_epsilon,
            // Offset the seed so the inner subsets do not replay the outer
            // sampler's sequence.
            rng: UniformRandomGenerator::with_seed(settings.seed.map(|s| s.wrapping_add(1))),
        }
    }

    /// IRLS with a shrinking threshold, returning the polished model.
    fn polish<K: Kernel>(&self, kernel: &K, scoring: &dyn Scoring<K>, mut model: K::Model) -> K::Model {
        let threshold = scoring.threshold();
        let mut inliers = Vec::new();
        let steps = self.irls_iterations.max(1);
        for k in 0..steps {
            let frac = if steps > 1 {
                k as f64 / (steps - 1) as f64
            } else {
                1.0
            };
            let th = threshold * (self.threshold_multiplier - (self.threshold_multiplier - 1.0) * frac);
            scoring.score_at(kernel, &model, th, &mut inliers);
            if inliers.len() < kernel.minimum_ls_samples() {
                break;
            }
            let weights = kernel.compute_weights(&model, &inliers, self.weight_epsilon);
            match kernel.fit_ls(&inliers, Some(&weights)) {
                Ok(mut refits) if !refits.is_empty() => model = refits.swap_remove(0),
                _ => break,
            }
        }
        model
    }
}

impl<K: Kernel> LocalOptimizer<K> for InnerRansacOptimizer {
    fn run(
        &mut self,
        kernel: &K,
        scoring: &dyn Scoring<K>,
        inliers: &[usize],
        model: &K::Model,
        best_score: &Score,
    ) -> (K::Model, Score, Vec<usize>) {
        let min_ls = kernel.minimum_ls_samples();
        let mut best = (model.clone(), *best_score, inliers.to_vec());
        if inliers.len() < min_ls {
            return best;
        }

        let mut tmp = Vec::with_capacity(kernel.num_samples());
        if let Ok(models) = kernel.fit_ls(inliers, None) {
            for m in models {
                let s = scoring.score(kernel, &m, &mut tmp);
                if s > best.1 {
                    best = (m, s, tmp.clone());
                }
            }
        }

        for _ in 0..self.iterations {
            let subset_size = (min_ls * self.sample_size_multiplier).min(best.2.len() / 2);
            if subset_size < min_ls {
                break;
            }
            let subset = self.rng.choose_subset(&best.2, subset_size);
            let mut subset_sorted = subset;
            subset_sorted.sort_unstable();

            let Ok(models) = kernel.fit_ls(&subset_sorted, None) else {
                continue;
            };
            for m in models {
                let m = self.polish(kernel, scoring, m);
                let s = scoring.score(kernel, &m, &mut tmp);
                if s > best.1 {
                    trace!("inner ransac: {} inliers", s.inlier_count);
                    best = (m, s, tmp.clone());
                }
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::HomographyKernel;
    use crate::scoring::ThresholdScoring;
    use crate::types::DataMatrix;
    use nalgebra::{Matrix3, Vector3};

    fn ground_truth() -> Matrix3<f64> {
        Matrix3::new(1.05, 0.08, 12.0, -0.04, 0.97, 8.0, 2e-4, 1e-4, 1.0)
    }

    /// 40 correspondences with up to 0.5 px of deterministic noise and
    /// 8 gross outliers at the end.
    fn noisy_data() -> (DataMatrix, DataMatrix, DataMatrix) {
        let h = ground_truth();
        let n = 40;
        let mut x1 = DataMatrix::zeros(n, 2);
        let mut x2 = DataMatrix::zeros(n, 2);
        let mut clean = DataMatrix::zeros(n, 2);
        for i in 0..n {
            let fi = i as f64;
            let (u, v) = (20.0 + 27.0 * (i % 8) as f64, 15.0 + 41.0 * (i / 8) as f64);
            let p = h * Vector3::new(u, v, 1.0);
            x1[(i, 0)] = u;
            x1[(i, 1)] = v;
            clean[(i, 0)] = p.x / p.z;
            clean[(i, 1)] = p.y / p.z;
            x2[(i, 0)] = clean[(i, 0)] + 0.5 * (fi * 12.9898).sin();
            x2[(i, 1)] = clean[(i, 1)] + 0.5 * (fi * 78.233).cos();
            if i >= 32 {
                x2[(i, 0)] += 60.0 + 7.0 * fi;
                x2[(i, 1)] -= 45.0;
            }
        }
        (x1, x2, clean)
    }

    fn mean_transfer(h: &Matrix3<f64>, x1: &DataMatrix, clean: &DataMatrix) -> f64 {
        (0..32)
            .map(|i| {
                let p = h * Vector3::new(x1[(i, 0)], x1[(i, 1)], 1.0);
                ((p.x / p.z - clean[(i, 0)]).powi(2) + (p.y / p.z - clean[(i, 1)]).powi(2)).sqrt()
            })
            .sum::<f64>()
            / 32.0
    }

    fn setup() -> (HomographyKernel, ThresholdScoring, DataMatrix, DataMatrix) {
        let (x1, x2, clean) = noisy_data();
        let kernel = HomographyKernel::new(&x1, (240, 200), &x2, (240, 200)).unwrap();
        let scoring = ThresholdScoring::new(kernel.normalize_threshold(3.0));
        (kernel, scoring, x1, clean)
    }

    fn check_optimizer<LO: LocalOptimizer<HomographyKernel>>(mut lo: LO) {
        let (kernel, scoring, x1, clean) = setup();
        let minimal = kernel.fit(&[0, 7, 24, 31]).unwrap().remove(0);
        let mut inliers = Vec::new();
        let score = scoring.score(&kernel, &minimal, &mut inliers);

        let (refined, refined_score, refined_inliers) =
            lo.run(&kernel, &scoring, &inliers, &minimal, &score);
        assert!(refined_score.inlier_count >= score.inlier_count);
        assert_eq!(refined_inliers.len(), refined_score.inlier_count);
        assert!(refined_inliers.iter().all(|&i| i < 32));

        let mut before = minimal;
        let mut after = refined;
        kernel.unnormalize(&mut before).unwrap();
        kernel.unnormalize(&mut after).unwrap();
        assert!(mean_transfer(&after.h, &x1, &clean) < mean_transfer(&before.h, &x1, &clean));
    }

    #[test]
    fn irls_improves_minimal_model() {
        check_optimizer(IrlsOptimizer::new(4, 0.001));
    }

    #[test]
    fn inner_ransac_improves_minimal_model() {
        let settings = RansacSettings::default().with_seed(5);
        check_optimizer(InnerRansacOptimizer::from_settings(&settings));
    }

    #[test]
    fn irls_without_enough_inliers_returns_input() {
        let (kernel, scoring, _, _) = setup();
        let minimal = kernel.fit(&[0, 7, 24, 31]).unwrap().remove(0);
        let score = Score::new(3, 0.0);
        let (model, s, inl) = IrlsOptimizer::new(4, 0.001).run(&kernel, &scoring, &[0, 7, 24], &minimal, &score);
        assert_eq!(model, minimal);
        assert_eq!(s, score);
        assert_eq!(inl, vec![0, 7, 24]);
    }
}

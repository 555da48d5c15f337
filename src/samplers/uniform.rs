//! Uniform random sampler drawing minimal samples without replacement.

use crate::core::Sampler;
use crate::utils::UniformRandomGenerator;

/// Uniform random sampler drawing minimal samples without replacement.
pub struct UniformRandomSampler {
    rng: UniformRandomGenerator,
}

impl Default for UniformRandomSampler {
    fn default() -> Self {
        Self::new(None)
    }
}

impl UniformRandomSampler {
    /// Construct a sampler, seeded from the OS when `seed` is `None`.
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            rng: UniformRandomGenerator::with_seed(seed),
        }
    }

    /// Construct a sampler from a fixed seed.
    pub fn from_seed(seed: u64) -> Self {
        Self::new(Some(seed))
    }
}

impl Sampler for UniformRandomSampler {
    fn sample(&mut self, num_samples: usize, out_indices: &mut [usize]) -> bool {
        if out_indices.is_empty() || out_indices.len() > num_samples {
            return false;
        }
        self.rng.gen_unique(out_indices, num_samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draws_distinct_indices_in_range() {
        let mut sampler = UniformRandomSampler::from_seed(11);
        let mut sample = [0usize; 4];
        for _ in 0..100 {
            assert!(sampler.sample(9, &mut sample));
            assert!(sample.iter().all(|&i| i < 9));
            let mut sorted = sample;
            sorted.sort_unstable();
            assert!(sorted.windows(2).all(|w| w[0] != w[1]));
        }
    }

    #[test]
    fn refuses_oversized_samples() {
        let mut sampler = UniformRandomSampler::from_seed(0);
        let mut sample = [0usize; 5];
        assert!(!sampler.sample(4, &mut sample));
        assert!(!sampler.sample(0, &mut []));
    }

    #[test]
    fn same_seed_same_sequence() {
        let mut a = UniformRandomSampler::from_seed(99);
        let mut b = UniformRandomSampler::from_seed(99);
        let (mut sa, mut sb) = ([0usize; 3], [0usize; 3]);
        for _ in 0..20 {
            a.sample(50, &mut sa);
            b.sample(50, &mut sb);
            assert_eq!(sa, sb);
        }
    }
}

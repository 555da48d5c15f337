//! Numerical helpers and the random index generator used by the samplers.

use nalgebra::{DMatrix, DVector};
use rand::distributions::Uniform;
use rand::prelude::*;

/// Seedable generator of unique random indices.
///
/// Sampling uses a partial Fisher–Yates shuffle over a persistent index pool,
/// so drawing `k` of `n` indices costs `O(k)` and never retries.
pub struct UniformRandomGenerator {
    rng: StdRng,
    pool: Vec<usize>,
}

impl UniformRandomGenerator {
    /// Construct with an OS-provided seed.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            pool: Vec::new(),
        }
    }

    /// Construct with a fixed seed, for reproducible runs.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            pool: Vec::new(),
        }
    }

    pub fn with_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::from_seed(seed),
            None => Self::new(),
        }
    }

    /// Draw a uniformly distributed value in `[min, max]`.
    pub fn next_in(&mut self, min: usize, max: usize) -> usize {
        self.rng.sample(Uniform::new_inclusive(min, max))
    }

    /// Fill `out` with distinct indices drawn uniformly from `[0, n)`.
    ///
    /// Returns `false` when `out.len() > n`.
    pub fn gen_unique(&mut self, out: &mut [usize], n: usize) -> bool {
        let k = out.len();
        if k > n {
            return false;
        }
        if self.pool.len() != n {
            self.pool = (0..n).collect();
        }
        for i in 0..k {
            let j = self.next_in(i, n - 1);
            self.pool.swap(i, j);
            out[i] = self.pool[i];
        }
        true
    }

    /// Draw `k` distinct elements of `from`.
    pub fn choose_subset(&mut self, from: &[usize], k: usize) -> Vec<usize> {
        let mut picked = vec![0usize; k.min(from.len())];
        if self.gen_unique(&mut picked, from.len()) {
            picked.iter_mut().for_each(|i| *i = from[*i]);
        }
        picked
    }
}

impl Default for UniformRandomGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Gaussian elimination with partial pivoting, solving `A x = b`.
///
/// `augmented` is `[A | b]` with `A` square. Returns `false` for a
/// (numerically) singular system.
pub fn gauss_elimination(augmented: &mut DMatrix<f64>, result: &mut DVector<f64>) -> bool {
    let n = augmented.nrows();
    if augmented.ncols() != n + 1 || n != result.len() {
        return false;
    }
    let scale = augmented.amax().max(f64::MIN_POSITIVE);

    for i in 0..n {
        let mut max_row = i;
        let mut max_val = augmented[(i, i)].abs();
        for k in (i + 1)..n {
            let val = augmented[(k, i)].abs();
            if val > max_val {
                max_val = val;
                max_row = k;
            }
        }
        if max_row != i {
            augmented.swap_rows(i, max_row);
        }

        if augmented[(i, i)].abs() < 1e-12 * scale {
            return false;
        }

        for k in (i + 1)..n {
            let factor = augmented[(k, i)] / augmented[(i, i)];
            for j in i..augmented.ncols() {
                augmented[(k, j)] -= factor * augmented[(i, j)];
            }
        }
    }

    for i in (0..n).rev() {
        result[i] = augmented[(i, n)];
        for j in (i + 1)..n {
            result[i] -= augmented[(i, j)] * result[j];
        }
        result[i] /= augmented[(i, i)];
    }

    true
}

/// Solve `x^3 + c2*x^2 + c1*x + c0 = 0`.
///
/// Returns the number of real roots (1 or 3), written to the front of `roots`.
pub fn solve_cubic_real(c2: f64, c1: f64, c0: f64, roots: &mut [f64; 3]) -> usize {
    let a = c1 - c2 * c2 / 3.0;
    let b = (2.0 * c2 * c2 * c2 - 9.0 * c2 * c1) / 27.0 + c0;
    let mut c = b * b / 4.0 + a * a * a / 27.0;

    let n_roots = if c > 0.0 || a == 0.0 {
        c = c.max(0.0).sqrt();
        let b_neg = -0.5 * b;
        roots[0] = (b_neg + c).cbrt() + (b_neg - c).cbrt() - c2 / 3.0;
        1
    } else {
        c = (3.0 * b / (2.0 * a) * (-3.0 / a).sqrt()).clamp(-1.0, 1.0);
        let d = 2.0 * (-a / 3.0).sqrt();
        let acos_c = c.acos();
        let third = 2.0 * std::f64::consts::FRAC_PI_3;
        roots[0] = d * (acos_c / 3.0).cos() - c2 / 3.0;
        roots[1] = d * (acos_c / 3.0 - third).cos() - c2 / 3.0;
        roots[2] = d * (acos_c / 3.0 - 2.0 * third).cos() - c2 / 3.0;
        3
    };

    // One Newton step.
    for root in roots.iter_mut().take(n_roots) {
        let x = *root;
        let x2 = x * x;
        let deriv = 3.0 * x2 + 2.0 * c2 * x + c1;
        if deriv.abs() > f64::EPSILON {
            *root -= (x * x2 + c2 * x2 + c1 * x + c0) / deriv;
        }
    }

    n_roots
}

/// Solve `a*x^2 + b*x + c = 0`, falling back to the linear equation when
/// `a` is zero.
///
/// Returns the number of distinct real roots, written to the front of `roots`.
pub fn solve_quadratic_real(a: f64, b: f64, c: f64, roots: &mut [f64; 2]) -> usize {
    if a == 0.0 {
        if b == 0.0 {
            return 0;
        }
        roots[0] = -c / b;
        return 1;
    }
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return 0;
    }
    if disc == 0.0 {
        roots[0] = -0.5 * b / a;
        return 1;
    }
    // Avoid cancellation between -b and the square root.
    let q = -0.5 * (b + b.signum() * disc.sqrt());
    roots[0] = q / a;
    roots[1] = c / q;
    2
}

use crate::error::{RansacError, Result};

/// One putative correspondence between a query and a reference descriptor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DescriptorMatch {
    pub query: usize,
    pub reference: usize,
    pub distance: f32,
}

/// Matches query descriptors against a reference set.
///
/// Implementations return at most one match per query descriptor.
pub trait DescriptorMatcher {
    fn match_descriptors(&self, query: &[Vec<f32>], reference: &[Vec<f32>]) -> Result<Vec<DescriptorMatch>>;
}

/// Exhaustive L2 matcher with Lowe's ratio test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BruteForceMatcher {
    /// A match is kept when `best < ratio * second_best`.
    pub ratio: f32,
}

impl Default for BruteForceMatcher {
    fn default() -> Self {
        Self { ratio: 0.8 }
    }
}

impl BruteForceMatcher {
    pub fn new(ratio: f32) -> Self {
        Self { ratio }
    }
}

fn l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
}

impl DescriptorMatcher for BruteForceMatcher {
    fn match_descriptors(&self, query: &[Vec<f32>], reference: &[Vec<f32>]) -> Result<Vec<DescriptorMatch>> {
        if !(self.ratio > 0.0 && self.ratio <= 1.0) {
            return Err(RansacError::InvalidArgument(format!(
                "ratio must lie in (0, 1], got {}",
                self.ratio
            )));
        }
        let mut matches = Vec::new();
        for (qi, q) in query.iter().enumerate() {
            let mut best = (usize::MAX, f32::INFINITY);
            let mut second = f32::INFINITY;
            for (ri, r) in reference.iter().enumerate() {
                if r.len() != q.len() {
                    return Err(RansacError::InvalidArgument(format!(
                        "descriptor length mismatch: {} vs {}",
                        q.len(),
                        r.len()
                    )));
                }
                let d = l2(q, r);
                if d < best.1 {
                    second = best.1;
                    best = (ri, d);
                } else if d < second {
                    second = d;
                }
            }
            if best.0 == usize::MAX {
                continue;
            }
            // A single reference descriptor has no runner-up to compare with.
            if second.is_infinite() || best.1 < self.ratio * second {
                matches.push(DescriptorMatch {
                    query: qi,
                    reference: best.0,
                    distance: best.1,
                });
            }
        }
        Ok(matches)
    }
}

//! Warm-up sampling.

use rand::distributions::{Distribution, Uniform};
use rand::rngs::SmallRng;

/// Draws exploration values uniformly from the open interval `(ε, 1)`.
#[derive(Debug, Clone)]
pub struct WarmupSampler {
    epsilon: f64,
    dist: Uniform<f64>,
}

impl WarmupSampler {
    /// `epsilon` must lie in `(0, 1)`; see `BoschedConfig::effective_epsilon`.
    pub fn new(epsilon: f64) -> Self {
        Self {
            epsilon,
            dist: Uniform::new(epsilon, 1.0),
        }
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn sample(&self, rng: &mut SmallRng) -> f64 {
        // Uniform is half-open at the low end
        loop {
            let x = self.dist.sample(rng);
            if x > self.epsilon {
                return x;
            }
        }
    }
}

//! Univariate Gaussian densities.

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::errors::{BayonetError, Result};

/// A Gaussian with mean μ and variance σ².
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Gaussian {
    mean: f64,
    variance: f64,
}

impl Gaussian {
    pub fn new(mean: f64, variance: f64) -> Result<Self> {
        if !mean.is_finite() || !variance.is_finite() || variance <= 0.0 {
            return Err(BayonetError::InvalidDomain(format!(
                "Gaussian requires finite mean and positive variance, got ({mean}, {variance})"
            )));
        }
        Ok(Gaussian { mean, variance })
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn variance(&self) -> f64 {
        self.variance
    }

    /// Density at x.
    pub fn density(&self, x: f64) -> f64 {
        let z = x - self.mean;
        (-z * z / (2.0 * self.variance)).exp()
            / (self.variance * 2.0 * std::f64::consts::PI).sqrt()
    }

    /// Log-density at x, for underflow-safe accumulation.
    pub fn log_density(&self, x: f64) -> f64 {
        let z = x - self.mean;
        -z * z / (2.0 * self.variance)
            - 0.5 * (self.variance * 2.0 * std::f64::consts::PI).ln()
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let normal =
            Normal::new(self.mean, self.variance.sqrt()).expect("validated at construction");
        normal.sample(rng)
    }
}

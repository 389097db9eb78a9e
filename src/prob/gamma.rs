//! Gamma densities in the shape/scale parameterisation.

use rand::Rng;
use rand_distr::Distribution;

use crate::errors::{BayonetError, Result};
use crate::prob::special::log_gamma;

/// A Gamma distribution with shape k and scale θ.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Gamma {
    shape: f64,
    scale: f64,
}

impl Gamma {
    pub fn new(shape: f64, scale: f64) -> Result<Self> {
        if !(shape > 0.0) || !(scale > 0.0) || !shape.is_finite() || !scale.is_finite() {
            return Err(BayonetError::InvalidDomain(format!(
                "Gamma requires positive shape and scale, got ({shape}, {scale})"
            )));
        }
        Ok(Gamma { shape, scale })
    }

    pub fn shape(&self) -> f64 {
        self.shape
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn mean(&self) -> f64 {
        self.shape * self.scale
    }

    /// Density at x; zero for x ≤ 0 (except the k ≥ 1 boundary at x = 0).
    pub fn density(&self, x: f64) -> f64 {
        if x < 0.0 {
            return 0.0;
        }
        if x == 0.0 {
            return if self.shape > 1.0 {
                0.0
            } else if self.shape == 1.0 {
                1.0 / self.scale
            } else {
                f64::INFINITY
            };
        }
        self.log_density(x).exp()
    }

    pub fn log_density(&self, x: f64) -> f64 {
        if x <= 0.0 {
            return f64::NEG_INFINITY;
        }
        (self.shape - 1.0) * x.ln() - x / self.scale
            - log_gamma(self.shape)
            - self.shape * self.scale.ln()
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let gamma =
            rand_distr::Gamma::new(self.shape, self.scale).expect("validated at construction");
        gamma.sample(rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn exponential_special_case() {
        // Gamma(1, theta) is Exponential(1/theta)
        let g = Gamma::new(1.0, 2.0).unwrap();
        let x = 1.3;
        let expected = (1.0 / 2.0) * (-x / 2.0f64).exp();
        assert!((g.density(x) - expected).abs() < 1e-12);
    }

    #[test]
    fn density_vanishes_below_zero() {
        let g = Gamma::new(2.5, 1.0).unwrap();
        assert_eq!(g.density(-1.0), 0.0);
        assert_eq!(g.density(0.0), 0.0);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(Gamma::new(0.0, 1.0).is_err());
        assert!(Gamma::new(1.0, -2.0).is_err());
        assert!(Gamma::new(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn sample_mean_matches_k_theta() {
        let g = Gamma::new(3.0, 2.0).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let n = 50_000;
        let mean = (0..n).map(|_| g.sample(&mut rng)).sum::<f64>() / n as f64;
        assert!((mean - 6.0).abs() < 0.1, "mean = {mean}");
    }
}

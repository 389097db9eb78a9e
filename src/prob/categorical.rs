//! Categorical distributions over enumerable domains.

use rand::Rng;

use crate::dat::{Domain, Value};
use crate::errors::{BayonetError, Result};

/// A probability vector over an enumerable domain.
///
/// The vector is kept non-negative; [`Categorical::normalise`] rescales it to
/// sum to one. Conditional-probability tables, substitution-matrix rows and
/// query marginals are all categoricals.
#[derive(Debug, Clone, PartialEq)]
pub struct Categorical {
    domain: Domain,
    probs: Vec<f64>,
}

impl Categorical {
    /// A uniform distribution over the domain.
    pub fn uniform(domain: Domain) -> Self {
        let n = domain.size();
        Categorical {
            domain,
            probs: vec![1.0 / n as f64; n],
        }
    }

    /// Creates a distribution from explicit probabilities, normalising them.
    ///
    /// Fails when the vector length disagrees with the domain or any entry is
    /// negative or non-finite.
    pub fn new(domain: Domain, probs: Vec<f64>) -> Result<Self> {
        if probs.len() != domain.size() {
            return Err(BayonetError::InvalidDomain(format!(
                "probability vector of length {} does not fit domain '{}' of size {}",
                probs.len(),
                domain.name(),
                domain.size()
            )));
        }
        if probs.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(BayonetError::InvalidDomain(format!(
                "negative or non-finite probability for domain '{}'",
                domain.name()
            )));
        }
        let mut d = Categorical { domain, probs };
        d.normalise();
        Ok(d)
    }

    /// A random distribution drawn from the given RNG, normalised.
    pub fn random<R: Rng + ?Sized>(domain: Domain, rng: &mut R) -> Self {
        let probs = (0..domain.size()).map(|_| rng.gen::<f64>()).collect();
        let mut d = Categorical { domain, probs };
        d.normalise();
        d
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn probs(&self) -> &[f64] {
        &self.probs
    }

    /// Probability mass of a value.
    pub fn get(&self, value: &Value) -> Result<f64> {
        Ok(self.probs[self.domain.require_index(value)?])
    }

    /// Probability mass by value index.
    pub fn get_index(&self, index: usize) -> f64 {
        self.probs[index]
    }

    pub fn set(&mut self, value: &Value, p: f64) -> Result<()> {
        let index = self.domain.require_index(value)?;
        self.probs[index] = p;
        Ok(())
    }

    pub fn set_index(&mut self, index: usize, p: f64) {
        self.probs[index] = p;
    }

    /// Rescales the vector to sum to one. A zero vector becomes uniform.
    pub fn normalise(&mut self) {
        let sum: f64 = self.probs.iter().sum();
        if sum > 0.0 {
            for p in &mut self.probs {
                *p /= sum;
            }
        } else {
            let n = self.probs.len() as f64;
            for p in &mut self.probs {
                *p = 1.0 / n;
            }
        }
    }

    /// Draws a value according to the probability vector.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Value {
        let total: f64 = self.probs.iter().sum();
        let y = rng.gen::<f64>() * total;
        let mut acc = 0.0;
        let mut chosen = self.probs.len() - 1;
        for (i, p) in self.probs.iter().enumerate() {
            acc += p;
            if acc >= y {
                chosen = i;
                break;
            }
        }
        self.domain.value(chosen).clone()
    }

    /// The most probable value; ties resolve to the lowest index.
    pub fn argmax(&self) -> &Value {
        let mut best = 0;
        for (i, p) in self.probs.iter().enumerate() {
            if *p > self.probs[best] {
                best = i;
            }
        }
        self.domain.value(best)
    }

    /// Maximum-likelihood re-estimation from weighted counts aligned with the
    /// domain order.
    pub fn set_counts(&mut self, counts: &[f64]) -> Result<()> {
        if counts.len() != self.probs.len() {
            return Err(BayonetError::InvalidDomain(format!(
                "count vector of length {} does not fit domain '{}'",
                counts.len(),
                self.domain.name()
            )));
        }
        self.probs.copy_from_slice(counts);
        self.normalise();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn new_normalises() {
        let d = Categorical::new(Domain::boolean(), vec![1.0, 3.0]).unwrap();
        assert!((d.get(&Value::Bool(false)).unwrap() - 0.25).abs() < 1e-12);
        assert!((d.get(&Value::Bool(true)).unwrap() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert!(Categorical::new(Domain::boolean(), vec![1.0]).is_err());
    }

    #[test]
    fn negative_mass_is_rejected() {
        assert!(Categorical::new(Domain::boolean(), vec![-0.1, 1.1]).is_err());
    }

    #[test]
    fn zero_vector_normalises_to_uniform() {
        let mut d = Categorical::uniform(Domain::boolean());
        d.set_index(0, 0.0);
        d.set_index(1, 0.0);
        d.normalise();
        assert!((d.get_index(0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn sampling_tracks_the_mass() {
        let d = Categorical::new(Domain::boolean(), vec![0.2, 0.8]).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let n = 20_000;
        let mut hits = 0;
        for _ in 0..n {
            if d.sample(&mut rng) == Value::Bool(true) {
                hits += 1;
            }
        }
        let freq = hits as f64 / n as f64;
        assert!((freq - 0.8).abs() < 0.02, "freq = {freq}");
    }

    #[test]
    fn argmax_breaks_ties_low() {
        let d = Categorical::new(Domain::nominal("T", &["a", "b", "c"]), vec![0.4, 0.4, 0.2])
            .unwrap();
        assert_eq!(d.argmax(), &Value::from("a"));
    }
}

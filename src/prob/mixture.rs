//! Weighted mixtures of distributions.

use rand::Rng;

use crate::errors::Result;
use crate::prob::{Datum, Distrib};

/// A weighted mixture of component distributions.
///
/// Mixtures flatten structurally: adding a mixture to a mixture merges the
/// inner components (scaled by the outer weight) into a single flat component
/// list, so a mixture never contains another mixture. Components comparing
/// equal are merged by summing their weights.
#[derive(Debug, Clone, PartialEq)]
pub struct Mixture {
    components: Vec<(Distrib, f64)>,
    total: f64,
}

impl Mixture {
    /// Creates a mixture from a first component with the given weight.
    pub fn new(component: Distrib, weight: f64) -> Self {
        let mut m = Mixture {
            components: Vec::new(),
            total: 0.0,
        };
        m.add(component, weight);
        m
    }

    /// Adds a component with the given weight.
    ///
    /// A mixture argument is unpacked: each inner component joins this
    /// mixture with its weight multiplied by `weight`.
    pub fn add(&mut self, component: Distrib, weight: f64) {
        match component {
            Distrib::Mixture(inner) => {
                for (d, w) in inner.components {
                    self.add_flat(d, w * weight);
                }
            }
            other => self.add_flat(other, weight),
        }
    }

    fn add_flat(&mut self, component: Distrib, weight: f64) {
        debug_assert!(!matches!(component, Distrib::Mixture(_)));
        self.total += weight;
        for (existing, w) in &mut self.components {
            if *existing == component {
                *w += weight;
                return;
            }
        }
        self.components.push((component, weight));
    }

    pub fn components(&self) -> &[(Distrib, f64)] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Sum of component weights.
    pub fn total_weight(&self) -> f64 {
        self.total
    }

    /// Weighted sum of component densities at the point.
    pub fn density(&self, at: &Datum) -> Result<f64> {
        let mut p = 0.0;
        for (d, w) in &self.components {
            p += d.density(at)? * w;
        }
        Ok(p)
    }

    /// Picks a component by cumulative weight, then samples it.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Datum {
        let y = rng.gen::<f64>() * self.total;
        let mut acc = 0.0;
        let mut chosen = self.components.len() - 1;
        for (i, (_, w)) in self.components.iter().enumerate() {
            acc += w;
            if acc >= y {
                chosen = i;
                break;
            }
        }
        self.components[chosen].0.sample(rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prob::Gaussian;

    fn g(mean: f64) -> Distrib {
        Distrib::Gaussian(Gaussian::new(mean, 1.0).unwrap())
    }

    #[test]
    fn adding_mixture_to_mixture_flattens() {
        let mut m1 = Mixture::new(g(0.0), 1.0);
        m1.add(g(1.0), 2.5);

        let mut m2 = Mixture::new(Distrib::Mixture(m1), 1.0);
        m2.add(g(0.0), 0.5);
        m2.add(g(2.0), 2.0);

        assert_eq!(m2.len(), 3);
        let weights: Vec<f64> = m2.components().iter().map(|(_, w)| *w).collect();
        assert!((weights[0] - 1.5).abs() < 1e-12);
        assert!((weights[1] - 2.5).abs() < 1e-12);
        assert!((weights[2] - 2.0).abs() < 1e-12);
        assert!((m2.total_weight() - 6.0).abs() < 1e-12);
        assert!(m2
            .components()
            .iter()
            .all(|(d, _)| !matches!(d, Distrib::Mixture(_))));
    }

    #[test]
    fn equal_components_merge() {
        let mut m = Mixture::new(g(0.0), 1.0);
        m.add(g(0.0), 3.0);
        assert_eq!(m.len(), 1);
        assert!((m.components()[0].1 - 4.0).abs() < 1e-12);
    }

    #[test]
    fn density_is_the_weighted_sum() {
        let mut m = Mixture::new(g(0.0), 0.25);
        m.add(g(4.0), 0.75);
        let at = Datum::Real(0.0);
        let expected = 0.25 * Gaussian::new(0.0, 1.0).unwrap().density(0.0)
            + 0.75 * Gaussian::new(4.0, 1.0).unwrap().density(0.0);
        assert!((m.density(&at).unwrap() - expected).abs() < 1e-12);
    }
}

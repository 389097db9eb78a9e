//! Dirichlet densities over categorical distributions, with maximum-likelihood
//! estimation of the concentration parameters.

use rand::Rng;

use crate::dat::Domain;
use crate::errors::{BayonetError, Result};
use crate::prob::special::{digamma, log_gamma, trigamma};
use crate::prob::{Categorical, Gamma};

/// Convergence threshold on the squared gradient norm (2⁻²⁰).
const GRADIENT_TOLERANCE_SQ: f64 = 9.536_743_164_062_5e-7;
/// Convergence threshold on the damped learn rate (2⁻¹⁰).
const LEARN_RATE_TOLERANCE: f64 = 9.765_625e-4;
/// Hard cap on estimation rounds.
const MAX_ROUNDS: usize = 1000;

/// A Dirichlet distribution over the probability simplex of a domain.
///
/// Each support point is a [`Categorical`] over the same domain; the density
/// is evaluated at such points and sampling produces them.
#[derive(Debug, Clone, PartialEq)]
pub struct Dirichlet {
    domain: Domain,
    alpha: Vec<f64>,
}

impl Dirichlet {
    /// A symmetric Dirichlet with every concentration set to `same_alpha`.
    pub fn symmetric(domain: Domain, same_alpha: f64) -> Result<Self> {
        let alpha = vec![same_alpha; domain.size()];
        Dirichlet::new(domain, alpha)
    }

    pub fn new(domain: Domain, alpha: Vec<f64>) -> Result<Self> {
        if alpha.len() != domain.size() {
            return Err(BayonetError::InvalidDomain(format!(
                "alpha vector of length {} does not fit domain '{}' of size {}",
                alpha.len(),
                domain.name(),
                domain.size()
            )));
        }
        if alpha.iter().any(|a| !a.is_finite() || *a <= 0.0) {
            return Err(BayonetError::InvalidDomain(format!(
                "non-positive concentration for domain '{}'",
                domain.name()
            )));
        }
        Ok(Dirichlet { domain, alpha })
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn alpha(&self) -> &[f64] {
        &self.alpha
    }

    pub fn set_alpha(&mut self, alpha: Vec<f64>) -> Result<()> {
        *self = Dirichlet::new(self.domain.clone(), alpha)?;
        Ok(())
    }

    /// Sum of concentrations, α₀.
    pub fn concentration(&self) -> f64 {
        self.alpha.iter().sum()
    }

    /// Mean point of the distribution, αᵢ/α₀.
    pub fn mean(&self) -> Categorical {
        let sum = self.concentration();
        Categorical::new(
            self.domain.clone(),
            self.alpha.iter().map(|a| a / sum).collect(),
        )
        .expect("alpha is positive")
    }

    /// Density at a categorical point on the simplex.
    pub fn density(&self, point: &Categorical) -> Result<f64> {
        if point.domain() != &self.domain {
            return Err(BayonetError::InvalidDomain(format!(
                "point over domain '{}' evaluated against Dirichlet over '{}'",
                point.domain().name(),
                self.domain.name()
            )));
        }
        Ok(self.log_density(point).exp())
    }

    fn log_density(&self, point: &Categorical) -> f64 {
        let mut log_p = log_gamma(self.concentration());
        for (i, a) in self.alpha.iter().enumerate() {
            log_p -= log_gamma(*a);
            log_p += (a - 1.0) * point.get_index(i).ln();
        }
        log_p
    }

    /// Draws a categorical point by normalising independent gamma draws.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Categorical {
        let mut draws = Vec::with_capacity(self.alpha.len());
        let mut sum = 0.0;
        for a in &self.alpha {
            let g = Gamma::new(*a, 1.0).expect("alpha is positive");
            let y = g.sample(rng);
            sum += y;
            draws.push(y);
        }
        for d in &mut draws {
            *d /= sum;
        }
        Categorical::new(self.domain.clone(), draws).expect("gamma draws are non-negative")
    }

    /// Re-estimates α by maximum likelihood from observed categorical
    /// distributions and stores the result.
    pub fn fit(&mut self, observed: &[Categorical]) -> Result<()> {
        if observed.is_empty() {
            return Err(BayonetError::InvalidDomain(
                "cannot estimate Dirichlet from no observations".into(),
            ));
        }
        let ss = sufficient_statistic(observed, self.alpha.len());
        self.alpha = estimate_alpha(&self.alpha, &ss);
        Ok(())
    }
}

/// The sufficient statistic for α estimation: the mean of the observed
/// log-probabilities, per domain position.
pub fn sufficient_statistic(observed: &[Categorical], k: usize) -> Vec<f64> {
    let mut ss = vec![0.0; k];
    for dist in observed {
        for (i, s) in ss.iter_mut().enumerate() {
            *s += dist.get_index(i).ln();
        }
    }
    let n = observed.len() as f64;
    for s in &mut ss {
        *s /= n;
    }
    ss
}

/// Log-probability of the data (up to a linear transform) for trial α values.
fn log_prob(alpha: &[f64], ss: &[f64]) -> f64 {
    let mut alpha_sum = 0.0;
    let mut lgamma_sum = 0.0;
    let mut pq = 0.0;
    for (a, s) in alpha.iter().zip(ss) {
        alpha_sum += a;
        lgamma_sum += log_gamma(*a);
        pq += a * s;
    }
    log_gamma(alpha_sum) - lgamma_sum + pq
}

fn loss(alpha: &[f64], ss: &[f64]) -> f64 {
    if alpha.iter().any(|a| *a <= 0.0) {
        return f64::INFINITY; // invalid trial
    }
    -log_prob(alpha, ss)
}

fn gradient(alpha: &[f64], ss: &[f64]) -> Vec<f64> {
    let alpha_sum: f64 = alpha.iter().sum();
    let c = digamma(alpha_sum);
    alpha
        .iter()
        .zip(ss)
        .map(|(a, s)| c + s - digamma(*a))
        .collect()
}

/// Newton step from the structured Hessian (a diagonal plus a constant).
fn newton_step(alpha: &[f64], grad: &[f64]) -> Vec<f64> {
    let alpha_sum: f64 = alpha.iter().sum();
    let h_const = -trigamma(alpha_sum);
    let h_diag: Vec<f64> = alpha.iter().map(|a| trigamma(*a)).collect();
    let num_sum: f64 = grad.iter().zip(&h_diag).map(|(g, h)| g / h).sum();
    let den_sum: f64 = h_diag.iter().map(|h| 1.0 / h).sum();
    let b = num_sum / (1.0 / h_const + den_sum);
    grad.iter()
        .zip(&h_diag)
        .map(|(g, h)| (b - g) / h)
        .collect()
}

/// Multiplicative step computed in log-α space, used when the Newton step
/// does not improve the loss.
fn log_space_step(alpha: &[f64], grad: &[f64]) -> Vec<f64> {
    let alpha_sum: f64 = alpha.iter().sum();
    let h_const = -trigamma(alpha_sum);
    let h_diag: Vec<f64> = alpha.iter().map(|a| trigamma(*a)).collect();
    let mut z = 0.0;
    for i in 0..alpha.len() {
        z += alpha[i] / (grad[i] - alpha[i] * h_diag[i]);
    }
    z *= h_const;
    let mut sum_s = 0.0;
    for i in 0..alpha.len() {
        sum_s += 1.0 / (grad[i] - alpha[i] * h_diag[i]) / (1.0 + z);
    }
    (0..alpha.len())
        .map(|i| {
            grad[i] / (grad[i] - alpha[i] * h_diag[i]) * (1.0 - h_const * alpha[i] * sum_s)
        })
        .collect()
}

/// Finds α maximising the likelihood of the sufficient statistic, starting
/// from `alpha_start`.
///
/// Tries a second-order Newton step first, then a log-space multiplicative
/// step, then damped gradient ascent. Converges when the squared gradient
/// norm drops below 2⁻²⁰ or the damped learn rate below 2⁻¹⁰.
pub fn estimate_alpha(alpha_start: &[f64], ss: &[f64]) -> Vec<f64> {
    let mut current = alpha_start.to_vec();
    let mut current_loss = loss(&current, ss);
    let mut trial = vec![0.0; current.len()];

    for _ in 0..MAX_ROUNDS {
        let grad = gradient(&current, ss);
        let grad_sq: f64 = grad.iter().map(|g| g * g).sum();
        if grad_sq < GRADIENT_TOLERANCE_SQ {
            return current;
        }

        let step = newton_step(&current, &grad);
        for (t, (c, s)) in trial.iter_mut().zip(current.iter().zip(&step)) {
            *t = c + s;
        }
        let trial_loss = loss(&trial, ss);
        if trial_loss < current_loss {
            current_loss = trial_loss;
            current.copy_from_slice(&trial);
            continue;
        }

        let step = log_space_step(&current, &grad);
        for (t, (c, s)) in trial.iter_mut().zip(current.iter().zip(&step)) {
            *t = c * s.exp();
        }
        let trial_loss = loss(&trial, ss);
        if trial_loss < current_loss {
            current_loss = trial_loss;
            current.copy_from_slice(&trial);
            continue;
        }

        // Damped ascent along the gradient until the loss improves.
        let mut trial_loss = f64::INFINITY;
        let mut learn_rate = 1.0;
        while trial_loss > current_loss {
            for (t, (c, g)) in trial.iter_mut().zip(current.iter().zip(&grad)) {
                *t = c + g * learn_rate;
            }
            trial_loss = loss(&trial, ss);
            learn_rate *= 0.9;
        }
        if learn_rate < LEARN_RATE_TOLERANCE {
            return trial;
        }
        current_loss = trial_loss;
        current.copy_from_slice(&trial);
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tri() -> Domain {
        Domain::nominal("Tri", &["a", "b", "c"])
    }

    #[test]
    fn mean_is_alpha_over_sum() {
        let d = Dirichlet::new(tri(), vec![2.0, 3.0, 5.0]).unwrap();
        let mean = d.mean();
        assert!((mean.get_index(0) - 0.2).abs() < 1e-12);
        assert!((mean.get_index(1) - 0.3).abs() < 1e-12);
        assert!((mean.get_index(2) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn non_positive_alpha_is_rejected() {
        assert!(Dirichlet::new(tri(), vec![1.0, 0.0, 1.0]).is_err());
        assert!(Dirichlet::new(tri(), vec![1.0, 1.0]).is_err());
    }

    #[test]
    fn uniform_dirichlet_has_constant_density() {
        // Dir(1,1,1) is uniform on the simplex with density Gamma(3) = 2
        let d = Dirichlet::symmetric(tri(), 1.0).unwrap();
        let p1 = Categorical::new(tri(), vec![0.2, 0.3, 0.5]).unwrap();
        let p2 = Categorical::new(tri(), vec![0.6, 0.3, 0.1]).unwrap();
        assert!((d.density(&p1).unwrap() - 2.0).abs() < 1e-9);
        assert!((d.density(&p2).unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn samples_live_on_the_simplex() {
        let d = Dirichlet::new(tri(), vec![0.5, 2.0, 7.0]).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let p = d.sample(&mut rng);
            let sum: f64 = p.probs().iter().sum();
            assert!((sum - 1.0).abs() < 1e-9);
            assert!(p.probs().iter().all(|x| *x >= 0.0));
        }
    }

    #[test]
    fn estimation_recovers_concentrated_alpha() {
        // Sample many points from a known Dirichlet and refit; the recovered
        // mean direction should be close to the true one.
        let truth = Dirichlet::new(tri(), vec![8.0, 4.0, 2.0]).unwrap();
        let mut rng = StdRng::seed_from_u64(17);
        let observed: Vec<Categorical> = (0..500).map(|_| truth.sample(&mut rng)).collect();

        let mut fitted = Dirichlet::symmetric(tri(), 1.0).unwrap();
        fitted.fit(&observed).unwrap();

        let true_mean = truth.mean();
        let fitted_mean = fitted.mean();
        for i in 0..3 {
            assert!(
                (true_mean.get_index(i) - fitted_mean.get_index(i)).abs() < 0.05,
                "component {i}: {} vs {}",
                true_mean.get_index(i),
                fitted_mean.get_index(i)
            );
        }
    }
}

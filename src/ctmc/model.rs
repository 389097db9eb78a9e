//! Time-reversible substitution models and their transition probabilities.

use std::sync::Mutex;

use nalgebra::{DMatrix, DVector};
use rustc_hash::FxHashMap;

use crate::dat::{Domain, Value};
use crate::errors::{BayonetError, Result};
use crate::prob::Categorical;

/// Row sums of `probs(t)` may drift this far from 1 before renormalisation.
const ROW_SUM_TOLERANCE: f64 = 1e-6;
/// Detailed-balance asymmetry beyond this marks the model degenerate.
const REVERSIBILITY_TOLERANCE: f64 = 1e-9;

/// A continuous-time Markov substitution model over a finite alphabet.
///
/// The model is specified by stationary frequencies π and either a symmetric
/// exchange matrix S (with `Qij = Sij·πj`) or a rate matrix Q directly. At
/// construction the rate matrix is made valid (rows sum to zero), normalised
/// to one expected substitution per unit time, and eigen-decomposed once;
/// transition-probability matrices for any branch length then follow from the
/// cached decomposition.
#[derive(Debug)]
pub struct SubstModel {
    name: String,
    domain: Domain,
    freqs: Vec<f64>,
    q: DMatrix<f64>,
    eigvals: DVector<f64>,
    eigvecs: DMatrix<f64>,
    inv_eigvecs: DMatrix<f64>,
    degenerate: bool,
    cache: Mutex<FxHashMap<u64, std::sync::Arc<Vec<f64>>>>,
}

impl SubstModel {
    /// Creates a model from stationary frequencies and a matrix.
    ///
    /// With `symmetric` set, `matrix` is read as an unscaled symmetric
    /// exchange matrix S; otherwise it is taken directly as the rate matrix
    /// Q. Dimension mismatches and non-positive frequencies fail with
    /// [`BayonetError::InvalidModel`].
    pub fn new(
        name: &str,
        freqs: &[f64],
        matrix: &DMatrix<f64>,
        domain: Domain,
        symmetric: bool,
    ) -> Result<Self> {
        let k = freqs.len();
        if matrix.nrows() != k || matrix.ncols() != k {
            return Err(BayonetError::InvalidModel(format!(
                "model '{name}': matrix is {}x{} but {k} frequencies given",
                matrix.nrows(),
                matrix.ncols()
            )));
        }
        if domain.size() != k {
            return Err(BayonetError::InvalidModel(format!(
                "model '{name}': alphabet has {} states but {k} frequencies given",
                domain.size()
            )));
        }
        if freqs.iter().any(|f| !f.is_finite() || *f <= 0.0) {
            return Err(BayonetError::InvalidModel(format!(
                "model '{name}': stationary frequencies must be positive and finite"
            )));
        }

        let mut q = DMatrix::zeros(k, k);
        if symmetric {
            for i in 0..k {
                for j in (i + 1)..k {
                    let s = matrix[(i, j)].max(matrix[(j, i)]);
                    q[(i, j)] = s * freqs[j];
                    q[(j, i)] = s * freqs[i];
                }
            }
        } else {
            for i in 0..k {
                for j in 0..k {
                    if i != j {
                        q[(i, j)] = matrix[(i, j)];
                    }
                }
            }
        }

        // rows sum to zero
        for i in 0..k {
            let off: f64 = (0..k).filter(|&j| j != i).map(|j| q[(i, j)]).sum();
            q[(i, i)] = -off;
        }
        // one expected substitution per unit time
        let rate: f64 = (0..k).map(|i| -q[(i, i)] * freqs[i]).sum();
        if !(rate > 0.0) || !rate.is_finite() {
            return Err(BayonetError::InvalidModel(format!(
                "model '{name}': expected substitution rate {rate} is not positive"
            )));
        }
        q /= rate;

        // Decompose through the detailed-balance symmetrisation
        // B = diag(sqrt(pi)) Q diag(1/sqrt(pi)), symmetric for reversible Q.
        let sqrt_pi: Vec<f64> = freqs.iter().map(|f| f.sqrt()).collect();
        let mut b = DMatrix::zeros(k, k);
        for i in 0..k {
            for j in 0..k {
                b[(i, j)] = sqrt_pi[i] * q[(i, j)] / sqrt_pi[j];
            }
        }
        let mut asymmetry = 0.0f64;
        for i in 0..k {
            for j in (i + 1)..k {
                asymmetry = asymmetry.max((b[(i, j)] - b[(j, i)]).abs());
            }
        }
        let degenerate = asymmetry > REVERSIBILITY_TOLERANCE;
        let b_sym = (&b + b.transpose()) * 0.5;

        let eigen = b_sym.symmetric_eigen();
        if eigen.eigenvalues.iter().any(|v| !v.is_finite())
            || eigen.eigenvectors.iter().any(|v| !v.is_finite())
        {
            return Err(BayonetError::InvalidModel(format!(
                "model '{name}': degenerate rate matrix"
            )));
        }
        // Q = diag(1/sqrt(pi)) U L U' diag(sqrt(pi))
        let u = eigen.eigenvectors;
        let mut eigvecs = u.clone();
        let mut inv_eigvecs = u.transpose();
        for i in 0..k {
            for j in 0..k {
                eigvecs[(i, j)] /= sqrt_pi[i];
                inv_eigvecs[(i, j)] *= sqrt_pi[j];
            }
        }

        Ok(SubstModel {
            name: name.to_string(),
            domain,
            freqs: freqs.to_vec(),
            q,
            eigvals: eigen.eigenvalues,
            eigvecs,
            inv_eigvecs,
            degenerate,
            cache: Mutex::new(FxHashMap::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The alphabet the model substitutes over.
    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Stationary frequencies π.
    pub fn freqs(&self) -> &[f64] {
        &self.freqs
    }

    /// The normalised rate matrix Q.
    pub fn rate_matrix(&self) -> &DMatrix<f64> {
        &self.q
    }

    /// True when the supplied rate matrix violated detailed balance and the
    /// decomposition ran on its symmetrised part.
    pub fn is_degenerate(&self) -> bool {
        self.degenerate
    }

    /// The stationary distribution as a categorical over the alphabet.
    pub fn stationary(&self) -> Categorical {
        Categorical::new(self.domain.clone(), self.freqs.clone())
            .expect("frequencies validated at construction")
    }

    /// Transition probabilities after time `t`, cached per `t`.
    ///
    /// `probs(t)[i][j]` is P(state j at time t | state i at time 0), stored
    /// row-major. Rows are guaranteed to sum to one within 1e-6, renormalised
    /// when the decomposition drifts further. Repeated queries at the same
    /// time reuse the cached matrix; the cache lock makes the model shareable
    /// across worker threads.
    pub fn probs(&self, time: f64) -> std::sync::Arc<Vec<f64>> {
        let key = time.to_bits();
        let mut cache = self.cache.lock().expect("probs cache poisoned");
        if let Some(hit) = cache.get(&key) {
            return hit.clone();
        }
        let k = self.freqs.len();
        // V diag(exp(t*lambda)) V^-1, with |.| to suppress sign noise
        let mut scaled = self.inv_eigvecs.clone();
        for r in 0..k {
            let e = (time * self.eigvals[r]).exp();
            for c in 0..k {
                scaled[(r, c)] *= e;
            }
        }
        let p = &self.eigvecs * scaled;
        let mut rows = vec![0.0; k * k];
        for i in 0..k {
            let mut sum = 0.0;
            for j in 0..k {
                let v = p[(i, j)].abs();
                rows[i * k + j] = v;
                sum += v;
            }
            if (sum - 1.0).abs() > ROW_SUM_TOLERANCE {
                for j in 0..k {
                    rows[i * k + j] /= sum;
                }
            }
        }
        let arc = std::sync::Arc::new(rows);
        cache.insert(key, arc.clone());
        arc
    }

    /// P(descendant state `x` at time `t` | ancestor state `y` at time 0).
    pub fn prob(&self, x: &Value, y: &Value, time: f64) -> Result<f64> {
        let col = self.domain.require_index(x)?;
        let row = self.domain.require_index(y)?;
        let k = self.domain.size();
        Ok(self.probs(time)[row * k + col])
    }

    /// The conditional distribution of the descendant state given ancestor
    /// state `y` after time `t`: one row of `probs(t)`.
    pub fn distrib(&self, y: &Value, time: f64) -> Result<Categorical> {
        let row = self.domain.require_index(y)?;
        let k = self.domain.size();
        let p = self.probs(time);
        Categorical::new(self.domain.clone(), p[row * k..(row + 1) * k].to_vec())
    }
}

//! Substitution nodes: categorical CPTs on phylogenetic edges, generated
//! from a shared substitution model at the edge's branch length.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::ctmc::SubstModel;
use crate::dat::{Value, Variable};
use crate::errors::{BayonetError, Result};
use crate::factor::Factor;
use crate::prob::Datum;

/// A node whose conditional table is `P(child | parent) = probs(t)` for a
/// substitution model, or the stationary distribution π at the root.
#[derive(Debug, Clone)]
pub struct SubstNode {
    var: Variable,
    parents: Vec<Variable>,
    model: Arc<SubstModel>,
    time: f64,
}

impl SubstNode {
    /// Creates an edge node: `var` conditioned on `parent` across a branch of
    /// length `time`.
    pub fn new(
        var: Variable,
        parent: Variable,
        model: Arc<SubstModel>,
        time: f64,
    ) -> Result<Self> {
        for v in [&var, &parent] {
            if v.domain() != Some(model.domain()) {
                return Err(BayonetError::InvalidModel(format!(
                    "variable '{}' is not over the alphabet of model '{}'",
                    v.name(),
                    model.name()
                )));
            }
        }
        if !(time >= 0.0) || !time.is_finite() {
            return Err(BayonetError::InvalidModel(format!(
                "branch length {time} must be non-negative and finite"
            )));
        }
        Ok(SubstNode {
            var,
            parents: vec![parent],
            model,
            time,
        })
    }

    /// Creates a root node holding the stationary distribution.
    pub fn root(var: Variable, model: Arc<SubstModel>) -> Result<Self> {
        if var.domain() != Some(model.domain()) {
            return Err(BayonetError::InvalidModel(format!(
                "variable '{}' is not over the alphabet of model '{}'",
                var.name(),
                model.name()
            )));
        }
        Ok(SubstNode {
            var,
            parents: Vec::new(),
            model,
            time: 0.0,
        })
    }

    pub fn variable(&self) -> &Variable {
        &self.var
    }

    pub fn parents(&self) -> &[Variable] {
        &self.parents
    }

    pub fn model(&self) -> &Arc<SubstModel> {
        &self.model
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    fn observed(&self, of: &Variable, evidence: &FxHashMap<Variable, Datum>) -> Result<Option<usize>> {
        match evidence.get(of) {
            Some(Datum::Value(v)) => Ok(Some(self.model.domain().require_index(v)?)),
            Some(other) => Err(BayonetError::InvalidDomain(format!(
                "evidence for '{}' must be a value, got {other}",
                of.name()
            ))),
            None => Ok(None),
        }
    }

    /// Emits the per-edge conditional factor under the given evidence.
    pub fn make_factor(&self, evidence: &FxHashMap<Variable, Datum>) -> Result<Factor> {
        let domain = self.model.domain();
        let k = domain.size();
        let self_obs = self.observed(&self.var, evidence)?;

        let Some(parent) = self.parents.first() else {
            // root prior = stationary frequencies
            return Ok(match self_obs {
                Some(i) => {
                    let mut f = Factor::scalar(self.model.freqs()[i]);
                    f.set_evidenced(true);
                    f
                }
                None => {
                    let mut f = Factor::new(vec![self.var.clone()]);
                    for (i, p) in self.model.freqs().iter().enumerate() {
                        f.set_weight(i, *p);
                    }
                    f
                }
            });
        };

        let probs = self.model.probs(self.time);
        let parent_obs = self.observed(parent, evidence)?;
        let f = match (parent_obs, self_obs) {
            (Some(i), Some(j)) => {
                let mut f = Factor::scalar(probs[i * k + j]);
                f.set_evidenced(true);
                f
            }
            (Some(i), None) => {
                let mut f = Factor::new(vec![self.var.clone()]);
                for j in 0..k {
                    f.set_weight(j, probs[i * k + j]);
                }
                f.set_evidenced(true);
                f
            }
            (None, Some(j)) => {
                let mut f = Factor::new(vec![parent.clone()]);
                for i in 0..k {
                    f.set_weight(i, probs[i * k + j]);
                }
                f.set_evidenced(true);
                f
            }
            (None, None) => {
                let mut f = Factor::new(vec![parent.clone(), self.var.clone()]);
                // layout follows canonical order, which may put self first
                let parent_first = parent < &self.var;
                for i in 0..k {
                    for j in 0..k {
                        let key: [Value; 2] = if parent_first {
                            [domain.value(i).clone(), domain.value(j).clone()]
                        } else {
                            [domain.value(j).clone(), domain.value(i).clone()]
                        };
                        f.set_weight_by_key(&key, probs[i * k + j])?;
                    }
                }
                f
            }
        };
        Ok(f)
    }

    /// The conditional distribution of the node's variable given its parent
    /// value (or the stationary distribution at the root).
    pub fn conditional(&self, parent_values: &[Value]) -> Result<crate::prob::Categorical> {
        match (self.parents.first(), parent_values.first()) {
            (None, _) => Ok(self.model.stationary()),
            (Some(_), Some(y)) => self.model.distrib(y, self.time),
            (Some(p), None) => Err(BayonetError::InvalidDomain(format!(
                "substitution node '{}' needs a value for parent '{}'",
                self.var.name(),
                p.name()
            ))),
        }
    }

    /// Serialises the model name and branch length.
    pub fn state_as_text(&self) -> String {
        format!("{}, {};\n", self.model.name(), self.time)
    }

    /// Restores the branch length; the model itself is shared and fixed.
    pub fn set_state_from_text(&mut self, text: &str) -> Result<()> {
        let spec = text.trim().split(';').next().unwrap_or("");
        let time_text = spec.rsplit(',').next().unwrap_or("").trim();
        let time: f64 = time_text.parse().map_err(|e| {
            BayonetError::InvalidDomain(format!("unreadable branch length: {e}"))
        })?;
        if !(time >= 0.0) || !time.is_finite() {
            return Err(BayonetError::InvalidModel(format!(
                "branch length {time} must be non-negative and finite"
            )));
        }
        self.time = time;
        Ok(())
    }
}

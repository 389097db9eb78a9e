//! Categorical conditional-probability tables.

use rustc_hash::FxHashMap;

use crate::bn::node::{evidence_search_key, key_from_bindings, rows_consistent};
use crate::dat::{CountTable, EnumTable, Value, Variable};
use crate::errors::{BayonetError, Result};
use crate::factor::Factor;
use crate::prob::{Categorical, Datum};

/// A conditional-probability table: one categorical distribution over the
/// node's variable per combination of enumerable parent values. A table with
/// no parents is a prior.
#[derive(Debug, Clone)]
pub struct Cpt {
    var: Variable,
    parents: Vec<Variable>,
    table: Option<EnumTable<Categorical>>,
    prior: Option<Categorical>,
    counts: Option<CountTable>,
    pseudo: Option<Vec<f64>>,
}

impl Cpt {
    /// Creates an empty CPT for an enumerable variable conditioned on
    /// enumerable parents.
    pub fn new(var: Variable, parents: Vec<Variable>) -> Result<Self> {
        if !var.is_enumerable() {
            return Err(BayonetError::InvalidDomain(format!(
                "CPT variable '{}' must be enumerable",
                var.name()
            )));
        }
        let table = if parents.is_empty() {
            None
        } else {
            Some(EnumTable::new(parents.clone())?)
        };
        Ok(Cpt {
            var,
            parents,
            table,
            prior: None,
            counts: None,
            pseudo: None,
        })
    }

    /// Creates a root prior.
    pub fn prior(var: Variable, distrib: Categorical) -> Result<Self> {
        let mut cpt = Cpt::new(var, Vec::new())?;
        cpt.prior = Some(distrib);
        Ok(cpt)
    }

    pub fn variable(&self) -> &Variable {
        &self.var
    }

    pub fn parents(&self) -> &[Variable] {
        &self.parents
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// Sets the distribution for a parent configuration.
    pub fn put(&mut self, key: &[Value], distrib: Categorical) -> Result<()> {
        match &mut self.table {
            Some(table) => table.set_by_key(key, distrib),
            None if key.is_empty() => {
                self.prior = Some(distrib);
                Ok(())
            }
            None => Err(BayonetError::InvalidDomain(format!(
                "CPT for root '{}' takes an empty key",
                self.var.name()
            ))),
        }
    }

    /// The distribution for a parent configuration.
    pub fn get(&self, key: &[Value]) -> Result<&Categorical> {
        match &self.table {
            Some(table) => table.value_by_key(key)?.ok_or_else(|| {
                BayonetError::IncompleteNetwork(format!(
                    "CPT for '{}' has no distribution at the requested key",
                    self.var.name()
                ))
            }),
            None => self.prior.as_ref().ok_or_else(|| {
                BayonetError::IncompleteNetwork(format!(
                    "prior for '{}' is unset",
                    self.var.name()
                ))
            }),
        }
    }

    /// P(var = value | parents = key).
    pub fn prob(&self, key: &[Value], value: &Value) -> Result<f64> {
        self.get(key)?.get(value)
    }

    /// Per-value pseudo-counts added before each maximum-likelihood update,
    /// aligned with the variable's domain order.
    pub fn set_pseudo_counts(&mut self, pseudo: Vec<f64>) -> Result<()> {
        if pseudo.len() != self.var.size() {
            return Err(BayonetError::InvalidDomain(format!(
                "pseudo-count vector of length {} does not fit '{}'",
                pseudo.len(),
                self.var.name()
            )));
        }
        self.pseudo = Some(pseudo);
        Ok(())
    }

    /// Records one weighted observation of `(parents = key, var = value)`.
    pub fn count(&mut self, key: &[Value], value: &Value, weight: f64) -> Result<()> {
        if self.counts.is_none() {
            let mut vars = self.parents.clone();
            vars.push(self.var.clone());
            self.counts = Some(CountTable::new(vars)?);
        }
        let mut full: Vec<Value> = key.to_vec();
        full.push(value.clone());
        self.counts
            .as_mut()
            .expect("created above")
            .count(&full, weight)
    }

    /// Maximum-likelihood update from accumulated counts (plus pseudo-counts
    /// when configured). Rows with no observations keep their distribution.
    pub fn maximise(&mut self) -> Result<()> {
        let Some(counts) = self.counts.take() else {
            return Ok(());
        };
        let domain = self.var.domain().expect("cpt variable is enumerable").clone();
        let k = domain.size();
        let rows = match &self.table {
            Some(table) => table.size(),
            None => 1,
        };
        for row in 0..rows {
            let row_key: Vec<Value> = match &self.table {
                Some(table) => table.key(row).to_vec(),
                None => Vec::new(),
            };
            let mut observed = vec![0.0; k];
            let mut any = false;
            for (i, slot) in observed.iter_mut().enumerate() {
                let mut full = row_key.clone();
                full.push(domain.value(i).clone());
                let c = counts.get(counts.index_of(&full)?);
                if c > 0.0 {
                    any = true;
                }
                *slot = c;
            }
            if !any {
                continue;
            }
            if let Some(pseudo) = &self.pseudo {
                for (slot, p) in observed.iter_mut().zip(pseudo) {
                    *slot += p;
                }
            }
            let mut distrib = Categorical::uniform(domain.clone());
            distrib.set_counts(&observed)?;
            self.put(&row_key, distrib)?;
        }
        Ok(())
    }

    /// Emits the factor for this CPT under the given evidence.
    ///
    /// An evidenced variable collapses its own dimension (cell values become
    /// the probability of the observed value); evidenced parents project the
    /// table to their observed rows.
    pub fn make_factor(&self, evidence: &FxHashMap<Variable, Datum>) -> Result<Factor> {
        let self_obs = match evidence.get(&self.var) {
            Some(Datum::Value(v)) => {
                self.var.domain().expect("enumerable").require_index(v)?;
                Some(v.clone())
            }
            Some(other) => {
                return Err(BayonetError::InvalidDomain(format!(
                    "evidence for '{}' must be a value, got {other}",
                    self.var.name()
                )))
            }
            None => None,
        };

        let Some(table) = &self.table else {
            // root prior
            let prior = self.prior.as_ref().ok_or_else(|| {
                BayonetError::IncompleteNetwork(format!(
                    "prior for '{}' is unset",
                    self.var.name()
                ))
            })?;
            return match self_obs {
                Some(obs) => {
                    let mut f = Factor::scalar(prior.get(&obs)?);
                    f.set_evidenced(true);
                    Ok(f)
                }
                None => {
                    let mut f = Factor::new(vec![self.var.clone()]);
                    for v in self.var.domain().expect("enumerable").values() {
                        f.set_weight_by_key(&[v.clone()], prior.get(v)?)?;
                    }
                    Ok(f)
                }
            };
        };

        let search = evidence_search_key(&self.parents, evidence)?;
        let any_parent_evidenced = search.iter().any(Option::is_some);
        let mut vars: Vec<Variable> = self
            .parents
            .iter()
            .zip(&search)
            .filter(|(_, s)| s.is_none())
            .map(|(p, _)| p.clone())
            .collect();
        if self_obs.is_none() {
            vars.push(self.var.clone());
        }
        let mut f = Factor::new(vars);
        if self_obs.is_some() || any_parent_evidenced {
            f.set_evidenced(true);
        }

        for (index, bindings) in rows_consistent(table, &search)? {
            let distrib = table.value(index).ok_or_else(|| {
                BayonetError::IncompleteNetwork(format!(
                    "CPT for '{}' has an unset row",
                    self.var.name()
                ))
            })?;
            match &self_obs {
                Some(obs) => {
                    let key = key_from_bindings(&f, &bindings);
                    if f.is_atomic() {
                        f.set_weight(0, f.value() + distrib.get(obs)?);
                    } else {
                        f.set_weight_by_key(&key, distrib.get(obs)?)?;
                    }
                }
                None => {
                    for v in self.var.domain().expect("enumerable").values() {
                        let mut full = bindings.clone();
                        full.push((self.var.clone(), v.clone()));
                        let key = key_from_bindings(&f, &full);
                        f.set_weight_by_key(&key, distrib.get(v)?)?;
                    }
                }
            }
        }
        Ok(f)
    }

    /// Serialises the table as `index: p0, p1, ...; (key)` lines.
    pub fn state_as_text(&self) -> String {
        let mut out = String::new();
        let fmt_probs = |d: &Categorical| {
            d.probs()
                .iter()
                .map(|p| format!("{p}"))
                .collect::<Vec<_>>()
                .join(", ")
        };
        match &self.table {
            Some(table) => {
                for (index, distrib) in table.iter() {
                    let key = table.key(index);
                    let key_text = key
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ");
                    out.push_str(&format!(
                        "{index}: {}; ({key_text})\n",
                        fmt_probs(distrib)
                    ));
                }
            }
            None => {
                if let Some(prior) = &self.prior {
                    out.push_str(&format!("{};\n", fmt_probs(prior)));
                }
            }
        }
        out
    }

    /// Restores the table from [`Cpt::state_as_text`] output.
    pub fn set_state_from_text(&mut self, text: &str) -> Result<()> {
        let domain = self.var.domain().expect("enumerable").clone();
        let parse_probs = |spec: &str| -> Result<Categorical> {
            let probs: std::result::Result<Vec<f64>, _> =
                spec.split(',').map(|p| p.trim().parse::<f64>()).collect();
            let probs = probs.map_err(|e| {
                BayonetError::InvalidDomain(format!("unreadable probability: {e}"))
            })?;
            Categorical::new(domain.clone(), probs)
        };
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let spec = line.split(';').next().unwrap_or("");
            match &mut self.table {
                Some(table) => {
                    let (index_text, probs_text) =
                        spec.split_once(':').ok_or_else(|| {
                            BayonetError::InvalidDomain(format!("unreadable CPT line '{line}'"))
                        })?;
                    let index: usize = index_text.trim().parse().map_err(|e| {
                        BayonetError::InvalidDomain(format!("unreadable CPT index: {e}"))
                    })?;
                    if index >= table.size() {
                        return Err(BayonetError::InvalidDomain(format!(
                            "CPT index {index} out of range"
                        )));
                    }
                    table.set_value(index, parse_probs(probs_text)?);
                }
                None => self.prior = Some(parse_probs(spec)?),
            }
        }
        Ok(())
    }
}

//! Gaussian density tables: a continuous variable conditioned on enumerable
//! parents, one Gaussian per parent configuration.

use rustc_hash::FxHashMap;

use crate::bn::node::{evidence_search_key, key_from_bindings, rows_consistent};
use crate::dat::{EnumTable, SampleTable, Value, Variable};
use crate::errors::{BayonetError, Result};
use crate::factor::Factor;
use crate::prob::{Datum, Distrib, Gaussian};

/// Variances never drop below this floor during training.
const VARIANCE_FLOOR: f64 = 0.01;

/// How per-row variances are coupled when the table is re-estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VariancePolicy {
    /// Every row keeps its own variance.
    Untied,
    /// All rows share the largest row variance.
    TiedMax,
    /// All rows share the pooled variance Σ(nᵢ−1)σᵢ² / Σ(nᵢ−1).
    #[default]
    TiedPooled,
}

/// A Gaussian density table.
#[derive(Debug, Clone)]
pub struct Gdt {
    var: Variable,
    parents: Vec<Variable>,
    table: Option<EnumTable<Gaussian>>,
    prior: Option<Gaussian>,
    samples: Option<SampleTable<f64>>,
    policy: VariancePolicy,
}

impl Gdt {
    /// Creates an empty Gaussian table for a continuous variable conditioned
    /// on enumerable parents.
    pub fn new(var: Variable, parents: Vec<Variable>) -> Result<Self> {
        if var.is_enumerable() {
            return Err(BayonetError::InvalidDomain(format!(
                "GDT variable '{}' must be continuous",
                var.name()
            )));
        }
        let table = if parents.is_empty() {
            None
        } else {
            Some(EnumTable::new(parents.clone())?)
        };
        Ok(Gdt {
            var,
            parents,
            table,
            prior: None,
            samples: None,
            policy: VariancePolicy::default(),
        })
    }

    pub fn variable(&self) -> &Variable {
        &self.var
    }

    pub fn parents(&self) -> &[Variable] {
        &self.parents
    }

    pub fn set_variance_policy(&mut self, policy: VariancePolicy) {
        self.policy = policy;
    }

    pub fn put(&mut self, key: &[Value], distrib: Gaussian) -> Result<()> {
        match &mut self.table {
            Some(table) => table.set_by_key(key, distrib),
            None if key.is_empty() => {
                self.prior = Some(distrib);
                Ok(())
            }
            None => Err(BayonetError::InvalidDomain(format!(
                "GDT for root '{}' takes an empty key",
                self.var.name()
            ))),
        }
    }

    pub fn get(&self, key: &[Value]) -> Result<&Gaussian> {
        match &self.table {
            Some(table) => table.value_by_key(key)?.ok_or_else(|| {
                BayonetError::IncompleteNetwork(format!(
                    "GDT for '{}' has no density at the requested key",
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

    /// Records one weighted observation of `(parents = key, var = x)`.
    pub fn observe(&mut self, key: &[Value], x: f64, weight: f64) -> Result<()> {
        if self.parents.is_empty() {
            return Err(BayonetError::Unfactorisable(format!(
                "GDT for '{}' cannot be trained without enumerable parents",
                self.var.name()
            )));
        }
        if self.samples.is_none() {
            self.samples = Some(SampleTable::new(self.parents.clone())?);
        }
        self.samples
            .as_mut()
            .expect("created above")
            .observe(key, x, weight)
    }

    /// Re-estimates every observed row by weighted maximum likelihood, then
    /// applies the variance policy. Rows with no observations are untouched.
    pub fn maximise(&mut self) -> Result<()> {
        let Some(samples) = self.samples.take() else {
            return Ok(());
        };
        let table = self.table.as_mut().expect("samples imply parents");
        let rows = table.size();
        let mut means = vec![0.0; rows];
        let mut vars = vec![0.0; rows];
        let mut totals = vec![0.0; rows];
        let mut max_var = 0.0f64;
        for row in 0..rows {
            let observations = samples.row(row);
            if observations.is_empty() {
                continue;
            }
            let mut sum = 0.0;
            let mut tot = 0.0;
            for (x, w) in observations {
                sum += x * w;
                tot += w;
            }
            let mean = sum / tot;
            let mut diff = 0.0;
            for (x, w) in observations {
                diff += (mean - x) * (mean - x) * w;
            }
            means[row] = mean;
            vars[row] = (diff / tot).max(VARIANCE_FLOOR);
            totals[row] = tot;
            max_var = max_var.max(vars[row]);
        }

        match self.policy {
            VariancePolicy::Untied => {
                for row in 0..rows {
                    if totals[row] > 0.0 {
                        table.set_value(row, Gaussian::new(means[row], vars[row])?);
                    }
                }
            }
            VariancePolicy::TiedMax => {
                for row in 0..rows {
                    if totals[row] > 0.0 {
                        table.set_value(row, Gaussian::new(means[row], max_var)?);
                    }
                }
            }
            VariancePolicy::TiedPooled => {
                let mut num = 0.0;
                let mut denom = 0.0;
                for row in 0..rows {
                    if totals[row] >= 1.0 {
                        num += (totals[row] - 1.0) * vars[row];
                        denom += totals[row] - 1.0;
                    }
                }
                let pooled = if denom > 0.0 {
                    (num / denom).max(VARIANCE_FLOOR)
                } else {
                    max_var.max(VARIANCE_FLOOR)
                };
                for row in 0..rows {
                    if totals[row] > 0.0 {
                        table.set_value(row, Gaussian::new(means[row], pooled)?);
                    }
                }
            }
        }
        Ok(())
    }

    /// Emits the factor for this density table under the given evidence.
    ///
    /// With the variable observed, each cell carries the density at the
    /// observation and no fragment; otherwise cells carry weight 1 and a
    /// Gaussian fragment over the variable. A parentless table cannot be
    /// factorised unless observed.
    pub fn make_factor(&self, evidence: &FxHashMap<Variable, Datum>) -> Result<Factor> {
        let self_obs = match evidence.get(&self.var) {
            Some(Datum::Real(x)) => Some(*x),
            Some(other) => {
                return Err(BayonetError::InvalidDomain(format!(
                    "evidence for '{}' must be a real, got {other}",
                    self.var.name()
                )))
            }
            None => None,
        };

        let Some(table) = &self.table else {
            return match (self_obs, &self.prior) {
                (Some(x), Some(prior)) => {
                    let mut f = Factor::scalar(prior.density(x));
                    f.set_evidenced(true);
                    Ok(f)
                }
                (None, _) => Err(BayonetError::Unfactorisable(format!(
                    "density node '{}' has no enumerable parents and is not evidenced",
                    self.var.name()
                ))),
                (_, None) => Err(BayonetError::IncompleteNetwork(format!(
                    "prior for '{}' is unset",
                    self.var.name()
                ))),
            };
        };

        let search = evidence_search_key(&self.parents, evidence)?;
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
        if self_obs.is_some() || search.iter().any(Option::is_some) {
            f.set_evidenced(true);
        }

        for (index, bindings) in rows_consistent(table, &search)? {
            let Some(distrib) = table.value(index) else {
                continue;
            };
            let cell = if f.is_atomic() {
                0
            } else {
                f.index_of(&key_from_bindings(&f, &bindings))?
            };
            match self_obs {
                Some(x) => f.set_weight(cell, distrib.density(x)),
                None => {
                    f.set_weight(cell, 1.0);
                    f.set_distrib(cell, self.var.clone(), Distrib::Gaussian(*distrib));
                }
            }
        }
        Ok(f)
    }

    /// Serialises the table as `index: mean, variance; (key)` lines.
    pub fn state_as_text(&self) -> String {
        let mut out = String::new();
        match &self.table {
            Some(table) => {
                for (index, d) in table.iter() {
                    let key = table.key(index);
                    let key_text = key
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ");
                    out.push_str(&format!(
                        "{index}: {}, {}; ({key_text})\n",
                        d.mean(),
                        d.variance()
                    ));
                }
            }
            None => {
                if let Some(d) = &self.prior {
                    out.push_str(&format!("{}, {};\n", d.mean(), d.variance()));
                }
            }
        }
        out
    }

    /// Restores the table from [`Gdt::state_as_text`] output.
    pub fn set_state_from_text(&mut self, text: &str) -> Result<()> {
        let parse_pair = |spec: &str| -> Result<Gaussian> {
            let parts: Vec<&str> = spec.split(',').map(str::trim).collect();
            if parts.len() != 2 {
                return Err(BayonetError::InvalidDomain(format!(
                    "unreadable Gaussian '{spec}'"
                )));
            }
            let mean: f64 = parts[0].parse().map_err(|e| {
                BayonetError::InvalidDomain(format!("unreadable mean: {e}"))
            })?;
            let variance: f64 = parts[1].parse().map_err(|e| {
                BayonetError::InvalidDomain(format!("unreadable variance: {e}"))
            })?;
            Gaussian::new(mean, variance)
        };
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let spec = line.split(';').next().unwrap_or("");
            match &mut self.table {
                Some(table) => {
                    let (index_text, pair_text) = spec.split_once(':').ok_or_else(|| {
                        BayonetError::InvalidDomain(format!("unreadable GDT line '{line}'"))
                    })?;
                    let index: usize = index_text.trim().parse().map_err(|e| {
                        BayonetError::InvalidDomain(format!("unreadable GDT index: {e}"))
                    })?;
                    if index >= table.size() {
                        return Err(BayonetError::InvalidDomain(format!(
                            "GDT index {index} out of range"
                        )));
                    }
                    table.set_value(index, parse_pair(pair_text)?);
                }
                None => self.prior = Some(parse_pair(spec)?),
            }
        }
        Ok(())
    }
}

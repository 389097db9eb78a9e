//! Dirichlet density tables: a simplex-valued variable conditioned on
//! enumerable parents, one Dirichlet per parent configuration.

use rustc_hash::FxHashMap;

use crate::bn::node::{evidence_search_key, key_from_bindings, rows_consistent};
use crate::dat::{Domain, EnumTable, SampleTable, Value, Variable};
use crate::errors::{BayonetError, Result};
use crate::factor::Factor;
use crate::prob::{Categorical, Datum, Dirichlet, Distrib};

/// A Dirichlet density table.
///
/// The node's variable ranges over categorical distributions on `domain`
/// (points on the probability simplex); evidence for it is such a point.
#[derive(Debug, Clone)]
pub struct DirDt {
    var: Variable,
    domain: Domain,
    parents: Vec<Variable>,
    table: Option<EnumTable<Dirichlet>>,
    prior: Option<Dirichlet>,
    samples: Option<SampleTable<Categorical>>,
}

impl DirDt {
    /// Creates an empty Dirichlet table for a continuous (simplex-valued)
    /// variable whose points range over `domain`.
    pub fn new(var: Variable, domain: Domain, parents: Vec<Variable>) -> Result<Self> {
        if var.is_enumerable() {
            return Err(BayonetError::InvalidDomain(format!(
                "Dirichlet-table variable '{}' must be continuous",
                var.name()
            )));
        }
        let table = if parents.is_empty() {
            None
        } else {
            Some(EnumTable::new(parents.clone())?)
        };
        Ok(DirDt {
            var,
            domain,
            parents,
            table,
            prior: None,
            samples: None,
        })
    }

    pub fn variable(&self) -> &Variable {
        &self.var
    }

    pub fn parents(&self) -> &[Variable] {
        &self.parents
    }

    pub fn put(&mut self, key: &[Value], distrib: Dirichlet) -> Result<()> {
        if distrib.domain() != &self.domain {
            return Err(BayonetError::InvalidDomain(format!(
                "Dirichlet over '{}' stored in table over '{}'",
                distrib.domain().name(),
                self.domain.name()
            )));
        }
        match &mut self.table {
            Some(table) => table.set_by_key(key, distrib),
            None if key.is_empty() => {
                self.prior = Some(distrib);
                Ok(())
            }
            None => Err(BayonetError::InvalidDomain(format!(
                "Dirichlet table for root '{}' takes an empty key",
                self.var.name()
            ))),
        }
    }

    pub fn get(&self, key: &[Value]) -> Result<&Dirichlet> {
        match &self.table {
            Some(table) => table.value_by_key(key)?.ok_or_else(|| {
                BayonetError::IncompleteNetwork(format!(
                    "Dirichlet table for '{}' has no density at the requested key",
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

    /// Records one observed categorical point for a parent configuration.
    pub fn observe(&mut self, key: &[Value], point: Categorical, weight: f64) -> Result<()> {
        if self.parents.is_empty() {
            return Err(BayonetError::Unfactorisable(format!(
                "Dirichlet table for '{}' cannot be trained without enumerable parents",
                self.var.name()
            )));
        }
        if self.samples.is_none() {
            self.samples = Some(SampleTable::new(self.parents.clone())?);
        }
        self.samples
            .as_mut()
            .expect("created above")
            .observe(key, point, weight)
    }

    /// Re-estimates each observed row's α by maximum likelihood from the
    /// recorded points. Rows with no observations are untouched.
    pub fn maximise(&mut self) -> Result<()> {
        let Some(samples) = self.samples.take() else {
            return Ok(());
        };
        let table = self.table.as_mut().expect("samples imply parents");
        for row in 0..table.size() {
            let observed: Vec<Categorical> =
                samples.row(row).iter().map(|(p, _)| p.clone()).collect();
            if observed.is_empty() {
                continue;
            }
            let mut fitted = match table.value(row) {
                Some(existing) => existing.clone(),
                None => Dirichlet::symmetric(self.domain.clone(), 1.0)?,
            };
            fitted.fit(&observed)?;
            table.set_value(row, fitted);
        }
        Ok(())
    }

    /// Emits the factor for this density table under the given evidence;
    /// analogous to the Gaussian table with a Dirichlet fragment.
    pub fn make_factor(&self, evidence: &FxHashMap<Variable, Datum>) -> Result<Factor> {
        let self_obs = match evidence.get(&self.var) {
            Some(Datum::Point(p)) => Some(p.clone()),
            Some(other) => {
                return Err(BayonetError::InvalidDomain(format!(
                    "evidence for '{}' must be a simplex point, got {other}",
                    self.var.name()
                )))
            }
            None => None,
        };

        let Some(table) = &self.table else {
            return match (&self_obs, &self.prior) {
                (Some(p), Some(prior)) => {
                    let mut f = Factor::scalar(prior.density(p)?);
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
            match &self_obs {
                Some(p) => f.set_weight(cell, distrib.density(p)?),
                None => {
                    f.set_weight(cell, 1.0);
                    f.set_distrib(cell, self.var.clone(), Distrib::Dirichlet(distrib.clone()));
                }
            }
        }
        Ok(f)
    }

    /// Serialises the table as `index: a0, a1, ...; (key)` lines.
    pub fn state_as_text(&self) -> String {
        let fmt_alpha = |d: &Dirichlet| {
            d.alpha()
                .iter()
                .map(|a| format!("{a}"))
                .collect::<Vec<_>>()
                .join(", ")
        };
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
                    out.push_str(&format!("{index}: {}; ({key_text})\n", fmt_alpha(d)));
                }
            }
            None => {
                if let Some(d) = &self.prior {
                    out.push_str(&format!("{};\n", fmt_alpha(d)));
                }
            }
        }
        out
    }

    /// Restores the table from [`DirDt::state_as_text`] output.
    pub fn set_state_from_text(&mut self, text: &str) -> Result<()> {
        let domain = self.domain.clone();
        let parse_alpha = |spec: &str| -> Result<Dirichlet> {
            let alpha: std::result::Result<Vec<f64>, _> =
                spec.split(',').map(|a| a.trim().parse::<f64>()).collect();
            let alpha = alpha.map_err(|e| {
                BayonetError::InvalidDomain(format!("unreadable concentration: {e}"))
            })?;
            Dirichlet::new(domain.clone(), alpha)
        };
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let spec = line.split(';').next().unwrap_or("");
            match &mut self.table {
                Some(table) => {
                    let (index_text, alpha_text) = spec.split_once(':').ok_or_else(|| {
                        BayonetError::InvalidDomain(format!(
                            "unreadable Dirichlet line '{line}'"
                        ))
                    })?;
                    let index: usize = index_text.trim().parse().map_err(|e| {
                        BayonetError::InvalidDomain(format!("unreadable index: {e}"))
                    })?;
                    if index >= table.size() {
                        return Err(BayonetError::InvalidDomain(format!(
                            "Dirichlet index {index} out of range"
                        )));
                    }
                    table.set_value(index, parse_alpha(alpha_text)?);
                }
                None => self.prior = Some(parse_alpha(spec)?),
            }
        }
        Ok(())
    }
}

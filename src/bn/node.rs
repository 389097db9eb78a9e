//! Network nodes and the factor-emission helpers they share.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::bn::{Cpt, DirDt, Gdt, SubstNode};
use crate::dat::{EnumTable, Value, Variable};
use crate::errors::{BayonetError, Result};
use crate::factor::Factor;
use crate::prob::Datum;

/// The distribution a node attaches to its variable.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Categorical conditional-probability table.
    Cpt(Cpt),
    /// Gaussian density table over a continuous variable.
    Gdt(Gdt),
    /// Dirichlet density table over a simplex-valued variable.
    DirDt(DirDt),
    /// Substitution node on a phylogenetic edge.
    Subst(SubstNode),
}

/// A node of a Bayesian network: a variable, its parents, and a conditional
/// distribution keyed by the parents.
#[derive(Debug, Clone)]
pub struct Node {
    kind: NodeKind,
}

impl Node {
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut NodeKind {
        &mut self.kind
    }

    pub fn variable(&self) -> &Variable {
        match &self.kind {
            NodeKind::Cpt(n) => n.variable(),
            NodeKind::Gdt(n) => n.variable(),
            NodeKind::DirDt(n) => n.variable(),
            NodeKind::Subst(n) => n.variable(),
        }
    }

    pub fn parents(&self) -> &[Variable] {
        match &self.kind {
            NodeKind::Cpt(n) => n.parents(),
            NodeKind::Gdt(n) => n.parents(),
            NodeKind::DirDt(n) => n.parents(),
            NodeKind::Subst(n) => n.parents(),
        }
    }

    /// Emits this node's factor for a query, honouring evidence on the node's
    /// variable and its parents, and summing out irrelevant unevidenced
    /// parents on the spot.
    pub fn make_factor(
        &self,
        evidence: &FxHashMap<Variable, Datum>,
        relevant: &FxHashSet<Variable>,
    ) -> Result<Factor> {
        let factor = match &self.kind {
            NodeKind::Cpt(n) => n.make_factor(evidence)?,
            NodeKind::Gdt(n) => n.make_factor(evidence)?,
            NodeKind::DirDt(n) => n.make_factor(evidence)?,
            NodeKind::Subst(n) => n.make_factor(evidence)?,
        };
        // Parents outside the relevant set (and unevidenced) cannot influence
        // the query; marginalise them away before the factor joins the pool.
        let irrelevant: Vec<Variable> = self
            .parents()
            .iter()
            .filter(|p| !relevant.contains(*p) && !evidence.contains_key(*p))
            .cloned()
            .collect();
        if irrelevant.is_empty() {
            Ok(factor)
        } else {
            Ok(crate::factor::sum_out(&factor, &irrelevant))
        }
    }

    /// The conditional categorical of an enumerable node given parent values.
    ///
    /// Density-table nodes have no categorical conditional; asking for one is
    /// [`BayonetError::Unfactorisable`]. Used by the Gibbs sampler's
    /// Markov-blanket updates.
    pub fn conditional(&self, parent_values: &[Value]) -> Result<crate::prob::Categorical> {
        match &self.kind {
            NodeKind::Cpt(n) => n.get(parent_values).cloned(),
            NodeKind::Subst(n) => n.conditional(parent_values),
            NodeKind::Gdt(n) => Err(BayonetError::Unfactorisable(format!(
                "density node '{}' has no categorical conditional",
                n.variable().name()
            ))),
            NodeKind::DirDt(n) => Err(BayonetError::Unfactorisable(format!(
                "density node '{}' has no categorical conditional",
                n.variable().name()
            ))),
        }
    }

    /// The likelihood of a value of this node's variable given parent values:
    /// probability mass for enumerable nodes, density for density tables.
    pub fn likelihood(&self, value: &Datum, parent_values: &[Value]) -> Result<f64> {
        match (&self.kind, value) {
            (NodeKind::Cpt(_) | NodeKind::Subst(_), Datum::Value(v)) => {
                self.conditional(parent_values)?.get(v)
            }
            (NodeKind::Gdt(n), Datum::Real(x)) => Ok(n.get(parent_values)?.density(*x)),
            (NodeKind::DirDt(n), Datum::Point(p)) => n.get(parent_values)?.density(p),
            (_, other) => Err(BayonetError::InvalidDomain(format!(
                "value {other} does not fit node '{}'",
                self.variable().name()
            ))),
        }
    }

    /// Serialises the node's parameters to the per-node text form.
    pub fn state_as_text(&self) -> String {
        match &self.kind {
            NodeKind::Cpt(n) => n.state_as_text(),
            NodeKind::Gdt(n) => n.state_as_text(),
            NodeKind::DirDt(n) => n.state_as_text(),
            NodeKind::Subst(n) => n.state_as_text(),
        }
    }

    /// Restores the node's parameters from the per-node text form.
    pub fn set_state_from_text(&mut self, text: &str) -> Result<()> {
        match &mut self.kind {
            NodeKind::Cpt(n) => n.set_state_from_text(text),
            NodeKind::Gdt(n) => n.set_state_from_text(text),
            NodeKind::DirDt(n) => n.set_state_from_text(text),
            NodeKind::Subst(n) => n.set_state_from_text(text),
        }
    }
}

impl From<Cpt> for Node {
    fn from(n: Cpt) -> Self {
        Node {
            kind: NodeKind::Cpt(n),
        }
    }
}

impl From<Gdt> for Node {
    fn from(n: Gdt) -> Self {
        Node {
            kind: NodeKind::Gdt(n),
        }
    }
}

impl From<DirDt> for Node {
    fn from(n: DirDt) -> Self {
        Node {
            kind: NodeKind::DirDt(n),
        }
    }
}

impl From<SubstNode> for Node {
    fn from(n: SubstNode) -> Self {
        Node {
            kind: NodeKind::Subst(n),
        }
    }
}

/// The partial key over a parent-keyed table fixed by evidence: evidenced
/// parents pin their position, the rest are wildcards.
pub(crate) fn evidence_search_key(
    parents: &[Variable],
    evidence: &FxHashMap<Variable, Datum>,
) -> Result<Vec<Option<Value>>> {
    parents
        .iter()
        .map(|p| match evidence.get(p) {
            Some(Datum::Value(v)) => Ok(Some(v.clone())),
            Some(other) => Err(BayonetError::InvalidDomain(format!(
                "evidence for enumerable parent '{}' must be a value, got {other}",
                p.name()
            ))),
            None => Ok(None),
        })
        .collect()
}

/// Rows of a parent-keyed table consistent with evidence, with the bindings
/// of the unevidenced parents for each row.
pub(crate) fn rows_consistent<T>(
    table: &EnumTable<T>,
    search: &[Option<Value>],
) -> Result<Vec<(usize, Vec<(Variable, Value)>)>> {
    let parents = table.variables();
    let rows = table
        .indices_matching(search)?
        .into_iter()
        .map(|index| {
            let key = table.key(index);
            let bindings = parents
                .iter()
                .zip(key.iter())
                .enumerate()
                .filter(|(i, _)| search[*i].is_none())
                .map(|(_, (p, v))| (p.clone(), v.clone()))
                .collect();
            (index, bindings)
        })
        .collect();
    Ok(rows)
}

/// Builds the key of `factor` from variable/value bindings.
pub(crate) fn key_from_bindings(factor: &Factor, bindings: &[(Variable, Value)]) -> Vec<Value> {
    factor
        .enum_vars()
        .iter()
        .map(|v| {
            bindings
                .iter()
                .find(|(b, _)| b == v)
                .map(|(_, value)| value.clone())
                .expect("every factor variable has a binding")
        })
        .collect()
}

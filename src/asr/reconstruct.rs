//! Per-column ancestral reconstruction over a phylogenetic tree.

use std::sync::Arc;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::asr::{Alignment, PhyloTree, GAP};
use crate::bn::{Network, SubstNode};
use crate::ctmc::SubstModel;
use crate::dat::{Value, Variable};
use crate::errors::{BayonetError, Result};
use crate::infer::{CancelToken, VarElim};
use crate::prob::{Categorical, Datum};

/// Joint reconstruction labels every ancestor with the jointly most probable
/// assignment (an MPE query); marginal reconstruction reads the per-node
/// posterior at one chosen branch point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconstructionMode {
    #[default]
    Joint,
    Marginal,
}

/// How alignment gaps are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GapMode {
    /// A gap is a missing observation; the leaf stays uninstantiated.
    #[default]
    Missing,
    /// Residues still treat gaps as missing, but a parallel presence/absence
    /// network under the two-state Gap model decides which ancestors carry a
    /// gap in the output.
    GapModel,
}

/// Options for [`reconstruct`].
#[derive(Debug, Clone, Default)]
pub struct ReconstructOptions {
    pub mode: ReconstructionMode,
    pub gap_mode: GapMode,
    /// Label of the ancestor queried in marginal mode; the root if unset.
    pub marginal_node: Option<String>,
    pub cancel: CancelToken,
}

/// The result of a reconstruction run.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    /// Ancestor labels, in tree index order.
    pub ancestors: Vec<String>,
    /// One reconstructed symbol sequence per ancestor label.
    pub sequences: FxHashMap<String, String>,
    /// In marginal mode, the per-column posterior at the chosen branch point.
    pub marginals: Option<Vec<Categorical>>,
}

/// Reconstructs ancestral sequences column by column.
///
/// Each alignment column independently becomes a tree-shaped network: the
/// root prior is the model's stationary distribution, every edge a
/// substitution node at its branch length, and every leaf with an observed
/// symbol is instantiated. Columns are independent; with the `rayon` feature
/// they run in parallel. Cancellation is checked between columns.
pub fn reconstruct(
    tree: &PhyloTree,
    alignment: &Alignment,
    model: &Arc<SubstModel>,
    options: &ReconstructOptions,
) -> Result<Reconstruction> {
    if tree.is_empty() {
        return Err(BayonetError::IncompleteNetwork("tree has no nodes".into()));
    }
    for leaf in tree.leaves() {
        if alignment.row(tree.label(leaf)).is_none() {
            return Err(BayonetError::IncompleteNetwork(format!(
                "leaf '{}' has no sequence in the alignment",
                tree.label(leaf)
            )));
        }
    }
    let marginal_index = match (&options.mode, &options.marginal_node) {
        (ReconstructionMode::Marginal, Some(label)) => {
            let index = tree.find(label).ok_or_else(|| {
                BayonetError::IncompleteNetwork(format!(
                    "branch point '{label}' is not in the tree"
                ))
            })?;
            if tree.is_leaf(index) {
                return Err(BayonetError::InvalidDomain(format!(
                    "branch point '{label}' is a leaf"
                )));
            }
            Some(index)
        }
        (ReconstructionMode::Marginal, None) => Some(tree.root()),
        (ReconstructionMode::Joint, _) => None,
    };

    let gap_model: Option<Arc<SubstModel>> = match options.gap_mode {
        GapMode::GapModel => Some(Arc::new(crate::ctmc::from_name("Gap")?)),
        GapMode::Missing => None,
    };

    let columns: Vec<usize> = (0..alignment.width()).collect();
    debug!(
        columns = columns.len(),
        ancestors = tree.ancestors().len(),
        model = model.name(),
        "reconstruction started"
    );

    let run_column = |&column: &usize| -> Result<ColumnResult> {
        options.cancel.check()?;
        let residues =
            reconstruct_column(tree, alignment, model, column, marginal_index)?;
        let presence = match &gap_model {
            Some(gap) => Some(
                reconstruct_column_presence(tree, alignment, gap, column)?,
            ),
            None => None,
        };
        Ok(ColumnResult {
            residues,
            presence,
        })
    };

    #[cfg(feature = "rayon")]
    let per_column: Result<Vec<ColumnResult>> = columns.par_iter().map(run_column).collect();
    #[cfg(not(feature = "rayon"))]
    let per_column: Result<Vec<ColumnResult>> = columns.iter().map(run_column).collect();
    let per_column = per_column?;

    let ancestors: Vec<String> = tree
        .ancestors()
        .iter()
        .map(|&i| tree.label(i).to_string())
        .collect();
    let mut sequences: FxHashMap<String, String> = ancestors
        .iter()
        .map(|l| (l.clone(), String::with_capacity(alignment.width())))
        .collect();
    let mut marginals = marginal_index.map(|_| Vec::with_capacity(alignment.width()));

    for column in per_column {
        for (ancestor_pos, &ancestor) in tree.ancestors().iter().enumerate() {
            let gapped = column
                .presence
                .as_ref()
                .is_some_and(|p| !p[ancestor_pos]);
            let symbol = if gapped {
                GAP
            } else {
                column.residues.symbols[ancestor_pos]
            };
            sequences
                .get_mut(tree.label(ancestor))
                .expect("sequence rows preallocated")
                .push(symbol);
        }
        if let (Some(all), Some(one)) = (&mut marginals, column.residues.marginal) {
            all.push(one);
        }
    }

    Ok(Reconstruction {
        ancestors,
        sequences,
        marginals,
    })
}

struct ColumnResult {
    residues: ColumnReconstruction,
    presence: Option<Vec<bool>>,
}

struct ColumnReconstruction {
    /// One symbol per ancestor, in ancestor order.
    symbols: Vec<char>,
    marginal: Option<Categorical>,
}

/// Builds and queries the per-column network for residues.
fn reconstruct_column(
    tree: &PhyloTree,
    alignment: &Alignment,
    model: &Arc<SubstModel>,
    column: usize,
    marginal_index: Option<usize>,
) -> Result<ColumnReconstruction> {
    let (net, vars) = column_network(tree, alignment, model, column, |symbol| {
        if symbol == GAP {
            None
        } else {
            Some(Value::Chr(symbol))
        }
    })?;

    let ancestor_vars: Vec<Variable> = tree
        .ancestors()
        .iter()
        .map(|&i| vars[i].clone())
        .collect();

    match marginal_index {
        None => {
            let ve = VarElim::new(&net)?;
            let (assignment, _) = ve.mpe(&ancestor_vars)?;
            let symbols = ancestor_vars
                .iter()
                .map(|v| match assignment.get(v) {
                    Some(Value::Chr(c)) => Ok(*c),
                    Some(other) => Err(BayonetError::InvalidDomain(format!(
                        "unexpected ancestor state {other}"
                    ))),
                    None => Err(BayonetError::IncompleteNetwork(format!(
                        "no assignment for ancestor '{}'",
                        v.name()
                    ))),
                })
                .collect::<Result<Vec<char>>>()?;
            Ok(ColumnReconstruction {
                symbols,
                marginal: None,
            })
        }
        Some(target) => {
            let ve = VarElim::new(&net)?;
            let posterior = ve.marginal(std::slice::from_ref(&vars[target]))?;
            let domain = model.domain();
            let probs: Vec<f64> = (0..domain.size()).map(|i| posterior.weight(i)).collect();
            let marginal = Categorical::new(domain.clone(), probs)?;
            // every ancestor reads its own marginal for the output symbol
            let symbols = ancestor_vars
                .iter()
                .map(|v| {
                    let m = ve.marginal(std::slice::from_ref(v))?;
                    let best = (0..domain.size())
                        .max_by(|&a, &b| {
                            m.weight(a)
                                .partial_cmp(&m.weight(b))
                                .unwrap_or(std::cmp::Ordering::Equal)
                        })
                        .expect("domain is non-empty");
                    match domain.value(best) {
                        Value::Chr(c) => Ok(*c),
                        other => Err(BayonetError::InvalidDomain(format!(
                            "unexpected ancestor state {other}"
                        ))),
                    }
                })
                .collect::<Result<Vec<char>>>()?;
            Ok(ColumnReconstruction {
                symbols,
                marginal: Some(marginal),
            })
        }
    }
}

/// Joint presence/absence reconstruction under the two-state Gap model;
/// returns one flag per ancestor (false = gap).
fn reconstruct_column_presence(
    tree: &PhyloTree,
    alignment: &Alignment,
    gap_model: &Arc<SubstModel>,
    column: usize,
) -> Result<Vec<bool>> {
    let (net, vars) = column_network(tree, alignment, gap_model, column, |symbol| {
        Some(Value::Bool(symbol != GAP))
    })?;
    let ancestor_vars: Vec<Variable> = tree
        .ancestors()
        .iter()
        .map(|&i| vars[i].clone())
        .collect();
    let ve = VarElim::new(&net)?;
    let (assignment, _) = ve.mpe(&ancestor_vars)?;
    ancestor_vars
        .iter()
        .map(|v| match assignment.get(v) {
            Some(Value::Bool(present)) => Ok(*present),
            _ => Err(BayonetError::IncompleteNetwork(format!(
                "no presence state for ancestor '{}'",
                v.name()
            ))),
        })
        .collect()
}

/// Assembles the tree-shaped network for one column: root prior, one
/// substitution node per edge, leaves instantiated through `observe`.
fn column_network(
    tree: &PhyloTree,
    alignment: &Alignment,
    model: &Arc<SubstModel>,
    column: usize,
    observe: impl Fn(char) -> Option<Value>,
) -> Result<(Network, Vec<Variable>)> {
    let mut net = Network::new();
    let vars: Vec<Variable> = (0..tree.len())
        .map(|i| Variable::enumerable(tree.label(i), model.domain().clone()))
        .collect();
    for i in 0..tree.len() {
        match tree.parent(i) {
            None => net.add_node(SubstNode::root(vars[i].clone(), model.clone())?)?,
            Some(p) => net.add_node(SubstNode::new(
                vars[i].clone(),
                vars[p].clone(),
                model.clone(),
                tree.branch_length(i),
            )?)?,
        }
    }
    for leaf in tree.leaves() {
        let symbol = alignment
            .symbol(tree.label(leaf), column)
            .expect("alignment coverage checked by the caller");
        if let Some(value) = observe(symbol) {
            net.set_evidence(&vars[leaf], Datum::Value(value))?;
        }
    }
    net.compile()?;
    Ok((net, vars))
}

//! The Bayesian network builder: nodes, evidence, compilation, relevance.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::bn::Node;
use crate::dat::Variable;
use crate::errors::{BayonetError, Result};
use crate::prob::Datum;

/// A directed acyclic network of nodes, plus the current evidence assignment.
///
/// Nodes may be added in any order; [`Network::compile`] validates that every
/// parent has a node and that the graph is acyclic, and fixes a topological
/// ordering used by the samplers. Queries are answered by the inference
/// drivers in [`crate::infer`].
#[derive(Debug, Clone, Default)]
pub struct Network {
    nodes: Vec<Node>,
    by_var: FxHashMap<Variable, usize>,
    evidence: FxHashMap<Variable, Datum>,
    order: Vec<usize>,
    compiled: bool,
}

impl Network {
    pub fn new() -> Self {
        Network::default()
    }

    /// Adds a node. Each variable can carry at most one node.
    pub fn add_node<N: Into<Node>>(&mut self, node: N) -> Result<()> {
        let node = node.into();
        let var = node.variable().clone();
        if self.by_var.contains_key(&var) {
            return Err(BayonetError::IncompleteNetwork(format!(
                "variable '{}' already has a node",
                var.name()
            )));
        }
        self.by_var.insert(var, self.nodes.len());
        self.nodes.push(node);
        self.compiled = false;
        Ok(())
    }

    pub fn node(&self, var: &Variable) -> Option<&Node> {
        self.by_var.get(var).map(|&i| &self.nodes[i])
    }

    pub fn node_mut(&mut self, var: &Variable) -> Option<&mut Node> {
        let i = *self.by_var.get(var)?;
        Some(&mut self.nodes[i])
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes listing `var` among their parents.
    pub fn children(&self, var: &Variable) -> Vec<&Node> {
        self.nodes
            .iter()
            .filter(|n| n.parents().contains(var))
            .collect()
    }

    /// Observes a variable. Enumerable variables take values of their domain;
    /// continuous variables take reals (or simplex points for Dirichlet
    /// nodes).
    pub fn set_evidence(&mut self, var: &Variable, datum: Datum) -> Result<()> {
        if !self.by_var.contains_key(var) {
            return Err(BayonetError::IncompleteNetwork(format!(
                "variable '{}' has no node",
                var.name()
            )));
        }
        if let Some(domain) = var.domain() {
            match &datum {
                Datum::Value(v) => {
                    domain.require_index(v)?;
                }
                other => {
                    return Err(BayonetError::InvalidDomain(format!(
                        "evidence for enumerable '{}' must be a value, got {other}",
                        var.name()
                    )))
                }
            }
        }
        self.evidence.insert(var.clone(), datum);
        Ok(())
    }

    /// Removes all observations.
    pub fn clear_evidence(&mut self) {
        self.evidence.clear();
    }

    pub fn evidence(&self) -> &FxHashMap<Variable, Datum> {
        &self.evidence
    }

    /// Validates the structure and fixes a topological ordering.
    ///
    /// Fails with [`BayonetError::IncompleteNetwork`] when a parent has no
    /// node or the graph has a cycle.
    pub fn compile(&mut self) -> Result<()> {
        for node in &self.nodes {
            for parent in node.parents() {
                if !self.by_var.contains_key(parent) {
                    return Err(BayonetError::IncompleteNetwork(format!(
                        "parent '{}' of '{}' has no node",
                        parent.name(),
                        node.variable().name()
                    )));
                }
            }
        }
        // Kahn's algorithm over parent edges
        let n = self.nodes.len();
        let mut in_degree = vec![0usize; n];
        let mut out_edges: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, node) in self.nodes.iter().enumerate() {
            for parent in node.parents() {
                let p = self.by_var[parent];
                in_degree[i] += 1;
                out_edges[p].push(i);
            }
        }
        let mut ready: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(i) = ready.pop() {
            order.push(i);
            for &c in &out_edges[i] {
                in_degree[c] -= 1;
                if in_degree[c] == 0 {
                    ready.push(c);
                }
            }
        }
        if order.len() != n {
            return Err(BayonetError::IncompleteNetwork(
                "network contains a cycle".into(),
            ));
        }
        self.order = order;
        self.compiled = true;
        debug!(nodes = n, "network compiled");
        Ok(())
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    /// Node indices in topological order (parents before children).
    /// Only meaningful after [`Network::compile`].
    pub fn topological_order(&self) -> impl Iterator<Item = &Node> {
        self.order.iter().map(|&i| &self.nodes[i])
    }

    /// The set of variables relevant to a query given the current evidence:
    /// the ancestor closure of the query and evidence variables. Nodes
    /// outside this set cannot influence the posterior and their factors are
    /// never built.
    pub fn relevant(&self, query: &[Variable]) -> Result<FxHashSet<Variable>> {
        for q in query {
            if !self.by_var.contains_key(q) {
                return Err(BayonetError::IncompleteNetwork(format!(
                    "query variable '{}' has no node",
                    q.name()
                )));
            }
        }
        let mut relevant: FxHashSet<Variable> = query.iter().cloned().collect();
        relevant.extend(self.evidence.keys().cloned());
        let mut frontier: Vec<Variable> = relevant.iter().cloned().collect();
        while let Some(var) = frontier.pop() {
            if let Some(node) = self.node(&var) {
                for parent in node.parents() {
                    if relevant.insert(parent.clone()) {
                        frontier.push(parent.clone());
                    }
                }
            }
        }
        Ok(relevant)
    }
}

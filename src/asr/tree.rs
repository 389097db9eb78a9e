//! Indexed phylogenetic trees.

use crate::errors::{BayonetError, Result};

/// A rooted tree with labelled nodes and branch lengths.
///
/// Nodes are flat indices; parents always have lower indices than their
/// children (enforced by the builder), so index order is a valid top-down
/// traversal. Parsing tree files is the caller's job; this structure only
/// records topology.
#[derive(Debug, Clone, Default)]
pub struct PhyloTree {
    labels: Vec<String>,
    parent: Vec<Option<usize>>,
    length: Vec<f64>,
    children: Vec<Vec<usize>>,
}

impl PhyloTree {
    pub fn new() -> Self {
        PhyloTree::default()
    }

    /// Adds the root node. Must be the first node added.
    pub fn add_root(&mut self, label: &str) -> Result<usize> {
        if !self.labels.is_empty() {
            return Err(BayonetError::InvalidDomain(
                "tree already has a root".into(),
            ));
        }
        self.labels.push(label.to_string());
        self.parent.push(None);
        self.length.push(0.0);
        self.children.push(Vec::new());
        Ok(0)
    }

    /// Adds a child under `parent` across a branch of length `length`.
    pub fn add_child(&mut self, parent: usize, label: &str, length: f64) -> Result<usize> {
        if parent >= self.labels.len() {
            return Err(BayonetError::InvalidDomain(format!(
                "parent index {parent} out of range"
            )));
        }
        if !(length >= 0.0) || !length.is_finite() {
            return Err(BayonetError::InvalidDomain(format!(
                "branch length {length} must be non-negative and finite"
            )));
        }
        let index = self.labels.len();
        self.labels.push(label.to_string());
        self.parent.push(Some(parent));
        self.length.push(length);
        self.children.push(Vec::new());
        self.children[parent].push(index);
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn root(&self) -> usize {
        0
    }

    pub fn label(&self, index: usize) -> &str {
        &self.labels[index]
    }

    pub fn parent(&self, index: usize) -> Option<usize> {
        self.parent[index]
    }

    /// Branch length from `index` up to its parent; 0 at the root.
    pub fn branch_length(&self, index: usize) -> f64 {
        self.length[index]
    }

    pub fn children(&self, index: usize) -> &[usize] {
        &self.children[index]
    }

    pub fn is_leaf(&self, index: usize) -> bool {
        self.children[index].is_empty()
    }

    /// Leaf indices in index order.
    pub fn leaves(&self) -> Vec<usize> {
        (0..self.len()).filter(|&i| self.is_leaf(i)).collect()
    }

    /// Internal (ancestor) node indices in index order.
    pub fn ancestors(&self) -> Vec<usize> {
        (0..self.len()).filter(|&i| !self.is_leaf(i)).collect()
    }

    /// The index of a labelled node.
    pub fn find(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }
}

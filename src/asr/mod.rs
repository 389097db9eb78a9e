//! Ancestral sequence reconstruction on phylogenetic trees.
//!
//! [`reconstruct`] answers per-column ancestral-state queries by assembling a
//! tree-shaped network per alignment column (root prior = stationary
//! frequencies, per-edge substitution CPTs) and running the variable
//! elimination driver in MPE or marginal mode.

mod alignment;
mod reconstruct;
mod tree;

pub use alignment::{Alignment, GAP};
pub use reconstruct::{
    reconstruct, GapMode, ReconstructOptions, Reconstruction, ReconstructionMode,
};
pub use tree::PhyloTree;

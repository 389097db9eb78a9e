//! Network nodes and the network builder.
//!
//! Each node attaches a conditional distribution to a variable: a categorical
//! table ([`Cpt`]), a Gaussian density table ([`Gdt`]), a Dirichlet density
//! table ([`DirDt`]) or a substitution-model edge ([`SubstNode`]). Nodes emit
//! [`crate::factor::Factor`]s for the inference drivers via
//! [`Node::make_factor`], and expose per-node text persistence hooks.

mod cpt;
mod dirdt;
mod gdt;
mod network;
pub(crate) mod node;
mod subst;

pub use cpt::Cpt;
pub use dirdt::DirDt;
pub use gdt::{Gdt, VariancePolicy};
pub use network::Network;
pub use node::{Node, NodeKind};
pub use subst::SubstNode;

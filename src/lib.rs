//! # Bayonet - Bayesian networks with hybrid factors
//!
//! Bayonet is a toolkit for discrete-and-hybrid Bayesian networks: exact
//! inference by variable elimination, approximate inference by Gibbs
//! sampling, and ancestral sequence reconstruction over continuous-time
//! Markov substitution models.
//!
//! ## Architecture
//!
//! The system is organized into several modules:
//!
//! - **dat**: Domains, variables and dense enumerable tables
//! - **prob**: The distribution library (categorical, Gaussian, gamma,
//!   Dirichlet, mixtures)
//! - **factor**: Factors with mixed enumerable/continuous cells and their
//!   algebra (products, marginalisation)
//! - **ctmc**: Substitution models and the named model catalogue
//! - **bn**: Network nodes and the network builder
//! - **infer**: The variable-elimination and Gibbs drivers
//! - **asr**: Phylogenetic trees, alignments, and ancestral reconstruction
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bayonet::bn::{Cpt, Network};
//! use bayonet::dat::{Domain, Variable};
//! use bayonet::infer::VarElim;
//! use bayonet::prob::Categorical;
//!
//! let rain = Variable::boolean("Rain");
//! let mut net = Network::new();
//! net.add_node(Cpt::prior(rain.clone(),
//!     Categorical::new(Domain::boolean(), vec![0.8, 0.2])?)?)?;
//! net.compile()?;
//! let posterior = VarElim::new(&net)?.marginal(&[rain])?;
//! ```

#![forbid(unsafe_code)]

pub mod asr;
pub mod bn;
pub mod ctmc;
pub mod dat;
pub mod errors;
pub mod factor;
pub mod infer;
pub mod prob;

pub use errors::{BayonetError, Result};

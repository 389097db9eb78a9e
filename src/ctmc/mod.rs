//! Continuous-time Markov substitution models.
//!
//! A [`SubstModel`] turns stationary frequencies and an exchange (or rate)
//! matrix into per-branch transition probabilities via a cached
//! eigen-decomposition; [`catalogue::from_name`] provides the published named
//! models.

pub mod catalogue;
mod model;

pub use catalogue::{from_name, MODEL_NAMES};
pub use model::SubstModel;

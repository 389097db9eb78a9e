//! Inference drivers.
//!
//! [`VarElim`] answers marginal, most-probable-explanation and
//! log-likelihood queries exactly; [`Gibbs`] approximates posteriors by
//! Markov-blanket sampling. Both honour cooperative cancellation through a
//! shared [`CancelToken`].

mod cancel;
mod gibbs;
mod varelim;

pub use cancel::CancelToken;
pub use gibbs::{Gibbs, GibbsMode};
pub use varelim::VarElim;

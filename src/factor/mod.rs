//! Factors and the operations that combine them.
//!
//! A [`Factor`] assigns a non-negative weight to every tuple of values of its
//! enumerable key variables, and may additionally carry a joint density
//! fragment ([`Jdf`]) over non-enumerable variables and an assignment trace
//! used by max-marginalisation. The algebra over factors lives in
//! [`algebra`]; queries are answered by combining node factors with
//! [`algebra::product_all`], then reducing with [`algebra::sum_out`] or
//! [`algebra::max_out`].

pub mod algebra;
mod dense;
mod jdf;

pub use algebra::{complexity, crossref, max_out, normalise, product, product_all, sum_out};
pub use dense::{Factor, Trace};
pub use jdf::Jdf;

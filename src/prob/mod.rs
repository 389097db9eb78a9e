//! The distribution library.
//!
//! Leaf probability objects share one capability set: evaluate a density (or
//! mass) at a point, and draw a sample. They are carried as a tagged variant
//! family rather than trait objects so factor cells stay plain data.

mod categorical;
mod dirichlet;
mod gamma;
mod gaussian;
mod mixture;
pub mod special;

use std::fmt;

use rand::Rng;

pub use categorical::Categorical;
pub use dirichlet::{estimate_alpha, sufficient_statistic, Dirichlet};
pub use gamma::Gamma;
pub use gaussian::Gaussian;
pub use mixture::Mixture;

use crate::dat::Value;
use crate::errors::{BayonetError, Result};

/// A point at which a distribution can be evaluated, or a drawn sample.
///
/// Enumerable distributions speak [`Value`]s, continuous densities speak
/// reals, and a Dirichlet speaks points on the probability simplex.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Value(Value),
    Real(f64),
    Point(Categorical),
}

impl Datum {
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Datum::Real(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Datum::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Value(v) => write!(f, "{v}"),
            Datum::Real(x) => write!(f, "{x}"),
            Datum::Point(p) => {
                let probs: Vec<String> = p.probs().iter().map(|x| format!("{x:.6}")).collect();
                write!(f, "[{}]", probs.join(","))
            }
        }
    }
}

impl From<Value> for Datum {
    fn from(v: Value) -> Self {
        Datum::Value(v)
    }
}

impl From<f64> for Datum {
    fn from(x: f64) -> Self {
        Datum::Real(x)
    }
}

/// A distribution of any supported family.
#[derive(Debug, Clone, PartialEq)]
pub enum Distrib {
    Categorical(Categorical),
    Gaussian(Gaussian),
    Gamma(Gamma),
    Dirichlet(Dirichlet),
    Mixture(Mixture),
}

impl Distrib {
    /// Density (or mass) at the point.
    ///
    /// Fails with [`BayonetError::InvalidDomain`] when the point kind does
    /// not match the distribution family.
    pub fn density(&self, at: &Datum) -> Result<f64> {
        match (self, at) {
            (Distrib::Categorical(d), Datum::Value(v)) => d.get(v),
            (Distrib::Gaussian(d), Datum::Real(x)) => Ok(d.density(*x)),
            (Distrib::Gamma(d), Datum::Real(x)) => Ok(d.density(*x)),
            (Distrib::Dirichlet(d), Datum::Point(p)) => d.density(p),
            (Distrib::Mixture(m), at) => m.density(at),
            (d, at) => Err(BayonetError::InvalidDomain(format!(
                "cannot evaluate {} at point {at}",
                d.family()
            ))),
        }
    }

    /// Draws a sample of the matching [`Datum`] kind.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Datum {
        match self {
            Distrib::Categorical(d) => Datum::Value(d.sample(rng)),
            Distrib::Gaussian(d) => Datum::Real(d.sample(rng)),
            Distrib::Gamma(d) => Datum::Real(d.sample(rng)),
            Distrib::Dirichlet(d) => Datum::Point(d.sample(rng)),
            Distrib::Mixture(m) => m.sample(rng),
        }
    }

    /// Family name used in error messages and persistence.
    pub fn family(&self) -> &'static str {
        match self {
            Distrib::Categorical(_) => "categorical",
            Distrib::Gaussian(_) => "gaussian",
            Distrib::Gamma(_) => "gamma",
            Distrib::Dirichlet(_) => "dirichlet",
            Distrib::Mixture(_) => "mixture",
        }
    }
}

impl From<Categorical> for Distrib {
    fn from(d: Categorical) -> Self {
        Distrib::Categorical(d)
    }
}

impl From<Gaussian> for Distrib {
    fn from(d: Gaussian) -> Self {
        Distrib::Gaussian(d)
    }
}

impl From<Gamma> for Distrib {
    fn from(d: Gamma) -> Self {
        Distrib::Gamma(d)
    }
}

impl From<Dirichlet> for Distrib {
    fn from(d: Dirichlet) -> Self {
        Distrib::Dirichlet(d)
    }
}

impl From<Mixture> for Distrib {
    fn from(m: Mixture) -> Self {
        Distrib::Mixture(m)
    }
}

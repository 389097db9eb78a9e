//! Error types for network construction and inference.

use thiserror::Error;

/// Errors that can occur while building networks, constructing substitution
/// models, or answering queries.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in the future without breaking changes.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BayonetError {
    /// Substitution-model construction failed: the dimensions of the
    /// stationary frequencies and the rate matrix disagree, or the
    /// eigen-decomposition produced non-finite values.
    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// A value was used with a domain that does not contain it, or a key had
    /// the wrong arity for its table.
    #[error("invalid domain: {0}")]
    InvalidDomain(String),

    /// The network is unusable for the query: a relevant node has no
    /// distribution, or the graph contains a cycle.
    #[error("incomplete network: {0}")]
    IncompleteNetwork(String),

    /// The evidence assignment has probability zero; every consistent
    /// configuration has vanished under normalisation.
    #[error("evidence has probability zero: {0}")]
    EvidenceImpossible(String),

    /// A density-carrying node without enumerable parents was met
    /// un-evidenced; the current algorithm cannot factorise it.
    #[error("cannot factorise: {0}")]
    Unfactorisable(String),

    /// Cooperative cancellation was requested while a long-running
    /// reconstruction or query was in progress.
    #[error("cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BayonetError>;

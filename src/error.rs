//! Errors surfaced by graph construction, inputs, operators, and indexes.
//!
//! All failures here are fatal for the current unit of work: an error from an
//! operator step aborts the enclosing [`run`](crate::graph::Graph::run) call,
//! and nothing retries on the caller's behalf. Callers decide whether to
//! rebuild the graph.

/// The error type for all fallible engine operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Misuse of the topology API, such as mixing version dimensions within
    /// one graph or constructing a graph from an empty initial frontier.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Data or a frontier was sent to a graph that has not been finalized.
    #[error("graph is not finalized")]
    GraphNotFinalized,

    /// An operation referenced a version no longer covered by a frontier,
    /// for example a read below an index's compaction frontier.
    #[error("invalid version: {0}")]
    InvalidVersion(String),

    /// A frontier update was not greater than or equal to its predecessor.
    #[error("invalid frontier: {0}")]
    InvalidFrontier(String),

    /// An aggregate that requires non-negative multiplicities (`distinct`,
    /// `min`, `max`, and friends) observed a negative accumulation.
    #[error("invalid aggregate: {0}")]
    InvalidAggregate(&'static str),

    /// An internal invariant failed to hold. This indicates a bug in the
    /// engine rather than in the caller.
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
}

/// The result type used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

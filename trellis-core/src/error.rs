//! Errors surfaced by the reactive graph.
//!
//! Usage errors (a cycle, a write from inside the computation that depends on
//! it) are returned as [`ReactiveError`]. Broken internal bookkeeping is a bug
//! and is caught by debug assertions instead.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

/// An evaluation of the graph failed.
///
/// Every variant aborts the evaluation that produced it. The failed node rolls
/// back its compute version, so retrying is indistinguishable from a first
/// attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A computed value was read again while it was already computing.
    #[error("cycle detected in signal graph")]
    CircularDependency,

    /// A producer was written while one of its consumers was mid-evaluation,
    /// or while its own value was borrowed by a reader.
    #[error("a signal was updated while a consumer depending on it was computing")]
    MutationDuringComputation,

    /// A user function aborted its own evaluation.
    #[error("evaluation aborted: {0}")]
    Aborted(String),
}

impl ReactiveError {
    /// Build a [`ReactiveError::Aborted`] from any displayable reason.
    pub fn aborted(reason: impl std::fmt::Display) -> Self {
        Self::Aborted(reason.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_readable() {
        assert_eq!(
            ReactiveError::CircularDependency.to_string(),
            "cycle detected in signal graph"
        );
        assert_eq!(
            ReactiveError::aborted("bad input").to_string(),
            "evaluation aborted: bad input"
        );
    }
}

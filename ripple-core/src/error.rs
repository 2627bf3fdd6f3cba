//! Error types for the reactive runtime.
//!
//! Most reactive operations cannot fail: reads return cached values and
//! writes that do not change anything return early. The failures that remain
//! are structural (propagation that never settles, circular reads) or misuse
//! of context-dependent helpers such as [`cleanup`](crate::cleanup).
//!
//! Panics raised by user closures are not converted into errors. They unwind
//! through the runtime after its bookkeeping for the failing run is complete.

use crate::graph::NodeId;

/// Errors produced by the reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReactiveError {
    /// The scheduler ran more rounds than allowed without reaching a fixed
    /// point. Usually two effects keep writing different values into each
    /// other's inputs.
    #[error("propagation did not settle after {rounds} rounds")]
    PropagationDiverged {
        /// Number of rounds executed before giving up.
        rounds: usize,
    },

    /// A computed value was read while it was already computing or
    /// resolving, i.e. it (transitively) depends on itself.
    #[error("circular dependency: computed {node:?} was read while it was being evaluated")]
    CircularDependency {
        /// The computed that was re-entered.
        node: NodeId,
    },

    /// [`cleanup`](crate::cleanup) was called while no effect or computed
    /// was running.
    #[error("cleanup registered outside of a running effect or computed")]
    NoRunningConsumer,

    /// A configuration override could not be parsed.
    #[error("invalid value {value:?} for {key}")]
    InvalidConfig {
        /// The environment variable or setting name.
        key: &'static str,
        /// The raw value that failed to parse.
        value: String,
    },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReactiveError>;

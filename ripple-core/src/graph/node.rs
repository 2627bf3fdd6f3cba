//! Graph Nodes
//!
//! Identifiers and state enums shared by every node in the dependency graph.

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a node in the dependency graph.
///
/// Signals, computeds, effects and scopes all draw from the same counter, so
/// an id is unique across node kinds.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A mutable cell. Only ever a source.
    Signal,

    /// A memoized derived value. Both a source and a consumer.
    Computed,

    /// A side-effecting consumer with no value of its own.
    Effect,

    /// An ownership container. Not part of the dependency graph proper.
    Scope,
}

/// What a source tells its consumers when it may have changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyKind {
    /// The source's value is known to be different.
    Changed,

    /// An upstream computed went stale; whether its value actually changes
    /// is not known until someone confirms it.
    MaybeChanged,
}

/// State of a computed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputedState {
    /// The cached value is trustworthy.
    Clean,

    /// At least one upstream computed may have changed.
    Pending,

    /// The value must be recomputed before the next read.
    Dirty,

    /// The user function is executing.
    Running,

    /// Upstream computeds are being confirmed to resolve a `Pending` state.
    Resolving,
}

impl ComputedState {
    /// Whether the computed is in the middle of evaluating.
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Running | Self::Resolving)
    }
}

/// State of an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectState {
    /// Nothing to do.
    Clean,

    /// An upstream computed may have changed; confirm before running.
    Pending,

    /// An input definitely changed; the effect must run.
    NeedsUpdate,

    /// The effect body is executing.
    Running,

    /// Upstream computeds are being confirmed to resolve a `Pending` state.
    Resolving,
}

/// Puts a state cell back to a known value if the guarded block unwinds.
///
/// User code runs while a node is `Running` or `Resolving`; a panic there
/// must not leave the node stuck in a busy state.
pub(crate) struct StateGuard<'a, S: Copy> {
    cell: &'a Cell<S>,
    on_unwind: S,
    armed: bool,
}

impl<'a, S: Copy> StateGuard<'a, S> {
    pub(crate) fn new(cell: &'a Cell<S>, on_unwind: S) -> Self {
        Self {
            cell,
            on_unwind,
            armed: true,
        }
    }

    /// The block finished normally; leave the state alone.
    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl<S: Copy> Drop for StateGuard<'_, S> {
    fn drop(&mut self) {
        if self.armed {
            self.cell.set(self.on_unwind);
        }
    }
}

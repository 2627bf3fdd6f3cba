//! Dependency Graph
//!
//! This module implements the engine underneath the reactive primitives: the
//! bipartite graph of sources and consumers, and the scheduler that decides
//! when consumers re-run.
//!
//! # Overview
//!
//! - Sources (signals and computeds) own a [`Dep`](dep::Dep) listing the
//!   consumers that read them.
//! - Consumers (computeds and effects) own a [`SourceSet`](dep::SourceSet)
//!   listing the deps they read during their last run.
//! - A write walks the source's dep, notifying each consumer. Computeds
//!   forward the notification lazily; effects enqueue themselves on the
//!   [`Scheduler`](scheduler::Scheduler).
//!
//! # Design Decisions
//!
//! 1. The graph is distributed across the nodes instead of centralized in
//!    one map. Each node carries its own edges, so dropping a node needs no
//!    global lookup.
//!
//! 2. Edges are indexed by [`NodeId`] for O(1) removal from either side.
//!
//! 3. Consumer edge sets are rebuilt from scratch on every run, which gives
//!    branch-dependent tracking for free.

pub(crate) mod dep;
mod node;
pub(crate) mod scheduler;

pub(crate) use node::StateGuard;
pub use node::{ComputedState, EffectState, NodeId, NodeKind, NotifyKind};

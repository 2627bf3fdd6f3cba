//! Reactive Primitives
//!
//! This module implements the user-facing reactive system: signals,
//! computeds, effects, scopes and watchers, built on the graph engine in
//! [`crate::graph`].
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (a computed or effect), the signal automatically
//! registers that context as a dependent. When the signal's value changes,
//! all dependents are notified.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. It re-evaluates
//! only when read after one of its dependencies changed, and tells its own
//! dependents about a change only if the new value is actually different.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Effects are used to synchronize reactive state with
//! the outside world.
//!
//! ## Scopes
//!
//! A Scope groups effects and computeds so they can be disposed together.
//! Effects also act as scopes for whatever they create while running.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local runtime to detect dependencies
//! automatically. When a source is read, we check if there is a running
//! consumer and, if so, record an edge in both directions.

pub(crate) mod context;
mod computed;
mod effect;
mod equality;
mod runtime;
mod scope;
mod signal;
mod watch;

pub use computed::{Computed, ComputedOptions};
pub use effect::{Effect, EffectOptions};
pub use equality::Equality;
pub use runtime::{
    batch, cleanup, configure, current_config, is_batching, is_tracking, try_batch, untrack,
};
pub use scope::{Disposable, Scope};
pub use signal::{Signal, SignalOptions};
pub use watch::{watch, WatchOptions, WatchSource, Watched};

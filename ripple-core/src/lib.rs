//! Ripple Core
//!
//! This crate provides a fine-grained reactive runtime. It implements:
//!
//! - Reactive primitives (signals, computeds, effects)
//! - A glitch-free propagation engine with lazy, memoized derivations
//! - Batching with a bounded run-loop
//! - Scopes for structured, hierarchical disposal
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `graph`: the dependency registry, node states and the scheduler
//! - `reactive`: the primitives built on top of it, and the per-thread runtime
//!
//! Every thread has its own independent runtime. Handles are `Rc`-based and
//! cannot be sent to another thread.
//!
//! # Example
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use ripple_core::{Computed, Effect, Signal};
//!
//! // Create a signal
//! let count = Signal::new(0);
//!
//! // Create a derived value
//! let doubled = Computed::new({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! // Create an effect
//! let seen = Rc::new(Cell::new(0));
//! let _effect = Effect::new({
//!     let doubled = doubled.clone();
//!     let seen = seen.clone();
//!     move || seen.set(doubled.get())
//! });
//!
//! // Update the signal
//! count.set(5);
//! // Effect automatically ran
//! assert_eq!(seen.get(), 10);
//! ```

pub mod graph;
pub mod reactive;

mod config;
mod error;

pub use config::{RuntimeConfig, DEFAULT_MAX_ROUNDS, ENV_MAX_ROUNDS};
pub use error::{ReactiveError, Result};
pub use graph::{ComputedState, EffectState, NodeId, NodeKind};
pub use reactive::{
    batch, cleanup, configure, current_config, is_batching, is_tracking, try_batch, untrack, watch,
    Computed, ComputedOptions, Disposable, Effect, EffectOptions, Equality, Scope, Signal,
    SignalOptions, WatchOptions, WatchSource, Watched,
};

/// Create a signal compared by [`PartialEq`].
pub fn signal<T: PartialEq + 'static>(value: T) -> Signal<T> {
    Signal::new(value)
}

/// Create a lazily evaluated computed.
pub fn computed<T, F>(f: F) -> Computed<T>
where
    T: PartialEq + 'static,
    F: Fn() -> T + 'static,
{
    Computed::new(f)
}

/// Create an effect and run it once.
pub fn effect<F>(f: F) -> Effect
where
    F: Fn() + 'static,
{
    Effect::new(f)
}

/// Create a scope, attached to the current owner unless `detached`.
pub fn scope(detached: bool) -> Scope {
    if detached {
        Scope::detached()
    } else {
        Scope::new()
    }
}

//! Runtime Operations
//!
//! Free functions that act on the calling thread's reactive runtime rather
//! than on a particular node: batching, untracked reads, cleanup
//! registration and configuration.
//!
//! # Batching
//!
//! Writes inside [`batch`] are applied immediately and are visible to any
//! read in the same batch. Only the re-runs of effects are deferred: every
//! effect touched by the batch runs once, when the outermost batch returns.

use super::context::{self, ReactiveContext};
use crate::config::RuntimeConfig;
use crate::error::{ReactiveError, Result};

/// Run `f` with effect re-runs deferred until it returns.
///
/// # Panics
///
/// Panics if the deferred propagation does not settle within the configured
/// round cap. Use [`try_batch`] to get the error instead.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use ripple_core::{batch, Effect, Signal};
///
/// let a = Signal::new(1);
/// let b = Signal::new(2);
/// let runs = Rc::new(Cell::new(0));
///
/// let _effect = Effect::new({
///     let (a, b, runs) = (a.clone(), b.clone(), runs.clone());
///     move || {
///         a.get();
///         b.get();
///         runs.set(runs.get() + 1);
///     }
/// });
///
/// batch(|| {
///     a.set(10);
///     b.set(20);
/// });
/// assert_eq!(runs.get(), 2);
/// ```
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    match try_batch(f) {
        Ok(value) => value,
        Err(err) => panic!("{err}"),
    }
}

/// Like [`batch`], reporting propagation divergence as an error.
///
/// Nested batches collapse: only the outermost one drains.
pub fn try_batch<R>(f: impl FnOnce() -> R) -> Result<R> {
    context::pause();
    let guard = PauseGuard { armed: true };
    let value = f();
    guard.disarm();
    context::resume()?;
    Ok(value)
}

/// Undoes a pause without draining if the batch body unwinds.
struct PauseGuard {
    armed: bool,
}

impl PauseGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PauseGuard {
    fn drop(&mut self) {
        if self.armed {
            context::resume_without_flush();
        }
    }
}

/// Run `f` without recording any reads as dependencies.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::untracked();
    f()
}

/// Register `f` with the running effect or computed. It runs before that
/// consumer's next run, or when the consumer is disposed.
///
/// Returns [`ReactiveError::NoRunningConsumer`] outside a consumer run.
pub fn cleanup<F>(f: F) -> Result<()>
where
    F: FnOnce() + 'static,
{
    match ReactiveContext::running_consumer() {
        Some(consumer) => {
            consumer.add_cleanup(Box::new(f));
            Ok(())
        }
        None => Err(ReactiveError::NoRunningConsumer),
    }
}

/// Install `config` for the calling thread.
pub fn configure(config: RuntimeConfig) {
    tracing::debug!(max_rounds = config.max_rounds, "runtime configured");
    context::set_config(config);
}

/// The configuration active on the calling thread.
pub fn current_config() -> RuntimeConfig {
    context::config()
}

/// Whether reads on the calling thread are currently recorded as
/// dependencies.
pub fn is_tracking() -> bool {
    ReactiveContext::is_tracking()
}

/// Whether the calling thread is inside a [`batch`].
pub fn is_batching() -> bool {
    context::is_batching()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Effect, Signal};
    use std::cell::Cell;
    use std::rc::Rc;

    fn tracked_runs(signals: &[Signal<i32>]) -> (Effect, Rc<Cell<usize>>) {
        let runs = Rc::new(Cell::new(0));
        let effect = Effect::new({
            let signals = signals.to_vec();
            let runs = runs.clone();
            move || {
                for signal in &signals {
                    signal.get();
                }
                runs.set(runs.get() + 1);
            }
        });
        (effect, runs)
    }

    #[test]
    fn batch_defers_until_end() {
        let a = Signal::new(0);
        let b = Signal::new(0);
        let (_effect, runs) = tracked_runs(&[a.clone(), b.clone()]);

        batch(|| {
            a.set(1);
            assert!(is_batching());
            assert_eq!(runs.get(), 1);
            b.set(1);
            assert_eq!(runs.get(), 1);
        });

        assert!(!is_batching());
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn writes_inside_batch_are_visible() {
        let a = Signal::new(0);
        let seen = batch(|| {
            a.set(5);
            a.get()
        });
        assert_eq!(seen, 5);
    }

    #[test]
    fn nested_batches_drain_once() {
        let a = Signal::new(0);
        let (_effect, runs) = tracked_runs(&[a.clone()]);

        batch(|| {
            a.set(1);
            batch(|| a.set(2));
            assert_eq!(runs.get(), 1);
            a.set(3);
        });

        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn panicking_batch_releases_pause() {
        let a = Signal::new(0);
        let (_effect, runs) = tracked_runs(&[a.clone()]);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            batch(|| {
                a.set(1);
                panic!("inside batch");
            })
        }));
        assert!(result.is_err());
        assert!(!is_batching());

        a.set(2);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn untrack_skips_dependency() {
        let a = Signal::new(0);
        let b = Signal::new(0);
        let runs = Rc::new(Cell::new(0));
        let _effect = Effect::new({
            let (a, b, runs) = (a.clone(), b.clone(), runs.clone());
            move || {
                a.get();
                untrack(|| b.get());
                runs.set(runs.get() + 1);
            }
        });

        b.set(1);
        assert_eq!(runs.get(), 1);
        a.set(1);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn tracking_is_visible_inside_consumers() {
        assert!(!is_tracking());
        let observed = Rc::new(Cell::new((false, true)));
        let _effect = Effect::new({
            let observed = observed.clone();
            move || observed.set((is_tracking(), untrack(is_tracking)))
        });
        assert_eq!(observed.get(), (true, false));
    }

    #[test]
    fn cleanup_outside_consumer_is_an_error() {
        assert_eq!(cleanup(|| {}), Err(ReactiveError::NoRunningConsumer));
        assert_eq!(untrack(|| cleanup(|| {})), Err(ReactiveError::NoRunningConsumer));
    }

    #[test]
    fn cleanup_inside_untrack_still_registers() {
        let a = Signal::new(0);
        let cleaned = Rc::new(Cell::new(0));
        let _effect = Effect::new({
            let (a, cleaned) = (a.clone(), cleaned.clone());
            move || {
                a.get();
                let cleaned = cleaned.clone();
                untrack(|| cleanup(move || cleaned.set(cleaned.get() + 1))).unwrap();
            }
        });

        a.set(1);
        assert_eq!(cleaned.get(), 1);
    }

    #[test]
    fn divergence_is_reported_from_try_set() {
        configure(RuntimeConfig::default().with_max_rounds(8));

        let a = Signal::new(0);
        let b = Signal::new(0);
        let _ping = Effect::new({
            let (a, b) = (a.clone(), b.clone());
            move || b.set(a.get() + 1)
        });
        let _pong = Effect::new({
            let (a, b) = (a.clone(), b.clone());
            move || a.set(b.get() + 1)
        });

        let err = a.try_set(100).unwrap_err();
        assert_eq!(err, ReactiveError::PropagationDiverged { rounds: 8 });

        configure(RuntimeConfig::default());
        assert_eq!(current_config().max_rounds, 10_000);
    }
}

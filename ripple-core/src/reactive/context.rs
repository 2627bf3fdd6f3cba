//! Reactive Context
//!
//! The reactive context tracks which computation is currently running and
//! which owner new reactive units should attach to.
//!
//! # Implementation
//!
//! Each thread carries one [`Runtime`] in a thread-local. It holds:
//!
//! - the consumer stack. When a computed or effect runs, it is pushed for
//!   the duration of its body; a read records an edge to whatever is on top.
//!   [`untrack`](crate::untrack) pushes a frame that keeps the consumer (so
//!   [`cleanup`](crate::cleanup) still finds it) but disables recording.
//!   Runs that belong to no consumer (a stopped effect's body) push an empty
//!   frame instead.
//! - the owner stack. Running effects and [`Scope::run`](crate::Scope::run)
//!   blocks push themselves so that units created inside them are adopted.
//! - a root owner that keeps top-level effects alive.
//! - the scheduler and the active configuration.
//!
//! The stacks are only touched through guards that pop on drop, so they stay
//! balanced even if a computation panics.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::graph::dep::Subscriber;
use crate::graph::scheduler::{Job, Scheduler};
use crate::graph::NodeId;

use super::scope::{Disposable, ScopeInner};

thread_local! {
    static RUNTIME: Runtime = Runtime::new();
}

/// Something that takes ownership of reactive units created while it is
/// active.
pub(crate) trait Owner {
    /// Take ownership of `unit`; it is disposed together with the owner.
    fn adopt(&self, unit: Rc<dyn Disposable>);

    /// Forget `id` without disposing it (it is being disposed on its own).
    fn release(&self, id: NodeId);

    /// Attach a child scope.
    fn attach_scope(&self, scope: Rc<ScopeInner>);
}

/// An entry in the consumer stack.
struct Frame {
    observer: Option<Rc<dyn Subscriber>>,
    tracking: bool,
}

/// Per-thread reactive runtime state.
pub(crate) struct Runtime {
    frames: RefCell<Vec<Frame>>,
    owners: RefCell<Vec<Rc<dyn Owner>>>,
    root: Rc<ScopeInner>,
    scheduler: Scheduler,
    config: Cell<RuntimeConfig>,
}

impl Runtime {
    fn new() -> Self {
        Self {
            frames: RefCell::new(Vec::new()),
            owners: RefCell::new(Vec::new()),
            root: ScopeInner::root(),
            scheduler: Scheduler::new(),
            config: Cell::new(RuntimeConfig::default()),
        }
    }
}

fn with_runtime<R>(f: impl FnOnce(&Runtime) -> R) -> R {
    RUNTIME.with(f)
}

/// Drain the scheduler unless it is paused or already draining.
pub(crate) fn flush() -> Result<()> {
    with_runtime(|rt| rt.scheduler.flush(rt.config.get().max_rounds))
}

pub(crate) fn enqueue(job: Rc<dyn Job>) {
    with_runtime(|rt| rt.scheduler.enqueue(job));
}

pub(crate) fn pause() {
    with_runtime(|rt| rt.scheduler.pause());
}

/// Undo one pause; drains when the outermost pause ends.
pub(crate) fn resume() -> Result<()> {
    with_runtime(|rt| {
        if rt.scheduler.resume() {
            tracing::trace!(pending = rt.scheduler.pending_jobs(), "batch ended");
            rt.scheduler.flush(rt.config.get().max_rounds)
        } else {
            Ok(())
        }
    })
}

/// Undo one pause without draining. Used when unwinding out of a batch.
pub(crate) fn resume_without_flush() {
    with_runtime(|rt| {
        rt.scheduler.resume();
    });
}

pub(crate) fn is_batching() -> bool {
    with_runtime(|rt| rt.scheduler.is_paused())
}

pub(crate) fn config() -> RuntimeConfig {
    with_runtime(|rt| rt.config.get())
}

pub(crate) fn set_config(mut config: RuntimeConfig) {
    config.normalize();
    with_runtime(|rt| rt.config.set(config));
}

/// Hand `unit` to the innermost active owner.
///
/// With no owner active, `keep_alive` units go to the thread's root owner
/// (effects, which nothing else would keep alive); others stay unowned.
/// Returns the owner so the unit can detach itself later.
pub(crate) fn adopt(unit: Rc<dyn Disposable>, keep_alive: bool) -> Option<Weak<dyn Owner>> {
    let owner = match current_owner() {
        Some(owner) => owner,
        None if keep_alive => with_runtime(|rt| Rc::clone(&rt.root) as Rc<dyn Owner>),
        None => return None,
    };
    owner.adopt(unit);
    Some(Rc::downgrade(&owner))
}

/// Attach a non-detached scope to the innermost active owner, or to the
/// root owner if there is none.
pub(crate) fn attach_scope(scope: Rc<ScopeInner>) -> Weak<dyn Owner> {
    let owner = current_owner()
        .unwrap_or_else(|| with_runtime(|rt| Rc::clone(&rt.root) as Rc<dyn Owner>));
    owner.attach_scope(scope);
    Rc::downgrade(&owner)
}

/// The innermost active owner, if any.
pub(crate) fn current_owner() -> Option<Rc<dyn Owner>> {
    with_runtime(|rt| rt.owners.borrow().last().cloned())
}

/// Guard that pops the consumer frame when dropped.
///
/// This ensures the consumer stack is properly maintained even if the
/// computation panics.
pub(crate) struct ReactiveContext {
    observer_id: Option<NodeId>,
}

impl ReactiveContext {
    /// Enter a tracking context for `observer`.
    ///
    /// While this context is active, any source that is read registers
    /// `observer` as a dependent.
    pub(crate) fn enter(observer: Rc<dyn Subscriber>) -> Self {
        let observer_id = Some(observer.id());
        with_runtime(|rt| {
            rt.frames.borrow_mut().push(Frame {
                observer: Some(observer),
                tracking: true,
            });
        });
        Self { observer_id }
    }

    /// Enter a context in which reads are not recorded. The running
    /// consumer, if any, stays reachable for cleanup registration.
    pub(crate) fn untracked() -> Self {
        let observer = Self::running_consumer();
        let observer_id = observer.as_ref().map(|o| o.id());
        with_runtime(|rt| {
            rt.frames.borrow_mut().push(Frame {
                observer,
                tracking: false,
            });
        });
        Self { observer_id }
    }

    /// Enter a context with no consumer at all: reads are not recorded and
    /// [`cleanup`](crate::cleanup) has nothing to register with.
    pub(crate) fn detached() -> Self {
        with_runtime(|rt| {
            rt.frames.borrow_mut().push(Frame {
                observer: None,
                tracking: false,
            });
        });
        Self { observer_id: None }
    }

    /// The consumer that reads should be recorded against, if any.
    pub(crate) fn current_observer() -> Option<Rc<dyn Subscriber>> {
        with_runtime(|rt| {
            rt.frames
                .borrow()
                .last()
                .filter(|frame| frame.tracking)
                .and_then(|frame| frame.observer.clone())
        })
    }

    /// The consumer whose body is executing, tracked or not.
    pub(crate) fn running_consumer() -> Option<Rc<dyn Subscriber>> {
        with_runtime(|rt| {
            rt.frames
                .borrow()
                .last()
                .and_then(|frame| frame.observer.clone())
        })
    }

    /// Check whether reads are currently being recorded.
    pub(crate) fn is_tracking() -> bool {
        Self::current_observer().is_some()
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let popped = with_runtime(|rt| rt.frames.borrow_mut().pop());

        // Verify we're popping the right context.
        if let Some(frame) = popped {
            debug_assert_eq!(
                frame.observer.as_ref().map(|o| o.id()),
                self.observer_id,
                "ReactiveContext mismatch"
            );
        }
    }
}

/// Guard that makes an owner current for its lifetime.
pub(crate) struct OwnerContext {
    _private: (),
}

impl OwnerContext {
    pub(crate) fn enter(owner: Rc<dyn Owner>) -> Self {
        with_runtime(|rt| rt.owners.borrow_mut().push(owner));
        Self { _private: () }
    }
}

impl Drop for OwnerContext {
    fn drop(&mut self) {
        with_runtime(|rt| {
            rt.owners.borrow_mut().pop();
        });
    }
}

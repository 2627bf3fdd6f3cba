//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change, and only when somebody reads it.
//!
//! # How Computeds Work
//!
//! 1. Creating a computed runs nothing. The first read runs the function and
//!    caches the result.
//!
//! 2. When an upstream signal changes, the computed becomes `Dirty`. When an
//!    upstream computed goes stale, it becomes `Pending`: the upstream may or
//!    may not end up with a different value.
//!
//! 3. Either way it tells its own consumers "maybe changed", once, until they
//!    hear the outcome. A recompute that panics leaves the computed `Dirty`
//!    and ready to tell them again.
//!
//! 4. On the next read, a `Pending` computed confirms its upstream computeds
//!    first. If none of them actually changed, it goes back to `Clean`
//!    without recomputing. A `Dirty` computed recomputes.
//!
//! 5. After resolving, consumers hear either "changed" (the new value
//!    differs under the computed's [`Equality`]) or a settle message that
//!    cancels the earlier "maybe".
//!
//! # Why This Matters
//!
//! This push-dirty/pull-value approach is glitch free: a consumer that
//! depends on the same signal through two paths never observes one path
//! updated and the other stale, and never runs twice for one write.

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use super::context::{self, Owner, ReactiveContext};
use super::equality::Equality;
use super::scope::Disposable;
use crate::error::{ReactiveError, Result};
use crate::graph::dep::{Cleanup, Confirm, Dep, SourceSet, Subscriber};
use crate::graph::{ComputedState, NodeId, NodeKind, NotifyKind, StateGuard};

/// Construction options for a [`Computed`].
pub struct ComputedOptions<T> {
    equality: Equality<T>,
    name: Option<String>,
    on_state_change: Option<Rc<dyn Fn()>>,
}

impl<T> ComputedOptions<T> {
    /// Options with the given equality policy.
    pub fn with_equality(equality: Equality<T>) -> Self {
        Self {
            equality,
            name: None,
            on_state_change: None,
        }
    }

    /// Replace the equality policy used to decide whether a recomputation
    /// changed the value.
    #[must_use]
    pub fn equality(mut self, equality: Equality<T>) -> Self {
        self.equality = equality;
        self
    }

    /// Set a debug name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Invoke `f` after every recomputation.
    #[must_use]
    pub fn on_state_change<F>(mut self, f: F) -> Self
    where
        F: Fn() + 'static,
    {
        self.on_state_change = Some(Rc::new(f));
        self
    }
}

impl<T: PartialEq + 'static> Default for ComputedOptions<T> {
    fn default() -> Self {
        Self::with_equality(Equality::structural())
    }
}

pub(crate) struct ComputedInner<T: 'static> {
    id: NodeId,
    name: Option<String>,
    compute: Rc<dyn Fn() -> T>,
    value: RefCell<Option<T>>,
    equality: Equality<T>,
    state: Cell<ComputedState>,
    pending: Cell<usize>,
    /// Subscribers were told "maybe changed" and have not heard the outcome.
    forwarded: Cell<bool>,
    sources: SourceSet,
    dep: Rc<Dep>,
    cleanups: RefCell<SmallVec<[Cleanup; 2]>>,
    disposed: Cell<bool>,
    owner: RefCell<Option<Weak<dyn Owner>>>,
    on_state_change: Option<Rc<dyn Fn()>>,
    run_count: Cell<usize>,
    this: Weak<ComputedInner<T>>,
}

impl<T: 'static> ComputedInner<T> {
    fn set_state(&self, state: ComputedState) {
        self.state.set(state);
    }

    fn run_cleanups(&self) {
        let cleanups = std::mem::take(&mut *self.cleanups.borrow_mut());
        for cleanup in cleanups {
            cleanup();
        }
    }

    /// Resolve `Pending` by confirming upstream computeds.
    ///
    /// Returns `true` if the computed must recompute.
    fn resolve(&self) -> bool {
        self.set_state(ComputedState::Resolving);
        // Cleared before confirming: if this unwinds, the next notification
        // must reach subscribers again.
        self.forwarded.set(false);
        self.pending.set(0);
        let guard = StateGuard::new(&self.state, ComputedState::Dirty);

        for dep in self.sources.snapshot() {
            dep.confirm_owner();
            if self.state.get() == ComputedState::Dirty {
                break;
            }
        }
        guard.disarm();

        if self.state.get() == ComputedState::Resolving {
            self.set_state(ComputedState::Clean);
            self.pending.set(0);
            self.dep.settle_subscribers();
            return false;
        }
        true
    }

    fn recompute(&self) {
        let Some(this) = self.this.upgrade() else {
            return;
        };

        self.run_cleanups();
        self.sources.release(self.id);
        self.pending.set(0);
        self.forwarded.set(false);
        self.set_state(ComputedState::Running);

        let new_value = {
            let guard = StateGuard::new(&self.state, ComputedState::Dirty);
            let _span = tracing::trace_span!("computed", id = ?self.id, name = self.name.as_deref())
                .entered();
            let _ctx = ReactiveContext::enter(this as Rc<dyn Subscriber>);
            let compute = Rc::clone(&self.compute);
            let value = compute();
            guard.disarm();
            value
        };

        let changed = match &*self.value.borrow() {
            Some(old) => !self.equality.eq(old, &new_value),
            None => true,
        };
        if changed {
            *self.value.borrow_mut() = Some(new_value);
        }
        self.set_state(ComputedState::Clean);
        self.run_count.set(self.run_count.get() + 1);

        if let Some(on_state_change) = &self.on_state_change {
            on_state_change();
        }

        if changed {
            self.dep.notify_subscribers(NotifyKind::Changed);
        } else {
            self.dep.settle_subscribers();
        }
    }

    fn try_confirm(&self) -> Result<()> {
        match self.state.get() {
            ComputedState::Clean => Ok(()),
            ComputedState::Running | ComputedState::Resolving => {
                tracing::warn!(computed = ?self.id, name = self.name.as_deref(), "circular read");
                Err(ReactiveError::CircularDependency { node: self.id })
            }
            ComputedState::Pending => {
                if self.resolve() {
                    self.recompute();
                }
                Ok(())
            }
            ComputedState::Dirty => {
                self.recompute();
                Ok(())
            }
        }
    }

    /// A disposed computed keeps its last value. If it never had one, compute
    /// it once without recording any edges.
    fn fill_detached(&self) {
        if self.value.borrow().is_some() {
            return;
        }
        let value = {
            let _ctx = ReactiveContext::detached();
            let compute = Rc::clone(&self.compute);
            compute()
        };
        *self.value.borrow_mut() = Some(value);
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        self.sources.release(self.id);
        self.dep.clear();
        self.pending.set(0);
        self.run_cleanups();
        let owner = self.owner.borrow_mut().take();
        if let Some(owner) = owner.and_then(|w| w.upgrade()) {
            owner.release(self.id);
        }
        tracing::trace!(computed = ?self.id, "disposed");
    }
}

impl<T: 'static> Subscriber for ComputedInner<T> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn notify(self: Rc<Self>, kind: NotifyKind) {
        if self.disposed.get() {
            return;
        }

        let state = self.state.get();
        match state {
            ComputedState::Running => {
                tracing::warn!(computed = ?self.id, "computed wrote to its own input; ignored");
                return;
            }
            ComputedState::Resolving => {
                match kind {
                    NotifyKind::Changed => self.set_state(ComputedState::Dirty),
                    NotifyKind::MaybeChanged => self.pending.set(self.pending.get() + 1),
                }
                return;
            }
            _ => {}
        }

        match kind {
            NotifyKind::Changed => self.set_state(ComputedState::Dirty),
            NotifyKind::MaybeChanged => {
                self.pending.set(self.pending.get() + 1);
                if state == ComputedState::Clean {
                    self.set_state(ComputedState::Pending);
                }
            }
        }

        if !self.forwarded.replace(true) {
            self.dep.notify_subscribers(NotifyKind::MaybeChanged);
        }
    }

    fn settle(self: Rc<Self>) {
        if self.disposed.get() {
            return;
        }
        let pending = self.pending.get().saturating_sub(1);
        self.pending.set(pending);
        if pending == 0 && self.state.get() == ComputedState::Pending {
            self.set_state(ComputedState::Clean);
            self.forwarded.set(false);
            self.dep.settle_subscribers();
        }
    }

    fn add_source(&self, dep: Rc<Dep>) -> bool {
        if self.disposed.get() {
            return false;
        }
        self.sources.insert(dep);
        true
    }

    fn add_cleanup(&self, cleanup: Cleanup) {
        self.cleanups.borrow_mut().push(cleanup);
    }
}

impl<T: 'static> Confirm for ComputedInner<T> {
    fn confirm(&self) {
        // A circular read is reported to whoever reads; confirmation from a
        // downstream walk just stops here.
        let _ = self.try_confirm();
    }
}

impl<T: 'static> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        self.sources.release(self.id);
    }
}

/// A cached derived value that recomputes only when read after one of its
/// dependencies changed.
///
/// # Example
///
/// ```rust
/// use ripple_core::{Computed, Signal};
///
/// let count = Signal::new(2);
/// let doubled = Computed::new({
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: PartialEq + 'static> Computed<T> {
    /// Create a new computed with the given computation function.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::with_options(compute, ComputedOptions::default())
    }
}

impl<T: 'static> Computed<T> {
    /// Create a new computed with explicit options.
    pub fn with_options<F>(compute: F, options: ComputedOptions<T>) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let id = NodeId::new();
        let inner = Rc::new_cyclic(|this: &Weak<ComputedInner<T>>| {
            let owner: Weak<dyn Confirm> = this.clone();
            ComputedInner {
                id,
                name: options.name,
                compute: Rc::new(compute),
                value: RefCell::new(None),
                equality: options.equality,
                state: Cell::new(ComputedState::Dirty),
                pending: Cell::new(0),
                forwarded: Cell::new(false),
                sources: SourceSet::default(),
                dep: Dep::with_owner(id, owner),
                cleanups: RefCell::new(SmallVec::new()),
                disposed: Cell::new(false),
                owner: RefCell::new(None),
                on_state_change: options.on_state_change,
                run_count: Cell::new(0),
                this: this.clone(),
            }
        });

        let computed = Self { inner };
        let owner = context::adopt(Rc::new(computed.clone()), false);
        *computed.inner.owner.borrow_mut() = owner;
        computed
    }

    /// Get the computed's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// The debug name, if one was given.
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// This is the main entry point for reading a computed's value.
    ///
    /// # Panics
    ///
    /// Panics if the computed depends on itself. Use
    /// [`try_get`](Self::try_get) to get the error instead.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        match self.try_get() {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Get the current value, reporting a circular read as an error.
    pub fn try_get(&self) -> Result<T>
    where
        T: Clone,
    {
        if self.inner.disposed.get() {
            self.inner.fill_detached();
        } else {
            self.inner.try_confirm()?;
            self.inner.dep.track();
        }

        self.inner
            .value
            .borrow()
            .clone()
            .ok_or(ReactiveError::CircularDependency { node: self.inner.id })
    }

    /// The cached value, without confirming or tracking. `None` until the
    /// first read.
    pub fn get_untracked(&self) -> Option<T>
    where
        T: Clone,
    {
        self.inner.value.borrow().clone()
    }

    /// Get the current state.
    pub fn state(&self) -> ComputedState {
        self.inner.state.get()
    }

    /// Check if the computed has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Number of times the function has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Get the number of consumers currently depending on this computed.
    pub fn subscriber_count(&self) -> usize {
        self.inner.dep.subscriber_count()
    }

    /// Number of sources read during the last computation.
    pub fn dependency_count(&self) -> usize {
        self.inner.sources.len()
    }
}

impl<T: 'static> Disposable for Computed<T> {
    fn node_id(&self) -> NodeId {
        self.inner.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Computed
    }

    /// Release all edges. Later reads return the cached value untracked.
    fn dispose(&self) {
        self.inner.dispose();
    }

    fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field("value", &*self.inner.value.borrow())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

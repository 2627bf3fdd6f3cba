//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies (unless it was created lazily).
//!
//! 2. When a dependency definitely changes, the effect is marked
//!    `NeedsUpdate` and queued on the scheduler. When an upstream computed
//!    only *may* have changed, the effect is marked `Pending` and queued; at
//!    its turn it confirms the computed first and only runs if the value
//!    really changed.
//!
//! 3. Before re-running, the effect runs the cleanups registered during its
//!    last run, disposes the effects and computeds it created, and drops its
//!    old dependencies. The new run tracks from scratch.
//!
//! # Differences from Computed
//!
//! - Computeds return a value; effects do not.
//! - Computeds are lazy (compute on access); effects are eager (run when deps change).
//! - Computeds cache results; effects just run their side effect.
//!
//! # Lifetime
//!
//! An effect created outside any owner is kept alive by the thread's root
//! owner until [`Effect::stop`] is called. Dropping the handle does not stop
//! it. Effects created while another effect runs are children of that run.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use super::context::{self, Owner, OwnerContext, ReactiveContext};
use super::scope::{Disposable, ScopeInner};
use crate::graph::dep::{Cleanup, Dep, SourceSet, Subscriber};
use crate::graph::scheduler::Job;
use crate::graph::{EffectState, NodeId, NodeKind, NotifyKind, StateGuard};

/// Construction options for an [`Effect`].
#[derive(Debug, Clone)]
pub struct EffectOptions {
    immediate: bool,
    name: Option<String>,
}

impl EffectOptions {
    pub fn new() -> Self {
        Self {
            immediate: true,
            name: None,
        }
    }

    /// Whether to run the effect once on creation. Defaults to `true`.
    #[must_use]
    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    /// Set a debug name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl Default for EffectOptions {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) struct EffectInner {
    id: NodeId,
    name: Option<String>,
    body: Rc<dyn Fn()>,
    state: Cell<EffectState>,
    pending: Cell<usize>,
    active: Cell<bool>,
    sources: SourceSet,
    cleanups: RefCell<SmallVec<[Cleanup; 2]>>,
    children: RefCell<Vec<Rc<dyn Disposable>>>,
    owner: RefCell<Option<Weak<dyn Owner>>>,
    run_count: Cell<usize>,
    this: Weak<EffectInner>,
}

impl EffectInner {
    fn run_cleanups(&self) {
        let cleanups = std::mem::take(&mut *self.cleanups.borrow_mut());
        for cleanup in cleanups {
            cleanup();
        }
    }

    fn dispose_children(&self) {
        let children = std::mem::take(&mut *self.children.borrow_mut());
        for child in children {
            child.dispose();
        }
    }

    /// Run the body.
    ///
    /// The previous run's bookkeeping is torn down before the body starts, so
    /// a panicking body still leaves the effect consistent.
    fn execute(&self) {
        let Some(this) = self.this.upgrade() else {
            return;
        };

        if !self.active.get() {
            let _ctx = ReactiveContext::detached();
            let body = Rc::clone(&self.body);
            body();
            return;
        }

        if self.state.get() == EffectState::Running {
            tracing::warn!(effect = ?self.id, "effect re-entered its own run; ignored");
            return;
        }

        self.run_cleanups();
        self.dispose_children();
        self.sources.release(self.id);
        self.pending.set(0);
        self.state.set(EffectState::Running);
        self.run_count.set(self.run_count.get() + 1);

        let guard = StateGuard::new(&self.state, EffectState::Clean);
        {
            let _span = tracing::trace_span!("effect", id = ?self.id, name = self.name.as_deref())
                .entered();
            let _owner = OwnerContext::enter(Rc::clone(&this) as Rc<dyn Owner>);
            let _ctx = ReactiveContext::enter(this as Rc<dyn Subscriber>);
            let body = Rc::clone(&self.body);
            body();
        }
        guard.disarm();

        if self.state.get() == EffectState::Running {
            self.state.set(EffectState::Clean);
        }
    }

    /// Confirm upstream computeds. Leaves the state `NeedsUpdate` if one of
    /// them changed, `Clean` otherwise.
    fn resolve(&self) {
        self.state.set(EffectState::Resolving);
        self.pending.set(0);
        let guard = StateGuard::new(&self.state, EffectState::Clean);

        for dep in self.sources.snapshot() {
            dep.confirm_owner();
            if self.state.get() == EffectState::NeedsUpdate {
                break;
            }
        }
        guard.disarm();

        if self.state.get() == EffectState::Resolving {
            self.state.set(EffectState::Clean);
        }
        self.pending.set(0);
    }

    fn dispose(&self) {
        if !self.active.replace(false) {
            return;
        }
        self.sources.release(self.id);
        self.pending.set(0);
        if self.state.get() != EffectState::Running {
            self.state.set(EffectState::Clean);
        }
        self.run_cleanups();
        self.dispose_children();

        let owner = self.owner.borrow_mut().take();
        if let Some(owner) = owner.and_then(|w| w.upgrade()) {
            owner.release(self.id);
        }
        tracing::trace!(effect = ?self.id, name = self.name.as_deref(), "stopped");
    }
}

impl Subscriber for EffectInner {
    fn id(&self) -> NodeId {
        self.id
    }

    fn notify(self: Rc<Self>, kind: NotifyKind) {
        if !self.active.get() {
            return;
        }

        match self.state.get() {
            EffectState::Running => {
                tracing::trace!(effect = ?self.id, "notified while running; ignored");
                return;
            }
            EffectState::Resolving => {
                match kind {
                    NotifyKind::Changed => self.state.set(EffectState::NeedsUpdate),
                    NotifyKind::MaybeChanged => self.pending.set(self.pending.get() + 1),
                }
                return;
            }
            EffectState::NeedsUpdate => return,
            EffectState::Clean | EffectState::Pending => {}
        }

        match kind {
            NotifyKind::Changed => self.state.set(EffectState::NeedsUpdate),
            NotifyKind::MaybeChanged => {
                self.pending.set(self.pending.get() + 1);
                self.state.set(EffectState::Pending);
            }
        }
        context::enqueue(self);
    }

    fn settle(self: Rc<Self>) {
        if !self.active.get() {
            return;
        }
        let pending = self.pending.get().saturating_sub(1);
        self.pending.set(pending);
        if pending == 0 && self.state.get() == EffectState::Pending {
            self.state.set(EffectState::Clean);
        }
    }

    fn add_source(&self, dep: Rc<Dep>) -> bool {
        if !self.active.get() {
            return false;
        }
        self.sources.insert(dep);
        true
    }

    fn add_cleanup(&self, cleanup: Cleanup) {
        self.cleanups.borrow_mut().push(cleanup);
    }
}

impl Job for EffectInner {
    fn id(&self) -> NodeId {
        self.id
    }

    fn run_job(self: Rc<Self>) {
        if !self.active.get() {
            return;
        }
        if self.state.get() == EffectState::Pending {
            self.resolve();
        }
        if self.state.get() == EffectState::NeedsUpdate {
            self.execute();
        }
    }

    fn cancel(&self) {
        if self.state.get() != EffectState::Running {
            self.state.set(EffectState::Clean);
        }
        self.pending.set(0);
    }
}

impl Owner for EffectInner {
    fn adopt(&self, unit: Rc<dyn Disposable>) {
        if self.active.get() {
            self.children.borrow_mut().push(unit);
        } else {
            unit.dispose();
        }
    }

    fn release(&self, id: NodeId) {
        self.children.borrow_mut().retain(|child| child.node_id() != id);
    }

    fn attach_scope(&self, scope: Rc<ScopeInner>) {
        self.adopt(scope);
    }
}

/// A side-effecting computation that re-runs when its dependencies change.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use ripple_core::{Effect, Signal};
///
/// let count = Signal::new(0);
/// let seen = Rc::new(Cell::new(-1));
///
/// let effect = Effect::new({
///     let count = count.clone();
///     let seen = seen.clone();
///     move || seen.set(count.get())
/// });
/// assert_eq!(seen.get(), 0);
///
/// count.set(5);
/// assert_eq!(seen.get(), 5);
///
/// effect.stop();
/// count.set(6);
/// assert_eq!(seen.get(), 5);
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    /// Create an effect and run it once.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() + 'static,
    {
        Self::with_options(f, EffectOptions::default())
    }

    /// Create an effect without running it. It stays idle until
    /// [`run`](Self::run) is called.
    pub fn new_lazy<F>(f: F) -> Self
    where
        F: Fn() + 'static,
    {
        Self::with_options(f, EffectOptions::default().immediate(false))
    }

    /// Create an effect with explicit options.
    pub fn with_options<F>(f: F, options: EffectOptions) -> Self
    where
        F: Fn() + 'static,
    {
        let inner = Rc::new_cyclic(|this| EffectInner {
            id: NodeId::new(),
            name: options.name,
            body: Rc::new(f),
            state: Cell::new(EffectState::Clean),
            pending: Cell::new(0),
            active: Cell::new(true),
            sources: SourceSet::default(),
            cleanups: RefCell::new(SmallVec::new()),
            children: RefCell::new(Vec::new()),
            owner: RefCell::new(None),
            run_count: Cell::new(0),
            this: this.clone(),
        });

        let effect = Self { inner };
        let owner = context::adopt(Rc::new(effect.clone()), true);
        *effect.inner.owner.borrow_mut() = owner;

        if options.immediate {
            effect.inner.execute();
        }
        effect
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// The debug name, if one was given.
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Run the effect now.
    ///
    /// A stopped effect still runs its body, but reads are not tracked and
    /// nothing is torn down or recorded. Such a run has no consumer of its
    /// own, so [`cleanup`](crate::cleanup) inside it returns
    /// [`NoRunningConsumer`](crate::ReactiveError::NoRunningConsumer) even
    /// when called from another effect. A panic in the body propagates to the
    /// caller.
    pub fn run(&self) {
        self.inner.execute();
    }

    /// Stop the effect: drop its dependencies, run its cleanups, dispose the
    /// units it created and detach it from its owner. Idempotent.
    pub fn stop(&self) {
        self.inner.dispose();
    }

    /// Whether the effect still reacts to changes.
    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    pub fn state(&self) -> EffectState {
        self.inner.state.get()
    }

    /// Number of times the body has run with tracking.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Number of sources read during the last run.
    pub fn dependency_count(&self) -> usize {
        self.inner.sources.len()
    }
}

impl Disposable for Effect {
    fn node_id(&self) -> NodeId {
        self.inner.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Effect
    }

    fn dispose(&self) {
        self.inner.dispose();
    }

    fn is_disposed(&self) -> bool {
        !self.inner.active.get()
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field("active", &self.is_active())
            .field("run_count", &self.run_count())
            .finish()
    }
}

//! Scopes
//!
//! A [`Scope`] owns reactive units so they can be torn down together. Any
//! effect or computed created inside [`Scope::run`] is registered with the
//! scope; disposing the scope stops all of them, runs the scope's cleanups
//! and disposes nested scopes, in that order.
//!
//! Scopes form a tree. A scope created while another owner is active (a
//! running scope block or a running effect) becomes its child, and removes
//! itself from the parent again when disposed, so creating and disposing
//! scopes in a loop does not grow the parent. A detached scope has no parent
//! and lives exactly as long as its handles.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::context::{self, Owner, OwnerContext};
use crate::graph::dep::Cleanup;
use crate::graph::{NodeId, NodeKind};

/// A reactive unit with an explicit end of life.
pub trait Disposable {
    /// The unit's node id.
    fn node_id(&self) -> NodeId;

    /// What sort of node this is.
    fn kind(&self) -> NodeKind;

    /// Release the unit's graph edges and owned resources. Calling this more
    /// than once has no further effect.
    fn dispose(&self);

    fn is_disposed(&self) -> bool;
}

pub(crate) struct ScopeInner {
    id: NodeId,
    detached: bool,
    active: Cell<bool>,
    units: RefCell<Vec<Rc<dyn Disposable>>>,
    cleanups: RefCell<Vec<Cleanup>>,
    children: RefCell<Vec<Rc<ScopeInner>>>,
    owner: RefCell<Option<Weak<dyn Owner>>>,
}

impl ScopeInner {
    fn new(detached: bool) -> Self {
        Self {
            id: NodeId::new(),
            detached,
            active: Cell::new(true),
            units: RefCell::new(Vec::new()),
            cleanups: RefCell::new(Vec::new()),
            children: RefCell::new(Vec::new()),
            owner: RefCell::new(None),
        }
    }

    /// The per-thread owner of last resort. Never disposed.
    pub(crate) fn root() -> Rc<Self> {
        Rc::new(Self::new(true))
    }

    fn add_cleanup(&self, cleanup: Cleanup) {
        if self.active.get() {
            self.cleanups.borrow_mut().push(cleanup);
        } else {
            cleanup();
        }
    }

    fn dispose(&self) {
        if !self.active.replace(false) {
            return;
        }

        let units = std::mem::take(&mut *self.units.borrow_mut());
        let cleanups = std::mem::take(&mut *self.cleanups.borrow_mut());
        let children = std::mem::take(&mut *self.children.borrow_mut());
        tracing::debug!(
            scope = ?self.id,
            units = units.len(),
            cleanups = cleanups.len(),
            children = children.len(),
            "disposing scope"
        );

        for unit in units {
            tracing::trace!(scope = ?self.id, unit = ?unit.node_id(), kind = ?unit.kind(), "dispose unit");
            unit.dispose();
        }
        for cleanup in cleanups {
            cleanup();
        }
        for child in children {
            child.dispose();
        }

        let owner = self.owner.borrow_mut().take();
        if let Some(owner) = owner.and_then(|w| w.upgrade()) {
            owner.release(self.id);
        }
    }
}

impl Owner for ScopeInner {
    fn adopt(&self, unit: Rc<dyn Disposable>) {
        if !self.active.get() {
            unit.dispose();
            return;
        }
        if unit.is_disposed() {
            return;
        }
        // Units registered through `Scope::add_disposable` have no link back
        // to this scope, so stopping them does not release them here.
        let mut units = self.units.borrow_mut();
        units.retain(|unit| !unit.is_disposed());
        units.push(unit);
    }

    fn release(&self, id: NodeId) {
        self.units.borrow_mut().retain(|unit| unit.node_id() != id);
        self.children.borrow_mut().retain(|child| child.id != id);
    }

    fn attach_scope(&self, scope: Rc<ScopeInner>) {
        if self.active.get() {
            self.children.borrow_mut().push(scope);
        } else {
            scope.dispose();
        }
    }
}

impl Disposable for ScopeInner {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Scope
    }

    fn dispose(&self) {
        ScopeInner::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        !self.active.get()
    }
}

/// An ownership container for effects, computeds and nested scopes.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use ripple_core::{Effect, Scope, Signal};
///
/// let count = Signal::new(0);
/// let runs = Rc::new(Cell::new(0));
///
/// let scope = Scope::new();
/// scope.run(|| {
///     let count = count.clone();
///     let runs = runs.clone();
///     Effect::new(move || {
///         count.get();
///         runs.set(runs.get() + 1);
///     });
/// });
///
/// count.set(1);
/// assert_eq!(runs.get(), 2);
///
/// scope.dispose();
/// count.set(2);
/// assert_eq!(runs.get(), 2);
/// ```
#[derive(Clone)]
pub struct Scope {
    inner: Rc<ScopeInner>,
}

impl Scope {
    /// Create a scope owned by the innermost active owner, or by the thread's
    /// root owner if there is none. Such a scope stays alive until it (or
    /// its parent) is disposed.
    pub fn new() -> Self {
        let inner = Rc::new(ScopeInner::new(false));
        let owner = context::attach_scope(Rc::clone(&inner));
        *inner.owner.borrow_mut() = Some(owner);
        Self { inner }
    }

    /// Create a scope with no parent. Disposing an enclosing owner does not
    /// touch it.
    pub fn detached() -> Self {
        Self {
            inner: Rc::new(ScopeInner::new(true)),
        }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Whether the scope was created without a parent.
    pub fn is_detached(&self) -> bool {
        self.inner.detached
    }

    /// Whether the scope has not been disposed yet.
    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Run `f` with this scope as the active owner.
    ///
    /// Effects, computeds and non-detached scopes created inside `f` are
    /// registered with this scope. On a disposed scope they are disposed as
    /// soon as they are created.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        let _owner = OwnerContext::enter(Rc::clone(&self.inner) as Rc<dyn Owner>);
        f()
    }

    /// Register a unit created elsewhere so that it is disposed with this
    /// scope.
    pub fn add_disposable<D>(&self, unit: &D)
    where
        D: Disposable + Clone + 'static,
    {
        self.inner.adopt(Rc::new(unit.clone()));
    }

    /// Register a callback to run when the scope is disposed. On a disposed
    /// scope the callback runs immediately.
    pub fn add_cleanup<F>(&self, f: F)
    where
        F: FnOnce() + 'static,
    {
        self.inner.add_cleanup(Box::new(f));
    }

    /// Dispose every owned unit, run the cleanups, dispose child scopes and
    /// detach from the parent. Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Disposable for Scope {
    fn node_id(&self) -> NodeId {
        self.inner.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Scope
    }

    fn dispose(&self) {
        self.inner.dispose();
    }

    fn is_disposed(&self) -> bool {
        !self.inner.active.get()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("detached", &self.inner.detached)
            .field("active", &self.is_active())
            .field("units", &self.inner.units.borrow().len())
            .field("children", &self.inner.children.borrow().len())
            .finish()
    }
}

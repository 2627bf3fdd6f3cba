//! Dependency Registry
//!
//! A [`Dep`] is the per-key index from a source to the consumers currently
//! reading it. Each consumer keeps the inverse, a [`SourceSet`] of the deps
//! it read during its last run, so either side can drop an edge directly.
//!
//! # Ownership
//!
//! Edges are deliberately lopsided. A consumer holds its deps strongly (it
//! has to walk them to release edges or confirm upstream computeds), while a
//! dep holds its consumers weakly, keyed by [`NodeId`]. Dropping a consumer
//! therefore never requires consulting the registry first: the dead weak
//! entry is pruned on the next traversal. A dep never keeps its owning
//! source alive either; the owner link used for confirmation is weak too.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::node::{NodeId, NotifyKind};
use crate::error::Result;
use crate::reactive::context::{self, ReactiveContext};

/// Callback registered with [`cleanup`](crate::cleanup) or a scope.
pub(crate) type Cleanup = Box<dyn FnOnce()>;

/// Anything that reads sources and reacts to their changes.
///
/// Implemented by computeds and effects.
pub(crate) trait Subscriber {
    /// The consumer's node id.
    fn id(&self) -> NodeId;

    /// An upstream source changed or may have changed.
    fn notify(self: Rc<Self>, kind: NotifyKind);

    /// An upstream computed that earlier sent [`NotifyKind::MaybeChanged`]
    /// resolved without changing.
    fn settle(self: Rc<Self>);

    /// Record an edge to `dep`. Returns `false` if the consumer no longer
    /// accepts edges (it has been disposed).
    fn add_source(&self, dep: Rc<Dep>) -> bool;

    /// Register a callback to run before the next run or on disposal.
    fn add_cleanup(&self, cleanup: Cleanup);
}

/// Implemented by sources that may be stale and need resolving before their
/// value can be trusted.
pub(crate) trait Confirm {
    /// Bring the source up to date, recomputing if an input really changed.
    fn confirm(&self);
}

/// The consumers of one logical key of one source.
pub(crate) struct Dep {
    owner_id: NodeId,
    subscribers: RefCell<IndexMap<NodeId, Weak<dyn Subscriber>>>,
    owner: Option<Weak<dyn Confirm>>,
}

impl Dep {
    /// A dep for a source that never needs confirmation (a signal).
    pub(crate) fn new(owner_id: NodeId) -> Rc<Self> {
        Rc::new(Self {
            owner_id,
            subscribers: RefCell::new(IndexMap::new()),
            owner: None,
        })
    }

    /// A dep owned by a computed, confirmed through `owner`.
    pub(crate) fn with_owner(owner_id: NodeId, owner: Weak<dyn Confirm>) -> Rc<Self> {
        Rc::new(Self {
            owner_id,
            subscribers: RefCell::new(IndexMap::new()),
            owner: Some(owner),
        })
    }

    /// Id of the source this dep belongs to.
    pub(crate) fn owner_id(&self) -> NodeId {
        self.owner_id
    }

    /// Record an edge from the currently running consumer to this dep.
    ///
    /// Does nothing outside a consumer or inside [`untrack`](crate::untrack).
    pub(crate) fn track(self: &Rc<Self>) {
        let Some(observer) = ReactiveContext::current_observer() else {
            return;
        };
        if observer.add_source(Rc::clone(self)) {
            tracing::trace!(source = ?self.owner_id, consumer = ?observer.id(), "track");
            self.subscribers
                .borrow_mut()
                .insert(observer.id(), Rc::downgrade(&observer));
        }
    }

    /// Drop the edge to `subscriber`, if any.
    pub(crate) fn unsubscribe(&self, subscriber: NodeId) {
        self.subscribers.borrow_mut().swap_remove(&subscriber);
    }

    /// Drop every edge. The consumers' own edge sets still hold this dep
    /// until they next run, but nothing will be delivered through it.
    pub(crate) fn clear(&self) {
        self.subscribers.borrow_mut().clear();
    }

    /// Number of live consumers.
    pub(crate) fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.borrow_mut();
        subscribers.retain(|_, weak| weak.strong_count() > 0);
        subscribers.len()
    }

    /// Snapshot of the live consumers, pruning dead entries on the way.
    fn live_subscribers(&self) -> SmallVec<[Rc<dyn Subscriber>; 8]> {
        let mut subscribers = self.subscribers.borrow_mut();
        subscribers.retain(|_, weak| weak.strong_count() > 0);
        subscribers.values().filter_map(Weak::upgrade).collect()
    }

    /// Deliver `kind` to every consumer. Does not run the scheduler.
    pub(crate) fn notify_subscribers(&self, kind: NotifyKind) {
        for subscriber in self.live_subscribers() {
            subscriber.notify(kind);
        }
    }

    /// Tell every consumer that an earlier `MaybeChanged` came to nothing.
    pub(crate) fn settle_subscribers(&self) {
        for subscriber in self.live_subscribers() {
            subscriber.settle();
        }
    }

    /// Ask the owning computed, if any, to bring itself up to date.
    pub(crate) fn confirm_owner(&self) {
        if let Some(owner) = self.owner.as_ref().and_then(Weak::upgrade) {
            owner.confirm();
        }
    }
}

/// Notify every consumer of `dep`, then run the scheduler unless it is
/// paused or already draining.
pub(crate) fn trigger(dep: &Dep, kind: NotifyKind) -> Result<()> {
    tracing::trace!(source = ?dep.owner_id, ?kind, "trigger");
    dep.notify_subscribers(kind);
    context::flush()
}

/// A consumer's upstream edges from its most recent run.
#[derive(Default)]
pub(crate) struct SourceSet {
    deps: RefCell<IndexMap<NodeId, Rc<Dep>>>,
}

impl SourceSet {
    /// Remember `dep`. Returns whether it was new.
    pub(crate) fn insert(&self, dep: Rc<Dep>) -> bool {
        self.deps.borrow_mut().insert(dep.owner_id(), dep).is_none()
    }

    /// Drop every edge in both directions.
    pub(crate) fn release(&self, subscriber: NodeId) {
        let deps = std::mem::take(&mut *self.deps.borrow_mut());
        for dep in deps.values() {
            dep.unsubscribe(subscriber);
        }
    }

    /// The current deps, in the order they were first read.
    pub(crate) fn snapshot(&self) -> SmallVec<[Rc<Dep>; 4]> {
        self.deps.borrow().values().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.deps.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Recorder {
        id: NodeId,
        changed: Cell<usize>,
        maybe: Cell<usize>,
        settled: Cell<usize>,
        sources: SourceSet,
    }

    impl Recorder {
        fn new() -> Rc<Self> {
            Rc::new(Self {
                id: NodeId::new(),
                changed: Cell::new(0),
                maybe: Cell::new(0),
                settled: Cell::new(0),
                sources: SourceSet::default(),
            })
        }
    }

    impl Subscriber for Recorder {
        fn id(&self) -> NodeId {
            self.id
        }

        fn notify(self: Rc<Self>, kind: NotifyKind) {
            match kind {
                NotifyKind::Changed => self.changed.set(self.changed.get() + 1),
                NotifyKind::MaybeChanged => self.maybe.set(self.maybe.get() + 1),
            }
        }

        fn settle(self: Rc<Self>) {
            self.settled.set(self.settled.get() + 1);
        }

        fn add_source(&self, dep: Rc<Dep>) -> bool {
            self.sources.insert(dep);
            true
        }

        fn add_cleanup(&self, _cleanup: Cleanup) {}
    }

    fn track_from(recorder: &Rc<Recorder>, dep: &Rc<Dep>) {
        let observer: Rc<dyn Subscriber> = recorder.clone();
        let _ctx = ReactiveContext::enter(observer);
        dep.track();
    }

    #[test]
    fn track_records_edge_both_ways() {
        let dep = Dep::new(NodeId::new());
        let recorder = Recorder::new();

        track_from(&recorder, &dep);

        assert_eq!(dep.subscriber_count(), 1);
        assert_eq!(recorder.sources.len(), 1);
    }

    #[test]
    fn track_outside_consumer_is_noop() {
        let dep = Dep::new(NodeId::new());
        dep.track();
        assert_eq!(dep.subscriber_count(), 0);
    }

    #[test]
    fn notify_reaches_every_subscriber() {
        let dep = Dep::new(NodeId::new());
        let a = Recorder::new();
        let b = Recorder::new();
        track_from(&a, &dep);
        track_from(&b, &dep);

        dep.notify_subscribers(NotifyKind::Changed);
        dep.notify_subscribers(NotifyKind::MaybeChanged);
        dep.settle_subscribers();

        for recorder in [&a, &b] {
            assert_eq!(recorder.changed.get(), 1);
            assert_eq!(recorder.maybe.get(), 1);
            assert_eq!(recorder.settled.get(), 1);
        }
    }

    #[test]
    fn release_removes_edges() {
        let dep = Dep::new(NodeId::new());
        let recorder = Recorder::new();
        track_from(&recorder, &dep);

        recorder.sources.release(recorder.id);

        assert_eq!(dep.subscriber_count(), 0);
        assert_eq!(recorder.sources.len(), 0);
    }

    #[test]
    fn dropped_subscriber_is_pruned() {
        let dep = Dep::new(NodeId::new());
        {
            let recorder = Recorder::new();
            track_from(&recorder, &dep);
            assert_eq!(dep.subscriber_count(), 1);
        }
        dep.notify_subscribers(NotifyKind::Changed);
        assert_eq!(dep.subscriber_count(), 0);
    }

    #[test]
    fn tracking_twice_keeps_one_edge() {
        let dep = Dep::new(NodeId::new());
        let recorder = Recorder::new();
        let observer: Rc<dyn Subscriber> = recorder.clone();
        let _ctx = ReactiveContext::enter(observer);
        dep.track();
        dep.track();
        assert_eq!(dep.subscriber_count(), 1);
        assert_eq!(recorder.sources.len(), 1);
    }
}

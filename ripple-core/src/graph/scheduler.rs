//! Update Scheduler
//!
//! The scheduler owns the propagation run-loop. Consumers that need to run
//! are queued here instead of running inside the write that triggered them,
//! which is what lets a single write reach every affected effect exactly
//! once.
//!
//! # Algorithm
//!
//! 1. A trigger notifies consumers; effects enqueue themselves. The queue is
//!    ordered and de-duplicated by node id.
//! 2. If the scheduler is neither paused nor already draining, it drains:
//!    take the whole queue as one round, run every job in FIFO order, and
//!    repeat while jobs keep enqueueing more work.
//! 3. Draining stops at a fixed point, or fails once `max_rounds` rounds
//!    have run. The cap is the safety valve for cycles that equality
//!    suppression does not stabilize.
//! 4. A panicking job is caught and remembered. The remaining jobs, and any
//!    work they enqueue, still run; the first panic resumes after draining.
//!
//! Pausing (used by [`batch`](crate::batch)) only defers step 2; writes are
//! still applied and consumers still marked immediately.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use indexmap::IndexMap;

use super::node::NodeId;
use crate::error::{ReactiveError, Result};

/// A unit of deferred work.
pub(crate) trait Job {
    /// Key used to de-duplicate the queue.
    fn id(&self) -> NodeId;

    /// Run the job. Effects check their own state and may decide there is
    /// nothing to do.
    fn run_job(self: Rc<Self>);

    /// The job was dropped from the queue without running.
    fn cancel(&self);
}

/// Ordered, de-duplicated queue plus the pause depth.
pub(crate) struct Scheduler {
    queue: RefCell<IndexMap<NodeId, Rc<dyn Job>>>,
    pause_depth: Cell<usize>,
    draining: Cell<bool>,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self {
            queue: RefCell::new(IndexMap::new()),
            pause_depth: Cell::new(0),
            draining: Cell::new(false),
        }
    }

    /// Queue `job` unless it is already waiting.
    pub(crate) fn enqueue(&self, job: Rc<dyn Job>) {
        self.queue.borrow_mut().entry(job.id()).or_insert(job);
    }

    /// Defer draining until the matching [`resume`](Self::resume).
    pub(crate) fn pause(&self) {
        self.pause_depth.set(self.pause_depth.get() + 1);
    }

    /// Undo one [`pause`](Self::pause). Returns `true` when this was the
    /// outermost pause and the caller should drain.
    pub(crate) fn resume(&self) -> bool {
        let depth = self.pause_depth.get().saturating_sub(1);
        self.pause_depth.set(depth);
        depth == 0
    }

    /// Whether a trigger should start draining right now.
    pub(crate) fn should_run(&self) -> bool {
        !self.draining.get() && self.pause_depth.get() == 0
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.pause_depth.get() > 0
    }

    pub(crate) fn pending_jobs(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Drain if allowed; otherwise leave the queue for whoever is already
    /// draining or for the end of the batch.
    pub(crate) fn flush(&self, max_rounds: usize) -> Result<()> {
        if self.should_run() {
            self.drain(max_rounds)
        } else {
            Ok(())
        }
    }

    /// Run rounds until the queue is empty or `max_rounds` is exceeded.
    ///
    /// A panicking job does not stop the others: work they enqueue keeps
    /// draining in later rounds, and the first panic is re-raised once the
    /// queue is empty (or the round cap is hit).
    pub(crate) fn drain(&self, max_rounds: usize) -> Result<()> {
        let mut first_panic: Option<Box<dyn Any + Send>> = None;
        let outcome = {
            let _draining = DrainGuard::enter(&self.draining);
            self.run_rounds(max_rounds, &mut first_panic)
        };

        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }
        outcome
    }

    fn run_rounds(
        &self,
        max_rounds: usize,
        first_panic: &mut Option<Box<dyn Any + Send>>,
    ) -> Result<()> {
        let mut rounds = 0;

        loop {
            let round = std::mem::take(&mut *self.queue.borrow_mut());
            if round.is_empty() {
                return Ok(());
            }

            if rounds >= max_rounds {
                let dropped = self.cancel_all(round);
                tracing::error!(rounds, dropped, "propagation did not settle");
                return Err(ReactiveError::PropagationDiverged { rounds });
            }
            rounds += 1;
            tracing::debug!(round = rounds, jobs = round.len(), "drain round");

            for job in round.into_values() {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| job.run_job()));
                if let Err(payload) = outcome {
                    tracing::debug!(round = rounds, "job panicked; draining continues");
                    first_panic.get_or_insert(payload);
                }
            }
        }
    }

    fn cancel_all(&self, round: IndexMap<NodeId, Rc<dyn Job>>) -> usize {
        let rest = std::mem::take(&mut *self.queue.borrow_mut());
        let mut dropped = 0;
        for job in round.into_values().chain(rest.into_values()) {
            job.cancel();
            dropped += 1;
        }
        dropped
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks the scheduler as draining for the guard's lifetime, unwinding
/// included.
struct DrainGuard<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> DrainGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self { flag }
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

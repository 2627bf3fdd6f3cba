//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (computed/effect), the
//!    signal registers that context as a subscriber.
//!
//! 2. When a signal is written, the new value is compared with the old one
//!    using the signal's [`Equality`]. An unchanged write does nothing.
//!
//! 3. A changed write notifies every subscriber and runs the scheduler.
//!
//! A signal never needs confirmation: a write that got past the equality
//! check is a definite change.
//!
//! # Memory Layout
//!
//! Each signal consists of:
//! - A unique ID (8 bytes)
//! - The value
//! - A dependency registry listing its subscribers (weakly)

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use super::equality::Equality;
use crate::error::Result;
use crate::graph::dep::{self, Dep};
use crate::graph::{NodeId, NotifyKind};

/// Construction options for a [`Signal`].
pub struct SignalOptions<T> {
    equality: Equality<T>,
    name: Option<String>,
}

impl<T> SignalOptions<T> {
    /// Options with the given equality policy and no name.
    pub fn with_equality(equality: Equality<T>) -> Self {
        Self {
            equality,
            name: None,
        }
    }

    /// Replace the equality policy.
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
}

impl<T: PartialEq + 'static> Default for SignalOptions<T> {
    fn default() -> Self {
        Self::with_equality(Equality::structural())
    }
}

struct SignalInner<T> {
    id: NodeId,
    name: Option<String>,
    value: RefCell<T>,
    equality: Equality<T>,
    dep: Rc<Dep>,
}

/// A reactive signal holding a value of type T.
///
/// Cloning a signal produces another handle to the same cell.
///
/// # Example
///
/// ```rust
/// use ripple_core::Signal;
///
/// let count = Signal::new(0);
///
/// // Read the value
/// assert_eq!(count.get(), 0);
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

impl<T: PartialEq + 'static> Signal<T> {
    /// Create a new signal with the given initial value, compared by
    /// [`PartialEq`].
    pub fn new(value: T) -> Self {
        Self::with_options(value, SignalOptions::default())
    }
}

impl<T: 'static> Signal<T> {
    /// Create a new signal with explicit options.
    pub fn with_options(value: T, options: SignalOptions<T>) -> Self {
        let id = NodeId::new();
        Self {
            inner: Rc::new(SignalInner {
                id,
                name: options.name,
                value: RefCell::new(value),
                equality: options.equality,
                dep: Dep::new(id),
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// The debug name, if one was given.
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also registers the
    /// current computation as a subscriber.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.inner.dep.track();
        self.inner.value.borrow().clone()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.inner.value.borrow().clone()
    }

    /// Set a new value and notify subscribers if it differs from the old one.
    ///
    /// # Panics
    ///
    /// Panics if the resulting propagation does not settle within the
    /// configured round cap. Use [`try_set`](Self::try_set) to get the error
    /// instead.
    pub fn set(&self, value: T) {
        if let Err(err) = self.try_set(value) {
            panic!("{err}");
        }
    }

    /// Set a new value, reporting propagation divergence as an error.
    ///
    /// The new value is stored before subscribers run, so it stays in place
    /// even if an error is returned.
    pub fn try_set(&self, value: T) -> Result<()> {
        let unchanged = self.inner.equality.eq(&self.inner.value.borrow(), &value);
        if unchanged {
            return Ok(());
        }

        *self.inner.value.borrow_mut() = value;
        tracing::trace!(signal = ?self.inner.id, name = self.name(), "signal changed");
        dep::trigger(&self.inner.dep, NotifyKind::Changed)
    }

    /// Update the value using a function of the current value.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`set`](Self::set).
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        if let Err(err) = self.try_update(f) {
            panic!("{err}");
        }
    }

    /// Update the value using a function, reporting divergence as an error.
    pub fn try_update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = f(&self.inner.value.borrow());
        self.try_set(new_value)
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.dep.subscriber_count()
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("value", &*self.inner.value.borrow())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

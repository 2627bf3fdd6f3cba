//! Equality policies.
//!
//! A write (or a recomputation) only propagates if the policy says the new
//! value differs from the old one. That single check is what keeps mutually
//! dependent effects from looping forever.

use std::fmt;
use std::rc::Rc;

type Compare<T> = Rc<dyn Fn(&T, &T) -> bool>;

/// Decides whether two values of a signal or computed are the same.
pub struct Equality<T> {
    /// `None` means values never compare equal.
    compare: Option<Compare<T>>,
    label: &'static str,
}

impl<T: PartialEq + 'static> Equality<T> {
    /// Compare with [`PartialEq`]. This is the default.
    pub fn structural() -> Self {
        Self {
            compare: Some(Rc::new(|a: &T, b: &T| a == b)),
            label: "structural",
        }
    }
}

impl<T> Equality<T> {
    /// Treat every write as a change, so every write notifies.
    pub fn never() -> Self {
        Self {
            compare: None,
            label: "never",
        }
    }

    /// Compare with a custom predicate returning `true` for "same value".
    pub fn by<F>(compare: F) -> Self
    where
        F: Fn(&T, &T) -> bool + 'static,
    {
        Self {
            compare: Some(Rc::new(compare)),
            label: "custom",
        }
    }

    pub(crate) fn eq(&self, old: &T, new: &T) -> bool {
        match &self.compare {
            Some(compare) => compare(old, new),
            None => false,
        }
    }
}

impl<U: ?Sized + 'static> Equality<Rc<U>> {
    /// Compare by pointer identity instead of contents.
    pub fn identity() -> Self {
        Self {
            compare: Some(Rc::new(|a: &Rc<U>, b: &Rc<U>| Rc::ptr_eq(a, b))),
            label: "identity",
        }
    }
}

impl<T: PartialEq + 'static> Default for Equality<T> {
    fn default() -> Self {
        Self::structural()
    }
}

impl<T> Clone for Equality<T> {
    fn clone(&self) -> Self {
        Self {
            compare: self.compare.clone(),
            label: self.label,
        }
    }
}

impl<T> fmt::Debug for Equality<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Equality").field(&self.label).finish()
    }
}

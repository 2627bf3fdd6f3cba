//! Declarative Watchers
//!
//! [`watch`] turns a list of sources into an effect that calls back with the
//! current and previous value of each source whenever one of them changes.
//! The callback itself runs untracked, so reading other signals inside it
//! does not add dependencies.

use std::cell::RefCell;

use super::computed::Computed;
use super::effect::{Effect, EffectOptions};
use super::runtime::untrack;
use super::signal::Signal;

/// Something a watcher can read.
///
/// Implemented for [`Signal`], [`Computed`] and any `Fn() -> T` getter.
pub trait WatchSource<T> {
    /// Read the value, tracking it.
    fn watch_value(&self) -> T;

    /// Read into nested reactive content so that changes below the top-level
    /// value also re-run the watcher. Called only for deep watchers; the
    /// default has nothing nested to track.
    fn track_nested(&self) {}
}

impl<T: Clone + 'static> WatchSource<T> for Signal<T> {
    fn watch_value(&self) -> T {
        self.get()
    }
}

impl<T: Clone + 'static> WatchSource<T> for Computed<T> {
    fn watch_value(&self) -> T {
        self.get()
    }
}

impl<T, F> WatchSource<T> for F
where
    F: Fn() -> T,
{
    fn watch_value(&self) -> T {
        self()
    }
}

/// One source's value as seen by a watch callback.
#[derive(Debug, Clone, PartialEq)]
pub struct Watched<T> {
    pub current: T,
    /// `None` on the initial call.
    pub previous: Option<T>,
}

/// Options for [`watch`].
#[derive(Debug, Clone)]
pub struct WatchOptions {
    fire_on_init: bool,
    deep: bool,
    name: Option<String>,
}

impl WatchOptions {
    pub fn new() -> Self {
        Self {
            fire_on_init: true,
            deep: false,
            name: None,
        }
    }

    /// Call back once on creation with no previous values. Defaults to
    /// `true`. When `false` the first run only records the values.
    #[must_use]
    pub fn fire_on_init(mut self, fire_on_init: bool) -> Self {
        self.fire_on_init = fire_on_init;
        self
    }

    /// Track nested content via [`WatchSource::track_nested`] and call back on
    /// every re-run, even when the top-level values compare equal.
    #[must_use]
    pub fn deep(mut self, deep: bool) -> Self {
        self.deep = deep;
        self
    }

    /// Set a debug name for the underlying effect.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Watch `sources` and call `callback` with `{current, previous}` pairs, in
/// source order, whenever any of them changes.
///
/// Returns the underlying effect; stop it to stop watching.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use ripple_core::{watch, Signal, WatchOptions};
///
/// let count = Signal::new(1);
/// let log = Rc::new(RefCell::new(Vec::new()));
///
/// let _watcher = watch(
///     vec![count.clone()],
///     {
///         let log = log.clone();
///         move |values| log.borrow_mut().push((values[0].current, values[0].previous))
///     },
///     WatchOptions::default(),
/// );
///
/// count.set(2);
/// assert_eq!(*log.borrow(), vec![(1, None), (2, Some(1))]);
/// ```
pub fn watch<T, S, F>(sources: Vec<S>, callback: F, options: WatchOptions) -> Effect
where
    T: Clone + PartialEq + 'static,
    S: WatchSource<T> + 'static,
    F: FnMut(&[Watched<T>]) + 'static,
{
    let callback = RefCell::new(callback);
    let last: RefCell<Option<Vec<T>>> = RefCell::new(None);
    let WatchOptions {
        fire_on_init,
        deep,
        name,
    } = options;

    let body = move || {
        let current: Vec<T> = sources
            .iter()
            .map(|source| {
                let value = source.watch_value();
                if deep {
                    source.track_nested();
                }
                value
            })
            .collect();

        let previous = last.borrow_mut().replace(current.clone());
        let fire = match &previous {
            None => fire_on_init,
            Some(previous) => deep || *previous != current,
        };
        if !fire {
            return;
        }

        let mut previous = previous.map(Vec::into_iter);
        let values: Vec<Watched<T>> = current
            .into_iter()
            .map(|current| Watched {
                current,
                previous: previous.as_mut().and_then(Iterator::next),
            })
            .collect();

        untrack(|| {
            let mut callback = callback.borrow_mut();
            (*callback)(&values);
        });
    };

    let mut effect_options = EffectOptions::default();
    if let Some(name) = name {
        effect_options = effect_options.name(name);
    }
    Effect::with_options(body, effect_options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    type Log<T> = Rc<RefCell<Vec<Vec<Watched<T>>>>>;

    fn recorder<T: Clone + 'static>(log: &Log<T>) -> impl FnMut(&[Watched<T>]) + 'static {
        let log = log.clone();
        move |values: &[Watched<T>]| log.borrow_mut().push(values.to_vec())
    }

    #[test]
    fn fires_on_init_and_on_change() {
        let a = Signal::new(1);
        let b = Signal::new(10);
        let log: Log<i32> = Rc::default();
        let _watcher = watch(vec![a.clone(), b.clone()], recorder(&log), WatchOptions::default());

        b.set(20);

        let log = log.borrow();
        assert_eq!(log.len(), 2);
        assert_eq!(
            log[0],
            vec![
                Watched { current: 1, previous: None },
                Watched { current: 10, previous: None },
            ]
        );
        assert_eq!(
            log[1],
            vec![
                Watched { current: 1, previous: Some(1) },
                Watched { current: 20, previous: Some(10) },
            ]
        );
    }

    #[test]
    fn without_fire_on_init_first_run_only_records() {
        let a = Signal::new(1);
        let log: Log<i32> = Rc::default();
        let _watcher = watch(
            vec![a.clone()],
            recorder(&log),
            WatchOptions::default().fire_on_init(false),
        );

        assert!(log.borrow().is_empty());
        a.set(2);
        assert_eq!(log.borrow()[0], vec![Watched { current: 2, previous: Some(1) }]);
    }

    #[test]
    fn unchanged_getter_value_does_not_fire() {
        let a = Signal::new(1);
        let log: Log<i32> = Rc::default();
        let _watcher = watch(
            vec![{
                let a = a.clone();
                move || a.get() / 10
            }],
            recorder(&log),
            WatchOptions::default(),
        );

        a.set(2);
        assert_eq!(log.borrow().len(), 1);
        a.set(12);
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn deep_fires_even_when_equal() {
        let a = Signal::new(1);
        let log: Log<i32> = Rc::default();
        let _watcher = watch(
            vec![{
                let a = a.clone();
                move || a.get() / 10
            }],
            recorder(&log),
            WatchOptions::default().deep(true),
        );

        a.set(2);
        assert_eq!(log.borrow().len(), 2);
    }

    struct Nested {
        head: Signal<i32>,
        tail: Signal<i32>,
    }

    impl WatchSource<i32> for Nested {
        fn watch_value(&self) -> i32 {
            self.head.get()
        }

        fn track_nested(&self) {
            self.tail.get();
        }
    }

    #[test]
    fn deep_tracks_nested_content() {
        let head = Signal::new(0);
        let tail = Signal::new(0);
        let calls = Rc::new(Cell::new(0));
        let _watcher = watch(
            vec![Nested {
                head: head.clone(),
                tail: tail.clone(),
            }],
            {
                let calls = calls.clone();
                move |_: &[Watched<i32>]| calls.set(calls.get() + 1)
            },
            WatchOptions::default().deep(true),
        );

        tail.set(1);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn callback_reads_are_untracked() {
        let a = Signal::new(1);
        let other = Signal::new(0);
        let calls = Rc::new(Cell::new(0));
        let _watcher = watch(
            vec![a.clone()],
            {
                let other = other.clone();
                let calls = calls.clone();
                move |_: &[Watched<i32>]| {
                    other.get();
                    calls.set(calls.get() + 1);
                }
            },
            WatchOptions::default(),
        );

        other.set(5);
        assert_eq!(calls.get(), 1);
        assert_eq!(other.subscriber_count(), 0);
    }

    #[test]
    fn stopping_the_watcher_stops_callbacks() {
        let a = Signal::new(1);
        let log: Log<i32> = Rc::default();
        let watcher = watch(vec![a.clone()], recorder(&log), WatchOptions::default());

        watcher.stop();
        a.set(2);
        assert_eq!(log.borrow().len(), 1);
    }
}

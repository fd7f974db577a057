//! `Dynamic<V, Δ>`: a snapshot + delta stream with fork and disconnect
//! (spec.md §4.5).
//!
//! Single-threaded cooperative concurrency (spec.md §5): shared state is
//! `Rc<RefCell<_>>`, not `Arc<Mutex<_>>`. Subscribers are plain closures
//! registered on the shared inner cell; there is no executor or async
//! runtime in the core, matching "suspension points: none" (spec.md §5).

use crate::error::DynamicDisconnected;
use std::cell::RefCell;
use std::rc::Rc;

type Listener<D> = Box<dyn FnMut(&D)>;

struct Inner<V, D> {
    value: V,
    listeners: Vec<(u64, Listener<D>)>,
    next_listener_id: u64,
    connected: bool,
}

/// A snapshot of `V` plus a live stream of `Δ` (spec.md §3, §4.5).
///
/// Every [`Dynamic::fork`] is an independent handle sharing the same
/// upstream delta source and the same underlying snapshot — disconnecting
/// one fork does not affect the others (spec.md §8, invariant 7).
pub struct Dynamic<V, D> {
    inner: Rc<RefCell<Inner<V, D>>>,
}

impl<V: Clone, D> Dynamic<V, D> {
    /// Construct a `Dynamic` holding `initial`, with no upstream yet wired.
    /// Use [`Dynamic::apply`] to fold in deltas as they arrive.
    #[must_use]
    pub fn new(initial: V) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                value: initial,
                listeners: Vec::new(),
                next_listener_id: 0,
                connected: true,
            })),
        }
    }

    /// Fold one upstream delta into the snapshot and notify subscribers.
    /// A no-op once disconnected.
    pub fn apply(&self, delta: D, new_value: V) {
        let mut inner = self.inner.borrow_mut();
        if !inner.connected {
            return;
        }
        inner.value = new_value;
        for (_, listener) in &mut inner.listeners {
            listener(&delta);
        }
    }

    /// The current snapshot. Errors once disconnected (spec.md §3).
    pub fn read(&self) -> Result<V, DynamicDisconnected> {
        let inner = self.inner.borrow();
        if inner.connected {
            Ok(inner.value.clone())
        } else {
            Err(DynamicDisconnected)
        }
    }

    /// Subscribe to the delta stream. Returns a [`Subscription`] handle;
    /// dropping it (or calling [`Subscription::unsubscribe`]) removes the
    /// listener. Listeners registered after disconnect are never called.
    pub fn updated<F>(&self, listener: F) -> Subscription<V, D>
    where
        F: FnMut(&D) + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_listener_id;
        inner.next_listener_id += 1;
        inner.listeners.push((id, Box::new(listener)));
        Subscription {
            inner: Rc::clone(&self.inner),
            id,
        }
    }

    /// Build a new `Dynamic` sharing this one's upstream and current
    /// snapshot. Errors if this `Dynamic` is already disconnected.
    pub fn fork(&self) -> Result<Self, DynamicDisconnected> {
        let value = self.read()?;
        Ok(Self {
            inner: Rc::new(RefCell::new(Inner {
                value,
                listeners: Vec::new(),
                next_listener_id: 0,
                connected: true,
            })),
        })
    }

    /// Cancel this handle's upstream subscription and complete `updated`.
    /// Other forks are unaffected (they hold independent `Inner` cells).
    pub fn disconnect(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.connected = false;
        inner.listeners.clear();
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.borrow().connected
    }

    /// An aliased handle sharing this `Dynamic`'s `Inner` cell, used
    /// internally to let an upstream wiring closure call back into the
    /// very `Dynamic` it feeds (e.g. the reactive `Table`'s per-key
    /// cache entries). Unlike [`Dynamic::fork`], this is *not* an
    /// independent instance: disconnecting one handle disconnects both.
    pub(crate) fn clone_handle(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// A live subscription to a [`Dynamic`]'s delta stream.
pub struct Subscription<V, D> {
    inner: Rc<RefCell<Inner<V, D>>>,
    id: u64,
}

impl<V, D> Subscription<V, D> {
    pub fn unsubscribe(self) {
        self.inner.borrow_mut().listeners.retain(|(id, _)| *id != self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_returns_latest_folded_value() {
        let dyn_val: Dynamic<i32, ()> = Dynamic::new(0);
        dyn_val.apply((), 1);
        dyn_val.apply((), 2);
        assert_eq!(dyn_val.read().unwrap(), 2);
    }

    #[test]
    fn disconnect_raises_on_read_and_fork() {
        let dyn_val: Dynamic<i32, ()> = Dynamic::new(0);
        dyn_val.disconnect();
        assert_eq!(dyn_val.read().unwrap_err(), DynamicDisconnected);
        assert_eq!(dyn_val.fork().unwrap_err(), DynamicDisconnected);
    }

    #[test]
    fn updated_stream_receives_deltas_in_order() {
        let dyn_val: Dynamic<i32, i32> = Dynamic::new(0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let _sub = dyn_val.updated(move |delta| seen_clone.borrow_mut().push(*delta));
        dyn_val.apply(1, 1);
        dyn_val.apply(2, 3);
        assert_eq!(*seen.borrow(), vec![1, 2]);
    }

    #[test]
    fn disconnect_completes_updated_stream() {
        let dyn_val: Dynamic<i32, i32> = Dynamic::new(0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let _sub = dyn_val.updated(move |delta| seen_clone.borrow_mut().push(*delta));
        dyn_val.disconnect();
        dyn_val.apply(1, 1);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn fork_independence_disconnecting_one_leaves_other_live() {
        let original: Dynamic<i32, ()> = Dynamic::new(5);
        let forked = original.fork().unwrap();
        forked.disconnect();
        assert!(original.is_connected());
        assert_eq!(original.read().unwrap(), 5);
        assert!(!forked.is_connected());
    }
}

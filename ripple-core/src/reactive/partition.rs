//! `partition_by_key`: stream-of-events → (per-key substream, key-change
//! stream) with refcounted inner observables (spec.md §4.5).
//!
//! The core has no suspension points (spec.md §5), so "stream" here means
//! a synchronous push: [`Partition::publish`] fans one upstream item out
//! to its key's substream listeners before returning, exactly as the
//! Table event bus delivers (spec.md §5, ordering guarantee 1).

use std::cell::RefCell;
use std::cmp::Ord;
use std::collections::BTreeMap;
use std::rc::Rc;

/// A bulk key-change notification (spec.md §4.5).
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum KeyChange<K> {
    Add(Vec<K>),
    Remove(Vec<K>),
}

struct Group<V> {
    last: Option<V>,
    listeners: Vec<(u64, Box<dyn FnMut(&V)>)>,
    next_listener_id: u64,
    refcount: usize,
}

impl<V> Group<V> {
    fn new() -> Self {
        Self {
            last: None,
            listeners: Vec::new(),
            next_listener_id: 0,
            refcount: 0,
        }
    }
}

struct Inner<K, V> {
    groups: BTreeMap<K, Group<V>>,
    key_change_listeners: Vec<(u64, Box<dyn FnMut(&KeyChange<K>)>)>,
    next_key_change_id: u64,
}

/// Partitions an upstream event stream by key, with replay-1 substreams
/// and a bulk-replaying key-change stream (spec.md §4.5).
pub struct Partition<K, V> {
    inner: Rc<RefCell<Inner<K, V>>>,
}

impl<K, V> Default for Partition<K, V>
where
    K: Clone + Ord,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Partition<K, V>
where
    K: Clone + Ord,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                groups: BTreeMap::new(),
                key_change_listeners: Vec::new(),
                next_key_change_id: 0,
            })),
        }
    }

    /// Publish one upstream `value` under `key`. Creates the group (and
    /// emits a singleton `Add`) if this is the key's first appearance,
    /// stores the value for replay, and notifies the key's substream
    /// listeners in subscription order.
    pub fn publish(&self, key: K, value: V)
    where
        V: Clone,
    {
        let mut inner = self.inner.borrow_mut();
        let is_new = !inner.groups.contains_key(&key);
        if is_new {
            inner.groups.insert(key.clone(), Group::new());
        }
        {
            let group = inner.groups.get_mut(&key).expect("just inserted or present");
            group.last = Some(value.clone());
            for (_, listener) in &mut group.listeners {
                listener(&value);
            }
        }
        if is_new {
            Self::notify_key_change(&mut inner, KeyChange::Add(vec![key]));
        }
    }

    /// Mark `key`'s inner projection stream complete (spec.md §4.5: "when
    /// that inner completes, a `remove` is emitted synchronously"). A
    /// no-op if the key was never published.
    pub fn complete(&self, key: &K) {
        let mut inner = self.inner.borrow_mut();
        if inner.groups.remove(key).is_some() {
            Self::notify_key_change(&mut inner, KeyChange::Remove(vec![key.clone()]));
        }
    }

    fn notify_key_change(inner: &mut Inner<K, V>, change: KeyChange<K>) {
        for (_, listener) in &mut inner.key_change_listeners {
            listener(&change);
        }
    }

    /// Subscribe to the key-change stream. Replays all currently alive
    /// keys as one bulk `Add` before returning (spec.md §4.5).
    pub fn subscribe_key_changes<F>(&self, mut listener: F) -> KeyChangeSubscription<K, V>
    where
        F: FnMut(&KeyChange<K>) + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        let alive: Vec<K> = inner.groups.keys().cloned().collect();
        if !alive.is_empty() {
            listener(&KeyChange::Add(alive));
        }
        let id = inner.next_key_change_id;
        inner.next_key_change_id += 1;
        inner.key_change_listeners.push((id, Box::new(listener)));
        KeyChangeSubscription {
            inner: Rc::clone(&self.inner),
            id,
        }
    }

    /// The set of currently alive keys.
    #[must_use]
    pub fn alive_keys(&self) -> Vec<K> {
        self.inner.borrow().groups.keys().cloned().collect()
    }

    /// Whether `key` currently has an alive group.
    #[must_use]
    pub fn is_alive(&self, key: &K) -> bool {
        self.inner.borrow().groups.contains_key(key)
    }

    /// Subscribe to `key`'s substream. Replays the last published value
    /// immediately if one exists (spec.md §4.5: "replays the last value
    /// to late subscribers"). Creates the group if it does not exist yet,
    /// without emitting `Add` — a group only becomes "alive" to the
    /// key-change stream once [`Partition::publish`] has landed a value
    /// for it.
    pub fn substream<F>(&self, key: K, mut listener: F) -> Substream<K, V>
    where
        F: FnMut(&V) + 'static,
        V: Clone,
    {
        let mut inner = self.inner.borrow_mut();
        let group = inner.groups.entry(key.clone()).or_insert_with(Group::new);
        if let Some(last) = &group.last {
            listener(last);
        }
        let id = group.next_listener_id;
        group.next_listener_id += 1;
        group.refcount += 1;
        group.listeners.push((id, Box::new(listener)));
        Substream {
            inner: Rc::clone(&self.inner),
            key,
            id,
        }
    }

    /// Current refcount for `key`'s substream (number of live
    /// [`Substream`] handles). Zero if the key has no group.
    #[must_use]
    pub fn refcount(&self, key: &K) -> usize {
        self.inner.borrow().groups.get(key).map_or(0, |g| g.refcount)
    }
}

/// A live key-change subscription. Drop or [`KeyChangeSubscription::unsubscribe`]
/// to stop receiving further `Add`/`Remove` notifications.
pub struct KeyChangeSubscription<K, V> {
    inner: Rc<RefCell<Inner<K, V>>>,
    id: u64,
}

impl<K, V> KeyChangeSubscription<K, V> {
    pub fn unsubscribe(self) {
        self.inner.borrow_mut().key_change_listeners.retain(|(id, _)| *id != self.id);
    }
}

/// A live substream subscription for one key. Dropping it (or calling
/// [`Substream::unsubscribe`]) decrements the key's refcount; it does not
/// by itself tear down the group (spec.md: last unsubscribe tears down
/// the shared upstream subscription — callers layering eviction on top,
/// e.g. the reactive `Table`, observe `refcount` reaching zero and act).
pub struct Substream<K, V> {
    inner: Rc<RefCell<Inner<K, V>>>,
    key: K,
    id: u64,
}

impl<K, V> Substream<K, V>
where
    K: Ord,
{
    pub fn unsubscribe(self) {
        self.teardown();
    }

    fn teardown(&self) {
        let mut inner = self.inner.borrow_mut();
        if let Some(group) = inner.groups.get_mut(&self.key) {
            group.listeners.retain(|(id, _)| *id != self.id);
            group.refcount = group.refcount.saturating_sub(1);
        }
    }
}

impl<K, V> Drop for Substream<K, V>
where
    K: Ord,
{
    fn drop(&mut self) {
        self.teardown();
    }
}

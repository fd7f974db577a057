//! Reactive `Table` (spec.md §4.4): read/write of a single table plus
//! delta-aware live handles, layered on [`crate::storage::StorageAdapter`]
//! and the [`crate::reactive`] primitives.
//!
//! Mutations publish to two fan-out points, in the order spec.md §5's
//! ordering guarantees require (the adapter mutates storage first, then
//! the event is published, and every direct subscriber observes it before
//! the mutating call returns):
//! - [`reactive::Partition`], keyed by the primary-key tuple, feeding
//!   per-key cached [`Dynamic`]s for [`Table::find_unique`].
//! - a flat listener list feeding derived page [`Dynamic`]s for
//!   [`Table::find_many`].

use crate::error::Error;
use crate::expr::BindCtx;
use crate::interpreter;
use crate::page::{Page, PageInit};
use crate::reactive::{Dynamic, Partition, Substream, Subscription};
use crate::storage::{Backend, StorageAdapter};
use crate::value::{PrimaryKeyRecord, Row, Value};
use ripple_schema::TableSchema;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

///
/// TableConfig
///

/// Tunables for the reactive layer (spec.md §3: "10-second grace window").
#[derive(Clone, Copy, Debug)]
pub struct TableConfig {
    pub eviction_grace: Duration,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            eviction_grace: Duration::from_secs(10),
        }
    }
}

///
/// TableEvent
///
/// Published once per mutation (spec.md §4.4, §5 ordering guarantee 1).
///

#[derive(Clone, Debug)]
pub enum TableEvent {
    Insert { row: Row },
    Update { key: PrimaryKeyRecord, partial: Row },
    Delete { key: PrimaryKeyRecord },
}

impl TableEvent {
    /// The PK tuple this event is keyed by, in schema primary-key order
    /// (spec.md §4.4: "materialize the list of PK values ... this tuple
    /// is the partition key").
    fn key_tuple(&self, schema: &TableSchema) -> Vec<Value> {
        let key_record = match self {
            Self::Insert { row } => row,
            Self::Update { key, .. } | Self::Delete { key } => key,
        };
        schema
            .primary_key()
            .iter()
            .map(|pk| key_record.get(pk).cloned().unwrap_or(Value::Null))
            .collect()
    }
}

///
/// PageDelta
///
/// A single row entering or leaving a live page's matched set (spec.md
/// §4.4). Cursor/count recomputation is left to the consumer.
///

#[derive(Clone, Debug)]
pub enum PageDelta {
    Add { row: Row },
    Remove { key: PrimaryKeyRecord },
}

struct RowCacheEntry {
    dynamic: Dynamic<Option<Row>, ()>,
    refcount: usize,
    zero_since: Option<Instant>,
    _substream: Substream<Vec<Value>, TableEvent>,
}

type PageListenerFn = dyn FnMut(&TableEvent, Option<&Row>);

struct PageListener {
    listeners: RefCell<BTreeMap<u64, Box<PageListenerFn>>>,
    next_id: Cell<u64>,
}

impl PageListener {
    fn new() -> Self {
        Self {
            listeners: RefCell::new(BTreeMap::new()),
            next_id: Cell::new(0),
        }
    }

    fn register<F>(&self, listener: F) -> u64
    where
        F: FnMut(&TableEvent, Option<&Row>) + 'static,
    {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.listeners.borrow_mut().insert(id, Box::new(listener));
        id
    }

    fn unregister(&self, id: u64) {
        self.listeners.borrow_mut().remove(&id);
    }

    /// `previous_row` is the row's last known state before this event was
    /// applied to storage, when available (spec.md §4.4: "fetched from
    /// the Dynamic cache or storage"). Only populated for deletes, whose
    /// row is already gone from storage by the time the event publishes.
    fn notify(&self, event: &TableEvent, previous_row: Option<&Row>) {
        for listener in self.listeners.borrow_mut().values_mut() {
            listener(event, previous_row);
        }
    }
}

///
/// Table
///
/// Always held behind an `Rc` ([`Table::new`] returns one): handles
/// returned by [`Table::find_unique`] and [`Table::find_many`] hold a
/// `Weak` back-reference so their `Drop` can release cache refcounts and
/// page-listener registrations without the table outliving its handles.
///

pub struct Table<B: Backend> {
    schema: TableSchema,
    storage: StorageAdapter<B>,
    partition: Partition<Vec<Value>, TableEvent>,
    page_listener: PageListener,
    row_cache: RefCell<BTreeMap<Vec<Value>, RowCacheEntry>>,
    config: TableConfig,
}

impl<B: Backend> Table<B> {
    pub fn new(schema: TableSchema, backend: B, config: TableConfig) -> Result<Rc<Self>, Error> {
        let storage = StorageAdapter::new(schema.clone(), backend)?;
        Ok(Rc::new(Self {
            schema,
            storage,
            partition: Partition::new(),
            page_listener: PageListener::new(),
            row_cache: RefCell::new(BTreeMap::new()),
            config,
        }))
    }

    #[must_use]
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    #[tracing::instrument(skip(self, event), fields(table = self.schema.name()))]
    fn publish(&self, event: TableEvent) {
        let key_tuple = event.key_tuple(&self.schema);

        // Deletes remove the row from storage before this fires, so the
        // page listener's "was this row a match" check needs the last
        // known snapshot from the per-key cache, captured now.
        let previous_row = match &event {
            TableEvent::Delete { .. } => self
                .row_cache
                .borrow()
                .get(&key_tuple)
                .and_then(|entry| entry.dynamic.read().ok().flatten()),
            TableEvent::Insert { .. } | TableEvent::Update { .. } => None,
        };

        self.partition.publish(key_tuple, event.clone());
        self.page_listener.notify(&event, previous_row.as_ref());
        tracing::trace!("event dispatched to partition and page listeners");
    }

    #[tracing::instrument(skip(self, row), fields(table = self.schema.name()))]
    pub fn insert(&self, row: &Row) -> Result<(), Error> {
        self.storage.insert(row)?;
        self.publish(TableEvent::Insert { row: row.clone() });
        tracing::trace!("row inserted");
        Ok(())
    }

    #[tracing::instrument(skip(self, row), fields(table = self.schema.name()))]
    pub fn upsert(&self, row: &Row) -> Result<(), Error> {
        self.storage.upsert(row)?;
        self.publish(TableEvent::Insert { row: row.clone() });
        tracing::trace!("row upserted");
        Ok(())
    }

    #[tracing::instrument(skip(self, key, partial), fields(table = self.schema.name()))]
    pub fn update(&self, key: &PrimaryKeyRecord, partial: &Row) -> Result<(), Error> {
        self.storage.update(key, partial)?;
        if partial.is_empty() {
            tracing::trace!("empty update, no-op");
        } else {
            self.publish(TableEvent::Update {
                key: key.clone(),
                partial: partial.clone(),
            });
            tracing::trace!(columns = partial.len(), "row updated");
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, key), fields(table = self.schema.name()))]
    pub fn delete(&self, key: &PrimaryKeyRecord) -> Result<(), Error> {
        self.storage.delete(key)?;
        self.publish(TableEvent::Delete { key: key.clone() });
        tracing::trace!("row deleted");
        Ok(())
    }

    /// Run `mutations` inside one backend transaction: either all become
    /// visible (and all events publish) or none do (spec.md §5:
    /// "`mutateMany` must execute its member mutations inside a single
    /// backend transaction").
    #[tracing::instrument(skip(self, mutations), fields(table = self.schema.name()))]
    pub fn mutate_many<F>(&self, mutations: F) -> Result<(), Error>
    where
        F: FnOnce(&Self) -> Result<(), Error>,
    {
        let mutations = RefCell::new(Some(mutations));
        let result: RefCell<Result<(), Error>> = RefCell::new(Ok(()));
        let transaction_outcome = self.storage.backend().transaction(&mut || {
            let f = mutations.borrow_mut().take().expect("transaction closure invoked once");
            let outcome = f(self);
            let storage_result = match &outcome {
                Ok(()) => Ok(()),
                Err(e) => Err(crate::error::StorageError::new(e.to_string())),
            };
            *result.borrow_mut() = outcome;
            storage_result
        });
        match transaction_outcome {
            // The closure's own typed `Error` (if any) is the one callers
            // should see, not the stringified `StorageError` it was
            // downgraded to for `Backend::transaction`'s own signature.
            Ok(()) => result.into_inner(),
            Err(e) => result.into_inner().and(Err(e.into())),
        }
    }

    /// `findUnique` (spec.md §4.4): returns a fork of the cached per-key
    /// `Dynamic` if one is live, cancelling any pending eviction;
    /// otherwise loads the row and wires a fresh cache entry fed by the
    /// key-partitioned event substream.
    #[tracing::instrument(skip(self, key), fields(table = self.schema.name()))]
    pub fn find_unique(self: &Rc<Self>, key: &PrimaryKeyRecord) -> Result<RowHandle<B>, Error> {
        let key_tuple: Vec<Value> = self
            .schema
            .primary_key()
            .iter()
            .map(|pk| key.get(pk).cloned().unwrap_or(Value::Null))
            .collect();

        let mut cache = self.row_cache.borrow_mut();
        if let Some(entry) = cache.get_mut(&key_tuple) {
            entry.refcount += 1;
            entry.zero_since = None;
            let forked = entry.dynamic.fork()?;
            drop(cache);
            tracing::trace!("findUnique cache hit");
            return Ok(RowHandle::new(Rc::clone(self), key_tuple, forked));
        }

        tracing::trace!("findUnique cache miss, loading from storage");
        let initial = self.storage.find_unique(key)?;
        // `canonical` lives only inside the cache entry; every caller,
        // including this one, receives a `fork()` of it so that no
        // external handle shares listener state with the feed closure.
        let canonical: Dynamic<Option<Row>, ()> = Dynamic::new(initial);
        let feed = canonical.clone_handle();
        let substream = self.partition.substream(key_tuple.clone(), move |event: &TableEvent| {
            let next = match event {
                TableEvent::Insert { row } => Some(row.clone()),
                TableEvent::Update { partial, .. } => {
                    let mut merged = feed.read().ok().flatten().unwrap_or_default();
                    merged.extend(partial.clone());
                    Some(merged)
                }
                TableEvent::Delete { .. } => None,
            };
            feed.apply((), next);
        });

        let handle_dynamic = canonical.fork()?;
        cache.insert(
            key_tuple.clone(),
            RowCacheEntry {
                dynamic: canonical,
                refcount: 1,
                zero_since: None,
                _substream: substream,
            },
        );
        drop(cache);

        Ok(RowHandle::new(Rc::clone(self), key_tuple, handle_dynamic))
    }

    /// `findMany` (spec.md §4.4): an initial storage-backed `Page` plus a
    /// derived `Dynamic<Page, Vec<PageDelta>>` whose delta stream filters
    /// every subsequent mutation against `pageInit`'s filter. Updates are
    /// conservatively dropped at this level (open question, spec.md §9).
    #[tracing::instrument(skip(self, init), fields(table = self.schema.name()))]
    pub fn find_many(self: &Rc<Self>, init: &PageInit) -> Result<PageHandle<B>, Error> {
        let page = self.storage.find_many(init)?;
        tracing::trace!(rows = page.rows.len(), row_count = page.row_count, "findMany page loaded");
        let dynamic: Dynamic<Page, Vec<PageDelta>> = Dynamic::new(page);
        let feed = dynamic.clone_handle();
        let filter = init.filter().cloned();

        let id = self.page_listener.register(move |event: &TableEvent, previous_row: Option<&Row>| {
            let ctx = BindCtx::new();
            let delta = match event {
                TableEvent::Insert { row } => interpreter::matches(filter.as_ref(), row, &ctx)
                    .ok()
                    .filter(|matched| *matched)
                    .map(|_| PageDelta::Add { row: row.clone() }),
                // `previous_row` is absent when this key was never cached
                // by a `findUnique`; conservatively treat that as a match
                // so the consumer always gets the chance to drop a row it
                // may be holding (spec.md §4.4, §9 open question).
                TableEvent::Delete { key } => previous_row
                    .is_none_or(|row| interpreter::matches(filter.as_ref(), row, &ctx).unwrap_or(true))
                    .then(|| PageDelta::Remove { key: key.clone() }),
                TableEvent::Update { .. } => None,
            };
            if let Some(delta) = delta {
                let snapshot = feed.read().unwrap_or_default();
                feed.apply(vec![delta], snapshot);
            }
        });

        Ok(PageHandle {
            table: Rc::downgrade(self),
            listener_id: id,
            dynamic,
        })
    }

    /// Sweep the per-key row cache, dropping entries whose refcount has
    /// been zero for at least `config.eviction_grace` (spec.md §3, §5).
    /// Callers on a single-threaded cooperative core are expected to
    /// drive this from their own tick/scheduler; the core imposes no
    /// timer of its own (spec.md §5: "suspension points: none").
    pub fn evict_expired(&self, now: Instant) {
        let mut expired = Vec::new();
        self.row_cache.borrow_mut().retain(|key_tuple, entry| {
            let keep = entry.refcount > 0
                || entry
                    .zero_since
                    .is_none_or(|zero_since| now.duration_since(zero_since) < self.config.eviction_grace);
            if !keep {
                expired.push(key_tuple.clone());
            }
            keep
        });
        for key_tuple in expired {
            self.partition.complete(&key_tuple);
        }
    }

    fn release_row_cache(&self, key_tuple: &[Value], now: Instant) {
        if let Some(entry) = self.row_cache.borrow_mut().get_mut(key_tuple) {
            entry.refcount = entry.refcount.saturating_sub(1);
            if entry.refcount == 0 {
                entry.zero_since = Some(now);
            }
        }
    }
}

///
/// RowHandle
///
/// A live fork of a `findUnique` cache entry. Dropping it releases the
/// cache refcount; the entry is evicted after the configured grace
/// window once no handle remains (spec.md §3).
///

pub struct RowHandle<B: Backend> {
    table: Weak<Table<B>>,
    key_tuple: Vec<Value>,
    dynamic: Dynamic<Option<Row>, ()>,
}

impl<B: Backend> RowHandle<B> {
    fn new(table: Rc<Table<B>>, key_tuple: Vec<Value>, dynamic: Dynamic<Option<Row>, ()>) -> Self {
        Self {
            table: Rc::downgrade(&table),
            key_tuple,
            dynamic,
        }
    }

    pub fn read(&self) -> Result<Option<Row>, crate::error::DynamicDisconnected> {
        self.dynamic.read()
    }

    pub fn updated<F>(&self, listener: F) -> Subscription<Option<Row>, ()>
    where
        F: FnMut(&()) + 'static,
    {
        self.dynamic.updated(listener)
    }

    /// Fork this handle, incrementing the shared cache entry's refcount.
    pub fn fork(&self) -> Result<Self, crate::error::DynamicDisconnected> {
        let Some(table) = self.table.upgrade() else {
            return self.dynamic.fork().map(|dynamic| Self {
                table: self.table.clone(),
                key_tuple: self.key_tuple.clone(),
                dynamic,
            });
        };
        if let Some(entry) = table.row_cache.borrow_mut().get_mut(&self.key_tuple) {
            entry.refcount += 1;
            entry.zero_since = None;
        }
        let forked = self.dynamic.fork()?;
        Ok(Self::new(table, self.key_tuple.clone(), forked))
    }
}

impl<B: Backend> Drop for RowHandle<B> {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            table.release_row_cache(&self.key_tuple, Instant::now());
        }
    }
}

///
/// PageHandle
///
/// A live `findMany` subscription. Dropping it deregisters this page's
/// mutation listener.
///

pub struct PageHandle<B: Backend> {
    table: Weak<Table<B>>,
    listener_id: u64,
    dynamic: Dynamic<Page, Vec<PageDelta>>,
}

impl<B: Backend> PageHandle<B> {
    pub fn read(&self) -> Result<Page, crate::error::DynamicDisconnected> {
        self.dynamic.read()
    }

    pub fn updated<F>(&self, listener: F) -> Subscription<Page, Vec<PageDelta>>
    where
        F: FnMut(&Vec<PageDelta>) + 'static,
    {
        self.dynamic.updated(listener)
    }

    pub fn disconnect(&self) {
        self.dynamic.disconnect();
    }
}

impl<B: Backend> Drop for PageHandle<B> {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            table.page_listener.unregister(self.listener_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::Cursor;
    use crate::page::ForwardPageInit;
    use crate::storage::memory::MemoryBackend;
    use crate::stmt::OrderByItem;
    use ripple_schema::{Column, ColumnKind};

    fn schema() -> TableSchema {
        TableSchema::new(
            "users",
            vec![
                Column::new("id", ColumnKind::Number),
                Column::new("name", ColumnKind::String),
                Column::new("age", ColumnKind::Number),
            ],
            vec!["id".into()],
        )
        .unwrap()
    }

    fn row(id: f64, name: &str, age: f64) -> Row {
        let mut r = BTreeMap::new();
        r.insert("id".to_string(), Value::Number(id));
        r.insert("name".to_string(), Value::String(name.to_string()));
        r.insert("age".to_string(), Value::Number(age));
        r
    }

    fn key(id: f64) -> PrimaryKeyRecord {
        let mut k = BTreeMap::new();
        k.insert("id".to_string(), Value::Number(id));
        k
    }

    #[test]
    fn insert_then_find_unique_sees_the_row() {
        let table = Table::new(schema(), MemoryBackend::new(), TableConfig::default()).unwrap();
        table.insert(&row(1.0, "Alice", 30.0)).unwrap();
        let handle = table.find_unique(&key(1.0)).unwrap();
        assert_eq!(handle.read().unwrap().unwrap().get("name"), Some(&Value::String("Alice".into())));
    }

    #[test]
    fn update_after_subscribe_merges_into_cached_snapshot() {
        let table = Table::new(schema(), MemoryBackend::new(), TableConfig::default()).unwrap();
        table.insert(&row(1.0, "Alice", 30.0)).unwrap();
        let handle = table.find_unique(&key(1.0)).unwrap();
        let mut partial = BTreeMap::new();
        partial.insert("name".to_string(), Value::String("Bob".into()));
        table.update(&key(1.0), &partial).unwrap();
        let snapshot = handle.read().unwrap().unwrap();
        assert_eq!(snapshot.get("name"), Some(&Value::String("Bob".into())));
        assert_eq!(snapshot.get("age"), Some(&Value::Number(30.0)));
    }

    #[test]
    fn delete_after_subscribe_nulls_the_cached_snapshot() {
        let table = Table::new(schema(), MemoryBackend::new(), TableConfig::default()).unwrap();
        table.insert(&row(1.0, "Alice", 30.0)).unwrap();
        let handle = table.find_unique(&key(1.0)).unwrap();
        table.delete(&key(1.0)).unwrap();
        assert!(handle.read().unwrap().is_none());
    }

    #[test]
    fn second_find_unique_forks_the_same_cache_entry() {
        let table = Table::new(schema(), MemoryBackend::new(), TableConfig::default()).unwrap();
        table.insert(&row(1.0, "Alice", 30.0)).unwrap();
        let first = table.find_unique(&key(1.0)).unwrap();
        let second = table.find_unique(&key(1.0)).unwrap();
        assert_eq!(table.row_cache.borrow().get(&vec![Value::Number(1.0)]).unwrap().refcount, 2);
        drop(first);
        drop(second);
    }

    #[test]
    fn dropping_all_handles_starts_the_eviction_clock() {
        let table = Table::new(schema(), MemoryBackend::new(), TableConfig::default()).unwrap();
        table.insert(&row(1.0, "Alice", 30.0)).unwrap();
        let handle = table.find_unique(&key(1.0)).unwrap();
        drop(handle);
        assert!(table
            .row_cache
            .borrow()
            .get(&vec![Value::Number(1.0)])
            .unwrap()
            .zero_since
            .is_some());

        let far_future = Instant::now() + Duration::from_secs(11);
        table.evict_expired(far_future);
        assert!(table.row_cache.borrow().get(&vec![Value::Number(1.0)]).is_none());
    }

    #[test]
    fn resubscribing_within_grace_window_cancels_eviction() {
        let table = Table::new(schema(), MemoryBackend::new(), TableConfig::default()).unwrap();
        table.insert(&row(1.0, "Alice", 30.0)).unwrap();
        let handle = table.find_unique(&key(1.0)).unwrap();
        drop(handle);
        let second = table.find_unique(&key(1.0)).unwrap();
        assert!(table
            .row_cache
            .borrow()
            .get(&vec![Value::Number(1.0)])
            .unwrap()
            .zero_since
            .is_none());
        table.evict_expired(Instant::now() + Duration::from_secs(11));
        assert!(table.row_cache.borrow().get(&vec![Value::Number(1.0)]).is_some());
        drop(second);
    }

    #[test]
    fn find_many_emits_add_delta_for_a_matching_insert() {
        let table = Table::new(schema(), MemoryBackend::new(), TableConfig::default()).unwrap();
        table.insert(&row(1.0, "Alice", 30.0)).unwrap();
        let init = PageInit::Forward(ForwardPageInit {
            after: None,
            first: 10,
            order_by: vec![OrderByItem::asc("id")],
            filter: None,
        });
        let handle = table.find_many(&init).unwrap();
        let seen: Rc<RefCell<Vec<PageDelta>>> = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let _sub = handle.updated(move |deltas| seen_clone.borrow_mut().extend(deltas.clone()));
        table.insert(&row(2.0, "Bob", 25.0)).unwrap();
        assert_eq!(seen.borrow().len(), 1);
        assert!(matches!(seen.borrow()[0], PageDelta::Add { .. }));
    }

    #[test]
    fn find_many_emits_remove_delta_for_a_matching_delete() {
        let table = Table::new(schema(), MemoryBackend::new(), TableConfig::default()).unwrap();
        table.insert(&row(1.0, "Alice", 30.0)).unwrap();
        let init = PageInit::Forward(ForwardPageInit {
            after: None,
            first: 10,
            order_by: vec![OrderByItem::asc("id")],
            filter: None,
        });
        let handle = table.find_many(&init).unwrap();
        let seen: Rc<RefCell<Vec<PageDelta>>> = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let _sub = handle.updated(move |deltas| seen_clone.borrow_mut().extend(deltas.clone()));
        table.delete(&key(1.0)).unwrap();
        assert_eq!(seen.borrow().len(), 1);
        assert!(matches!(seen.borrow()[0], PageDelta::Remove { .. }));
    }

    #[test]
    fn find_many_drops_update_events() {
        let table = Table::new(schema(), MemoryBackend::new(), TableConfig::default()).unwrap();
        table.insert(&row(1.0, "Alice", 30.0)).unwrap();
        let init = PageInit::Forward(ForwardPageInit {
            after: None,
            first: 10,
            order_by: vec![OrderByItem::asc("id")],
            filter: None,
        });
        let handle = table.find_many(&init).unwrap();
        let seen: Rc<RefCell<Vec<PageDelta>>> = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let _sub = handle.updated(move |deltas| seen_clone.borrow_mut().extend(deltas.clone()));
        let mut partial = BTreeMap::new();
        partial.insert("name".to_string(), Value::String("Bob".into()));
        table.update(&key(1.0), &partial).unwrap();
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn dropping_page_handle_deregisters_its_listener() {
        let table = Table::new(schema(), MemoryBackend::new(), TableConfig::default()).unwrap();
        let init = PageInit::Forward(ForwardPageInit {
            after: None,
            first: 10,
            order_by: vec![OrderByItem::asc("id")],
            filter: None,
        });
        let handle = table.find_many(&init).unwrap();
        drop(handle);
        assert!(table.page_listener.listeners.borrow().is_empty());
        let _ = Cursor::new(vec!["id".into()], vec![Value::Number(1.0)]);
    }
}

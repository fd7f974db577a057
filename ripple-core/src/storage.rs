//! Storage adapter (spec.md §4.3).
//!
//! Wraps a [`Backend`] with the compiled-statement cache the spec
//! requires: four statements (insert / upsert / delete / find-unique) are
//! built once, at construction, against the table schema; `update` is
//! compiled on demand because its SET list depends on which columns the
//! caller actually changed. `find_many` builds a fresh seven-query bundle
//! per call via [`crate::plan`], since its shape depends on the caller's
//! `orderBy`/`filter`.

pub mod memory;

use crate::compile::{compile, CompileOptions, CompiledStatement};
use crate::cursor::Cursor;
use crate::error::{Error, StorageError};
use crate::expr::{BindCtx, Expression, ParamPath, Parameterizable};
use crate::page::{Page, PageInit};
use crate::plan;
use crate::stmt::{Count, Delete, Insert, OnConflict, Select, Statement, Update};
use crate::value::{PrimaryKeyRecord, Row, Value};
use ripple_schema::TableSchema;

/// A single `?` bind point's result after a `run`/`get`/`all` call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RunResult {
    pub rows_changed: usize,
}

/// A prepared statement handle, as returned by [`Backend::prepare`].
///
/// Mirrors the driver contract of spec.md §6: synchronous, positional
/// `?` parameters, no notion of rows beyond what `get`/`all`/`run` return.
pub trait StatementHandle {
    fn get(&self, params: &[Value]) -> Result<Option<Row>, StorageError>;
    fn all(&self, params: &[Value]) -> Result<Vec<Row>, StorageError>;
    fn run(&self, params: &[Value]) -> Result<RunResult, StorageError>;
}

/// The external SQL execution backend (spec.md §1: out of scope, specified
/// only by the interface). `prepare` is synchronous; `transaction` commits
/// on a normal return and rolls back on an `Err`.
pub trait Backend {
    type Statement: StatementHandle;

    fn prepare(&self, sql: &str) -> Result<Self::Statement, StorageError>;

    fn transaction(
        &self,
        f: &mut dyn FnMut() -> Result<(), StorageError>,
    ) -> Result<(), StorageError>;
}

struct Prepared<S> {
    compiled: CompiledStatement,
    handle: S,
}

impl<S: StatementHandle> Prepared<S> {
    fn params(&self, ctx: &BindCtx) -> Vec<Value> {
        self.compiled.extract(ctx)
    }
}

/// Namespace helpers for the `values.<col>` / `key.<col>` / `set.<col>`
/// parameter paths (spec.md §9's "parameters are data" redesign note).
fn values_path(column: &str) -> ParamPath {
    ParamPath::new(["values", column])
}

fn key_path(column: &str) -> ParamPath {
    ParamPath::new(["key", column])
}

fn set_path(column: &str) -> ParamPath {
    ParamPath::new(["set", column])
}

fn values_ctx(row: &Row) -> BindCtx {
    row.iter()
        .fold(BindCtx::new(), |ctx, (col, value)| ctx.with(&values_path(col), value.clone()))
}

fn key_ctx(key: &PrimaryKeyRecord) -> BindCtx {
    key.iter()
        .fold(BindCtx::new(), |ctx, (col, value)| ctx.with(&key_path(col), value.clone()))
}

/// Every statement this adapter compiles is lowered to the portable
/// OR-of-AND form (spec.md §9): the bundled [`memory::MemoryBackend`], and
/// any other text-SQL backend, cannot be assumed to support native
/// row-value comparison.
const OPTS: CompileOptions = CompileOptions { row_values: false };

///
/// StorageAdapter
///

pub struct StorageAdapter<B: Backend> {
    schema: TableSchema,
    backend: B,
    insert: Prepared<B::Statement>,
    upsert: Prepared<B::Statement>,
    delete: Prepared<B::Statement>,
    find_unique: Prepared<B::Statement>,
}

impl<B: Backend> StorageAdapter<B> {
    /// Build the adapter, eagerly preparing the four statements whose
    /// shape depends only on the schema.
    pub fn new(schema: TableSchema, backend: B) -> Result<Self, Error> {
        let insert_stmt = insert_statement(&schema);
        let upsert_stmt = upsert_statement(&schema);
        let delete_stmt = delete_statement(&schema);
        let find_unique_stmt = find_unique_statement(&schema);

        let insert = prepare(&schema, &backend, &insert_stmt)?;
        let upsert = prepare(&schema, &backend, &upsert_stmt)?;
        let delete = prepare(&schema, &backend, &delete_stmt)?;
        let find_unique = prepare(&schema, &backend, &find_unique_stmt)?;

        Ok(Self {
            schema,
            backend,
            insert,
            upsert,
            delete,
            find_unique,
        })
    }

    #[must_use]
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn insert(&self, row: &Row) -> Result<(), StorageError> {
        let params = self.insert.params(&values_ctx(row));
        self.insert.handle.run(&params)?;
        Ok(())
    }

    pub fn upsert(&self, row: &Row) -> Result<(), StorageError> {
        let params = self.upsert.params(&values_ctx(row));
        self.upsert.handle.run(&params)?;
        Ok(())
    }

    pub fn delete(&self, key: &PrimaryKeyRecord) -> Result<(), StorageError> {
        let params = self.delete.params(&key_ctx(key));
        self.delete.handle.run(&params)?;
        Ok(())
    }

    pub fn find_unique(&self, key: &PrimaryKeyRecord) -> Result<Option<Row>, StorageError> {
        let params = self.find_unique.params(&key_ctx(key));
        self.find_unique.handle.get(&params)
    }

    /// `update` is compiled on demand: the SET list depends on which
    /// columns the caller chose to change. An empty `partial` is the
    /// `EmptyUpdate` no-op of spec.md §7, not an error.
    pub fn update(&self, key: &PrimaryKeyRecord, partial: &Row) -> Result<(), Error> {
        if partial.is_empty() {
            return Ok(());
        }

        let set: Vec<(String, Parameterizable)> = partial
            .keys()
            .map(|col| (col.clone(), set_path(col).into()))
            .collect();
        let key_pairs: Vec<(String, Parameterizable)> = self
            .schema
            .primary_key()
            .iter()
            .map(|pk| (pk.clone(), key_path(pk).into()))
            .collect();

        let stmt = Statement::Update(Update {
            table: self.schema.name().to_string(),
            set,
            key: key_pairs,
        });
        let compiled = compile(&self.schema, &stmt, OPTS)?;
        let handle = self.backend.prepare(&compiled.sql)?;

        let mut ctx = values_ctx_for_set(partial);
        for (col, value) in key {
            ctx.set(&key_path(col), value.clone());
        }
        handle.run(&compiled.extract(&ctx))?;
        Ok(())
    }

    /// Implements spec.md §4.3's nine-step `findMany` algorithm atop the
    /// planner's seven-query bundle.
    #[tracing::instrument(skip(self, init), fields(table = self.schema.name()))]
    pub fn find_many(&self, init: &PageInit) -> Result<Page, Error> {
        let order_by = init.order_by().to_vec();
        let filter = init.filter().cloned();
        let bundle = plan::build_bundle(&self.schema, &order_by, filter.as_ref())?;

        let (rows, is_forward, after_absent, before_absent) = match init {
            PageInit::Forward(f) => {
                let rows = match &f.after {
                    Some(cursor) => self.run_select(&bundle.load_next, cursor_ctx(cursor, f.first))?,
                    None => self.run_select(&bundle.load_first, limit_ctx(f.first))?,
                };
                (rows, true, f.after.is_none(), false)
            }
            PageInit::Backward(b) => {
                let mut rows = match &b.before {
                    Some(cursor) => self.run_select(&bundle.load_prev, cursor_ctx(cursor, b.last))?,
                    None => self.run_select(&bundle.load_last, limit_ctx(b.last))?,
                };
                rows.reverse();
                (rows, false, false, b.before.is_none())
            }
        };

        let row_count = self.run_count(&bundle.count_total, &BindCtx::new())?;

        let mut page = Page::from_rows(rows, row_count);

        page.item_before_count = if is_forward && after_absent {
            0
        } else {
            match &page.start_cursor {
                Some(c) => self.run_count(&bundle.count_before, &cursor_only_ctx(c))?,
                None => row_count,
            }
        };

        page.item_after_count = if !is_forward && before_absent {
            0
        } else {
            match &page.end_cursor {
                Some(c) => self.run_count(&bundle.count_after, &cursor_only_ctx(c))?,
                None => row_count,
            }
        };

        Ok(page)
    }

    fn run_select(&self, select: &Select, ctx: BindCtx) -> Result<Vec<Cursor>, Error> {
        let compiled = compile(&self.schema, &Statement::Select(select.clone()), OPTS)?;
        let handle = self.backend.prepare(&compiled.sql)?;
        let params = compiled.extract(&ctx);
        let rows = handle.all(&params)?;

        let columns: Vec<String> = select
            .columns
            .iter()
            .map(|e| match e {
                Expression::Column(name) => name.clone(),
                other => unreachable!("find_many projects columns only, got {:?}", other.kind_name()),
            })
            .collect();

        Ok(rows
            .into_iter()
            .map(|row| {
                let values = columns.iter().map(|c| row.get(c).cloned().unwrap_or(Value::Null)).collect();
                Cursor::new(columns.clone(), values)
            })
            .collect())
    }

    fn run_count(&self, count: &Count, ctx: &BindCtx) -> Result<usize, Error> {
        let compiled = compile(&self.schema, &Statement::Count(count.clone()), OPTS)?;
        let handle = self.backend.prepare(&compiled.sql)?;
        let params = compiled.extract(ctx);
        let row = handle.get(&params)?;
        let count = row.and_then(|r| r.get("count").and_then(Value::as_number)).unwrap_or(0.0);
        Ok(count as usize)
    }
}

fn values_ctx_for_set(partial: &Row) -> BindCtx {
    partial
        .iter()
        .fold(BindCtx::new(), |ctx, (col, value)| ctx.with(&set_path(col), value.clone()))
}

fn limit_ctx(limit: usize) -> BindCtx {
    BindCtx::new().with(&plan::limit_param(), Value::Number(limit as f64))
}

fn cursor_ctx(cursor: &Cursor, limit: usize) -> BindCtx {
    let mut ctx = cursor_only_ctx(cursor);
    ctx.set(&plan::limit_param(), Value::Number(limit as f64));
    ctx
}

fn cursor_only_ctx(cursor: &Cursor) -> BindCtx {
    cursor
        .columns()
        .iter()
        .zip(cursor.values().iter())
        .fold(BindCtx::new(), |ctx, (col, value)| ctx.with(&plan::cursor_param(col), value.clone()))
}

fn prepare<B: Backend>(
    schema: &TableSchema,
    backend: &B,
    stmt: &Statement,
) -> Result<Prepared<B::Statement>, Error> {
    let compiled = compile(schema, stmt, OPTS)?;
    let handle = backend.prepare(&compiled.sql)?;
    Ok(Prepared { compiled, handle })
}

fn insert_statement(schema: &TableSchema) -> Statement {
    Statement::Insert(Insert {
        table: schema.name().to_string(),
        values: schema
            .columns()
            .iter()
            .map(|c| (c.name.clone(), values_path(&c.name).into()))
            .collect(),
        on_conflict: None,
    })
}

fn upsert_statement(schema: &TableSchema) -> Statement {
    Statement::Insert(Insert {
        table: schema.name().to_string(),
        values: schema
            .columns()
            .iter()
            .map(|c| (c.name.clone(), values_path(&c.name).into()))
            .collect(),
        on_conflict: Some(OnConflict {
            columns: schema.primary_key().to_vec(),
            update_set: schema
                .non_key_columns()
                .map(|c| (c.name.clone(), values_path(&c.name).into()))
                .collect(),
        }),
    })
}

fn delete_statement(schema: &TableSchema) -> Statement {
    Statement::Delete(Delete {
        table: schema.name().to_string(),
        key: schema.primary_key().iter().map(|pk| (pk.clone(), key_path(pk).into())).collect(),
    })
}

fn find_unique_statement(schema: &TableSchema) -> Statement {
    let where_ = schema
        .primary_key()
        .iter()
        .map(|pk| Expression::column(pk.clone()).binop(crate::operator::BinaryOperator::Eq, Expression::parameter(key_path(pk))))
        .reduce(Expression::and);

    Statement::Select(Select {
        table: schema.name().to_string(),
        columns: vec![Expression::Asterisk],
        where_,
        order_by: vec![],
        limit: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::ForwardPageInit;
    use crate::stmt::OrderByItem;
    use memory::MemoryBackend;
    use ripple_schema::{Column, ColumnKind};
    use std::collections::BTreeMap;

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
    fn insert_then_find_unique_round_trips() {
        let adapter = StorageAdapter::new(schema(), MemoryBackend::new()).unwrap();
        adapter.insert(&row(1.0, "Alice", 30.0)).unwrap();
        let found = adapter.find_unique(&key(1.0)).unwrap().unwrap();
        assert_eq!(found.get("name"), Some(&Value::String("Alice".into())));
    }

    #[test]
    fn update_merges_partial_row() {
        let adapter = StorageAdapter::new(schema(), MemoryBackend::new()).unwrap();
        adapter.insert(&row(1.0, "Alice", 30.0)).unwrap();
        let mut partial = BTreeMap::new();
        partial.insert("name".to_string(), Value::String("Bob".into()));
        adapter.update(&key(1.0), &partial).unwrap();
        let found = adapter.find_unique(&key(1.0)).unwrap().unwrap();
        assert_eq!(found.get("name"), Some(&Value::String("Bob".into())));
        assert_eq!(found.get("age"), Some(&Value::Number(30.0)));
    }

    #[test]
    fn empty_update_is_a_no_op() {
        let adapter = StorageAdapter::new(schema(), MemoryBackend::new()).unwrap();
        adapter.insert(&row(1.0, "Alice", 30.0)).unwrap();
        adapter.update(&key(1.0), &BTreeMap::new()).unwrap();
        let found = adapter.find_unique(&key(1.0)).unwrap().unwrap();
        assert_eq!(found.get("name"), Some(&Value::String("Alice".into())));
    }

    #[test]
    fn delete_removes_row() {
        let adapter = StorageAdapter::new(schema(), MemoryBackend::new()).unwrap();
        adapter.insert(&row(1.0, "Alice", 30.0)).unwrap();
        adapter.delete(&key(1.0)).unwrap();
        assert!(adapter.find_unique(&key(1.0)).unwrap().is_none());
    }

    #[test]
    fn find_many_forward_page_matches_scenario_s1() {
        let adapter = StorageAdapter::new(schema(), MemoryBackend::new()).unwrap();
        for id in 1..=10 {
            adapter.insert(&row(id as f64, "x", 20.0 + id as f64)).unwrap();
        }
        let init = PageInit::Forward(ForwardPageInit {
            after: Some(Cursor::new(vec!["id".into()], vec![Value::Number(3.0)])),
            first: 4,
            order_by: vec![OrderByItem::asc("id")],
            filter: None,
        });
        let page = adapter.find_many(&init).unwrap();
        let ids: Vec<f64> = page.rows.iter().map(|c| c.get("id").unwrap().as_number().unwrap()).collect();
        assert_eq!(ids, vec![4.0, 5.0, 6.0, 7.0]);
        assert_eq!(page.item_before_count, 3);
        assert_eq!(page.item_after_count, 3);
    }
}

//! # ripple-core
//!
//! Relational AST, SQL compiler, cursor-pagination planner, storage
//! adapter, and reactive view layer for `ripple` tables.
//!
//! Layering, bottom to top: [`value`]/[`expr`]/[`operator`] (the scalar
//! and expression vocabulary shared by everything above), [`stmt`] (the
//! statement AST) and [`compile`] (AST to parameterized SQL text),
//! [`cursor`]/[`page`]/[`plan`] (seek pagination), [`interpreter`]
//! (re-evaluating an `Expression` against a `Row`, used only by the
//! reactive layer), [`storage`] (the backend adapter), [`reactive`]
//! (`Dynamic`/`partition_by_key`), and [`table`] (the reactive `Table`
//! that ties the rest together).

pub mod compile;
pub mod cursor;
pub mod error;
pub mod expr;
pub mod interpreter;
pub mod operator;
pub mod page;
pub mod plan;
pub mod reactive;
pub mod stmt;
pub mod storage;
pub mod table;
pub mod value;

///
/// Prelude
///

pub mod prelude {
    pub use crate::compile::{compile, CompileOptions, CompiledStatement};
    pub use crate::cursor::{compare_tuples, Cursor};
    pub use crate::error::{CompileError, DynamicDisconnected, Error, InterpError, PlanError, StorageError};
    pub use crate::expr::{BindCtx, Expression, ParamPath, Parameterizable};
    pub use crate::operator::{BinaryOperator, UnaryOperator};
    pub use crate::page::{BackwardPageInit, ForwardPageInit, Page, PageInit};
    pub use crate::plan::{build_bundle, Bundle};
    pub use crate::reactive::{Dynamic, KeyChange, Partition};
    pub use crate::storage::memory::MemoryBackend;
    pub use crate::storage::{Backend, RunResult, StatementHandle, StorageAdapter};
    pub use crate::stmt::{Count, Delete, Direction, Insert, OnConflict, OrderByItem, Select, Statement, Update};
    pub use crate::table::{PageDelta, PageHandle, RowHandle, Table, TableConfig, TableEvent};
    pub use crate::value::{project, PrimaryKeyRecord, Row, Value};
    pub use ripple_schema::prelude::*;
}

//! # ripple
//!
//! `ripple` is the public facade crate for the reactive table runtime: a
//! typed query AST and compiler layered under a reactive view (`Table`,
//! `Dynamic`, seek pagination) on top of a pluggable relational store.
//!
//! Low-level AST, compiler, planner, storage adapter, and reactive
//! primitives live in `ripple-core`; the table schema model lives in
//! `ripple-schema`. This crate re-exports both behind one `prelude`.
//!
//! ## Crate layout
//!
//! - `ripple_core::{expr, operator, stmt, compile}`
//!   The expression/statement AST and the SQL compiler.
//! - `ripple_core::{cursor, page, plan}`
//!   Seek-pagination cursors, pages, and the bundle planner.
//! - `ripple_core::{storage, interpreter}`
//!   The backend adapter and the expression interpreter it shares with
//!   the reactive layer.
//! - `ripple_core::{reactive, table}`
//!   `Dynamic`/`partition_by_key` and the reactive `Table` built on them.
//! - `ripple_schema`
//!   The table schema model (`Column`, `ColumnKind`, `TableSchema`).
//!
//! ## Prelude
//!
//! `prelude` is the opinionated glob-import for application code: schema
//! construction, the expression/statement builders, and the reactive
//! `Table` surface.

pub use ripple_core as core;
pub use ripple_schema as schema;

pub use ripple_core::error::Error;

///
/// Prelude
///

pub mod prelude {
    pub use ripple_core::prelude::*;
}

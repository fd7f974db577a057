//! Crate-level error taxonomy (spec.md §7).
//!
//! Each layer gets its own `thiserror` enum, following the teacher's
//! `InternalError`/`ErrorClass`/`ErrorOrigin` split of "what kind of
//! failure" from "which layer raised it" — simplified here to one flat
//! enum per layer since the spec's taxonomy is already flat.
//! [`Error`] composes them at the crate boundary.

use thiserror::Error as ThisError;

///
/// CompileError
///
/// Raised when the compiler is asked to render an AST node it does not
/// support ("unsupported kind reached compiler", spec.md §7).
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum CompileError {
    #[error("expression kind is not supported by the compiler: {kind}")]
    Unsupported { kind: &'static str },

    #[error("column `{name}` is not declared on table `{table}`")]
    SchemaViolation { table: String, name: String },
}

///
/// InterpError
///
/// Raised by the expression interpreter (spec.md §4.6).
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, ThisError)]
pub enum InterpError {
    #[error("expression kind is not supported by the interpreter: {kind}")]
    Unsupported { kind: &'static str },

    #[error("operator `{op}` is not applicable to the operand type")]
    TypeMismatch { op: &'static str },

    #[error("column `{name}` is not present in the row")]
    MissingColumn { name: &'static str },
}

///
/// PlanError
///
/// Planner assertions from spec.md §4.2.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum PlanError {
    #[error("orderBy must cover every primary-key column; missing: {missing:?}")]
    PrimaryKeyMustBeOrdered { missing: Vec<String> },

    #[error("orderBy directions must be uniformly ascending or uniformly descending")]
    DirectionsMustAgree,

    #[error("orderBy must not be empty")]
    EmptyOrderBy,
}

///
/// StorageError
///
/// A backend failure, propagated unchanged (spec.md §7: `BackendError`).
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("backend error: {message}")]
pub struct StorageError {
    pub message: String,
}

impl StorageError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

///
/// DynamicError
///
/// Raised by [`crate::reactive::Dynamic`] after disconnect (spec.md §4.5).
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, ThisError)]
#[error("dynamic has been disconnected")]
pub struct DynamicDisconnected;

///
/// Error
///
/// Crate-wide umbrella error for operations that can fail at more than one
/// layer (e.g. `Table::find_many`, which both plans and executes).
///

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] ripple_schema::SchemaError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Interp(#[from] InterpError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Dynamic(#[from] DynamicDisconnected),
}

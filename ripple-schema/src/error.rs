use thiserror::Error as ThisError;

///
/// SchemaError
///
/// Invariant violations raised at `TableSchema` construction.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum SchemaError {
    #[error("table name must not be empty")]
    EmptyTableName,

    #[error("column list must not be empty")]
    NoColumns,

    #[error("duplicate column name: {name}")]
    DuplicateColumn { name: String },

    #[error("primary key must not be empty")]
    EmptyPrimaryKey,

    #[error("primary key references unknown column: {name}")]
    UnknownPrimaryKeyColumn { name: String },

    #[error("primary key lists column {name} more than once")]
    DuplicatePrimaryKeyColumn { name: String },
}

use crate::{Column, ColumnKind, SchemaError};
use std::collections::HashSet;

///
/// TableSchema
///
/// `{ name, columns: name -> {kind}, primaryKey: ordered list of column
/// names }` (spec.md §3). Column order is the declaration order passed to
/// [`TableSchema::new`]; it is significant — it is the order the compiler
/// iterates columns in for `INSERT` column lists and `SELECT` projections.
///
/// Invariant: every primary-key entry names a column present in
/// `columns`; primary-key order is significant (it is the lexicographic
/// cursor order used by the pagination planner).
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TableSchema {
    name: String,
    columns: Vec<Column>,
    primary_key: Vec<String>,
}

impl TableSchema {
    /// Construct and validate a table schema.
    pub fn new(
        name: impl Into<String>,
        columns: Vec<Column>,
        primary_key: Vec<String>,
    ) -> Result<Self, SchemaError> {
        let name = name.into();

        if name.is_empty() {
            return Err(SchemaError::EmptyTableName);
        }
        if columns.is_empty() {
            return Err(SchemaError::NoColumns);
        }

        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(SchemaError::DuplicateColumn {
                    name: column.name.clone(),
                });
            }
        }

        if primary_key.is_empty() {
            return Err(SchemaError::EmptyPrimaryKey);
        }

        let mut seen_pk = HashSet::with_capacity(primary_key.len());
        for pk_col in &primary_key {
            if !seen_pk.insert(pk_col.as_str()) {
                return Err(SchemaError::DuplicatePrimaryKeyColumn {
                    name: pk_col.clone(),
                });
            }
            if !seen.contains(pk_col.as_str()) {
                return Err(SchemaError::UnknownPrimaryKeyColumn {
                    name: pk_col.clone(),
                });
            }
        }

        Ok(Self {
            name,
            columns,
            primary_key,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    /// True when `name` is a declared column.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    #[must_use]
    pub fn column_kind(&self, name: &str) -> Option<ColumnKind> {
        self.column(name).map(|c| c.kind)
    }

    /// True when `name` is one of the primary-key columns.
    #[must_use]
    pub fn is_primary_key_column(&self, name: &str) -> bool {
        self.primary_key.iter().any(|c| c == name)
    }

    /// Non-key columns, in declaration order.
    #[must_use]
    pub fn non_key_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns
            .iter()
            .filter(|c| !self.is_primary_key_column(&c.name))
    }
}

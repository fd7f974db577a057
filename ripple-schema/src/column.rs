use serde::{Deserialize, Serialize};

///
/// ColumnKind
///
/// Scalar kinds a column may declare (spec.md §3).
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ColumnKind {
    String,
    Number,
    Boolean,
    Date,
}

///
/// Column
///
/// A single declared column: its name and scalar kind.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

impl Column {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

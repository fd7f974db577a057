//! Statement AST (spec.md §3, §4.1).

use crate::expr::{Expression, Parameterizable};

///
/// Direction
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    #[must_use]
    pub const fn sql_text(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    #[must_use]
    pub const fn inverted(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

///
/// OrderByItem
///

#[derive(Clone, Debug)]
pub struct OrderByItem {
    pub column: String,
    pub direction: Direction,
}

impl OrderByItem {
    #[must_use]
    pub fn new(column: impl Into<String>, direction: Direction) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }

    #[must_use]
    pub fn asc(column: impl Into<String>) -> Self {
        Self::new(column, Direction::Asc)
    }

    #[must_use]
    pub fn desc(column: impl Into<String>) -> Self {
        Self::new(column, Direction::Desc)
    }
}

///
/// Select
///

#[derive(Clone, Debug)]
pub struct Select {
    pub table: String,
    pub columns: Vec<Expression>,
    pub where_: Option<Expression>,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<Parameterizable>,
}

///
/// Count
///

#[derive(Clone, Debug)]
pub struct Count {
    pub table: String,
    pub where_: Option<Expression>,
}

///
/// OnConflict
///

#[derive(Clone, Debug)]
pub struct OnConflict {
    pub columns: Vec<String>,
    pub update_set: Vec<(String, Parameterizable)>,
}

///
/// Insert
///

#[derive(Clone, Debug)]
pub struct Insert {
    pub table: String,
    pub values: Vec<(String, Parameterizable)>,
    pub on_conflict: Option<OnConflict>,
}

///
/// Update
///

#[derive(Clone, Debug)]
pub struct Update {
    pub table: String,
    pub set: Vec<(String, Parameterizable)>,
    pub key: Vec<(String, Parameterizable)>,
}

///
/// Delete
///

#[derive(Clone, Debug)]
pub struct Delete {
    pub table: String,
    pub key: Vec<(String, Parameterizable)>,
}

///
/// Statement
///
/// Sum type over the five statement shapes the compiler supports
/// (spec.md §3). Every variant carries a table reference.
///

#[derive(Clone, Debug)]
pub enum Statement {
    Select(Select),
    Count(Count),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
}

impl Statement {
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::Select(s) => &s.table,
            Self::Count(s) => &s.table,
            Self::Insert(s) => &s.table,
            Self::Update(s) => &s.table,
            Self::Delete(s) => &s.table,
        }
    }
}

//! Page/page-init types (spec.md §3).

use crate::cursor::Cursor;
use crate::expr::Expression;
use crate::stmt::OrderByItem;

///
/// ForwardPageInit
///

#[derive(Clone, Debug)]
pub struct ForwardPageInit {
    pub after: Option<Cursor>,
    pub first: usize,
    pub order_by: Vec<OrderByItem>,
    pub filter: Option<Expression>,
}

///
/// BackwardPageInit
///

#[derive(Clone, Debug)]
pub struct BackwardPageInit {
    pub before: Option<Cursor>,
    pub last: usize,
    pub order_by: Vec<OrderByItem>,
    pub filter: Option<Expression>,
}

///
/// PageInit
///

#[derive(Clone, Debug)]
pub enum PageInit {
    Forward(ForwardPageInit),
    Backward(BackwardPageInit),
}

impl PageInit {
    #[must_use]
    pub fn order_by(&self) -> &[OrderByItem] {
        match self {
            Self::Forward(f) => &f.order_by,
            Self::Backward(b) => &b.order_by,
        }
    }

    #[must_use]
    pub fn filter(&self) -> Option<&Expression> {
        match self {
            Self::Forward(f) => f.filter.as_ref(),
            Self::Backward(b) => b.filter.as_ref(),
        }
    }
}

///
/// Page
///
/// `rows` are cursors (the orderBy-column projection of each matching row,
/// spec.md §3) in `orderBy` direction regardless of whether the page was
/// fetched forward or backward.
///

#[derive(Clone, Debug, Default)]
pub struct Page {
    pub rows: Vec<Cursor>,
    pub row_count: usize,
    pub start_cursor: Option<Cursor>,
    pub end_cursor: Option<Cursor>,
    pub item_before_count: usize,
    pub item_after_count: usize,
}

impl Page {
    #[must_use]
    pub fn from_rows(rows: Vec<Cursor>, row_count: usize) -> Self {
        let start_cursor = rows.first().cloned();
        let end_cursor = rows.last().cloned();
        Self {
            rows,
            row_count,
            start_cursor,
            end_cursor,
            item_before_count: 0,
            item_after_count: 0,
        }
    }
}

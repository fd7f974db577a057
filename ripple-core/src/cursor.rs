//! Cursors and the tuple comparator (spec.md §3, §4.9).

use crate::value::{PrimaryKeyRecord, Value};
use std::cmp::Ordering;

///
/// Cursor
///
/// A [`PrimaryKeyRecord`] enriched with the ordering columns of the
/// active query, in `orderBy` order (spec.md §3). Opaque from the
/// caller's point of view: round-tripped as `after`/`before`.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Cursor {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Cursor {
    #[must_use]
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        assert_eq!(
            columns.len(),
            values.len(),
            "cursor columns/values length mismatch"
        );
        Self { columns, values }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }
}

/// Lexicographic (row-value) comparison of two equal-length cursor
/// tuples, mirroring SQL row-value comparison (spec.md §4.2).
#[must_use]
pub fn compare_tuples(left: &[Value], right: &[Value]) -> Ordering {
    for (l, r) in left.iter().zip(right.iter()) {
        match l.cmp(r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    left.len().cmp(&right.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compares_lexicographically() {
        let a = vec![Value::Number(1.0), Value::Number(2.0)];
        let b = vec![Value::Number(1.0), Value::Number(3.0)];
        assert_eq!(compare_tuples(&a, &b), Ordering::Less);
    }

    #[test]
    fn first_differing_component_decides() {
        let a = vec![Value::Number(2.0), Value::Number(0.0)];
        let b = vec![Value::Number(1.0), Value::Number(99.0)];
        assert_eq!(compare_tuples(&a, &b), Ordering::Greater);
    }

    #[test]
    fn equal_tuples_compare_equal() {
        let a = vec![Value::Number(1.0), Value::String("x".into())];
        assert_eq!(compare_tuples(&a, &a), Ordering::Equal);
    }

    #[test]
    fn cursor_get_looks_up_by_column_name() {
        let cursor = Cursor::new(
            vec!["id".into(), "sub_id".into()],
            vec![Value::Number(1.0), Value::Number(2.0)],
        );
        assert_eq!(cursor.get("sub_id"), Some(&Value::Number(2.0)));
        assert_eq!(cursor.get("missing"), None);
    }
}

impl From<&Cursor> for PrimaryKeyRecord {
    fn from(cursor: &Cursor) -> Self {
        cursor
            .columns
            .iter()
            .cloned()
            .zip(cursor.values.iter().cloned())
            .collect()
    }
}

//! Pagination planner (spec.md §4.2).
//!
//! Builds the bundle of seven statements (`load_first`, `load_last`,
//! `load_next`, `load_prev`, `count_total`, `count_after`, `count_before`)
//! that drive seek pagination. Pure: no I/O, no schema mutation.

use crate::error::PlanError;
use crate::expr::{Expression, ParamPath};
use crate::operator::BinaryOperator;
use crate::stmt::{Count, Direction, OrderByItem, Select};
use ripple_schema::TableSchema;

/// Namespace for cursor-tuple parameters: `cursor.<column>`.
#[must_use]
pub fn cursor_param(column: &str) -> ParamPath {
    ParamPath::new(["cursor", column])
}

/// Namespace for the page-size parameter.
#[must_use]
pub fn limit_param() -> ParamPath {
    ParamPath::field("limit")
}

fn invert(order_by: &[OrderByItem]) -> Vec<OrderByItem> {
    order_by
        .iter()
        .map(|o| OrderByItem::new(o.column.clone(), o.direction.inverted()))
        .collect()
}

/// Validate that `order_by` covers every primary-key column and is
/// uniformly ascending or uniformly descending (spec.md §4.2's
/// `PrimaryKeyMustBeOrdered` / `DirectionsMustAgree` assertions).
pub fn validate_order_by(schema: &TableSchema, order_by: &[OrderByItem]) -> Result<(), PlanError> {
    if order_by.is_empty() {
        return Err(PlanError::EmptyOrderBy);
    }

    let missing: Vec<String> = schema
        .primary_key()
        .iter()
        .filter(|pk| !order_by.iter().any(|o| &o.column == *pk))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(PlanError::PrimaryKeyMustBeOrdered { missing });
    }

    let first_direction = order_by[0].direction;
    if order_by.iter().any(|o| o.direction != first_direction) {
        return Err(PlanError::DirectionsMustAgree);
    }

    Ok(())
}

fn cursor_tuple(order_by: &[OrderByItem]) -> Vec<Expression> {
    order_by.iter().map(|o| Expression::column(o.column.clone())).collect()
}

fn cursor_param_tuple(order_by: &[OrderByItem]) -> Vec<Expression> {
    order_by
        .iter()
        .map(|o| Expression::parameter(cursor_param(&o.column)))
        .collect()
}

fn seek_predicate(order_by: &[OrderByItem], op: BinaryOperator) -> Expression {
    Expression::Tuple(cursor_tuple(order_by)).binop(op, Expression::Tuple(cursor_param_tuple(order_by)))
}

fn and_filter(filter: Option<&Expression>, predicate: Expression) -> Expression {
    match filter {
        Some(f) => f.clone().and(predicate),
        None => predicate,
    }
}

fn projection(order_by: &[OrderByItem]) -> Vec<Expression> {
    order_by.iter().map(|o| Expression::column(o.column.clone())).collect()
}

///
/// Bundle
///
/// The seven prepared-query statements for one `(orderBy, filter)` shape.
///

#[derive(Clone, Debug)]
pub struct Bundle {
    pub load_first: Select,
    pub load_last: Select,
    pub load_next: Select,
    pub load_prev: Select,
    pub count_total: Count,
    pub count_after: Count,
    pub count_before: Count,
}

/// Build the seven-query bundle for `table` given `order_by` and an
/// optional `filter` (spec.md §4.2).
pub fn build_bundle(
    schema: &TableSchema,
    order_by: &[OrderByItem],
    filter: Option<&Expression>,
) -> Result<Bundle, PlanError> {
    validate_order_by(schema, order_by)?;

    let table = schema.name().to_string();
    let inverted = invert(order_by);
    let next_pred = seek_predicate(order_by, BinaryOperator::Gt);
    let prev_pred = seek_predicate(order_by, BinaryOperator::Lt);

    let load_first = Select {
        table: table.clone(),
        columns: projection(order_by),
        where_: filter.cloned(),
        order_by: order_by.to_vec(),
        limit: Some(limit_param().into()),
    };

    let load_last = Select {
        table: table.clone(),
        columns: projection(order_by),
        where_: filter.cloned(),
        order_by: inverted.clone(),
        limit: Some(limit_param().into()),
    };

    let load_next = Select {
        table: table.clone(),
        columns: projection(order_by),
        where_: Some(and_filter(filter, next_pred.clone())),
        order_by: order_by.to_vec(),
        limit: Some(limit_param().into()),
    };

    let load_prev = Select {
        table: table.clone(),
        columns: projection(order_by),
        where_: Some(and_filter(filter, prev_pred.clone())),
        order_by: inverted,
        limit: Some(limit_param().into()),
    };

    let count_total = Count {
        table: table.clone(),
        where_: filter.cloned(),
    };

    let count_after = Count {
        table: table.clone(),
        where_: Some(and_filter(filter, next_pred)),
    };

    let count_before = Count {
        table,
        where_: Some(and_filter(filter, prev_pred)),
    };

    Ok(Bundle {
        load_first,
        load_last,
        load_next,
        load_prev,
        count_total,
        count_after,
        count_before,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_schema::{Column, ColumnKind, TableSchema};

    fn schema() -> TableSchema {
        TableSchema::new(
            "users",
            vec![
                Column::new("id", ColumnKind::Number),
                Column::new("age", ColumnKind::Number),
            ],
            vec!["id".into()],
        )
        .unwrap()
    }

    #[test]
    fn rejects_order_by_missing_primary_key() {
        let order_by = vec![OrderByItem::asc("age")];
        assert_eq!(
            validate_order_by(&schema(), &order_by).unwrap_err(),
            PlanError::PrimaryKeyMustBeOrdered {
                missing: vec!["id".into()]
            }
        );
    }

    #[test]
    fn rejects_mixed_directions() {
        let order_by = vec![OrderByItem::asc("id"), OrderByItem::desc("age")];
        assert_eq!(
            validate_order_by(&schema(), &order_by).unwrap_err(),
            PlanError::DirectionsMustAgree
        );
    }

    #[test]
    fn builds_bundle_for_valid_order_by() {
        let order_by = vec![OrderByItem::asc("id")];
        let bundle = build_bundle(&schema(), &order_by, None).unwrap();
        assert_eq!(bundle.load_last.order_by[0].direction, Direction::Desc);
    }

    #[test]
    fn composite_primary_key_coverage_is_required() {
        let schema = TableSchema::new(
            "composite",
            vec![
                Column::new("id", ColumnKind::Number),
                Column::new("sub_id", ColumnKind::Number),
            ],
            vec!["id".into(), "sub_id".into()],
        )
        .unwrap();
        let order_by = vec![OrderByItem::asc("id")];
        assert_eq!(
            validate_order_by(&schema, &order_by).unwrap_err(),
            PlanError::PrimaryKeyMustBeOrdered {
                missing: vec!["sub_id".into()]
            }
        );
    }
}

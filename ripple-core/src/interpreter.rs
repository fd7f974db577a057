//! Expression interpreter (spec.md §4.6).
//!
//! Evaluates an [`Expression`] against a [`Row`] (and, for expressions
//! carrying bound parameters, a [`BindCtx`] snapshot) to decide whether a
//! mutated row matches a live page's filter. Shares [`operator`] with the
//! compiler so the two never disagree on operator semantics.

use crate::error::InterpError;
use crate::expr::{BindCtx, Expression};
use crate::operator::{apply_binary, apply_unary};
use crate::value::{Row, Value};

/// Evaluate `expr` against `row`, resolving any `Parameter` nodes from `ctx`.
pub fn eval(expr: &Expression, row: &Row, ctx: &BindCtx) -> Result<Value, InterpError> {
    match expr {
        Expression::Column(name) => Ok(row.get(name).cloned().unwrap_or(Value::Null)),
        Expression::Constant(value) => Ok(value.clone()),
        Expression::Parameter(path) => Ok(ctx.get(path)),
        Expression::BinOp(lhs, op, rhs) => {
            let left = eval(lhs, row, ctx)?;
            let right = eval(rhs, row, ctx)?;
            apply_binary(*op, &left, &right)
        }
        Expression::UnOp(op, operand) => {
            let value = eval(operand, row, ctx)?;
            apply_unary(*op, &value)
        }
        Expression::Fn(..) => Err(InterpError::Unsupported { kind: "Fn" }),
        Expression::Tuple(..) => Err(InterpError::Unsupported { kind: "Tuple" }),
        Expression::Asterisk => Err(InterpError::Unsupported { kind: "Asterisk" }),
    }
}

/// Evaluate a boolean filter expression against `row`; `None` filter
/// always matches.
pub fn matches(filter: Option<&Expression>, row: &Row, ctx: &BindCtx) -> Result<bool, InterpError> {
    match filter {
        None => Ok(true),
        Some(expr) => {
            let value = eval(expr, row, ctx)?;
            value.as_bool().ok_or(InterpError::TypeMismatch { op: "filter" })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::BinaryOperator;
    use std::collections::BTreeMap;

    fn row(age: f64) -> Row {
        let mut r = BTreeMap::new();
        r.insert("age".to_string(), Value::Number(age));
        r
    }

    #[test]
    fn evaluates_comparison() {
        let expr = Expression::column("age").binop(BinaryOperator::Eq, Expression::constant(25.0));
        let ctx = BindCtx::new();
        assert_eq!(eval(&expr, &row(25.0), &ctx).unwrap(), Value::Bool(true));
        assert_eq!(eval(&expr, &row(26.0), &ctx).unwrap(), Value::Bool(false));
    }

    #[test]
    fn evaluates_arithmetic_and_power() {
        let expr = Expression::column("age").binop(BinaryOperator::Pow, Expression::constant(2.0));
        let ctx = BindCtx::new();
        assert_eq!(eval(&expr, &row(3.0), &ctx).unwrap(), Value::Number(9.0));
    }

    #[test]
    fn division_is_floating() {
        let expr = Expression::constant(7.0).binop(BinaryOperator::Div, Expression::constant(2.0));
        let ctx = BindCtx::new();
        assert_eq!(eval(&expr, &row(0.0), &ctx).unwrap(), Value::Number(3.5));
    }

    #[test]
    fn unsupported_kinds_raise_interp_unsupported() {
        let expr = Expression::Asterisk;
        let ctx = BindCtx::new();
        assert_eq!(
            eval(&expr, &row(0.0), &ctx).unwrap_err(),
            InterpError::Unsupported { kind: "Asterisk" }
        );
    }
}

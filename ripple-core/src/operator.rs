//! Operator tables shared by the compiler and the interpreter.
//!
//! The compiler (`compile`) renders these operators to SQL text; the
//! interpreter (`interpreter`) evaluates them against a [`Row`]. Both
//! consume the same [`BinaryOperator`]/[`UnaryOperator`] enums and the
//! interpreter's [`apply_binary`]/[`apply_unary`] are the single place the
//! arithmetic/comparison semantics are defined, so the two can never
//! silently diverge (spec.md §4.6: "implements the arithmetic and
//! comparison operators identically").

use crate::error::InterpError;
use crate::value::Value;
use std::cmp::Ordering;

///
/// BinaryOperator
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BinaryOperator {
    Eq,
    Lt,
    Gt,
    Le,
    Ge,
    Ne,
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    And,
    Or,
}

impl BinaryOperator {
    #[must_use]
    pub const fn sql_text(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Ne => "<>",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Pow => "^",
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

///
/// UnaryOperator
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnaryOperator {
    Neg,
    Pos,
    Not,
}

impl UnaryOperator {
    #[must_use]
    pub const fn sql_prefix(self) -> &'static str {
        match self {
            Self::Neg => "-",
            Self::Pos => "+",
            Self::Not => "NOT ",
        }
    }
}

/// Numeric coercion on numbers, strict equality on everything else, per
/// spec.md §4.6.
fn compare(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value, InterpError> {
    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
        _ => left.cmp(right),
    };
    let result = match op {
        BinaryOperator::Eq => left == right,
        BinaryOperator::Ne => left != right,
        BinaryOperator::Lt => ordering == Ordering::Less,
        BinaryOperator::Gt => ordering == Ordering::Greater,
        BinaryOperator::Le => ordering != Ordering::Greater,
        BinaryOperator::Ge => ordering != Ordering::Less,
        _ => unreachable!("compare() called with non-comparison operator"),
    };
    Ok(Value::Bool(result))
}

fn arithmetic(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value, InterpError> {
    let (Some(a), Some(b)) = (left.as_number(), right.as_number()) else {
        return Err(InterpError::TypeMismatch {
            op: op.sql_text(),
        });
    };
    let result = match op {
        BinaryOperator::Add => a + b,
        BinaryOperator::Sub => a - b,
        BinaryOperator::Mul => a * b,
        BinaryOperator::Div => a / b,
        BinaryOperator::Pow => a.powf(b),
        _ => unreachable!("arithmetic() called with non-arithmetic operator"),
    };
    Ok(Value::Number(result))
}

fn logical(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value, InterpError> {
    let (Some(a), Some(b)) = (left.as_bool(), right.as_bool()) else {
        return Err(InterpError::TypeMismatch {
            op: op.sql_text(),
        });
    };
    let result = match op {
        BinaryOperator::And => a && b,
        BinaryOperator::Or => a || b,
        _ => unreachable!("logical() called with non-logical operator"),
    };
    Ok(Value::Bool(result))
}

/// Apply a binary operator to two already-evaluated operands.
pub fn apply_binary(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value, InterpError> {
    match op {
        BinaryOperator::Eq
        | BinaryOperator::Ne
        | BinaryOperator::Lt
        | BinaryOperator::Gt
        | BinaryOperator::Le
        | BinaryOperator::Ge => compare(op, left, right),
        BinaryOperator::Add
        | BinaryOperator::Sub
        | BinaryOperator::Mul
        | BinaryOperator::Div
        | BinaryOperator::Pow => arithmetic(op, left, right),
        BinaryOperator::And | BinaryOperator::Or => logical(op, left, right),
    }
}

/// Apply a unary operator to an already-evaluated operand.
pub fn apply_unary(op: UnaryOperator, value: &Value) -> Result<Value, InterpError> {
    match op {
        UnaryOperator::Neg => value
            .as_number()
            .map(|n| Value::Number(-n))
            .ok_or(InterpError::TypeMismatch { op: "-" }),
        UnaryOperator::Pos => value
            .as_number()
            .map(Value::Number)
            .ok_or(InterpError::TypeMismatch { op: "+" }),
        UnaryOperator::Not => value
            .as_bool()
            .map(|b| Value::Bool(!b))
            .ok_or(InterpError::TypeMismatch { op: "NOT" }),
    }
}

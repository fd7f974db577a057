//! Expression AST (spec.md §3, §4.1).
//!
//! `Parameter` late-binding is modeled as data rather than a closure over a
//! generic context (spec.md §9's "Parameter late-binding via closures"
//! redesign note): a [`ParamPath`] is a small, `Eq`/`Hash`/serializable
//! path descriptor, and a [`BindCtx`] is the flat bag of named values it
//! is resolved against at bind time. This keeps `Expression` itself a
//! plain value type with no ownership and no dependence on a caller's
//! context type.

use crate::operator::{BinaryOperator, UnaryOperator};
use crate::value::Value;
use std::collections::BTreeMap;

///
/// ParamPath
///
/// A dotted path identifying one late-bound value within a [`BindCtx`],
/// e.g. `values.name`, `cursor.id`, `limit`.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ParamPath(Vec<String>);

impl ParamPath {
    #[must_use]
    pub fn new(segments: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self(segments.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn field(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    #[must_use]
    pub fn joined(mut self, segment: impl Into<String>) -> Self {
        self.0.push(segment.into());
        self
    }

    #[must_use]
    pub fn key(&self) -> String {
        self.0.join(".")
    }
}

///
/// BindCtx
///
/// The flat, caller-supplied context a [`ParamPath`] is resolved against.
/// Unresolved paths read as `Value::Null` rather than erroring — a
/// well-formed compiled statement only ever contains paths the caller
/// populated.
///

#[derive(Clone, Debug, Default)]
pub struct BindCtx {
    values: BTreeMap<String, Value>,
}

impl BindCtx {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, path: &ParamPath, value: Value) -> Self {
        self.values.insert(path.key(), value);
        self
    }

    pub fn set(&mut self, path: &ParamPath, value: Value) {
        self.values.insert(path.key(), value);
    }

    #[must_use]
    pub fn get(&self, path: &ParamPath) -> Value {
        self.values.get(&path.key()).cloned().unwrap_or(Value::Null)
    }
}

///
/// Parameterizable
///
/// The union of AST nodes renderable as a single `?` placeholder.
///

#[derive(Clone, Debug)]
pub enum Parameterizable {
    Constant(Value),
    Parameter(ParamPath),
}

impl Parameterizable {
    #[must_use]
    pub fn resolve(&self, ctx: &BindCtx) -> Value {
        match self {
            Self::Constant(value) => value.clone(),
            Self::Parameter(path) => ctx.get(path),
        }
    }
}

impl From<Value> for Parameterizable {
    fn from(value: Value) -> Self {
        Self::Constant(value)
    }
}

impl From<ParamPath> for Parameterizable {
    fn from(path: ParamPath) -> Self {
        Self::Parameter(path)
    }
}

impl From<Parameterizable> for Expression {
    fn from(value: Parameterizable) -> Self {
        match value {
            Parameterizable::Constant(v) => Self::Constant(v),
            Parameterizable::Parameter(p) => Self::Parameter(p),
        }
    }
}

///
/// Expression
///
/// Algebraic sum type over column refs, constants, late-bound parameters,
/// binary/unary operators, n-ary functions, tuples, and the asterisk
/// projection (spec.md §3).
///

#[derive(Clone, Debug)]
pub enum Expression {
    Column(String),
    Constant(Value),
    Parameter(ParamPath),
    BinOp(Box<Self>, BinaryOperator, Box<Self>),
    UnOp(UnaryOperator, Box<Self>),
    Fn(String, Vec<Self>),
    Tuple(Vec<Self>),
    Asterisk,
}

impl Expression {
    #[must_use]
    pub fn column(name: impl Into<String>) -> Self {
        Self::Column(name.into())
    }

    #[must_use]
    pub fn constant(value: impl Into<Value>) -> Self {
        Self::Constant(value.into())
    }

    #[must_use]
    pub fn parameter(path: ParamPath) -> Self {
        Self::Parameter(path)
    }

    #[must_use]
    pub fn binop(self, op: BinaryOperator, rhs: Self) -> Self {
        Self::BinOp(Box::new(self), op, Box::new(rhs))
    }

    #[must_use]
    pub fn unop(op: UnaryOperator, operand: Self) -> Self {
        Self::UnOp(op, Box::new(operand))
    }

    #[must_use]
    pub fn and(self, rhs: Self) -> Self {
        self.binop(BinaryOperator::And, rhs)
    }

    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Column(_) => "Column",
            Self::Constant(_) => "Constant",
            Self::Parameter(_) => "Parameter",
            Self::BinOp(..) => "BinOp",
            Self::UnOp(..) => "UnOp",
            Self::Fn(..) => "Fn",
            Self::Tuple(_) => "Tuple",
            Self::Asterisk => "Asterisk",
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

//! SQL compiler (spec.md §4.1).
//!
//! Renders a [`Statement`] to `(sql_text, parameter schedule)`. The
//! schedule is data, not a closure — [`CompiledStatement::extract`] walks
//! it against a [`BindCtx`] to produce the ordered bind-value list at call
//! time, matching the "parameters are data" redesign note in spec.md §9.

use crate::error::CompileError;
use crate::expr::{BindCtx, Expression, ParamPath, Parameterizable};
use crate::operator::BinaryOperator;
use crate::stmt::{Count, Delete, Insert, Select, Statement, Update};
use crate::value::Value;
use ripple_schema::TableSchema;
use std::fmt::Write as _;

///
/// ScheduleEntry
///
/// One positional `?` placeholder's bind-time descriptor.
///

#[derive(Clone, Debug)]
pub enum ScheduleEntry {
    Constant(Value),
    Parameter(ParamPath),
}

impl ScheduleEntry {
    fn resolve(&self, ctx: &BindCtx) -> Value {
        match self {
            Self::Constant(value) => value.clone(),
            Self::Parameter(path) => ctx.get(path),
        }
    }
}

///
/// CompileOptions
///
/// `row_values` selects between native SQL row-value comparison
/// (`(a, b) > (?, ?)`, the default — spec.md §4.1/§4.2) and the
/// OR-of-AND lowering for backends that lack it (spec.md §9's "Row-tuple
/// comparison in SQL" redesign note).
///

#[derive(Clone, Copy, Debug)]
pub struct CompileOptions {
    pub row_values: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self { row_values: true }
    }
}

///
/// CompiledStatement
///

#[derive(Clone, Debug)]
pub struct CompiledStatement {
    pub sql: String,
    schedule: Vec<ScheduleEntry>,
}

impl CompiledStatement {
    /// Resolve the parameter schedule against `ctx`, in left-to-right
    /// order of appearance in the rendered SQL (spec.md §8, invariant 1).
    #[must_use]
    pub fn extract(&self, ctx: &BindCtx) -> Vec<Value> {
        self.schedule.iter().map(|e| e.resolve(ctx)).collect()
    }

    #[must_use]
    pub fn schedule(&self) -> &[ScheduleEntry] {
        &self.schedule
    }
}

struct Renderer<'a> {
    schema: &'a TableSchema,
    opts: CompileOptions,
    sql: String,
    schedule: Vec<ScheduleEntry>,
}

impl<'a> Renderer<'a> {
    fn new(schema: &'a TableSchema, opts: CompileOptions) -> Self {
        Self {
            schema,
            opts,
            sql: String::new(),
            schedule: Vec::new(),
        }
    }

    fn finish(self) -> CompiledStatement {
        CompiledStatement {
            sql: self.sql,
            schedule: self.schedule,
        }
    }

    fn check_column(&self, name: &str) -> Result<(), CompileError> {
        if self.schema.has_column(name) {
            Ok(())
        } else {
            Err(CompileError::SchemaViolation {
                table: self.schema.name().to_string(),
                name: name.to_string(),
            })
        }
    }

    fn push_placeholder(&mut self, entry: ScheduleEntry) {
        self.sql.push('?');
        self.schedule.push(entry);
    }

    fn render_parameterizable(&mut self, p: &Parameterizable) {
        let entry = match p {
            Parameterizable::Constant(v) => ScheduleEntry::Constant(v.clone()),
            Parameterizable::Parameter(path) => ScheduleEntry::Parameter(path.clone()),
        };
        self.push_placeholder(entry);
    }

    fn render_expr(&mut self, expr: &Expression) -> Result<(), CompileError> {
        match expr {
            Expression::Asterisk => {
                self.sql.push('*');
                Ok(())
            }
            Expression::Column(name) => {
                self.check_column(name)?;
                self.sql.push_str(name);
                Ok(())
            }
            Expression::Constant(value) => {
                self.push_placeholder(ScheduleEntry::Constant(value.clone()));
                Ok(())
            }
            Expression::Parameter(path) => {
                self.push_placeholder(ScheduleEntry::Parameter(path.clone()));
                Ok(())
            }
            Expression::BinOp(lhs, op, rhs) => self.render_binop(lhs, *op, rhs),
            Expression::UnOp(op, operand) => {
                self.sql.push('(');
                self.sql.push_str(op.sql_prefix());
                self.render_expr(operand)?;
                self.sql.push(')');
                Ok(())
            }
            Expression::Fn(name, args) => {
                self.sql.push_str(name);
                self.sql.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        self.sql.push_str(", ");
                    }
                    self.render_expr(arg)?;
                }
                self.sql.push(')');
                Ok(())
            }
            Expression::Tuple(items) => {
                self.sql.push('(');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.sql.push_str(", ");
                    }
                    self.render_expr(item)?;
                }
                self.sql.push(')');
                Ok(())
            }
        }
    }

    fn render_binop(
        &mut self,
        lhs: &Expression,
        op: BinaryOperator,
        rhs: &Expression,
    ) -> Result<(), CompileError> {
        if !self.opts.row_values {
            if let (Expression::Tuple(left), Expression::Tuple(right)) = (lhs, rhs) {
                if matches!(
                    op,
                    BinaryOperator::Gt
                        | BinaryOperator::Lt
                        | BinaryOperator::Ge
                        | BinaryOperator::Le
                ) {
                    let lowered = lower_tuple_compare(left, op, right);
                    return self.render_expr(&lowered);
                }
            }
        }

        self.sql.push('(');
        self.render_expr(lhs)?;
        self.sql.push(' ');
        self.sql.push_str(op.sql_text());
        self.sql.push(' ');
        self.render_expr(rhs)?;
        self.sql.push(')');
        Ok(())
    }

    fn render_order_by(&mut self, items: &[crate::stmt::OrderByItem]) -> Result<(), CompileError> {
        self.sql.push_str(" ORDER BY ");
        for (i, item) in items.iter().enumerate() {
            self.check_column(&item.column)?;
            if i > 0 {
                self.sql.push_str(", ");
            }
            let _ = write!(self.sql, "{} {}", item.column, item.direction.sql_text());
        }
        Ok(())
    }

    fn render_select(&mut self, s: &Select) -> Result<(), CompileError> {
        self.sql.push_str("SELECT ");
        for (i, col) in s.columns.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            self.render_expr(col)?;
        }
        let _ = write!(self.sql, " FROM ({})", s.table);

        if let Some(where_) = &s.where_ {
            self.sql.push_str(" WHERE ");
            self.render_expr(where_)?;
        }
        if !s.order_by.is_empty() {
            self.render_order_by(&s.order_by)?;
        }
        if let Some(limit) = &s.limit {
            self.sql.push_str(" LIMIT ");
            self.render_parameterizable(limit);
        }
        Ok(())
    }

    fn render_count(&mut self, c: &Count) -> Result<(), CompileError> {
        let _ = write!(self.sql, "SELECT COUNT(*) FROM ({})", c.table);
        if let Some(where_) = &c.where_ {
            self.sql.push_str(" WHERE ");
            self.render_expr(where_)?;
        }
        Ok(())
    }

    fn render_insert(&mut self, ins: &Insert) -> Result<(), CompileError> {
        for (col, _) in &ins.values {
            self.check_column(col)?;
        }
        let cols: Vec<&str> = ins.values.iter().map(|(c, _)| c.as_str()).collect();
        let _ = write!(self.sql, "INSERT INTO {} ({}) VALUES (", ins.table, cols.join(", "));
        for (i, (_, value)) in ins.values.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            self.render_parameterizable(value);
        }
        self.sql.push(')');

        if let Some(conflict) = &ins.on_conflict {
            let _ = write!(self.sql, " ON CONFLICT ({}) DO UPDATE SET ", conflict.columns.join(", "));
            for (i, (col, value)) in conflict.update_set.iter().enumerate() {
                self.check_column(col)?;
                if i > 0 {
                    self.sql.push_str(", ");
                }
                let _ = write!(self.sql, "{col} = ");
                self.render_parameterizable(value);
            }
        }
        Ok(())
    }

    fn render_update(&mut self, upd: &Update) -> Result<(), CompileError> {
        for (col, _) in upd.set.iter().chain(upd.key.iter()) {
            self.check_column(col)?;
        }
        self.sql.push_str("UPDATE ");
        self.sql.push_str(&upd.table);
        self.sql.push_str(" SET ");
        for (i, (col, value)) in upd.set.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            let _ = write!(self.sql, "{col} = ");
            self.render_parameterizable(value);
        }
        self.sql.push_str(" WHERE ");
        for (i, (col, value)) in upd.key.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(" AND ");
            }
            let _ = write!(self.sql, "{col} = ");
            self.render_parameterizable(value);
        }
        Ok(())
    }

    fn render_delete(&mut self, del: &Delete) -> Result<(), CompileError> {
        for (col, _) in &del.key {
            self.check_column(col)?;
        }
        let _ = write!(self.sql, "DELETE FROM {} WHERE ", del.table);
        for (i, (col, value)) in del.key.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(" AND ");
            }
            let _ = write!(self.sql, "{col} = ");
            self.render_parameterizable(value);
        }
        Ok(())
    }
}

/// Compile `stmt` against `schema` into rendered SQL plus a parameter
/// schedule.
#[tracing::instrument(skip(schema, stmt, opts), fields(table = schema.name()))]
pub fn compile(
    schema: &TableSchema,
    stmt: &Statement,
    opts: CompileOptions,
) -> Result<CompiledStatement, CompileError> {
    let mut renderer = Renderer::new(schema, opts);
    match stmt {
        Statement::Select(s) => renderer.render_select(s)?,
        Statement::Count(c) => renderer.render_count(c)?,
        Statement::Insert(i) => renderer.render_insert(i)?,
        Statement::Update(u) => renderer.render_update(u)?,
        Statement::Delete(d) => renderer.render_delete(d)?,
    }
    let compiled = renderer.finish();
    tracing::trace!(sql = %compiled.sql, "statement compiled");
    Ok(compiled)
}

/// Lower a row-value comparison `left <op> right` (both tuples of equal
/// length) into the generalized OR-of-AND expansion for backends without
/// row-value comparison support (spec.md §9).
///
/// For `k` columns: `L > R` becomes
/// `l0 > r0 OR (l0 = r0 AND (l1 > r1 OR (l1 = r1 AND (... lk-1 > rk-1))))`,
/// with `>=`/`<=` expanded as `(strict) OR (all-equal)`.
#[must_use]
pub fn lower_tuple_compare(
    left: &[Expression],
    op: BinaryOperator,
    right: &[Expression],
) -> Expression {
    assert_eq!(left.len(), right.len(), "tuple comparison arity mismatch");

    let (strict_op, or_equal) = match op {
        BinaryOperator::Gt => (BinaryOperator::Gt, false),
        BinaryOperator::Lt => (BinaryOperator::Lt, false),
        BinaryOperator::Ge => (BinaryOperator::Gt, true),
        BinaryOperator::Le => (BinaryOperator::Lt, true),
        _ => unreachable!("lower_tuple_compare called with non-ordering operator"),
    };

    let strict = lower_strict(left, strict_op, right);
    if or_equal {
        let all_equal = all_equal_expr(left, right);
        strict.binop(BinaryOperator::Or, all_equal)
    } else {
        strict
    }
}

fn lower_strict(left: &[Expression], op: BinaryOperator, right: &[Expression]) -> Expression {
    let (l0, lrest) = left.split_first().expect("non-empty tuple");
    let (r0, rrest) = right.split_first().expect("non-empty tuple");

    let head = l0.clone().binop(op, r0.clone());
    if lrest.is_empty() {
        return head;
    }

    let eq = l0.clone().binop(BinaryOperator::Eq, r0.clone());
    let tail = lower_strict(lrest, op, rrest);
    head.binop(BinaryOperator::Or, eq.binop(BinaryOperator::And, tail))
}

fn all_equal_expr(left: &[Expression], right: &[Expression]) -> Expression {
    left.iter()
        .zip(right.iter())
        .map(|(l, r)| l.clone().binop(BinaryOperator::Eq, r.clone()))
        .reduce(|acc, next| acc.binop(BinaryOperator::And, next))
        .expect("non-empty tuple")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ParamPath;
    use ripple_schema::{Column, ColumnKind, TableSchema};

    fn schema() -> TableSchema {
        TableSchema::new(
            "users",
            vec![
                Column::new("id", ColumnKind::Number),
                Column::new("name", ColumnKind::String),
                Column::new("age", ColumnKind::Number),
            ],
            vec!["id".into()],
        )
        .unwrap()
    }

    #[test]
    fn binop_is_always_parenthesized() {
        let expr = Expression::column("age").binop(BinaryOperator::Eq, Expression::constant(1.0));
        let stmt = Statement::Select(Select {
            table: "users".into(),
            columns: vec![Expression::Asterisk],
            where_: Some(expr),
            order_by: vec![],
            limit: None,
        });
        let compiled = compile(&schema(), &stmt, CompileOptions::default()).unwrap();
        assert!(compiled.sql.contains("(age = ?)"));
    }

    #[test]
    fn select_renders_order_by_and_limit() {
        let stmt = Statement::Select(Select {
            table: "users".into(),
            columns: vec![Expression::Asterisk],
            where_: None,
            order_by: vec![crate::stmt::OrderByItem::asc("id")],
            limit: Some(Parameterizable::Constant(Value::Number(5.0))),
        });
        let compiled = compile(&schema(), &stmt, CompileOptions::default()).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT * FROM (users) ORDER BY id asc LIMIT ?"
        );
        assert_eq!(compiled.extract(&BindCtx::new()), vec![Value::Number(5.0)]);
    }

    #[test]
    fn insert_params_follow_column_order() {
        let stmt = Statement::Insert(Insert {
            table: "users".into(),
            values: vec![
                ("id".into(), Parameterizable::Constant(Value::Number(1.0))),
                ("name".into(), Parameterizable::Constant(Value::String("a".into()))),
            ],
            on_conflict: None,
        });
        let compiled = compile(&schema(), &stmt, CompileOptions::default()).unwrap();
        assert_eq!(compiled.sql, "INSERT INTO users (id, name) VALUES (?, ?)");
        assert_eq!(
            compiled.extract(&BindCtx::new()),
            vec![Value::Number(1.0), Value::String("a".into())]
        );
    }

    #[test]
    fn update_params_are_set_then_key() {
        let stmt = Statement::Update(Update {
            table: "users".into(),
            set: vec![("name".into(), Parameterizable::Constant(Value::String("b".into())))],
            key: vec![("id".into(), Parameterizable::Constant(Value::Number(7.0)))],
        });
        let compiled = compile(&schema(), &stmt, CompileOptions::default()).unwrap();
        assert_eq!(compiled.sql, "UPDATE users SET name = ? WHERE id = ?");
        assert_eq!(
            compiled.extract(&BindCtx::new()),
            vec![Value::String("b".into()), Value::Number(7.0)]
        );
    }

    #[test]
    fn unknown_column_is_schema_violation() {
        let stmt = Statement::Delete(Delete {
            table: "users".into(),
            key: vec![("missing".into(), Parameterizable::Constant(Value::Number(1.0)))],
        });
        let err = compile(&schema(), &stmt, CompileOptions::default()).unwrap_err();
        assert_eq!(
            err,
            CompileError::SchemaViolation {
                table: "users".into(),
                name: "missing".into()
            }
        );
    }

    #[test]
    fn parameter_extraction_resolves_from_ctx() {
        let path = ParamPath::field("limit");
        let stmt = Statement::Select(Select {
            table: "users".into(),
            columns: vec![Expression::Asterisk],
            where_: None,
            order_by: vec![],
            limit: Some(Parameterizable::Parameter(path.clone())),
        });
        let compiled = compile(&schema(), &stmt, CompileOptions::default()).unwrap();
        let ctx = BindCtx::new().with(&path, Value::Number(10.0));
        assert_eq!(compiled.extract(&ctx), vec![Value::Number(10.0)]);
    }

    #[test]
    fn row_value_lowering_expands_to_or_of_and() {
        let left = vec![Expression::column("id"), Expression::column("age")];
        let right = vec![Expression::constant(1.0), Expression::constant(2.0)];
        let lowered = lower_tuple_compare(&left, BinaryOperator::Gt, &right);
        // Rendered shape should not contain a literal row-value tuple.
        let stmt = Statement::Select(Select {
            table: "users".into(),
            columns: vec![Expression::Asterisk],
            where_: Some(lowered),
            order_by: vec![],
            limit: None,
        });
        let compiled = compile(&schema(), &stmt, CompileOptions::default()).unwrap();
        assert!(compiled.sql.contains("OR"));
        assert!(compiled.sql.contains("AND"));
    }
}

//! `MemoryBackend`: an in-process reference [`Backend`] implementation.
//!
//! Not part of the spec's public contract — storage backends are an
//! external collaborator (spec.md §1) — but every real backend needs
//! something to conform to, and the crate's own tests need a `Backend` to
//! run against. `MemoryBackend` stores rows in a `BTreeMap` keyed by table
//! name and interprets the compiler's rendered SQL text with a small
//! recursive-descent parser limited to the grammar this crate's own
//! compiler ever emits (no string literals, no subqueries, no joins).
//! Filter evaluation reuses [`crate::interpreter`] so the backend never
//! defines operator semantics of its own.

use super::{Backend, RunResult, StatementHandle};
use crate::error::StorageError;
use crate::expr::{BindCtx, Expression, ParamPath};
use crate::interpreter;
use crate::operator::{BinaryOperator, UnaryOperator};
use crate::stmt::{Direction, OrderByItem};
use crate::value::{Row, Value};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::rc::Rc;

type Tables = Rc<RefCell<BTreeMap<String, Vec<Row>>>>;

fn pos_path(index: usize) -> ParamPath {
    ParamPath::new(["$pos", index.to_string()])
}

fn params_ctx(params: &[Value]) -> BindCtx {
    params
        .iter()
        .enumerate()
        .fold(BindCtx::new(), |ctx, (i, v)| ctx.with(&pos_path(i), v.clone()))
}

///
/// MemoryBackend
///

#[derive(Clone, Default)]
pub struct MemoryBackend {
    tables: Tables,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for MemoryBackend {
    type Statement = MemoryStatement;

    fn prepare(&self, sql: &str) -> Result<Self::Statement, StorageError> {
        let parsed = parser::parse(sql)?;
        Ok(MemoryStatement {
            tables: Rc::clone(&self.tables),
            parsed,
        })
    }

    fn transaction(
        &self,
        f: &mut dyn FnMut() -> Result<(), StorageError>,
    ) -> Result<(), StorageError> {
        let snapshot = self.tables.borrow().clone();
        match f() {
            Ok(()) => Ok(()),
            Err(err) => {
                *self.tables.borrow_mut() = snapshot;
                Err(err)
            }
        }
    }
}

#[derive(Clone, Debug)]
enum SelectColumns {
    All,
    Named(Vec<String>),
}

#[derive(Clone, Debug)]
struct OnConflictSpec {
    key_columns: Vec<String>,
    set_columns: Vec<String>,
}

#[derive(Clone, Debug)]
enum ParsedStatement {
    Select {
        table: String,
        columns: SelectColumns,
        filter: Option<Expression>,
        order_by: Vec<OrderByItem>,
        has_limit: bool,
    },
    Count {
        table: String,
        filter: Option<Expression>,
    },
    Insert {
        table: String,
        columns: Vec<String>,
        on_conflict: Option<OnConflictSpec>,
    },
    Update {
        table: String,
        set_columns: Vec<String>,
        key_columns: Vec<String>,
    },
    Delete {
        table: String,
        key_columns: Vec<String>,
    },
}

///
/// MemoryStatement
///

pub struct MemoryStatement {
    tables: Tables,
    parsed: ParsedStatement,
}

impl MemoryStatement {
    fn table_rows(&self, table: &str) -> Vec<Row> {
        self.tables.borrow().get(table).cloned().unwrap_or_default()
    }

    fn select_rows(&self, params: &[Value]) -> Result<Vec<Row>, StorageError> {
        let ParsedStatement::Select {
            table,
            columns,
            filter,
            order_by,
            has_limit,
        } = &self.parsed
        else {
            return Err(StorageError::new("statement is not a select"));
        };

        let ctx = params_ctx(params);
        let mut matched = Vec::new();
        for row in self.table_rows(table) {
            if interpreter::matches(filter.as_ref(), &row, &ctx).map_err(|e| StorageError::new(e.to_string()))? {
                matched.push(row);
            }
        }

        if !order_by.is_empty() {
            matched.sort_by(|a, b| compare_by_order(a, b, order_by));
        }

        if *has_limit {
            if let Some(limit) = params.last().and_then(Value::as_number) {
                matched.truncate(limit as usize);
            }
        }

        Ok(match columns {
            SelectColumns::All => matched,
            SelectColumns::Named(names) => matched.into_iter().map(|row| project_named(&row, names)).collect(),
        })
    }

    fn count_rows(&self, table: &str, filter: &Option<Expression>, params: &[Value]) -> Result<usize, StorageError> {
        let ctx = params_ctx(params);
        let mut n = 0;
        for row in self.table_rows(table) {
            if interpreter::matches(filter.as_ref(), &row, &ctx).map_err(|e| StorageError::new(e.to_string()))? {
                n += 1;
            }
        }
        Ok(n)
    }

    fn run_insert(
        &self,
        table: &str,
        columns: &[String],
        on_conflict: &Option<OnConflictSpec>,
        params: &[Value],
    ) -> Result<RunResult, StorageError> {
        let mut row: Row = BTreeMap::new();
        for (col, value) in columns.iter().zip(params.iter()) {
            row.insert(col.clone(), value.clone());
        }

        let mut tables = self.tables.borrow_mut();
        let rows = tables.entry(table.to_string()).or_default();

        if let Some(spec) = on_conflict {
            let existing = rows
                .iter_mut()
                .find(|existing| spec.key_columns.iter().all(|k| existing.get(k) == row.get(k)));
            if let Some(existing) = existing {
                let set_params = &params[columns.len()..];
                for (col, value) in spec.set_columns.iter().zip(set_params.iter()) {
                    existing.insert(col.clone(), value.clone());
                }
                return Ok(RunResult { rows_changed: 1 });
            }
        }

        rows.push(row);
        Ok(RunResult { rows_changed: 1 })
    }

    fn run_update(
        &self,
        table: &str,
        set_columns: &[String],
        key_columns: &[String],
        params: &[Value],
    ) -> Result<RunResult, StorageError> {
        let set_params = &params[..set_columns.len()];
        let key_params = &params[set_columns.len()..set_columns.len() + key_columns.len()];

        let mut tables = self.tables.borrow_mut();
        let mut changed = 0;
        if let Some(rows) = tables.get_mut(table) {
            for row in rows.iter_mut() {
                let key_matches = key_columns.iter().zip(key_params.iter()).all(|(k, v)| row.get(k) == Some(v));
                if key_matches {
                    for (col, value) in set_columns.iter().zip(set_params.iter()) {
                        row.insert(col.clone(), value.clone());
                    }
                    changed += 1;
                }
            }
        }
        Ok(RunResult { rows_changed: changed })
    }

    fn run_delete(&self, table: &str, key_columns: &[String], params: &[Value]) -> Result<RunResult, StorageError> {
        let mut tables = self.tables.borrow_mut();
        let mut changed = 0;
        if let Some(rows) = tables.get_mut(table) {
            let before = rows.len();
            rows.retain(|row| !key_columns.iter().zip(params.iter()).all(|(k, v)| row.get(k) == Some(v)));
            changed = before - rows.len();
        }
        Ok(RunResult { rows_changed: changed })
    }
}

fn compare_by_order(a: &Row, b: &Row, order_by: &[OrderByItem]) -> Ordering {
    for item in order_by {
        let av = a.get(&item.column).cloned().unwrap_or(Value::Null);
        let bv = b.get(&item.column).cloned().unwrap_or(Value::Null);
        let ord = av.cmp(&bv);
        let ord = if item.direction == Direction::Desc { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn project_named(row: &Row, names: &[String]) -> Row {
    names.iter().map(|n| (n.clone(), row.get(n).cloned().unwrap_or(Value::Null))).collect()
}

impl StatementHandle for MemoryStatement {
    fn get(&self, params: &[Value]) -> Result<Option<Row>, StorageError> {
        match &self.parsed {
            ParsedStatement::Select { .. } => Ok(self.select_rows(params)?.into_iter().next()),
            ParsedStatement::Count { table, filter } => {
                let n = self.count_rows(table, filter, params)?;
                let mut row: Row = BTreeMap::new();
                row.insert("count".to_string(), Value::Number(n as f64));
                Ok(Some(row))
            }
            _ => Err(StorageError::new("get() is only supported for select/count statements")),
        }
    }

    fn all(&self, params: &[Value]) -> Result<Vec<Row>, StorageError> {
        match &self.parsed {
            ParsedStatement::Select { .. } => self.select_rows(params),
            _ => Err(StorageError::new("all() is only supported for select statements")),
        }
    }

    fn run(&self, params: &[Value]) -> Result<RunResult, StorageError> {
        match &self.parsed {
            ParsedStatement::Insert { table, columns, on_conflict } => self.run_insert(table, columns, on_conflict, params),
            ParsedStatement::Update { table, set_columns, key_columns } => self.run_update(table, set_columns, key_columns, params),
            ParsedStatement::Delete { table, key_columns } => self.run_delete(table, key_columns, params),
            _ => Err(StorageError::new("run() is only supported for mutation statements")),
        }
    }
}

/// A tiny recursive-descent parser for the fixed grammar [`crate::compile`]
/// emits. Not a general SQL parser: there are no string/numeric literals
/// (every constant renders as a `?` placeholder), no joins, no subqueries.
mod parser {
    use super::{pos_path, OnConflictSpec, ParsedStatement, SelectColumns};
    use crate::error::StorageError;
    use crate::expr::Expression;
    use crate::operator::{BinaryOperator, UnaryOperator};
    use crate::stmt::{Direction, OrderByItem};

    fn tokenize(sql: &str) -> Vec<String> {
        let chars: Vec<char> = sql.chars().collect();
        let mut tokens = Vec::new();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c.is_whitespace() {
                i += 1;
                continue;
            }
            match c {
                '(' | ')' | ',' | '?' | '*' | '+' | '^' | '/' | '-' => {
                    tokens.push(c.to_string());
                    i += 1;
                }
                '=' => {
                    tokens.push("=".to_string());
                    i += 1;
                }
                '<' => {
                    if chars.get(i + 1) == Some(&'=') {
                        tokens.push("<=".to_string());
                        i += 2;
                    } else if chars.get(i + 1) == Some(&'>') {
                        tokens.push("<>".to_string());
                        i += 2;
                    } else {
                        tokens.push("<".to_string());
                        i += 1;
                    }
                }
                '>' => {
                    if chars.get(i + 1) == Some(&'=') {
                        tokens.push(">=".to_string());
                        i += 2;
                    } else {
                        tokens.push(">".to_string());
                        i += 1;
                    }
                }
                _ if c.is_alphanumeric() || c == '_' => {
                    let start = i;
                    while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                        i += 1;
                    }
                    tokens.push(chars[start..i].iter().collect());
                }
                _ => i += 1,
            }
        }
        tokens
    }

    fn binop_from_token(tok: &str) -> Option<BinaryOperator> {
        Some(match tok {
            "=" => BinaryOperator::Eq,
            "<" => BinaryOperator::Lt,
            ">" => BinaryOperator::Gt,
            "<=" => BinaryOperator::Le,
            ">=" => BinaryOperator::Ge,
            "<>" => BinaryOperator::Ne,
            "+" => BinaryOperator::Add,
            "-" => BinaryOperator::Sub,
            "*" => BinaryOperator::Mul,
            "/" => BinaryOperator::Div,
            "^" => BinaryOperator::Pow,
            "AND" => BinaryOperator::And,
            "OR" => BinaryOperator::Or,
            _ => return None,
        })
    }

    struct Parser<'t> {
        tokens: &'t [String],
        pos: usize,
        placeholders: usize,
    }

    impl<'t> Parser<'t> {
        fn peek(&self) -> Option<&str> {
            self.tokens.get(self.pos).map(String::as_str)
        }

        fn next(&mut self) -> Result<String, StorageError> {
            let tok = self
                .tokens
                .get(self.pos)
                .cloned()
                .ok_or_else(|| StorageError::new("unexpected end of statement"))?;
            self.pos += 1;
            Ok(tok)
        }

        fn expect(&mut self, expected: &str) -> Result<(), StorageError> {
            let tok = self.next()?;
            if tok == expected {
                Ok(())
            } else {
                Err(StorageError::new(format!("expected `{expected}`, found `{tok}`")))
            }
        }

        fn next_placeholder(&mut self) -> Expression {
            let idx = self.placeholders;
            self.placeholders += 1;
            Expression::parameter(pos_path(idx))
        }

        fn parse_expr(&mut self) -> Result<Expression, StorageError> {
            match self.next()?.as_str() {
                "(" => self.parse_parenthesized(),
                "?" => Ok(self.next_placeholder()),
                "*" => Ok(Expression::Asterisk),
                ident => Ok(Expression::column(ident.to_string())),
            }
        }

        fn parse_parenthesized(&mut self) -> Result<Expression, StorageError> {
            match self.peek() {
                Some("NOT") => {
                    self.pos += 1;
                    let operand = self.parse_expr()?;
                    self.expect(")")?;
                    Ok(Expression::unop(UnaryOperator::Not, operand))
                }
                Some("-") => {
                    self.pos += 1;
                    let operand = self.parse_expr()?;
                    self.expect(")")?;
                    Ok(Expression::unop(UnaryOperator::Neg, operand))
                }
                Some("+") => {
                    self.pos += 1;
                    let operand = self.parse_expr()?;
                    self.expect(")")?;
                    Ok(Expression::unop(UnaryOperator::Pos, operand))
                }
                _ => {
                    let lhs = self.parse_expr()?;
                    let expr = match self.peek().and_then(binop_from_token) {
                        Some(op) => {
                            self.pos += 1;
                            let rhs = self.parse_expr()?;
                            lhs.binop(op, rhs)
                        }
                        None => lhs,
                    };
                    self.expect(")")?;
                    Ok(expr)
                }
            }
        }

        fn parse_equality_chain(&mut self, join: &str) -> Result<Vec<String>, StorageError> {
            let mut columns = Vec::new();
            loop {
                let col = self.next()?;
                self.expect("=")?;
                self.expect("?")?;
                self.placeholders += 1;
                columns.push(col);
                if self.peek() == Some(join) {
                    self.pos += 1;
                    continue;
                }
                break;
            }
            Ok(columns)
        }

        fn parse_select(&mut self) -> Result<ParsedStatement, StorageError> {
            self.expect("SELECT")?;
            let columns = if self.peek() == Some("*") {
                self.pos += 1;
                SelectColumns::All
            } else {
                let mut cols = vec![self.next()?];
                while self.peek() == Some(",") {
                    self.pos += 1;
                    cols.push(self.next()?);
                }
                SelectColumns::Named(cols)
            };
            self.expect("FROM")?;
            self.expect("(")?;
            let table = self.next()?;
            self.expect(")")?;

            let filter = if self.peek() == Some("WHERE") {
                self.pos += 1;
                Some(self.parse_expr()?)
            } else {
                None
            };

            let mut order_by = Vec::new();
            if self.peek() == Some("ORDER") {
                self.pos += 1;
                self.expect("BY")?;
                loop {
                    let col = self.next()?;
                    let dir_tok = self.next()?;
                    let dir = if dir_tok == "asc" { Direction::Asc } else { Direction::Desc };
                    order_by.push(OrderByItem::new(col, dir));
                    if self.peek() == Some(",") {
                        self.pos += 1;
                        continue;
                    }
                    break;
                }
            }

            let has_limit = if self.peek() == Some("LIMIT") {
                self.pos += 1;
                self.expect("?")?;
                self.placeholders += 1;
                true
            } else {
                false
            };

            Ok(ParsedStatement::Select {
                table,
                columns,
                filter,
                order_by,
                has_limit,
            })
        }

        fn parse_count(&mut self) -> Result<ParsedStatement, StorageError> {
            self.expect("SELECT")?;
            self.expect("COUNT")?;
            self.expect("(")?;
            self.expect("*")?;
            self.expect(")")?;
            self.expect("FROM")?;
            self.expect("(")?;
            let table = self.next()?;
            self.expect(")")?;
            let filter = if self.peek() == Some("WHERE") {
                self.pos += 1;
                Some(self.parse_expr()?)
            } else {
                None
            };
            Ok(ParsedStatement::Count { table, filter })
        }

        fn parse_insert(&mut self) -> Result<ParsedStatement, StorageError> {
            self.expect("INSERT")?;
            self.expect("INTO")?;
            let table = self.next()?;
            self.expect("(")?;
            let mut columns = vec![self.next()?];
            while self.peek() == Some(",") {
                self.pos += 1;
                columns.push(self.next()?);
            }
            self.expect(")")?;
            self.expect("VALUES")?;
            self.expect("(")?;
            self.expect("?")?;
            self.placeholders += 1;
            for _ in 1..columns.len() {
                self.expect(",")?;
                self.expect("?")?;
                self.placeholders += 1;
            }
            self.expect(")")?;

            let on_conflict = if self.peek() == Some("ON") {
                self.pos += 1;
                self.expect("CONFLICT")?;
                self.expect("(")?;
                let mut key_columns = vec![self.next()?];
                while self.peek() == Some(",") {
                    self.pos += 1;
                    key_columns.push(self.next()?);
                }
                self.expect(")")?;
                self.expect("DO")?;
                self.expect("UPDATE")?;
                self.expect("SET")?;
                let set_columns = self.parse_equality_chain(",")?;
                Some(OnConflictSpec { key_columns, set_columns })
            } else {
                None
            };

            Ok(ParsedStatement::Insert { table, columns, on_conflict })
        }

        fn parse_update(&mut self) -> Result<ParsedStatement, StorageError> {
            self.expect("UPDATE")?;
            let table = self.next()?;
            self.expect("SET")?;
            let set_columns = self.parse_equality_chain(",")?;
            self.expect("WHERE")?;
            let key_columns = self.parse_equality_chain("AND")?;
            Ok(ParsedStatement::Update { table, set_columns, key_columns })
        }

        fn parse_delete(&mut self) -> Result<ParsedStatement, StorageError> {
            self.expect("DELETE")?;
            self.expect("FROM")?;
            let table = self.next()?;
            self.expect("WHERE")?;
            let key_columns = self.parse_equality_chain("AND")?;
            Ok(ParsedStatement::Delete { table, key_columns })
        }
    }

    pub(super) fn parse(sql: &str) -> Result<ParsedStatement, StorageError> {
        let tokens = tokenize(sql);
        let mut parser = Parser { tokens: &tokens, pos: 0, placeholders: 0 };
        match parser.peek() {
            Some("SELECT") => {
                if tokens.get(1).map(String::as_str) == Some("COUNT") {
                    parser.parse_count()
                } else {
                    parser.parse_select()
                }
            }
            Some("INSERT") => parser.parse_insert(),
            Some("UPDATE") => parser.parse_update(),
            Some("DELETE") => parser.parse_delete(),
            _ => Err(StorageError::new(format!("unrecognized statement: {sql}"))),
        }
    }
}

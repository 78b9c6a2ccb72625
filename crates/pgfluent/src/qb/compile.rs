//! Compilation of a [`StatementModel`] into SQL text plus ordered bindings.
//!
//! Every form renders its clauses left to right into one [`Bindings`] list, so
//! placeholder `$i` is always filled by binding `i`. For mutations this makes
//! SET values precede WHERE values without any bookkeeping.
//!
//! Canonical SELECT clause order:
//! `SELECT … FROM … JOIN … WHERE … GROUP BY … HAVING … ORDER BY … LIMIT … OFFSET …`

use crate::error::{DbError, DbResult};
use crate::ident::Ident;
use crate::qb::expr::{Connector, Expr, Where};
use crate::qb::param::{Bindings, count_placeholders, params_ref};
use crate::qb::statement::StatementModel;
use crate::value::Value;
use std::fmt::Write as _;
use tokio_postgres::types::ToSql;

/// What a compiled statement does; backends use it to pick a result path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl StatementKind {
    pub fn returns_rows(self) -> bool {
        matches!(self, StatementKind::Select)
    }
}

/// An immutable `(sql, bindings)` pair ready for a backend.
#[derive(Clone, Debug, PartialEq)]
pub struct Compiled {
    pub sql: String,
    pub bindings: Vec<Value>,
    pub kind: StatementKind,
}

impl Compiled {
    /// Wrap hand-written SQL that uses `$n` placeholders.
    pub fn new(sql: impl Into<String>, bindings: Vec<Value>, kind: StatementKind) -> Self {
        Self {
            sql: sql.into(),
            bindings,
            kind,
        }
    }

    pub fn params_ref(&self) -> Vec<&(dyn ToSql + Sync)> {
        params_ref(&self.bindings)
    }
}

/// Aggregate functions supported by `aggregate`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Aggregate {
    Count,
    Max,
    Min,
    Avg,
    Sum,
}

impl Aggregate {
    pub fn as_sql(self) -> &'static str {
        match self {
            Aggregate::Count => "COUNT",
            Aggregate::Max => "MAX",
            Aggregate::Min => "MIN",
            Aggregate::Avg => "AVG",
            Aggregate::Sum => "SUM",
        }
    }
}

fn finish(sql: String, bindings: Bindings, kind: StatementKind) -> DbResult<Compiled> {
    let placeholders = count_placeholders(&sql);
    if placeholders != bindings.len() {
        return Err(DbError::validation(format!(
            "statement has {placeholders} placeholders but {} bound values",
            bindings.len()
        )));
    }
    Ok(Compiled {
        sql,
        bindings: bindings.into_vec(),
        kind,
    })
}

/// Validate row keys and render them as column identifiers.
fn column_list(row: &[(String, Value)]) -> DbResult<Vec<String>> {
    row.iter()
        .map(|(column, _)| Ident::parse(column).map(|i| i.to_sql()))
        .collect()
}

fn lookup<'a>(row: &'a [(String, Value)], column: &str) -> Option<&'a Value> {
    row.iter().find(|(c, _)| c == column).map(|(_, v)| v)
}

impl StatementModel {
    fn render_joins_and_where(&self, sql: &mut String, b: &mut Bindings) {
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.build(b));
        }
        let predicates = self.predicates.build(b);
        if !predicates.is_empty() {
            let _ = write!(sql, " WHERE {predicates}");
        }
    }

    fn render_grouping(&self, sql: &mut String, b: &mut Bindings) {
        if !self.group_by.is_empty() {
            let _ = write!(sql, " GROUP BY {}", self.group_by.join(", "));
        }
        let having = self.having.build(b);
        if !having.is_empty() {
            let _ = write!(sql, " HAVING {having}");
        }
    }

    fn render_order_and_limit(&self, sql: &mut String) {
        if !self.order_by.is_empty() {
            let order = self
                .order_by
                .iter()
                .map(|(column, dir)| format!("{column} {}", dir.as_sql()))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = write!(sql, " ORDER BY {order}");
        }
        if let Some(limit) = self.limit {
            let _ = write!(sql, " LIMIT {}", limit.count);
            if limit.offset > 0 {
                let _ = write!(sql, " OFFSET {}", limit.offset);
            }
        }
    }

    pub(crate) fn render_select(&self, b: &mut Bindings) -> String {
        let mut sql = format!("SELECT {} FROM {}", self.columns_sql(), self.from_sql());
        self.render_joins_and_where(&mut sql, b);
        self.render_grouping(&mut sql, b);
        self.render_order_and_limit(&mut sql);
        sql
    }

    /// Row filter for UPDATE/DELETE. A limit is applied through a `ctid` subquery.
    fn render_mutation_filter(&self, filter: &Where, sql: &mut String, b: &mut Bindings) {
        let predicates = filter.build(b);
        match self.limit {
            None if predicates.is_empty() => {}
            None => {
                let _ = write!(sql, " WHERE {predicates}");
            }
            Some(_) => {
                let _ = write!(sql, " WHERE ctid IN (SELECT ctid FROM {}", self.from_sql());
                if !predicates.is_empty() {
                    let _ = write!(sql, " WHERE {predicates}");
                }
                self.render_order_and_limit(sql);
                sql.push(')');
            }
        }
    }

    /// Refuse a destructive statement that has neither a predicate nor a limit.
    pub(crate) fn guard(&self, operation: &str) -> DbResult<()> {
        if self.is_guarded() {
            Ok(())
        } else {
            Err(DbError::guard(format!(
                "refusing to {operation} `{}` without a WHERE clause or LIMIT",
                self.table
            )))
        }
    }

    fn reject_joins(&self, operation: &str) -> DbResult<()> {
        if self.joins.is_empty() {
            Ok(())
        } else {
            Err(DbError::validation(format!(
                "{operation} does not support joins"
            )))
        }
    }

    pub fn compile_select(&self) -> DbResult<Compiled> {
        self.validate()?;
        let mut b = Bindings::new();
        let sql = self.render_select(&mut b);
        finish(sql, b, StatementKind::Select)
    }

    /// `SELECT FN(column) AS aggregate …`. ORDER BY is dropped.
    ///
    /// A grouped or limited COUNT counts the rows of the inner query instead.
    pub fn compile_aggregate(&self, function: Aggregate, column: &str) -> DbResult<Compiled> {
        self.validate()?;
        let mut b = Bindings::new();
        let wrap = function == Aggregate::Count && (!self.group_by.is_empty() || self.limit.is_some());
        let sql = if wrap {
            let projection = if !self.columns.is_empty() {
                self.columns.join(", ")
            } else if !self.group_by.is_empty() {
                self.group_by.join(", ")
            } else {
                "*".to_string()
            };
            let mut inner = format!("SELECT {projection} FROM {}", self.from_sql());
            self.render_joins_and_where(&mut inner, &mut b);
            self.render_grouping(&mut inner, &mut b);
            self.render_order_and_limit(&mut inner);
            format!("SELECT COUNT(*) AS aggregate FROM ({inner}) AS aggregate_source")
        } else {
            let mut sql = format!(
                "SELECT {}({column}) AS aggregate FROM {}",
                function.as_sql(),
                self.from_sql()
            );
            self.render_joins_and_where(&mut sql, &mut b);
            self.render_grouping(&mut sql, &mut b);
            sql
        };
        finish(sql, b, StatementKind::Select)
    }

    /// `SELECT EXISTS(…) AS "exists"`
    pub fn compile_exists(&self) -> DbResult<Compiled> {
        self.validate()?;
        let mut b = Bindings::new();
        let inner = self.render_select(&mut b);
        finish(
            format!("SELECT EXISTS({inner}) AS \"exists\""),
            b,
            StatementKind::Select,
        )
    }

    /// Multi-row INSERT. Columns come from the first row; every other row must
    /// supply the same columns, in any order.
    pub fn compile_insert(&self, rows: &[Vec<(String, Value)>]) -> DbResult<Compiled> {
        self.validate()?;
        let mut b = Bindings::new();
        let sql = self.render_insert(rows, &mut b)?;
        finish(sql, b, StatementKind::Insert)
    }

    fn render_insert(&self, rows: &[Vec<(String, Value)>], b: &mut Bindings) -> DbResult<String> {
        let first = rows
            .first()
            .ok_or_else(|| DbError::validation("insert requires at least one row"))?;
        if first.is_empty() {
            return Err(DbError::validation("insert row has no columns"));
        }
        let columns = column_list(first)?;

        let mut tuples = Vec::with_capacity(rows.len());
        for (idx, row) in rows.iter().enumerate() {
            if row.len() != first.len() {
                return Err(DbError::validation(format!(
                    "insert row {idx} has {} columns, expected {}",
                    row.len(),
                    first.len()
                )));
            }
            let mut placeholders = Vec::with_capacity(first.len());
            for (column, _) in first {
                let value = lookup(row, column).ok_or_else(|| {
                    DbError::validation(format!("insert row {idx} is missing column {column:?}"))
                })?;
                placeholders.push(b.placeholder(value.clone()));
            }
            tuples.push(format!("({})", placeholders.join(", ")));
        }

        Ok(format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.table,
            columns.join(", "),
            tuples.join(", ")
        ))
    }

    /// INSERT … ON CONFLICT (unique…) DO UPDATE SET c = EXCLUDED.c.
    ///
    /// Postgres requires `unique_columns` to match a unique index or constraint;
    /// otherwise the server rejects the statement.
    pub fn compile_upsert(
        &self,
        row: &[(String, Value)],
        unique_columns: &[&str],
        update_columns: &[&str],
    ) -> DbResult<Compiled> {
        self.validate()?;
        if unique_columns.is_empty() {
            return Err(DbError::validation("upsert requires at least one unique column"));
        }
        for column in update_columns {
            if lookup(row, column).is_none() {
                return Err(DbError::validation(format!(
                    "upsert update column {column:?} is not in the row"
                )));
            }
        }

        let mut b = Bindings::new();
        let mut sql = self.render_insert(std::slice::from_ref(&row.to_vec()), &mut b)?;
        let conflict = unique_columns
            .iter()
            .map(|c| Ident::parse(c).map(|i| i.to_sql()))
            .collect::<DbResult<Vec<_>>>()?;
        let _ = write!(sql, " ON CONFLICT ({})", conflict.join(", "));

        if update_columns.is_empty() {
            sql.push_str(" DO NOTHING");
        } else {
            let sets = update_columns
                .iter()
                .map(|c| {
                    let ident = Ident::parse(c)?.to_sql();
                    Ok(format!("{ident} = EXCLUDED.{ident}"))
                })
                .collect::<DbResult<Vec<_>>>()?;
            let _ = write!(sql, " DO UPDATE SET {}", sets.join(", "));
        }
        finish(sql, b, StatementKind::Insert)
    }

    /// UPDATE … SET … WHERE …
    pub fn compile_update(&self, row: &[(String, Value)]) -> DbResult<Compiled> {
        self.validate()?;
        self.guard("update")?;
        self.reject_joins("update")?;
        if row.is_empty() {
            return Err(DbError::validation("update requires at least one column"));
        }

        let mut b = Bindings::new();
        let columns = column_list(row)?;
        let sets = columns
            .iter()
            .zip(row)
            .map(|(column, (_, value))| format!("{column} = {}", b.placeholder(value.clone())))
            .collect::<Vec<_>>();
        let mut sql = format!("UPDATE {} SET {}", self.from_sql(), sets.join(", "));
        self.render_mutation_filter(&self.predicates, &mut sql, &mut b);
        finish(sql, b, StatementKind::Update)
    }

    /// `SET column = column + amount[, extra = …]`. Pass a negated amount to decrement.
    pub fn compile_increment(
        &self,
        column: &str,
        amount: Value,
        extra: &[(String, Value)],
    ) -> DbResult<Compiled> {
        self.validate()?;
        self.guard("increment")?;
        self.reject_joins("increment")?;
        if !amount.is_numeric() {
            return Err(DbError::validation(format!(
                "increment amount must be numeric, got {}",
                amount.type_name()
            )));
        }

        let mut b = Bindings::new();
        let target = Ident::parse(column)?.to_sql();
        let mut sets = vec![format!("{target} = {target} + {}", b.placeholder(amount))];
        for (ident, (_, value)) in column_list(extra)?.iter().zip(extra) {
            sets.push(format!("{ident} = {}", b.placeholder(value.clone())));
        }
        let mut sql = format!("UPDATE {} SET {}", self.from_sql(), sets.join(", "));
        self.render_mutation_filter(&self.predicates, &mut sql, &mut b);
        finish(sql, b, StatementKind::Update)
    }

    /// DELETE FROM … WHERE …
    pub fn compile_delete(&self) -> DbResult<Compiled> {
        self.validate()?;
        self.guard("delete from")?;
        self.reject_joins("delete")?;
        let mut b = Bindings::new();
        let mut sql = format!("DELETE FROM {}", self.from_sql());
        self.render_mutation_filter(&self.predicates, &mut sql, &mut b);
        finish(sql, b, StatementKind::Delete)
    }

    /// Update many rows in one statement, one CASE expression per non-key column:
    ///
    /// ```text
    /// UPDATE t SET name = CASE id WHEN $1 THEN $2 WHEN $3 THEN $4 ELSE name END
    ///     WHERE id IN ($5, $6) [AND (accumulated predicates)]
    /// ```
    ///
    /// Labels and values are both bound. The statement only ever touches rows
    /// whose key is listed, so it needs no predicate of its own.
    pub fn compile_batch_update(
        &self,
        rows: &[Vec<(String, Value)>],
        key_column: &str,
    ) -> DbResult<Compiled> {
        self.validate()?;
        self.reject_joins("batch update")?;
        let first = rows
            .first()
            .ok_or_else(|| DbError::validation("batch update requires at least one row"))?;
        let key = Ident::parse(key_column)?.to_sql();
        let targets = first
            .iter()
            .filter(|(column, _)| column != key_column)
            .map(|(column, _)| column.as_str())
            .collect::<Vec<_>>();
        if targets.is_empty() {
            return Err(DbError::validation(
                "batch update rows have no columns besides the key",
            ));
        }

        let mut cells = Vec::with_capacity(rows.len());
        for (idx, row) in rows.iter().enumerate() {
            let label = lookup(row, key_column).ok_or_else(|| {
                DbError::validation(format!("batch row {idx} is missing key {key_column:?}"))
            })?;
            let values = targets
                .iter()
                .map(|column| {
                    lookup(row, column).ok_or_else(|| {
                        DbError::validation(format!("batch row {idx} is missing column {column:?}"))
                    })
                })
                .collect::<DbResult<Vec<_>>>()?;
            cells.push((label, values));
        }

        let mut b = Bindings::new();
        let mut sets = Vec::with_capacity(targets.len());
        for (pos, column) in targets.iter().enumerate() {
            let ident = Ident::parse(column)?.to_sql();
            let mut case = format!("{ident} = CASE {key}");
            for (label, values) in &cells {
                let when = b.placeholder((*label).clone());
                let then = b.placeholder(values[pos].clone());
                let _ = write!(case, " WHEN {when} THEN {then}");
            }
            let _ = write!(case, " ELSE {ident} END");
            sets.push(case);
        }

        let mut scope = Where::new();
        scope.push(
            Connector::And,
            Expr::InList {
                column: key,
                values: cells.iter().map(|(label, _)| (*label).clone()).collect(),
                negated: false,
            },
        );
        if !self.predicates.is_empty() {
            scope.push(Connector::And, Expr::Group(self.predicates.clone()));
        }

        let mut sql = format!("UPDATE {} SET {}", self.from_sql(), sets.join(", "));
        self.render_mutation_filter(&scope, &mut sql, &mut b);
        finish(sql, b, StatementKind::Update)
    }
}

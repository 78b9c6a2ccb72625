//! Fluent builder traits.
//!
//! [`Filter`] is the predicate surface shared by statements, join clauses and
//! closure-built groups. [`Fluent`] adds the statement-level clauses. Both are
//! implemented for [`StatementModel`] and for the executable `Query`, so the
//! same chain works whether or not a database handle is attached.

use crate::error::DbError;
use crate::qb::expr::{Condition, Connector, Expr, Operator, Where};
use crate::qb::join::{Join, JoinClause, JoinKind};
use crate::qb::statement::{Direction, Limit, StatementModel};
use crate::value::Value;

fn message_of(err: DbError) -> String {
    match err {
        DbError::Validation(message) => message,
        other => other.to_string(),
    }
}

/// Predicate-building methods.
pub trait Filter: Sized {
    /// The predicate list this builder appends to.
    fn filter_state(&mut self) -> &mut Where;

    #[doc(hidden)]
    fn push_condition(mut self, connector: Connector, condition: Condition) -> Self {
        match condition.into_expr() {
            Ok(expr) => self.filter_state().push(connector, expr),
            Err(err) => self.filter_state().set_error(message_of(err)),
        }
        self
    }

    #[doc(hidden)]
    fn push_expr(mut self, connector: Connector, expr: Expr) -> Self {
        self.filter_state().push(connector, expr);
        self
    }

    #[doc(hidden)]
    fn push_compare(
        mut self,
        connector: Connector,
        column: &str,
        op: &str,
        value: Value,
    ) -> Self {
        match op.parse::<Operator>() {
            Ok(op) => self.filter_state().push(
                connector,
                Expr::Compare {
                    column: column.to_string(),
                    op,
                    value,
                },
            ),
            Err(err) => self.filter_state().set_error(message_of(err)),
        }
        self
    }

    /// Add a condition in any accepted shape, joined with AND.
    ///
    /// ```ignore
    /// q.filter("deleted_at IS NULL")
    ///     .filter(("status", 1))
    ///     .filter(("age", ">=", 18))
    ///     .filter(vec![("role", "admin"), ("team", "core")])
    /// ```
    fn filter(self, condition: impl Into<Condition>) -> Self {
        self.push_condition(Connector::And, condition.into())
    }

    /// Like [`Filter::filter`], joined with OR.
    fn or_filter(self, condition: impl Into<Condition>) -> Self {
        self.push_condition(Connector::Or, condition.into())
    }

    fn where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.push_compare(Connector::And, column, "=", value.into())
    }

    fn or_where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.push_compare(Connector::Or, column, "=", value.into())
    }

    fn where_op(self, column: &str, op: &str, value: impl Into<Value>) -> Self {
        self.push_compare(Connector::And, column, op, value.into())
    }

    fn or_where_op(self, column: &str, op: &str, value: impl Into<Value>) -> Self {
        self.push_compare(Connector::Or, column, op, value.into())
    }

    /// Raw SQL with `?` placeholders, e.g. `where_raw("price * ? > 100", vec![2.into()])`.
    fn where_raw(self, sql: &str, values: Vec<Value>) -> Self {
        self.push_expr(
            Connector::And,
            Expr::Template {
                sql: sql.to_string(),
                values,
            },
        )
    }

    fn or_where_raw(self, sql: &str, values: Vec<Value>) -> Self {
        self.push_expr(
            Connector::Or,
            Expr::Template {
                sql: sql.to_string(),
                values,
            },
        )
    }

    /// A parenthesized group built by a closure, joined with AND.
    fn where_group(self, f: impl FnOnce(Where) -> Where) -> Self {
        self.push_expr(Connector::And, Expr::Group(f(Where::new())))
    }

    fn or_where_group(self, f: impl FnOnce(Where) -> Where) -> Self {
        self.push_expr(Connector::Or, Expr::Group(f(Where::new())))
    }

    fn where_in<V: Into<Value>>(self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.push_expr(Connector::And, in_list(column, values, false))
    }

    fn or_where_in<V: Into<Value>>(self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.push_expr(Connector::Or, in_list(column, values, false))
    }

    fn where_not_in<V: Into<Value>>(self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.push_expr(Connector::And, in_list(column, values, true))
    }

    fn or_where_not_in<V: Into<Value>>(
        self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.push_expr(Connector::Or, in_list(column, values, true))
    }

    fn where_null(self, column: &str) -> Self {
        self.push_expr(Connector::And, null_check(column, true))
    }

    fn or_where_null(self, column: &str) -> Self {
        self.push_expr(Connector::Or, null_check(column, true))
    }

    fn where_not_null(self, column: &str) -> Self {
        self.push_expr(Connector::And, null_check(column, false))
    }

    fn or_where_not_null(self, column: &str) -> Self {
        self.push_expr(Connector::Or, null_check(column, false))
    }

    /// Compare two columns: `where_column("updated_at", ">", "created_at")`.
    fn where_column(self, left: &str, op: &str, right: &str) -> Self {
        self.push_columns(Connector::And, left, op, right)
    }

    fn or_where_column(self, left: &str, op: &str, right: &str) -> Self {
        self.push_columns(Connector::Or, left, op, right)
    }

    #[doc(hidden)]
    fn push_columns(mut self, connector: Connector, left: &str, op: &str, right: &str) -> Self {
        match op.parse::<Operator>() {
            Ok(op) => self.filter_state().push(
                connector,
                Expr::Columns {
                    left: left.to_string(),
                    op,
                    right: right.to_string(),
                },
            ),
            Err(err) => self.filter_state().set_error(message_of(err)),
        }
        self
    }
}

fn in_list<V: Into<Value>>(column: &str, values: impl IntoIterator<Item = V>, negated: bool) -> Expr {
    Expr::InList {
        column: column.to_string(),
        values: values.into_iter().map(Into::into).collect(),
        negated,
    }
}

fn null_check(column: &str, is_null: bool) -> Expr {
    Expr::NullCheck {
        column: column.to_string(),
        is_null,
    }
}

impl Filter for Where {
    fn filter_state(&mut self) -> &mut Where {
        self
    }
}

/// Statement-level clauses: projection, joins, grouping, ordering, limits.
pub trait Fluent: Filter {
    fn statement(&mut self) -> &mut StatementModel;

    /// Replace the projected columns.
    fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.statement().columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Append one projected column.
    fn add_select(mut self, column: impl Into<String>) -> Self {
        self.statement().columns.push(column.into());
        self
    }

    /// Alias the base table (`FROM users AS u`).
    fn alias(mut self, alias: impl Into<String>) -> Self {
        self.statement().alias = Some(alias.into());
        self
    }

    #[doc(hidden)]
    fn push_join(mut self, kind: JoinKind, table: &str, clause: JoinClause) -> Self {
        self.statement().joins.push(Join {
            kind,
            table: table.to_string(),
            on: clause.into_where(),
        });
        self
    }

    /// INNER JOIN with a closure-built ON clause.
    fn join(self, table: &str, f: impl FnOnce(JoinClause) -> JoinClause) -> Self {
        self.push_join(JoinKind::Inner, table, f(JoinClause::new()))
    }

    fn left_join(self, table: &str, f: impl FnOnce(JoinClause) -> JoinClause) -> Self {
        self.push_join(JoinKind::Left, table, f(JoinClause::new()))
    }

    fn right_join(self, table: &str, f: impl FnOnce(JoinClause) -> JoinClause) -> Self {
        self.push_join(JoinKind::Right, table, f(JoinClause::new()))
    }

    fn full_join(self, table: &str, f: impl FnOnce(JoinClause) -> JoinClause) -> Self {
        self.push_join(JoinKind::Full, table, f(JoinClause::new()))
    }

    /// INNER JOIN on a single column comparison.
    fn join_on(self, table: &str, left: &str, op: &str, right: &str) -> Self {
        self.push_join(JoinKind::Inner, table, JoinClause::new().on(left, op, right))
    }

    fn left_join_on(self, table: &str, left: &str, op: &str, right: &str) -> Self {
        self.push_join(JoinKind::Left, table, JoinClause::new().on(left, op, right))
    }

    fn right_join_on(self, table: &str, left: &str, op: &str, right: &str) -> Self {
        self.push_join(JoinKind::Right, table, JoinClause::new().on(left, op, right))
    }

    fn full_join_on(self, table: &str, left: &str, op: &str, right: &str) -> Self {
        self.push_join(JoinKind::Full, table, JoinClause::new().on(left, op, right))
    }

    fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.statement()
            .group_by
            .extend(columns.into_iter().map(Into::into));
        self
    }

    /// HAVING `column op value`, joined with AND.
    fn having(mut self, column: &str, op: &str, value: impl Into<Value>) -> Self {
        push_having(&mut self.statement().having, Connector::And, column, op, value.into());
        self
    }

    fn or_having(mut self, column: &str, op: &str, value: impl Into<Value>) -> Self {
        push_having(&mut self.statement().having, Connector::Or, column, op, value.into());
        self
    }

    /// Raw HAVING text with `?` placeholders.
    fn having_raw(mut self, sql: &str, values: Vec<Value>) -> Self {
        self.statement().having.push(
            Connector::And,
            Expr::Template {
                sql: sql.to_string(),
                values,
            },
        );
        self
    }

    /// `ORDER BY column asc|desc`; any other direction is a build error.
    fn order_by(mut self, column: &str, direction: &str) -> Self {
        let statement = self.statement();
        match direction.parse::<Direction>() {
            Ok(direction) => statement.order_by.push((column.to_string(), direction)),
            Err(err) => statement.set_build_error(message_of(err)),
        }
        self
    }

    /// `LIMIT count OFFSET offset`.
    fn limit(mut self, offset: u64, count: u64) -> Self {
        self.statement().limit = Some(Limit { offset, count });
        self
    }
}

fn push_having(having: &mut Where, connector: Connector, column: &str, op: &str, value: Value) {
    match op.parse::<Operator>() {
        Ok(op) => having.push(
            connector,
            Expr::Compare {
                column: column.to_string(),
                op,
                value,
            },
        ),
        Err(err) => having.set_error(message_of(err)),
    }
}

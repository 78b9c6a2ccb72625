//! JOIN clauses.

use crate::qb::expr::{Connector, Expr, Operator, Where};
use crate::qb::param::Bindings;
use crate::qb::traits::Filter;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinKind {
    pub fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL OUTER JOIN",
        }
    }
}

/// One joined table with its ON predicate.
#[derive(Clone, Debug, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub on: Where,
}

impl Join {
    pub(crate) fn build(&self, b: &mut Bindings) -> String {
        let on = self.on.build(b);
        if on.is_empty() {
            // Without a condition an inner join degrades to a cross product.
            format!("{} {} ON 1=1", self.kind.as_sql(), self.table)
        } else {
            format!("{} {} ON {}", self.kind.as_sql(), self.table, on)
        }
    }
}

/// Builder handed to join closures.
///
/// ```ignore
/// db.table("users")
///     .left_join("orders", |j| {
///         j.on("orders.user_id", "=", "users.id")
///             .where_eq("orders.status", "paid")
///     })
/// ```
#[derive(Clone, Debug, Default)]
pub struct JoinClause {
    conditions: Where,
}

impl JoinClause {
    pub fn new() -> Self {
        Self::default()
    }

    /// `left op right`, joined with AND.
    pub fn on(self, left: &str, op: &str, right: &str) -> Self {
        self.push_on(Connector::And, left, op, right)
    }

    /// `left op right`, joined with OR.
    pub fn or_on(self, left: &str, op: &str, right: &str) -> Self {
        self.push_on(Connector::Or, left, op, right)
    }

    fn push_on(mut self, connector: Connector, left: &str, op: &str, right: &str) -> Self {
        match op.parse::<Operator>() {
            Ok(op) => self.conditions.push(
                connector,
                Expr::Columns {
                    left: left.to_string(),
                    op,
                    right: right.to_string(),
                },
            ),
            Err(_) => self
                .conditions
                .set_error(format!("unsupported join operator {op:?}")),
        }
        self
    }

    pub(crate) fn into_where(self) -> Where {
        self.conditions
    }
}

impl Filter for JoinClause {
    fn filter_state(&mut self) -> &mut Where {
        &mut self.conditions
    }
}

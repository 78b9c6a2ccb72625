//! Statement builder and compiler.
//!
//! A [`StatementModel`] accumulates table, projection, predicates, joins,
//! grouping, ordering and limit through the [`Filter`] and [`Fluent`] traits.
//! Compiling it yields an immutable [`Compiled`] value: SQL text with `$n`
//! placeholders and the values that fill them, in order.
//!
//! ```ignore
//! use pgfluent::qb::{Filter, Fluent, StatementModel};
//!
//! let compiled = StatementModel::new("users")
//!     .filter(("status", 1))
//!     .where_group(|g| g.where_op("age", ">=", 18).or_where_null("age"))
//!     .order_by("id", "desc")
//!     .limit(0, 10)
//!     .compile_select()?;
//!
//! assert_eq!(
//!     compiled.sql,
//!     "SELECT * FROM users WHERE status = $1 AND (age >= $2 OR age IS NULL) ORDER BY id DESC LIMIT 10"
//! );
//! ```

mod compile;
mod expr;
mod join;
mod param;
mod statement;
mod traits;

pub use compile::{Aggregate, Compiled, StatementKind};
pub use expr::{Condition, Connector, Expr, Operator, Where};
pub use join::{Join, JoinClause, JoinKind};
pub use param::{Bindings, params_ref};
#[cfg(test)]
pub(crate) use param::count_placeholders;
pub use statement::{Direction, Limit, StatementModel};
pub use traits::{Filter, Fluent};

/// Start a statement against `table`.
pub fn table(table: impl Into<String>) -> StatementModel {
    StatementModel::new(table)
}

//! Predicate tree for WHERE, HAVING and JOIN ... ON clauses.
//!
//! A [`Where`] is an ordered list of clauses, each carrying the connector that
//! joins it to the clause before it. Nested groups are parenthesized when they
//! render to something and skipped when empty. `$n` placeholders are assigned
//! while rendering, so the binding order always follows the text.

use crate::error::DbError;
use crate::qb::param::{Bindings, number_template};
use crate::value::Value;
use std::fmt;
use std::str::FromStr;

/// How a clause is joined to the one before it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
}

impl Connector {
    fn as_sql(self) -> &'static str {
        match self {
            Connector::And => " AND ",
            Connector::Or => " OR ",
        }
    }
}

/// Comparison operators accepted from callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    NotLike,
    ILike,
    NotILike,
}

impl Operator {
    pub fn as_sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::ILike => "ILIKE",
            Operator::NotILike => "NOT ILIKE",
        }
    }
}

impl FromStr for Operator {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        let op = match normalized.to_ascii_uppercase().as_str() {
            "=" => Operator::Eq,
            "!=" | "<>" => Operator::Ne,
            "<" => Operator::Lt,
            "<=" => Operator::Lte,
            ">" => Operator::Gt,
            ">=" => Operator::Gte,
            "LIKE" => Operator::Like,
            "NOT LIKE" => Operator::NotLike,
            "ILIKE" => Operator::ILike,
            "NOT ILIKE" => Operator::NotILike,
            _ => return Err(DbError::validation(format!("unsupported operator {s:?}"))),
        };
        Ok(op)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// One predicate node.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// `column op $n`
    Compare {
        column: String,
        op: Operator,
        value: Value,
    },
    /// `left op right`, both sides columns.
    Columns {
        left: String,
        op: Operator,
        right: String,
    },
    /// `column IS [NOT] NULL`
    NullCheck { column: String, is_null: bool },
    /// `column [NOT] IN ($1, $2, ...)`
    InList {
        column: String,
        values: Vec<Value>,
        negated: bool,
    },
    /// Raw SQL with `?` placeholders filled from `values`.
    Template { sql: String, values: Vec<Value> },
    /// A parenthesized sub-list.
    Group(Where),
}

impl Expr {
    fn render(&self, b: &mut Bindings) -> String {
        match self {
            Expr::Compare { column, op, value } => {
                format!("{column} {op} {}", b.placeholder(value.clone()))
            }
            Expr::Columns { left, op, right } => format!("{left} {op} {right}"),
            Expr::NullCheck { column, is_null: true } => format!("{column} IS NULL"),
            Expr::NullCheck { column, is_null: false } => format!("{column} IS NOT NULL"),
            // An empty IN list matches nothing; an empty NOT IN list matches everything.
            Expr::InList { values, negated, .. } if values.is_empty() => {
                let always = if *negated { "1=1" } else { "1=0" };
                always.to_string()
            }
            Expr::InList {
                column,
                values,
                negated,
            } => {
                let placeholders = values
                    .iter()
                    .map(|v| b.placeholder(v.clone()))
                    .collect::<Vec<_>>()
                    .join(", ");
                let op = if *negated { "NOT IN" } else { "IN" };
                format!("{column} {op} ({placeholders})")
            }
            Expr::Template { sql, .. } if sql.trim().is_empty() => String::new(),
            Expr::Template { sql, values } => number_template(sql, values, b),
            Expr::Group(inner) => {
                let sql = inner.build(b);
                if sql.is_empty() { sql } else { format!("({sql})") }
            }
        }
    }
}

/// An ordered predicate list.
///
/// Invalid input (an unknown operator, say) is remembered in `error` rather
/// than panicking mid-chain; the compiler refuses a statement carrying one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Where {
    clauses: Vec<(Connector, Expr)>,
    error: Option<String>,
}

impl Where {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the list renders to nothing.
    pub fn is_empty(&self) -> bool {
        self.clauses.iter().all(|(_, e)| match e {
            Expr::Group(inner) => inner.is_empty(),
            Expr::Template { sql, .. } => sql.trim().is_empty(),
            _ => false,
        })
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn clauses(&self) -> &[(Connector, Expr)] {
        &self.clauses
    }

    /// Append a clause. A group's recorded error is carried up.
    pub fn push(&mut self, connector: Connector, expr: Expr) {
        if let Expr::Group(inner) = &expr {
            if let Some(err) = &inner.error {
                self.set_error(err.clone());
            }
        }
        self.clauses.push((connector, expr));
    }

    /// Record an error; the first one wins.
    pub fn set_error(&mut self, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(message.into());
        }
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn clear(&mut self) {
        self.clauses.clear();
        self.error = None;
    }

    /// Render into SQL, pushing values onto `b` in textual order.
    pub fn build(&self, b: &mut Bindings) -> String {
        let mut sql = String::new();
        for (connector, expr) in &self.clauses {
            let part = expr.render(b);
            if part.is_empty() {
                continue;
            }
            if !sql.is_empty() {
                sql.push_str(connector.as_sql());
            }
            sql.push_str(&part);
        }
        sql
    }
}

/// The shapes accepted by `filter` / `or_filter`.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    /// Raw SQL text, used verbatim.
    Raw(String),
    /// `column = value`
    Eq(String, Value),
    /// `column op value`; the operator is validated when applied.
    Op(String, String, Value),
    /// Every condition, joined with AND.
    All(Vec<Condition>),
}

impl Condition {
    /// Convert into a predicate node.
    pub fn into_expr(self) -> Result<Expr, DbError> {
        let expr = match self {
            Condition::Raw(sql) => Expr::Template {
                sql,
                values: Vec::new(),
            },
            Condition::Eq(column, value) => Expr::Compare {
                column,
                op: Operator::Eq,
                value,
            },
            Condition::Op(column, op, value) => Expr::Compare {
                column,
                op: op.parse()?,
                value,
            },
            Condition::All(conditions) => {
                let mut group = Where::new();
                for condition in conditions {
                    group.push(Connector::And, condition.into_expr()?);
                }
                Expr::Group(group)
            }
        };
        Ok(expr)
    }
}

impl From<&str> for Condition {
    fn from(sql: &str) -> Self {
        Condition::Raw(sql.to_string())
    }
}

impl From<String> for Condition {
    fn from(sql: String) -> Self {
        Condition::Raw(sql)
    }
}

impl<V: Into<Value>> From<(&str, V)> for Condition {
    fn from((column, value): (&str, V)) -> Self {
        Condition::Eq(column.to_string(), value.into())
    }
}

impl<V: Into<Value>> From<(&str, &str, V)> for Condition {
    fn from((column, op, value): (&str, &str, V)) -> Self {
        Condition::Op(column.to_string(), op.to_string(), value.into())
    }
}

impl<V: Into<Value>> From<Vec<(&str, V)>> for Condition {
    fn from(pairs: Vec<(&str, V)>) -> Self {
        Condition::All(pairs.into_iter().map(Condition::from).collect())
    }
}

impl<V: Into<Value>> From<Vec<(&str, &str, V)>> for Condition {
    fn from(triples: Vec<(&str, &str, V)>) -> Self {
        Condition::All(triples.into_iter().map(Condition::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmp(column: &str, value: i64) -> Expr {
        Expr::Compare {
            column: column.into(),
            op: Operator::Eq,
            value: Value::Int(value),
        }
    }

    #[test]
    fn operators_parse_case_and_space_insensitively() {
        assert_eq!("not  like".parse::<Operator>().unwrap(), Operator::NotLike);
        assert_eq!("<>".parse::<Operator>().unwrap(), Operator::Ne);
        assert_eq!("ilike".parse::<Operator>().unwrap().as_sql(), "ILIKE");
        assert!("; DROP".parse::<Operator>().is_err());
    }

    #[test]
    fn first_connector_is_dropped() {
        let mut w = Where::new();
        w.push(Connector::Or, cmp("a", 1));
        w.push(Connector::Or, cmp("b", 2));
        w.push(Connector::And, cmp("c", 3));
        let mut b = Bindings::new();
        assert_eq!(w.build(&mut b), "a = $1 OR b = $2 AND c = $3");
        assert_eq!(b.len(), 3);
    }

    #[test]
    fn empty_groups_are_skipped() {
        let mut w = Where::new();
        w.push(Connector::And, Expr::Group(Where::new()));
        assert!(w.is_empty());
        w.push(Connector::And, cmp("a", 1));
        assert!(!w.is_empty());
        assert_eq!(w.build(&mut Bindings::new()), "a = $1");
    }

    #[test]
    fn group_errors_propagate() {
        let mut inner = Where::new();
        inner.set_error("bad");
        let mut outer = Where::new();
        outer.push(Connector::And, Expr::Group(inner));
        assert_eq!(outer.error(), Some("bad"));
    }

    #[test]
    fn empty_in_lists() {
        let mut b = Bindings::new();
        let none = Expr::InList {
            column: "id".into(),
            values: vec![],
            negated: false,
        };
        let all = Expr::InList {
            column: "id".into(),
            values: vec![],
            negated: true,
        };
        assert_eq!(none.render(&mut b), "1=0");
        assert_eq!(all.render(&mut b), "1=1");
        assert!(b.is_empty());
    }

    #[test]
    fn condition_shapes() {
        assert_eq!(Condition::from("a > 1"), Condition::Raw("a > 1".into()));
        assert_eq!(
            Condition::from(("status", 1)),
            Condition::Eq("status".into(), Value::Int(1))
        );
        let all = Condition::from(vec![("age", ">", 18), ("age", "<", 65)]);
        let mut b = Bindings::new();
        let expr = all.into_expr().unwrap();
        assert_eq!(expr.render(&mut b), "(age > $1 AND age < $2)");
        assert!(Condition::from(("a", "bogus", 1)).into_expr().is_err());
    }
}

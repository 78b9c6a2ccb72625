//! The statement model: everything one fluent chain accumulates.

use crate::error::{DbError, DbResult};
use crate::qb::expr::Where;
use crate::qb::join::Join;
use crate::qb::param::Bindings;
use crate::qb::traits::{Filter, Fluent};
use crate::value::Value;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

impl FromStr for Direction {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Direction::Asc),
            "desc" => Ok(Direction::Desc),
            _ => Err(DbError::validation(format!(
                "order direction must be asc or desc, got {s:?}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limit {
    pub offset: u64,
    pub count: u64,
}

/// Accumulated state of one statement.
///
/// A model is built by one chain and compiled once. [`StatementModel::reset`]
/// clears everything except the table, ready for the next chain.
#[derive(Clone, Debug, PartialEq)]
pub struct StatementModel {
    pub(crate) table: String,
    pub(crate) alias: Option<String>,
    pub(crate) columns: Vec<String>,
    pub(crate) predicates: Where,
    pub(crate) joins: Vec<Join>,
    pub(crate) group_by: Vec<String>,
    pub(crate) having: Where,
    pub(crate) order_by: Vec<(String, Direction)>,
    pub(crate) limit: Option<Limit>,
    pub(crate) build_error: Option<String>,
}

impl StatementModel {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: None,
            columns: Vec::new(),
            predicates: Where::new(),
            joins: Vec::new(),
            group_by: Vec::new(),
            having: Where::new(),
            order_by: Vec::new(),
            limit: None,
            build_error: None,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn predicates(&self) -> &Where {
        &self.predicates
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn limit_clause(&self) -> Option<Limit> {
        self.limit
    }

    /// Clear everything but the table name.
    pub fn reset(&mut self) {
        let table = std::mem::take(&mut self.table);
        *self = Self::new(table);
    }

    pub(crate) fn set_build_error(&mut self, message: impl Into<String>) {
        if self.build_error.is_none() {
            self.build_error = Some(message.into());
        }
    }

    /// Whether a destructive statement on this model is allowed: the WHERE
    /// clause must render to something, or a limit must be set.
    pub fn is_guarded(&self) -> bool {
        self.limit.is_some() || !self.predicates.build(&mut Bindings::new()).trim().is_empty()
    }

    /// Surface the first error recorded anywhere in the chain.
    pub fn validate(&self) -> DbResult<()> {
        if self.table.trim().is_empty() {
            return Err(DbError::validation("table name cannot be empty"));
        }
        let recorded = self
            .build_error
            .as_deref()
            .or_else(|| self.predicates.error())
            .or_else(|| self.having.error())
            .or_else(|| self.joins.iter().find_map(|j| j.on.error()));
        match recorded {
            Some(message) => Err(DbError::validation(message)),
            None => Ok(()),
        }
    }

    /// `FROM table [AS alias]`
    pub(crate) fn from_sql(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{} AS {}", self.table, alias),
            None => self.table.clone(),
        }
    }

    /// The projection list, `*` when empty.
    pub(crate) fn columns_sql(&self) -> String {
        if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(", ")
        }
    }

    /// Render SELECT text without validating. See [`StatementModel::compile_select`].
    pub fn build_query(&self) -> String {
        self.render_select(&mut Bindings::new())
    }

    /// Values aligned with [`StatementModel::build_query`]'s placeholders.
    pub fn bindings(&self) -> Vec<Value> {
        let mut b = Bindings::new();
        self.render_select(&mut b);
        b.into_vec()
    }
}

impl Filter for StatementModel {
    fn filter_state(&mut self) -> &mut Where {
        &mut self.predicates
    }
}

impl Fluent for StatementModel {
    fn statement(&mut self) -> &mut StatementModel {
        self
    }
}

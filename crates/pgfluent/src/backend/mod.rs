//! Execution strategies.
//!
//! A [`Backend`] owns one live connection and executes [`Compiled`]
//! statements. Two strategies ship with the crate:
//!
//! - [`NativeBackend`]: typed binding (one type tag per value), a streaming
//!   cursor drained row by row, and a side-channel error string.
//! - [`PreparedBackend`]: untyped positional binding, bulk fetch, errors
//!   converted at the call site.
//!
//! Everything above this trait (guard rails, the soft error channel,
//! statement reset) is written once in [`crate::Database`].

mod catalog;
mod native;
mod prepared;

pub use native::{NativeBackend, NativeCursor, TypeTag};
pub use prepared::{PreparedBackend, PreparedCursor};

use crate::error::{DbError, DbResult};
use crate::qb::{Compiled, StatementKind};
use crate::row::Record;
use crate::value::Value;
use std::future::Future;

/// One column as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
}

/// One (index, column) pair as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexColumn {
    pub index_name: String,
    pub column_name: String,
    pub unique: bool,
    pub primary: bool,
}

/// The operation set every execution strategy provides.
pub trait Backend: Send {
    /// Result handle returned by [`Backend::execute`].
    type Cursor: Send;

    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Send a compiled statement.
    fn execute(
        &mut self,
        compiled: &Compiled,
    ) -> impl Future<Output = DbResult<Self::Cursor>> + Send;

    /// Feed rows to `sink` until the cursor is exhausted or `sink` returns `false`.
    /// Returns the number of rows delivered.
    fn drain(
        &mut self,
        cursor: Self::Cursor,
        sink: &mut (dyn FnMut(Record) -> bool + Send),
    ) -> impl Future<Output = DbResult<usize>> + Send;

    /// Consume a cursor from a statement that returns no rows; yields the affected count.
    fn finish(&mut self, cursor: Self::Cursor) -> impl Future<Output = DbResult<u64>> + Send;

    fn fetch_all(
        &mut self,
        cursor: Self::Cursor,
    ) -> impl Future<Output = DbResult<Vec<Record>>> + Send {
        async move {
            let mut rows = Vec::new();
            self.drain(cursor, &mut |row| {
                rows.push(row);
                true
            })
            .await?;
            Ok(rows)
        }
    }

    fn fetch_one(
        &mut self,
        cursor: Self::Cursor,
    ) -> impl Future<Output = DbResult<Option<Record>>> + Send {
        async move {
            let mut first = None;
            self.drain(cursor, &mut |row| {
                first = Some(row);
                false
            })
            .await?;
            Ok(first)
        }
    }

    /// Rows affected by the last finished statement.
    fn affected_rows(&self) -> u64;

    /// The value most recently produced by a sequence in this session.
    fn last_insert_id(&mut self) -> impl Future<Output = DbResult<i64>> + Send {
        async move {
            let compiled = Compiled::new("SELECT lastval() AS id", Vec::new(), StatementKind::Select);
            let cursor = self.execute(&compiled).await?;
            let row = self
                .fetch_one(cursor)
                .await?
                .ok_or_else(|| DbError::not_found("lastval() returned no row"))?;
            row.try_get::<i64>("id")
        }
    }

    fn begin(&mut self) -> impl Future<Output = DbResult<()>> + Send;

    fn commit(&mut self) -> impl Future<Output = DbResult<()>> + Send;

    fn rollback(&mut self) -> impl Future<Output = DbResult<()>> + Send;

    /// Whether a transaction is open, as far as this strategy can tell.
    fn in_transaction(&self) -> bool;

    fn describe_columns(
        &mut self,
        table: &str,
    ) -> impl Future<Output = DbResult<Vec<ColumnInfo>>> + Send {
        async move {
            let rows = self.catalog(catalog::DESCRIBE_COLUMNS, table).await?;
            rows.iter()
                .map(|row| {
                    Ok(ColumnInfo {
                        name: row.try_get("name")?,
                        data_type: row.try_get("data_type")?,
                        nullable: row.try_get("nullable")?,
                        default: row.try_get("default_value")?,
                    })
                })
                .collect::<DbResult<Vec<_>>>()
        }
    }

    fn primary_key_columns(
        &mut self,
        table: &str,
    ) -> impl Future<Output = DbResult<Vec<String>>> + Send {
        async move {
            let rows = self.catalog(catalog::PRIMARY_KEY_COLUMNS, table).await?;
            rows.iter()
                .map(|row| row.try_get::<String>("column_name"))
                .collect::<DbResult<Vec<_>>>()
        }
    }

    fn index_columns(
        &mut self,
        table: &str,
    ) -> impl Future<Output = DbResult<Vec<IndexColumn>>> + Send {
        async move {
            let rows = self.catalog(catalog::INDEX_COLUMNS, table).await?;
            rows.iter()
                .map(|row| {
                    Ok(IndexColumn {
                        index_name: row.try_get("index_name")?,
                        column_name: row.try_get("column_name")?,
                        unique: row.try_get("is_unique")?,
                        primary: row.try_get("is_primary")?,
                    })
                })
                .collect::<DbResult<Vec<_>>>()
        }
    }

    #[doc(hidden)]
    fn catalog(
        &mut self,
        sql: &'static str,
        table: &str,
    ) -> impl Future<Output = DbResult<Vec<Record>>> + Send {
        let compiled = Compiled::new(sql, vec![Value::from(table)], StatementKind::Select);
        async move {
            let cursor = self.execute(&compiled).await?;
            self.fetch_all(cursor).await
        }
    }
}

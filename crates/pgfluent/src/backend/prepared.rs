//! Generic prepared-statement strategy.
//!
//! Statements are prepared without declared types; [`crate::Value`] adapts to
//! whatever the server inferred. Row-returning statements are fetched in one
//! bulk call, and every driver error is converted where it occurs.

use crate::backend::Backend;
use crate::config::{ConnectionConfig, connect_url};
use crate::error::{DbError, DbResult};
use crate::qb::Compiled;
use crate::row::Record;
use tokio_postgres::{Client, Row};

/// Fully fetched result of one statement.
pub enum PreparedCursor {
    Rows(Vec<Row>),
    Done,
}

pub struct PreparedBackend {
    client: Client,
    affected: u64,
    in_transaction: bool,
}

impl PreparedBackend {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            affected: 0,
            in_transaction: false,
        }
    }

    pub async fn connect(config: &ConnectionConfig) -> DbResult<Self> {
        Ok(Self::new(config.connect().await?))
    }

    pub async fn connect_url(url: &str) -> DbResult<Self> {
        Ok(Self::new(connect_url(url).await?))
    }

    /// The underlying driver client.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl Backend for PreparedBackend {
    type Cursor = PreparedCursor;

    fn name(&self) -> &'static str {
        "prepared"
    }

    async fn execute(&mut self, compiled: &Compiled) -> DbResult<PreparedCursor> {
        let statement = self
            .client
            .prepare(&compiled.sql)
            .await
            .map_err(DbError::from_db_error)?;
        let params = compiled.params_ref();
        if compiled.kind.returns_rows() {
            let rows = self
                .client
                .query(&statement, &params)
                .await
                .map_err(DbError::from_db_error)?;
            self.affected = rows.len() as u64;
            Ok(PreparedCursor::Rows(rows))
        } else {
            self.affected = self
                .client
                .execute(&statement, &params)
                .await
                .map_err(DbError::from_db_error)?;
            Ok(PreparedCursor::Done)
        }
    }

    async fn drain(
        &mut self,
        cursor: PreparedCursor,
        sink: &mut (dyn FnMut(Record) -> bool + Send),
    ) -> DbResult<usize> {
        let PreparedCursor::Rows(rows) = cursor else {
            return Ok(0);
        };
        let mut delivered = 0;
        for row in &rows {
            delivered += 1;
            if !sink(Record::from_pg_row(row)?) {
                break;
            }
        }
        Ok(delivered)
    }

    async fn fetch_all(&mut self, cursor: PreparedCursor) -> DbResult<Vec<Record>> {
        match cursor {
            PreparedCursor::Rows(rows) => rows.iter().map(Record::from_pg_row).collect(),
            PreparedCursor::Done => Ok(Vec::new()),
        }
    }

    async fn finish(&mut self, _cursor: PreparedCursor) -> DbResult<u64> {
        Ok(self.affected)
    }

    fn affected_rows(&self) -> u64 {
        self.affected
    }

    async fn begin(&mut self) -> DbResult<()> {
        self.client
            .batch_execute("BEGIN")
            .await
            .map_err(DbError::from_db_error)?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> DbResult<()> {
        let result = self.client.batch_execute("COMMIT").await;
        // A failed COMMIT still ends the transaction server-side.
        self.in_transaction = false;
        result.map_err(DbError::from_db_error)
    }

    async fn rollback(&mut self) -> DbResult<()> {
        let result = self.client.batch_execute("ROLLBACK").await;
        self.in_transaction = false;
        result.map_err(DbError::from_db_error)
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }
}

//! The database handle.
//!
//! [`Database`] composes one [`Backend`] with the statement compiler. Fluent
//! chains start at [`Database::table`], which mutably borrows the handle for
//! the lifetime of the returned [`Query`]; only one statement can be in flight
//! per handle, and the borrow checker enforces it.
//!
//! Error channels:
//! - reads return `DbResult` and propagate every failure;
//! - writes return `DbResult<Outcome<T>>`. Client-side problems (guard rails,
//!   invalid input) are `Err` and nothing is sent. A statement the server
//!   rejects becomes `Ok(Outcome::Failed)`, with the message kept in
//!   [`Database::error`].

use crate::backend::{Backend, ColumnInfo, IndexColumn};
use crate::error::DbResult;
use crate::qb::{Compiled, StatementModel};
use crate::query::Query;
use crate::relation::{Relation, RelationSource, TableMeta, TableRegistry};
use crate::row::Record;
use tracing::{debug, warn};

/// Result of a write that reached the server.
#[must_use = "a write may have failed; check the outcome"]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The statement ran; carries affected rows or the produced id.
    Done(T),
    /// The server rejected the statement. See [`Database::error`].
    Failed,
}

impl<T> Outcome<T> {
    pub fn is_done(&self) -> bool {
        matches!(self, Outcome::Done(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed)
    }

    pub fn value(self) -> Option<T> {
        match self {
            Outcome::Done(v) => Some(v),
            Outcome::Failed => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Done(v) => Outcome::Done(f(v)),
            Outcome::Failed => Outcome::Failed,
        }
    }
}

/// A handle owning one connection through a backend strategy.
pub struct Database<B: Backend> {
    backend: B,
    registry: TableRegistry,
    last_query: Option<String>,
    last_error: Option<String>,
}

impl<B: Backend> Database<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            registry: TableRegistry::new(),
            last_query: None,
            last_error: None,
        }
    }

    pub fn with_registry(mut self, registry: TableRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Register a typed table so relations can name it.
    pub fn register<T: TableMeta>(&mut self) {
        self.registry.register::<T>();
    }

    pub fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut TableRegistry {
        &mut self.registry
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Start a statement against `table`.
    pub fn table(&mut self, table: &str) -> Query<'_, B> {
        Query::new(self, StatementModel::new(table))
    }

    /// Continue a statement built elsewhere.
    pub fn query(&mut self, model: StatementModel) -> Query<'_, B> {
        Query::new(self, model)
    }

    /// Build the query for a relation of `source`. Nothing is executed.
    pub fn related(
        &mut self,
        relation: &Relation,
        source: &RelationSource,
    ) -> DbResult<Query<'_, B>> {
        let model = relation.build(source, &self.registry)?;
        Ok(Query::new(self, model))
    }

    /// Driver message of the last statement the server rejected.
    pub fn error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// SQL text of the last statement sent.
    pub fn last_query(&self) -> Option<&str> {
        self.last_query.as_deref()
    }

    pub fn affected_rows(&self) -> u64 {
        self.backend.affected_rows()
    }

    pub async fn last_insert_id(&mut self) -> DbResult<i64> {
        let result = self.backend.last_insert_id().await;
        self.observe(result)
    }

    pub async fn begin_transaction(&mut self) -> DbResult<()> {
        debug!(target: "pgfluent.sql", backend = self.backend.name(), "BEGIN");
        let result = self.backend.begin().await;
        self.observe(result)
    }

    pub async fn commit(&mut self) -> DbResult<()> {
        debug!(target: "pgfluent.sql", backend = self.backend.name(), "COMMIT");
        let result = self.backend.commit().await;
        self.observe(result)
    }

    pub async fn rollback(&mut self) -> DbResult<()> {
        debug!(target: "pgfluent.sql", backend = self.backend.name(), "ROLLBACK");
        let result = self.backend.rollback().await;
        self.observe(result)
    }

    /// Whether a transaction is open. Always `false` on the native backend.
    pub fn in_transaction(&self) -> bool {
        self.backend.in_transaction()
    }

    pub async fn describe_columns(&mut self, table: &str) -> DbResult<Vec<ColumnInfo>> {
        let result = self.backend.describe_columns(table).await;
        self.observe(result)
    }

    pub async fn primary_key_columns(&mut self, table: &str) -> DbResult<Vec<String>> {
        let result = self.backend.primary_key_columns(table).await;
        self.observe(result)
    }

    pub async fn index_columns(&mut self, table: &str) -> DbResult<Vec<IndexColumn>> {
        let result = self.backend.index_columns(table).await;
        self.observe(result)
    }

    /// Run a compiled row-returning statement and collect every row.
    pub async fn fetch(&mut self, compiled: &Compiled) -> DbResult<Vec<Record>> {
        self.note(compiled);
        let result = match self.backend.execute(compiled).await {
            Ok(cursor) => self.backend.fetch_all(cursor).await,
            Err(e) => Err(e),
        };
        self.observe(result)
    }

    /// Run a compiled row-returning statement, streaming rows into `sink`
    /// until it returns `false`.
    pub async fn fetch_each<F>(&mut self, compiled: &Compiled, mut sink: F) -> DbResult<usize>
    where
        F: FnMut(Record) -> bool + Send,
    {
        self.note(compiled);
        let result = match self.backend.execute(compiled).await {
            Ok(cursor) => self.backend.drain(cursor, &mut sink).await,
            Err(e) => Err(e),
        };
        self.observe(result)
    }

    /// Run a compiled statement that returns no rows. Server errors are
    /// soft: they are recorded and reported as [`Outcome::Failed`].
    pub async fn run(&mut self, compiled: &Compiled) -> Outcome<u64> {
        self.note(compiled);
        let result = match self.backend.execute(compiled).await {
            Ok(cursor) => self.backend.finish(cursor).await,
            Err(e) => Err(e),
        };
        self.soften(result, compiled)
    }

    pub(crate) fn soften<T>(&mut self, result: DbResult<T>, compiled: &Compiled) -> Outcome<T> {
        match result {
            Ok(v) => Outcome::Done(v),
            Err(e) => {
                warn!(
                    target: "pgfluent.sql",
                    backend = self.backend.name(),
                    error = %e,
                    sql = %compiled.sql,
                    "statement failed"
                );
                self.last_error = Some(e.to_string());
                Outcome::Failed
            }
        }
    }

    fn note(&mut self, compiled: &Compiled) {
        debug!(
            target: "pgfluent.sql",
            backend = self.backend.name(),
            kind = ?compiled.kind,
            param_count = compiled.bindings.len(),
            sql = %compiled.sql,
            "execute"
        );
        self.last_query = Some(compiled.sql.clone());
        self.last_error = None;
    }

    fn observe<T>(&mut self, result: DbResult<T>) -> DbResult<T> {
        if let Err(e) = &result {
            self.last_error = Some(e.to_string());
        }
        result
    }
}

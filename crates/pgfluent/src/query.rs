//! Executable fluent chains.

use crate::backend::Backend;
use crate::database::{Database, Outcome};
use crate::error::{DbError, DbResult};
use crate::qb::{Aggregate, Compiled, Filter, Fluent, Limit, StatementModel, Where};
use crate::row::{FromRow, Record};
use crate::value::Value;

/// A statement under construction, bound to a database handle.
///
/// Build it with the [`Filter`] and [`Fluent`] methods, then finish with one
/// terminal operation. Terminal operations consume the query, so a statement
/// model is compiled and executed at most once.
pub struct Query<'db, B: Backend> {
    db: &'db mut Database<B>,
    model: StatementModel,
}

impl<B: Backend> Filter for Query<'_, B> {
    fn filter_state(&mut self) -> &mut Where {
        self.model.filter_state()
    }
}

impl<B: Backend> Fluent for Query<'_, B> {
    fn statement(&mut self) -> &mut StatementModel {
        &mut self.model
    }
}

impl<'db, B: Backend> Query<'db, B> {
    pub(crate) fn new(db: &'db mut Database<B>, model: StatementModel) -> Self {
        Self { db, model }
    }

    pub fn model(&self) -> &StatementModel {
        &self.model
    }

    pub fn into_model(self) -> StatementModel {
        self.model
    }

    /// Drop everything accumulated so far, keeping the table.
    pub fn reset(mut self) -> Self {
        self.model.reset();
        self
    }

    /// SELECT text for the current state.
    pub fn to_sql(&self) -> String {
        self.model.build_query()
    }

    pub fn bindings(&self) -> Vec<Value> {
        self.model.bindings()
    }

    /// All matching rows.
    pub async fn get(self) -> DbResult<Vec<Record>> {
        let compiled = self.model.compile_select()?;
        self.db.fetch(&compiled).await
    }

    pub async fn get_as<T: FromRow>(self) -> DbResult<Vec<T>> {
        let rows = self.get().await?;
        rows.iter().map(T::from_row).collect()
    }

    /// The first matching row: `get` with `LIMIT 1`.
    pub async fn first(mut self) -> DbResult<Option<Record>> {
        let offset = self.model.limit.map_or(0, |l| l.offset);
        self.model.limit = Some(Limit { offset, count: 1 });
        let rows = self.get().await?;
        Ok(rows.into_iter().next())
    }

    pub async fn first_as<T: FromRow>(self) -> DbResult<Option<T>> {
        self.first().await?.as_ref().map(T::from_row).transpose()
    }

    /// Stream matching rows into `f` until it returns `false`. Returns the
    /// number of rows delivered.
    pub async fn each<F>(self, f: F) -> DbResult<usize>
    where
        F: FnMut(Record) -> bool + Send,
    {
        let compiled = self.model.compile_select()?;
        self.db.fetch_each(&compiled, f).await
    }

    /// `FN(column)` over the matching rows; NULL when there are none.
    pub async fn aggregate(self, function: Aggregate, column: &str) -> DbResult<Value> {
        let compiled = self.model.compile_aggregate(function, column)?;
        let rows = self.db.fetch(&compiled).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("aggregate").cloned())
            .unwrap_or_default())
    }

    pub async fn count(self) -> DbResult<i64> {
        let value = self.aggregate(Aggregate::Count, "*").await?;
        value
            .as_i64()
            .ok_or_else(|| DbError::decode("aggregate", "COUNT did not return an integer"))
    }

    pub async fn max(self, column: &str) -> DbResult<Value> {
        self.aggregate(Aggregate::Max, column).await
    }

    pub async fn min(self, column: &str) -> DbResult<Value> {
        self.aggregate(Aggregate::Min, column).await
    }

    pub async fn avg(self, column: &str) -> DbResult<Value> {
        self.aggregate(Aggregate::Avg, column).await
    }

    pub async fn sum(self, column: &str) -> DbResult<Value> {
        self.aggregate(Aggregate::Sum, column).await
    }

    pub async fn exists(self) -> DbResult<bool> {
        let compiled = self.model.compile_exists()?;
        let rows = self.db.fetch(&compiled).await?;
        match rows.first() {
            Some(row) => row.try_get("exists"),
            None => Ok(false),
        }
    }

    pub async fn does_not_exist(self) -> DbResult<bool> {
        Ok(!self.exists().await?)
    }

    async fn write(self, compiled: DbResult<Compiled>) -> DbResult<Outcome<u64>> {
        let compiled = compiled?;
        Ok(self.db.run(&compiled).await)
    }

    /// Insert one row. Yields the affected row count.
    pub async fn insert(self, row: &[(String, Value)]) -> DbResult<Outcome<u64>> {
        let compiled = self.model.compile_insert(&[row.to_vec()]);
        self.write(compiled).await
    }

    /// Insert several rows in one statement.
    pub async fn insert_many(self, rows: &[Vec<(String, Value)>]) -> DbResult<Outcome<u64>> {
        let compiled = self.model.compile_insert(rows);
        self.write(compiled).await
    }

    /// Insert one row and read back the id its sequence produced.
    pub async fn insert_get_id(self, row: &[(String, Value)]) -> DbResult<Outcome<i64>> {
        let compiled = self.model.compile_insert(&[row.to_vec()])?;
        let db = self.db;
        if db.run(&compiled).await.is_failed() {
            return Ok(Outcome::Failed);
        }
        let id = db.backend_mut().last_insert_id().await;
        Ok(db.soften(id, &compiled))
    }

    /// UPDATE the matching rows. Refused without a predicate or limit.
    pub async fn update(self, row: &[(String, Value)]) -> DbResult<Outcome<u64>> {
        let compiled = self.model.compile_update(row);
        self.write(compiled).await
    }

    /// Insert, or update `update_columns` when `unique_columns` collide.
    pub async fn upsert(
        self,
        row: &[(String, Value)],
        unique_columns: &[&str],
        update_columns: &[&str],
    ) -> DbResult<Outcome<u64>> {
        let compiled = self.model.compile_upsert(row, unique_columns, update_columns);
        self.write(compiled).await
    }

    pub async fn increment(self, column: &str, amount: impl Into<Value>) -> DbResult<Outcome<u64>> {
        self.increment_with(column, amount, &[]).await
    }

    pub async fn decrement(self, column: &str, amount: impl Into<Value>) -> DbResult<Outcome<u64>> {
        let amount = amount.into();
        let negated = amount.negated().ok_or_else(|| {
            DbError::validation(format!(
                "decrement amount must be numeric, got {}",
                amount.type_name()
            ))
        })?;
        self.increment_with(column, negated, &[]).await
    }

    /// Increment and set extra columns in the same statement.
    pub async fn increment_with(
        self,
        column: &str,
        amount: impl Into<Value>,
        extra: &[(String, Value)],
    ) -> DbResult<Outcome<u64>> {
        let compiled = self.model.compile_increment(column, amount.into(), extra);
        self.write(compiled).await
    }

    /// DELETE the matching rows. Refused without a predicate or limit.
    pub async fn delete(self) -> DbResult<Outcome<u64>> {
        let compiled = self.model.compile_delete();
        self.write(compiled).await
    }

    /// Update many rows in one round trip, keyed by `key_column`.
    pub async fn batch_update_by_case(
        self,
        rows: &[Vec<(String, Value)>],
        key_column: &str,
    ) -> DbResult<Outcome<u64>> {
        let compiled = self.model.compile_batch_update(rows, key_column);
        self.write(compiled).await
    }
}

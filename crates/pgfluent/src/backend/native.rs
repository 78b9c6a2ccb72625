//! Native typed-binding strategy.
//!
//! Each bound value is given a type tag when the statement is prepared, rows
//! come back through a streaming cursor that is drained one at a time, and
//! failures are reported through a side-channel error string: low-level
//! helpers return `Option`/`bool` and leave the driver message in `error`.
//!
//! Transaction state is tracked as an autocommit flag. The server is never
//! asked whether a transaction is open, so [`Backend::in_transaction`] always
//! reports `false` here.

use crate::backend::Backend;
use crate::config::{ConnectionConfig, connect_url};
use crate::error::{DbError, DbResult};
use crate::qb::Compiled;
use crate::row::Record;
use crate::value::Value;
use futures_util::TryStreamExt;
use std::pin::Pin;
use tokio_postgres::types::{Kind, Type};
use tokio_postgres::{Client, RowStream, Statement};

/// The type tag attached to a bound value at prepare time.
///
/// Numbers and booleans are declared. Text is declared as OID 0: the string
/// may spell a uuid, a date or a timestamp, and only the server knows which
/// type the placeholder needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeTag {
    Integer,
    Double,
    Numeric,
    Boolean,
    Text,
    /// Left for the server to infer (NULL, JSON, bytes).
    Unspecified,
}

impl TypeTag {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Int(_) => TypeTag::Integer,
            Value::Float(_) => TypeTag::Double,
            Value::Decimal(_) => TypeTag::Numeric,
            Value::Bool(_) => TypeTag::Boolean,
            Value::Text(_) => TypeTag::Text,
            Value::Null | Value::Json(_) | Value::Bytes(_) => TypeTag::Unspecified,
        }
    }

    /// The declared parameter type. OID 0 asks the server to infer it.
    pub fn pg_type(self) -> Type {
        match self {
            TypeTag::Integer => Type::INT8,
            TypeTag::Double => Type::FLOAT8,
            TypeTag::Numeric => Type::NUMERIC,
            TypeTag::Boolean => Type::BOOL,
            TypeTag::Text | TypeTag::Unspecified => {
                Type::new("unknown".into(), 0, Kind::Simple, "pg_catalog".into())
            }
        }
    }
}

/// A row stream that must be drained before the next statement.
pub struct NativeCursor {
    stream: Pin<Box<RowStream>>,
}

pub struct NativeBackend {
    client: Client,
    error: Option<String>,
    affected: u64,
    autocommit: bool,
}

impl NativeBackend {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            error: None,
            affected: 0,
            autocommit: true,
        }
    }

    pub async fn connect(config: &ConnectionConfig) -> DbResult<Self> {
        Ok(Self::new(config.connect().await?))
    }

    pub async fn connect_url(url: &str) -> DbResult<Self> {
        Ok(Self::new(connect_url(url).await?))
    }

    /// The driver message left by the last failed call, if any.
    pub fn native_error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// `false` between `begin` and `commit`/`rollback`.
    pub fn autocommit(&self) -> bool {
        self.autocommit
    }

    fn record(&mut self, err: &tokio_postgres::Error) {
        let message = match err.as_db_error() {
            Some(db) => format!("{}: {}", db.code().code(), db.message()),
            None => err.to_string(),
        };
        self.error = Some(message);
    }

    fn take_error(&mut self) -> DbError {
        DbError::Native(
            self.error
                .clone()
                .unwrap_or_else(|| "native call failed without a message".to_string()),
        )
    }

    async fn prepare(&mut self, compiled: &Compiled) -> Option<Statement> {
        let types = compiled
            .bindings
            .iter()
            .map(|v| TypeTag::of(v).pg_type())
            .collect::<Vec<_>>();
        match self.client.prepare_typed(&compiled.sql, &types).await {
            Ok(statement) => Some(statement),
            Err(e) => {
                self.record(&e);
                None
            }
        }
    }

    async fn run_simple(&mut self, sql: &str) -> bool {
        match self.client.batch_execute(sql).await {
            Ok(()) => true,
            Err(e) => {
                self.record(&e);
                false
            }
        }
    }
}

impl Backend for NativeBackend {
    type Cursor = NativeCursor;

    fn name(&self) -> &'static str {
        "native"
    }

    async fn execute(&mut self, compiled: &Compiled) -> DbResult<NativeCursor> {
        self.error = None;
        let Some(statement) = self.prepare(compiled).await else {
            return Err(self.take_error());
        };
        match self.client.query_raw(&statement, compiled.bindings.iter()).await {
            Ok(stream) => Ok(NativeCursor {
                stream: Box::pin(stream),
            }),
            Err(e) => {
                self.record(&e);
                Err(self.take_error())
            }
        }
    }

    async fn drain(
        &mut self,
        cursor: NativeCursor,
        sink: &mut (dyn FnMut(Record) -> bool + Send),
    ) -> DbResult<usize> {
        let mut stream = cursor.stream;
        let mut delivered = 0;
        loop {
            match stream.try_next().await {
                Ok(Some(row)) => {
                    delivered += 1;
                    if !sink(Record::from_pg_row(&row)?) {
                        break;
                    }
                }
                Ok(None) => {
                    self.affected = stream.rows_affected().unwrap_or(0);
                    break;
                }
                Err(e) => {
                    self.record(&e);
                    return Err(self.take_error());
                }
            }
        }
        Ok(delivered)
    }

    async fn finish(&mut self, cursor: NativeCursor) -> DbResult<u64> {
        self.drain(cursor, &mut |_| true).await?;
        Ok(self.affected)
    }

    fn affected_rows(&self) -> u64 {
        self.affected
    }

    async fn begin(&mut self) -> DbResult<()> {
        if !self.run_simple("BEGIN").await {
            return Err(self.take_error());
        }
        self.autocommit = false;
        Ok(())
    }

    async fn commit(&mut self) -> DbResult<()> {
        let ok = self.run_simple("COMMIT").await;
        self.autocommit = true;
        if ok { Ok(()) } else { Err(self.take_error()) }
    }

    async fn rollback(&mut self) -> DbResult<()> {
        let ok = self.run_simple("ROLLBACK").await;
        self.autocommit = true;
        if ok { Ok(()) } else { Err(self.take_error()) }
    }

    fn in_transaction(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_follow_value_kind() {
        assert_eq!(TypeTag::of(&Value::Int(1)), TypeTag::Integer);
        assert_eq!(TypeTag::of(&Value::Float(1.5)), TypeTag::Double);
        assert_eq!(TypeTag::of(&Value::Bool(true)), TypeTag::Boolean);
        assert_eq!(TypeTag::of(&Value::from("x")), TypeTag::Text);
        assert_eq!(TypeTag::of(&Value::Null), TypeTag::Unspecified);
        assert_eq!(TypeTag::of(&Value::Bytes(vec![1])), TypeTag::Unspecified);
    }

    #[test]
    fn unspecified_tag_uses_oid_zero() {
        assert_eq!(TypeTag::Integer.pg_type(), Type::INT8);
        assert_eq!(TypeTag::Unspecified.pg_type().oid(), 0);
    }

    #[test]
    fn text_is_left_for_the_server() {
        let uid = uuid::Uuid::nil();
        let day = chrono::NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        for value in [Value::from(uid), Value::from(day), Value::from("plain")] {
            assert_eq!(TypeTag::of(&value), TypeTag::Text);
            assert_eq!(TypeTag::of(&value).pg_type().oid(), 0);
        }
        let price = Value::Decimal(rust_decimal::Decimal::new(199, 2));
        assert_eq!(TypeTag::of(&price).pg_type(), Type::NUMERIC);
    }
}

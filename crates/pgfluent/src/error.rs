//! Errors raised while compiling or running statements.

use thiserror::Error;
use tokio_postgres::error::SqlState;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    /// Connection settings missing or malformed; raised before connecting.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    /// Driver error from the prepared-statement backend, unclassified.
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// `CODE: message` taken from the native backend's error slot.
    #[error("Native error: {0}")]
    Native(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// SQLSTATE 23505, formatted as `constraint: message`.
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// SQLSTATE 23503.
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// SQLSTATE 23514.
    #[error("Check constraint violation: {0}")]
    CheckViolation(String),

    /// A cell could not be converted to the requested Rust type.
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Invalid builder state: unknown operator, bad identifier, ragged rows.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An UPDATE or DELETE with neither predicate nor limit.
    #[error("Guard error: {0}")]
    Guard(String),

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("{0}")]
    Other(String),
}

impl DbError {
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn guard(message: impl Into<String>) -> Self {
        Self::Guard(message.into())
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }

    pub fn is_guard(&self) -> bool {
        matches!(self, Self::Guard(_))
    }

    /// Raised before any SQL reached the server.
    pub fn is_client_side(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Validation(_) | Self::Guard(_) | Self::UnknownTable(_)
        )
    }

    /// Classify a driver error by SQLSTATE; anything else stays [`DbError::Query`].
    pub fn from_db_error(err: tokio_postgres::Error) -> Self {
        let Some(db) = err.as_db_error() else {
            return Self::Query(err);
        };
        let detail = || format!("{}: {}", db.constraint().unwrap_or("unknown"), db.message());
        let code = db.code();
        if *code == SqlState::UNIQUE_VIOLATION {
            Self::UniqueViolation(detail())
        } else if *code == SqlState::FOREIGN_KEY_VIOLATION {
            Self::ForeignKeyViolation(detail())
        } else if *code == SqlState::CHECK_VIOLATION {
            Self::CheckViolation(detail())
        } else {
            Self::Query(err)
        }
    }
}

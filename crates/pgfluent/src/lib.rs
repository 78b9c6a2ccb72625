//! # pgfluent
//!
//! A fluent PostgreSQL statement builder with pluggable execution backends.
//!
//! ## Features
//!
//! - **Deterministic compilation**: a [`qb::StatementModel`] compiles into SQL text
//!   with `$n` placeholders and an ordered binding list that always lines up
//! - **Two backends**: [`NativeBackend`] binds typed values and streams rows;
//!   [`PreparedBackend`] binds untyped values and fetches in bulk
//! - **Safe defaults**: DELETE, UPDATE, increments and batch updates without a
//!   predicate or limit are refused before any SQL is sent
//! - **Soft write errors**: writes report server rejections as [`Outcome::Failed`]
//!   and keep the message in [`Database::error`]; reads propagate errors
//! - **Relations**: [`Relation`] composes join-based queries from a source row
//!
//! ## Usage
//!
//! ```ignore
//! use pgfluent::prelude::*;
//!
//! let config = ConnectionConfig::from_profile("app")?;
//! let mut db = Database::new(PreparedBackend::connect(&config).await?);
//!
//! let users = db
//!     .table("users")
//!     .filter(("status", 1))
//!     .order_by("id", "desc")
//!     .limit(0, 10)
//!     .get()
//!     .await?;
//!
//! let outcome = db
//!     .table("users")
//!     .upsert(&row! { "email" => "x@y.com", "name" => "A" }, &["email"], &["name"])
//!     .await?;
//! if outcome.is_failed() {
//!     eprintln!("upsert failed: {:?}", db.error());
//! }
//! ```

pub mod backend;
pub mod config;
pub mod database;
pub mod error;
pub mod ident;
pub mod prelude;
pub mod qb;
pub mod query;
pub mod relation;
pub mod row;
pub mod transaction;
pub mod value;

pub use backend::{Backend, ColumnInfo, IndexColumn, NativeBackend, PreparedBackend};
pub use config::ConnectionConfig;
pub use database::{Database, Outcome};
pub use error::{DbError, DbResult};
pub use ident::Ident;
pub use qb::{Compiled, Filter, Fluent, StatementModel};
pub use query::Query;
pub use relation::{Relation, RelationSource, TableDescriptor, TableMeta, TableRef, TableRegistry};
pub use row::{FromRow, FromValue, Record};
pub use value::Value;

//! Convenient imports for typical `pgfluent` usage.
//!
//! ```ignore
//! use pgfluent::prelude::*;
//! ```

pub use crate::{
    Backend, ConnectionConfig, Database, DbError, DbResult, Filter, Fluent, FromRow,
    NativeBackend, Outcome, PreparedBackend, Record, Relation, RelationSource, Value, row,
    transaction,
};

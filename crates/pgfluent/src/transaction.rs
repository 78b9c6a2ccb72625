//! Transaction helper macro.
//!
//! ```ignore
//! use pgfluent::prelude::*;
//!
//! pgfluent::transaction!(db, {
//!     let debit = db.table("accounts").where_eq("id", 1).decrement("balance", 100).await?;
//!     let credit = db.table("accounts").where_eq("id", 2).increment("balance", 100).await?;
//!     if debit.is_failed() || credit.is_failed() {
//!         return Err(DbError::Other("transfer rejected".into()));
//!     }
//!     Ok(())
//! })?;
//! ```

/// Runs the given block inside a transaction on a [`Database`](crate::Database).
///
/// - Begins with `begin_transaction`.
/// - Commits on `Ok(_)`.
/// - Rolls back on `Err(_)`; a failed rollback is reported together with the
///   original error.
///
/// The block must evaluate to `pgfluent::DbResult<T>`. Write operations that
/// return `Ok(Outcome::Failed)` do not trigger a rollback on their own; turn
/// them into an error inside the block when they should.
#[macro_export]
macro_rules! transaction {
    ($db:ident, $body:block) => {{
        $db.begin_transaction().await?;

        let __pgfluent_tx_result: $crate::DbResult<_> = async { $body }.await;
        match __pgfluent_tx_result {
            Ok(value) => {
                $db.commit().await?;
                Ok(value)
            }
            Err(error) => match $db.rollback().await {
                Ok(()) => Err(error),
                Err(rollback_err) => Err($crate::DbError::Other(format!(
                    "{error} (rollback failed: {rollback_err})"
                ))),
            },
        }
    }};
}

//! Row-level access to a relational database.

use entiorm_codec::Value;

use super::schema::TableDef;
use crate::entity::Record;
use crate::error::CoreResult;
use crate::types::{DatabaseKind, IsolationLevel};

/// Conjunction of `column = value` tests; `Null` matches `IS NULL`.
pub type Filter = [(String, Value)];

/// One connection's view of a relational database.
///
/// Without an open transaction every call commits on its own.
pub trait RowStore: Send {
    /// Opens a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the database refuses the transaction.
    fn begin(&mut self, isolation: IsolationLevel) -> CoreResult<()>;

    /// Commits the open transaction, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails; the transaction is then gone.
    fn commit(&mut self) -> CoreResult<()>;

    /// Rolls back the open transaction, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database reports one.
    fn rollback(&mut self) -> CoreResult<()>;

    /// Whether a transaction is open.
    fn in_transaction(&self) -> bool;

    /// Rows of `table` matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn select(&mut self, table: &TableDef, filter: &Filter) -> CoreResult<Vec<Record>>;

    /// Inserts `record`. Returns the generated identity when the table has
    /// an identity column that `record` leaves out.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::ConstraintViolation`] on key, unique or
    /// not-null violations.
    fn insert(&mut self, table: &TableDef, record: &Record) -> CoreResult<Option<Value>>;

    /// Sets `set` on rows matching `filter`. Returns the affected count.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::ConstraintViolation`] on violations.
    fn update(&mut self, table: &TableDef, set: &Record, filter: &Filter) -> CoreResult<u64>;

    /// Deletes rows matching `filter`. Returns the affected count.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn delete(&mut self, table: &TableDef, filter: &Filter) -> CoreResult<u64>;

    /// Creates `table` and its indexes unless they already exist, on this
    /// connection and inside its open transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the DDL fails.
    fn create(&mut self, table: &TableDef) -> CoreResult<()>;
}

/// Opens [`RowStore`]s and installs tables for one database.
pub trait RowStoreFactory: Send + Sync {
    /// Database behind the stores.
    fn database(&self) -> DatabaseKind;

    /// Opens a new store.
    ///
    /// # Errors
    ///
    /// Returns an error if no connection can be made.
    fn open(&self) -> CoreResult<Box<dyn RowStore>>;

    /// Creates `table` and its indexes unless they already exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the DDL fails.
    fn install(&self, table: &TableDef) -> CoreResult<()>;
}

/// Filter selecting a single column value.
#[must_use]
pub fn eq(column: &str, value: Value) -> Vec<(String, Value)> {
    vec![(column.to_string(), value)]
}

//! Relational substrate shared by the session, model and mapper ORMs.

mod dialect;
mod memory;
mod migration;
mod schema;
mod sql;
#[cfg(feature = "sqlite")]
mod sqlite;
mod store;

pub use dialect::{Dialect, InsertReturning};
pub use memory::{MemoryDatabase, MemoryRowStore, MemoryRowStoreFactory};
pub use migration::MigrationHistory;
pub use schema::{schema_hash, ColumnDef, IndexDef, TableDef, MIGRATIONS_TABLE};
pub use sql::{SqlConnection, SqlDriver, SqlRowStore, SqlRowStoreFactory};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDriver;
pub use store::{eq, Filter, RowStore, RowStoreFactory};

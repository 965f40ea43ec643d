//! Migration-history marker.
//!
//! Each time the set of installed tables hashes to a value the marker
//! table has not seen, a new revision row is written. The row only
//! records that the schema changed; applying changes to existing tables
//! is left to external tooling.

use std::collections::BTreeMap;

use entiorm_codec::Value;
use parking_lot::Mutex;

use super::schema::{schema_hash, TableDef};
use super::store::{eq, RowStore, RowStoreFactory};
use crate::entity::Record;
use crate::error::{CoreError, CoreResult};

/// Tracks installed tables and writes marker revisions.
#[derive(Debug, Default)]
pub struct MigrationHistory {
    tables: Mutex<BTreeMap<String, TableDef>>,
}

impl MigrationHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the marker table.
    ///
    /// # Errors
    ///
    /// Returns an error if the DDL fails.
    pub fn install(&self, stores: &dyn RowStoreFactory) -> CoreResult<()> {
        stores.install(&TableDef::migrations())
    }

    /// Adds `table` to the installed set and records the resulting schema
    /// hash through `store` if it is new. Returns the revision written, if
    /// any.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker table cannot be read or written.
    pub fn record(&self, store: &mut dyn RowStore, table: &TableDef) -> CoreResult<Option<i64>> {
        let (hash, count) = {
            let mut tables = self.tables.lock();
            tables.insert(table.name.clone(), table.clone());
            (schema_hash(tables.values()), tables.len())
        };

        let marker = TableDef::migrations();
        if !store
            .select(&marker, &eq("SchemaHash", Value::Text(hash.clone())))?
            .is_empty()
        {
            return Ok(None);
        }

        let mut record = Record::new();
        record.insert("SchemaHash".into(), Value::Text(hash.clone()));
        record.insert("Tables".into(), Value::Integer(count as i64));
        match store.insert(&marker, &record) {
            Ok(revision) => {
                let revision = revision.and_then(|r| r.as_integer());
                tracing::info!(?revision, tables = count, hash = %hash, "schema revision recorded");
                Ok(revision)
            }
            // Another factory recorded the same schema first.
            Err(CoreError::ConstraintViolation { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Drops `tables` from the installed set after their creation was
    /// rolled back.
    pub fn forget(&self, tables: &[String]) {
        let mut installed = self.tables.lock();
        for name in tables {
            installed.remove(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::entity::ValueKind;
    use crate::relational::memory::{MemoryDatabase, MemoryRowStoreFactory};
    use crate::relational::schema::{ColumnDef, MIGRATIONS_TABLE};
    use crate::types::IsolationLevel;

    fn table(name: &str) -> TableDef {
        let mut table = TableDef::new(name);
        table
            .columns
            .push(ColumnDef::new("id", ValueKind::Integer).primary_key(true));
        table
    }

    #[test]
    fn records_only_new_hashes() {
        let database = Arc::new(MemoryDatabase::new("m"));
        let stores = MemoryRowStoreFactory::new(Arc::clone(&database));
        let history = MigrationHistory::new();
        history.install(&stores).unwrap();
        let mut store = stores.open().unwrap();

        assert_eq!(history.record(store.as_mut(), &table("a")).unwrap(), Some(1));
        assert_eq!(history.record(store.as_mut(), &table("b")).unwrap(), Some(2));
        assert_eq!(history.record(store.as_mut(), &table("b")).unwrap(), None);

        // A second process installing the same tables writes nothing new.
        let again = MigrationHistory::new();
        assert_eq!(again.record(store.as_mut(), &table("a")).unwrap(), None);
        assert_eq!(again.record(store.as_mut(), &table("b")).unwrap(), None);
        assert_eq!(database.row_count(MIGRATIONS_TABLE), 2);
    }

    #[test]
    fn rolled_back_tables_are_recorded_again() {
        let database = Arc::new(MemoryDatabase::new("m"));
        let stores = MemoryRowStoreFactory::new(Arc::clone(&database));
        let history = MigrationHistory::new();
        history.install(&stores).unwrap();
        let mut store = stores.open().unwrap();
        history.record(store.as_mut(), &table("a")).unwrap();

        store.begin(IsolationLevel::ReadCommitted).unwrap();
        assert!(history.record(store.as_mut(), &table("b")).unwrap().is_some());
        store.rollback().unwrap();
        history.forget(&["b".to_string()]);
        assert_eq!(database.row_count(MIGRATIONS_TABLE), 1);

        assert!(history.record(store.as_mut(), &table("b")).unwrap().is_some());
        assert_eq!(database.row_count(MIGRATIONS_TABLE), 2);
    }
}

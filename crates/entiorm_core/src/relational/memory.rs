//! The in-memory relational test backend.
//!
//! Tables live in one shared [`MemoryDatabase`]. A store without a
//! transaction writes straight through. A transaction works on private
//! copies of the tables it writes and keeps a write log; tables it has not
//! written read the committed state. Commit replays the log against the
//! shared tables under one lock, re-checking every constraint, and
//! installs the result only if the whole log applies.

use std::collections::HashMap;
use std::sync::Arc;

use entiorm_codec::Value;
use parking_lot::Mutex;

use super::schema::TableDef;
use super::store::{Filter, RowStore, RowStoreFactory};
use crate::entity::Record;
use crate::error::{CoreError, CoreResult};
use crate::types::{DatabaseKind, IsolationLevel};

#[derive(Debug, Clone)]
struct MemoryTable {
    def: TableDef,
    rows: Vec<Record>,
    next_identity: i64,
}

impl MemoryTable {
    fn new(def: TableDef) -> Self {
        Self {
            def,
            rows: Vec::new(),
            next_identity: 1,
        }
    }

    fn matches(row: &Record, filter: &Filter) -> bool {
        filter
            .iter()
            .all(|(column, value)| row.get(column).unwrap_or(&Value::Null) == value)
    }

    fn select(&self, filter: &Filter) -> Vec<Record> {
        self.rows
            .iter()
            .filter(|row| Self::matches(row, filter))
            .cloned()
            .collect()
    }

    /// Checks `row` (at `position`, or a new row) against the table's
    /// not-null, key, unique and unique-index constraints.
    fn check(&self, row: &Record, position: Option<usize>) -> CoreResult<()> {
        let violation = |message: String| CoreError::constraint_violation(&self.def.name, message);
        for column in &self.def.columns {
            let value = row.get(&column.name).unwrap_or(&Value::Null);
            if value.is_null() {
                if !column.nullable {
                    return Err(violation(format!("column {} is not nullable", column.name)));
                }
                continue;
            }
            if column.primary_key || column.unique {
                let clash = self.rows.iter().enumerate().any(|(i, other)| {
                    Some(i) != position && other.get(&column.name) == Some(value)
                });
                if clash {
                    return Err(violation(format!("duplicate value for {}", column.name)));
                }
            }
        }
        for index in self.def.indexes.iter().filter(|i| i.unique) {
            let entry: Vec<&Value> = index
                .columns
                .iter()
                .map(|c| row.get(c).unwrap_or(&Value::Null))
                .collect();
            if entry.iter().any(|v| v.is_null()) {
                continue;
            }
            let clash = self.rows.iter().enumerate().any(|(i, other)| {
                Some(i) != position
                    && index
                        .columns
                        .iter()
                        .zip(&entry)
                        .all(|(c, v)| other.get(c).unwrap_or(&Value::Null) == *v)
            });
            if clash {
                return Err(violation(format!("duplicate entry for index {}", index.name)));
            }
        }
        Ok(())
    }

    fn insert(&mut self, mut row: Record) -> CoreResult<Option<Value>> {
        let mut generated = None;
        if let Some(key) = self.def.key().filter(|k| k.identity) {
            match row.get(&key.name).and_then(Value::as_integer) {
                Some(explicit) => self.next_identity = self.next_identity.max(explicit + 1),
                None => {
                    let id = Value::Integer(self.next_identity);
                    self.next_identity += 1;
                    row.insert(key.name.clone(), id.clone());
                    generated = Some(id);
                }
            }
        }
        self.check(&row, None)?;
        self.rows.push(row);
        Ok(generated)
    }

    fn update(&mut self, set: &Record, filter: &Filter) -> CoreResult<u64> {
        let positions: Vec<usize> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| Self::matches(row, filter))
            .map(|(i, _)| i)
            .collect();
        let mut updated = self.rows.clone();
        for &i in &positions {
            for (column, value) in set {
                updated[i].insert(column.clone(), value.clone());
            }
        }
        let staged = Self {
            def: self.def.clone(),
            rows: updated,
            next_identity: self.next_identity,
        };
        for &i in &positions {
            staged.check(&staged.rows[i], Some(i))?;
        }
        self.rows = staged.rows;
        Ok(positions.len() as u64)
    }

    fn delete(&mut self, filter: &Filter) -> u64 {
        let before = self.rows.len();
        self.rows.retain(|row| !Self::matches(row, filter));
        (before - self.rows.len()) as u64
    }
}

/// A write recorded by a transaction, replayed at commit.
#[derive(Debug, Clone)]
enum Write {
    Insert(Record),
    Update(Record, Vec<(String, Value)>),
    Delete(Vec<(String, Value)>),
}

impl Write {
    fn apply(&self, table: &mut MemoryTable) -> CoreResult<()> {
        match self {
            Self::Insert(row) => table.insert(row.clone()).map(|_| ()),
            Self::Update(set, filter) => table.update(set, filter).map(|_| ()),
            Self::Delete(filter) => {
                table.delete(filter);
                Ok(())
            }
        }
    }
}

/// Shared tables of one in-memory database.
#[derive(Debug)]
pub struct MemoryDatabase {
    name: String,
    tables: Mutex<HashMap<String, MemoryTable>>,
}

impl MemoryDatabase {
    /// An empty database.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Mutex::new(HashMap::new()),
        }
    }

    /// Database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Committed row count of `table`.
    #[must_use]
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.lock().get(table).map_or(0, |t| t.rows.len())
    }

    /// Adds `table`, or updates the definition of an existing one.
    fn create(&self, table: &TableDef) {
        let mut tables = self.tables.lock();
        match tables.get_mut(&table.name) {
            Some(existing) => existing.def = table.clone(),
            None => {
                tables.insert(table.name.clone(), MemoryTable::new(table.clone()));
            }
        }
    }

    fn missing(table: &str) -> CoreError {
        CoreError::sql(format!("no such table: {table}"))
    }
}

/// Opens [`MemoryRowStore`]s over one [`MemoryDatabase`].
#[derive(Debug, Clone)]
pub struct MemoryRowStoreFactory {
    database: Arc<MemoryDatabase>,
}

impl MemoryRowStoreFactory {
    /// Wraps `database`.
    #[must_use]
    pub fn new(database: Arc<MemoryDatabase>) -> Self {
        Self { database }
    }

    /// The shared database.
    #[must_use]
    pub fn database_handle(&self) -> &Arc<MemoryDatabase> {
        &self.database
    }
}

impl RowStoreFactory for MemoryRowStoreFactory {
    fn database(&self) -> DatabaseKind {
        DatabaseKind::InMemory
    }

    fn open(&self) -> CoreResult<Box<dyn RowStore>> {
        Ok(Box::new(MemoryRowStore {
            database: Arc::clone(&self.database),
            transaction: None,
        }))
    }

    fn install(&self, table: &TableDef) -> CoreResult<()> {
        self.database.create(table);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Transaction {
    /// Private copies of written tables.
    tables: HashMap<String, MemoryTable>,
    log: Vec<(String, Write)>,
}

/// A connection to a [`MemoryDatabase`].
#[derive(Debug)]
pub struct MemoryRowStore {
    database: Arc<MemoryDatabase>,
    transaction: Option<Transaction>,
}

impl MemoryRowStore {
    /// The transaction's copy of `name`, if it has written to it.
    fn written(&self, name: &str) -> Option<&MemoryTable> {
        self.transaction.as_ref().and_then(|t| t.tables.get(name))
    }

    /// Rows of `name` visible to this store.
    fn visible(&self, name: &str, filter: &Filter) -> CoreResult<Vec<Record>> {
        if let Some(private) = self.written(name) {
            return Ok(private.select(filter));
        }
        let tables = self.database.tables.lock();
        let shared = tables.get(name).ok_or_else(|| MemoryDatabase::missing(name))?;
        Ok(shared.select(filter))
    }

    /// Private copy of `table`, taken on first write.
    fn private_table(&mut self, name: &str) -> CoreResult<Option<&mut MemoryTable>> {
        let Some(transaction) = self.transaction.as_mut() else {
            return Ok(None);
        };
        if !transaction.tables.contains_key(name) {
            let snapshot = self
                .database
                .tables
                .lock()
                .get(name)
                .cloned()
                .ok_or_else(|| MemoryDatabase::missing(name))?;
            transaction.tables.insert(name.to_string(), snapshot);
        }
        Ok(transaction.tables.get_mut(name))
    }

    /// Applies `write` to the transaction's copy, or straight through.
    fn write(&mut self, name: &str, write: Write) -> CoreResult<Option<Value>> {
        if self.transaction.is_some() {
            // Identities come from the shared counter so concurrent
            // transactions never hand out the same key.
            let (write, generated) = match write {
                Write::Insert(mut row) => {
                    let generated = self.reserve_identity(name, &mut row)?;
                    (Write::Insert(row), generated)
                }
                other => (other, None),
            };
            if let Some(table) = self.private_table(name)? {
                write.apply(table)?;
            }
            if let Some(transaction) = self.transaction.as_mut() {
                transaction.log.push((name.to_string(), write));
            }
            return Ok(generated);
        }

        let mut tables = self.database.tables.lock();
        let table = tables.get_mut(name).ok_or_else(|| MemoryDatabase::missing(name))?;
        match write {
            Write::Insert(row) => table.insert(row),
            other => other.apply(table).map(|()| None),
        }
    }

    fn reserve_identity(&self, name: &str, row: &mut Record) -> CoreResult<Option<Value>> {
        let mut tables = self.database.tables.lock();
        let table = tables.get_mut(name).ok_or_else(|| MemoryDatabase::missing(name))?;
        let Some(key) = table.def.key().filter(|k| k.identity).map(|k| k.name.clone()) else {
            return Ok(None);
        };
        if row.get(&key).and_then(Value::as_integer).is_some() {
            return Ok(None);
        }
        let id = Value::Integer(table.next_identity);
        table.next_identity += 1;
        row.insert(key, id.clone());
        Ok(Some(id))
    }
}

impl RowStore for MemoryRowStore {
    fn begin(&mut self, isolation: IsolationLevel) -> CoreResult<()> {
        if self.transaction.is_some() {
            return Err(CoreError::invalid_operation("transaction already open"));
        }
        tracing::trace!(database = %self.database.name, %isolation, "memory transaction started");
        self.transaction = Some(Transaction::default());
        Ok(())
    }

    fn commit(&mut self) -> CoreResult<()> {
        let Some(transaction) = self.transaction.take() else {
            return Ok(());
        };
        let mut tables = self.database.tables.lock();
        let mut staged: HashMap<String, MemoryTable> = HashMap::new();
        for (name, write) in &transaction.log {
            if !staged.contains_key(name) {
                let current = tables.get(name).cloned().ok_or_else(|| MemoryDatabase::missing(name))?;
                staged.insert(name.clone(), current);
            }
            if let Some(table) = staged.get_mut(name) {
                write.apply(table)?;
            }
        }
        for (name, mut table) in staged {
            if let Some(shared) = tables.get(&name) {
                table.next_identity = table.next_identity.max(shared.next_identity);
            }
            tables.insert(name, table);
        }
        Ok(())
    }

    fn rollback(&mut self) -> CoreResult<()> {
        self.transaction = None;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    fn select(&mut self, table: &TableDef, filter: &Filter) -> CoreResult<Vec<Record>> {
        self.visible(&table.name, filter)
    }

    fn insert(&mut self, table: &TableDef, record: &Record) -> CoreResult<Option<Value>> {
        self.write(&table.name, Write::Insert(record.clone()))
    }

    fn update(&mut self, table: &TableDef, set: &Record, filter: &Filter) -> CoreResult<u64> {
        let count = self.visible(&table.name, filter)?.len() as u64;
        self.write(&table.name, Write::Update(set.clone(), filter.to_vec()))?;
        Ok(count)
    }

    fn delete(&mut self, table: &TableDef, filter: &Filter) -> CoreResult<u64> {
        let count = self.visible(&table.name, filter)?.len() as u64;
        self.write(&table.name, Write::Delete(filter.to_vec()))?;
        Ok(count)
    }

    /// Tables are shared, so creation is not undone by a rollback.
    fn create(&mut self, table: &TableDef) -> CoreResult<()> {
        self.database.create(table);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::ValueKind;
    use crate::relational::schema::ColumnDef;
    use crate::relational::store::eq;

    fn users() -> TableDef {
        let mut table = TableDef::new("users");
        table
            .columns
            .push(ColumnDef::new("id", ValueKind::Integer).primary_key(true));
        let mut email = ColumnDef::new("email", ValueKind::Text).nullable(false);
        email.unique = true;
        table.columns.push(email);
        table
    }

    fn row(email: &str) -> Record {
        let mut record = Record::new();
        record.insert("email".into(), Value::from(email));
        record
    }

    fn factory() -> MemoryRowStoreFactory {
        let factory = MemoryRowStoreFactory::new(Arc::new(MemoryDatabase::new("t")));
        factory.install(&users()).unwrap();
        factory
    }

    #[test]
    fn autocommit_generates_identity() {
        let factory = factory();
        let mut store = factory.open().unwrap();
        assert_eq!(store.insert(&users(), &row("a")).unwrap(), Some(Value::Integer(1)));
        assert_eq!(store.insert(&users(), &row("b")).unwrap(), Some(Value::Integer(2)));
        assert_eq!(factory.database_handle().row_count("users"), 2);
    }

    #[test]
    fn unique_and_not_null_enforced() {
        let factory = factory();
        let mut store = factory.open().unwrap();
        store.insert(&users(), &row("a")).unwrap();
        assert!(matches!(
            store.insert(&users(), &row("a")),
            Err(CoreError::ConstraintViolation { .. })
        ));
        assert!(matches!(
            store.insert(&users(), &Record::new()),
            Err(CoreError::ConstraintViolation { .. })
        ));
    }

    #[test]
    fn transaction_is_private_until_commit() {
        let factory = factory();
        let mut writer = factory.open().unwrap();
        let mut reader = factory.open().unwrap();
        writer.begin(IsolationLevel::ReadCommitted).unwrap();
        writer.insert(&users(), &row("a")).unwrap();
        assert_eq!(writer.select(&users(), &[]).unwrap().len(), 1);
        assert!(reader.select(&users(), &[]).unwrap().is_empty());
        writer.commit().unwrap();
        assert_eq!(reader.select(&users(), &[]).unwrap().len(), 1);
    }

    #[test]
    fn reads_see_commits_until_the_table_is_written() {
        let factory = factory();
        let mut reader = factory.open().unwrap();
        let mut writer = factory.open().unwrap();
        reader.begin(IsolationLevel::ReadCommitted).unwrap();
        assert!(reader.select(&users(), &[]).unwrap().is_empty());

        writer.insert(&users(), &row("a")).unwrap();
        assert_eq!(reader.select(&users(), &[]).unwrap().len(), 1);

        reader.insert(&users(), &row("b")).unwrap();
        writer.insert(&users(), &row("c")).unwrap();
        let emails: Vec<Value> = reader
            .select(&users(), &[])
            .unwrap()
            .into_iter()
            .map(|r| r["email"].clone())
            .collect();
        assert_eq!(emails, vec![Value::from("a"), Value::from("b")]);
        reader.commit().unwrap();
        assert_eq!(factory.database_handle().row_count("users"), 3);
    }

    #[test]
    fn rollback_discards() {
        let factory = factory();
        let mut store = factory.open().unwrap();
        store.begin(IsolationLevel::Serializable).unwrap();
        store.insert(&users(), &row("a")).unwrap();
        store.rollback().unwrap();
        assert_eq!(factory.database_handle().row_count("users"), 0);
    }

    #[test]
    fn update_and_delete_counts() {
        let factory = factory();
        let mut store = factory.open().unwrap();
        store.insert(&users(), &row("a")).unwrap();
        store.insert(&users(), &row("b")).unwrap();
        store.begin(IsolationLevel::ReadCommitted).unwrap();
        let n = store
            .update(&users(), &row("c"), &eq("email", Value::from("a")))
            .unwrap();
        assert_eq!(n, 1);
        assert!(matches!(
            store.update(&users(), &row("b"), &eq("email", Value::from("c"))),
            Err(CoreError::ConstraintViolation { .. })
        ));
        assert_eq!(store.delete(&users(), &eq("email", Value::from("b"))).unwrap(), 1);
        store.commit().unwrap();
        let rows = store.select(&users(), &[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["email"], Value::from("c"));
    }

    #[test]
    fn conflicting_commit_applies_nothing() {
        let factory = factory();
        let mut first = factory.open().unwrap();
        let mut second = factory.open().unwrap();
        first.begin(IsolationLevel::ReadCommitted).unwrap();
        second.begin(IsolationLevel::ReadCommitted).unwrap();
        first.insert(&users(), &row("x")).unwrap();
        second.insert(&users(), &row("y")).unwrap();
        second.insert(&users(), &row("x")).unwrap();
        first.commit().unwrap();
        assert!(matches!(second.commit(), Err(CoreError::ConstraintViolation { .. })));
        let emails: Vec<Value> = first
            .select(&users(), &[])
            .unwrap()
            .into_iter()
            .map(|r| r["email"].clone())
            .collect();
        assert_eq!(emails, vec![Value::from("x")]);
    }
}

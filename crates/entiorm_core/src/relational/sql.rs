//! Driver seam and the SQL implementation of [`RowStore`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use entiorm_codec::Value;
use parking_lot::Mutex;

use super::dialect::{Dialect, InsertReturning};
use super::schema::TableDef;
use super::store::{Filter, RowStore, RowStoreFactory};
use crate::entity::Record;
use crate::error::{CoreError, CoreResult};
use crate::types::{DatabaseKind, IsolationLevel};

/// A database driver that opens [`SqlConnection`]s.
///
/// SQLite ships with the crate; drivers for the other relational
/// databases are registered through the resolver.
pub trait SqlDriver: Send + Sync {
    /// Database this driver talks to.
    fn database(&self) -> DatabaseKind;

    /// Rewrites a configured connection string once per factory.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfiguration`] if it is unusable.
    fn prepare(&self, connection_string: &str) -> CoreResult<String> {
        Ok(connection_string.to_string())
    }

    /// Opens a connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be reached.
    fn connect(
        &self,
        connection_string: &str,
        lock_timeout: Duration,
    ) -> CoreResult<Box<dyn SqlConnection>>;
}

/// One open database connection.
///
/// Key, unique and not-null failures are reported as
/// [`CoreError::ConstraintViolation`]; the table name may be left empty.
pub trait SqlConnection: Send {
    /// Runs a statement. Returns the affected row count.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    fn execute(&mut self, sql: &str, params: &[Value]) -> CoreResult<u64>;

    /// Runs a query. Returns every row as a list of column values.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn query(&mut self, sql: &str, params: &[Value]) -> CoreResult<Vec<Vec<Value>>>;
}

fn on_table(table: &str) -> impl FnOnce(CoreError) -> CoreError + '_ {
    move |error| match error {
        CoreError::ConstraintViolation { table: t, message } if t.is_empty() => {
            CoreError::constraint_violation(table, message)
        }
        other => other,
    }
}

/// [`RowStore`] speaking SQL over one connection.
pub struct SqlRowStore {
    dialect: Dialect,
    connection: Box<dyn SqlConnection>,
    in_transaction: bool,
}

impl SqlRowStore {
    /// Wraps an open connection.
    #[must_use]
    pub fn new(dialect: Dialect, connection: Box<dyn SqlConnection>) -> Self {
        Self {
            dialect,
            connection,
            in_transaction: false,
        }
    }

    /// Appends `WHERE ...` for `filter`, numbering placeholders after
    /// `params`.
    fn where_clause(&self, sql: &mut String, filter: &Filter, params: &mut Vec<Value>) {
        if filter.is_empty() {
            return;
        }
        let mut parts = Vec::with_capacity(filter.len());
        for (column, value) in filter {
            let column = self.dialect.quote(column);
            if value.is_null() {
                parts.push(format!("{column} IS NULL"));
            } else {
                params.push(value.clone());
                parts.push(format!("{column} = {}", self.dialect.placeholder(params.len())));
            }
        }
        sql.push_str(" WHERE ");
        sql.push_str(&parts.join(" AND "));
    }
}

impl fmt::Debug for SqlRowStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlRowStore")
            .field("dialect", &self.dialect)
            .field("in_transaction", &self.in_transaction)
            .finish_non_exhaustive()
    }
}

impl RowStore for SqlRowStore {
    fn begin(&mut self, isolation: IsolationLevel) -> CoreResult<()> {
        if self.in_transaction {
            return Err(CoreError::invalid_operation("transaction already open"));
        }
        for statement in self.dialect.begin(isolation) {
            self.connection.execute(&statement, &[])?;
        }
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> CoreResult<()> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.connection.execute(self.dialect.commit(), &[])?;
        Ok(())
    }

    fn rollback(&mut self) -> CoreResult<()> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.connection.execute(self.dialect.rollback(), &[])?;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn select(&mut self, table: &TableDef, filter: &Filter) -> CoreResult<Vec<Record>> {
        let columns: Vec<String> = table
            .columns
            .iter()
            .map(|c| self.dialect.quote(&c.name))
            .collect();
        let mut sql = format!(
            "SELECT {} FROM {}",
            columns.join(", "),
            self.dialect.quote(&table.name)
        );
        let mut params = Vec::new();
        self.where_clause(&mut sql, filter, &mut params);
        if let Some(key) = table.key() {
            sql.push_str(&format!(" ORDER BY {}", self.dialect.quote(&key.name)));
        }

        let rows = self.connection.query(&sql, &params)?;
        Ok(rows
            .into_iter()
            .map(|values| {
                table
                    .columns
                    .iter()
                    .map(|c| c.name.clone())
                    .zip(values)
                    .collect()
            })
            .collect())
    }

    fn insert(&mut self, table: &TableDef, record: &Record) -> CoreResult<Option<Value>> {
        let identity = table
            .key()
            .filter(|k| k.identity && record.get(&k.name).map_or(true, Value::is_null));
        let columns: Vec<&String> = table
            .columns
            .iter()
            .map(|c| &c.name)
            .filter(|name| record.contains_key(*name) && identity.map_or(true, |k| &k.name != *name))
            .collect();
        let params: Vec<Value> = columns.iter().map(|c| record[*c].clone()).collect();
        let names = columns
            .iter()
            .map(|c| self.dialect.quote(c))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=params.len())
            .map(|n| self.dialect.placeholder(n))
            .collect::<Vec<_>>()
            .join(", ");
        let table_name = self.dialect.quote(&table.name);
        let values = if columns.is_empty() {
            "DEFAULT VALUES".to_string()
        } else {
            format!("({names}) VALUES ({placeholders})")
        };

        let Some(key) = identity else {
            self.connection
                .execute(&format!("INSERT INTO {table_name} {values}"), &params)
                .map_err(on_table(&table.name))?;
            return Ok(None);
        };

        let key_name = self.dialect.quote(&key.name);
        let rows = match self.dialect.insert_returning() {
            InsertReturning::Returning => self
                .connection
                .query(
                    &format!("INSERT INTO {table_name} {values} RETURNING {key_name}"),
                    &params,
                )
                .map_err(on_table(&table.name))?,
            InsertReturning::Output => {
                let sql = if columns.is_empty() {
                    format!("INSERT INTO {table_name} OUTPUT INSERTED.{key_name} DEFAULT VALUES")
                } else {
                    format!(
                        "INSERT INTO {table_name} ({names}) OUTPUT INSERTED.{key_name} VALUES ({placeholders})"
                    )
                };
                self.connection
                    .query(&sql, &params)
                    .map_err(on_table(&table.name))?
            }
            InsertReturning::LastInsertId => {
                let values = if columns.is_empty() {
                    "() VALUES ()".to_string()
                } else {
                    values
                };
                self.connection
                    .execute(&format!("INSERT INTO {table_name} {values}"), &params)
                    .map_err(on_table(&table.name))?;
                self.connection.query("SELECT LAST_INSERT_ID()", &[])?
            }
        };
        rows.into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .map(Some)
            .ok_or_else(|| CoreError::sql(format!("insert into {} returned no key", table.name)))
    }

    fn update(&mut self, table: &TableDef, set: &Record, filter: &Filter) -> CoreResult<u64> {
        if set.is_empty() {
            return Err(CoreError::invalid_operation("update without columns"));
        }
        let mut params: Vec<Value> = Vec::with_capacity(set.len() + filter.len());
        let mut assignments = Vec::with_capacity(set.len());
        for (column, value) in set {
            params.push(value.clone());
            assignments.push(format!(
                "{} = {}",
                self.dialect.quote(column),
                self.dialect.placeholder(params.len())
            ));
        }
        let mut sql = format!(
            "UPDATE {} SET {}",
            self.dialect.quote(&table.name),
            assignments.join(", ")
        );
        self.where_clause(&mut sql, filter, &mut params);
        self.connection
            .execute(&sql, &params)
            .map_err(on_table(&table.name))
    }

    fn delete(&mut self, table: &TableDef, filter: &Filter) -> CoreResult<u64> {
        let mut sql = format!("DELETE FROM {}", self.dialect.quote(&table.name));
        let mut params = Vec::new();
        self.where_clause(&mut sql, filter, &mut params);
        self.connection
            .execute(&sql, &params)
            .map_err(on_table(&table.name))
    }

    fn create(&mut self, table: &TableDef) -> CoreResult<()> {
        create_table(self.dialect, self.connection.as_mut(), table)
    }
}

/// Runs the idempotent DDL for `table` on `connection`.
fn create_table(dialect: Dialect, connection: &mut dyn SqlConnection, table: &TableDef) -> CoreResult<()> {
    for statement in dialect.create_table(table) {
        tracing::debug!(table = %table.name, sql = %statement, "applying DDL");
        connection.execute(&statement, &[]).map_err(on_table(&table.name))?;
    }
    Ok(())
}

/// Opens [`SqlRowStore`]s through a driver.
///
/// The factory keeps one administrative connection for schema
/// installation; it also keeps shared in-memory databases alive.
pub struct SqlRowStoreFactory {
    dialect: Dialect,
    driver: Arc<dyn SqlDriver>,
    connection_string: String,
    lock_timeout: Duration,
    admin: Mutex<Box<dyn SqlConnection>>,
}

impl SqlRowStoreFactory {
    /// Prepares the connection string and opens the administrative
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver cannot connect.
    pub fn new(
        driver: Arc<dyn SqlDriver>,
        connection_string: &str,
        lock_timeout: Duration,
    ) -> CoreResult<Self> {
        let database = driver.database();
        let dialect = Dialect::for_database(database).ok_or_else(|| {
            CoreError::invalid_configuration(format!("{database} is not a SQL database"))
        })?;
        let connection_string = driver.prepare(connection_string)?;
        let admin = driver.connect(&connection_string, lock_timeout)?;
        Ok(Self {
            dialect,
            driver,
            connection_string,
            lock_timeout,
            admin: Mutex::new(admin),
        })
    }

    /// The dialect in use.
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }
}

impl fmt::Debug for SqlRowStoreFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlRowStoreFactory")
            .field("dialect", &self.dialect)
            .field("lock_timeout", &self.lock_timeout)
            .finish_non_exhaustive()
    }
}

impl RowStoreFactory for SqlRowStoreFactory {
    fn database(&self) -> DatabaseKind {
        self.driver.database()
    }

    fn open(&self) -> CoreResult<Box<dyn RowStore>> {
        let connection = self
            .driver
            .connect(&self.connection_string, self.lock_timeout)?;
        Ok(Box::new(SqlRowStore::new(self.dialect, connection)))
    }

    fn install(&self, table: &TableDef) -> CoreResult<()> {
        let mut admin = self.admin.lock();
        create_table(self.dialect, &mut **admin, table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::ValueKind;
    use crate::relational::schema::ColumnDef;
    use crate::relational::store::eq;

    /// Records statements and answers queries from a script.
    #[derive(Default)]
    struct Recorder {
        log: Arc<Mutex<Vec<(String, Vec<Value>)>>>,
        answers: Vec<Vec<Vec<Value>>>,
    }

    impl SqlConnection for Recorder {
        fn execute(&mut self, sql: &str, params: &[Value]) -> CoreResult<u64> {
            self.log.lock().push((sql.to_string(), params.to_vec()));
            Ok(1)
        }

        fn query(&mut self, sql: &str, params: &[Value]) -> CoreResult<Vec<Vec<Value>>> {
            self.log.lock().push((sql.to_string(), params.to_vec()));
            Ok(if self.answers.is_empty() {
                Vec::new()
            } else {
                self.answers.remove(0)
            })
        }
    }

    fn people() -> TableDef {
        let mut table = TableDef::new("people");
        table
            .columns
            .push(ColumnDef::new("id", ValueKind::Integer).primary_key(true));
        table.columns.push(ColumnDef::new("name", ValueKind::Text));
        table
    }

    fn store(dialect: Dialect, answers: Vec<Vec<Vec<Value>>>) -> (SqlRowStore, Arc<Mutex<Vec<(String, Vec<Value>)>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let connection = Recorder {
            log: Arc::clone(&log),
            answers,
        };
        (SqlRowStore::new(dialect, Box::new(connection)), log)
    }

    fn named(name: &str) -> Record {
        let mut record = Record::new();
        record.insert("name".into(), Value::from(name));
        record
    }

    #[test]
    fn postgres_insert_returns_key() {
        let (mut store, log) = store(Dialect::PostgreSql, vec![vec![vec![Value::Integer(9)]]]);
        let key = store.insert(&people(), &named("ann")).unwrap();
        assert_eq!(key, Some(Value::Integer(9)));
        let log = log.lock();
        assert_eq!(
            log[0].0,
            "INSERT INTO \"people\" (\"name\") VALUES ($1) RETURNING \"id\""
        );
        assert_eq!(log[0].1, vec![Value::from("ann")]);
    }

    #[test]
    fn mssql_uses_output_clause() {
        let (mut store, log) = store(Dialect::MsSql, vec![vec![vec![Value::Integer(3)]]]);
        store.insert(&people(), &named("bo")).unwrap();
        assert_eq!(
            log.lock()[0].0,
            "INSERT INTO [people] ([name]) OUTPUT INSERTED.[id] VALUES (@p1)"
        );
    }

    #[test]
    fn mysql_reads_last_insert_id() {
        let (mut store, log) = store(Dialect::MySql, vec![vec![vec![Value::Integer(4)]]]);
        assert_eq!(store.insert(&people(), &named("cy")).unwrap(), Some(Value::Integer(4)));
        assert_eq!(log.lock()[1].0, "SELECT LAST_INSERT_ID()");
    }

    #[test]
    fn update_numbers_filter_after_set() {
        let (mut store, log) = store(Dialect::PostgreSql, Vec::new());
        store
            .update(&people(), &named("di"), &eq("id", Value::Integer(1)))
            .unwrap();
        let log = log.lock();
        assert_eq!(log[0].0, "UPDATE \"people\" SET \"name\" = $1 WHERE \"id\" = $2");
        assert_eq!(log[0].1, vec![Value::from("di"), Value::Integer(1)]);
    }

    #[test]
    fn null_filter_uses_is_null() {
        let (mut store, log) = store(Dialect::Sqlite, Vec::new());
        store.delete(&people(), &eq("name", Value::Null)).unwrap();
        assert_eq!(log.lock()[0].0, "DELETE FROM \"people\" WHERE \"name\" IS NULL");
    }

    #[test]
    fn select_maps_columns() {
        let (mut store, _) = store(
            Dialect::Sqlite,
            vec![vec![vec![Value::Integer(1), Value::from("ann")]]],
        );
        let rows = store.select(&people(), &[]).unwrap();
        assert_eq!(rows[0]["id"], Value::Integer(1));
        assert_eq!(rows[0]["name"], Value::from("ann"));
    }

    #[test]
    fn transaction_statements() {
        let (mut store, log) = store(Dialect::MySql, Vec::new());
        store.begin(IsolationLevel::Serializable).unwrap();
        assert!(store.in_transaction());
        store.commit().unwrap();
        store.rollback().unwrap();
        let statements: Vec<String> = log.lock().iter().map(|(s, _)| s.clone()).collect();
        assert_eq!(
            statements,
            vec![
                "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE".to_string(),
                "START TRANSACTION".to_string(),
                "COMMIT".to_string(),
            ]
        );
    }
}

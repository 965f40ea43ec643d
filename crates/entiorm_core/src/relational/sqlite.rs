//! Bundled SQLite driver.

use std::time::Duration;

use entiorm_codec::Value;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, ErrorCode, OpenFlags};

use super::sql::{SqlConnection, SqlDriver};
use crate::config::ConnectionString;
use crate::error::{CoreError, CoreResult};
use crate::types::DatabaseKind;

const MEMORY: &str = ":memory:";

/// SQLite through `rusqlite`.
///
/// Connection string: `Data Source=<path>` or a bare path. `:memory:`
/// becomes a named shared-cache database, so every connection of one
/// factory sees the same data for as long as the factory lives.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

impl SqliteDriver {
    fn path(connection_string: &str) -> CoreResult<String> {
        let parsed = ConnectionString::parse(connection_string);
        parsed
            .get(&["data source", "datasource", "filename"])
            .or_else(|| parsed.bare())
            .map(str::to_string)
            .ok_or_else(|| {
                CoreError::invalid_configuration("SQLite connection string needs Data Source=<path>")
            })
    }
}

impl SqlDriver for SqliteDriver {
    fn database(&self) -> DatabaseKind {
        DatabaseKind::Sqlite
    }

    fn prepare(&self, connection_string: &str) -> CoreResult<String> {
        let path = Self::path(connection_string)?;
        if path == MEMORY {
            return Ok(format!(
                "file:entiorm_{}?mode=memory&cache=shared",
                uuid::Uuid::new_v4().simple()
            ));
        }
        Ok(path)
    }

    fn connect(
        &self,
        connection_string: &str,
        lock_timeout: Duration,
    ) -> CoreResult<Box<dyn SqlConnection>> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let connection = Connection::open_with_flags(connection_string, flags).map_err(sql_error)?;
        connection.busy_timeout(lock_timeout).map_err(sql_error)?;
        if !connection_string.contains("mode=memory") {
            let mode: String = connection
                .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
                .map_err(sql_error)?;
            tracing::trace!(journal_mode = %mode, "sqlite connection opened");
        }
        Ok(Box::new(SqliteConnection { connection }))
    }
}

struct SqliteConnection {
    connection: Connection,
}

fn sql_error(error: rusqlite::Error) -> CoreError {
    match error.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => CoreError::ConstraintViolation {
            table: String::new(),
            message: error.to_string(),
        },
        _ => CoreError::sql(error.to_string()),
    }
}

fn to_sql(value: &Value) -> CoreResult<SqlValue> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Integer(n) => SqlValue::Integer(*n),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Bytes(b) => SqlValue::Blob(b.clone()),
        other => {
            return Err(CoreError::sql(format!(
                "cannot bind {} as a SQLite parameter",
                other.type_name()
            )))
        }
    })
}

fn from_sql(value: ValueRef<'_>) -> CoreResult<Value> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Integer(n),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) => Value::Text(
            String::from_utf8(bytes.to_vec())
                .map_err(|e| CoreError::sql(format!("invalid UTF-8 in text column: {e}")))?,
        ),
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    })
}

fn bind(params: &[Value]) -> CoreResult<Vec<SqlValue>> {
    params.iter().map(to_sql).collect()
}

impl SqlConnection for SqliteConnection {
    fn execute(&mut self, sql: &str, params: &[Value]) -> CoreResult<u64> {
        let params = bind(params)?;
        let changed = self
            .connection
            .execute(sql, rusqlite::params_from_iter(params.iter()))
            .map_err(sql_error)?;
        Ok(changed as u64)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> CoreResult<Vec<Vec<Value>>> {
        let params = bind(params)?;
        let mut statement = self.connection.prepare(sql).map_err(sql_error)?;
        let width = statement.column_count();
        let mut rows = statement
            .query(rusqlite::params_from_iter(params.iter()))
            .map_err(sql_error)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(sql_error)? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(from_sql(row.get_ref(i).map_err(sql_error)?)?);
            }
            out.push(values);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(driver: &SqliteDriver, cs: &str) -> Box<dyn SqlConnection> {
        driver.connect(cs, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn memory_database_is_shared_per_prepared_string() {
        let driver = SqliteDriver;
        let cs = driver.prepare("Data Source=:memory:").unwrap();
        assert!(cs.starts_with("file:entiorm_"));
        let mut first = connect(&driver, &cs);
        let mut second = connect(&driver, &cs);
        first
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", &[])
            .unwrap();
        first
            .execute("INSERT INTO t (name) VALUES (?1)", &[Value::from("a")])
            .unwrap();
        let rows = second.query("SELECT id, name FROM t", &[]).unwrap();
        assert_eq!(rows, vec![vec![Value::Integer(1), Value::from("a")]]);
    }

    #[test]
    fn constraint_errors_are_classified() {
        let driver = SqliteDriver;
        let cs = driver.prepare(":memory:").unwrap();
        let mut conn = connect(&driver, &cs);
        conn.execute("CREATE TABLE u (email TEXT NOT NULL UNIQUE)", &[])
            .unwrap();
        conn.execute("INSERT INTO u (email) VALUES (?1)", &[Value::from("x")])
            .unwrap();
        let err = conn
            .execute("INSERT INTO u (email) VALUES (?1)", &[Value::from("x")])
            .unwrap_err();
        assert!(matches!(err, CoreError::ConstraintViolation { .. }));
    }

    #[test]
    fn file_database_and_returning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.db");
        let driver = SqliteDriver;
        let cs = driver
            .prepare(&format!("Data Source={}", path.display()))
            .unwrap();
        let mut conn = connect(&driver, &cs);
        conn.execute(
            "CREATE TABLE b (id INTEGER PRIMARY KEY AUTOINCREMENT, data BLOB, ok INTEGER)",
            &[],
        )
        .unwrap();
        let rows = conn
            .query(
                "INSERT INTO b (data, ok) VALUES (?1, ?2) RETURNING id",
                &[Value::Bytes(vec![1, 2]), Value::Bool(true)],
            )
            .unwrap();
        assert_eq!(rows, vec![vec![Value::Integer(1)]]);
        let rows = conn.query("SELECT data, ok FROM b", &[]).unwrap();
        assert_eq!(rows[0], vec![Value::Bytes(vec![1, 2]), Value::Integer(1)]);
    }

    #[test]
    fn missing_path_is_configuration_error() {
        assert!(matches!(
            SqliteDriver.prepare("Mode=ReadOnly"),
            Err(CoreError::InvalidConfiguration { .. })
        ));
    }
}

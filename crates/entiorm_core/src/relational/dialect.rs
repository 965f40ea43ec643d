//! SQL text for the four supported relational databases.

use super::schema::{ColumnDef, TableDef};
use crate::entity::ValueKind;
use crate::types::{DatabaseKind, IsolationLevel};

/// How a database hands back a generated identity after `INSERT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertReturning {
    /// `INSERT ... RETURNING key`.
    Returning,
    /// `INSERT ... OUTPUT INSERTED.key VALUES ...`.
    Output,
    /// A follow-up `SELECT LAST_INSERT_ID()`.
    LastInsertId,
}

/// SQL dialect of one relational database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Microsoft SQL Server.
    MsSql,
    /// SQLite 3.
    Sqlite,
    /// MySQL / MariaDB.
    MySql,
    /// PostgreSQL.
    PostgreSql,
}

impl Dialect {
    /// Dialect for a relational database kind.
    #[must_use]
    pub const fn for_database(database: DatabaseKind) -> Option<Self> {
        match database {
            DatabaseKind::MsSql => Some(Self::MsSql),
            DatabaseKind::Sqlite => Some(Self::Sqlite),
            DatabaseKind::MySql => Some(Self::MySql),
            DatabaseKind::PostgreSql => Some(Self::PostgreSql),
            DatabaseKind::Document | DatabaseKind::InMemory => None,
        }
    }

    /// Quotes an identifier.
    #[must_use]
    pub fn quote(self, ident: &str) -> String {
        match self {
            Self::MsSql => format!("[{}]", ident.replace(']', "]]")),
            Self::MySql => format!("`{}`", ident.replace('`', "``")),
            Self::Sqlite | Self::PostgreSql => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Placeholder for the `n`th parameter, 1-based.
    #[must_use]
    pub fn placeholder(self, n: usize) -> String {
        match self {
            Self::MsSql => format!("@p{n}"),
            Self::Sqlite => format!("?{n}"),
            Self::MySql => "?".to_string(),
            Self::PostgreSql => format!("${n}"),
        }
    }

    /// Generated-key strategy.
    #[must_use]
    pub const fn insert_returning(self) -> InsertReturning {
        match self {
            Self::MsSql => InsertReturning::Output,
            Self::MySql => InsertReturning::LastInsertId,
            Self::Sqlite | Self::PostgreSql => InsertReturning::Returning,
        }
    }

    /// Native column type.
    #[must_use]
    pub fn column_type(self, table: &TableDef, column: &ColumnDef) -> String {
        if let Some(custom) = &column.custom_type {
            return custom.clone();
        }
        let bounded = column
            .length
            .or_else(|| table.is_indexed(&column.name).then(|| self.max_indexed_text()));
        match (self, column.kind) {
            (Self::MsSql, ValueKind::Integer) => "BIGINT".into(),
            (Self::MsSql, ValueKind::Float) => "FLOAT".into(),
            (Self::MsSql, ValueKind::Bool) => "BIT".into(),
            (Self::MsSql, ValueKind::Text) => match bounded {
                Some(n) => format!("NVARCHAR({n})"),
                None => "NVARCHAR(MAX)".into(),
            },
            (Self::MsSql, ValueKind::Bytes) => "VARBINARY(MAX)".into(),
            (Self::MsSql, ValueKind::Uuid) => "CHAR(36)".into(),

            (Self::Sqlite, ValueKind::Integer | ValueKind::Bool) => "INTEGER".into(),
            (Self::Sqlite, ValueKind::Float) => "REAL".into(),
            (Self::Sqlite, ValueKind::Text | ValueKind::Uuid) => "TEXT".into(),
            (Self::Sqlite, ValueKind::Bytes) => "BLOB".into(),

            (Self::MySql, ValueKind::Integer) => "BIGINT".into(),
            (Self::MySql, ValueKind::Float) => "DOUBLE".into(),
            (Self::MySql, ValueKind::Bool) => "BOOLEAN".into(),
            (Self::MySql, ValueKind::Text) => match bounded {
                Some(n) => format!("VARCHAR({n})"),
                None => "LONGTEXT".into(),
            },
            (Self::MySql, ValueKind::Bytes) => "LONGBLOB".into(),
            (Self::MySql, ValueKind::Uuid) => "CHAR(36)".into(),

            (Self::PostgreSql, ValueKind::Integer) => "BIGINT".into(),
            (Self::PostgreSql, ValueKind::Float) => "DOUBLE PRECISION".into(),
            (Self::PostgreSql, ValueKind::Bool) => "BOOLEAN".into(),
            (Self::PostgreSql, ValueKind::Text) => match column.length {
                Some(n) => format!("VARCHAR({n})"),
                None => "TEXT".into(),
            },
            (Self::PostgreSql, ValueKind::Bytes) => "BYTEA".into(),
            (Self::PostgreSql, ValueKind::Uuid) => "CHAR(36)".into(),
        }
    }

    /// Longest text an index can hold.
    const fn max_indexed_text(self) -> u32 {
        match self {
            Self::MsSql => 450,
            _ => 255,
        }
    }

    fn column_sql(self, table: &TableDef, column: &ColumnDef) -> String {
        let name = self.quote(&column.name);
        if column.identity {
            return match self {
                Self::MsSql => format!("{name} BIGINT IDENTITY(1,1) PRIMARY KEY"),
                Self::Sqlite => format!("{name} INTEGER PRIMARY KEY AUTOINCREMENT"),
                Self::MySql => format!("{name} BIGINT AUTO_INCREMENT PRIMARY KEY"),
                Self::PostgreSql => format!("{name} BIGSERIAL PRIMARY KEY"),
            };
        }
        let mut sql = format!("{name} {}", self.column_type(table, column));
        if column.primary_key {
            sql.push_str(" NOT NULL PRIMARY KEY");
        } else {
            if !column.nullable {
                sql.push_str(" NOT NULL");
            }
            if column.unique {
                sql.push_str(" UNIQUE");
            }
        }
        sql
    }

    /// Statements creating `table` and its indexes unless they exist.
    #[must_use]
    pub fn create_table(self, table: &TableDef) -> Vec<String> {
        let mut body: Vec<String> = table
            .columns
            .iter()
            .map(|c| self.column_sql(table, c))
            .collect();
        let name = self.quote(&table.name);

        if self == Self::MySql {
            for index in &table.indexes {
                body.push(format!(
                    "{}INDEX {} ({})",
                    if index.unique { "UNIQUE " } else { "" },
                    self.quote(&index.name),
                    self.column_list(&index.columns)
                ));
            }
            return vec![format!(
                "CREATE TABLE IF NOT EXISTS {name} ({})",
                body.join(", ")
            )];
        }

        let mut statements = vec![match self {
            Self::MsSql => format!(
                "IF OBJECT_ID(N'{}', N'U') IS NULL CREATE TABLE {name} ({})",
                name.replace('\'', "''"),
                body.join(", ")
            ),
            _ => format!("CREATE TABLE IF NOT EXISTS {name} ({})", body.join(", ")),
        }];
        for index in &table.indexes {
            let unique = if index.unique { "UNIQUE " } else { "" };
            let columns = self.column_list(&index.columns);
            statements.push(match self {
                Self::MsSql => format!(
                    "IF NOT EXISTS (SELECT 1 FROM sys.indexes WHERE name = N'{}' AND object_id = OBJECT_ID(N'{}')) CREATE {unique}INDEX {} ON {name} ({columns})",
                    index.name.replace('\'', "''"),
                    name.replace('\'', "''"),
                    self.quote(&index.name)
                ),
                _ => format!(
                    "CREATE {unique}INDEX IF NOT EXISTS {} ON {name} ({columns})",
                    self.quote(&index.name)
                ),
            });
        }
        statements
    }

    fn column_list(self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quote(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Statements that open a transaction at `isolation`.
    #[must_use]
    pub fn begin(self, isolation: IsolationLevel) -> Vec<String> {
        let level = match (self, isolation) {
            (_, IsolationLevel::ReadUncommitted) => "READ UNCOMMITTED",
            (_, IsolationLevel::ReadCommitted) => "READ COMMITTED",
            (_, IsolationLevel::RepeatableRead) => "REPEATABLE READ",
            (Self::MsSql, IsolationLevel::Snapshot) => "SNAPSHOT",
            (Self::PostgreSql | Self::MySql, IsolationLevel::Snapshot) => "REPEATABLE READ",
            (_, IsolationLevel::Serializable | IsolationLevel::Snapshot) => "SERIALIZABLE",
        };
        match self {
            Self::MsSql => vec![
                format!("SET TRANSACTION ISOLATION LEVEL {level}"),
                "BEGIN TRANSACTION".into(),
            ],
            Self::MySql => vec![
                format!("SET TRANSACTION ISOLATION LEVEL {level}"),
                "START TRANSACTION".into(),
            ],
            Self::PostgreSql => vec![format!("BEGIN ISOLATION LEVEL {level}")],
            // SQLite is serializable; the level only decides when the write lock is taken.
            Self::Sqlite => match isolation {
                IsolationLevel::ReadUncommitted | IsolationLevel::ReadCommitted => {
                    vec!["BEGIN DEFERRED".into()]
                }
                _ => vec!["BEGIN IMMEDIATE".into()],
            },
        }
    }

    /// Statement committing the open transaction.
    #[must_use]
    pub const fn commit(self) -> &'static str {
        match self {
            Self::MsSql => "COMMIT TRANSACTION",
            _ => "COMMIT",
        }
    }

    /// Statement rolling back the open transaction.
    #[must_use]
    pub const fn rollback(self) -> &'static str {
        match self {
            Self::MsSql => "ROLLBACK TRANSACTION",
            _ => "ROLLBACK",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn products() -> TableDef {
        let mut table = TableDef::new("products");
        table
            .columns
            .push(ColumnDef::new("id", ValueKind::Integer).primary_key(true));
        let mut sku = ColumnDef::new("sku", ValueKind::Text).nullable(false);
        sku.unique = true;
        table.columns.push(sku);
        table.columns.push(ColumnDef::new("notes", ValueKind::Text));
        table.add_to_index("notes", "notes", false);
        table.columns.push(ColumnDef::new("blob", ValueKind::Bytes));
        table
    }

    #[test]
    fn sqlite_ddl() {
        let sql = Dialect::Sqlite.create_table(&products());
        assert_eq!(
            sql[0],
            "CREATE TABLE IF NOT EXISTS \"products\" (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT, \"sku\" TEXT NOT NULL UNIQUE, \"notes\" TEXT, \"blob\" BLOB)"
        );
        assert_eq!(
            sql[1],
            "CREATE INDEX IF NOT EXISTS \"IX_products_notes\" ON \"products\" (\"notes\")"
        );
    }

    #[test]
    fn mssql_bounds_indexed_text() {
        let table = products();
        let sku = table.column("sku").unwrap();
        let notes = table.column("notes").unwrap();
        assert_eq!(Dialect::MsSql.column_type(&table, sku), "NVARCHAR(450)");
        assert_eq!(Dialect::MsSql.column_type(&table, notes), "NVARCHAR(450)");
        let blob = table.column("blob").unwrap();
        assert_eq!(Dialect::MsSql.column_type(&table, blob), "VARBINARY(MAX)");
        assert!(Dialect::MsSql.create_table(&table)[0].starts_with("IF OBJECT_ID(N'[products]', N'U') IS NULL"));
    }

    #[test]
    fn mysql_inlines_indexes() {
        let sql = Dialect::MySql.create_table(&products());
        assert_eq!(sql.len(), 1);
        assert!(sql[0].contains("`sku` VARCHAR(255) NOT NULL UNIQUE"));
        assert!(sql[0].contains("INDEX `IX_products_notes` (`notes`)"));
        assert!(sql[0].contains("`id` BIGINT AUTO_INCREMENT PRIMARY KEY"));
    }

    #[test]
    fn custom_type_wins() {
        let table = products();
        let mut column = ColumnDef::new("price", ValueKind::Float);
        column.custom_type = Some("DECIMAL(10,2)".into());
        assert_eq!(Dialect::PostgreSql.column_type(&table, &column), "DECIMAL(10,2)");
    }

    #[test]
    fn quoting_and_placeholders() {
        assert_eq!(Dialect::MsSql.quote("a]b"), "[a]]b]");
        assert_eq!(Dialect::PostgreSql.quote("a\"b"), "\"a\"\"b\"");
        assert_eq!(Dialect::PostgreSql.placeholder(2), "$2");
        assert_eq!(Dialect::Sqlite.placeholder(3), "?3");
        assert_eq!(Dialect::MySql.placeholder(9), "?");
    }

    #[test]
    fn isolation_statements() {
        assert_eq!(
            Dialect::PostgreSql.begin(IsolationLevel::Snapshot),
            vec!["BEGIN ISOLATION LEVEL REPEATABLE READ".to_string()]
        );
        assert_eq!(
            Dialect::MsSql.begin(IsolationLevel::Snapshot)[0],
            "SET TRANSACTION ISOLATION LEVEL SNAPSHOT"
        );
        assert_eq!(
            Dialect::Sqlite.begin(IsolationLevel::Serializable),
            vec!["BEGIN IMMEDIATE".to_string()]
        );
    }
}

//! Backend identifiers and isolation levels.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::CoreError;

/// Concurrency-control strength requested for a context's transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum IsolationLevel {
    /// Dirty reads allowed.
    ReadUncommitted,
    /// Only committed data is read.
    ReadCommitted,
    /// Rows read stay stable for the transaction.
    RepeatableRead,
    /// Full serializability.
    Serializable,
    /// Snapshot isolation where the database offers it.
    Snapshot,
}

impl FromStr for IsolationLevel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "readuncommitted" => Ok(Self::ReadUncommitted),
            "readcommitted" => Ok(Self::ReadCommitted),
            "repeatableread" => Ok(Self::RepeatableRead),
            "serializable" => Ok(Self::Serializable),
            "snapshot" => Ok(Self::Snapshot),
            _ => Err(CoreError::invalid_configuration(format!(
                "unknown isolation level: {s}"
            ))),
        }
    }
}

impl TryFrom<String> for IsolationLevel {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReadUncommitted => "ReadUncommitted",
            Self::ReadCommitted => "ReadCommitted",
            Self::RepeatableRead => "RepeatableRead",
            Self::Serializable => "Serializable",
            Self::Snapshot => "Snapshot",
        };
        f.write_str(name)
    }
}

/// The ORM flavour that owns mapping compilation and save semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum OrmKind {
    /// Session ORM: identity map, dirty checking, merge on save.
    Session,
    /// Model ORM: change tracker, foreign-key delete behaviours.
    Model,
    /// Lightweight SQL mapper: direct statements, no relationships.
    Mapper,
    /// Document driver: per-operation atomic upserts.
    Document,
}

impl OrmKind {
    /// Whether this ORM targets relational databases.
    #[must_use]
    pub const fn is_relational(self) -> bool {
        !matches!(self, Self::Document)
    }
}

impl FromStr for OrmKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "session" | "nhibernate" => Ok(Self::Session),
            "model" | "efcore" => Ok(Self::Model),
            "mapper" | "dapper" => Ok(Self::Mapper),
            "document" | "mongodb" => Ok(Self::Document),
            _ => Err(CoreError::UnknownBackend {
                name: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for OrmKind {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for OrmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Session => "Session",
            Self::Model => "Model",
            Self::Mapper => "Mapper",
            Self::Document => "Document",
        };
        f.write_str(name)
    }
}

/// The database a factory connects to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum DatabaseKind {
    /// Microsoft SQL Server.
    MsSql,
    /// SQLite.
    Sqlite,
    /// MySQL / MariaDB.
    MySql,
    /// PostgreSQL.
    PostgreSql,
    /// The embedded document store.
    Document,
    /// In-process relational test database.
    InMemory,
}

impl DatabaseKind {
    /// Whether this database stores rows in tables.
    #[must_use]
    pub const fn is_relational(self) -> bool {
        !matches!(self, Self::Document)
    }

    /// ORM used when the configuration does not name one.
    #[must_use]
    pub const fn default_orm(self) -> OrmKind {
        match self {
            Self::Document => OrmKind::Document,
            _ => OrmKind::Session,
        }
    }
}

impl FromStr for DatabaseKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mssql" | "sqlserver" => Ok(Self::MsSql),
            "sqlite" => Ok(Self::Sqlite),
            "mysql" => Ok(Self::MySql),
            "postgresql" | "postgres" => Ok(Self::PostgreSql),
            "mongodb" | "document" => Ok(Self::Document),
            "inmemory" => Ok(Self::InMemory),
            _ => Err(CoreError::UnknownBackend {
                name: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for DatabaseKind {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MsSql => "MSSQL",
            Self::Sqlite => "SQLite",
            Self::MySql => "MySQL",
            Self::PostgreSql => "PostgreSQL",
            Self::Document => "MongoDB",
            Self::InMemory => "InMemory",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_names_are_case_insensitive() {
        assert_eq!("SQLITE".parse::<DatabaseKind>().unwrap(), DatabaseKind::Sqlite);
        assert_eq!("PostgreSQL".parse::<DatabaseKind>().unwrap(), DatabaseKind::PostgreSql);
        assert_eq!("mongodb".parse::<DatabaseKind>().unwrap(), DatabaseKind::Document);
        assert_eq!("InMemory".parse::<DatabaseKind>().unwrap(), DatabaseKind::InMemory);
    }

    #[test]
    fn unknown_database_is_fatal_configuration() {
        let err = "Oracle".parse::<DatabaseKind>().unwrap_err();
        assert!(matches!(err, CoreError::UnknownBackend { ref name } if name == "Oracle"));
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }

    #[test]
    fn orm_aliases() {
        assert_eq!("NHibernate".parse::<OrmKind>().unwrap(), OrmKind::Session);
        assert_eq!("efcore".parse::<OrmKind>().unwrap(), OrmKind::Model);
        assert_eq!("Dapper".parse::<OrmKind>().unwrap(), OrmKind::Mapper);
        assert!(!OrmKind::Document.is_relational());
    }

    #[test]
    fn isolation_level_parsing() {
        assert_eq!(
            "read committed".parse::<IsolationLevel>().unwrap(),
            IsolationLevel::ReadCommitted
        );
        assert_eq!(
            "SERIALIZABLE".parse::<IsolationLevel>().unwrap(),
            IsolationLevel::Serializable
        );
        assert!("chaos".parse::<IsolationLevel>().is_err());
    }
}

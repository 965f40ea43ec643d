//! Factory configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{CoreError, CoreResult};
use crate::types::{DatabaseKind, IsolationLevel, OrmKind};

/// Configuration for a [`crate::DatabaseContextFactory`].
///
/// Hosts usually deserialize this from their own settings file:
///
/// ```
/// # use entiorm_core::{DatabaseConfig, DatabaseKind, OrmKind};
/// let config: DatabaseConfig = serde_json::from_str(
///     r#"{ "orm": "Dapper", "database": "sqlite", "connection_string": "Data Source=app.db" }"#,
/// ).unwrap();
/// assert_eq!(config.database, DatabaseKind::Sqlite);
/// assert_eq!(config.orm(), OrmKind::Mapper);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// ORM flavour. Defaults per database when absent.
    #[serde(default)]
    pub orm: Option<OrmKind>,

    /// Database to connect to.
    pub database: DatabaseKind,

    /// Backend-specific connection string.
    pub connection_string: String,

    /// Isolation level of contexts created without an explicit one.
    #[serde(default = "default_isolation")]
    pub default_isolation: Option<IsolationLevel>,

    /// How long SQL connections wait on a locked database.
    #[serde(default = "default_lock_timeout", with = "millis")]
    pub lock_timeout: Duration,
}

#[allow(clippy::unnecessary_wraps)]
fn default_isolation() -> Option<IsolationLevel> {
    Some(IsolationLevel::ReadCommitted)
}

fn default_lock_timeout() -> Duration {
    Duration::from_secs(5)
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

impl DatabaseConfig {
    /// Creates a configuration with default ORM and isolation.
    #[must_use]
    pub fn new(database: DatabaseKind, connection_string: impl Into<String>) -> Self {
        Self {
            orm: None,
            database,
            connection_string: connection_string.into(),
            default_isolation: default_isolation(),
            lock_timeout: default_lock_timeout(),
        }
    }

    /// Creates a configuration from textual backend names.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownBackend`] if either name is not recognised.
    pub fn from_names(
        orm: Option<&str>,
        database: &str,
        connection_string: impl Into<String>,
    ) -> CoreResult<Self> {
        let mut config = Self::new(database.parse()?, connection_string);
        if let Some(orm) = orm {
            config.orm = Some(orm.parse()?);
        }
        Ok(config)
    }

    /// Sets the ORM.
    #[must_use]
    pub const fn with_orm(mut self, orm: OrmKind) -> Self {
        self.orm = Some(orm);
        self
    }

    /// Sets the default isolation level (`None` = no explicit transaction).
    #[must_use]
    pub const fn default_isolation(mut self, isolation: Option<IsolationLevel>) -> Self {
        self.default_isolation = isolation;
        self
    }

    /// Sets the lock timeout for SQL connections.
    #[must_use]
    pub const fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// The effective ORM.
    #[must_use]
    pub fn orm(&self) -> OrmKind {
        self.orm.unwrap_or(self.database.default_orm())
    }

    /// Checks that the ORM can drive the database and the connection
    /// string is present.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfiguration`] on any mismatch.
    pub fn validate(&self) -> CoreResult<()> {
        let orm = self.orm();
        if orm.is_relational() != self.database.is_relational() {
            return Err(CoreError::invalid_configuration(format!(
                "{orm} ORM cannot drive a {} database",
                self.database
            )));
        }
        if self.connection_string.trim().is_empty() {
            return Err(CoreError::invalid_configuration(format!(
                "{} requires a connection string",
                self.database
            )));
        }
        Ok(())
    }
}

/// A parsed `key=value;key=value` connection string.
///
/// Keys are matched case-insensitively; a segment without `=` is kept as
/// a bare value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionString {
    pairs: Vec<(String, String)>,
    bare: Option<String>,
}

impl ConnectionString {
    /// Parses a connection string.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let mut parsed = Self::default();
        for segment in input.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            match segment.split_once('=') {
                Some((key, value)) => parsed
                    .pairs
                    .push((key.trim().to_ascii_lowercase(), value.trim().to_string())),
                None => parsed.bare = Some(segment.to_string()),
            }
        }
        parsed
    }

    /// Looks up the first of `keys` that is present.
    #[must_use]
    pub fn get(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| {
            self.pairs
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v.as_str())
        })
    }

    /// The segment that had no `=`.
    #[must_use]
    pub fn bare(&self) -> Option<&str> {
        self.bare.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = DatabaseConfig::new(DatabaseKind::InMemory, "tests");
        assert_eq!(config.orm(), OrmKind::Session);
        assert_eq!(config.default_isolation, Some(IsolationLevel::ReadCommitted));
        assert_eq!(config.lock_timeout, Duration::from_secs(5));
        config.validate().unwrap();
    }

    #[test]
    fn document_database_defaults_to_document_orm() {
        let config = DatabaseConfig::new(DatabaseKind::Document, "Database=shop");
        assert_eq!(config.orm(), OrmKind::Document);
    }

    #[test]
    fn mismatched_orm_is_rejected() {
        let config =
            DatabaseConfig::new(DatabaseKind::Document, "Database=shop").with_orm(OrmKind::Model);
        assert!(matches!(
            config.validate(),
            Err(CoreError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn empty_connection_string_is_rejected() {
        let config = DatabaseConfig::new(DatabaseKind::Sqlite, "  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_names_is_case_insensitive() {
        let config = DatabaseConfig::from_names(Some("EFCORE"), "mysql", "Server=db").unwrap();
        assert_eq!(config.orm(), OrmKind::Model);
        assert_eq!(config.database, DatabaseKind::MySql);
        assert!(matches!(
            DatabaseConfig::from_names(None, "db2", "x"),
            Err(CoreError::UnknownBackend { .. })
        ));
    }

    #[test]
    fn deserialize_with_isolation() {
        let config: DatabaseConfig = serde_json::from_str(
            r#"{ "database": "InMemory", "connection_string": "t", "default_isolation": "Serializable", "lock_timeout": 250 }"#,
        )
        .unwrap();
        assert_eq!(config.default_isolation, Some(IsolationLevel::Serializable));
        assert_eq!(config.lock_timeout, Duration::from_millis(250));
    }

    #[test]
    fn connection_string_lookup() {
        let cs = ConnectionString::parse("Database=shop; Path = /var/lib/shop.journal ;");
        assert_eq!(cs.get(&["database"]), Some("shop"));
        assert_eq!(cs.get(&["file", "PATH"]), Some("/var/lib/shop.journal"));
        assert_eq!(cs.bare(), None);

        let bare = ConnectionString::parse("data/app.db");
        assert_eq!(bare.bare(), Some("data/app.db"));
    }
}

//! Storage backends behind a [`crate::DatabaseContext`].
//!
//! A backend turns compiled mappings into storage: it installs tables or
//! collections when a mapping is published, and opens one
//! [`BackendSession`] per context. Sessions speak in neutral [`Row`]s;
//! the per-ORM save rules live in the session implementations.

mod document;
mod graph;
mod mapper;
mod model;
mod relational;
mod session;

use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::entity::Row;
use crate::error::{CoreError, CoreResult};
use crate::mapping::{MappingRegistry, SchemaInstaller, TableMeta};
use crate::relational::{MemoryDatabase, MemoryRowStoreFactory, SqlDriver, SqlRowStoreFactory};
use crate::resolver::{Resolver, ResolverExt};
use crate::types::{DatabaseKind, IsolationLevel};
use crate::document::DocumentDatabase;

pub(crate) use document::DocumentBackend;
pub(crate) use relational::RelationalBackend;

/// An open storage backend shared by every context of one factory.
pub(crate) trait Backend: Send + Sync {
    /// Opens a session, inside a transaction when `isolation` is set.
    fn open(
        &self,
        registry: &Arc<MappingRegistry>,
        isolation: Option<IsolationLevel>,
    ) -> CoreResult<Box<dyn BackendSession>>;
}

/// One context's view of the backend.
pub(crate) trait BackendSession: Send {
    /// Every stored entity of `meta`'s type.
    fn scan(&mut self, meta: &TableMeta) -> CoreResult<Vec<Row>>;

    /// Inserts or updates `row`. Returns the row as stored, generated key
    /// included.
    fn save(&mut self, meta: &TableMeta, row: Row) -> CoreResult<Row>;

    /// Removes the entity `row` describes.
    fn delete(&mut self, meta: &TableMeta, row: &Row) -> CoreResult<()>;

    /// Makes pending writes durable; a transactional session starts a new
    /// transaction at the same level.
    fn commit(&mut self) -> CoreResult<()>;

    /// Discards pending writes.
    fn rollback(&mut self) -> CoreResult<()>;

    /// An installer that creates schema on this session's own connection,
    /// when the backend's installer would wait on this session's open
    /// transaction.
    fn schema_installer(&mut self) -> Option<Box<dyn SchemaInstaller + '_>> {
        None
    }
}

/// A connected backend and the installer registered with its registry.
pub(crate) struct Connected {
    pub backend: Arc<dyn Backend>,
    pub installer: Arc<dyn SchemaInstaller>,
}

impl Connected {
    fn new<B: Backend + SchemaInstaller + 'static>(backend: B) -> Self {
        let backend = Arc::new(backend);
        Self {
            backend: backend.clone(),
            installer: backend,
        }
    }
}

/// Connects to the database `config` names.
///
/// SQL drivers come from the resolver; SQLite falls back to the bundled
/// driver when none is registered.
pub(crate) fn connect(config: &DatabaseConfig, resolver: &dyn Resolver) -> CoreResult<Connected> {
    let orm = config.orm();
    match config.database {
        DatabaseKind::Document => {
            let database = DocumentDatabase::open(&config.connection_string)?;
            Ok(Connected::new(DocumentBackend::new(Arc::new(database))))
        }
        DatabaseKind::InMemory => {
            let database = Arc::new(MemoryDatabase::new(config.connection_string.trim()));
            let stores = Arc::new(MemoryRowStoreFactory::new(database));
            Ok(Connected::new(RelationalBackend::new(orm, stores)?))
        }
        database => {
            let driver = find_driver(database, resolver)?;
            let stores = SqlRowStoreFactory::new(driver, &config.connection_string, config.lock_timeout)?;
            Ok(Connected::new(RelationalBackend::new(orm, Arc::new(stores))?))
        }
    }
}

fn find_driver(database: DatabaseKind, resolver: &dyn Resolver) -> CoreResult<Arc<dyn SqlDriver>> {
    if let Some(driver) = resolver
        .resolve_many::<dyn SqlDriver>()
        .into_iter()
        .find(|d| d.database() == database)
    {
        return Ok(driver);
    }
    #[cfg(feature = "sqlite")]
    {
        if database == DatabaseKind::Sqlite {
            return Ok(Arc::new(crate::relational::SqliteDriver));
        }
    }
    Err(CoreError::DriverNotRegistered {
        database: database.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::Container;

    #[test]
    fn server_databases_need_a_driver() {
        let config = DatabaseConfig::new(DatabaseKind::PostgreSql, "Host=db;Database=app");
        let err = connect(&config, &Container::new()).err().unwrap();
        assert!(matches!(err, CoreError::DriverNotRegistered { ref database } if database == "PostgreSQL"));
    }

    #[test]
    fn document_database_needs_a_name() {
        let config = DatabaseConfig::new(DatabaseKind::Document, "Path=");
        assert!(matches!(
            connect(&config, &Container::new()).err().unwrap(),
            CoreError::InvalidConfiguration { .. }
        ));
    }
}

//! The backend matrix and temporary databases.

use std::fmt;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use entiorm_core::{
    Container, DatabaseConfig, DatabaseContext, DatabaseContextFactory, DatabaseKind, OrmKind,
};
use tempfile::TempDir;

use crate::fixtures::{fixture_container, AuditEntry, Customer, LoginSession, Order, Post, Tag, TestTable};

/// One ORM and database combination under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestBackend {
    /// Session ORM over the in-memory database.
    SessionMemory,
    /// Model ORM over the in-memory database.
    ModelMemory,
    /// SQL mapper over the in-memory database.
    MapperMemory,
    /// Session ORM over a temporary SQLite file.
    SessionSqlite,
    /// Model ORM over a temporary SQLite file.
    ModelSqlite,
    /// SQL mapper over a temporary SQLite file.
    MapperSqlite,
    /// Document store in memory.
    DocumentMemory,
    /// Document store journaled to a temporary file.
    DocumentFile,
}

impl TestBackend {
    /// Every combination.
    pub fn all() -> [Self; 8] {
        [
            Self::SessionMemory,
            Self::ModelMemory,
            Self::MapperMemory,
            Self::SessionSqlite,
            Self::ModelSqlite,
            Self::MapperSqlite,
            Self::DocumentMemory,
            Self::DocumentFile,
        ]
    }

    /// Combinations with explicit transactions.
    pub fn transactional() -> Vec<Self> {
        Self::all().into_iter().filter(|b| b.orm().is_relational()).collect()
    }

    /// Combinations whose ORM stores relationships.
    pub fn with_relationships() -> Vec<Self> {
        Self::all()
            .into_iter()
            .filter(|b| matches!(b.orm(), OrmKind::Session | OrmKind::Model))
            .collect()
    }

    /// The ORM.
    pub fn orm(self) -> OrmKind {
        match self {
            Self::SessionMemory | Self::SessionSqlite => OrmKind::Session,
            Self::ModelMemory | Self::ModelSqlite => OrmKind::Model,
            Self::MapperMemory | Self::MapperSqlite => OrmKind::Mapper,
            Self::DocumentMemory | Self::DocumentFile => OrmKind::Document,
        }
    }

    /// The database.
    pub fn database(self) -> DatabaseKind {
        match self {
            Self::SessionMemory | Self::ModelMemory | Self::MapperMemory => DatabaseKind::InMemory,
            Self::SessionSqlite | Self::ModelSqlite | Self::MapperSqlite => DatabaseKind::Sqlite,
            Self::DocumentMemory | Self::DocumentFile => DatabaseKind::Document,
        }
    }

    fn needs_dir(self) -> bool {
        matches!(
            self,
            Self::SessionSqlite | Self::ModelSqlite | Self::MapperSqlite | Self::DocumentFile
        )
    }

    /// Configuration for this combination, with files under `dir`.
    pub fn config(self, dir: Option<&Path>) -> DatabaseConfig {
        let connection_string = match (self.database(), dir) {
            (DatabaseKind::Sqlite, Some(dir)) => {
                format!("Data Source={}", dir.join("test.db").display())
            }
            (DatabaseKind::Document, Some(dir)) => {
                format!("Database=testkit;Path={}", dir.join("documents.journal").display())
            }
            (DatabaseKind::Document, None) => "Database=testkit".to_string(),
            _ => "testkit".to_string(),
        };
        DatabaseConfig::new(self.database(), connection_string).with_orm(self.orm())
    }

    /// A fresh database with every fixture mapping installed.
    pub fn factory(self) -> TestFactory {
        self.factory_with(fixture_container())
    }

    /// A fresh database using `container`, with every fixture type the
    /// ORM can store installed up front.
    pub fn factory_with(self, container: Container) -> TestFactory {
        init_tracing();
        let dir = self
            .needs_dir()
            .then(|| TempDir::new().expect("Failed to create temp directory"));
        let mut builder = DatabaseContextFactory::builder(self.config(dir.as_ref().map(TempDir::path)))
            .resolver(Arc::new(container))
            .entity::<TestTable>()
            .entity::<Customer>()
            .entity::<Order>()
            .entity::<Post>()
            .entity::<Tag>()
            .entity::<LoginSession>();
        if !self.orm().is_relational() {
            builder = builder.entity::<AuditEntry>();
        }
        let factory = builder.build().expect("Failed to build factory");
        TestFactory {
            factory,
            backend: self,
            dir,
        }
    }
}

impl fmt::Display for TestBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.orm(), self.database())
    }
}

/// A factory over a temporary database, removed on drop.
pub struct TestFactory {
    factory: DatabaseContextFactory,
    backend: TestBackend,
    dir: Option<TempDir>,
}

impl TestFactory {
    /// The combination under test.
    pub fn backend(&self) -> TestBackend {
        self.backend
    }

    /// The temporary directory, for file-backed databases.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    /// A context at the default isolation level.
    pub fn context(&self) -> DatabaseContext {
        self.factory
            .create_context()
            .expect("Failed to create context")
    }

    /// Runs `f` in a context and commits.
    pub fn commit<R>(&self, f: impl FnOnce(&mut DatabaseContext) -> R) -> R {
        let mut context = self.context();
        let result = f(&mut context);
        context.save_changes().expect("Failed to save changes");
        result
    }
}

impl Deref for TestFactory {
    type Target = DatabaseContextFactory;

    fn deref(&self) -> &Self::Target {
        &self.factory
    }
}

/// Runs `test` once per backend in `backends`, each on a fresh database.
pub fn with_factory(backends: impl IntoIterator<Item = TestBackend>, mut test: impl FnMut(&TestFactory)) {
    for backend in backends {
        tracing::info!(%backend, "running against backend");
        let factory = backend.factory();
        test(&factory);
    }
}

/// Routes `tracing` output to the test harness. Filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

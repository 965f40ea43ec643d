//! # entiorm core
//!
//! A backend-agnostic unit of work and entity mapping layer.
//!
//! Applications describe entities once through [`EntityMappingProvider`]s
//! and persist them through a [`DatabaseContext`], whatever the configured
//! backend:
//!
//! - **Session** ORM: identity map, dirty checking, merge on save
//! - **Model** ORM: change tracking, delete behaviours on references
//! - **Mapper**: plain statements, serialized members as type handlers
//! - **Document**: an embedded document store with per-operation atomicity
//!
//! The relational ORMs run over SQLite (bundled), the in-memory test
//! database, or MSSQL/MySQL/PostgreSQL through a registered [`SqlDriver`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! let container = Arc::new(Container::new());
//! container.register_mapping::<Order, _>(OrderMap);
//! container.register_save_callback::<Order, _>(Audit);
//!
//! let config = DatabaseConfig::from_names(Some("NHibernate"), "SQLite", "Data Source=app.db")?;
//! let factory = DatabaseContextFactory::builder(config)
//!     .resolver(container)
//!     .entity::<Order>()
//!     .build()?;
//!
//! let mut context = factory.create_context()?;
//! context.save(&mut order)?;
//! context.update_where(|o: &Order| o.open, |o| o.open = false)?;
//! context.save_changes()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod callback;
mod config;
mod context;
mod document;
mod entity;
mod error;
mod factory;
mod mapping;
mod relational;
mod resolver;
mod types;

pub use callback::{DeleteCallback, SaveCallback};
pub use config::{ConnectionString, DatabaseConfig};
pub use context::{ContextState, DatabaseContext, Query};
pub use document::{CollectionDef, DocumentDatabase, DocumentIndex, HIDDEN_ID};
pub use entity::{Collection, Entity, FieldValue, Member, Record, Relation, Row, Target, ValueKind};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use factory::{DatabaseContextFactory, DatabaseContextFactoryBuilder};
pub use mapping::{
    CollectionKind, CollectionMeta, ColumnMeta, DatabaseInitializeHandler, DocumentMappingBuilder,
    EntityBinding, EntityMappingBuilder, EntityMappingProvider, KeyGeneration, KeyMeta,
    MapperMappingBuilder, MappingOptions, MappingRegistry, ModelMappingBuilder, NativeSchema,
    OnDelete, ReferenceMeta, SessionMappingBuilder, TableMeta,
};
#[cfg(feature = "sqlite")]
pub use relational::SqliteDriver;
pub use relational::{
    schema_hash, ColumnDef, Dialect, Filter, IndexDef, InsertReturning, MemoryDatabase,
    MemoryRowStore, MemoryRowStoreFactory, MigrationHistory, RowStore, RowStoreFactory,
    SqlConnection, SqlDriver, SqlRowStore, SqlRowStoreFactory, TableDef, MIGRATIONS_TABLE,
};
pub use resolver::{Container, Resolver, ResolverExt, ServiceHandle};
pub use types::{DatabaseKind, IsolationLevel, OrmKind};

pub use entiorm_codec::Value;

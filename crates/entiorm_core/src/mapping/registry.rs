//! The per-type mapping registry.
//!
//! Each entity type is compiled once per factory: providers run against a
//! fresh builder for the configured ORM, the result is installed into the
//! backend, and only then published. Reads of published mappings take a
//! read lock; compilation runs under one re-entrant build lock, so a
//! mapping whose installation needs another type's mapping (for a join
//! table, say) can compile that type on the same thread. Cycles see the
//! pending mapping of the type already being built.
//!
//! A context inside a transaction installs through its own connection
//! with [`MappingRegistry::binding_with`]; if that transaction rolls back,
//! the types it installed are forgotten and installed again on next use.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{ReentrantMutex, RwLock};

use super::binding::EntityBinding;
use super::builder::{DatabaseInitializeHandler, EntityMappingBuilder, EntityMappingProvider};
use super::document::DocumentMappingBuilder;
use super::mapper::MapperMappingBuilder;
use super::meta::TableMeta;
use super::model::ModelMappingBuilder;
use super::session::SessionMappingBuilder;
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::resolver::{Resolver, ResolverExt};
use crate::types::OrmKind;

/// Installs a freshly compiled mapping into the backend.
pub(crate) trait SchemaInstaller: Send + Sync {
    /// Creates whatever `meta` needs. Related types are compiled through
    /// `registry` with this same installer.
    fn install(&self, registry: &MappingRegistry, meta: &TableMeta) -> CoreResult<()>;
}

/// A builder the registry can drive.
pub(crate) trait MappingCompiler<T: Entity>: EntityMappingBuilder<T> + Sized {
    /// A builder for table `table`.
    fn create(table: String) -> Self;

    /// Validates the directives and produces the binding.
    fn finish(self) -> CoreResult<EntityBinding<T>>;
}

#[derive(Clone)]
struct Compiled {
    meta: Arc<TableMeta>,
    binding: Arc<dyn Any + Send + Sync>,
}

impl Compiled {
    fn binding<T: Entity>(&self) -> CoreResult<Arc<EntityBinding<T>>> {
        Arc::clone(&self.binding)
            .downcast::<EntityBinding<T>>()
            .map_err(|_| CoreError::invalid_operation(format!("binding for {} has the wrong type", T::NAME)))
    }
}

/// Compiled mappings of one factory, keyed by entity type.
pub struct MappingRegistry {
    orm: OrmKind,
    resolver: Arc<dyn Resolver>,
    installer: Arc<dyn SchemaInstaller>,
    ready: RwLock<HashMap<TypeId, Compiled>>,
    building: ReentrantMutex<RefCell<HashMap<TypeId, Compiled>>>,
}

impl MappingRegistry {
    pub(crate) fn new(
        orm: OrmKind,
        resolver: Arc<dyn Resolver>,
        installer: Arc<dyn SchemaInstaller>,
    ) -> Self {
        Self {
            orm,
            resolver,
            installer,
            ready: RwLock::new(HashMap::new()),
            building: ReentrantMutex::new(RefCell::new(HashMap::new())),
        }
    }

    /// The ORM every mapping is compiled for.
    #[must_use]
    pub fn orm(&self) -> OrmKind {
        self.orm
    }

    /// The mapping of `T`, compiling and installing it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidMapping`] or
    /// [`CoreError::MissingPrimaryKey`] if the directives are unusable,
    /// or the backend's error if installation fails. A failed type is
    /// retried on the next call.
    pub fn binding<T: Entity>(&self) -> CoreResult<Arc<EntityBinding<T>>> {
        self.binding_with::<T>(self.installer.as_ref())
    }

    /// Like [`binding`](Self::binding), but a type compiled by this call
    /// is installed through `installer`.
    pub(crate) fn binding_with<T: Entity>(
        &self,
        installer: &dyn SchemaInstaller,
    ) -> CoreResult<Arc<EntityBinding<T>>> {
        let id = TypeId::of::<T>();
        if let Some(compiled) = self.ready.read().get(&id) {
            return compiled.binding();
        }

        let guard = self.building.lock();
        if let Some(compiled) = self.ready.read().get(&id) {
            return compiled.binding();
        }
        let pending = guard.borrow().get(&id).cloned();
        if let Some(compiled) = pending {
            return compiled.binding();
        }

        let binding = Arc::new(self.compile::<T>()?);
        let compiled = Compiled {
            meta: Arc::clone(binding.meta()),
            binding: binding.clone(),
        };
        guard.borrow_mut().insert(id, compiled.clone());
        let installed = installer.install(self, &compiled.meta);
        guard.borrow_mut().remove(&id);
        installed?;

        tracing::debug!(entity = T::NAME, table = %compiled.meta.name, orm = %self.orm, "mapping published");
        self.ready.write().insert(id, compiled);
        Ok(binding)
    }

    /// The backend's installer.
    pub(crate) fn installer(&self) -> &dyn SchemaInstaller {
        self.installer.as_ref()
    }

    /// Whether `T`'s mapping is compiled and installed.
    pub(crate) fn is_published<T: Entity>(&self) -> bool {
        self.ready.read().contains_key(&TypeId::of::<T>())
    }

    /// Unpublishes `types`, whose installation was rolled back.
    pub(crate) fn forget(&self, types: &[TypeId]) {
        let _guard = self.building.lock();
        let mut ready = self.ready.write();
        for id in types {
            if let Some(compiled) = ready.remove(id) {
                tracing::debug!(table = %compiled.meta.name, "mapping unpublished after rollback");
            }
        }
    }

    /// Metadata of `T`, compiling it on first use.
    ///
    /// # Errors
    ///
    /// See [`MappingRegistry::binding`].
    pub fn table_meta<T: Entity>(&self) -> CoreResult<Arc<TableMeta>> {
        self.binding::<T>().map(|b| Arc::clone(b.meta()))
    }

    /// Every published mapping.
    #[must_use]
    pub fn compiled(&self) -> Vec<Arc<TableMeta>> {
        self.ready
            .read()
            .values()
            .map(|c| Arc::clone(&c.meta))
            .collect()
    }

    fn compile<T: Entity>(&self) -> CoreResult<EntityBinding<T>> {
        let mut table = T::NAME.to_string();
        for handler in self.resolver.resolve_many::<dyn DatabaseInitializeHandler>() {
            handler.convert_table_name(&mut table);
        }
        let providers = self.resolver.resolve_many::<dyn EntityMappingProvider<T>>();
        tracing::debug!(entity = T::NAME, %table, providers = providers.len(), "compiling mapping");

        match self.orm {
            OrmKind::Session => run::<T, SessionMappingBuilder<T>>(table, &providers),
            OrmKind::Model => run::<T, ModelMappingBuilder<T>>(table, &providers),
            OrmKind::Mapper => run::<T, MapperMappingBuilder<T>>(table, &providers),
            OrmKind::Document => run::<T, DocumentMappingBuilder<T>>(table, &providers),
        }
    }
}

fn run<T: Entity, B: MappingCompiler<T>>(
    table: String,
    providers: &[Arc<dyn EntityMappingProvider<T>>],
) -> CoreResult<EntityBinding<T>> {
    let mut builder = B::create(table);
    for provider in providers {
        provider.configure(&mut builder);
    }
    builder.finish()
}

impl fmt::Debug for MappingRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingRegistry")
            .field("orm", &self.orm)
            .field("compiled", &self.ready.read().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::*;
    use crate::mapping::MappingOptions;
    use crate::resolver::Container;
    use crate::{collection, member};

    #[derive(Debug, Default, Clone)]
    struct Author {
        id: i64,
        name: String,
        book_ids: Vec<i64>,
    }

    impl Entity for Author {
        const NAME: &'static str = "Author";
    }

    #[derive(Debug, Default, Clone)]
    struct Book {
        id: i64,
        title: String,
        author_ids: Vec<i64>,
    }

    impl Entity for Book {
        const NAME: &'static str = "Book";
    }

    struct AuthorMap(Arc<AtomicUsize>);

    impl EntityMappingProvider<Author> for AuthorMap {
        fn configure(&self, builder: &mut dyn EntityMappingBuilder<Author>) {
            self.0.fetch_add(1, Ordering::SeqCst);
            builder.id(member!(Author, id), MappingOptions::new());
            builder.map(member!(Author, name), MappingOptions::new());
            builder.has_many_to_many(collection!(Author, book_ids => Book), MappingOptions::new());
        }
    }

    struct BookMap;

    impl EntityMappingProvider<Book> for BookMap {
        fn configure(&self, builder: &mut dyn EntityMappingBuilder<Book>) {
            builder.id(member!(Book, id), MappingOptions::new());
            builder.map(member!(Book, title), MappingOptions::new());
            builder.has_many_to_many(collection!(Book, author_ids => Author), MappingOptions::new());
        }
    }

    /// Resolves every collection target, like the relational installer.
    #[derive(Default)]
    struct Recording {
        installed: parking_lot::Mutex<Vec<String>>,
    }

    impl SchemaInstaller for Recording {
        fn install(&self, registry: &MappingRegistry, meta: &TableMeta) -> CoreResult<()> {
            for collection in &meta.collections {
                collection.target.resolve_with(registry, self)?;
            }
            self.installed.lock().push(meta.name.clone());
            Ok(())
        }
    }

    struct Prefix;

    impl DatabaseInitializeHandler for Prefix {
        fn convert_table_name(&self, name: &mut String) {
            name.insert_str(0, "app_");
        }
    }

    fn registry(calls: &Arc<AtomicUsize>) -> (Arc<MappingRegistry>, Arc<Recording>) {
        let container = Container::new();
        container.register_mapping::<Author, _>(AuthorMap(Arc::clone(calls)));
        container.register_mapping::<Book, _>(BookMap);
        container.register_initialize_handler(Prefix);
        let installer = Arc::new(Recording::default());
        let registry = Arc::new(MappingRegistry::new(
            OrmKind::Session,
            Arc::new(container),
            installer.clone(),
        ));
        (registry, installer)
    }

    #[test]
    fn cyclic_mappings_compile_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (registry, installer) = registry(&calls);
        let author = registry.table_meta::<Author>().unwrap();
        assert_eq!(author.name, "app_Author");
        registry.table_meta::<Book>().unwrap();
        registry.table_meta::<Author>().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*installer.installed.lock(), vec!["app_Book", "app_Author"]);
        assert_eq!(registry.compiled().len(), 2);
    }

    #[test]
    fn concurrent_first_use_builds_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (registry, installer) = registry(&calls);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.binding::<Author>().map(|_| ()))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(installer.installed.lock().len(), 2);
    }

    #[test]
    fn alternate_installer_covers_related_types() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (registry, default) = registry(&calls);
        let local = Recording::default();
        registry.binding_with::<Book>(&local).unwrap();
        assert_eq!(*local.installed.lock(), vec!["app_Author", "app_Book"]);
        assert!(default.installed.lock().is_empty());
        assert!(registry.is_published::<Author>());

        registry.forget(&[TypeId::of::<Author>(), TypeId::of::<Book>()]);
        assert!(!registry.is_published::<Book>());
        registry.table_meta::<Book>().unwrap();
        assert_eq!(*default.installed.lock(), vec!["app_Author", "app_Book"]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failed_install_is_not_published() {
        struct Refuse;
        impl SchemaInstaller for Refuse {
            fn install(&self, _: &MappingRegistry, meta: &TableMeta) -> CoreResult<()> {
                Err(CoreError::sql(format!("cannot create {}", meta.name)))
            }
        }
        let calls = Arc::new(AtomicUsize::new(0));
        let (registry, _) = registry(&calls);
        assert!(registry.binding_with::<Author>(&Refuse).is_err());
        assert!(!registry.is_published::<Author>());
        assert!(registry.compiled().is_empty());
        registry.table_meta::<Author>().unwrap();
        assert!(registry.is_published::<Author>());
    }

    #[test]
    fn unmapped_type_lacks_key() {
        #[derive(Debug, Default, Clone)]
        struct Orphan;
        impl Entity for Orphan {
            const NAME: &'static str = "Orphan";
        }
        let calls = Arc::new(AtomicUsize::new(0));
        let (registry, _) = registry(&calls);
        assert!(matches!(
            registry.binding::<Orphan>(),
            Err(CoreError::MissingPrimaryKey { .. })
        ));
    }
}

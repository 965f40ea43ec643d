//! The unit of work.

mod query;

use std::fmt;
use std::sync::Arc;

use crate::backend::{Backend, BackendSession};
use crate::callback::{DeleteCallback, SaveCallback};
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::mapping::{EntityBinding, MappingRegistry};
use crate::resolver::{Resolver, ResolverExt};
use crate::types::{DatabaseKind, IsolationLevel, OrmKind};

pub use query::Query;

/// Lifecycle state of a [`DatabaseContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Usable.
    Open,
    /// An operation failed; only [`DatabaseContext::dispose`] is allowed.
    Faulted,
    /// Session and transaction released.
    Disposed,
}

/// One unit of work over one backend session and at most one transaction.
///
/// Reads evaluate predicates in-process over the backend's stored rows.
/// Writes go to the backend immediately but become durable only through
/// [`save_changes`](Self::save_changes); disposing (or dropping) a context
/// with an open transaction rolls it back.
///
/// A context is meant for one logical unit of work on one thread. Any
/// failed operation faults it; create a new context to continue.
///
/// ```
/// use entiorm_core::*;
///
/// #[derive(Debug, Default, Clone, PartialEq)]
/// struct Note { id: i64, text: String }
/// impl Entity for Note { const NAME: &'static str = "Note"; }
///
/// struct NoteMap;
/// impl EntityMappingProvider<Note> for NoteMap {
///     fn configure(&self, builder: &mut dyn EntityMappingBuilder<Note>) {
///         builder.id(member!(Note, id), MappingOptions::new());
///         builder.map(member!(Note, text), MappingOptions::new());
///     }
/// }
///
/// let container = std::sync::Arc::new(Container::new());
/// container.register_mapping::<Note, _>(NoteMap);
/// let factory = DatabaseContextFactory::builder(DatabaseConfig::new(DatabaseKind::InMemory, "notes"))
///     .resolver(container)
///     .entity::<Note>()
///     .build()
///     .unwrap();
///
/// let mut context = factory.create_context().unwrap();
/// let mut note = Note { id: 0, text: "hello".into() };
/// context.save(&mut note).unwrap();
/// context.save_changes().unwrap();
/// assert!(note.id > 0);
/// assert_eq!(context.get(|n: &Note| n.text == "hello").unwrap(), Some(note));
/// ```
pub struct DatabaseContext {
    session: Option<Box<dyn BackendSession>>,
    registry: Arc<MappingRegistry>,
    resolver: Arc<dyn Resolver>,
    database: DatabaseKind,
    isolation: Option<IsolationLevel>,
    state: ContextState,
    dirty: bool,
}

impl DatabaseContext {
    pub(crate) fn open(
        backend: &dyn Backend,
        registry: Arc<MappingRegistry>,
        resolver: Arc<dyn Resolver>,
        database: DatabaseKind,
        isolation: Option<IsolationLevel>,
    ) -> CoreResult<Self> {
        let session = backend.open(&registry, isolation)?;
        tracing::trace!(%database, ?isolation, "context opened");
        Ok(Self {
            session: Some(session),
            registry,
            resolver,
            database,
            isolation,
            state: ContextState::Open,
            dirty: false,
        })
    }

    /// The ORM behind this context.
    #[must_use]
    pub fn orm(&self) -> OrmKind {
        self.registry.orm()
    }

    /// The database behind this context.
    #[must_use]
    pub fn database(&self) -> DatabaseKind {
        self.database
    }

    /// Isolation level of the context's transaction, if it has one.
    #[must_use]
    pub fn isolation_level(&self) -> Option<IsolationLevel> {
        self.isolation
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ContextState {
        self.state
    }

    fn ensure_open(&self) -> CoreResult<()> {
        match self.state {
            ContextState::Open => Ok(()),
            ContextState::Faulted => Err(CoreError::ContextFaulted),
            ContextState::Disposed => Err(CoreError::ContextDisposed),
        }
    }

    /// Faults the context if `result` is an error.
    fn track<R>(&mut self, result: CoreResult<R>) -> CoreResult<R> {
        if let Err(error) = &result {
            if self.state == ContextState::Open {
                tracing::debug!(%error, "operation failed, context faulted");
                self.state = ContextState::Faulted;
            }
        }
        result
    }

    fn session(&mut self) -> CoreResult<&mut dyn BackendSession> {
        match self.session.as_deref_mut() {
            Some(session) => Ok(session),
            None => Err(CoreError::ContextDisposed),
        }
    }

    /// The mapping of `T`. A type first used inside a transaction is
    /// installed through the session so the DDL joins that transaction.
    fn binding<T: Entity>(&mut self) -> CoreResult<Arc<EntityBinding<T>>> {
        if !self.registry.is_published::<T>() {
            let session = self.session.as_deref_mut().ok_or(CoreError::ContextDisposed)?;
            if let Some(installer) = session.schema_installer() {
                return self.registry.binding_with::<T>(&*installer);
            }
        }
        self.registry.binding::<T>()
    }

    /// Entities of `T` accepted by `predicate`, at most `limit` of them.
    pub(crate) fn fetch<T: Entity>(
        &mut self,
        predicate: &dyn Fn(&T) -> bool,
        limit: Option<usize>,
    ) -> CoreResult<Vec<T>> {
        self.ensure_open()?;
        let result = self.fetch_inner(predicate, limit);
        self.track(result)
    }

    fn fetch_inner<T: Entity>(
        &mut self,
        predicate: &dyn Fn(&T) -> bool,
        limit: Option<usize>,
    ) -> CoreResult<Vec<T>> {
        let binding = self.binding::<T>()?;
        let rows = self.session()?.scan(binding.meta())?;
        let mut found = Vec::new();
        for row in &rows {
            if limit.is_some_and(|n| found.len() >= n) {
                break;
            }
            let entity = binding.materialize(row)?;
            if predicate(&entity) {
                found.push(entity);
            }
        }
        Ok(found)
    }

    /// The first entity accepted by `predicate`, or `None`.
    ///
    /// # Errors
    ///
    /// Returns the mapping or backend error; the context is then faulted.
    pub fn get<T: Entity>(&mut self, predicate: impl Fn(&T) -> bool) -> CoreResult<Option<T>> {
        Ok(self.fetch(&predicate, Some(1))?.pop())
    }

    /// Number of entities accepted by `predicate`.
    ///
    /// # Errors
    ///
    /// Returns the mapping or backend error; the context is then faulted.
    pub fn count<T: Entity>(&mut self, predicate: impl Fn(&T) -> bool) -> CoreResult<usize> {
        Ok(self.fetch(&predicate, None)?.len())
    }

    /// A lazy query over `T`. Nothing is read until a terminal method runs,
    /// and every terminal method reads afresh.
    pub fn query<T: Entity>(&mut self) -> Query<'_, T> {
        Query::new(self)
    }

    /// Inserts or updates `entity`.
    ///
    /// # Errors
    ///
    /// See [`save_with`](Self::save_with).
    pub fn save<T: Entity>(&mut self, entity: &mut T) -> CoreResult<()> {
        self.save_with(entity, |_| {})
    }

    /// Runs the before-save callbacks, applies `update`, persists the
    /// entity and runs the after-save callbacks.
    ///
    /// On success `entity` holds the stored state, generated key included.
    ///
    /// # Errors
    ///
    /// Returns the callback, mapping or backend error; the context is
    /// then faulted.
    pub fn save_with<T: Entity>(
        &mut self,
        entity: &mut T,
        update: impl FnOnce(&mut T),
    ) -> CoreResult<()> {
        self.ensure_open()?;
        let result = self.save_inner(entity, update);
        self.track(result)
    }

    fn save_inner<T: Entity>(&mut self, entity: &mut T, update: impl FnOnce(&mut T)) -> CoreResult<()> {
        let binding = self.binding::<T>()?;
        let callbacks = self.resolver.resolve_many::<dyn SaveCallback<T>>();
        for callback in &callbacks {
            callback.before_save(self, entity)?;
        }
        update(entity);

        let row = binding.to_row(entity)?;
        let stored = self.session()?.save(binding.meta(), row)?;
        self.dirty = true;
        binding.apply(entity, &stored)?;

        for callback in &callbacks {
            callback.after_save(self, entity)?;
        }
        Ok(())
    }

    /// Runs the before-delete callbacks, removes `entity` and runs the
    /// after-delete callbacks.
    ///
    /// # Errors
    ///
    /// Returns the callback, mapping or backend error; the context is
    /// then faulted.
    pub fn delete<T: Entity>(&mut self, entity: &T) -> CoreResult<()> {
        self.ensure_open()?;
        let result = self.delete_inner(entity);
        self.track(result)
    }

    fn delete_inner<T: Entity>(&mut self, entity: &T) -> CoreResult<()> {
        let binding = self.binding::<T>()?;
        let callbacks = self.resolver.resolve_many::<dyn DeleteCallback<T>>();
        for callback in &callbacks {
            callback.before_delete(self, entity)?;
        }

        let row = binding.to_row(entity)?;
        self.session()?.delete(binding.meta(), &row)?;
        self.dirty = true;

        for callback in &callbacks {
            callback.after_delete(self, entity)?;
        }
        Ok(())
    }

    /// Saves every entity accepted by `predicate` after applying `update`
    /// to it. Returns how many were saved.
    ///
    /// Rows are saved one by one. If one fails, the rows before it stay
    /// written in the current transaction; dispose the context to discard
    /// them.
    ///
    /// # Errors
    ///
    /// Returns the first failure; the context is then faulted.
    pub fn update_where<T: Entity>(
        &mut self,
        predicate: impl Fn(&T) -> bool,
        mut update: impl FnMut(&mut T),
    ) -> CoreResult<usize> {
        let matched = self.fetch(&predicate, None)?;
        let count = matched.len();
        for mut entity in matched {
            self.save_with(&mut entity, |e| update(e))?;
        }
        Ok(count)
    }

    /// Deletes every entity accepted by `predicate`. Returns how many were
    /// deleted.
    ///
    /// Rows are deleted one by one, with the same partial-failure
    /// behaviour as [`update_where`](Self::update_where).
    ///
    /// # Errors
    ///
    /// Returns the first failure; the context is then faulted.
    pub fn delete_where<T: Entity>(&mut self, predicate: impl Fn(&T) -> bool) -> CoreResult<usize> {
        let matched = self.fetch(&predicate, None)?;
        for entity in &matched {
            self.delete(entity)?;
        }
        Ok(matched.len())
    }

    /// Commits the current transaction, if any. The context stays open;
    /// later writes run in a new transaction at the same isolation level.
    ///
    /// # Errors
    ///
    /// Returns the backend's commit error; the context is then faulted.
    pub fn save_changes(&mut self) -> CoreResult<()> {
        self.ensure_open()?;
        let result = self.session().and_then(|session| session.commit());
        let result = self.track(result);
        if result.is_ok() {
            self.dirty = false;
            tracing::trace!(database = %self.database, "changes saved");
        }
        result
    }

    /// Releases the transaction and session. Uncommitted writes are
    /// rolled back. Safe to call more than once.
    pub fn dispose(&mut self) {
        if let Some(mut session) = self.session.take() {
            if self.dirty {
                tracing::debug!(database = %self.database, "disposing context with uncommitted changes");
            }
            if let Err(error) = session.rollback() {
                tracing::warn!(%error, "rollback on dispose failed");
            }
        }
        self.state = ContextState::Disposed;
    }
}

impl Drop for DatabaseContext {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for DatabaseContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseContext")
            .field("orm", &self.orm())
            .field("database", &self.database)
            .field("isolation", &self.isolation)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

//! Resolution of providers, callbacks and drivers.
//!
//! The core never talks to a dependency-injection container directly.
//! It asks a [`Resolver`] for every service registered under a type, in
//! registration order. [`Container`] is the bundled implementation.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::callback::{DeleteCallback, SaveCallback};
use crate::entity::Entity;
use crate::mapping::{DatabaseInitializeHandler, EntityMappingProvider};
use crate::relational::SqlDriver;

/// A type-erased service handle: an `Arc<S>` boxed as `Any`.
pub type ServiceHandle = Arc<dyn Any + Send + Sync>;

/// Source of registered services.
pub trait Resolver: Send + Sync {
    /// Every service registered under `service`, in registration order.
    ///
    /// Each handle must hold an `Arc<S>` where `TypeId::of::<S>() ==
    /// service`; other handles are skipped by [`ResolverExt`].
    fn resolve_all(&self, service: TypeId) -> Vec<ServiceHandle>;
}

/// Typed access to a [`Resolver`].
pub trait ResolverExt {
    /// Every `S` registered, in registration order.
    fn resolve_many<S: ?Sized + Send + Sync + 'static>(&self) -> Vec<Arc<S>>;
}

impl<R: Resolver + ?Sized> ResolverExt for R {
    fn resolve_many<S: ?Sized + Send + Sync + 'static>(&self) -> Vec<Arc<S>> {
        self.resolve_all(TypeId::of::<S>())
            .into_iter()
            .filter_map(|handle| handle.downcast_ref::<Arc<S>>().cloned())
            .collect()
    }
}

/// Manual registration list implementing [`Resolver`].
///
/// ```
/// use std::sync::Arc;
/// use entiorm_core::{Container, ResolverExt};
///
/// trait Greeter: Send + Sync {
///     fn greet(&self) -> String;
/// }
/// struct Hello;
/// impl Greeter for Hello {
///     fn greet(&self) -> String { "hello".into() }
/// }
///
/// let container = Container::new();
/// container.register::<dyn Greeter>(Arc::new(Hello));
/// let greeters = container.resolve_many::<dyn Greeter>();
/// assert_eq!(greeters[0].greet(), "hello");
/// ```
#[derive(Default)]
pub struct Container {
    services: RwLock<HashMap<TypeId, Vec<ServiceHandle>>>,
}

impl Container {
    /// An empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `service` to the list registered under `S`.
    pub fn register<S: ?Sized + Send + Sync + 'static>(&self, service: Arc<S>) -> &Self {
        let handle: ServiceHandle = Arc::new(service);
        self.services
            .write()
            .entry(TypeId::of::<S>())
            .or_default()
            .push(handle);
        self
    }

    /// Removes every service registered under `S`.
    pub fn unregister_all<S: ?Sized + 'static>(&self) -> &Self {
        self.services.write().remove(&TypeId::of::<S>());
        self
    }

    /// Registers a mapping provider for `T`.
    pub fn register_mapping<T, P>(&self, provider: P) -> &Self
    where
        T: Entity,
        P: EntityMappingProvider<T> + 'static,
    {
        let provider: Arc<dyn EntityMappingProvider<T>> = Arc::new(provider);
        self.register(provider)
    }

    /// Registers a save callback for `T`.
    pub fn register_save_callback<T, C>(&self, callback: C) -> &Self
    where
        T: Entity,
        C: SaveCallback<T> + 'static,
    {
        let callback: Arc<dyn SaveCallback<T>> = Arc::new(callback);
        self.register(callback)
    }

    /// Registers a delete callback for `T`.
    pub fn register_delete_callback<T, C>(&self, callback: C) -> &Self
    where
        T: Entity,
        C: DeleteCallback<T> + 'static,
    {
        let callback: Arc<dyn DeleteCallback<T>> = Arc::new(callback);
        self.register(callback)
    }

    /// Registers a table-name handler.
    pub fn register_initialize_handler<H>(&self, handler: H) -> &Self
    where
        H: DatabaseInitializeHandler + 'static,
    {
        let handler: Arc<dyn DatabaseInitializeHandler> = Arc::new(handler);
        self.register(handler)
    }

    /// Registers a SQL driver.
    pub fn register_driver<D>(&self, driver: D) -> &Self
    where
        D: SqlDriver + 'static,
    {
        let driver: Arc<dyn SqlDriver> = Arc::new(driver);
        self.register(driver)
    }
}

impl Resolver for Container {
    fn resolve_all(&self, service: TypeId) -> Vec<ServiceHandle> {
        self.services
            .read()
            .get(&service)
            .cloned()
            .unwrap_or_default()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("service_types", &self.services.read().len())
            .finish()
    }
}

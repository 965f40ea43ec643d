//! Construction of contexts from configuration.

use std::fmt;
use std::sync::Arc;

use crate::backend::{self, Backend};
use crate::config::DatabaseConfig;
use crate::context::DatabaseContext;
use crate::entity::Entity;
use crate::error::CoreResult;
use crate::mapping::MappingRegistry;
use crate::resolver::{Container, Resolver};
use crate::types::IsolationLevel;

type Install = fn(&MappingRegistry) -> CoreResult<()>;

fn install<T: Entity>(registry: &MappingRegistry) -> CoreResult<()> {
    registry.binding::<T>().map(|_| ())
}

/// Builds a [`DatabaseContextFactory`].
pub struct DatabaseContextFactoryBuilder {
    config: DatabaseConfig,
    resolver: Option<Arc<dyn Resolver>>,
    entities: Vec<(&'static str, Install)>,
}

impl DatabaseContextFactoryBuilder {
    /// Sets the resolver for providers, callbacks, handlers and drivers.
    /// Defaults to an empty [`Container`].
    #[must_use]
    pub fn resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Compiles and installs `T` while the factory is built instead of on
    /// first use.
    #[must_use]
    pub fn entity<T: Entity>(mut self) -> Self {
        self.entities.push((T::NAME, install::<T> as Install));
        self
    }

    /// Validates the configuration, connects the backend and installs the
    /// schema of every registered entity.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unusable configuration or a
    /// missing driver, a mapping error for a registered entity whose
    /// mapping cannot be compiled, or the backend's error.
    pub fn build(self) -> CoreResult<DatabaseContextFactory> {
        self.config.validate()?;
        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(Container::new()));
        let connected = backend::connect(&self.config, resolver.as_ref())?;
        let registry = Arc::new(MappingRegistry::new(
            self.config.orm(),
            Arc::clone(&resolver),
            connected.installer,
        ));
        for (name, install) in &self.entities {
            tracing::debug!(entity = name, "installing registered entity");
            install(&registry)?;
        }
        tracing::info!(
            orm = %self.config.orm(),
            database = %self.config.database,
            entities = self.entities.len(),
            "database context factory ready"
        );
        Ok(DatabaseContextFactory {
            config: self.config,
            backend: connected.backend,
            registry,
            resolver,
        })
    }
}

/// Produces [`DatabaseContext`]s for one configured backend.
///
/// Building the factory is the expensive step: it connects and installs
/// the schema. Creating contexts afterwards is cheap, and the factory can
/// be shared between threads.
pub struct DatabaseContextFactory {
    config: DatabaseConfig,
    backend: Arc<dyn Backend>,
    registry: Arc<MappingRegistry>,
    resolver: Arc<dyn Resolver>,
}

impl DatabaseContextFactory {
    /// Starts building a factory for `config`.
    #[must_use]
    pub fn builder(config: DatabaseConfig) -> DatabaseContextFactoryBuilder {
        DatabaseContextFactoryBuilder {
            config,
            resolver: None,
            entities: Vec::new(),
        }
    }

    /// The configuration the factory was built from.
    #[must_use]
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// The compiled mappings.
    #[must_use]
    pub fn registry(&self) -> &Arc<MappingRegistry> {
        &self.registry
    }

    /// A context at the configured default isolation level.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if no session can be opened.
    pub fn create_context(&self) -> CoreResult<DatabaseContext> {
        self.create_context_with(self.config.default_isolation)
    }

    /// A context at `isolation`; `None` opens no explicit transaction.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if no session can be opened.
    pub fn create_context_with(&self, isolation: Option<IsolationLevel>) -> CoreResult<DatabaseContext> {
        DatabaseContext::open(
            self.backend.as_ref(),
            Arc::clone(&self.registry),
            Arc::clone(&self.resolver),
            self.config.database,
            isolation,
        )
    }
}

impl fmt::Debug for DatabaseContextFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseContextFactory")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for DatabaseContextFactoryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseContextFactoryBuilder")
            .field("config", &self.config)
            .field("entities", &self.entities.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

//! The relational backend shared by the session, model and mapper ORMs.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use entiorm_codec::{to_canonical_cbor, Value};
use parking_lot::Mutex;

use super::graph::{self, join_table, key_of, table_of};
use super::{mapper, model, session, Backend, BackendSession};
use crate::entity::Row;
use crate::error::{CoreError, CoreResult};
use crate::mapping::{CollectionKind, KeyGeneration, MappingRegistry, SchemaInstaller, TableMeta};
use crate::relational::{eq, MigrationHistory, RowStore, RowStoreFactory, TableDef};
use crate::types::{IsolationLevel, OrmKind};

/// Tables, join tables and the migration marker over one [`RowStoreFactory`].
pub(crate) struct RelationalBackend {
    orm: OrmKind,
    stores: Arc<dyn RowStoreFactory>,
    history: Arc<MigrationHistory>,
}

impl RelationalBackend {
    /// Installs the migration marker and wraps `stores`.
    pub fn new(orm: OrmKind, stores: Arc<dyn RowStoreFactory>) -> CoreResult<Self> {
        let history = MigrationHistory::new();
        history.install(stores.as_ref())?;
        tracing::info!(%orm, database = %stores.database(), "relational backend ready");
        Ok(Self {
            orm,
            stores,
            history: Arc::new(history),
        })
    }
}

/// Creates the tables `meta` needs through `create`, compiling collection
/// targets through `installer` first.
fn install_tables(
    registry: &MappingRegistry,
    installer: &dyn SchemaInstaller,
    meta: &TableMeta,
    mut create: impl FnMut(&TableDef) -> CoreResult<()>,
) -> CoreResult<()> {
    let table = table_of(meta)?;
    // Targets first: compiling one may install further tables.
    let targets = meta
        .collections
        .iter()
        .map(|c| c.target.resolve_with(registry, installer))
        .collect::<CoreResult<Vec<_>>>()?;

    create(table)?;
    for (collection, target) in meta.collections.iter().zip(&targets) {
        match &collection.kind {
            CollectionKind::OneToMany { child_column } => {
                if !target.has_column(child_column) {
                    return Err(CoreError::invalid_mapping(
                        meta.entity,
                        format!(
                            "collection {} needs column {child_column} on {}",
                            collection.member, target.name
                        ),
                    ));
                }
            }
            CollectionKind::ManyToMany { join_table: name } => {
                create(&join_table(meta, name, target)?)?;
            }
        }
    }
    Ok(())
}

impl SchemaInstaller for RelationalBackend {
    fn install(&self, registry: &MappingRegistry, meta: &TableMeta) -> CoreResult<()> {
        install_tables(registry, self, meta, |table| {
            self.stores.install(table)?;
            let mut store = self.stores.open()?;
            self.history.record(store.as_mut(), table)?;
            Ok(())
        })?;
        tracing::debug!(table = %meta.name, orm = %self.orm, "table installed");
        Ok(())
    }
}

/// Types and tables a session installed inside its open transaction.
#[derive(Debug, Default)]
pub(super) struct LazySchema {
    types: Vec<TypeId>,
    tables: Vec<String>,
}

/// Installs on a session's connection, inside its transaction.
struct SessionInstaller<'a> {
    store: Mutex<&'a mut Box<dyn RowStore>>,
    history: &'a MigrationHistory,
    lazy: Mutex<&'a mut LazySchema>,
}

impl SchemaInstaller for SessionInstaller<'_> {
    fn install(&self, registry: &MappingRegistry, meta: &TableMeta) -> CoreResult<()> {
        install_tables(registry, self, meta, |table| {
            let mut store = self.store.lock();
            store.create(table)?;
            self.history.record(&mut ***store, table)?;
            self.lazy.lock().tables.push(table.name.clone());
            Ok(())
        })?;
        self.lazy.lock().types.push(meta.type_id);
        tracing::debug!(table = %meta.name, "table installed in session transaction");
        Ok(())
    }
}

impl Backend for RelationalBackend {
    fn open(
        &self,
        registry: &Arc<MappingRegistry>,
        isolation: Option<IsolationLevel>,
    ) -> CoreResult<Box<dyn BackendSession>> {
        let mut store = self.stores.open()?;
        if let Some(level) = isolation {
            store.begin(level)?;
        }
        Ok(Box::new(RelationalSession {
            orm: self.orm,
            store,
            registry: Arc::clone(registry),
            isolation,
            snapshots: Snapshots::default(),
            history: Arc::clone(&self.history),
            lazy: LazySchema::default(),
        }))
    }
}

/// Last known stored state of entities, keyed by table and key.
#[derive(Default)]
pub(super) struct Snapshots {
    rows: HashMap<(String, Vec<u8>), Row>,
}

impl Snapshots {
    fn slot(meta: &TableMeta, key: &Value) -> CoreResult<(String, Vec<u8>)> {
        Ok((meta.name.clone(), to_canonical_cbor(key)?))
    }

    /// Whether `row` equals the snapshot; `None` when nothing is known.
    pub fn matches(&self, meta: &TableMeta, key: &Value, row: &Row) -> CoreResult<Option<bool>> {
        Ok(self.rows.get(&Self::slot(meta, key)?).map(|known| known == row))
    }

    pub fn remember(&mut self, meta: &TableMeta, key: &Value, row: &Row) -> CoreResult<()> {
        self.rows.insert(Self::slot(meta, key)?, row.clone());
        Ok(())
    }

    pub fn forget(&mut self, meta: &TableMeta, key: &Value) -> CoreResult<()> {
        self.rows.remove(&Self::slot(meta, key)?);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }
}

/// A context's connection to a relational database.
pub(crate) struct RelationalSession {
    pub(super) orm: OrmKind,
    pub(super) store: Box<dyn RowStore>,
    pub(super) registry: Arc<MappingRegistry>,
    pub(super) isolation: Option<IsolationLevel>,
    pub(super) snapshots: Snapshots,
    pub(super) history: Arc<MigrationHistory>,
    pub(super) lazy: LazySchema,
}

impl RelationalSession {
    /// Inserts `row`. With `fresh`, or when the key is unsaved, the key
    /// is generated according to its strategy.
    pub(super) fn insert(&mut self, meta: &TableMeta, mut row: Row, fresh: bool) -> CoreResult<Row> {
        let table = table_of(meta)?;
        let key = key_of(meta)?;
        let generate = fresh || key.is_unsaved(row.get(&key.column));
        match key.generation {
            KeyGeneration::Identity if generate => {
                row.record.remove(&key.column);
            }
            KeyGeneration::Uuid if generate => {
                let id = uuid::Uuid::new_v4().hyphenated().to_string();
                row.record.insert(key.column.clone(), Value::Text(id));
            }
            _ => {}
        }
        if let Some(generated) = self.store.insert(table, &row.record)? {
            row.record.insert(key.column.clone(), generated);
        }
        let value = row.get(&key.column).clone();
        graph::sync_collections(self.store.as_mut(), &self.registry, meta, &value, &row.collections)?;
        tracing::trace!(table = %meta.name, "row inserted");
        Ok(row)
    }

    /// Updates the stored row with `row`'s values. Returns the number of
    /// rows matched.
    pub(super) fn update(&mut self, meta: &TableMeta, row: &Row) -> CoreResult<u64> {
        let table = table_of(meta)?;
        let key = key_of(meta)?;
        let value = row.get(&key.column).clone();
        let filter = eq(&key.column, value.clone());
        let mut set = row.record.clone();
        set.remove(&key.column);
        let matched = if set.is_empty() {
            self.store.select(table, &filter)?.len() as u64
        } else {
            self.store.update(table, &set, &filter)?
        };
        if matched > 0 {
            graph::sync_collections(self.store.as_mut(), &self.registry, meta, &value, &row.collections)?;
        }
        Ok(matched)
    }

    /// Whether a row with `key` exists.
    pub(super) fn exists(&mut self, meta: &TableMeta, key: &Value) -> CoreResult<bool> {
        let filter = eq(&key_of(meta)?.column, key.clone());
        Ok(!self.store.select(table_of(meta)?, &filter)?.is_empty())
    }

    pub(super) fn conflict(meta: &TableMeta) -> CoreError {
        CoreError::concurrency_conflict(&meta.name, "no row matched the entity's key")
    }

    fn tracks_rows(&self) -> bool {
        self.orm != OrmKind::Mapper
    }

    /// Unpublishes what this transaction installed.
    fn discard_lazy_schema(&mut self) {
        let lazy = std::mem::take(&mut self.lazy);
        if !lazy.types.is_empty() {
            self.registry.forget(&lazy.types);
            self.history.forget(&lazy.tables);
        }
    }
}

impl BackendSession for RelationalSession {
    fn scan(&mut self, meta: &TableMeta) -> CoreResult<Vec<Row>> {
        let rows = graph::scan_rows(self.store.as_mut(), &self.registry, meta)?;
        if self.tracks_rows() {
            let key = key_of(meta)?;
            for row in &rows {
                self.snapshots.remember(meta, row.get(&key.column), row)?;
            }
        }
        Ok(rows)
    }

    fn save(&mut self, meta: &TableMeta, row: Row) -> CoreResult<Row> {
        match self.orm {
            OrmKind::Session => session::save(self, meta, row),
            OrmKind::Model => model::save(self, meta, row),
            OrmKind::Mapper => mapper::save(self, meta, row),
            OrmKind::Document => Err(CoreError::invalid_operation(
                "document mappings cannot be saved to a relational database",
            )),
        }
    }

    fn delete(&mut self, meta: &TableMeta, row: &Row) -> CoreResult<()> {
        let key = row.get(&key_of(meta)?.column).clone();
        let removed = graph::delete_row(self.store.as_mut(), &self.registry, meta, &key)?;
        tracing::trace!(table = %meta.name, removed, "delete applied");
        self.snapshots.forget(meta, &key)
    }

    fn commit(&mut self) -> CoreResult<()> {
        if !self.store.in_transaction() {
            return Ok(());
        }
        if let Err(error) = self.store.commit() {
            self.discard_lazy_schema();
            return Err(error);
        }
        self.lazy = LazySchema::default();
        if let Some(level) = self.isolation {
            self.store.begin(level)?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> CoreResult<()> {
        self.snapshots.clear();
        self.discard_lazy_schema();
        self.store.rollback()
    }

    fn schema_installer(&mut self) -> Option<Box<dyn SchemaInstaller + '_>> {
        if !self.store.in_transaction() {
            return None;
        }
        Some(Box::new(SessionInstaller {
            store: Mutex::new(&mut self.store),
            history: self.history.as_ref(),
            lazy: Mutex::new(&mut self.lazy),
        }))
    }
}

//! The document backend.
//!
//! Every save is a single-document upsert and every delete removes one
//! document; both are atomic on their own and immediately visible.
//! Commit and rollback have nothing to do.

use std::sync::Arc;

use entiorm_codec::Value;

use super::{Backend, BackendSession};
use crate::document::{DocumentDatabase, HIDDEN_ID};
use crate::entity::{Row, ValueKind};
use crate::error::{CoreError, CoreResult};
use crate::mapping::{KeyMeta, MappingRegistry, SchemaInstaller, TableMeta};
use crate::types::IsolationLevel;

/// Collections of one [`DocumentDatabase`].
pub(crate) struct DocumentBackend {
    database: Arc<DocumentDatabase>,
}

impl DocumentBackend {
    pub fn new(database: Arc<DocumentDatabase>) -> Self {
        tracing::info!(database = %database.name(), "document backend ready");
        Self { database }
    }
}

fn collection_of(meta: &TableMeta) -> CoreResult<&crate::document::CollectionDef> {
    meta.collection().ok_or_else(|| {
        CoreError::invalid_operation(format!("{} is not mapped to a document collection", meta.entity))
    })
}

impl SchemaInstaller for DocumentBackend {
    fn install(&self, _registry: &MappingRegistry, meta: &TableMeta) -> CoreResult<()> {
        self.database.ensure_collection(collection_of(meta)?.clone())
    }
}

impl Backend for DocumentBackend {
    fn open(
        &self,
        _registry: &Arc<MappingRegistry>,
        isolation: Option<IsolationLevel>,
    ) -> CoreResult<Box<dyn BackendSession>> {
        if let Some(level) = isolation {
            tracing::debug!(%level, "document backend has no transactions; isolation ignored");
        }
        Ok(Box::new(DocumentSession {
            database: Arc::clone(&self.database),
        }))
    }
}

struct DocumentSession {
    database: Arc<DocumentDatabase>,
}

impl DocumentSession {
    fn generate(&self, meta: &TableMeta, key: &KeyMeta) -> CoreResult<Value> {
        match key.kind {
            ValueKind::Uuid | ValueKind::Text => {
                Ok(Value::Text(uuid::Uuid::new_v4().hyphenated().to_string()))
            }
            ValueKind::Integer => Ok(Value::Integer(self.database.next_sequence(&meta.name)?)),
            kind => Err(CoreError::invalid_operation(format!(
                "cannot generate a {kind:?} key for {}",
                meta.entity
            ))),
        }
    }

    /// Hidden id of the first document whose mapped elements equal `row`'s.
    fn find_keyless(&self, meta: &TableMeta, row: &Row) -> Option<Value> {
        self.database
            .find_all(&meta.name)
            .into_iter()
            .find(|doc| {
                meta.columns
                    .iter()
                    .all(|c| doc.get(&c.name).unwrap_or(&Value::Null) == row.get(&c.name))
            })
            .and_then(|doc| doc.get(HIDDEN_ID).cloned())
    }
}

impl BackendSession for DocumentSession {
    fn scan(&mut self, meta: &TableMeta) -> CoreResult<Vec<Row>> {
        Ok(self
            .database
            .find_all(&meta.name)
            .into_iter()
            .map(Row::new)
            .collect())
    }

    fn save(&mut self, meta: &TableMeta, mut row: Row) -> CoreResult<Row> {
        row.collections.clear();
        match &meta.key {
            Some(key) => {
                let mut value = row.get(&key.column).clone();
                if key.is_unsaved(&value) {
                    value = self.generate(meta, key)?;
                    row.record.insert(key.column.clone(), value.clone());
                }
                self.database.upsert(&meta.name, value, row.record.clone())?;
            }
            None => {
                let id = Value::Text(uuid::Uuid::new_v4().hyphenated().to_string());
                let mut doc = row.record.clone();
                doc.insert(HIDDEN_ID.to_string(), id.clone());
                self.database.upsert(&meta.name, id, doc)?;
            }
        }
        tracing::trace!(collection = %meta.name, "document upserted");
        Ok(row)
    }

    fn delete(&mut self, meta: &TableMeta, row: &Row) -> CoreResult<()> {
        let key = match &meta.key {
            Some(key) => Some(row.get(&key.column).clone()),
            None => self.find_keyless(meta, row),
        };
        if let Some(key) = key {
            let removed = self.database.delete(&meta.name, &key)?;
            tracing::trace!(collection = %meta.name, removed, "document delete applied");
        }
        Ok(())
    }

    fn commit(&mut self) -> CoreResult<()> {
        Ok(())
    }

    fn rollback(&mut self) -> CoreResult<()> {
        Ok(())
    }
}

//! Conversion between entities and rows.
//!
//! [`EntityBinding`] is the only place entity values cross into storage
//! form, and [`BoundMember`] the only caller of the serialized codec.

use std::fmt;
use std::sync::Arc;

use entiorm_codec::{serialized, Value};

use super::meta::TableMeta;
use crate::entity::{Collection, Entity, Member, Record, Row};
use crate::error::{CoreError, CoreResult};

/// A member plus whether its value is stored as serialized bytes.
pub(crate) struct BoundMember<T> {
    pub member: Member<T>,
    pub wrap: bool,
}

impl<T> BoundMember<T> {
    fn read(&self, entity: &T) -> CoreResult<Value> {
        let value = self.member.read(entity)?;
        if self.wrap {
            Ok(Value::Bytes(serialized::to_bytes(&value)?))
        } else {
            Ok(value)
        }
    }

    fn write(&self, entity: &mut T, value: Value) -> Result<(), String> {
        let value = if self.wrap {
            match value {
                Value::Bytes(bytes) => serialized::from_bytes(&bytes).map_err(|e| e.to_string())?,
                other => {
                    return Err(format!(
                        "serialized member expects bytes, found {}",
                        other.type_name()
                    ))
                }
            }
        } else {
            value
        };
        self.member.write(entity, value)
    }
}

/// Compiled mapping of entity `T`: metadata plus typed accessors.
pub struct EntityBinding<T> {
    meta: Arc<TableMeta>,
    key: Option<BoundMember<T>>,
    columns: Vec<BoundMember<T>>,
    collections: Vec<Collection<T>>,
}

impl<T: Entity> EntityBinding<T> {
    pub(crate) fn new(
        meta: TableMeta,
        key: Option<BoundMember<T>>,
        columns: Vec<BoundMember<T>>,
        collections: Vec<Collection<T>>,
    ) -> Self {
        Self {
            meta: Arc::new(meta),
            key,
            columns,
            collections,
        }
    }

    /// Type-erased metadata.
    #[must_use]
    pub fn meta(&self) -> &Arc<TableMeta> {
        &self.meta
    }

    /// Current key value of `entity`, if the mapping declares a key.
    ///
    /// # Errors
    ///
    /// Returns a codec error if a serialized key cannot be encoded.
    pub fn key_of(&self, entity: &T) -> CoreResult<Option<Value>> {
        self.key.as_ref().map(|k| k.read(entity)).transpose()
    }

    /// Storage form of `entity`.
    ///
    /// # Errors
    ///
    /// Returns a codec error if a serialized member cannot be encoded.
    pub fn to_row(&self, entity: &T) -> CoreResult<Row> {
        let mut record = Record::new();
        if let (Some(key), Some(meta)) = (&self.key, &self.meta.key) {
            record.insert(meta.column.clone(), key.read(entity)?);
        }
        for (bound, column) in self.columns.iter().zip(&self.meta.columns) {
            record.insert(column.name.clone(), bound.read(entity)?);
        }
        Ok(Row {
            record,
            collections: self.collections.iter().map(|c| c.read(entity)).collect(),
        })
    }

    /// Overwrites the mapped members of `entity` with `row`.
    ///
    /// Columns absent from the row are left alone; columns the mapping
    /// does not know are ignored. Collections are written only when the
    /// row carries them.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DataMismatch`] if a stored value does not fit
    /// its member.
    pub fn apply(&self, entity: &mut T, row: &Row) -> CoreResult<()> {
        let mismatch = |column: &str, message: String| {
            CoreError::data_mismatch(&self.meta.name, format!("{column}: {message}"))
        };
        if let (Some(key), Some(meta)) = (&self.key, &self.meta.key) {
            if let Some(value) = row.record.get(&meta.column) {
                key.write(entity, value.clone())
                    .map_err(|m| mismatch(&meta.column, m))?;
            }
        }
        for (bound, column) in self.columns.iter().zip(&self.meta.columns) {
            if let Some(value) = row.record.get(&column.name) {
                bound
                    .write(entity, value.clone())
                    .map_err(|m| mismatch(&column.name, m))?;
            }
        }
        if row.collections.len() == self.collections.len() {
            for (collection, keys) in self.collections.iter().zip(&row.collections) {
                collection
                    .write(entity, keys.clone())
                    .map_err(|m| mismatch(collection.name(), m))?;
            }
        }
        Ok(())
    }

    /// A fresh entity built from `row`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DataMismatch`] if a stored value does not fit
    /// its member.
    pub fn materialize(&self, row: &Row) -> CoreResult<T> {
        let mut entity = T::default();
        self.apply(&mut entity, row)?;
        Ok(entity)
    }
}

impl<T> fmt::Debug for EntityBinding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityBinding")
            .field("table", &self.meta.name)
            .field("columns", &self.columns.len())
            .field("collections", &self.collections.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::draft::MappingDraft;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Note {
        title: String,
        priority: Option<i64>,
    }

    impl Entity for Note {
        const NAME: &'static str = "Note";
    }

    fn note() -> Note {
        Note {
            title: "ship it".into(),
            priority: Some(3),
        }
    }

    #[test]
    fn native_and_serde_members_store_identical_bytes() {
        let pairs = [
            (
                MappingDraft::bind(crate::member!(Note, title), true),
                MappingDraft::bind(crate::serialized_member!(Note, title), false),
            ),
            (
                MappingDraft::bind(crate::member!(Note, priority), true),
                MappingDraft::bind(crate::serialized_member!(Note, priority), true),
            ),
        ];
        for (native, serde) in &pairs {
            let stored = native.read(&note()).unwrap();
            assert!(matches!(stored, Value::Bytes(_)));
            assert_eq!(stored, serde.read(&note()).unwrap());
        }
    }

    #[test]
    fn stored_bytes_load_through_either_member() {
        let native = MappingDraft::bind(crate::member!(Note, title), true);
        let serde = MappingDraft::bind(crate::serialized_member!(Note, title), false);
        let stored = native.read(&note()).unwrap();

        let mut loaded = Note::default();
        serde.write(&mut loaded, stored.clone()).unwrap();
        assert_eq!(loaded.title, "ship it");
        let mut loaded = Note::default();
        native.write(&mut loaded, stored).unwrap();
        assert_eq!(loaded.title, "ship it");

        let err = serde.write(&mut loaded, Value::from("plain")).unwrap_err();
        assert!(err.contains("expects bytes"), "{err}");
    }

    #[test]
    fn unwrapped_members_store_native_values() {
        let bound = MappingDraft::bind(crate::member!(Note, title), false);
        assert!(!bound.stores_bytes());
        assert_eq!(bound.read(&note()).unwrap(), Value::from("ship it"));
        assert!(MappingDraft::bind(crate::serialized_member!(Note, title), false).stores_bytes());
    }
}

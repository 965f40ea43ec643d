//! Compiled, type-erased mapping metadata shared by every backend.

use std::any::TypeId;

use entiorm_codec::Value;

use crate::document::CollectionDef;
use crate::entity::{Target, ValueKind};
use crate::relational::TableDef;
use crate::types::OrmKind;

/// How new primary key values are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyGeneration {
    /// Integer keys, generated by the database on insert.
    Identity,
    /// UUID keys, generated client-side when nil.
    Uuid,
    /// Keys supplied by the application.
    Assigned,
}

impl KeyGeneration {
    /// Generation strategy for a key of `kind`.
    #[must_use]
    pub const fn for_kind(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Integer => Self::Identity,
            ValueKind::Uuid => Self::Uuid,
            _ => Self::Assigned,
        }
    }
}

/// The primary key of a mapped entity.
#[derive(Debug, Clone)]
pub struct KeyMeta {
    /// Column or element name.
    pub column: String,
    /// Member name.
    pub member: &'static str,
    /// Storage category.
    pub kind: ValueKind,
    /// Generation strategy.
    pub generation: KeyGeneration,
}

impl KeyMeta {
    /// Whether `value` marks an entity that was never saved.
    #[must_use]
    pub fn is_unsaved(&self, value: &Value) -> bool {
        match value {
            Value::Null => true,
            Value::Integer(0) => self.generation == KeyGeneration::Identity,
            Value::Text(s) => match self.generation {
                KeyGeneration::Uuid => uuid::Uuid::parse_str(s).map_or(true, |u| u.is_nil()),
                _ => s.is_empty(),
            },
            _ => false,
        }
    }
}

/// A non-key stored member.
#[derive(Debug, Clone)]
pub struct ColumnMeta {
    /// Column or element name.
    pub name: String,
    /// Member name.
    pub member: &'static str,
    /// Storage category.
    pub kind: ValueKind,
    /// Whether null is allowed.
    pub nullable: bool,
    /// Whether the value went through the serialized codec.
    pub serialized: bool,
}

/// What happens to referencing rows when the referenced row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    /// Leave referencing rows alone.
    NoAction,
    /// Delete referencing rows.
    Cascade,
    /// Null out the referencing column.
    SetNull,
}

/// A many-to-one reference held in a column.
#[derive(Debug, Clone)]
pub struct ReferenceMeta {
    /// Column holding the target key.
    pub column: String,
    /// Referenced entity.
    pub target: Target,
    /// Delete behaviour.
    pub on_delete: OnDelete,
}

/// Physical shape of a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionKind {
    /// Children carry the owner key in `child_column`.
    OneToMany {
        /// Column on the child table.
        child_column: String,
    },
    /// Pairs live in a join table.
    ManyToMany {
        /// Join table name.
        join_table: String,
    },
}

/// A mapped collection.
#[derive(Debug, Clone)]
pub struct CollectionMeta {
    /// Member name.
    pub member: &'static str,
    /// Element entity.
    pub target: Target,
    /// Physical shape.
    pub kind: CollectionKind,
    /// Delete children (one-to-many) or targets (many-to-many) with the owner.
    pub cascade_delete: bool,
}

/// Backend-native schema produced by a builder.
#[derive(Debug, Clone)]
pub enum NativeSchema {
    /// A relational table.
    Table(TableDef),
    /// A document collection.
    Collection(CollectionDef),
}

/// Everything a backend needs to store one entity type.
#[derive(Debug, Clone)]
pub struct TableMeta {
    /// Entity name.
    pub entity: &'static str,
    /// Entity type.
    pub type_id: TypeId,
    /// ORM that compiled the mapping.
    pub orm: OrmKind,
    /// Table or collection name after initialize handlers ran.
    pub name: String,
    /// Primary key, if declared.
    pub key: Option<KeyMeta>,
    /// Other stored members, reference columns included.
    pub columns: Vec<ColumnMeta>,
    /// Many-to-one references.
    pub references: Vec<ReferenceMeta>,
    /// Collections, in declaration order.
    pub collections: Vec<CollectionMeta>,
    /// Native schema.
    pub native: NativeSchema,
}

impl TableMeta {
    /// The relational table definition, if this is a relational mapping.
    #[must_use]
    pub fn table(&self) -> Option<&TableDef> {
        match &self.native {
            NativeSchema::Table(table) => Some(table),
            NativeSchema::Collection(_) => None,
        }
    }

    /// The document collection definition, if this is a document mapping.
    #[must_use]
    pub fn collection(&self) -> Option<&CollectionDef> {
        match &self.native {
            NativeSchema::Collection(collection) => Some(collection),
            NativeSchema::Table(_) => None,
        }
    }

    /// Whether a stored column with this name exists (key included).
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.key.as_ref().is_some_and(|k| k.column == name)
            || self.columns.iter().any(|c| c.name == name)
    }
}

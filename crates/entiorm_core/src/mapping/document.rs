//! Mapping builder for the document driver.

use super::binding::EntityBinding;
use super::builder::EntityMappingBuilder;
use super::draft::{ColumnDraft, KeyDraft, MappingDraft};
use super::meta::NativeSchema;
use super::options::MappingOptions;
use super::registry::MappingCompiler;
use crate::entity::{Collection, Entity, Member, Relation};
use crate::error::CoreResult;
use crate::types::OrmKind;

/// Builds a class map for the document driver.
///
/// Members become document elements. `Nullable(false)` makes an element
/// required, `Unique` and `Index` become collection indexes. Entities
/// without an `id` are stored under a hidden generated key.
pub struct DocumentMappingBuilder<T: Entity> {
    draft: MappingDraft<T>,
}

impl<T: Entity> MappingCompiler<T> for DocumentMappingBuilder<T> {
    fn create(table: String) -> Self {
        Self {
            draft: MappingDraft::new(OrmKind::Document, table),
        }
    }

    fn finish(self) -> CoreResult<EntityBinding<T>> {
        let native = NativeSchema::Collection(self.draft.document_collection());
        self.draft.compile(native)
    }
}

impl<T: Entity> DocumentMappingBuilder<T> {
    fn unsupported(&self, directive: &str, member: &str) {
        tracing::warn!(
            entity = T::NAME,
            member,
            directive,
            "documents do not store relationships; member left unmapped"
        );
    }
}

impl<T: Entity> EntityMappingBuilder<T> for DocumentMappingBuilder<T> {
    // Unsupported: Length, Unique, Nullable, Index, CustomSqlType,
    // CascadeDelete, WithSerialization.
    fn id(&mut self, member: Member<T>, options: MappingOptions) {
        let column = options.column.unwrap_or_else(|| member.name().to_string());
        self.draft.set_key(KeyDraft {
            bound: MappingDraft::bind(member, false),
            column,
            length: None,
            custom_type: None,
        });
    }

    // Unsupported: Length, CustomSqlType, CascadeDelete.
    fn map(&mut self, member: Member<T>, options: MappingOptions) {
        let mut column = ColumnDraft::new(MappingDraft::bind(member, options.with_serialization));
        if let Some(name) = options.column {
            column.column = name;
        }
        if let Some(nullable) = options.nullable {
            column.nullable = nullable;
        }
        column.unique = options.unique.unwrap_or(false);
        column.index = options.index;
        self.draft.add_column(column);
    }

    fn references(&mut self, relation: Relation<T>, _options: MappingOptions) {
        self.unsupported("references", relation.member().name());
    }

    fn has_many(&mut self, collection: Collection<T>, _options: MappingOptions) {
        self.unsupported("has_many", collection.name());
    }

    fn has_many_to_many(&mut self, collection: Collection<T>, _options: MappingOptions) {
        self.unsupported("has_many_to_many", collection.name());
    }

    fn orm(&self) -> OrmKind {
        OrmKind::Document
    }
}

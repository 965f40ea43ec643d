//! Mapping builder for the model ORM.

use super::binding::EntityBinding;
use super::builder::EntityMappingBuilder;
use super::draft::{snake_case, ColumnDraft, KeyDraft, MappingDraft};
use super::meta::{CollectionKind, NativeSchema, OnDelete, ReferenceMeta};
use super::options::MappingOptions;
use super::registry::MappingCompiler;
use crate::entity::{Collection, Entity, Member, Relation};
use crate::error::CoreResult;
use crate::types::OrmKind;

/// Builds an entity type model for the model ORM.
///
/// References carry a delete behaviour for the dependent side and get an
/// index on their column. With `CascadeDelete` unset, optional
/// references are nulled and required ones cascade.
pub struct ModelMappingBuilder<T: Entity> {
    draft: MappingDraft<T>,
}

impl<T: Entity> MappingCompiler<T> for ModelMappingBuilder<T> {
    fn create(table: String) -> Self {
        Self {
            draft: MappingDraft::new(OrmKind::Model, table),
        }
    }

    fn finish(self) -> CoreResult<EntityBinding<T>> {
        let native = NativeSchema::Table(self.draft.relational_table());
        self.draft.compile(native)
    }
}

impl<T: Entity> EntityMappingBuilder<T> for ModelMappingBuilder<T> {
    // Unsupported: Unique, Nullable, Index, CascadeDelete.
    fn id(&mut self, member: Member<T>, options: MappingOptions) {
        let column = options.column.unwrap_or_else(|| member.name().to_string());
        self.draft.set_key(KeyDraft {
            bound: MappingDraft::bind(member, options.with_serialization),
            column,
            length: options.length,
            custom_type: options.custom_sql_type,
        });
    }

    // Unsupported: CascadeDelete.
    fn map(&mut self, member: Member<T>, options: MappingOptions) {
        let mut column = ColumnDraft::new(MappingDraft::bind(member, options.with_serialization));
        if let Some(name) = options.column {
            column.column = name;
        }
        if let Some(nullable) = options.nullable {
            column.nullable = nullable;
        }
        column.length = options.length;
        column.custom_type = options.custom_sql_type;
        column.unique = options.unique.unwrap_or(false);
        column.index = options.index;
        self.draft.add_column(column);
    }

    // Unsupported: Length, Unique, Index, CustomSqlType, WithSerialization.
    fn references(&mut self, relation: Relation<T>, options: MappingOptions) {
        let target = relation.target();
        let mut column = ColumnDraft::new(MappingDraft::bind(relation.member, false));
        if let Some(name) = options.column {
            column.column = name;
        }
        if let Some(nullable) = options.nullable {
            column.nullable = nullable;
        }
        let on_delete = match options.cascade_delete {
            Some(true) => OnDelete::Cascade,
            Some(false) => OnDelete::NoAction,
            None if column.nullable => OnDelete::SetNull,
            None => OnDelete::Cascade,
        };
        column.index = Some(column.column.clone());
        column.reference = Some(ReferenceMeta {
            column: column.column.clone(),
            target,
            on_delete,
        });
        self.draft.add_column(column);
    }

    // Unsupported: Length, Unique, Nullable, Index, CustomSqlType,
    // WithSerialization.
    fn has_many(&mut self, collection: Collection<T>, options: MappingOptions) {
        let child_column = options
            .column
            .unwrap_or_else(|| format!("{}_id", snake_case(T::NAME)));
        self.draft.add_collection(
            collection,
            CollectionKind::OneToMany { child_column },
            options.cascade_delete.unwrap_or(false),
        );
    }

    // Unsupported: everything but CascadeDelete.
    fn has_many_to_many(&mut self, collection: Collection<T>, options: MappingOptions) {
        let join_table = format!("{}_{}", self.draft.table(), collection.name());
        self.draft.add_collection(
            collection,
            CollectionKind::ManyToMany { join_table },
            options.cascade_delete.unwrap_or(false),
        );
    }

    fn orm(&self) -> OrmKind {
        OrmKind::Model
    }
}

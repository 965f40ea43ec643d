//! Mapping builder for the SQL mapper.

use super::binding::EntityBinding;
use super::builder::EntityMappingBuilder;
use super::draft::{ColumnDraft, KeyDraft, MappingDraft};
use super::meta::NativeSchema;
use super::options::MappingOptions;
use super::registry::MappingCompiler;
use crate::entity::{Collection, Entity, Member, Relation};
use crate::error::CoreResult;
use crate::types::OrmKind;

/// Builds a column mapping for the SQL mapper.
///
/// The mapper reads and writes flat rows. Serialized members act as its
/// type handlers; relationships have no equivalent and are skipped with a
/// warning.
pub struct MapperMappingBuilder<T: Entity> {
    draft: MappingDraft<T>,
}

impl<T: Entity> MappingCompiler<T> for MapperMappingBuilder<T> {
    fn create(table: String) -> Self {
        Self {
            draft: MappingDraft::new(OrmKind::Mapper, table),
        }
    }

    fn finish(self) -> CoreResult<EntityBinding<T>> {
        let native = NativeSchema::Table(self.draft.relational_table());
        self.draft.compile(native)
    }
}

impl<T: Entity> MapperMappingBuilder<T> {
    fn unsupported(&self, directive: &str, member: &str) {
        tracing::warn!(
            entity = T::NAME,
            member,
            directive,
            "the SQL mapper has no relationships; member left unmapped"
        );
    }
}

impl<T: Entity> EntityMappingBuilder<T> for MapperMappingBuilder<T> {
    // Unsupported: Length, Unique, Nullable, Index, CustomSqlType,
    // CascadeDelete.
    fn id(&mut self, member: Member<T>, options: MappingOptions) {
        let column = options.column.unwrap_or_else(|| member.name().to_string());
        self.draft.set_key(KeyDraft {
            bound: MappingDraft::bind(member, options.with_serialization),
            column,
            length: None,
            custom_type: None,
        });
    }

    // Unsupported: Length, Unique, Index, CustomSqlType, CascadeDelete.
    fn map(&mut self, member: Member<T>, options: MappingOptions) {
        let mut column = ColumnDraft::new(MappingDraft::bind(member, options.with_serialization));
        if let Some(name) = options.column {
            column.column = name;
        }
        if let Some(nullable) = options.nullable {
            column.nullable = nullable;
        }
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
        OrmKind::Mapper
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::ValueKind;
    use crate::{collection, member, reference};

    #[derive(Debug, Default, Clone)]
    struct Invoice {
        id: i64,
        number: String,
        customer_id: Option<i64>,
        line_ids: Vec<i64>,
    }

    impl Entity for Invoice {
        const NAME: &'static str = "Invoice";
    }

    #[test]
    fn relationships_are_skipped() {
        let mut builder = MapperMappingBuilder::<Invoice>::create("invoices".into());
        builder.id(member!(Invoice, id), MappingOptions::new().length(10));
        builder.map(
            member!(Invoice, number),
            MappingOptions::new().unique(true).length(12).with_serialization(true),
        );
        builder.references(reference!(Invoice, customer_id => Invoice), MappingOptions::new());
        builder.has_many(collection!(Invoice, line_ids => Invoice), MappingOptions::new());
        builder.has_many_to_many(collection!(Invoice, line_ids => Invoice), MappingOptions::new());

        let binding = builder.finish().unwrap();
        let meta = binding.meta();
        assert!(meta.references.is_empty());
        assert!(meta.collections.is_empty());
        let table = meta.table().unwrap();
        assert_eq!(table.columns.len(), 2);
        let number = table.column("number").unwrap();
        assert!(!number.unique);
        assert_eq!(number.length, None);
        assert_eq!(number.kind, ValueKind::Bytes);
    }

    #[test]
    fn wrapped_member_round_trips() {
        let mut builder = MapperMappingBuilder::<Invoice>::create("invoices".into());
        builder.id(member!(Invoice, id), MappingOptions::new());
        builder.map(member!(Invoice, number), MappingOptions::new().with_serialization(true));
        let binding = builder.finish().unwrap();
        let invoice = Invoice {
            id: 1,
            number: "INV-1".into(),
            ..Invoice::default()
        };
        let row = binding.to_row(&invoice).unwrap();
        assert!(matches!(row.get("number"), entiorm_codec::Value::Bytes(_)));
        assert_eq!(binding.materialize(&row).unwrap().number, "INV-1");
    }
}

//! Mapping builder for the session ORM.

use super::binding::EntityBinding;
use super::builder::EntityMappingBuilder;
use super::draft::{snake_case, ColumnDraft, KeyDraft, MappingDraft};
use super::meta::{CollectionKind, NativeSchema, OnDelete, ReferenceMeta};
use super::options::MappingOptions;
use super::registry::MappingCompiler;
use crate::entity::{Collection, Entity, Member, Relation};
use crate::error::CoreResult;
use crate::types::OrmKind;

/// Builds a class mapping for the session ORM.
///
/// Collections are owned by the session: a one-to-many child column is
/// kept in sync on every save, and with cascade enabled orphans and
/// children are deleted together with the owner.
pub struct SessionMappingBuilder<T: Entity> {
    draft: MappingDraft<T>,
}

impl<T: Entity> MappingCompiler<T> for SessionMappingBuilder<T> {
    fn create(table: String) -> Self {
        Self {
            draft: MappingDraft::new(OrmKind::Session, table),
        }
    }

    fn finish(self) -> CoreResult<EntityBinding<T>> {
        let native = NativeSchema::Table(self.draft.relational_table());
        self.draft.compile(native)
    }
}

impl<T: Entity> EntityMappingBuilder<T> for SessionMappingBuilder<T> {
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

    // Unsupported: Length, Unique, Index, CustomSqlType, CascadeDelete,
    // WithSerialization.
    fn references(&mut self, relation: Relation<T>, options: MappingOptions) {
        let target = relation.target();
        let mut column = ColumnDraft::new(MappingDraft::bind(relation.member, false));
        if let Some(name) = options.column {
            column.column = name;
        }
        if let Some(nullable) = options.nullable {
            column.nullable = nullable;
        }
        column.reference = Some(ReferenceMeta {
            column: column.column.clone(),
            target,
            on_delete: OnDelete::NoAction,
        });
        self.draft.add_column(column);
    }

    // Unsupported: everything but Column (the child's key column) and
    // CascadeDelete.
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
        OrmKind::Session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::{collection, member, reference, serialized_member};
    use std::collections::BTreeMap;

    #[derive(Debug, Default, Clone)]
    struct Order {
        id: i64,
        customer: String,
        notes: Option<String>,
        tags: BTreeMap<String, String>,
        line_ids: Vec<i64>,
    }

    impl Entity for Order {
        const NAME: &'static str = "Order";
    }

    #[derive(Debug, Default, Clone)]
    struct OrderLine {
        id: i64,
        order_id: Option<i64>,
    }

    impl Entity for OrderLine {
        const NAME: &'static str = "OrderLine";
    }

    fn order_builder() -> SessionMappingBuilder<Order> {
        let mut builder = SessionMappingBuilder::<Order>::create("orders".into());
        builder.id(member!(Order, id), MappingOptions::new().unique(true));
        builder.map(
            member!(Order, customer),
            MappingOptions::new().length(80).index("customer").cascade_delete(true),
        );
        builder.map(member!(Order, notes), MappingOptions::new());
        builder.map(serialized_member!(Order, tags), MappingOptions::new().with_serialization(true));
        builder.has_many(collection!(Order, line_ids => OrderLine), MappingOptions::new().cascade_delete(true));
        builder
    }

    #[test]
    fn compiles_table_and_collections() {
        let binding = order_builder().finish().unwrap();
        let meta = binding.meta();
        let table = meta.table().unwrap();
        assert_eq!(table.name, "orders");
        assert!(table.key().unwrap().identity);
        assert_eq!(table.column("customer").unwrap().length, Some(80));
        assert!(!table.column("customer").unwrap().nullable);
        assert!(table.column("notes").unwrap().nullable);
        assert!(meta.columns.iter().any(|c| c.name == "tags" && c.serialized));
        assert_eq!(table.indexes[0].name, "IX_orders_customer");
        assert_eq!(
            meta.collections[0].kind,
            CollectionKind::OneToMany {
                child_column: "order_id".into()
            }
        );
        assert!(meta.collections[0].cascade_delete);
    }

    #[test]
    fn references_never_cascade() {
        let mut builder = SessionMappingBuilder::<OrderLine>::create("lines".into());
        builder.id(member!(OrderLine, id), MappingOptions::new());
        builder.references(
            reference!(OrderLine, order_id => Order),
            MappingOptions::new().cascade_delete(true).length(3),
        );
        let binding = builder.finish().unwrap();
        let reference = &binding.meta().references[0];
        assert_eq!(reference.on_delete, OnDelete::NoAction);
        assert_eq!(reference.column, "order_id");
        assert_eq!(binding.meta().table().unwrap().column("order_id").unwrap().length, None);
    }

    #[test]
    fn second_id_is_a_mapping_error() {
        let mut builder = order_builder();
        builder.id(member!(Order, customer), MappingOptions::new());
        assert!(matches!(builder.finish(), Err(CoreError::InvalidMapping { .. })));
    }

    #[test]
    fn non_member_selector_is_rejected() {
        let mut builder = order_builder();
        builder.map(
            Member::native("customer.len", |o: &Order| &o.id, |o: &mut Order| &mut o.id),
            MappingOptions::new(),
        );
        assert!(matches!(builder.finish(), Err(CoreError::InvalidMapping { .. })));
    }

    #[test]
    fn duplicate_column_is_rejected() {
        let mut builder = order_builder();
        builder.map(member!(Order, notes), MappingOptions::new().column("customer"));
        assert!(matches!(builder.finish(), Err(CoreError::InvalidMapping { .. })));
    }

    #[test]
    fn missing_key_is_reported() {
        let mut builder = SessionMappingBuilder::<Order>::create("orders".into());
        builder.map(member!(Order, customer), MappingOptions::new());
        assert!(matches!(builder.finish(), Err(CoreError::MissingPrimaryKey { .. })));
    }

    #[test]
    fn binding_round_trips_rows() {
        let binding = order_builder().finish().unwrap();
        let mut order = Order {
            id: 7,
            customer: "ann".into(),
            notes: None,
            tags: BTreeMap::from([("a".to_string(), "b".to_string())]),
            line_ids: vec![1, 2],
        };
        let row = binding.to_row(&order).unwrap();
        assert_eq!(
            row.collections,
            vec![vec![entiorm_codec::Value::Integer(1), entiorm_codec::Value::Integer(2)]]
        );
        let back = binding.materialize(&row).unwrap();
        assert_eq!(back.tags, order.tags);
        assert_eq!(back.line_ids, vec![1, 2]);
        order.customer.clear();
        binding.apply(&mut order, &row).unwrap();
        assert_eq!(order.customer, "ann");
    }
}

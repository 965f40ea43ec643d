//! The mapping DSL: builders, providers and initialize handlers.

use crate::entity::{Collection, Entity, Member, Relation};
use crate::mapping::MappingOptions;
use crate::types::OrmKind;

/// Receives mapping directives for entity `T` and translates them into
/// one ORM's native mapping.
///
/// Directives are declarative. Problems (a second `id`, a selector whose
/// name is not an identifier) are collected and reported when the
/// mapping is compiled, on first use of `T`.
pub trait EntityMappingBuilder<T: Entity> {
    /// Declares the primary key member.
    fn id(&mut self, member: Member<T>, options: MappingOptions);

    /// Declares a scalar member.
    fn map(&mut self, member: Member<T>, options: MappingOptions);

    /// Declares a many-to-one relationship.
    fn references(&mut self, relation: Relation<T>, options: MappingOptions);

    /// Declares a one-to-many collection.
    fn has_many(&mut self, collection: Collection<T>, options: MappingOptions);

    /// Declares a many-to-many collection.
    fn has_many_to_many(&mut self, collection: Collection<T>, options: MappingOptions);

    /// The ORM this builder compiles for.
    fn orm(&self) -> OrmKind;
}

/// Application-supplied mapping configuration for entity `T`.
///
/// All providers registered for `T` run in registration order against
/// one builder, once per process.
pub trait EntityMappingProvider<T: Entity>: Send + Sync {
    /// Adds directives to `builder`.
    fn configure(&self, builder: &mut dyn EntityMappingBuilder<T>);
}

/// Hook run before a table or collection is created.
pub trait DatabaseInitializeHandler: Send + Sync {
    /// Rewrites the table or collection name, e.g. to add a prefix.
    fn convert_table_name(&self, name: &mut String);
}

//! Test entities and their mapping providers.

use std::collections::BTreeMap;

use entiorm_core::{
    collection, member, reference, serialized_member, Container, Entity, EntityMappingBuilder,
    EntityMappingProvider, MappingOptions,
};

/// The canonical test entity: a key, a name and a serialized bag of
/// extra values.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TestTable {
    /// Generated key.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Free-form values, stored as one serialized member.
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Entity for TestTable {
    const NAME: &'static str = "TestTable";
}

impl TestTable {
    /// An unsaved row named `name`.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

/// Mapping of [`TestTable`].
pub struct TestTableMap;

impl EntityMappingProvider<TestTable> for TestTableMap {
    fn configure(&self, builder: &mut dyn EntityMappingBuilder<TestTable>) {
        builder.id(member!(TestTable, id), MappingOptions::new());
        builder.map(member!(TestTable, name), MappingOptions::new().index("name"));
        builder.map(
            serialized_member!(TestTable, extra),
            MappingOptions::new().with_serialization(true),
        );
    }
}

/// Owner side of a one-to-many relationship.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Customer {
    /// Generated key.
    pub id: i64,
    /// Customer name.
    pub name: String,
    /// Keys of the customer's orders.
    pub order_ids: Vec<i64>,
}

impl Entity for Customer {
    const NAME: &'static str = "Customer";
}

/// Child side of the customer relationship.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Order {
    /// Generated key.
    pub id: i64,
    /// Owning customer.
    pub customer_id: Option<i64>,
    /// Order total.
    pub total: f64,
}

impl Entity for Order {
    const NAME: &'static str = "Order";
}

/// Mapping of [`Customer`]; orders are deleted with their customer.
pub struct CustomerMap;

impl EntityMappingProvider<Customer> for CustomerMap {
    fn configure(&self, builder: &mut dyn EntityMappingBuilder<Customer>) {
        builder.id(member!(Customer, id), MappingOptions::new());
        builder.map(member!(Customer, name), MappingOptions::new().length(100));
        builder.has_many(
            collection!(Customer, order_ids => Order),
            MappingOptions::new().column("customer_id").cascade_delete(true),
        );
    }
}

/// Mapping of [`Order`].
pub struct OrderMap;

impl EntityMappingProvider<Order> for OrderMap {
    fn configure(&self, builder: &mut dyn EntityMappingBuilder<Order>) {
        builder.id(member!(Order, id), MappingOptions::new());
        builder.references(reference!(Order, customer_id => Customer), MappingOptions::new());
        builder.map(member!(Order, total), MappingOptions::new());
    }
}

/// Owner side of a many-to-many relationship.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Post {
    /// Generated key.
    pub id: i64,
    /// Title.
    pub title: String,
    /// Keys of the post's tags.
    pub tag_ids: Vec<i64>,
}

impl Entity for Post {
    const NAME: &'static str = "Post";
}

/// Target side of the post relationship.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Tag {
    /// Generated key.
    pub id: i64,
    /// Unique label.
    pub label: String,
}

impl Entity for Tag {
    const NAME: &'static str = "Tag";
}

/// Mapping of [`Post`].
pub struct PostMap;

impl EntityMappingProvider<Post> for PostMap {
    fn configure(&self, builder: &mut dyn EntityMappingBuilder<Post>) {
        builder.id(member!(Post, id), MappingOptions::new());
        builder.map(member!(Post, title), MappingOptions::new());
        builder.has_many_to_many(collection!(Post, tag_ids => Tag), MappingOptions::new());
    }
}

/// Mapping of [`Tag`].
pub struct TagMap;

impl EntityMappingProvider<Tag> for TagMap {
    fn configure(&self, builder: &mut dyn EntityMappingBuilder<Tag>) {
        builder.id(member!(Tag, id), MappingOptions::new());
        builder.map(member!(Tag, label), MappingOptions::new().unique(true).length(40));
    }
}

/// An entity keyed by a client-generated UUID.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LoginSession {
    /// Generated key.
    pub id: uuid::Uuid,
    /// Owner name.
    pub user: String,
    /// Optional note.
    pub note: Option<String>,
}

impl Entity for LoginSession {
    const NAME: &'static str = "LoginSession";
}

/// Mapping of [`LoginSession`].
pub struct LoginSessionMap;

impl EntityMappingProvider<LoginSession> for LoginSessionMap {
    fn configure(&self, builder: &mut dyn EntityMappingBuilder<LoginSession>) {
        builder.id(member!(LoginSession, id), MappingOptions::new());
        builder.map(member!(LoginSession, user), MappingOptions::new());
        builder.map(member!(LoginSession, note), MappingOptions::new());
    }
}

/// An entity without a key, storable only in documents.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AuditEntry {
    /// Message text.
    pub message: String,
    /// Severity.
    pub level: i64,
}

impl Entity for AuditEntry {
    const NAME: &'static str = "AuditEntry";
}

/// Mapping of [`AuditEntry`].
pub struct AuditEntryMap;

impl EntityMappingProvider<AuditEntry> for AuditEntryMap {
    fn configure(&self, builder: &mut dyn EntityMappingBuilder<AuditEntry>) {
        builder.map(member!(AuditEntry, message), MappingOptions::new());
        builder.map(member!(AuditEntry, level), MappingOptions::new());
    }
}

/// A container with every fixture mapping registered.
pub fn fixture_container() -> Container {
    let container = Container::new();
    container
        .register_mapping::<TestTable, _>(TestTableMap)
        .register_mapping::<Customer, _>(CustomerMap)
        .register_mapping::<Order, _>(OrderMap)
        .register_mapping::<Post, _>(PostMap)
        .register_mapping::<Tag, _>(TagMap)
        .register_mapping::<LoginSession, _>(LoginSessionMap)
        .register_mapping::<AuditEntry, _>(AuditEntryMap);
    container
}

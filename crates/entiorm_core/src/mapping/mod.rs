//! Entity mapping: the builder DSL, its four ORM implementations and the
//! per-factory registry of compiled mappings.

mod binding;
mod builder;
mod document;
mod draft;
mod mapper;
mod meta;
mod model;
mod options;
mod registry;
mod session;

pub use binding::EntityBinding;
pub use builder::{DatabaseInitializeHandler, EntityMappingBuilder, EntityMappingProvider};
pub use document::DocumentMappingBuilder;
pub use mapper::MapperMappingBuilder;
pub use meta::{
    CollectionKind, CollectionMeta, ColumnMeta, KeyGeneration, KeyMeta, NativeSchema, OnDelete,
    ReferenceMeta, TableMeta,
};
pub use model::ModelMappingBuilder;
pub use options::MappingOptions;
pub use registry::MappingRegistry;
pub(crate) use registry::SchemaInstaller;
pub use session::SessionMappingBuilder;

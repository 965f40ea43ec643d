//! Typed member descriptors.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use entiorm_codec::{serde_value, Value};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::field::{FieldValue, ValueKind};
use super::Entity;
use crate::error::CoreResult;
use crate::mapping::{MappingRegistry, SchemaInstaller, TableMeta};

type Reader<T> = Arc<dyn Fn(&T) -> CoreResult<Value> + Send + Sync>;
type Writer<T> = Arc<dyn Fn(&mut T, Value) -> Result<(), String> + Send + Sync>;

/// A scalar member of entity `T`: its name plus a reader and writer.
///
/// Build with [`member!`](crate::member) or
/// [`serialized_member!`](crate::serialized_member).
pub struct Member<T> {
    name: &'static str,
    kind: ValueKind,
    nullable: bool,
    serialized: bool,
    read: Reader<T>,
    write: Writer<T>,
}

impl<T: 'static> Member<T> {
    /// A member stored as a native column of `V`'s kind.
    pub fn native<V: FieldValue>(
        name: &'static str,
        get: fn(&T) -> &V,
        get_mut: fn(&mut T) -> &mut V,
    ) -> Self {
        Self {
            name,
            kind: V::KIND,
            nullable: V::NULLABLE,
            serialized: false,
            read: Arc::new(move |entity: &T| Ok(get(entity).to_value())),
            write: Arc::new(move |entity: &mut T, value: Value| {
                *get_mut(entity) = V::from_value(value)?;
                Ok(())
            }),
        }
    }

    /// A member whose serde representation is stored as one value.
    ///
    /// The mapping always stores it serialized.
    pub fn serialized<V>(
        name: &'static str,
        get: fn(&T) -> &V,
        get_mut: fn(&mut T) -> &mut V,
    ) -> Self
    where
        V: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        Self {
            name,
            kind: ValueKind::Bytes,
            nullable: false,
            serialized: true,
            read: Arc::new(move |entity: &T| Ok(serde_value::to_value(get(entity))?)),
            write: Arc::new(move |entity: &mut T, value: Value| {
                *get_mut(entity) = serde_value::from_value(value).map_err(|e| e.to_string())?;
                Ok(())
            }),
        }
    }
}

impl<T> Member<T> {
    /// Member name as written in the selector.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Storage category.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Whether the member's type admits null.
    #[must_use]
    pub fn nullable(&self) -> bool {
        self.nullable
    }

    /// Whether the member must be stored serialized.
    #[must_use]
    pub fn is_serialized(&self) -> bool {
        self.serialized
    }

    pub(crate) fn read(&self, entity: &T) -> CoreResult<Value> {
        (self.read)(entity)
    }

    pub(crate) fn write(&self, entity: &mut T, value: Value) -> Result<(), String> {
        (self.write)(entity, value)
    }
}

impl<T> Clone for Member<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            kind: self.kind,
            nullable: self.nullable,
            serialized: self.serialized,
            read: Arc::clone(&self.read),
            write: Arc::clone(&self.write),
        }
    }
}

impl<T> fmt::Debug for Member<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("nullable", &self.nullable)
            .field("serialized", &self.serialized)
            .finish()
    }
}

/// The entity type on the other side of a relationship.
#[derive(Clone, Copy)]
pub struct Target {
    type_id: TypeId,
    name: &'static str,
    resolve: fn(&MappingRegistry, &dyn SchemaInstaller) -> CoreResult<Arc<TableMeta>>,
}

impl Target {
    /// Describes entity type `E`.
    #[must_use]
    pub fn of<E: Entity>() -> Self {
        Self {
            type_id: TypeId::of::<E>(),
            name: E::NAME,
            resolve: |registry, installer| {
                registry
                    .binding_with::<E>(installer)
                    .map(|binding| Arc::clone(binding.meta()))
            },
        }
    }

    /// Type id of the target entity.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Entity name of the target.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Compiles (if needed) and returns the target's mapping.
    pub(crate) fn resolve(&self, registry: &MappingRegistry) -> CoreResult<Arc<TableMeta>> {
        (self.resolve)(registry, registry.installer())
    }

    /// Like [`resolve`](Self::resolve), installing through `installer`.
    pub(crate) fn resolve_with(
        &self,
        registry: &MappingRegistry,
        installer: &dyn SchemaInstaller,
    ) -> CoreResult<Arc<TableMeta>> {
        (self.resolve)(registry, installer)
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Target").field(&self.name).finish()
    }
}

/// A many-to-one member: a scalar holding the key of another entity.
#[derive(Debug, Clone)]
pub struct Relation<T> {
    pub(crate) member: Member<T>,
    pub(crate) target: Target,
}

impl<T: 'static> Relation<T> {
    /// Declares that `member` holds a key of entity `E`.
    #[must_use]
    pub fn to<E: Entity>(member: Member<T>) -> Self {
        Self {
            member,
            target: Target::of::<E>(),
        }
    }

    /// The member holding the key.
    #[must_use]
    pub fn member(&self) -> &Member<T> {
        &self.member
    }

    /// The referenced entity.
    #[must_use]
    pub fn target(&self) -> Target {
        self.target
    }
}

type ListReader<T> = Arc<dyn Fn(&T) -> Vec<Value> + Send + Sync>;
type ListWriter<T> = Arc<dyn Fn(&mut T, Vec<Value>) -> Result<(), String> + Send + Sync>;

/// A collection member: a list of keys of another entity.
pub struct Collection<T> {
    name: &'static str,
    element_kind: ValueKind,
    target: Target,
    read: ListReader<T>,
    write: ListWriter<T>,
}

impl<T: 'static> Collection<T> {
    /// Declares that `Vec<K>` field `name` holds keys of entity `E`.
    pub fn of<K: FieldValue, E: Entity>(
        name: &'static str,
        get: fn(&T) -> &Vec<K>,
        get_mut: fn(&mut T) -> &mut Vec<K>,
    ) -> Self {
        Self {
            name,
            element_kind: K::KIND,
            target: Target::of::<E>(),
            read: Arc::new(move |entity: &T| get(entity).iter().map(FieldValue::to_value).collect()),
            write: Arc::new(move |entity: &mut T, values: Vec<Value>| {
                *get_mut(entity) = values
                    .into_iter()
                    .map(K::from_value)
                    .collect::<Result<Vec<K>, String>>()?;
                Ok(())
            }),
        }
    }
}

impl<T> Collection<T> {
    /// Member name as written in the selector.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Storage category of one element.
    #[must_use]
    pub fn element_kind(&self) -> ValueKind {
        self.element_kind
    }

    /// The entity the keys belong to.
    #[must_use]
    pub fn target(&self) -> Target {
        self.target
    }

    pub(crate) fn read(&self, entity: &T) -> Vec<Value> {
        (self.read)(entity)
    }

    pub(crate) fn write(&self, entity: &mut T, values: Vec<Value>) -> Result<(), String> {
        (self.write)(entity, values)
    }
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            element_kind: self.element_kind,
            target: self.target,
            read: Arc::clone(&self.read),
            write: Arc::clone(&self.write),
        }
    }
}

impl<T> fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("target", &self.target)
            .finish()
    }
}

/// Selects a natively stored field: `member!(Order, total)`.
#[macro_export]
macro_rules! member {
    ($entity:ty, $field:ident) => {
        $crate::Member::<$entity>::native(
            stringify!($field),
            |e: &$entity| &e.$field,
            |e: &mut $entity| &mut e.$field,
        )
    };
}

/// Selects a field stored through the serialized codec:
/// `serialized_member!(Order, extra)`.
#[macro_export]
macro_rules! serialized_member {
    ($entity:ty, $field:ident) => {
        $crate::Member::<$entity>::serialized(
            stringify!($field),
            |e: &$entity| &e.$field,
            |e: &mut $entity| &mut e.$field,
        )
    };
}

/// Selects a field holding the key of another entity:
/// `reference!(OrderLine, order_id => Order)`.
#[macro_export]
macro_rules! reference {
    ($entity:ty, $field:ident => $target:ty) => {
        $crate::Relation::<$entity>::to::<$target>($crate::member!($entity, $field))
    };
}

/// Selects a `Vec` field holding keys of another entity:
/// `collection!(Order, line_ids => OrderLine)`.
#[macro_export]
macro_rules! collection {
    ($entity:ty, $field:ident => $target:ty) => {
        $crate::Collection::<$entity>::of::<_, $target>(
            stringify!($field),
            |e: &$entity| &e.$field,
            |e: &mut $entity| &mut e.$field,
        )
    };
}

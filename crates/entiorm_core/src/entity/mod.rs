//! Entities, member descriptors and the neutral row form.
//!
//! An entity is any `Default + Clone` struct. Members are described with
//! typed accessor pairs instead of runtime expressions; the macros
//! [`member!`](crate::member), [`serialized_member!`](crate::serialized_member),
//! [`reference!`](crate::reference) and [`collection!`](crate::collection)
//! expand to direct field projections, so a selector can only ever name a
//! field of the entity itself.

mod field;
mod member;

use std::collections::BTreeMap;

use entiorm_codec::Value;

pub use field::{FieldValue, ValueKind};
pub use member::{Collection, Member, Relation, Target};

/// A type that can be persisted.
pub trait Entity: Default + Clone + Send + Sync + 'static {
    /// Default table or collection name.
    const NAME: &'static str;
}

/// Column (or element) name to stored value.
pub type Record = BTreeMap<String, Value>;

/// One stored entity in neutral form: its scalar record plus the key
/// lists of every mapped collection, in mapping order.
///
/// Backends that do not load collections leave `collections` empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    /// Column values.
    pub record: Record,
    /// Collection key lists.
    pub collections: Vec<Vec<Value>>,
}

impl Row {
    /// A row without collections.
    #[must_use]
    pub fn new(record: Record) -> Self {
        Self {
            record,
            collections: Vec::new(),
        }
    }

    /// Value of a column, `Null` when absent.
    #[must_use]
    pub fn get(&self, column: &str) -> &Value {
        self.record.get(column).unwrap_or(&Value::Null)
    }
}

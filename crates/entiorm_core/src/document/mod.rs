//! Embedded document database.
//!
//! Collections hold documents keyed by one element. Every operation is
//! atomic on its own; there are no multi-operation transactions. With a
//! `Path` in the connection string, operations are journaled through
//! [`entiorm_storage::RecordLog`] and replayed on open.

mod database;

pub use database::DocumentDatabase;

/// Element name used for the document id when the entity declares no key.
pub const HIDDEN_ID: &str = "_id";

/// An index over one or more document elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentIndex {
    /// Index name.
    pub name: String,
    /// Elements in declaration order.
    pub elements: Vec<String>,
    /// Reject two documents with equal element values.
    pub unique: bool,
    /// Skip documents lacking every indexed element.
    pub sparse: bool,
}

/// Shape of one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDef {
    /// Collection name.
    pub name: String,
    /// Element holding the document id.
    pub key_element: String,
    /// Elements that must be present and non-null.
    pub required: Vec<String>,
    /// Indexes, created after every mapping directive ran.
    pub indexes: Vec<DocumentIndex>,
}

impl CollectionDef {
    /// A collection keyed by [`HIDDEN_ID`].
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_element: HIDDEN_ID.to_string(),
            required: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Adds `element` to index `name`. Members sharing a name form one
    /// compound index; unique indexes are strict, the rest sparse.
    pub fn add_to_index(&mut self, name: &str, element: &str, unique: bool) {
        match self.indexes.iter_mut().find(|i| i.name == name) {
            Some(index) => {
                if !index.elements.iter().any(|e| e == element) {
                    index.elements.push(element.to_string());
                }
                index.unique |= unique;
                index.sparse = !index.unique;
            }
            None => self.indexes.push(DocumentIndex {
                name: name.to_string(),
                elements: vec![element.to_string()],
                unique,
                sparse: !unique,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_member_makes_index_strict() {
        let mut def = CollectionDef::new("people");
        def.add_to_index("by_name", "first", false);
        assert!(def.indexes[0].sparse);
        def.add_to_index("by_name", "last", true);
        assert_eq!(def.indexes[0].elements, vec!["first", "last"]);
        assert!(def.indexes[0].unique);
        assert!(!def.indexes[0].sparse);
    }
}

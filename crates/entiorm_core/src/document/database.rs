//! Collections, index enforcement and the optional journal.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use entiorm_codec::{from_cbor, to_canonical_cbor, Value};
use entiorm_storage::{FileJournal, JournalBackend, RecordLog};
use parking_lot::Mutex;

use super::CollectionDef;
use crate::config::ConnectionString;
use crate::entity::Record;
use crate::error::{CoreError, CoreResult};

/// An embedded document database.
///
/// `DocumentDatabase` is shared by every context of a factory. Each call
/// takes the database lock once, so single operations are atomic and
/// immediately visible to every other context.
///
/// Connection string: `Database=<name>[;Path=<journal file>]`. Without a
/// path the database lives in memory for the life of the factory.
pub struct DocumentDatabase {
    name: String,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, StoredCollection>,
    log: Option<RecordLog>,
}

struct StoredCollection {
    def: CollectionDef,
    /// Canonical CBOR of the key to document.
    docs: BTreeMap<Vec<u8>, Record>,
    sequence: i64,
}

impl StoredCollection {
    fn new(def: CollectionDef) -> Self {
        Self {
            def,
            docs: BTreeMap::new(),
            sequence: 0,
        }
    }
}

/// A journaled change.
enum Op {
    Upsert {
        collection: String,
        key: Value,
        doc: Record,
    },
    Delete {
        collection: String,
        key: Value,
    },
    Sequence {
        collection: String,
        value: i64,
    },
}

impl Op {
    fn encode(&self) -> CoreResult<Vec<u8>> {
        let text = |s: &str| Value::Text(s.to_string());
        let value = match self {
            Self::Upsert {
                collection,
                key,
                doc,
            } => Value::map(vec![
                (text("op"), text("upsert")),
                (text("c"), text(collection)),
                (text("k"), key.clone()),
                (text("d"), record_to_value(doc)),
            ]),
            Self::Delete { collection, key } => Value::map(vec![
                (text("op"), text("delete")),
                (text("c"), text(collection)),
                (text("k"), key.clone()),
            ]),
            Self::Sequence { collection, value } => Value::map(vec![
                (text("op"), text("seq")),
                (text("c"), text(collection)),
                (text("n"), Value::Integer(*value)),
            ]),
        };
        Ok(to_canonical_cbor(&value)?)
    }

    fn decode(bytes: &[u8]) -> CoreResult<Self> {
        let value = from_cbor(bytes)?;
        let field = |name: &str| {
            value.get(name).cloned().ok_or_else(|| {
                CoreError::data_mismatch("journal", format!("record lacks '{name}'"))
            })
        };
        let collection = match field("c")? {
            Value::Text(name) => name,
            other => {
                return Err(CoreError::data_mismatch(
                    "journal",
                    format!("collection name is {}", other.type_name()),
                ))
            }
        };
        match field("op")?.as_text() {
            Some("upsert") => Ok(Self::Upsert {
                collection,
                key: field("k")?,
                doc: value_to_record(field("d")?)?,
            }),
            Some("delete") => Ok(Self::Delete {
                collection,
                key: field("k")?,
            }),
            Some("seq") => Ok(Self::Sequence {
                collection,
                value: field("n")?.as_integer().unwrap_or_default(),
            }),
            _ => Err(CoreError::data_mismatch("journal", "unknown operation")),
        }
    }
}

fn record_to_value(record: &Record) -> Value {
    Value::map(
        record
            .iter()
            .map(|(k, v)| (Value::Text(k.clone()), v.clone()))
            .collect(),
    )
}

fn value_to_record(value: Value) -> CoreResult<Record> {
    match value {
        Value::Map(pairs) => pairs
            .into_iter()
            .map(|(k, v)| match k {
                Value::Text(name) => Ok((name, v)),
                other => Err(CoreError::data_mismatch(
                    "journal",
                    format!("element name is {}", other.type_name()),
                )),
            })
            .collect(),
        other => Err(CoreError::data_mismatch(
            "journal",
            format!("document is {}", other.type_name()),
        )),
    }
}

fn key_bytes(key: &Value) -> CoreResult<Vec<u8>> {
    Ok(to_canonical_cbor(key)?)
}

impl Inner {
    fn collection_mut(&mut self, name: &str) -> &mut StoredCollection {
        self.collections
            .entry(name.to_string())
            .or_insert_with(|| StoredCollection::new(CollectionDef::new(name)))
    }

    fn apply(&mut self, op: Op) -> CoreResult<()> {
        match op {
            Op::Upsert {
                collection,
                key,
                doc,
            } => {
                let bytes = key_bytes(&key)?;
                let stored = self.collection_mut(&collection);
                // Generated ids must stay above every explicit integer key.
                if let Value::Integer(explicit) = key {
                    stored.sequence = stored.sequence.max(explicit);
                }
                stored.docs.insert(bytes, doc);
            }
            Op::Delete { collection, key } => {
                let bytes = key_bytes(&key)?;
                self.collection_mut(&collection).docs.remove(&bytes);
            }
            Op::Sequence { collection, value } => {
                let stored = self.collection_mut(&collection);
                stored.sequence = stored.sequence.max(value);
            }
        }
        Ok(())
    }

    /// Journals `op` (if durable) and applies it.
    fn commit(&mut self, op: Op) -> CoreResult<()> {
        if let Some(log) = self.log.as_mut() {
            log.append(&op.encode()?)?;
        }
        self.apply(op)
    }
}

impl DocumentDatabase {
    /// Opens the database described by `connection_string`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfiguration`] if `Database` is
    /// missing, or a storage error if the journal cannot be opened.
    pub fn open(connection_string: &str) -> CoreResult<Self> {
        let parsed = ConnectionString::parse(connection_string);
        let name = parsed
            .get(&["database"])
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| {
                CoreError::invalid_configuration(
                    "document connection string requires Database=<name>",
                )
            })?;
        match parsed.get(&["path", "journal"]) {
            Some(path) => {
                let journal = FileJournal::open(Path::new(path))?;
                Self::with_journal(name, Box::new(journal))
            }
            None => Ok(Self::in_memory(name)),
        }
    }

    /// A database that lives only in memory.
    #[must_use]
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// A durable database over `journal`, replaying what it already holds.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be read or holds a record
    /// that is not a journaled operation.
    pub fn with_journal(
        name: impl Into<String>,
        journal: Box<dyn JournalBackend>,
    ) -> CoreResult<Self> {
        let name = name.into();
        let mut log = RecordLog::new(journal);
        let mut inner = Inner::default();
        let records = log.replay()?;
        for payload in &records {
            inner.apply(Op::decode(payload)?)?;
        }
        inner.log = Some(log);
        tracing::info!(database = %name, records = records.len(), "document journal replayed");
        Ok(Self {
            name,
            inner: Mutex::new(inner),
        })
    }

    /// Database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creates or redefines a collection. Stored documents are kept.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConstraintViolation`] if existing documents
    /// already break one of the new unique indexes.
    pub fn ensure_collection(&self, def: CollectionDef) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        let stored = inner.collection_mut(&def.name);
        for index in def.indexes.iter().filter(|i| i.unique) {
            let mut seen = Vec::new();
            for doc in stored.docs.values() {
                let entry = index_entry(doc, &index.elements);
                if seen.contains(&entry) {
                    return Err(CoreError::constraint_violation(
                        &def.name,
                        format!("existing documents violate unique index {}", index.name),
                    ));
                }
                seen.push(entry);
            }
        }
        tracing::debug!(collection = %def.name, indexes = def.indexes.len(), "collection ensured");
        stored.def = def;
        Ok(())
    }

    /// All documents of `collection`, ordered by key.
    #[must_use]
    pub fn find_all(&self, collection: &str) -> Vec<Record> {
        let inner = self.inner.lock();
        inner
            .collections
            .get(collection)
            .map(|c| c.docs.values().cloned().collect())
            .unwrap_or_default()
    }

    /// The document stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns a codec error if `key` cannot be encoded.
    pub fn find(&self, collection: &str, key: &Value) -> CoreResult<Option<Record>> {
        let bytes = key_bytes(key)?;
        let inner = self.inner.lock();
        Ok(inner
            .collections
            .get(collection)
            .and_then(|c| c.docs.get(&bytes).cloned()))
    }

    /// Number of documents in `collection`.
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        let inner = self.inner.lock();
        inner.collections.get(collection).map_or(0, |c| c.docs.len())
    }

    /// Replaces the document under `key`, inserting it if absent.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConstraintViolation`] if a required element is
    /// missing or null, or a unique index already holds the same entry
    /// for another document.
    pub fn upsert(&self, collection: &str, key: Value, doc: Record) -> CoreResult<()> {
        let bytes = key_bytes(&key)?;
        let mut inner = self.inner.lock();
        let stored = inner.collection_mut(collection);

        for element in &stored.def.required {
            if doc.get(element).map_or(true, Value::is_null) {
                return Err(CoreError::constraint_violation(
                    collection,
                    format!("element '{element}' is required"),
                ));
            }
        }
        for index in stored.def.indexes.iter().filter(|i| i.unique) {
            let entry = index_entry(&doc, &index.elements);
            let clash = stored
                .docs
                .iter()
                .any(|(other, existing)| *other != bytes && index_entry(existing, &index.elements) == entry);
            if clash {
                return Err(CoreError::constraint_violation(
                    collection,
                    format!("duplicate entry for unique index {}", index.name),
                ));
            }
        }

        inner.commit(Op::Upsert {
            collection: collection.to_string(),
            key,
            doc,
        })
    }

    /// Removes the document under `key`. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal write fails.
    pub fn delete(&self, collection: &str, key: &Value) -> CoreResult<bool> {
        let bytes = key_bytes(key)?;
        let mut inner = self.inner.lock();
        let exists = inner
            .collections
            .get(collection)
            .is_some_and(|c| c.docs.contains_key(&bytes));
        if exists {
            inner.commit(Op::Delete {
                collection: collection.to_string(),
                key: key.clone(),
            })?;
        }
        Ok(exists)
    }

    /// Next value of the collection's integer id sequence.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal write fails.
    pub fn next_sequence(&self, collection: &str) -> CoreResult<i64> {
        let mut inner = self.inner.lock();
        let value = inner.collection_mut(collection).sequence + 1;
        inner.commit(Op::Sequence {
            collection: collection.to_string(),
            value,
        })?;
        Ok(value)
    }
}

impl std::fmt::Debug for DocumentDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentDatabase")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Values of `elements` in `doc`; missing elements count as null.
fn index_entry(doc: &Record, elements: &[String]) -> Vec<Value> {
    elements
        .iter()
        .map(|e| doc.get(e).cloned().unwrap_or(Value::Null))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use entiorm_storage::MemoryJournal;

    fn doc(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn people() -> CollectionDef {
        let mut def = CollectionDef::new("people");
        def.required.push("name".into());
        def.add_to_index("email", "email", true);
        def
    }

    #[test]
    fn upsert_replaces() {
        let db = DocumentDatabase::in_memory("t");
        db.ensure_collection(people()).unwrap();
        let key = Value::Integer(1);
        db.upsert("people", key.clone(), doc(&[("name", "a".into())]))
            .unwrap();
        db.upsert("people", key.clone(), doc(&[("name", "b".into())]))
            .unwrap();
        assert_eq!(db.len("people"), 1);
        let found = db.find("people", &key).unwrap().unwrap();
        assert_eq!(found["name"], Value::from("b"));
    }

    #[test]
    fn required_element_enforced() {
        let db = DocumentDatabase::in_memory("t");
        db.ensure_collection(people()).unwrap();
        let err = db
            .upsert("people", Value::Integer(1), doc(&[("name", Value::Null)]))
            .unwrap_err();
        assert!(matches!(err, CoreError::ConstraintViolation { .. }));
    }

    #[test]
    fn unique_index_enforced_across_keys() {
        let db = DocumentDatabase::in_memory("t");
        db.ensure_collection(people()).unwrap();
        let first = doc(&[("name", "a".into()), ("email", "x@y".into())]);
        db.upsert("people", Value::Integer(1), first.clone()).unwrap();
        // Same key may keep its own entry.
        db.upsert("people", Value::Integer(1), first.clone()).unwrap();
        let err = db.upsert("people", Value::Integer(2), first).unwrap_err();
        assert!(matches!(err, CoreError::ConstraintViolation { .. }));
    }

    #[test]
    fn delete_reports_existence() {
        let db = DocumentDatabase::in_memory("t");
        db.upsert("people", Value::Integer(1), doc(&[("name", "a".into())]))
            .unwrap();
        assert!(db.delete("people", &Value::Integer(1)).unwrap());
        assert!(!db.delete("people", &Value::Integer(1)).unwrap());
    }

    #[test]
    fn journal_replays_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let cs = format!("Database=t;Path={}", dir.path().join("t.journal").display());
        {
            let db = DocumentDatabase::open(&cs).unwrap();
            db.upsert("people", Value::Integer(1), doc(&[("name", "a".into())]))
                .unwrap();
            db.upsert("people", Value::Integer(2), doc(&[("name", "b".into())]))
                .unwrap();
            db.delete("people", &Value::Integer(1)).unwrap();
            assert_eq!(db.next_sequence("people").unwrap(), 3);
        }

        let reopened = DocumentDatabase::open(&cs).unwrap();
        assert_eq!(reopened.len("people"), 1);
        let found = reopened.find("people", &Value::Integer(2)).unwrap().unwrap();
        assert_eq!(found["name"], Value::from("b"));
        assert_eq!(reopened.next_sequence("people").unwrap(), 4);
    }

    #[test]
    fn sequence_stays_above_explicit_keys() {
        let db = DocumentDatabase::in_memory("t");
        db.upsert("people", Value::Integer(7), doc(&[("name", "a".into())]))
            .unwrap();
        db.upsert("people", Value::from("k"), doc(&[("name", "b".into())]))
            .unwrap();
        assert_eq!(db.next_sequence("people").unwrap(), 8);
        db.upsert("people", Value::Integer(3), doc(&[("name", "c".into())]))
            .unwrap();
        assert_eq!(db.next_sequence("people").unwrap(), 9);
        assert_eq!(db.next_sequence("other").unwrap(), 1);
    }

    #[test]
    fn memory_journal_starts_empty() {
        let db = DocumentDatabase::with_journal("t", Box::new(MemoryJournal::new())).unwrap();
        assert_eq!(db.len("people"), 0);
        assert!(db.find_all("people").is_empty());
    }

    #[test]
    fn open_requires_database_name() {
        assert!(matches!(
            DocumentDatabase::open("Path=/tmp/x"),
            Err(CoreError::InvalidConfiguration { .. })
        ));
        let db = DocumentDatabase::open("Database=shop").unwrap();
        assert_eq!(db.name(), "shop");
    }
}

//! Directive accumulation shared by the four builders.
//!
//! A builder records directives into a [`MappingDraft`]; nothing reaches
//! a backend until every provider ran and the draft is compiled.

use super::binding::{BoundMember, EntityBinding};
use super::meta::{
    CollectionKind, CollectionMeta, ColumnMeta, KeyGeneration, KeyMeta, NativeSchema,
    ReferenceMeta, TableMeta,
};
use crate::document::CollectionDef;
use crate::entity::{Collection, Entity, Member, ValueKind};
use crate::error::{CoreError, CoreResult};
use crate::relational::{ColumnDef, TableDef};
use crate::types::OrmKind;

/// A recorded key directive.
pub(crate) struct KeyDraft<T> {
    pub bound: BoundMember<T>,
    pub column: String,
    pub length: Option<u32>,
    pub custom_type: Option<String>,
}

/// A recorded scalar or reference directive.
pub(crate) struct ColumnDraft<T> {
    pub bound: BoundMember<T>,
    pub column: String,
    pub nullable: bool,
    pub length: Option<u32>,
    pub custom_type: Option<String>,
    pub unique: bool,
    pub index: Option<String>,
    pub reference: Option<ReferenceMeta>,
}

impl<T> ColumnDraft<T> {
    /// A column named after the member, nullable as its type allows.
    pub fn new(bound: BoundMember<T>) -> Self {
        Self {
            column: bound.member.name().to_string(),
            nullable: bound.member.nullable(),
            bound,
            length: None,
            custom_type: None,
            unique: false,
            index: None,
            reference: None,
        }
    }
}

pub(crate) struct MappingDraft<T> {
    orm: OrmKind,
    table: String,
    key: Option<KeyDraft<T>>,
    columns: Vec<ColumnDraft<T>>,
    collections: Vec<(Collection<T>, CollectionMeta)>,
    errors: Vec<String>,
}

/// Whether `name` could be a field name.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// `OrderLine` to `order_line`.
pub(crate) fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

impl<T: Entity> MappingDraft<T> {
    pub fn new(orm: OrmKind, table: String) -> Self {
        Self {
            orm,
            table,
            key: None,
            columns: Vec::new(),
            collections: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Records a problem reported when the draft is compiled.
    fn fail(&mut self, message: String) {
        self.errors.push(message);
    }

    fn check_selector(&mut self, name: &str) -> bool {
        if is_identifier(name) {
            true
        } else {
            self.fail(format!("selector '{name}' is not a direct member access"));
            false
        }
    }

    /// Wraps `member`, routing it through the serialized codec when asked.
    pub fn bind(member: Member<T>, with_serialization: bool) -> BoundMember<T> {
        let wrap = with_serialization || member.is_serialized();
        BoundMember { member, wrap }
    }

    pub fn set_key(&mut self, key: KeyDraft<T>) {
        if !self.check_selector(key.bound.member.name()) {
            return;
        }
        if let Some(existing) = &self.key {
            let message = format!(
                "id declared twice ({} and {})",
                existing.bound.member.name(),
                key.bound.member.name()
            );
            self.fail(message);
            return;
        }
        self.key = Some(key);
    }

    pub fn add_column(&mut self, column: ColumnDraft<T>) {
        if self.check_selector(column.bound.member.name()) {
            self.columns.push(column);
        }
    }

    pub fn add_collection(&mut self, collection: Collection<T>, kind: CollectionKind, cascade_delete: bool) {
        if !self.check_selector(collection.name()) {
            return;
        }
        let meta = CollectionMeta {
            member: collection.name(),
            target: collection.target(),
            kind,
            cascade_delete,
        };
        self.collections.push((collection, meta));
    }

    fn key_generation(key: &KeyDraft<T>) -> KeyGeneration {
        if key.bound.stores_bytes() {
            KeyGeneration::Assigned
        } else {
            KeyGeneration::for_kind(key.bound.member.kind())
        }
    }

    /// Relational table for the recorded directives.
    pub fn relational_table(&self) -> TableDef {
        let mut table = TableDef::new(&self.table);
        if let Some(key) = &self.key {
            let identity = Self::key_generation(key) == KeyGeneration::Identity;
            let mut column = ColumnDef::new(&key.column, key.bound.kind()).primary_key(identity);
            column.length = key.length;
            column.custom_type.clone_from(&key.custom_type);
            table.columns.push(column);
        }
        for draft in &self.columns {
            let mut column = ColumnDef::new(&draft.column, draft.bound.kind()).nullable(draft.nullable);
            column.length = draft.length;
            column.custom_type.clone_from(&draft.custom_type);
            column.unique = draft.unique;
            table.columns.push(column);
        }
        for draft in &self.columns {
            if let Some(index) = &draft.index {
                table.add_to_index(index, &draft.column, false);
            }
        }
        table
    }

    /// Document collection for the recorded directives.
    pub fn document_collection(&self) -> CollectionDef {
        let mut def = CollectionDef::new(&self.table);
        if let Some(key) = &self.key {
            def.key_element.clone_from(&key.column);
        }
        for draft in &self.columns {
            if !draft.nullable {
                def.required.push(draft.column.clone());
            }
        }
        // Index actions run after every directive, so compound indexes
        // see all of their members.
        for draft in &self.columns {
            match &draft.index {
                Some(index) => def.add_to_index(index, &draft.column, draft.unique),
                None if draft.unique => def.add_to_index(&draft.column, &draft.column, true),
                None => {}
            }
        }
        def
    }

    /// Validates the draft and produces the binding.
    pub fn compile(self, native: NativeSchema) -> CoreResult<EntityBinding<T>> {
        if let Some(message) = self.errors.into_iter().next() {
            return Err(CoreError::invalid_mapping(T::NAME, message));
        }
        if self.key.is_none() && self.orm.is_relational() {
            return Err(CoreError::MissingPrimaryKey {
                entity: T::NAME.to_string(),
            });
        }

        let mut names: Vec<&str> = self.columns.iter().map(|c| c.column.as_str()).collect();
        if let Some(key) = &self.key {
            names.push(key.column.as_str());
        }
        if let Some(empty) = names.iter().find(|n| n.trim().is_empty()) {
            return Err(CoreError::invalid_mapping(
                T::NAME,
                format!("empty column name '{empty}'"),
            ));
        }
        let mut sorted = names.clone();
        sorted.sort_unstable();
        if let Some(pair) = sorted.windows(2).find(|w| w[0] == w[1]) {
            return Err(CoreError::invalid_mapping(
                T::NAME,
                format!("column '{}' mapped twice", pair[0]),
            ));
        }

        let key_meta = self.key.as_ref().map(|key| KeyMeta {
            column: key.column.clone(),
            member: key.bound.member.name(),
            kind: key.bound.kind(),
            generation: Self::key_generation(key),
        });
        let columns = self
            .columns
            .iter()
            .map(|c| ColumnMeta {
                name: c.column.clone(),
                member: c.bound.member.name(),
                kind: c.bound.kind(),
                nullable: c.nullable,
                serialized: c.bound.stores_bytes(),
            })
            .collect();
        let references = self
            .columns
            .iter()
            .filter_map(|c| c.reference.clone())
            .collect();
        let (collections, collection_metas): (Vec<_>, Vec<_>) = self.collections.into_iter().unzip();

        let meta = TableMeta {
            entity: T::NAME,
            type_id: std::any::TypeId::of::<T>(),
            orm: self.orm,
            name: self.table,
            key: key_meta,
            columns,
            references,
            collections: collection_metas,
            native,
        };
        Ok(EntityBinding::new(
            meta,
            self.key.map(|k| k.bound),
            self.columns.into_iter().map(|c| c.bound).collect(),
            collections,
        ))
    }
}

impl<T> BoundMember<T> {
    /// Storage category after serialization is taken into account.
    pub(crate) fn kind(&self) -> ValueKind {
        if self.wrap {
            ValueKind::Bytes
        } else {
            self.member.kind()
        }
    }

    /// Whether the stored value is an opaque serialized blob.
    pub(crate) fn stores_bytes(&self) -> bool {
        self.wrap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers() {
        assert!(is_identifier("name"));
        assert!(is_identifier("_hidden2"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("a.b"));
        assert!(!is_identifier("2x"));
    }

    #[test]
    fn snake_names() {
        assert_eq!(snake_case("OrderLine"), "order_line");
        assert_eq!(snake_case("order"), "order");
    }
}

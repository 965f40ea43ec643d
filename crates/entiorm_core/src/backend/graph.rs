//! Collection and delete-behaviour handling over a [`RowStore`].
//!
//! Relationships are kept by the ORM layer, not by foreign keys in the
//! database: one-to-many children carry the owner key in a column,
//! many-to-many pairs live in a two-column join table owned by the
//! declaring side.

use entiorm_codec::Value;

use crate::entity::{Record, Row};
use crate::error::{CoreError, CoreResult};
use crate::mapping::{CollectionKind, CollectionMeta, KeyMeta, MappingRegistry, OnDelete, TableMeta};
use crate::relational::{eq, ColumnDef, RowStore, TableDef};
use crate::types::OrmKind;

/// Join-table column holding the owner key.
pub(super) const OWNER_COLUMN: &str = "owner_id";
/// Join-table column holding the target key.
pub(super) const TARGET_COLUMN: &str = "target_id";

pub(super) fn table_of(meta: &TableMeta) -> CoreResult<&TableDef> {
    meta.table().ok_or_else(|| {
        CoreError::invalid_operation(format!("{} is not mapped to a relational table", meta.entity))
    })
}

pub(super) fn key_of(meta: &TableMeta) -> CoreResult<&KeyMeta> {
    meta.key.as_ref().ok_or_else(|| CoreError::MissingPrimaryKey {
        entity: meta.entity.to_string(),
    })
}

/// Join table of a many-to-many collection of `owner` pointing at `target`.
pub(super) fn join_table(owner: &TableMeta, name: &str, target: &TableMeta) -> CoreResult<TableDef> {
    let mut table = TableDef::new(name);
    table
        .columns
        .push(ColumnDef::new(OWNER_COLUMN, key_of(owner)?.kind).nullable(false));
    table
        .columns
        .push(ColumnDef::new(TARGET_COLUMN, key_of(target)?.kind).nullable(false));
    table.add_to_index("pair", OWNER_COLUMN, true);
    table.add_to_index("pair", TARGET_COLUMN, true);
    Ok(table)
}

/// What happens to a child that loses its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Orphan {
    Delete,
    Detach,
}

fn orphan_rule(orm: OrmKind, collection: &CollectionMeta, child_nullable: bool) -> Orphan {
    if collection.cascade_delete {
        return Orphan::Delete;
    }
    match orm {
        OrmKind::Model if !child_nullable => Orphan::Delete,
        _ => Orphan::Detach,
    }
}

fn column_nullable(meta: &TableMeta, column: &str) -> bool {
    meta.columns
        .iter()
        .find(|c| c.name == column)
        .map_or(true, |c| c.nullable)
}

fn keys(records: &[Record], column: &str) -> Vec<Value> {
    records
        .iter()
        .filter_map(|r| r.get(column))
        .filter(|v| !v.is_null())
        .cloned()
        .collect()
}

fn set_null(column: &str) -> Record {
    Record::from([(column.to_string(), Value::Null)])
}

/// Key lists of every collection of the entity stored under `key`.
pub(super) fn load_collections(
    store: &mut dyn RowStore,
    registry: &MappingRegistry,
    meta: &TableMeta,
    key: &Value,
) -> CoreResult<Vec<Vec<Value>>> {
    let mut lists = Vec::with_capacity(meta.collections.len());
    for collection in &meta.collections {
        let target = collection.target.resolve(registry)?;
        let list = match &collection.kind {
            CollectionKind::OneToMany { child_column } => {
                let children = store.select(table_of(&target)?, &eq(child_column, key.clone()))?;
                keys(&children, &key_of(&target)?.column)
            }
            CollectionKind::ManyToMany { join_table: name } => {
                let join = join_table(meta, name, &target)?;
                let pairs = store.select(&join, &eq(OWNER_COLUMN, key.clone()))?;
                keys(&pairs, TARGET_COLUMN)
            }
        };
        lists.push(list);
    }
    Ok(lists)
}

/// Makes the stored relationships of `key` match `lists`.
///
/// Rows without collections (or with a different count) are left alone.
pub(super) fn sync_collections(
    store: &mut dyn RowStore,
    registry: &MappingRegistry,
    meta: &TableMeta,
    key: &Value,
    lists: &[Vec<Value>],
) -> CoreResult<()> {
    if meta.collections.is_empty() || lists.len() != meta.collections.len() {
        return Ok(());
    }
    for (collection, desired) in meta.collections.iter().zip(lists) {
        let target = collection.target.resolve(registry)?;
        match &collection.kind {
            CollectionKind::OneToMany { child_column } => {
                let child_table = table_of(&target)?;
                let child_key = key_of(&target)?;
                let current = keys(
                    &store.select(child_table, &eq(child_column, key.clone()))?,
                    &child_key.column,
                );
                let owner = Record::from([(child_column.clone(), key.clone())]);
                for child in desired.iter().filter(|k| !current.contains(k)) {
                    store.update(child_table, &owner, &eq(&child_key.column, child.clone()))?;
                }
                let rule = orphan_rule(meta.orm, collection, column_nullable(&target, child_column));
                for orphan in current.iter().filter(|k| !desired.contains(k)) {
                    match rule {
                        Orphan::Delete => {
                            delete_row(store, registry, &target, orphan)?;
                        }
                        Orphan::Detach => {
                            store.update(
                                child_table,
                                &set_null(child_column),
                                &eq(&child_key.column, orphan.clone()),
                            )?;
                        }
                    }
                }
            }
            CollectionKind::ManyToMany { join_table: name } => {
                let join = join_table(meta, name, &target)?;
                let current = keys(&store.select(&join, &eq(OWNER_COLUMN, key.clone()))?, TARGET_COLUMN);
                for stale in current.iter().filter(|k| !desired.contains(k)) {
                    let mut filter = eq(OWNER_COLUMN, key.clone());
                    filter.push((TARGET_COLUMN.to_string(), stale.clone()));
                    store.delete(&join, &filter)?;
                }
                let mut added: Vec<&Value> = Vec::new();
                for fresh in desired.iter().filter(|k| !current.contains(k)) {
                    if added.contains(&fresh) {
                        continue;
                    }
                    let pair = Record::from([
                        (OWNER_COLUMN.to_string(), key.clone()),
                        (TARGET_COLUMN.to_string(), fresh.clone()),
                    ]);
                    store.insert(&join, &pair)?;
                    added.push(fresh);
                }
            }
        }
    }
    Ok(())
}

/// Deletes the entity stored under `key` and applies every delete
/// behaviour that points at it. Returns the number of rows removed from
/// `meta`'s own table.
pub(super) fn delete_row(
    store: &mut dyn RowStore,
    registry: &MappingRegistry,
    meta: &TableMeta,
    key: &Value,
) -> CoreResult<u64> {
    let table = table_of(meta)?;
    let removed = store.delete(table, &eq(&key_of(meta)?.column, key.clone()))?;
    if removed == 0 {
        return Ok(0);
    }
    tracing::trace!(table = %meta.name, "row deleted, applying delete behaviours");

    for collection in &meta.collections {
        let target = collection.target.resolve(registry)?;
        match &collection.kind {
            CollectionKind::OneToMany { child_column } => {
                let child_table = table_of(&target)?;
                match orphan_rule(meta.orm, collection, column_nullable(&target, child_column)) {
                    Orphan::Delete => {
                        let children = store.select(child_table, &eq(child_column, key.clone()))?;
                        for child in keys(&children, &key_of(&target)?.column) {
                            delete_row(store, registry, &target, &child)?;
                        }
                    }
                    Orphan::Detach => {
                        store.update(child_table, &set_null(child_column), &eq(child_column, key.clone()))?;
                    }
                }
            }
            CollectionKind::ManyToMany { join_table: name } => {
                let join = join_table(meta, name, &target)?;
                let pairs = store.select(&join, &eq(OWNER_COLUMN, key.clone()))?;
                store.delete(&join, &eq(OWNER_COLUMN, key.clone()))?;
                if collection.cascade_delete {
                    for other in keys(&pairs, TARGET_COLUMN) {
                        delete_row(store, registry, &target, &other)?;
                    }
                }
            }
        }
    }

    for other in registry.compiled() {
        for collection in &other.collections {
            if collection.target.type_id() != meta.type_id {
                continue;
            }
            if let CollectionKind::ManyToMany { join_table: name } = &collection.kind {
                let join = join_table(&other, name, meta)?;
                store.delete(&join, &eq(TARGET_COLUMN, key.clone()))?;
            }
        }
        for reference in &other.references {
            if reference.target.type_id() != meta.type_id {
                continue;
            }
            let other_table = table_of(&other)?;
            match reference.on_delete {
                OnDelete::NoAction => {}
                OnDelete::SetNull => {
                    store.update(
                        other_table,
                        &set_null(&reference.column),
                        &eq(&reference.column, key.clone()),
                    )?;
                }
                OnDelete::Cascade => {
                    let dependents = store.select(other_table, &eq(&reference.column, key.clone()))?;
                    for dependent in keys(&dependents, &key_of(&other)?.column) {
                        delete_row(store, registry, &other, &dependent)?;
                    }
                }
            }
        }
    }
    Ok(removed)
}

/// Loads every row of `meta` with its collections.
pub(super) fn scan_rows(
    store: &mut dyn RowStore,
    registry: &MappingRegistry,
    meta: &TableMeta,
) -> CoreResult<Vec<Row>> {
    let records = store.select(table_of(meta)?, &[])?;
    let key_column = meta.key.as_ref().map(|k| k.column.clone());
    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        let collections = match key_column.as_ref().and_then(|c| record.get(c)) {
            Some(key) if !meta.collections.is_empty() => {
                let key = key.clone();
                load_collections(store, registry, meta, &key)?
            }
            _ => Vec::new(),
        };
        rows.push(Row { record, collections });
    }
    Ok(rows)
}

//! Dialect-neutral table definitions and the schema hash.

use std::fmt::Write as _;

use sha2::{Digest, Sha256};

use crate::entity::ValueKind;

/// Name of the migration-history marker table.
pub const MIGRATIONS_TABLE: &str = "__entiorm_migrations";

/// One column of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Storage category.
    pub kind: ValueKind,
    /// Whether null is allowed.
    pub nullable: bool,
    /// Bounded size; `None` is unbounded.
    pub length: Option<u32>,
    /// Native type override.
    pub custom_type: Option<String>,
    /// Single-column unique constraint.
    pub unique: bool,
    /// Part of the primary key.
    pub primary_key: bool,
    /// Database-generated integer key.
    pub identity: bool,
}

impl ColumnDef {
    /// A nullable column with no constraints.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: true,
            length: None,
            custom_type: None,
            unique: false,
            primary_key: false,
            identity: false,
        }
    }

    /// Marks the column as the primary key.
    #[must_use]
    pub fn primary_key(mut self, identity: bool) -> Self {
        self.primary_key = true;
        self.identity = identity && self.kind == ValueKind::Integer;
        self.nullable = false;
        self
    }

    /// Sets nullability.
    #[must_use]
    pub const fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }
}

/// A named index over one or more columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    /// Index name, unique per table.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<String>,
    /// Unique index.
    pub unique: bool,
}

/// A table: columns in declaration order plus secondary indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    /// Table name.
    pub name: String,
    /// Columns; the key column comes first when there is one.
    pub columns: Vec<ColumnDef>,
    /// Secondary indexes.
    pub indexes: Vec<IndexDef>,
}

impl TableDef {
    /// An empty table.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// The primary key column.
    #[must_use]
    pub fn key(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.primary_key)
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Adds `column` to index `name`, creating the index on first use.
    /// An index becomes unique as soon as one member asks for it.
    pub fn add_to_index(&mut self, name: &str, column: &str, unique: bool) {
        let qualified = format!("IX_{}_{}", self.name, name);
        match self.indexes.iter_mut().find(|i| i.name == qualified) {
            Some(index) => {
                if !index.columns.iter().any(|c| c == column) {
                    index.columns.push(column.to_string());
                }
                index.unique |= unique;
            }
            None => self.indexes.push(IndexDef {
                name: qualified,
                columns: vec![column.to_string()],
                unique,
            }),
        }
    }

    /// Whether `column` needs an indexable (bounded) type.
    #[must_use]
    pub fn is_indexed(&self, column: &str) -> bool {
        self.column(column)
            .is_some_and(|c| c.unique || c.primary_key)
            || self
                .indexes
                .iter()
                .any(|i| i.columns.iter().any(|c| c == column))
    }

    /// The migration-history marker table.
    #[must_use]
    pub fn migrations() -> Self {
        let mut table = Self::new(MIGRATIONS_TABLE);
        table
            .columns
            .push(ColumnDef::new("Revision", ValueKind::Integer).primary_key(true));
        let mut hash = ColumnDef::new("SchemaHash", ValueKind::Text).nullable(false);
        hash.length = Some(64);
        hash.unique = true;
        table.columns.push(hash);
        table
            .columns
            .push(ColumnDef::new("Tables", ValueKind::Integer).nullable(false));
        table
    }
}

/// SHA-256 over a stable description of `tables`, as lowercase hex.
///
/// Order of `tables` does not matter.
#[must_use]
pub fn schema_hash<'a>(tables: impl IntoIterator<Item = &'a TableDef>) -> String {
    let mut sorted: Vec<&TableDef> = tables.into_iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut hasher = Sha256::new();
    for table in sorted {
        hasher.update(table.name.as_bytes());
        hasher.update([0]);
        for c in &table.columns {
            let line = format!(
                "{}:{:?}:{}:{:?}:{:?}:{}:{}:{}",
                c.name, c.kind, c.nullable, c.length, c.custom_type, c.unique, c.primary_key, c.identity
            );
            hasher.update(line.as_bytes());
            hasher.update([0]);
        }
        for i in &table.indexes {
            let line = format!("{}:{}:{}", i.name, i.columns.join(","), i.unique);
            hasher.update(line.as_bytes());
            hasher.update([0]);
        }
    }

    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

//! Backend-neutral description of one member mapping.

/// Options attached to a mapping directive.
///
/// Every option is a request. A backend that cannot express an option for
/// a given directive ignores it; each builder lists what it ignores at the
/// directive itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingOptions {
    /// Storage name override.
    pub column: Option<String>,
    /// Bounded size. Unset text columns are unbounded.
    pub length: Option<u32>,
    /// Uniqueness (unset = backend default).
    pub unique: Option<bool>,
    /// Nullability (unset = derived from the member type).
    pub nullable: Option<bool>,
    /// Named index group.
    pub index: Option<String>,
    /// Backend-native type override.
    pub custom_sql_type: Option<String>,
    /// Cascade behaviour, for relationship directives only.
    pub cascade_delete: Option<bool>,
    /// Store the member through the serialized codec.
    pub with_serialization: bool,
}

impl MappingOptions {
    /// No options set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the storage name.
    #[must_use]
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.column = Some(name.into());
        self
    }

    /// Sets the bounded size.
    #[must_use]
    pub const fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    /// Sets uniqueness.
    #[must_use]
    pub const fn unique(mut self, unique: bool) -> Self {
        self.unique = Some(unique);
        self
    }

    /// Sets nullability.
    #[must_use]
    pub const fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }

    /// Adds the member to a named index.
    #[must_use]
    pub fn index(mut self, name: impl Into<String>) -> Self {
        self.index = Some(name.into());
        self
    }

    /// Overrides the native column type.
    #[must_use]
    pub fn custom_sql_type(mut self, sql_type: impl Into<String>) -> Self {
        self.custom_sql_type = Some(sql_type.into());
        self
    }

    /// Sets cascade-delete behaviour.
    #[must_use]
    pub const fn cascade_delete(mut self, cascade: bool) -> Self {
        self.cascade_delete = Some(cascade);
        self
    }

    /// Stores the member serialized.
    #[must_use]
    pub const fn with_serialization(mut self, serialized: bool) -> Self {
        self.with_serialization = serialized;
        self
    }
}

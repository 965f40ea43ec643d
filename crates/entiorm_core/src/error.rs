//! Error types for entiorm core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// How the calling layer is expected to react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad backend selection or connection settings. Fatal at startup.
    Configuration,
    /// A mapping could not be built. Fatal when the mapping is first used.
    Mapping,
    /// A read or write failed. The unit of work must be discarded.
    Mutation,
    /// The API was used in a state that does not allow the call.
    Usage,
}

/// Errors that can occur in entiorm core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Journal error from the document store.
    #[error("storage error: {0}")]
    Storage(#[from] entiorm_storage::StorageError),

    /// Value codec error.
    #[error("codec error: {0}")]
    Codec(#[from] entiorm_codec::CodecError),

    /// The configured backend name is not one of the supported backends.
    #[error("unknown backend: {name}")]
    UnknownBackend {
        /// Name as configured.
        name: String,
    },

    /// Configuration is present but unusable.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        /// Description of the problem.
        message: String,
    },

    /// No SQL driver is registered for a relational database.
    #[error("no SQL driver registered for {database}")]
    DriverNotRegistered {
        /// Database name.
        database: String,
    },

    /// An entity without a primary key was used where one is required.
    #[error("entity {entity} has no primary key")]
    MissingPrimaryKey {
        /// Entity name.
        entity: String,
    },

    /// A mapping directive could not be compiled.
    #[error("invalid mapping for {entity}: {message}")]
    InvalidMapping {
        /// Entity name.
        entity: String,
        /// Description of the problem.
        message: String,
    },

    /// A stored row or document could not be converted back to an entity.
    #[error("data mismatch in {table}: {message}")]
    DataMismatch {
        /// Table or collection name.
        table: String,
        /// Description of the problem.
        message: String,
    },

    /// A write violated a key, unique or not-null constraint.
    #[error("constraint violation on {table}: {message}")]
    ConstraintViolation {
        /// Table or collection name.
        table: String,
        /// Description of the violation.
        message: String,
    },

    /// An update matched no row for an entity believed to exist.
    #[error("concurrency conflict on {table}: {message}")]
    ConcurrencyConflict {
        /// Table name.
        table: String,
        /// Description of the conflict.
        message: String,
    },

    /// The SQL driver reported an error.
    #[error("sql error: {message}")]
    Sql {
        /// Driver message.
        message: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// A previous operation on this context failed.
    #[error("database context is faulted and must be disposed")]
    ContextFaulted,

    /// The context was already disposed.
    #[error("database context is disposed")]
    ContextDisposed,
}

impl CoreError {
    /// Creates an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Creates an invalid mapping error.
    pub fn invalid_mapping(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidMapping {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Creates a data mismatch error.
    pub fn data_mismatch(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DataMismatch {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Creates a constraint violation error.
    pub fn constraint_violation(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Creates a concurrency conflict error.
    pub fn concurrency_conflict(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConcurrencyConflict {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Creates a SQL driver error.
    pub fn sql(message: impl Into<String>) -> Self {
        Self::Sql {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Classifies this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownBackend { .. }
            | Self::InvalidConfiguration { .. }
            | Self::DriverNotRegistered { .. } => ErrorKind::Configuration,
            Self::MissingPrimaryKey { .. } | Self::InvalidMapping { .. } => ErrorKind::Mapping,
            Self::InvalidOperation { .. } | Self::ContextFaulted | Self::ContextDisposed => {
                ErrorKind::Usage
            }
            Self::Storage(_)
            | Self::Codec(_)
            | Self::DataMismatch { .. }
            | Self::ConstraintViolation { .. }
            | Self::ConcurrencyConflict { .. }
            | Self::Sql { .. } => ErrorKind::Mutation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            CoreError::UnknownBackend {
                name: "Oracle".into()
            }
            .kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            CoreError::invalid_mapping("Order", "bad selector").kind(),
            ErrorKind::Mapping
        );
        assert_eq!(
            CoreError::constraint_violation("Order", "duplicate key").kind(),
            ErrorKind::Mutation
        );
        assert_eq!(CoreError::ContextFaulted.kind(), ErrorKind::Usage);
    }

    #[test]
    fn messages_name_the_subject() {
        let err = CoreError::MissingPrimaryKey {
            entity: "AuditEntry".into(),
        };
        assert_eq!(err.to_string(), "entity AuditEntry has no primary key");
    }
}

//! Save and delete callbacks.
//!
//! Callbacks are resolved fresh for every mutation and run in
//! registration order. An error from any callback aborts the mutation and
//! faults the context.

use crate::context::DatabaseContext;
use crate::entity::Entity;
use crate::error::CoreResult;

/// Hooks around [`DatabaseContext::save`].
pub trait SaveCallback<T: Entity>: Send + Sync {
    /// Runs before the entity is persisted; changes made here are saved.
    ///
    /// # Errors
    ///
    /// An error aborts the save.
    fn before_save(&self, context: &mut DatabaseContext, entity: &mut T) -> CoreResult<()> {
        let _ = (context, entity);
        Ok(())
    }

    /// Runs after the entity was persisted.
    ///
    /// # Errors
    ///
    /// An error faults the context; the write itself is not undone until
    /// the context is disposed without commit.
    fn after_save(&self, context: &mut DatabaseContext, entity: &T) -> CoreResult<()> {
        let _ = (context, entity);
        Ok(())
    }
}

/// Hooks around [`DatabaseContext::delete`].
pub trait DeleteCallback<T: Entity>: Send + Sync {
    /// Runs before the entity is removed.
    ///
    /// # Errors
    ///
    /// An error aborts the delete.
    fn before_delete(&self, context: &mut DatabaseContext, entity: &T) -> CoreResult<()> {
        let _ = (context, entity);
        Ok(())
    }

    /// Runs after the entity was removed.
    ///
    /// # Errors
    ///
    /// An error faults the context.
    fn after_delete(&self, context: &mut DatabaseContext, entity: &T) -> CoreResult<()> {
        let _ = (context, entity);
        Ok(())
    }
}

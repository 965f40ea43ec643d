//! Lazy, re-enumerable queries.

use std::fmt;

use super::DatabaseContext;
use crate::entity::Entity;
use crate::error::CoreResult;

type Predicate<'a, T> = Box<dyn Fn(&T) -> bool + 'a>;

/// A query over entity type `T`, built from chained filters.
///
/// Nothing is read when the query is built. Each terminal method
/// ([`to_vec`](Self::to_vec), [`first`](Self::first),
/// [`count`](Self::count), [`any`](Self::any), [`select`](Self::select))
/// reads the backend again, so one query can be enumerated repeatedly and
/// sees the writes made in between.
pub struct Query<'a, T> {
    context: &'a mut DatabaseContext,
    filters: Vec<Predicate<'a, T>>,
}

impl<'a, T: Entity> Query<'a, T> {
    pub(super) fn new(context: &'a mut DatabaseContext) -> Self {
        Self {
            context,
            filters: Vec::new(),
        }
    }

    /// Narrows the query to entities accepted by `predicate`.
    #[must_use]
    pub fn filter(mut self, predicate: impl Fn(&T) -> bool + 'a) -> Self {
        self.filters.push(Box::new(predicate));
        self
    }

    fn run(&mut self, limit: Option<usize>) -> CoreResult<Vec<T>> {
        let filters = &self.filters;
        self.context
            .fetch(&|entity: &T| filters.iter().all(|f| f(entity)), limit)
    }

    /// Every matching entity.
    ///
    /// # Errors
    ///
    /// Returns the mapping or backend error; the context is then faulted.
    pub fn to_vec(&mut self) -> CoreResult<Vec<T>> {
        self.run(None)
    }

    /// The first matching entity.
    ///
    /// # Errors
    ///
    /// Returns the mapping or backend error; the context is then faulted.
    pub fn first(&mut self) -> CoreResult<Option<T>> {
        Ok(self.run(Some(1))?.pop())
    }

    /// Number of matching entities.
    ///
    /// # Errors
    ///
    /// Returns the mapping or backend error; the context is then faulted.
    pub fn count(&mut self) -> CoreResult<usize> {
        Ok(self.run(None)?.len())
    }

    /// Whether any entity matches.
    ///
    /// # Errors
    ///
    /// Returns the mapping or backend error; the context is then faulted.
    pub fn any(&mut self) -> CoreResult<bool> {
        Ok(!self.run(Some(1))?.is_empty())
    }

    /// Projects every matching entity through `projection`.
    ///
    /// # Errors
    ///
    /// Returns the mapping or backend error; the context is then faulted.
    pub fn select<R>(&mut self, projection: impl Fn(&T) -> R) -> CoreResult<Vec<R>> {
        Ok(self.run(None)?.iter().map(projection).collect())
    }
}

impl<T> fmt::Debug for Query<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("filters", &self.filters.len())
            .finish_non_exhaustive()
    }
}

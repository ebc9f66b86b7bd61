//! The `HasRelations` capability and the per-record association object.

use std::sync::Arc;

use prodrel_core::Record;

use crate::error::RelationResult;
use crate::filter::{FilterAttributes, RelationFilter};
use crate::model::RelationType;
use crate::resolver::RelationResolver;
use crate::store::RelationStore;

/// Records that own relations to other records of the same type.
pub trait HasRelations: Record + FilterAttributes + Clone + Sized {
    /// Instance-level filter, layered over the resolver's class-level filter.
    fn relation_filter(&self) -> Option<Arc<dyn RelationFilter>> {
        None
    }

    /// Association object exposing this record's relation accessors.
    fn relations<'a, S>(&'a self, resolver: &'a RelationResolver<S, Self>) -> RecordRelations<'a, S, Self>
    where
        S: RelationStore<Self>,
    {
        RecordRelations::new(self, resolver)
    }
}

/// Relation accessors bound to one record.
///
/// ```ignore
/// let upsells = product.relations(&resolver).get("upsells")?;
/// ```
pub struct RecordRelations<'a, S, R> {
    record: &'a R,
    resolver: &'a RelationResolver<S, R>,
    filter: Option<Arc<dyn RelationFilter>>,
}

impl<'a, S, R> RecordRelations<'a, S, R>
where
    S: RelationStore<R>,
    R: HasRelations,
{
    pub fn new(record: &'a R, resolver: &'a RelationResolver<S, R>) -> Self {
        Self {
            record,
            resolver,
            filter: record.relation_filter(),
        }
    }

    /// Replace the instance-level filter for calls made through this object.
    pub fn with_filter(mut self, filter: Arc<dyn RelationFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn record(&self) -> &R {
        self.record
    }

    /// Related records for the accessor `name`; `None` if it is not one.
    pub fn get(&self, name: &str) -> RelationResult<Option<Vec<R>>> {
        self.resolver
            .get_related_filtered(self.record, name, self.filter.as_deref())
    }

    /// Related records for `relation_type`.
    pub fn of_type(&self, relation_type: &RelationType) -> RelationResult<Vec<R>> {
        self.resolver.resolve_with(
            self.record,
            relation_type,
            self.filter.as_deref(),
            chrono::Utc::now(),
        )
    }

    /// Whether `name` is a relation accessor for this record's type.
    pub fn has(&self, name: &str) -> RelationResult<bool> {
        self.resolver.has_related_products(name)
    }

    /// Relation types available on this record's type, sorted by name.
    pub fn types(&self) -> RelationResult<Vec<RelationType>> {
        self.resolver.list_applicable_types()
    }
}

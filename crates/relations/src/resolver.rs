//! Related-records resolution.
//!
//! `get_related(owner, "upsells")` finds the relation type answering to the
//! accessor, loads the owner's edges of that type in position order, loads the
//! visible targets with the filter condition pushed into the store, and
//! returns the targets in edge order.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use prodrel_core::{Record, RecordId};

use crate::accessor::HasRelations;
use crate::error::RelationResult;
use crate::filter::{Condition, FilterLayers, RelationFilter};
use crate::model::{Relation, RelationType};
use crate::registry::RelationTypeRegistry;
use crate::store::RelationStore;

/// Resolves relation accessors for records of type `R` against store `S`.
pub struct RelationResolver<S, R> {
    store: S,
    filters: FilterLayers,
    _record: PhantomData<fn() -> R>,
}

impl<S, R> RelationResolver<S, R>
where
    S: RelationStore<R>,
    R: HasRelations,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            filters: FilterLayers::new(),
            _record: PhantomData,
        }
    }

    /// Install the class-level filter for `R` (layered over the default rule).
    pub fn with_class_filter(mut self, filter: Arc<dyn RelationFilter>) -> Self {
        self.filters = FilterLayers::with_class_filter(filter);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn filters(&self) -> &FilterLayers {
        &self.filters
    }

    /// Relation types applicable to `R`, sorted by name.
    pub fn list_applicable_types(&self) -> RelationResult<Vec<RelationType>> {
        Ok(self.registry()?.into_types())
    }

    /// Accessor registry for `R`, freshly loaded from the store.
    pub fn registry(&self) -> RelationResult<RelationTypeRegistry> {
        Ok(RelationTypeRegistry::load::<R, S>(&self.store, R::RECORD_TYPE)?)
    }

    /// Relation type answering to the accessor `name`.
    pub fn find_relation_type(&self, name: &str) -> RelationResult<Option<RelationType>> {
        Ok(self.registry()?.lookup(name).cloned())
    }

    /// Whether `name` is a relation accessor for `R`. Performs no fetch of
    /// related records.
    pub fn has_related_products(&self, name: &str) -> RelationResult<bool> {
        Ok(self.find_relation_type(name)?.is_some())
    }

    /// Records related to `owner` through the accessor `name`.
    ///
    /// `Ok(None)` means `name` is not a relation accessor for `R`.
    pub fn get_related(&self, owner: &R, name: &str) -> RelationResult<Option<Vec<R>>> {
        let instance = owner.relation_filter();
        self.get_related_filtered(owner, name, instance.as_deref())
    }

    /// Like [`get_related`](Self::get_related) with an explicit instance filter.
    pub fn get_related_filtered(
        &self,
        owner: &R,
        name: &str,
        instance: Option<&dyn RelationFilter>,
    ) -> RelationResult<Option<Vec<R>>> {
        let Some(relation_type) = self.find_relation_type(name)? else {
            debug!(accessor = name, record_type = R::RECORD_TYPE, "not a relation accessor");
            return Ok(None);
        };
        self.resolve_with(owner, &relation_type, instance, Utc::now())
            .map(Some)
    }

    /// Visible records related to `owner` through `relation_type`, in position order.
    pub fn resolve(&self, owner: &R, relation_type: &RelationType) -> RelationResult<Vec<R>> {
        self.resolve_at(owner, relation_type, Utc::now())
    }

    /// [`resolve`](Self::resolve) with visibility evaluated at `now`.
    pub fn resolve_at(
        &self,
        owner: &R,
        relation_type: &RelationType,
        now: DateTime<Utc>,
    ) -> RelationResult<Vec<R>> {
        let instance = owner.relation_filter();
        self.resolve_with(owner, relation_type, instance.as_deref(), now)
    }

    #[instrument(
        skip(self, owner, relation_type, instance),
        fields(owner = %owner.record_ref(), relation_type = %relation_type.name),
        err
    )]
    pub fn resolve_with(
        &self,
        owner: &R,
        relation_type: &RelationType,
        instance: Option<&dyn RelationFilter>,
        now: DateTime<Utc>,
    ) -> RelationResult<Vec<R>> {
        let mut edges = self.store.relations_for(&owner.record_ref(), relation_type.id)?;
        edges.sort_by_key(|e| e.position);

        let targets = target_ids::<R>(&edges);
        if targets.is_empty() {
            return Ok(Vec::new());
        }

        let mut unique = targets.clone();
        unique.sort();
        unique.dedup();

        let condition = self.filters.effective(instance, now);
        let visible = self.store.load_records(&unique, &condition)?;
        let related = in_edge_order(&targets, visible);

        debug!(
            edges = edges.len(),
            returned = related.len(),
            "resolved related records"
        );
        Ok(related)
    }

    /// Effective filter condition for `owner` at `now`.
    pub fn condition_for(&self, owner: &R, now: DateTime<Utc>) -> Condition {
        let instance = owner.relation_filter();
        self.filters.effective(instance.as_deref(), now)
    }
}

/// Target ids of `edges` that point at records of type `R`, in edge order.
fn target_ids<R: Record>(edges: &[Relation]) -> Vec<RecordId> {
    edges
        .iter()
        .filter(|e| e.related_to.is_a::<R>())
        .map(|e| e.related_to.id)
        .collect()
}

/// Arrange `records` in the order of `targets`, dropping targets that were
/// filtered out. A target listed twice is returned twice.
fn in_edge_order<R: Record + Clone>(targets: &[RecordId], records: Vec<R>) -> Vec<R> {
    let by_id: HashMap<RecordId, R> = records.into_iter().map(|r| (r.record_id(), r)).collect();
    targets
        .iter()
        .filter_map(|id| by_id.get(id).cloned())
        .collect()
}

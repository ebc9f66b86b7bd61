//! Storage boundary for relation types, relation edges and the records they join.
//!
//! Implementations:
//! - must return `relations_for` rows ascending by `position`, ties in
//!   creation order
//! - must apply the `Condition` passed to `load_records` inside the load
//!   (no over-fetching and filtering by the caller)
//! - must run `destroy_cascading` atomically: the record and every edge that
//!   references it in either direction go together, or nothing changes
//! - must report unprovisioned relation storage through `schema_state`
//!   instead of failing reads

use std::sync::Arc;

use thiserror::Error;

use prodrel_core::{DomainError, RecordId, RecordRef, RelationId, RelationTypeId};

use crate::filter::Condition;
use crate::model::{NewRelation, NewRelationType, Relation, RelationType};

/// Whether the relation tables exist yet.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SchemaState {
    Ready,
    /// Relation storage has not been provisioned (e.g. mid-migration).
    Unprovisioned,
}

/// Outcome of a cascading destroy.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    /// Edges removed where the record was the owner.
    pub outgoing_removed: usize,
    /// Edges removed where the record was the target.
    pub incoming_removed: usize,
    /// Whether the record itself existed and was deleted.
    pub record_deleted: bool,
}

impl CascadeReport {
    pub fn edges_removed(&self) -> usize {
        self.outgoing_removed + self.incoming_removed
    }
}

/// Relation store operation error.
///
/// These are hard failures and propagate to callers unchanged. Soft
/// conditions (unknown accessor, unprovisioned storage) are not errors.
#[derive(Debug, Error)]
pub enum RelationStoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("transaction failed: {0}")]
    Transaction(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    /// The backend cannot express a filter condition (e.g. unknown column).
    #[error("unsupported filter condition: {0}")]
    UnsupportedCondition(String),

    #[error("runtime unavailable: {0}")]
    Runtime(String),

    #[error("lock poisoned")]
    LockPoisoned,
}

impl From<DomainError> for RelationStoreError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound(msg) => RelationStoreError::NotFound(msg),
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                RelationStoreError::Validation(msg)
            }
        }
    }
}

/// Persistence for relations owned by records of type `R`.
pub trait RelationStore<R>: Send + Sync {
    /// Whether relation storage is provisioned.
    fn schema_state(&self) -> Result<SchemaState, RelationStoreError>;

    /// Relation types whose `applies_to` equals `applies_to`, in any order.
    fn relation_types(&self, applies_to: &str) -> Result<Vec<RelationType>, RelationStoreError>;

    /// Edges owned by `owner` tagged with `relation_type_id`, ascending by position.
    fn relations_for(
        &self,
        owner: &RecordRef,
        relation_type_id: RelationTypeId,
    ) -> Result<Vec<Relation>, RelationStoreError>;

    /// Every edge where `record` is the owner or the target.
    fn relations_touching(&self, record: &RecordRef) -> Result<Vec<Relation>, RelationStoreError>;

    /// Records with the given ids that satisfy `condition`, in any order.
    fn load_records(
        &self,
        ids: &[RecordId],
        condition: &Condition,
    ) -> Result<Vec<R>, RelationStoreError>;

    /// Atomically delete `record` and every edge referencing it.
    fn destroy_cascading(&self, record: &RecordRef) -> Result<CascadeReport, RelationStoreError>;

    fn create_relation_type(
        &self,
        new: NewRelationType,
    ) -> Result<RelationType, RelationStoreError>;

    fn create_relation(&self, new: NewRelation) -> Result<Relation, RelationStoreError>;

    /// Assign positions `0..n` to `ordered`, atomically.
    fn reposition(&self, ordered: &[RelationId]) -> Result<(), RelationStoreError>;
}

impl<R, S> RelationStore<R> for Arc<S>
where
    S: RelationStore<R> + ?Sized,
{
    fn schema_state(&self) -> Result<SchemaState, RelationStoreError> {
        (**self).schema_state()
    }

    fn relation_types(&self, applies_to: &str) -> Result<Vec<RelationType>, RelationStoreError> {
        (**self).relation_types(applies_to)
    }

    fn relations_for(
        &self,
        owner: &RecordRef,
        relation_type_id: RelationTypeId,
    ) -> Result<Vec<Relation>, RelationStoreError> {
        (**self).relations_for(owner, relation_type_id)
    }

    fn relations_touching(&self, record: &RecordRef) -> Result<Vec<Relation>, RelationStoreError> {
        (**self).relations_touching(record)
    }

    fn load_records(
        &self,
        ids: &[RecordId],
        condition: &Condition,
    ) -> Result<Vec<R>, RelationStoreError> {
        (**self).load_records(ids, condition)
    }

    fn destroy_cascading(&self, record: &RecordRef) -> Result<CascadeReport, RelationStoreError> {
        (**self).destroy_cascading(record)
    }

    fn create_relation_type(
        &self,
        new: NewRelationType,
    ) -> Result<RelationType, RelationStoreError> {
        (**self).create_relation_type(new)
    }

    fn create_relation(&self, new: NewRelation) -> Result<Relation, RelationStoreError> {
        (**self).create_relation(new)
    }

    fn reposition(&self, ordered: &[RelationId]) -> Result<(), RelationStoreError> {
        (**self).reposition(ordered)
    }
}

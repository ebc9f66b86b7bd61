//! Removal of relation edges together with the record they reference.

use std::marker::PhantomData;

use tracing::{info, instrument};

use prodrel_core::{Record, RecordRef};

use crate::error::RelationResult;
use crate::store::{CascadeReport, RelationStore};

/// Destroys records of type `R` along with every relation edge that
/// references them, as owner or as target, in one transaction.
pub struct CascadeDestroyer<S, R> {
    store: S,
    _record: PhantomData<fn() -> R>,
}

impl<S, R> CascadeDestroyer<S, R>
where
    S: RelationStore<R>,
    R: Record,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            _record: PhantomData,
        }
    }

    pub fn destroy_record(&self, record: &R) -> RelationResult<CascadeReport> {
        self.destroy(&record.record_ref())
    }

    /// Delete the referenced record and its edges. If any step fails nothing
    /// is deleted.
    #[instrument(skip(self, record), fields(record = %record), err)]
    pub fn destroy(&self, record: &RecordRef) -> RelationResult<CascadeReport> {
        let report = self.store.destroy_cascading(record)?;
        info!(
            outgoing = report.outgoing_removed,
            incoming = report.incoming_removed,
            record_deleted = report.record_deleted,
            "destroyed record with its relations"
        );
        Ok(report)
    }
}

//! Persisted records and polymorphic references to them.

use serde::{Deserialize, Serialize};

use crate::id::RecordId;

/// Polymorphic reference to a persisted record: the record type name plus its id.
///
/// Relation edges point at records through these references on both ends, so a
/// single edge table can join any two record types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    pub record_type: String,
    pub id: RecordId,
}

impl RecordRef {
    pub fn new(record_type: impl Into<String>, id: RecordId) -> Self {
        Self {
            record_type: record_type.into(),
            id,
        }
    }

    /// Whether this reference points at a record of type `R`.
    pub fn is_a<R: Record>(&self) -> bool {
        self.record_type == R::RECORD_TYPE
    }
}

impl core::fmt::Display for RecordRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}#{}", self.record_type, self.id)
    }
}

/// A persisted record with identity.
pub trait Record {
    /// Stable type name stored in polymorphic references (e.g. `"Product"`).
    const RECORD_TYPE: &'static str;

    /// Returns the record identifier.
    fn record_id(&self) -> RecordId;

    /// Polymorphic reference to this record.
    fn record_ref(&self) -> RecordRef {
        RecordRef::new(Self::RECORD_TYPE, self.record_id())
    }
}

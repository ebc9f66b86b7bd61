//! Relation types and relation edges.

use serde::{Deserialize, Serialize};

use prodrel_core::{DomainError, RecordRef, RelationId, RelationTypeId};

/// A named category of relation ("Related Products", "Upsells"), scoped to the
/// record type that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationType {
    pub id: RelationTypeId,
    /// Human label. Its normalized form is the accessor key.
    pub name: String,
    /// Record type name of the owners (`Record::RECORD_TYPE`).
    pub applies_to: String,
    pub description: Option<String>,
}

impl RelationType {
    /// Accessor key this type answers to (see [`crate::naming::accessor_key`]).
    pub fn accessor_key(&self) -> String {
        crate::naming::accessor_key(&self.name)
    }
}

/// A directed, positioned edge from an owner record to a target record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub id: RelationId,
    pub relatable: RecordRef,
    pub related_to: RecordRef,
    pub relation_type_id: RelationTypeId,
    /// Display order among siblings sharing owner and type. Not unique.
    pub position: i32,
    /// Discount applied when the target is bought through this relation,
    /// in the smallest currency unit.
    pub discount_amount: Option<u64>,
}

/// Input for creating a relation type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRelationType {
    pub name: String,
    pub applies_to: String,
    pub description: Option<String>,
}

impl NewRelationType {
    pub fn new(name: impl Into<String>, applies_to: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            applies_to: applies_to.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("relation type name cannot be empty"));
        }
        if self.applies_to.trim().is_empty() {
            return Err(DomainError::validation("relation type applies_to cannot be empty"));
        }
        Ok(())
    }

    pub fn into_relation_type(self, id: RelationTypeId) -> RelationType {
        RelationType {
            id,
            name: self.name,
            applies_to: self.applies_to,
            description: self.description,
        }
    }
}

/// Input for creating a relation edge.
///
/// When `position` is `None` the store appends the edge after the current last
/// sibling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRelation {
    pub relatable: RecordRef,
    pub related_to: RecordRef,
    pub relation_type_id: RelationTypeId,
    pub position: Option<i32>,
    pub discount_amount: Option<u64>,
}

impl NewRelation {
    pub fn new(relatable: RecordRef, related_to: RecordRef, relation_type_id: RelationTypeId) -> Self {
        Self {
            relatable,
            related_to,
            relation_type_id,
            position: None,
            discount_amount: None,
        }
    }

    pub fn at_position(mut self, position: i32) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_discount(mut self, amount: u64) -> Self {
        self.discount_amount = Some(amount);
        self
    }

    /// Check the edge against the relation type it is tagged with.
    pub fn validate_against(&self, relation_type: &RelationType) -> Result<(), DomainError> {
        if self.relation_type_id != relation_type.id {
            return Err(DomainError::validation("relation_type_id mismatch"));
        }
        if self.relatable.record_type != relation_type.applies_to {
            return Err(DomainError::validation(format!(
                "relation type '{}' applies to {}, not {}",
                relation_type.name, relation_type.applies_to, self.relatable.record_type
            )));
        }
        Ok(())
    }

    pub fn into_relation(self, id: RelationId, position: i32) -> Relation {
        Relation {
            id,
            relatable: self.relatable,
            related_to: self.related_to,
            relation_type_id: self.relation_type_id,
            position,
            discount_amount: self.discount_amount,
        }
    }
}

/// Position for an edge appended after `siblings` (`max + 1`, or `0`).
pub fn next_position<'a>(siblings: impl IntoIterator<Item = &'a Relation>) -> i32 {
    siblings
        .into_iter()
        .map(|r| r.position)
        .max()
        .map(|p| p.saturating_add(1))
        .unwrap_or(0)
}

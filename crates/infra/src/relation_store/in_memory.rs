use std::collections::HashMap;
use std::sync::RwLock;

use prodrel_core::{Record, RecordId, RecordRef, RelationId, RelationTypeId};
use prodrel_relations::model::next_position;
use prodrel_relations::{
    CascadeReport, Condition, FilterAttributes, NewRelation, NewRelationType, Relation,
    RelationStore, RelationStoreError, RelationType, SchemaState,
};

#[derive(Debug)]
struct State<R> {
    schema: SchemaState,
    relation_types: Vec<RelationType>,
    /// Creation order; `relations_for` relies on it for position ties.
    relations: Vec<Relation>,
    records: HashMap<RecordId, R>,
    #[cfg(test)]
    fail_incoming_delete: bool,
}

/// In-memory relation store.
///
/// Intended for tests/dev. All state sits behind one lock, so each write
/// (including a cascade) is a single critical section.
#[derive(Debug)]
pub struct InMemoryRelationStore<R> {
    inner: RwLock<State<R>>,
}

impl<R> InMemoryRelationStore<R> {
    pub fn new() -> Self {
        Self::with_schema(SchemaState::Ready)
    }

    /// A store whose relation tables "do not exist yet".
    pub fn unprovisioned() -> Self {
        Self::with_schema(SchemaState::Unprovisioned)
    }

    fn with_schema(schema: SchemaState) -> Self {
        Self {
            inner: RwLock::new(State {
                schema,
                relation_types: Vec::new(),
                relations: Vec::new(),
                records: HashMap::new(),
                #[cfg(test)]
                fail_incoming_delete: false,
            }),
        }
    }

    pub fn set_schema_state(&self, schema: SchemaState) -> Result<(), RelationStoreError> {
        self.write()?.schema = schema;
        Ok(())
    }

    pub fn relation_count(&self) -> Result<usize, RelationStoreError> {
        Ok(self.read()?.relations.len())
    }

    pub fn record_count(&self) -> Result<usize, RelationStoreError> {
        Ok(self.read()?.records.len())
    }

    /// Make the next cascade fail after owner-side edges were removed, to
    /// exercise rollback.
    #[cfg(test)]
    pub(crate) fn fail_next_incoming_delete(&self) {
        if let Ok(mut state) = self.inner.write() {
            state.fail_incoming_delete = true;
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State<R>>, RelationStoreError> {
        self.inner.read().map_err(|_| RelationStoreError::LockPoisoned)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State<R>>, RelationStoreError> {
        self.inner.write().map_err(|_| RelationStoreError::LockPoisoned)
    }
}

impl<R> Default for InMemoryRelationStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record + Clone> InMemoryRelationStore<R> {
    /// Insert or replace a record.
    pub fn upsert_record(&self, record: R) -> Result<(), RelationStoreError> {
        self.write()?.records.insert(record.record_id(), record);
        Ok(())
    }

    pub fn record(&self, id: RecordId) -> Result<Option<R>, RelationStoreError> {
        Ok(self.read()?.records.get(&id).cloned())
    }
}

impl<R> State<R> {
    #[cfg(test)]
    fn take_injected_failure(&mut self) -> bool {
        std::mem::take(&mut self.fail_incoming_delete)
    }

    #[cfg(not(test))]
    fn take_injected_failure(&mut self) -> bool {
        false
    }

    fn ensure_provisioned(&self) -> Result<(), RelationStoreError> {
        match self.schema {
            SchemaState::Ready => Ok(()),
            SchemaState::Unprovisioned => Err(RelationStoreError::Database(
                "relation storage is not provisioned".to_string(),
            )),
        }
    }
}

impl<R> RelationStore<R> for InMemoryRelationStore<R>
where
    R: Record + FilterAttributes + Clone + Send + Sync,
{
    fn schema_state(&self) -> Result<SchemaState, RelationStoreError> {
        Ok(self.read()?.schema)
    }

    fn relation_types(&self, applies_to: &str) -> Result<Vec<RelationType>, RelationStoreError> {
        let state = self.read()?;
        state.ensure_provisioned()?;
        Ok(state
            .relation_types
            .iter()
            .filter(|t| t.applies_to == applies_to)
            .cloned()
            .collect())
    }

    fn relations_for(
        &self,
        owner: &RecordRef,
        relation_type_id: RelationTypeId,
    ) -> Result<Vec<Relation>, RelationStoreError> {
        let state = self.read()?;
        state.ensure_provisioned()?;
        let mut edges: Vec<Relation> = state
            .relations
            .iter()
            .filter(|r| &r.relatable == owner && r.relation_type_id == relation_type_id)
            .cloned()
            .collect();
        // Stable: equal positions stay in creation order.
        edges.sort_by_key(|r| r.position);
        Ok(edges)
    }

    fn relations_touching(&self, record: &RecordRef) -> Result<Vec<Relation>, RelationStoreError> {
        let state = self.read()?;
        state.ensure_provisioned()?;
        Ok(state
            .relations
            .iter()
            .filter(|r| &r.relatable == record || &r.related_to == record)
            .cloned()
            .collect())
    }

    fn load_records(
        &self,
        ids: &[RecordId],
        condition: &Condition,
    ) -> Result<Vec<R>, RelationStoreError> {
        let state = self.read()?;
        Ok(ids
            .iter()
            .filter_map(|id| state.records.get(id))
            .filter(|r| condition.matches(*r))
            .cloned()
            .collect())
    }

    fn destroy_cascading(&self, record: &RecordRef) -> Result<CascadeReport, RelationStoreError> {
        let mut state = self.write()?;
        state.ensure_provisioned()?;

        // Stage the changes; state is only touched once every step succeeded.
        let mut staged = state.relations.clone();
        let before = staged.len();
        staged.retain(|r| &r.relatable != record);
        let outgoing_removed = before - staged.len();

        if state.take_injected_failure() {
            return Err(RelationStoreError::Transaction(
                "injected failure deleting incoming relations".to_string(),
            ));
        }

        let before = staged.len();
        staged.retain(|r| &r.related_to != record);
        let incoming_removed = before - staged.len();

        state.relations = staged;
        let record_deleted = record.is_a::<R>() && state.records.remove(&record.id).is_some();

        Ok(CascadeReport {
            outgoing_removed,
            incoming_removed,
            record_deleted,
        })
    }

    fn create_relation_type(
        &self,
        new: NewRelationType,
    ) -> Result<RelationType, RelationStoreError> {
        new.validate()?;
        let mut state = self.write()?;
        state.ensure_provisioned()?;
        let relation_type = new.into_relation_type(RelationTypeId::new());
        state.relation_types.push(relation_type.clone());
        Ok(relation_type)
    }

    fn create_relation(&self, new: NewRelation) -> Result<Relation, RelationStoreError> {
        let mut state = self.write()?;
        state.ensure_provisioned()?;

        let relation_type = state
            .relation_types
            .iter()
            .find(|t| t.id == new.relation_type_id)
            .ok_or_else(|| {
                RelationStoreError::NotFound(format!("relation type {}", new.relation_type_id))
            })?;
        new.validate_against(relation_type)?;

        let position = match new.position {
            Some(p) => p,
            None => next_position(state.relations.iter().filter(|r| {
                r.relatable == new.relatable && r.relation_type_id == new.relation_type_id
            })),
        };

        let relation = new.into_relation(RelationId::new(), position);
        state.relations.push(relation.clone());
        Ok(relation)
    }

    fn reposition(&self, ordered: &[RelationId]) -> Result<(), RelationStoreError> {
        let mut state = self.write()?;
        state.ensure_provisioned()?;

        if i32::try_from(ordered.len()).is_err() {
            return Err(RelationStoreError::Validation(
                "too many relations to reposition".to_string(),
            ));
        }

        let mut indices = Vec::with_capacity(ordered.len());
        for id in ordered {
            let idx = state
                .relations
                .iter()
                .position(|r| r.id == *id)
                .ok_or_else(|| RelationStoreError::NotFound(format!("relation {id}")))?;
            indices.push(idx);
        }

        for (position, idx) in (0_i32..).zip(indices) {
            state.relations[idx].position = position;
        }
        Ok(())
    }
}

//! Accessor registry: relation types applicable to one record type, keyed by
//! their normalized accessor name.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::model::RelationType;
use crate::naming::normalize_accessor;
use crate::store::{RelationStore, RelationStoreError, SchemaState};

/// Relation types applicable to one record type.
///
/// Types are kept sorted by name (ties by id). When two names normalize to the
/// same accessor key, the first in that order answers to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationTypeRegistry {
    applies_to: String,
    types: Vec<RelationType>,
    by_key: HashMap<String, usize>,
}

impl RelationTypeRegistry {
    /// Build a registry from `types`, keeping only those applicable to `applies_to`.
    pub fn new(applies_to: impl Into<String>, types: impl IntoIterator<Item = RelationType>) -> Self {
        let applies_to = applies_to.into();
        let mut types: Vec<RelationType> = types
            .into_iter()
            .filter(|t| t.applies_to == applies_to)
            .collect();
        types.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        let mut by_key = HashMap::with_capacity(types.len());
        for (idx, t) in types.iter().enumerate() {
            let key = t.accessor_key();
            if by_key.contains_key(&key) {
                debug!(key = %key, relation_type = %t.name, "accessor key already taken");
                continue;
            }
            by_key.insert(key, idx);
        }

        Self {
            applies_to,
            types,
            by_key,
        }
    }

    /// Registry with no relation types.
    pub fn empty(applies_to: impl Into<String>) -> Self {
        Self::new(applies_to, Vec::new())
    }

    /// Load the registry for `applies_to` from a store.
    ///
    /// Unprovisioned storage yields an empty registry rather than an error.
    pub fn load<R, S>(store: &S, applies_to: &str) -> Result<Self, RelationStoreError>
    where
        S: RelationStore<R> + ?Sized,
    {
        match store.schema_state()? {
            SchemaState::Ready => Ok(Self::new(applies_to, store.relation_types(applies_to)?)),
            SchemaState::Unprovisioned => {
                warn!(applies_to, "relation storage not provisioned; no relation accessors");
                Ok(Self::empty(applies_to))
            }
        }
    }

    pub fn applies_to(&self) -> &str {
        &self.applies_to
    }

    /// Applicable relation types, sorted by name.
    pub fn types(&self) -> &[RelationType] {
        &self.types
    }

    pub fn into_types(self) -> Vec<RelationType> {
        self.types
    }

    /// Relation type answering to the accessor `name`, if any.
    pub fn lookup(&self, name: &str) -> Option<&RelationType> {
        self.by_key
            .get(&normalize_accessor(name))
            .map(|&idx| &self.types[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Accessor keys in relation type name order.
    pub fn accessor_names(&self) -> Vec<String> {
        let mut keyed: Vec<(&String, usize)> = self.by_key.iter().map(|(k, &i)| (k, i)).collect();
        keyed.sort_by_key(|&(_, i)| i);
        keyed.into_iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewRelationType;
    use prodrel_core::RelationTypeId;

    fn rt(name: &str, applies_to: &str) -> RelationType {
        NewRelationType::new(name, applies_to).into_relation_type(RelationTypeId::new())
    }

    #[test]
    fn types_are_filtered_by_owner_type_and_sorted_by_name() {
        let registry = RelationTypeRegistry::new(
            "Product",
            vec![
                rt("Upsells", "Product"),
                rt("Accessories", "Product"),
                rt("Similar Taxons", "Taxon"),
                rt("Cross Sell", "Product"),
            ],
        );

        let names: Vec<&str> = registry.types().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Accessories", "Cross Sell", "Upsells"]);
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.applies_to(), "Product");
    }

    #[test]
    fn lookup_matches_normalized_plural_names_only() {
        let registry = RelationTypeRegistry::new("Product", vec![rt("Cross Sell", "Product")]);

        assert!(registry.contains("cross_sells"));
        assert!(registry.contains("Cross_Sells"));
        assert!(!registry.contains("cross_sell"));
        assert!(!registry.contains("CrossSells"));
        assert!(!registry.contains("cross sells"));
    }

    #[test]
    fn first_type_in_name_order_wins_a_shared_key() {
        let singular = rt("Related Product", "Product");
        let plural = rt("Related Products", "Product");
        let registry = RelationTypeRegistry::new("Product", vec![plural.clone(), singular.clone()]);

        assert_eq!(registry.lookup("related_products"), Some(&singular));
        assert_eq!(registry.accessor_names(), vec!["related_products".to_string()]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn empty_registry_matches_nothing() {
        let registry = RelationTypeRegistry::empty("Product");
        assert!(registry.is_empty());
        assert!(registry.lookup("upsells").is_none());
    }
}

//! End-to-end tests for relation resolution over the in-memory store.
//!
//! Tests: RelationType → Relation → RelationResolver → filtered, ordered products
//!
//! Verifies:
//! - Accessors return targets in position order, filtered by visibility
//! - Accessor names match normalized, pluralized relation type names only
//! - Cascades remove edges in both directions atomically

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, Utc};

    use prodrel_core::{Record, RecordId, RecordRef};
    use prodrel_products::{InStockFilter, Product, ProductId};
    use prodrel_relations::{
        CascadeDestroyer, CompareOp, Condition, HasRelations, Narrow, NewRelation,
        NewRelationType, RelationError, RelationResolver, RelationStore, RelationStoreError,
        RelationType, SchemaState,
    };

    use crate::relation_store::InMemoryRelationStore;

    type Store = Arc<InMemoryRelationStore<Product>>;

    fn setup() -> (Store, RelationResolver<Store, Product>) {
        let store: Store = Arc::new(InMemoryRelationStore::new());
        let resolver = RelationResolver::new(store.clone());
        (store, resolver)
    }

    /// A product that went on sale yesterday.
    fn available(store: &Store, name: &str) -> Product {
        let product = Product::new(ProductId::new(), format!("SKU-{name}"), name)
            .unwrap()
            .available_from(Utc::now() - Duration::days(1))
            .with_stock(10);
        store.upsert_record(product.clone()).unwrap();
        product
    }

    fn relation_type(store: &Store, name: &str) -> RelationType {
        store
            .create_relation_type(NewRelationType::new(name, "Product"))
            .unwrap()
    }

    fn relate(store: &Store, owner: &Product, target: &Product, rt: &RelationType, position: i32) {
        store
            .create_relation(
                NewRelation::new(owner.record_ref(), target.record_ref(), rt.id).at_position(position),
            )
            .unwrap();
    }

    fn names(products: &[Product]) -> Vec<&str> {
        products.iter().map(|p| p.name()).collect()
    }

    #[test]
    fn upsells_are_returned_in_position_order() {
        let (store, resolver) = setup();
        let upsells = relation_type(&store, "upsells");
        let a = available(&store, "A");
        let b = available(&store, "B");
        let c = available(&store, "C");
        relate(&store, &a, &b, &upsells, 2);
        relate(&store, &a, &c, &upsells, 1);

        let related = resolver.get_related(&a, "upsells").unwrap().unwrap();
        assert_eq!(names(&related), vec!["C", "B"]);
    }

    #[test]
    fn resolution_is_idempotent() {
        let (store, resolver) = setup();
        let rt = relation_type(&store, "Related Product");
        let a = available(&store, "A");
        for (i, name) in ["B", "C", "D"].into_iter().enumerate() {
            let target = available(&store, name);
            relate(&store, &a, &target, &rt, 3 - i as i32);
        }

        let first = resolver.get_related(&a, "related_products").unwrap();
        let second = resolver.get_related(&a, "related_products").unwrap();
        assert_eq!(first, second);
        assert_eq!(names(&first.unwrap()), vec!["D", "C", "B"]);
    }

    #[test]
    fn invisible_products_are_filtered_out() {
        let (store, resolver) = setup();
        let rt = relation_type(&store, "Accessories");
        let now = Utc::now();
        let owner = available(&store, "owner");

        let visible = available(&store, "visible");

        let mut deleted = available(&store, "deleted");
        deleted.soft_delete(now - Duration::hours(1));
        store.upsert_record(deleted.clone()).unwrap();

        let future = Product::new(ProductId::new(), "SKU-future", "future")
            .unwrap()
            .available_from(now + Duration::days(3));
        store.upsert_record(future.clone()).unwrap();

        let never = Product::new(ProductId::new(), "SKU-never", "never").unwrap();
        store.upsert_record(never.clone()).unwrap();

        for (position, target) in [&deleted, &future, &never, &visible].into_iter().enumerate() {
            relate(&store, &owner, target, &rt, position as i32);
        }

        let related = resolver.resolve_at(&owner, &rt, now).unwrap();
        assert_eq!(names(&related), vec!["visible"]);
    }

    #[test]
    fn accessor_names_must_be_normalized_plurals() {
        let (store, resolver) = setup();
        let rt = relation_type(&store, "Cross Sell");
        let a = available(&store, "A");
        let b = available(&store, "B");
        relate(&store, &a, &b, &rt, 0);

        assert_eq!(names(&resolver.get_related(&a, "cross_sells").unwrap().unwrap()), vec!["B"]);
        assert!(resolver.get_related(&a, "cross_sell").unwrap().is_none());
        assert!(resolver.get_related(&a, "CrossSells").unwrap().is_none());
    }

    #[test]
    fn known_accessor_without_relations_returns_empty() {
        let (store, resolver) = setup();
        relation_type(&store, "Upsells");
        let a = available(&store, "A");

        assert_eq!(resolver.get_related(&a, "upsells").unwrap(), Some(vec![]));
    }

    #[test]
    fn has_related_products_reports_accessors_without_fetching() {
        let (store, resolver) = setup();
        relation_type(&store, "Upsells");

        assert!(resolver.has_related_products("upsells").unwrap());
        assert!(!resolver.has_related_products("nonexistent").unwrap());
    }

    #[test]
    fn applicable_types_are_scoped_and_sorted() {
        let (store, resolver) = setup();
        relation_type(&store, "Upsells");
        relation_type(&store, "Accessories");
        store
            .create_relation_type(NewRelationType::new("Similar", "Taxon"))
            .unwrap();

        let types = resolver.list_applicable_types().unwrap();
        let type_names: Vec<&str> = types.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(type_names, vec!["Accessories", "Upsells"]);
    }

    #[test]
    fn unprovisioned_storage_is_not_an_error() {
        let store: Store = Arc::new(InMemoryRelationStore::unprovisioned());
        let resolver = RelationResolver::new(store.clone());
        let a = available(&store, "A");

        assert!(resolver.list_applicable_types().unwrap().is_empty());
        assert!(resolver.get_related(&a, "upsells").unwrap().is_none());
        assert!(!resolver.has_related_products("upsells").unwrap());

        store.set_schema_state(SchemaState::Ready).unwrap();
        relation_type(&store, "Upsells");
        assert!(resolver.has_related_products("upsells").unwrap());
    }

    #[test]
    fn class_filter_applies_to_every_owner() {
        let store: Store = Arc::new(InMemoryRelationStore::new());
        let resolver = RelationResolver::new(store.clone()).with_class_filter(Arc::new(InStockFilter));
        let rt = relation_type(&store, "Upsells");
        let a = available(&store, "A");
        let stocked = available(&store, "stocked");
        let sold_out = available(&store, "sold out").with_stock(0);
        store.upsert_record(sold_out.clone()).unwrap();
        relate(&store, &a, &sold_out, &rt, 0);
        relate(&store, &a, &stocked, &rt, 1);

        let related = resolver.get_related(&a, "upsells").unwrap().unwrap();
        assert_eq!(names(&related), vec!["stocked"]);
    }

    #[test]
    fn instance_filter_takes_precedence_over_class_filter() {
        let store: Store = Arc::new(InMemoryRelationStore::new());
        let resolver = RelationResolver::new(store.clone()).with_class_filter(Arc::new(InStockFilter));
        let rt = relation_type(&store, "Upsells");
        let a = available(&store, "A");
        let sold_out = available(&store, "sold out").with_stock(0);
        store.upsert_record(sold_out.clone()).unwrap();
        let hidden = Product::new(ProductId::new(), "SKU-hidden", "hidden").unwrap();
        store.upsert_record(hidden.clone()).unwrap();
        relate(&store, &a, &sold_out, &rt, 0);
        relate(&store, &a, &hidden, &rt, 1);

        // Replaces everything below: availability and stock no longer matter.
        let show_all = Arc::new(|_base: Condition, _now: DateTime<Utc>| Condition::True);
        let related = a.relations(&resolver).with_filter(show_all).get("upsells").unwrap().unwrap();
        assert_eq!(names(&related), vec!["sold out", "hidden"]);

        // Narrows the class-level condition.
        let named = Arc::new(Narrow(Condition::compare("name", CompareOp::Eq, "sold out")));
        let related = a.relations(&resolver).with_filter(named).get("upsells").unwrap().unwrap();
        assert!(related.is_empty());
    }

    #[test]
    fn record_relations_expose_types_and_presence() {
        let (store, resolver) = setup();
        let rt = relation_type(&store, "Upsells");
        let a = available(&store, "A");
        let b = available(&store, "B");
        relate(&store, &a, &b, &rt, 0);

        let relations = a.relations(&resolver);
        assert!(relations.has("upsells").unwrap());
        assert_eq!(relations.types().unwrap(), vec![rt.clone()]);
        assert_eq!(names(&relations.of_type(&rt).unwrap()), vec!["B"]);
        assert_eq!(relations.record().name(), "A");
    }

    #[test]
    fn destroying_a_product_removes_edges_in_both_directions() {
        let (store, resolver) = setup();
        let rt = relation_type(&store, "Upsells");
        let a = available(&store, "A");
        let b = available(&store, "B");
        let c = available(&store, "C");
        relate(&store, &a, &b, &rt, 0);
        relate(&store, &a, &c, &rt, 1);
        relate(&store, &b, &c, &rt, 0);
        relate(&store, &c, &b, &rt, 0);

        let destroyer = CascadeDestroyer::new(store.clone());
        let report = destroyer.destroy_record(&b).unwrap();

        assert_eq!(report.outgoing_removed, 1);
        assert_eq!(report.incoming_removed, 2);
        assert_eq!(report.edges_removed(), 3);
        assert!(report.record_deleted);
        assert!(store.record(b.record_id()).unwrap().is_none());
        assert!(store.relations_touching(&b.record_ref()).unwrap().is_empty());
        assert_eq!(store.relation_count().unwrap(), 1);

        let related = resolver.get_related(&a, "upsells").unwrap().unwrap();
        assert_eq!(names(&related), vec!["C"]);
        assert!(resolver.get_related(&c, "upsells").unwrap().unwrap().is_empty());
    }

    #[test]
    fn failed_cascade_changes_nothing() {
        let (store, _resolver) = setup();
        let rt = relation_type(&store, "Upsells");
        let a = available(&store, "A");
        let b = available(&store, "B");
        relate(&store, &a, &b, &rt, 0);
        relate(&store, &b, &a, &rt, 0);

        store.fail_next_incoming_delete();
        let destroyer = CascadeDestroyer::new(store.clone());
        let err = destroyer.destroy_record(&b).unwrap_err();
        assert!(matches!(err, RelationError::Store(RelationStoreError::Transaction(_))));

        assert!(store.record(b.record_id()).unwrap().is_some());
        assert_eq!(store.relations_touching(&b.record_ref()).unwrap().len(), 2);

        // The injected failure is one-shot.
        let report = destroyer.destroy_record(&b).unwrap();
        assert_eq!(report.edges_removed(), 2);
    }

    #[test]
    fn destroying_an_unknown_record_still_removes_stray_edges() {
        let (store, _resolver) = setup();
        let rt = relation_type(&store, "Upsells");
        let a = available(&store, "A");
        let ghost = RecordRef::new("Product", RecordId::new());
        store
            .create_relation(NewRelation::new(a.record_ref(), ghost.clone(), rt.id))
            .unwrap();

        let report = CascadeDestroyer::<_, Product>::new(store.clone()).destroy(&ghost).unwrap();
        assert_eq!(report.incoming_removed, 1);
        assert!(!report.record_deleted);
    }

    #[test]
    fn relations_without_position_are_appended() {
        let (store, resolver) = setup();
        let rt = relation_type(&store, "Upsells");
        let a = available(&store, "A");
        let first = available(&store, "first");
        let second = available(&store, "second");
        relate(&store, &a, &first, &rt, 5);
        let appended = store
            .create_relation(NewRelation::new(a.record_ref(), second.record_ref(), rt.id))
            .unwrap();

        assert_eq!(appended.position, 6);
        assert_eq!(
            names(&resolver.get_related(&a, "upsells").unwrap().unwrap()),
            vec!["first", "second"]
        );
    }

    #[test]
    fn equal_positions_keep_creation_order() {
        let (store, resolver) = setup();
        let rt = relation_type(&store, "Upsells");
        let a = available(&store, "A");
        for name in ["x", "y", "z"] {
            let target = available(&store, name);
            relate(&store, &a, &target, &rt, 0);
        }

        assert_eq!(
            names(&resolver.get_related(&a, "upsells").unwrap().unwrap()),
            vec!["x", "y", "z"]
        );
    }

    #[test]
    fn reposition_reorders_results() {
        let (store, resolver) = setup();
        let rt = relation_type(&store, "Upsells");
        let a = available(&store, "A");
        let b = available(&store, "B");
        let c = available(&store, "C");
        relate(&store, &a, &b, &rt, 0);
        relate(&store, &a, &c, &rt, 1);

        let edges = store.relations_for(&a.record_ref(), rt.id).unwrap();
        let reversed: Vec<_> = edges.iter().rev().map(|e| e.id).collect();
        store.reposition(&reversed).unwrap();

        assert_eq!(names(&resolver.get_related(&a, "upsells").unwrap().unwrap()), vec!["C", "B"]);
    }

    #[test]
    fn reposition_with_unknown_id_changes_nothing() {
        let (store, resolver) = setup();
        let rt = relation_type(&store, "Upsells");
        let a = available(&store, "A");
        let b = available(&store, "B");
        let c = available(&store, "C");
        relate(&store, &a, &b, &rt, 0);
        relate(&store, &a, &c, &rt, 1);

        let edges = store.relations_for(&a.record_ref(), rt.id).unwrap();
        let ids = vec![edges[1].id, prodrel_core::RelationId::new(), edges[0].id];
        let err = store.reposition(&ids).unwrap_err();
        assert!(matches!(err, RelationStoreError::NotFound(_)));

        assert_eq!(names(&resolver.get_related(&a, "upsells").unwrap().unwrap()), vec!["B", "C"]);
    }

    #[test]
    fn relations_must_match_the_type_owner() {
        let (store, _resolver) = setup();
        let taxon_type = store
            .create_relation_type(NewRelationType::new("Similar", "Taxon"))
            .unwrap();
        let a = available(&store, "A");
        let b = available(&store, "B");

        let err = store
            .create_relation(NewRelation::new(a.record_ref(), b.record_ref(), taxon_type.id))
            .unwrap_err();
        assert!(matches!(err, RelationStoreError::Validation(_)));

        let err = store
            .create_relation(NewRelation::new(
                a.record_ref(),
                b.record_ref(),
                prodrel_core::RelationTypeId::new(),
            ))
            .unwrap_err();
        assert!(matches!(err, RelationStoreError::NotFound(_)));
    }

    #[test]
    fn targets_of_other_record_types_are_ignored() {
        let (store, resolver) = setup();
        let rt = relation_type(&store, "Upsells");
        let a = available(&store, "A");
        let b = available(&store, "B");
        store
            .create_relation(
                NewRelation::new(a.record_ref(), RecordRef::new("Taxon", b.record_id()), rt.id)
                    .at_position(0),
            )
            .unwrap();
        relate(&store, &a, &b, &rt, 1);

        assert_eq!(names(&resolver.get_related(&a, "upsells").unwrap().unwrap()), vec!["B"]);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 64,
                ..ProptestConfig::default()
            })]

            /// Property: results are the visible targets, sorted by position.
            #[test]
            fn results_follow_positions_of_visible_targets(
                targets in proptest::collection::vec((-50i32..50, any::<bool>()), 0..12)
            ) {
                let (store, resolver) = setup();
                let rt = relation_type(&store, "Upsells");
                let owner = available(&store, "owner");

                let mut expected: Vec<(i32, usize, String)> = Vec::new();
                for (idx, (position, visible)) in targets.iter().enumerate() {
                    let name = format!("p{idx}");
                    let mut target = available(&store, &name);
                    if !visible {
                        target.soft_delete(Utc::now() - Duration::minutes(1));
                        store.upsert_record(target.clone()).unwrap();
                    } else {
                        expected.push((*position, idx, name));
                    }
                    relate(&store, &owner, &target, &rt, *position);
                }
                expected.sort();

                let related = resolver.get_related(&owner, "upsells").unwrap().unwrap();
                let got: Vec<String> = related.iter().map(|p| p.name().to_string()).collect();
                let want: Vec<String> = expected.into_iter().map(|(_, _, n)| n).collect();
                prop_assert_eq!(got, want);
            }
        }
    }
}

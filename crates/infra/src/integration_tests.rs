//! Integration tests for the ledger → reconciliation → store pipeline.
//!
//! Runs every operation through `StockService` over the in-memory store and
//! checks the stock counter against ledger totals after each step.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use wardstock_core::{ItemId, UserId};
    use wardstock_inventory::{ItemPatch, LedgerKind, NewItem};

    use crate::service::{ServiceError, StockService};
    use crate::store::{InMemoryInventoryStore, LedgerFilter, Pagination};

    type Service = StockService<Arc<InMemoryInventoryStore>>;

    fn setup() -> Service {
        StockService::new(Arc::new(InMemoryInventoryStore::new()))
    }

    async fn create(service: &Service, name: &str, threshold: i64) -> ItemId {
        service
            .create_item(NewItem {
                name: name.to_string(),
                picture_path: None,
                reorder_threshold: Some(threshold),
            })
            .await
            .unwrap()
            .id
    }

    async fn stock(service: &Service, id: ItemId) -> i64 {
        service.get_item(id).await.unwrap().current_stock
    }

    async fn assert_consistent(service: &Service, id: ItemId) {
        let audit = service.audit_item(id).await.unwrap();
        assert!(audit.consistent, "counter drifted: {audit:?}");
    }

    #[tokio::test]
    async fn add_then_use_reaches_low_stock() {
        let service = setup();
        let user = UserId::new();
        let gauze = create(&service, "Gauze", 10).await;
        assert_eq!(stock(&service, gauze).await, 0);

        service
            .record_entry(LedgerKind::Addition, gauze, 15, user)
            .await
            .unwrap();
        assert_eq!(stock(&service, gauze).await, 15);

        service
            .record_entry(LedgerKind::Usage, gauze, 12, user)
            .await
            .unwrap();
        assert_eq!(stock(&service, gauze).await, 3);

        let low = service.list_low_stock().await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].id, gauze);
        assert_consistent(&service, gauze).await;
    }

    #[tokio::test]
    async fn deleting_an_addition_reverses_exactly_its_quantity() {
        let service = setup();
        let user = UserId::new();
        let item = create(&service, "Saline", 10).await;

        let five = service
            .record_entry(LedgerKind::Addition, item, 5, user)
            .await
            .unwrap();
        service
            .record_entry(LedgerKind::Addition, item, 7, user)
            .await
            .unwrap();
        assert_eq!(stock(&service, item).await, 12);

        service
            .remove_entry(LedgerKind::Addition, five.entry.id)
            .await
            .unwrap();
        assert_eq!(stock(&service, item).await, 7);
        assert_consistent(&service, item).await;
    }

    #[tokio::test]
    async fn usage_increase_beyond_available_is_rejected() {
        let service = setup();
        let user = UserId::new();
        let item = create(&service, "Syringe", 10).await;

        service
            .record_entry(LedgerKind::Addition, item, 7, user)
            .await
            .unwrap();
        let usage = service
            .record_entry(LedgerKind::Usage, item, 4, user)
            .await
            .unwrap();
        assert_eq!(stock(&service, item).await, 3);

        let err = service
            .correct_entry(LedgerKind::Usage, usage.entry.id, Some(9), None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ServiceError::InsufficientStock {
                available: 3,
                requested: 5
            }
        );

        // Nothing was applied.
        assert_eq!(stock(&service, item).await, 3);
        let unchanged = service
            .get_entry(LedgerKind::Usage, usage.entry.id)
            .await
            .unwrap();
        assert_eq!(unchanged.entry.quantity.get(), 4);
    }

    #[tokio::test]
    async fn third_page_holds_the_oldest_entries() {
        let service = setup();
        let user = UserId::new();
        let item = create(&service, "Gloves", 10).await;
        for _ in 0..23 {
            service
                .record_entry(LedgerKind::Addition, item, 1, user)
                .await
                .unwrap();
        }

        let filter = LedgerFilter {
            item_id: Some(item),
            created_by: None,
        };
        let all = service
            .list_entries(
                LedgerKind::Addition,
                &filter,
                Pagination::from_params(None, Some(1000), None),
            )
            .await
            .unwrap();
        assert_eq!(all.items.len(), 23);
        assert!(
            all.items
                .windows(2)
                .all(|w| w[0].entry.created_at >= w[1].entry.created_at)
        );

        let page = service
            .list_entries(
                LedgerKind::Addition,
                &filter,
                Pagination::from_params(Some(3), Some(10), None),
            )
            .await
            .unwrap();
        assert_eq!(page.total, 23);
        assert_eq!(page.total_pages(), 3);

        let expected: Vec<_> = all.items[20..].iter().map(|v| v.entry.id).collect();
        let got: Vec<_> = page.items.iter().map(|v| v.entry.id).collect();
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn usage_may_drain_stock_to_exactly_zero() {
        let service = setup();
        let user = UserId::new();
        let item = create(&service, "Swabs", 0).await;
        service
            .record_entry(LedgerKind::Addition, item, 4, user)
            .await
            .unwrap();

        let err = service
            .record_entry(LedgerKind::Usage, item, 5, user)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientStock { .. }));

        service
            .record_entry(LedgerKind::Usage, item, 4, user)
            .await
            .unwrap();
        assert_eq!(stock(&service, item).await, 0);
    }

    #[tokio::test]
    async fn moving_an_entry_between_items_updates_both_counters() {
        let service = setup();
        let user = UserId::new();
        let from = create(&service, "Bandage small", 10).await;
        let to = create(&service, "Bandage large", 10).await;

        let entry = service
            .record_entry(LedgerKind::Addition, from, 6, user)
            .await
            .unwrap();
        let moved = service
            .correct_entry(LedgerKind::Addition, entry.entry.id, Some(8), Some(to))
            .await
            .unwrap();

        assert_eq!(moved.item_name.as_deref(), Some("Bandage large"));
        assert_eq!(stock(&service, from).await, 0);
        assert_eq!(stock(&service, to).await, 8);
        assert_consistent(&service, from).await;
        assert_consistent(&service, to).await;
    }

    #[tokio::test]
    async fn moving_usage_requires_stock_on_the_new_item() {
        let service = setup();
        let user = UserId::new();
        let stocked = create(&service, "Masks", 10).await;
        let empty = create(&service, "Gowns", 10).await;
        service
            .record_entry(LedgerKind::Addition, stocked, 5, user)
            .await
            .unwrap();
        let usage = service
            .record_entry(LedgerKind::Usage, stocked, 2, user)
            .await
            .unwrap();

        let err = service
            .correct_entry(LedgerKind::Usage, usage.entry.id, None, Some(empty))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientStock { .. }));
        assert_eq!(stock(&service, stocked).await, 3);
        assert_eq!(stock(&service, empty).await, 0);
    }

    #[tokio::test]
    async fn validation_precedes_mutation() {
        let service = setup();
        let user = UserId::new();
        let item = create(&service, "Tape", 10).await;

        let missing = service
            .record_entry(LedgerKind::Addition, ItemId::new(), 3, user)
            .await
            .unwrap_err();
        assert_eq!(missing, ServiceError::NotFound("Item not found".to_string()));

        let zero = service
            .record_entry(LedgerKind::Addition, item, 0, user)
            .await
            .unwrap_err();
        assert!(matches!(zero, ServiceError::InvalidArgument(_)));

        let entry = service
            .record_entry(LedgerKind::Addition, item, 3, user)
            .await
            .unwrap();
        let empty = service
            .correct_entry(LedgerKind::Addition, entry.entry.id, None, None)
            .await
            .unwrap_err();
        assert!(matches!(empty, ServiceError::InvalidArgument(_)));
        assert_eq!(stock(&service, item).await, 3);
    }

    #[tokio::test]
    async fn orphaned_entries_survive_item_deletion() {
        let service = setup();
        let user = UserId::new();
        let item = create(&service, "Iodine", 10).await;
        let entry = service
            .record_entry(LedgerKind::Addition, item, 2, user)
            .await
            .unwrap();

        service.delete_item(item).await.unwrap();

        let view = service
            .get_entry(LedgerKind::Addition, entry.entry.id)
            .await
            .unwrap();
        assert_eq!(view.item_name, None);

        service
            .remove_entry(LedgerKind::Addition, entry.entry.id)
            .await
            .unwrap();
        let left = service
            .count_entries(LedgerKind::Addition, &LedgerFilter::default())
            .await
            .unwrap();
        assert_eq!(left, 0);
    }

    #[tokio::test]
    async fn item_edits_conflict_on_duplicate_names_and_keep_stock() {
        let service = setup();
        let user = UserId::new();
        let a = create(&service, "Catheter", 10).await;
        create(&service, "Cannula", 10).await;
        service
            .record_entry(LedgerKind::Addition, a, 4, user)
            .await
            .unwrap();

        let err = service
            .update_item(
                a,
                ItemPatch {
                    name: Some("Cannula".to_string()),
                    ..ItemPatch::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let updated = service
            .update_item(
                a,
                ItemPatch {
                    reorder_threshold: Some(2),
                    ..ItemPatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.reorder_threshold, 2);
        assert_eq!(updated.current_stock, 4);
    }

    #[tokio::test]
    async fn entries_are_separated_by_ledger_and_filterable_by_author() {
        let service = setup();
        let alice = UserId::new();
        let bob = UserId::new();
        let item = create(&service, "Thermometer covers", 10).await;

        service
            .record_entry(LedgerKind::Addition, item, 10, alice)
            .await
            .unwrap();
        service
            .record_entry(LedgerKind::Addition, item, 10, bob)
            .await
            .unwrap();
        service
            .record_entry(LedgerKind::Usage, item, 1, bob)
            .await
            .unwrap();

        let by_bob = LedgerFilter {
            item_id: None,
            created_by: Some(bob),
        };
        assert_eq!(
            service
                .count_entries(LedgerKind::Addition, &by_bob)
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            service
                .count_entries(LedgerKind::Usage, &LedgerFilter::default())
                .await
                .unwrap(),
            1
        );
        assert_consistent(&service, item).await;
    }

    #[tokio::test]
    async fn repeated_reads_return_identical_results() {
        let service = setup();
        let user = UserId::new();
        let syringes = create(&service, "Syringe 5ml", 10).await;
        create(&service, "Syringe 10ml", 10).await;
        create(&service, "Gauze", 10).await;
        for n in 1..=7 {
            service
                .record_entry(LedgerKind::Addition, syringes, n, user)
                .await
                .unwrap();
        }

        let first = service.list_items(Some("syringe")).await.unwrap();
        let second = service.list_items(Some("syringe")).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);

        let filter = LedgerFilter {
            item_id: Some(syringes),
            created_by: None,
        };
        let window = || Pagination::from_params(Some(2), Some(3), None);
        let first = service
            .list_entries(LedgerKind::Addition, &filter, window())
            .await
            .unwrap();
        let second = service
            .list_entries(LedgerKind::Addition, &filter, window())
            .await
            .unwrap();
        assert_eq!(first.items.len(), 3);
        assert_eq!(first, second);
        assert_eq!(stock(&service, syringes).await, 28);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_usage_never_overdraws() {
        let service = setup();
        let item = create(&service, "Saline 500ml", 10).await;
        service
            .record_entry(LedgerKind::Addition, item, 10, UserId::new())
            .await
            .unwrap();

        let handles: Vec<_> = (0..25)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move {
                    service
                        .record_entry(LedgerKind::Usage, item, 1, UserId::new())
                        .await
                })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(err) => assert!(
                    matches!(err, ServiceError::InsufficientStock { .. }),
                    "unexpected error: {err:?}"
                ),
            }
        }

        assert_eq!(accepted, 10);
        assert_eq!(stock(&service, item).await, 0);
        assert_consistent(&service, item).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_corrections_keep_the_counter_consistent() {
        let service = setup();
        let item = create(&service, "Cannula", 10).await;
        let entry = service
            .record_entry(LedgerKind::Addition, item, 5, UserId::new())
            .await
            .unwrap()
            .entry;

        let handles: Vec<_> = (1..=20)
            .map(|n| {
                let service = service.clone();
                tokio::spawn(async move {
                    if n % 7 == 0 {
                        service
                            .remove_entry(LedgerKind::Addition, entry.id)
                            .await
                            .map(|_| ())
                    } else {
                        service
                            .correct_entry(LedgerKind::Addition, entry.id, Some(n), None)
                            .await
                            .map(|_| ())
                    }
                })
            })
            .collect();

        for handle in handles {
            if let Err(err) = handle.await.unwrap() {
                assert!(
                    matches!(err, ServiceError::Conflict(_) | ServiceError::NotFound(_)),
                    "unexpected error: {err:?}"
                );
            }
        }

        assert_consistent(&service, item).await;
    }
}

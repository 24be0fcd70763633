use crmsync::selection::reconcile;
use crmsync::{
    Actor, ActionsConfig, CollectionKey, Entity, EntityCache, EntityId, FilterEngine, FilterState,
    FilterValue, MemoryRepository, MutationCoordinator, Record, RecordFields, RecordingNotifier,
    SelectionConfig, SelectionManager, SelectionSet, Session, SortSpec, SyncError, Value,
};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Select(u8),
    Deselect(u8),
    Toggle(u8),
    SelectAll,
    Clear,
    Shrink(u8),
    Grow(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..24).prop_map(Op::Select),
        (0u8..24).prop_map(Op::Deselect),
        (0u8..24).prop_map(Op::Toggle),
        Just(Op::SelectAll),
        Just(Op::Clear),
        (0u8..24).prop_map(Op::Shrink),
        (0u8..24).prop_map(Op::Grow),
    ]
}

fn rows(ids: &BTreeSet<u8>) -> Vec<Record> {
    ids.iter()
        .map(|id| {
            Record::new(id.to_string())
                .with("name", if id % 3 == 0 { "Acme" } else { "Beta" })
                .with("size", i64::from(*id))
        })
        .collect()
}

fn record_strategy() -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec(("[a-zA-Z ]{0,8}", -50i64..50, prop::bool::ANY), 0..30).prop_map(
        |columns| {
            columns
                .into_iter()
                .enumerate()
                .map(|(n, (name, size, active))| {
                    Record::new(n.to_string())
                        .with("name", name)
                        .with("size", size)
                        .with("active", active)
                })
                .collect()
        },
    )
}

proptest! {
    #[test]
    fn selection_never_outlives_its_collection(
        ops in prop::collection::vec(op(), 1..60),
        max in prop::option::of(1usize..10),
    ) {
        let config = match max {
            Some(max) => SelectionConfig::default().max_selection(max),
            None => SelectionConfig::default(),
        };
        let mut manager = SelectionManager::<Record>::new(config);
        let mut present: BTreeSet<u8> = (0..12).collect();
        manager.set_collection(Arc::new(rows(&present)));

        for op in ops {
            match op {
                Op::Select(id) => { manager.select(&EntityId::from(id.to_string())); }
                Op::Deselect(id) => { manager.deselect(&EntityId::from(id.to_string())); }
                Op::Toggle(id) => { manager.toggle(&EntityId::from(id.to_string())); }
                Op::SelectAll => {
                    let all = manager.collection().to_vec();
                    manager.select_all(&all, true);
                }
                Op::Clear => manager.clear(),
                Op::Shrink(id) => {
                    present.remove(&id);
                    manager.set_collection(Arc::new(rows(&present)));
                }
                Op::Grow(id) => {
                    present.insert(id);
                    manager.set_collection(Arc::new(rows(&present)));
                }
            }

            let ids: BTreeSet<String> = manager
                .collection()
                .iter()
                .map(|record| record.id().to_string())
                .collect();
            for selected in manager.selected_ids() {
                prop_assert!(ids.contains(selected.as_str()));
            }
            if let Some(max) = max {
                prop_assert!(manager.selection_count() <= max);
            }
        }
    }

    #[test]
    fn reconcile_is_an_intersection(
        selected in prop::collection::btree_set(0u8..20, 0..20),
        present in prop::collection::btree_set(0u8..20, 0..20),
    ) {
        let selection: SelectionSet = selected
            .iter()
            .map(|id| EntityId::from(id.to_string()))
            .collect();
        let reconciled = reconcile(&selection, &rows(&present));
        let expected: BTreeSet<u8> = selected.intersection(&present).copied().collect();
        let actual: BTreeSet<u8> = reconciled
            .iter()
            .filter_map(|id| id.as_str().parse().ok())
            .collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn bulk_accounting_adds_up(
        count in 1usize..12,
        failing in prop::collection::btree_set(0usize..12, 0..6),
    ) {
        let failing: BTreeSet<usize> = failing.into_iter().filter(|n| *n < count).collect();

        let outcome = tokio_test::block_on(async {
            let present: BTreeSet<u8> = (0..count as u8).collect();
            let repo = Arc::new(MemoryRepository::with_rows(rows(&present)));
            for n in &failing {
                repo.fail_for(n.to_string(), SyncError::transport("rejected")).unwrap();
            }
            let cache = Arc::new(EntityCache::new());
            cache.set(&CollectionKey::new("record"), repo.rows().unwrap()).unwrap();
            let coordinator = MutationCoordinator::<Record>::new(
                repo.clone(),
                cache,
                Arc::new(Session::signed_in(Actor::new("u1", "Uma"))),
                Arc::new(RecordingNotifier::new()),
                ActionsConfig::new("record").enable_bulk(true),
            );

            let mut selection = SelectionManager::<Record>::new(SelectionConfig::default());
            let all = Arc::new(repo.rows().unwrap());
            selection.set_collection(Arc::clone(&all));
            selection.select_all(&all, true);

            let mut patch = RecordFields::new();
            patch.insert("flag".into(), Value::from(true));
            let outcome = coordinator
                .bulk_update_selected(&mut selection, patch)
                .await
                .unwrap();
            (outcome, selection.selected_ids())
        });
        let (outcome, still_selected) = outcome;

        prop_assert_eq!(outcome.success_count + outcome.failed_count, count);
        prop_assert_eq!(outcome.failed_count, failing.len());
        let remaining: BTreeSet<usize> = still_selected
            .iter()
            .filter_map(|id| id.as_str().parse().ok())
            .collect();
        prop_assert_eq!(remaining, failing);
    }

    #[test]
    fn bulk_delete_removes_exactly_the_confirmed_ids(
        count in 1usize..12,
        failing in prop::collection::btree_set(0usize..12, 0..6),
    ) {
        let failing: BTreeSet<usize> = failing.into_iter().filter(|n| *n < count).collect();

        let (outcome, still_selected, cached) = tokio_test::block_on(async {
            let present: BTreeSet<u8> = (0..count as u8).collect();
            let repo = Arc::new(MemoryRepository::with_rows(rows(&present)));
            for n in &failing {
                repo.fail_for(n.to_string(), SyncError::validation("locked")).unwrap();
            }
            let key = CollectionKey::new("record");
            let cache = Arc::new(EntityCache::new());
            cache.set(&key, repo.rows().unwrap()).unwrap();
            let coordinator = MutationCoordinator::<Record>::new(
                repo.clone(),
                Arc::clone(&cache),
                Arc::new(Session::signed_in(Actor::new("u1", "Uma"))),
                Arc::new(RecordingNotifier::new()),
                ActionsConfig::new("record").enable_bulk(true),
            );

            let mut selection = SelectionManager::<Record>::new(SelectionConfig::default());
            let all = Arc::new(repo.rows().unwrap());
            selection.set_collection(Arc::clone(&all));
            selection.select_all(&all, true);

            let outcome = coordinator.bulk_delete_selected(&mut selection).await.unwrap();
            let cached = cache.get::<Record>(&key).unwrap().unwrap();
            (outcome, selection.selected_ids(), cached)
        });

        prop_assert_eq!(outcome.success_count + outcome.failed_count, count);
        prop_assert_eq!(outcome.failed_count, failing.len());
        let remaining: BTreeSet<usize> = still_selected
            .iter()
            .filter_map(|id| id.as_str().parse().ok())
            .collect();
        prop_assert_eq!(&remaining, &failing);
        let left_in_cache: BTreeSet<usize> = cached
            .iter()
            .filter_map(|record| record.id().as_str().parse().ok())
            .collect();
        prop_assert_eq!(&left_in_cache, &failing);
    }

    #[test]
    fn applying_filters_twice_changes_nothing(
        records in record_strategy(),
        search in "[a-z]{0,2}",
        min_size in prop::option::of(-50i64..50),
        descending in prop::bool::ANY,
    ) {
        let mut engine = FilterEngine::<Record>::new(FilterState::with_search());
        engine.set_search(search);
        if let Some(min) = min_size {
            engine.set_filter("size", FilterValue::range(Some(Value::from(min)), None));
        }
        engine.set_sort(Some(if descending { SortSpec::desc("size") } else { SortSpec::asc("size") }));

        let once = engine.apply_filters(&records);
        let twice = engine.apply_filters(&once);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn clearing_filters_restores_the_defaults(
        edits in prop::collection::vec(("[a-z]{1,6}", "[a-z]{0,6}"), 0..8),
    ) {
        let defaults = FilterState::with_search().field("status", FilterValue::Any);
        let mut engine = FilterEngine::<Record>::new(defaults.clone());
        for (key, value) in edits {
            engine.set_filter(key, FilterValue::text(value));
        }
        engine.clear_filters();
        prop_assert_eq!(engine.filters(), &defaults);
        prop_assert!(!engine.has_active_filters());
    }
}

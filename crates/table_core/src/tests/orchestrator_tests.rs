use super::*;
use crate::{
    error::TableError,
    events::Operation,
    test_support::{department, drain_notices, mounted, names, table, FakePush, FakeService},
};
use anyhow::anyhow;
use serde_json::json;
use shared::protocol::Page;

#[tokio::test]
async fn mount_joins_the_topic_room_and_loads_the_first_page() {
    let service = FakeService::with_rows(vec![department(1, "Front desk"), department(2, "Spa")]);
    let push = Arc::new(FakePush::default());
    let table = table(Arc::clone(&service), Arc::clone(&push));

    let outcome = table.mount().await;

    assert_eq!(
        outcome,
        LoadOutcome::Loaded {
            rows: 2,
            total_count: 2
        }
    );
    assert_eq!(push.joined(), vec!["departments".to_string()]);
    let params = service.last_fetch();
    assert_eq!(params.page, 0);
    assert_eq!(params.page_size, 10);
    let snapshot = table.snapshot().await;
    assert_eq!(names(&snapshot), vec!["Front desk", "Spa"]);
    assert!(!snapshot.is_loading);
}

#[tokio::test]
async fn mount_without_push_channel_still_loads() {
    let service = FakeService::with_rows(vec![department(1, "Front desk")]);
    let table = TableOrchestrator::new(
        TableOptions::for_resource::<shared::domain::Department>(),
        service,
    );

    let outcome = table.mount().await;

    assert!(matches!(outcome, LoadOutcome::Loaded { rows: 1, .. }));
}

#[tokio::test]
async fn slower_earlier_load_never_overwrites_newer_page() {
    let (table, service, _push) = mounted(vec![department(1, "Front desk")]).await;
    let slow_reply = service.gate_fetch();
    let slow_table = Arc::clone(&table);
    let slow_load = tokio::spawn(async move { slow_table.load().await });
    service.wait_for_calls(2).await;

    service.reply_fetch(Ok(Page::new(vec![department(9, "Laundry")], 11)));
    let fast = table.set_page(1).await;
    assert_eq!(
        fast,
        LoadOutcome::Loaded {
            rows: 1,
            total_count: 11
        }
    );

    slow_reply
        .send(Ok(Page::new(vec![department(5, "Kitchen")], 3)))
        .expect("slow load still waiting");
    assert_eq!(slow_load.await.expect("join"), LoadOutcome::Stale);

    let snapshot = table.snapshot().await;
    assert_eq!(names(&snapshot), vec!["Laundry"]);
    assert_eq!(snapshot.total_count, 11);
    assert!(!snapshot.is_loading);
}

#[tokio::test]
async fn failed_load_keeps_previous_rows_and_notifies_once() {
    let (table, service, _push) = mounted(vec![department(1, "Front desk")]).await;
    let mut events = table.subscribe_events();

    service.reply_fetch(Err(anyhow!("connection reset")));
    let outcome = table.set_search("desk").await;

    assert!(matches!(outcome, LoadOutcome::Failed(TableError::Transport(_))));
    let snapshot = table.snapshot().await;
    assert_eq!(names(&snapshot), vec!["Front desk"]);
    assert!(!snapshot.is_loading);
    let notices = drain_notices(&mut events);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].operation, Operation::Load);
    assert!(notices[0].is_failure());
}

#[tokio::test]
async fn search_and_filters_reset_page_but_page_size_does_not() {
    let (table, service, _push) = mounted(Vec::new()).await;

    table.set_page(3).await;
    assert_eq!(service.last_fetch().page, 3);

    table.set_filter("departmentId", json!(3)).await;
    let params = service.last_fetch();
    assert_eq!(params.page, 0);
    assert_eq!(params.filters.get("departmentId"), Some(&json!(3)));

    table.set_page(2).await;
    table.set_page_size(25).await;
    let params = service.last_fetch();
    assert_eq!(params.page, 2);
    assert_eq!(params.page_size, 25);

    table.set_search("  spa ").await;
    let params = service.last_fetch();
    assert_eq!(params.page, 0);
    assert_eq!(params.search.as_deref(), Some("spa"));
}

#[tokio::test]
async fn page_size_round_trip_restores_rows() {
    let rows = (1..=12)
        .map(|id| department(id, &format!("Department {id}")))
        .collect();
    let (table, _service, _push) = mounted(rows).await;
    let first = table.snapshot().await;
    assert_eq!(first.rows.len(), 10);
    assert_eq!(first.total_count, 12);

    assert_eq!(
        table.set_page_size(5).await,
        LoadOutcome::Loaded {
            rows: 5,
            total_count: 12
        }
    );
    assert_eq!(names(&table.snapshot().await).len(), 5);

    assert_eq!(
        table.set_page_size(10).await,
        LoadOutcome::Loaded {
            rows: 10,
            total_count: 12
        }
    );
    let back = table.snapshot().await;
    assert_eq!(names(&back), names(&first));
    assert_eq!(back.ids(), first.ids());
    assert_eq!(back.total_count, first.total_count);
}

#[tokio::test]
async fn reserved_filter_name_is_not_applied() {
    let (table, service, _push) = mounted(Vec::new()).await;
    table.set_page(2).await;

    table.set_filter("pageSize", json!(500)).await;

    let params = service.last_fetch();
    assert_eq!(params.page, 2);
    assert_eq!(params.page_size, 10);
    assert!(params.filters.is_empty());
}

#[tokio::test]
async fn empty_filter_values_never_reach_the_service() {
    let (table, service, _push) = mounted(Vec::new()).await;

    table.set_filter("status", json!("")).await;
    table.set_filter("departmentId", json!(3)).await;
    table.set_filter("search", json!(null)).await;

    let params = service.last_fetch();
    assert_eq!(params.filters.len(), 1);
    assert_eq!(params.filters.get("departmentId"), Some(&json!(3)));

    table.clear_filters().await;
    assert!(service.last_fetch().filters.is_empty());
}

#[tokio::test]
async fn batched_query_change_loads_once() {
    let (table, service, _push) = mounted(Vec::new()).await;

    table
        .change_query(|query| {
            query.set_filter("departmentId", json!(2));
            query.set_sort("name", SortDirection::Desc);
            query.set_page(4);
        })
        .await;

    assert_eq!(service.fetches().len(), 2);
    let params = service.last_fetch();
    assert_eq!(params.page, 4);
    assert_eq!(params.sort_field.as_deref(), Some("name"));
    assert_eq!(params.filters.get("departmentId"), Some(&json!(2)));
}

#[tokio::test]
async fn header_clicks_cycle_sort_through_unsorted() {
    let (table, service, _push) = mounted(Vec::new()).await;

    table.toggle_sort("name").await;
    let params = service.last_fetch();
    assert_eq!(params.sort_field.as_deref(), Some("name"));
    assert_eq!(params.sort_direction, Some(SortDirection::Asc));

    table.toggle_sort("name").await;
    assert_eq!(
        service.last_fetch().sort_direction,
        Some(SortDirection::Desc)
    );

    table.toggle_sort("name").await;
    let params = service.last_fetch();
    assert_eq!(params.sort_field, None);
    assert_eq!(params.sort_direction, None);
}

#[tokio::test]
async fn unmount_cancels_inflight_load_and_leaves_the_room() {
    let (table, service, push) = mounted(vec![department(1, "Front desk")]).await;
    let _held = service.gate_fetch();
    let pending_table = Arc::clone(&table);
    let pending = tokio::spawn(async move { pending_table.load().await });
    service.wait_for_calls(2).await;

    table.unmount().await;

    assert_eq!(pending.await.expect("join"), LoadOutcome::Cancelled);
    assert_eq!(push.left(), vec!["departments".to_string()]);
    assert!(table.is_unmounted());
    assert_eq!(table.load().await, LoadOutcome::Cancelled);
    assert_eq!(service.fetches().len(), 2);
}

#[tokio::test]
async fn dropping_the_table_leaves_the_room() {
    let (table, _service, push) = mounted(Vec::new()).await;

    drop(table);
    tokio::task::yield_now().await;

    for _ in 0..100 {
        if !push.left().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert_eq!(push.left(), vec!["departments".to_string()]);
}

#[tokio::test]
async fn row_transitions_follow_the_lifecycle() {
    let (table, _service, _push) = mounted(vec![department(1, "Front desk")]).await;
    let id = EntityId::Num(1);

    assert_eq!(table.toggle_edit(&id).await, Some(RowMode::Collapsed));
    assert_eq!(table.expand(&id).await, Some(RowMode::ExpandedView));
    assert_eq!(table.toggle_edit(&id).await, Some(RowMode::ExpandedEdit));
    assert_eq!(table.cancel_edit(&id).await, Some(RowMode::ExpandedEdit));
    assert_eq!(table.toggle_edit(&id).await, Some(RowMode::ExpandedView));
    assert_eq!(table.toggle_edit(&id).await, Some(RowMode::ExpandedEdit));
    assert_eq!(table.toggle_edit(&id).await, Some(RowMode::ExpandedView));
    assert_eq!(table.collapse(&id).await, Some(RowMode::Collapsed));
    assert_eq!(table.expand(&EntityId::Num(404)).await, None);
}

#[tokio::test]
async fn add_sentinel_is_reserved_for_the_new_row() {
    let (table, _service, _push) = mounted(vec![department(1, "Front desk")]).await;
    let existing = RowKey::Existing(EntityId::Num(1));

    assert!(!table.set_row_mode(existing.clone(), RowMode::AddSentinel).await);
    assert!(table.set_row_mode(RowKey::New, RowMode::AddSentinel).await);

    let snapshot = table.snapshot().await;
    assert_eq!(snapshot.mode(&RowKey::New), Some(RowMode::AddSentinel));
    assert_eq!(snapshot.mode(&existing), Some(RowMode::Collapsed));

    assert!(table.close_add().await);
    assert_eq!(table.snapshot().await.mode(&RowKey::New), None);
}

#[tokio::test]
async fn page_reload_collapses_expanded_rows() {
    let (table, _service, _push) = mounted(vec![department(1, "Front desk")]).await;
    let id = EntityId::Num(1);
    table.expand(&id).await;
    table.toggle_edit(&id).await;

    table.load().await;

    let snapshot = table.snapshot().await;
    assert_eq!(snapshot.mode(&RowKey::Existing(id)), Some(RowMode::Collapsed));
}

#[tokio::test]
async fn every_applied_change_publishes_a_newer_version() {
    let (table, _service, _push) = mounted(vec![department(1, "Front desk")]).await;
    let mut events = table.subscribe_events();
    let before = table.snapshot().await.version;

    table.expand(&EntityId::Num(1)).await;

    match events.try_recv() {
        Ok(TableEvent::StateChanged { version }) => assert!(version > before),
        other => panic!("expected a state change, got {other:?}"),
    }
}

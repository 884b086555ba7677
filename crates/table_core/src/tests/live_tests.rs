use std::{sync::Arc, time::Duration};

use shared::domain::EntityId;

use crate::{
    rows::{RowKey, RowMode},
    test_support::{department, mounted, names, wait_for_snapshot},
};

#[tokio::test]
async fn pushed_snapshot_replaces_only_its_own_row() {
    let (table, _service, _push) =
        mounted(vec![department(1, "A"), department(2, "B"), department(3, "C")]).await;
    table.expand(&EntityId::Num(2)).await;
    let before = table.snapshot().await;

    table.apply_push(department(2, "B2")).await;

    let after = table.snapshot().await;
    assert_eq!(names(&after), vec!["A", "B2", "C"]);
    assert!(Arc::ptr_eq(&before.rows[0].entity, &after.rows[0].entity));
    assert!(Arc::ptr_eq(&before.rows[2].entity, &after.rows[2].entity));
    assert!(!Arc::ptr_eq(&before.rows[1].entity, &after.rows[1].entity));
    assert_eq!(
        after.mode(&RowKey::Existing(EntityId::Num(2))),
        Some(RowMode::ExpandedView)
    );
}

#[tokio::test]
async fn unknown_identity_is_appended_without_touching_total_count() {
    let (table, _service, _push) = mounted(vec![department(1, "A")]).await;

    table.apply_push(department(7, "New wing")).await;

    let snapshot = table.snapshot().await;
    assert_eq!(snapshot.ids(), vec![EntityId::Num(1), EntityId::Num(7)]);
    assert_eq!(snapshot.total_count, 1);
    assert_eq!(
        snapshot.mode(&RowKey::Existing(EntityId::Num(7))),
        Some(RowMode::Collapsed)
    );
}

#[tokio::test]
async fn snapshots_from_the_channel_are_merged_while_mounted() {
    let (table, _service, push) = mounted(vec![department(1, "A")]).await;

    push.push(department(1, "A2"));
    push.push(department(1, "A3"));

    let snapshot = wait_for_snapshot(&table, |snapshot| names(snapshot) == ["A3"]).await;
    assert_eq!(snapshot.ids(), vec![EntityId::Num(1)]);
}

#[tokio::test]
async fn nothing_is_merged_after_unmount() {
    let (table, _service, push) = mounted(vec![department(1, "A")]).await;

    table.unmount().await;
    push.push(department(1, "late"));
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(names(&table.snapshot().await), vec!["A"]);
    assert_eq!(push.left(), vec!["departments".to_string()]);
}

#[tokio::test]
async fn closed_channel_releases_the_room_and_keeps_rows() {
    let (table, _service, push) = mounted(vec![department(1, "A")]).await;

    push.disconnect();
    for _ in 0..100 {
        if !push.left().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(push.left(), vec!["departments".to_string()]);
    assert_eq!(names(&table.snapshot().await), vec!["A"]);
    assert!(!table.is_unmounted());
}

//! Merges pushed entity snapshots into the visible page by identity.
//! `total_count` is left alone until the next load.

use std::sync::Weak;

use shared::domain::Entity;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{orchestrator::TableOrchestrator, service::Subscription, state::TableAction};

impl<T: Entity> TableOrchestrator<T> {
    /// Replaces the row with the same identity in place, or appends the
    /// snapshot as a collapsed row. Last received wins.
    pub async fn apply_push(&self, entity: T) {
        debug!(topic = %self.options.topic, id = %entity.id(), "table: merging pushed snapshot");
        self.dispatch([TableAction::Upsert { entity }]).await;
    }
}

/// Owns `subscription` until the table unmounts or the channel closes; the
/// room is left when the task ends, is aborted, or the table is dropped.
pub(crate) fn spawn_merger<T: Entity>(
    table: Weak<TableOrchestrator<T>>,
    mut subscription: Subscription<T>,
    lifetime: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let entity = tokio::select! {
                _ = lifetime.cancelled() => break,
                next = subscription.next() => match next {
                    Some(entity) => entity,
                    None => break,
                },
            };
            let Some(table) = table.upgrade() else {
                break;
            };
            table.apply_push(entity).await;
        }
        debug!(topic = subscription.topic(), "table: push merger stopped");
    })
}

#[cfg(test)]
#[path = "tests/live_tests.rs"]
mod tests;

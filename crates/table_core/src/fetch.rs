//! Page loading. Each load is tagged with a generation so a slow response can
//! never overwrite the result of a newer request.

use shared::domain::Entity;
use tracing::{debug, error};

use crate::{
    error::TableError,
    events::{Notice, Operation},
    orchestrator::TableOrchestrator,
    state::TableAction,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { rows: usize, total_count: usize },
    /// A newer load was issued before this one settled; its result was dropped.
    Stale,
    Failed(TableError),
    Cancelled,
}

impl<T: Entity> TableOrchestrator<T> {
    /// Fetches the page described by the current query parameters and swaps
    /// it in atomically. On failure the previous rows stay visible.
    pub async fn load(&self) -> LoadOutcome {
        if self.is_unmounted() {
            return LoadOutcome::Cancelled;
        }
        let topic = self.options.topic.as_str();
        let (generation, params) = {
            let mut inner = self.inner.lock().await;
            let generation = inner.state.next_generation();
            let params = inner.query.params();
            self.reduce_all(&mut inner, [TableAction::LoadStarted { generation }]);
            (generation, params)
        };
        debug!(
            topic,
            generation,
            page = params.page,
            page_size = params.page_size,
            "table: loading page"
        );

        let Some(result) = self.guarded(self.service.fetch_page(&params)).await else {
            return LoadOutcome::Cancelled;
        };

        match result {
            Ok(page) => {
                let rows = page.data.len();
                let total_count = page.total_count;
                let applied = self
                    .dispatch([TableAction::PageLoaded { generation, page }])
                    .await;
                if applied {
                    LoadOutcome::Loaded { rows, total_count }
                } else {
                    debug!(topic, generation, "table: discarding stale page");
                    LoadOutcome::Stale
                }
            }
            Err(err) => {
                error!(topic, generation, error = %err, "table: page load failed");
                let error = TableError::transport(&err);
                let latest = self
                    .dispatch([TableAction::LoadFailed { generation }])
                    .await;
                if !latest {
                    return LoadOutcome::Stale;
                }
                self.notify(Notice::failure(Operation::Load, None, &error));
                LoadOutcome::Failed(error)
            }
        }
    }
}

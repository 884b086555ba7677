use std::{future::Future, sync::Arc};

use serde_json::Value;
use shared::{domain::Entity, domain::EntityId, query::SortDirection};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    events::{Notice, TableEvent},
    fetch::LoadOutcome,
    ids::{TempIdGenerator, TimestampTempIds},
    live,
    options::TableOptions,
    query::QueryController,
    rows::{RowKey, RowMode, RowTransition},
    service::{EntityService, MissingPushChannel, PushChannel},
    state::{TableAction, TableSnapshot, TableState},
};

pub(crate) struct TableInner<T: Entity> {
    pub(crate) query: QueryController,
    pub(crate) state: TableState<T>,
    live_task: Option<JoinHandle<()>>,
}

/// Single integration point between a rendered table and its remote
/// collection. Every row change is funnelled through [`TableState::reduce`].
pub struct TableOrchestrator<T: Entity> {
    pub(crate) options: TableOptions,
    pub(crate) service: Arc<dyn EntityService<T>>,
    push: Arc<dyn PushChannel<T>>,
    pub(crate) temp_ids: Arc<dyn TempIdGenerator>,
    pub(crate) inner: Mutex<TableInner<T>>,
    events: broadcast::Sender<TableEvent>,
    lifetime: CancellationToken,
}

impl<T: Entity> TableOrchestrator<T> {
    pub fn new(options: TableOptions, service: Arc<dyn EntityService<T>>) -> Arc<Self> {
        Self::new_with_dependencies(
            options,
            service,
            Arc::new(MissingPushChannel),
            Arc::new(TimestampTempIds::default()),
        )
    }

    pub fn new_with_push(
        options: TableOptions,
        service: Arc<dyn EntityService<T>>,
        push: Arc<dyn PushChannel<T>>,
    ) -> Arc<Self> {
        Self::new_with_dependencies(
            options,
            service,
            push,
            Arc::new(TimestampTempIds::default()),
        )
    }

    pub fn new_with_dependencies(
        options: TableOptions,
        service: Arc<dyn EntityService<T>>,
        push: Arc<dyn PushChannel<T>>,
        temp_ids: Arc<dyn TempIdGenerator>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(options.event_buffer.max(1));
        Arc::new(Self {
            inner: Mutex::new(TableInner {
                query: QueryController::new(options.page_size),
                state: TableState::default(),
                live_task: None,
            }),
            options,
            service,
            push,
            temp_ids,
            events,
            lifetime: CancellationToken::new(),
        })
    }

    pub fn options(&self) -> &TableOptions {
        &self.options
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<TableEvent> {
        self.events.subscribe()
    }

    pub fn is_unmounted(&self) -> bool {
        self.lifetime.is_cancelled()
    }

    pub async fn snapshot(&self) -> TableSnapshot<T> {
        self.inner.lock().await.state.snapshot()
    }

    pub async fn query(&self) -> QueryController {
        self.inner.lock().await.query.clone()
    }

    /// Joins the topic's push room (if a channel is available) and loads the
    /// first page.
    pub async fn mount(self: &Arc<Self>) -> LoadOutcome {
        if self.is_unmounted() {
            return LoadOutcome::Cancelled;
        }
        let topic = self.options.topic.as_str();
        match self.push.subscribe(topic).await {
            Ok(subscription) => {
                let task =
                    live::spawn_merger(Arc::downgrade(self), subscription, self.lifetime.clone());
                if let Some(previous) = self.inner.lock().await.live_task.replace(task) {
                    previous.abort();
                }
                info!(topic, "table: joined push room");
            }
            Err(err) => {
                warn!(topic, error = %err, "table: live updates unavailable");
            }
        }
        self.load().await
    }

    /// Cancels in-flight requests and leaves the push room. The instance is
    /// inert afterwards; mount a fresh one to show the table again.
    pub async fn unmount(&self) {
        self.lifetime.cancel();
        let task = self.inner.lock().await.live_task.take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
        info!(topic = %self.options.topic, "table: unmounted");
    }

    pub(crate) async fn dispatch<I>(&self, actions: I) -> bool
    where
        I: IntoIterator<Item = TableAction<T>>,
    {
        let mut inner = self.inner.lock().await;
        self.reduce_all(&mut inner, actions)
    }

    /// Reducer entry for callers that already hold the state lock.
    pub(crate) fn reduce_all<I>(&self, inner: &mut TableInner<T>, actions: I) -> bool
    where
        I: IntoIterator<Item = TableAction<T>>,
    {
        let mut changed = false;
        for action in actions {
            changed |= inner.state.reduce(action);
        }
        if changed {
            let _ = self.events.send(TableEvent::StateChanged {
                version: inner.state.version(),
            });
        }
        changed
    }

    pub(crate) fn notify(&self, notice: Notice) {
        if notice.is_failure() {
            debug!(operation = ?notice.operation, message = %notice.message, "table: failure");
        }
        let _ = self.events.send(TableEvent::Notice(notice));
    }

    /// Runs `fut` unless the table is unmounted first.
    pub(crate) async fn guarded<F>(&self, fut: F) -> Option<F::Output>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = self.lifetime.cancelled() => None,
            output = fut => Some(output),
        }
    }

    /// Applies several controller changes, then loads once.
    pub async fn change_query<F>(&self, change: F) -> LoadOutcome
    where
        F: FnOnce(&mut QueryController),
    {
        change(&mut self.inner.lock().await.query);
        self.load().await
    }

    pub async fn set_page(&self, page_index: usize) -> LoadOutcome {
        self.inner.lock().await.query.set_page(page_index);
        self.load().await
    }

    pub async fn set_page_size(&self, page_size: usize) -> LoadOutcome {
        self.inner.lock().await.query.set_page_size(page_size);
        self.load().await
    }

    pub async fn set_sort(&self, field: &str, direction: SortDirection) -> LoadOutcome {
        self.inner.lock().await.query.set_sort(field, direction);
        self.load().await
    }

    pub async fn toggle_sort(&self, field: &str) -> LoadOutcome {
        self.inner.lock().await.query.toggle_sort(field);
        self.load().await
    }

    pub async fn clear_sort(&self) -> LoadOutcome {
        self.inner.lock().await.query.clear_sort();
        self.load().await
    }

    pub async fn set_search(&self, search: &str) -> LoadOutcome {
        self.inner.lock().await.query.set_search(search);
        self.load().await
    }

    pub async fn set_filter(&self, key: &str, value: Value) -> LoadOutcome {
        self.inner.lock().await.query.set_filter(key, value);
        self.load().await
    }

    pub async fn remove_filter(&self, key: &str) -> LoadOutcome {
        self.inner.lock().await.query.remove_filter(key);
        self.load().await
    }

    pub async fn clear_filters(&self) -> LoadOutcome {
        self.inner.lock().await.query.clear_filters();
        self.load().await
    }

    /// Forces a mode. `AddSentinel` is only accepted for [`RowKey::New`];
    /// any other mode on `New` closes the add form.
    pub async fn set_row_mode(&self, key: RowKey, mode: RowMode) -> bool {
        match (key, mode) {
            (RowKey::New, mode) => {
                self.dispatch([TableAction::SetAddSentinel(mode == RowMode::AddSentinel)])
                    .await
            }
            (RowKey::Existing(id), RowMode::AddSentinel) => {
                warn!(%id, "table: add sentinel cannot be assigned to an existing row");
                false
            }
            (RowKey::Existing(id), mode) => {
                self.dispatch([TableAction::SetMode { id, mode }]).await
            }
        }
    }

    /// Advances one row through the lifecycle; `None` if the row is not on
    /// the current page.
    pub async fn transition_row(
        &self,
        id: &EntityId,
        transition: RowTransition,
    ) -> Option<RowMode> {
        let mut inner = self.inner.lock().await;
        let current = inner.state.row(id)?.mode;
        let next = current.next(transition);
        self.reduce_all(
            &mut inner,
            [TableAction::SetMode {
                id: id.clone(),
                mode: next,
            }],
        );
        Some(next)
    }

    pub async fn expand(&self, id: &EntityId) -> Option<RowMode> {
        self.transition_row(id, RowTransition::Expand).await
    }

    pub async fn collapse(&self, id: &EntityId) -> Option<RowMode> {
        self.transition_row(id, RowTransition::Collapse).await
    }

    pub async fn toggle_edit(&self, id: &EntityId) -> Option<RowMode> {
        self.transition_row(id, RowTransition::ToggleEdit).await
    }

    pub async fn cancel_edit(&self, id: &EntityId) -> Option<RowMode> {
        self.transition_row(id, RowTransition::Cancel).await
    }

    pub async fn open_add(&self) -> bool {
        self.dispatch([TableAction::SetAddSentinel(true)]).await
    }

    pub async fn close_add(&self) -> bool {
        self.dispatch([TableAction::SetAddSentinel(false)]).await
    }
}

impl<T: Entity> Drop for TableOrchestrator<T> {
    fn drop(&mut self) {
        self.lifetime.cancel();
        if let Some(task) = self.inner.get_mut().live_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
#[path = "tests/orchestrator_tests.rs"]
mod tests;

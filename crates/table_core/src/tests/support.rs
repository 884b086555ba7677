use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc, Mutex as StdMutex,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{Department, DepartmentPatch, Entity, EntityId},
    protocol::{MutationResponse, Page, StatusResponse},
    query::QueryParams,
};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::{
    events::{Notice, TableEvent},
    ids::SequentialTempIds,
    options::TableOptions,
    orchestrator::TableOrchestrator,
    service::{EntityService, PushChannel, Subscription},
    state::TableSnapshot,
};

pub(crate) fn department(id: i64, name: &str) -> Department {
    Department {
        id: EntityId::Num(id),
        name: name.to_string(),
        description: String::new(),
        manager_id: None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ServiceCall {
    Fetch(QueryParams),
    Create(DepartmentPatch),
    Update(Department),
    Delete(EntityId),
}

enum Scripted<R> {
    Ready(Result<R>),
    Gated(oneshot::Receiver<Result<R>>),
}

impl<R> Scripted<R> {
    async fn resolve(self) -> Result<R> {
        match self {
            Scripted::Ready(result) => result,
            Scripted::Gated(gate) => gate.await.unwrap_or_else(|_| Err(anyhow!("gate dropped"))),
        }
    }
}

type Queue<R> = StdMutex<VecDeque<Scripted<R>>>;

fn push_ready<R>(queue: &Queue<R>, result: Result<R>) {
    queue.lock().unwrap().push_back(Scripted::Ready(result));
}

fn push_gate<R>(queue: &Queue<R>) -> oneshot::Sender<Result<R>> {
    let (tx, rx) = oneshot::channel();
    queue.lock().unwrap().push_back(Scripted::Gated(rx));
    tx
}

/// Scripted [`EntityService`]: queued replies are used first, in order; with
/// an empty queue every call succeeds against `server_rows`.
#[derive(Default)]
pub(crate) struct FakeService {
    pub(crate) server_rows: StdMutex<Vec<Department>>,
    calls: StdMutex<Vec<ServiceCall>>,
    fetches: Queue<Page<Department>>,
    creates: Queue<MutationResponse<Department>>,
    updates: Queue<MutationResponse<Department>>,
    deletes: Queue<StatusResponse>,
    next_id: AtomicI64,
}

impl FakeService {
    pub(crate) fn with_rows(rows: Vec<Department>) -> Arc<Self> {
        let service = Self::default();
        *service.server_rows.lock().unwrap() = rows;
        Arc::new(service)
    }

    pub(crate) fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn fetches(&self) -> Vec<QueryParams> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ServiceCall::Fetch(params) => Some(params),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn last_fetch(&self) -> QueryParams {
        self.fetches().pop().expect("at least one fetch")
    }

    pub(crate) async fn wait_for_calls(&self, count: usize) {
        for _ in 0..400 {
            if self.calls.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("service saw fewer than {count} calls");
    }

    pub(crate) fn reply_fetch(&self, result: Result<Page<Department>>) {
        push_ready(&self.fetches, result);
    }

    pub(crate) fn gate_fetch(&self) -> oneshot::Sender<Result<Page<Department>>> {
        push_gate(&self.fetches)
    }

    pub(crate) fn reply_create(&self, result: Result<MutationResponse<Department>>) {
        push_ready(&self.creates, result);
    }

    pub(crate) fn gate_create(&self) -> oneshot::Sender<Result<MutationResponse<Department>>> {
        push_gate(&self.creates)
    }

    pub(crate) fn reply_update(&self, result: Result<MutationResponse<Department>>) {
        push_ready(&self.updates, result);
    }

    pub(crate) fn gate_update(&self) -> oneshot::Sender<Result<MutationResponse<Department>>> {
        push_gate(&self.updates)
    }

    pub(crate) fn reply_delete(&self, result: Result<StatusResponse>) {
        push_ready(&self.deletes, result);
    }

    pub(crate) fn gate_delete(&self) -> oneshot::Sender<Result<StatusResponse>> {
        push_gate(&self.deletes)
    }

    fn record(&self, call: ServiceCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl EntityService<Department> for FakeService {
    async fn fetch_page(&self, params: &QueryParams) -> Result<Page<Department>> {
        self.record(ServiceCall::Fetch(params.clone()));
        let scripted = self.fetches.lock().unwrap().pop_front();
        match scripted {
            Some(scripted) => scripted.resolve().await,
            None => {
                let rows = self.server_rows.lock().unwrap().clone();
                let total = rows.len();
                let page = rows
                    .into_iter()
                    .skip(params.page * params.page_size)
                    .take(params.page_size)
                    .collect();
                Ok(Page::new(page, total))
            }
        }
    }

    async fn create(&self, draft: &DepartmentPatch) -> Result<MutationResponse<Department>> {
        self.record(ServiceCall::Create(draft.clone()));
        let scripted = self.creates.lock().unwrap().pop_front();
        match scripted {
            Some(scripted) => scripted.resolve().await,
            None => {
                let id = 100 + self.next_id.fetch_add(1, Ordering::SeqCst);
                let entity = Department::draft(EntityId::Num(id), draft);
                self.server_rows.lock().unwrap().push(entity.clone());
                Ok(MutationResponse::ok(entity))
            }
        }
    }

    async fn update(&self, entity: &Department) -> Result<MutationResponse<Department>> {
        self.record(ServiceCall::Update(entity.clone()));
        let scripted = self.updates.lock().unwrap().pop_front();
        match scripted {
            Some(scripted) => scripted.resolve().await,
            None => Ok(MutationResponse::ok(entity.clone())),
        }
    }

    async fn delete(&self, id: &EntityId) -> Result<StatusResponse> {
        self.record(ServiceCall::Delete(id.clone()));
        let scripted = self.deletes.lock().unwrap().pop_front();
        match scripted {
            Some(scripted) => scripted.resolve().await,
            None => Ok(StatusResponse::ok()),
        }
    }
}

/// In-process push channel recording room membership.
#[derive(Default)]
pub(crate) struct FakePush {
    joined: StdMutex<Vec<String>>,
    left: Arc<StdMutex<Vec<String>>>,
    senders: StdMutex<Vec<mpsc::UnboundedSender<Department>>>,
}

impl FakePush {
    pub(crate) fn joined(&self) -> Vec<String> {
        self.joined.lock().unwrap().clone()
    }

    pub(crate) fn left(&self) -> Vec<String> {
        self.left.lock().unwrap().clone()
    }

    pub(crate) fn push(&self, entity: Department) {
        for sender in self.senders.lock().unwrap().iter() {
            let _ = sender.send(entity.clone());
        }
    }

    /// Ends every open subscription as if the connection closed.
    pub(crate) fn disconnect(&self) {
        self.senders.lock().unwrap().clear();
    }
}

#[async_trait]
impl PushChannel<Department> for FakePush {
    async fn subscribe(&self, topic: &str) -> Result<Subscription<Department>> {
        self.joined.lock().unwrap().push(topic.to_string());
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().unwrap().push(tx);
        let left = Arc::clone(&self.left);
        Ok(Subscription::new(topic, rx, move |topic: &str| {
            left.lock().unwrap().push(topic.to_string());
        }))
    }
}

pub(crate) fn table(
    service: Arc<FakeService>,
    push: Arc<FakePush>,
) -> Arc<TableOrchestrator<Department>> {
    TableOrchestrator::new_with_dependencies(
        TableOptions::for_resource::<Department>(),
        service,
        push,
        Arc::new(SequentialTempIds::new()),
    )
}

/// Table over `rows`, mounted with its first page loaded.
pub(crate) async fn mounted(
    rows: Vec<Department>,
) -> (Arc<TableOrchestrator<Department>>, Arc<FakeService>, Arc<FakePush>) {
    let service = FakeService::with_rows(rows);
    let push = Arc::new(FakePush::default());
    let table = table(Arc::clone(&service), Arc::clone(&push));
    table.mount().await;
    (table, service, push)
}

pub(crate) async fn wait_for_snapshot<F>(
    table: &TableOrchestrator<Department>,
    predicate: F,
) -> TableSnapshot<Department>
where
    F: Fn(&TableSnapshot<Department>) -> bool,
{
    for _ in 0..400 {
        let snapshot = table.snapshot().await;
        if predicate(&snapshot) {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("table never reached the expected state");
}

pub(crate) fn drain_notices(events: &mut broadcast::Receiver<TableEvent>) -> Vec<Notice> {
    let mut notices = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let TableEvent::Notice(notice) = event {
            notices.push(notice);
        }
    }
    notices
}

pub(crate) fn names(snapshot: &TableSnapshot<Department>) -> Vec<String> {
    snapshot.entities().map(|entity| entity.name.clone()).collect()
}

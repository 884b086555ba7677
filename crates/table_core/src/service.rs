//! Collaborator seams: the request/response service a table reads and writes
//! through, and the topic-scoped push channel it listens on.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{Entity, EntityId},
    protocol::{MutationResponse, Page, StatusResponse},
    query::QueryParams,
};
use tokio::sync::mpsc;

/// `Err` means the request never produced a response (network, decode);
/// a response with a failing status comes back as `Ok`.
#[async_trait]
pub trait EntityService<T: Entity>: Send + Sync {
    async fn fetch_page(&self, params: &QueryParams) -> Result<Page<T>>;
    async fn create(&self, draft: &T::Patch) -> Result<MutationResponse<T>>;
    async fn update(&self, entity: &T) -> Result<MutationResponse<T>>;
    async fn delete(&self, id: &EntityId) -> Result<StatusResponse>;
}

#[async_trait]
pub trait PushChannel<T: Entity>: Send + Sync {
    /// Joins `topic`; the room is left when the returned handle drops.
    async fn subscribe(&self, topic: &str) -> Result<Subscription<T>>;
}

pub struct MissingPushChannel;

#[async_trait]
impl<T: Entity> PushChannel<T> for MissingPushChannel {
    async fn subscribe(&self, topic: &str) -> Result<Subscription<T>> {
        Err(anyhow!("push channel is unavailable for topic {topic}"))
    }
}

type ReleaseFn = Box<dyn FnOnce(&str) + Send + Sync>;

/// Owned membership in a push room. Dropping it runs the release hook exactly
/// once, whichever way the owner exits.
pub struct Subscription<T> {
    topic: String,
    updates: mpsc::UnboundedReceiver<T>,
    release: Option<ReleaseFn>,
}

impl<T> Subscription<T> {
    pub fn new(
        topic: impl Into<String>,
        updates: mpsc::UnboundedReceiver<T>,
        release: impl FnOnce(&str) + Send + Sync + 'static,
    ) -> Self {
        Self {
            topic: topic.into(),
            updates,
            release: Some(Box::new(release)),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next pushed snapshot, or `None` once the channel side has gone away.
    pub async fn next(&mut self) -> Option<T> {
        self.updates.recv().await
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release(&self.topic);
        }
    }
}

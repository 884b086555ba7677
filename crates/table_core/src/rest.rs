use std::marker::PhantomData;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{EntityId, Resource},
    protocol::{MutationResponse, Page, StatusResponse},
    query::QueryParams,
};

use crate::service::EntityService;

/// [`EntityService`] over the collection REST API:
/// `GET|POST {base}/api/{collection}`, `PUT|DELETE {base}/api/{collection}/{id}`.
pub struct RestEntityService<T> {
    http: Client,
    server_url: String,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Resource> RestEntityService<T> {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), server_url)
    }

    pub fn with_client(http: Client, server_url: impl Into<String>) -> Self {
        Self {
            http,
            server_url: server_url.into().trim_end_matches('/').to_string(),
            _entity: PhantomData,
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/api/{}", self.server_url, T::COLLECTION)
    }

    fn entity_url(&self, id: &EntityId) -> String {
        format!("{}/{}", self.collection_url(), id)
    }
}

/// Reads `{status, data?, error?}`; a body that does not parse still yields
/// the HTTP status so the caller can classify the failure.
async fn read_status_body<B, F>(response: Response, fallback: F) -> Result<B>
where
    B: DeserializeOwned,
    F: FnOnce(u16, String) -> B,
{
    let status = response.status().as_u16();
    let text = response
        .text()
        .await
        .context("failed to read response body")?;
    Ok(serde_json::from_str(&text).unwrap_or_else(|_| fallback(status, text)))
}

#[async_trait]
impl<T> EntityService<T> for RestEntityService<T>
where
    T: Resource,
    T::Patch: Serialize,
{
    async fn fetch_page(&self, params: &QueryParams) -> Result<Page<T>> {
        let url = self.collection_url();
        let page = self
            .http
            .get(&url)
            .query(&params.to_query_pairs())
            .send()
            .await
            .with_context(|| format!("failed to fetch page from {url}"))?
            .error_for_status()?
            .json::<Page<T>>()
            .await
            .with_context(|| format!("invalid page payload from {url}"))?;
        Ok(page)
    }

    async fn create(&self, draft: &T::Patch) -> Result<MutationResponse<T>> {
        let url = self.collection_url();
        let response = self
            .http
            .post(&url)
            .json(draft)
            .send()
            .await
            .with_context(|| format!("failed to create entity at {url}"))?;
        read_status_body(response, |status, text| MutationResponse::failed(status, text)).await
    }

    async fn update(&self, entity: &T) -> Result<MutationResponse<T>> {
        let url = self.entity_url(entity.id());
        let response = self
            .http
            .put(&url)
            .json(entity)
            .send()
            .await
            .with_context(|| format!("failed to update entity at {url}"))?;
        read_status_body(response, |status, text| MutationResponse::failed(status, text)).await
    }

    async fn delete(&self, id: &EntityId) -> Result<StatusResponse> {
        let url = self.entity_url(id);
        let response = self
            .http
            .delete(&url)
            .send()
            .await
            .with_context(|| format!("failed to delete entity at {url}"))?;
        read_status_body(response, |status, text| StatusResponse::failed(status, text)).await
    }
}

#[cfg(test)]
#[path = "tests/rest_tests.rs"]
mod tests;

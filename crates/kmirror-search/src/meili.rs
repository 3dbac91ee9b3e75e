//! Typed HTTP client for a Meilisearch server.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use kmirror_core::SearchError;

use crate::backend::{
    BackendResult, IndexInfo, IndexSettings, SearchBackend, SearchRequest, SearchResponse,
    TaskHandle, TaskInfo, TaskStatus, PRIMARY_KEY,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct MeiliClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

// ── Wire types ──────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WireTask {
    uid: u64,
    status: String,
    #[serde(default)]
    error: Option<WireTaskError>,
}

#[derive(Debug, Deserialize)]
struct WireTaskError {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireHealth {
    status: String,
}

impl WireTask {
    fn into_info(self) -> TaskInfo {
        let status = match self.status.as_str() {
            "succeeded" => TaskStatus::Succeeded,
            "failed" | "canceled" => TaskStatus::Failed,
            _ => TaskStatus::Pending,
        };
        let error = match (status, self.error) {
            (TaskStatus::Failed, Some(e)) => Some(match e.code {
                Some(code) => format!("{} ({code})", e.message),
                None => e.message,
            }),
            (TaskStatus::Failed, None) => Some(format!("task {}", self.status)),
            _ => None,
        };
        TaskInfo {
            uid: self.uid,
            status,
            error,
        }
    }
}

// ── Client impl ─────────────────────────────────────

impl MeiliClient {
    /// # Errors
    ///
    /// Returns [`SearchError::Unreachable`] if the HTTP client cannot be
    /// built.
    pub fn new(base_url: &str, api_key: Option<&str>) -> BackendResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SearchError::Unreachable(format!("build http client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()).map(ToString::to_string),
            client,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{path}", self.base_url));
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> BackendResult<T> {
        let resp = builder
            .send()
            .await
            .map_err(|e| SearchError::Unreachable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SearchError::Http {
                status: status.as_u16(),
                body,
            });
        }

        resp.json::<T>()
            .await
            .map_err(|e| SearchError::Decode(e.to_string()))
    }
}

#[async_trait]
impl SearchBackend for MeiliClient {
    async fn get_index(&self, uid: &str) -> BackendResult<IndexInfo> {
        let path = format!("/indexes/{uid}");
        match self.send(self.request(Method::GET, &path)).await {
            Err(SearchError::Http { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Err(SearchError::IndexNotFound(uid.to_string()))
            }
            other => other,
        }
    }

    async fn create_index(&self, uid: &str, primary_key: &str) -> BackendResult<TaskHandle> {
        debug!(index = uid, "creating index");
        let body = json!({ "uid": uid, "primaryKey": primary_key });
        self.send(self.request(Method::POST, "/indexes").json(&body))
            .await
    }

    async fn update_settings(
        &self,
        uid: &str,
        settings: &IndexSettings,
    ) -> BackendResult<TaskHandle> {
        let path = format!("/indexes/{uid}/settings");
        self.send(self.request(Method::PATCH, &path).json(settings))
            .await
    }

    async fn add_documents(&self, uid: &str, documents: &[Value]) -> BackendResult<TaskHandle> {
        debug!(index = uid, count = documents.len(), "adding documents");
        let path = format!("/indexes/{uid}/documents");
        self.send(
            self.request(Method::POST, &path)
                .query(&[("primaryKey", PRIMARY_KEY)])
                .json(documents),
        )
        .await
    }

    async fn delete_documents(&self, uid: &str, ids: &[String]) -> BackendResult<TaskHandle> {
        debug!(index = uid, count = ids.len(), "deleting documents");
        let path = format!("/indexes/{uid}/documents/delete-batch");
        self.send(self.request(Method::POST, &path).json(ids))
            .await
    }

    async fn get_task(&self, handle: TaskHandle) -> BackendResult<TaskInfo> {
        let path = format!("/tasks/{}", handle.uid);
        let task: WireTask = self.send(self.request(Method::GET, &path)).await?;
        Ok(task.into_info())
    }

    async fn search(&self, uid: &str, request: &SearchRequest) -> BackendResult<SearchResponse> {
        let path = format!("/indexes/{uid}/search");
        self.send(self.request(Method::POST, &path).json(request))
            .await
    }

    async fn health(&self) -> BackendResult<bool> {
        let health: WireHealth = self.send(self.request(Method::GET, "/health")).await?;
        Ok(health.status == "available")
    }
}

//! Search backend contract.
//!
//! Every mutating call returns a [`TaskHandle`]; the backend applies the
//! change asynchronously and reports progress through
//! [`SearchBackend::get_task`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use kmirror_core::SearchError;

pub type BackendResult<T> = std::result::Result<T, SearchError>;

/// Primary key of every index.
pub const PRIMARY_KEY: &str = "id";

/// The four indexes kmirror maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Projects,
    Knowledge,
    Products,
    ForumPosts,
}

impl IndexKind {
    pub const ALL: [Self; 4] = [
        Self::Projects,
        Self::Knowledge,
        Self::Products,
        Self::ForumPosts,
    ];

    /// Index uid on the backend.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Projects => "projects",
            Self::Knowledge => "knowledge",
            Self::Products => "products",
            Self::ForumPosts => "forum_posts",
        }
    }

    /// Attribute settings applied when the index is created.
    #[must_use]
    pub fn settings(self) -> IndexSettings {
        match self {
            Self::Projects => settings(
                &["name", "description", "code"],
                &["status", "category", "leader_id"],
                &["created_at", "updated_at"],
            ),
            Self::Knowledge => settings(
                &["title", "content", "tags"],
                &["category_id", "status", "source", "tags"],
                &["created_at", "updated_at", "view_count"],
            ),
            Self::Products => settings(
                &["name", "description", "type"],
                &["type", "maturity", "owner_id"],
                &["created_at"],
            ),
            Self::ForumPosts => settings(
                &["title", "content", "tags"],
                &["board_id", "author_id", "is_best_answer"],
                &["created_at", "reply_count", "view_count"],
            ),
        }
    }
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for IndexKind {
    type Err = SearchError;

    fn from_str(s: &str) -> BackendResult<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| SearchError::IndexNotFound(s.to_string()))
    }
}

fn settings(searchable: &[&str], filterable: &[&str], sortable: &[&str]) -> IndexSettings {
    IndexSettings {
        searchable_attributes: owned(searchable),
        filterable_attributes: owned(filterable),
        sortable_attributes: owned(sortable),
    }
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSettings {
    pub searchable_attributes: Vec<String>,
    pub filterable_attributes: Vec<String>,
    pub sortable_attributes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexInfo {
    pub uid: String,
    #[serde(default)]
    pub primary_key: Option<String>,
}

/// Opaque reference to an enqueued backend task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskHandle {
    #[serde(rename = "taskUid")]
    pub uid: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    pub uid: u64,
    pub status: TaskStatus,
    /// Backend's failure message when `status` is `Failed`.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub q: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    /// Backend filter expression, e.g. `status = "published"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// `attribute:asc` / `attribute:desc` entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<String>,
}

impl SearchRequest {
    #[must_use]
    pub fn query(q: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub hits: Vec<Value>,
    #[serde(default)]
    pub estimated_total_hits: Option<u64>,
    #[serde(default)]
    pub processing_time_ms: u64,
    #[serde(default)]
    pub query: String,
}

/// Operations kmirror needs from a full-text search engine.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Returns [`SearchError::IndexNotFound`] when the index does not exist.
    async fn get_index(&self, uid: &str) -> BackendResult<IndexInfo>;

    async fn create_index(&self, uid: &str, primary_key: &str) -> BackendResult<TaskHandle>;

    async fn update_settings(&self, uid: &str, settings: &IndexSettings)
        -> BackendResult<TaskHandle>;

    /// Add or replace documents by primary key.
    async fn add_documents(&self, uid: &str, documents: &[Value]) -> BackendResult<TaskHandle>;

    async fn delete_documents(&self, uid: &str, ids: &[String]) -> BackendResult<TaskHandle>;

    async fn get_task(&self, handle: TaskHandle) -> BackendResult<TaskInfo>;

    async fn search(&self, uid: &str, request: &SearchRequest) -> BackendResult<SearchResponse>;

    /// `Ok(true)` when the backend reports itself available.
    async fn health(&self) -> BackendResult<bool>;
}

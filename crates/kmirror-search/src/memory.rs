//! In-memory [`SearchBackend`] for tests and offline runs.
//!
//! Mutations apply immediately and are recorded as tasks. A task can be
//! made to report `Pending` for a number of polls, or to fail, so the
//! coordinator's wait loop is exercisable without a server. Search is a
//! case-insensitive substring match over the index's searchable
//! attributes; filter and sort expressions are not supported.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use kmirror_core::SearchError;

use crate::backend::{
    BackendResult, IndexInfo, IndexSettings, SearchBackend, SearchRequest, SearchResponse,
    TaskHandle, TaskInfo, TaskStatus,
};

const DEFAULT_LIMIT: usize = 20;

#[derive(Debug, Default)]
struct MemoryIndex {
    primary_key: String,
    settings: IndexSettings,
    documents: BTreeMap<String, Value>,
}

#[derive(Debug)]
struct Task {
    pending_polls: u32,
    error: Option<String>,
}

#[derive(Default)]
struct State {
    indexes: BTreeMap<String, MemoryIndex>,
    tasks: BTreeMap<u64, Task>,
    next_uid: u64,
    pending_polls: u32,
    fail_next: Option<String>,
    healthy: bool,
}

impl State {
    fn enqueue(&mut self, outcome: std::result::Result<(), String>) -> TaskHandle {
        let uid = self.next_uid;
        self.next_uid += 1;
        let error = self.fail_next.take().or(outcome.err());
        self.tasks.insert(
            uid,
            Task {
                pending_polls: self.pending_polls,
                error,
            },
        );
        TaskHandle { uid }
    }
}

/// Backend held entirely in process memory.
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                healthy: true,
                ..State::default()
            }),
        }
    }

    /// Report every subsequently enqueued task as pending for `polls` polls.
    pub fn set_pending_polls(&self, polls: u32) {
        self.state.lock().pending_polls = polls;
    }

    /// Fail the next enqueued task with `message`.
    pub fn fail_next_task(&self, message: impl Into<String>) {
        self.state.lock().fail_next = Some(message.into());
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.state.lock().healthy = healthy;
    }

    #[must_use]
    pub fn document(&self, uid: &str, id: &str) -> Option<Value> {
        self.state
            .lock()
            .indexes
            .get(uid)
            .and_then(|index| index.documents.get(id).cloned())
    }

    #[must_use]
    pub fn document_count(&self, uid: &str) -> usize {
        self.state
            .lock()
            .indexes
            .get(uid)
            .map_or(0, |index| index.documents.len())
    }

    #[must_use]
    pub fn settings(&self, uid: &str) -> Option<IndexSettings> {
        self.state
            .lock()
            .indexes
            .get(uid)
            .map(|index| index.settings.clone())
    }

    #[must_use]
    pub fn task_count(&self) -> usize {
        self.state.lock().tasks.len()
    }
}

#[async_trait]
impl SearchBackend for MemoryBackend {
    async fn get_index(&self, uid: &str) -> BackendResult<IndexInfo> {
        let state = self.state.lock();
        let index = state
            .indexes
            .get(uid)
            .ok_or_else(|| SearchError::IndexNotFound(uid.to_string()))?;
        Ok(IndexInfo {
            uid: uid.to_string(),
            primary_key: Some(index.primary_key.clone()),
        })
    }

    async fn create_index(&self, uid: &str, primary_key: &str) -> BackendResult<TaskHandle> {
        let mut state = self.state.lock();
        let outcome = if state.indexes.contains_key(uid) {
            Err(format!("index `{uid}` already exists"))
        } else {
            state.indexes.insert(
                uid.to_string(),
                MemoryIndex {
                    primary_key: primary_key.to_string(),
                    ..MemoryIndex::default()
                },
            );
            Ok(())
        };
        Ok(state.enqueue(outcome))
    }

    async fn update_settings(
        &self,
        uid: &str,
        settings: &IndexSettings,
    ) -> BackendResult<TaskHandle> {
        let mut state = self.state.lock();
        let outcome = match state.indexes.get_mut(uid) {
            Some(index) => {
                index.settings = settings.clone();
                Ok(())
            }
            None => Err(format!("index `{uid}` not found")),
        };
        Ok(state.enqueue(outcome))
    }

    async fn add_documents(&self, uid: &str, documents: &[Value]) -> BackendResult<TaskHandle> {
        let mut state = self.state.lock();
        let outcome = match state.indexes.get_mut(uid) {
            Some(index) => documents
                .iter()
                .map(|doc| {
                    let id = doc
                        .get(&index.primary_key)
                        .and_then(Value::as_str)
                        .ok_or_else(|| format!("document without `{}`", index.primary_key))?;
                    index.documents.insert(id.to_string(), doc.clone());
                    Ok(())
                })
                .collect::<std::result::Result<(), String>>(),
            None => Err(format!("index `{uid}` not found")),
        };
        Ok(state.enqueue(outcome))
    }

    async fn delete_documents(&self, uid: &str, ids: &[String]) -> BackendResult<TaskHandle> {
        let mut state = self.state.lock();
        let outcome = match state.indexes.get_mut(uid) {
            Some(index) => {
                for id in ids {
                    index.documents.remove(id);
                }
                Ok(())
            }
            None => Err(format!("index `{uid}` not found")),
        };
        Ok(state.enqueue(outcome))
    }

    async fn get_task(&self, handle: TaskHandle) -> BackendResult<TaskInfo> {
        let mut state = self.state.lock();
        let task = state.tasks.get_mut(&handle.uid).ok_or(SearchError::Http {
            status: 404,
            body: format!("task {} not found", handle.uid),
        })?;
        let status = if task.pending_polls > 0 {
            task.pending_polls -= 1;
            TaskStatus::Pending
        } else if task.error.is_some() {
            TaskStatus::Failed
        } else {
            TaskStatus::Succeeded
        };
        Ok(TaskInfo {
            uid: handle.uid,
            status,
            error: task.error.clone().filter(|_| status == TaskStatus::Failed),
        })
    }

    async fn search(&self, uid: &str, request: &SearchRequest) -> BackendResult<SearchResponse> {
        if request.filter.is_some() || !request.sort.is_empty() {
            return Err(SearchError::Unsupported(
                "filter and sort expressions".to_string(),
            ));
        }
        let state = self.state.lock();
        let index = state
            .indexes
            .get(uid)
            .ok_or_else(|| SearchError::IndexNotFound(uid.to_string()))?;

        let needle = request.q.to_lowercase();
        let matches: Vec<&Value> = index
            .documents
            .values()
            .filter(|doc| {
                needle.is_empty()
                    || index
                        .settings
                        .searchable_attributes
                        .iter()
                        .filter_map(|attr| doc.get(attr))
                        .any(|value| value_text(value).to_lowercase().contains(&needle))
            })
            .collect();

        let total = matches.len() as u64;
        let hits = matches
            .into_iter()
            .skip(request.offset.unwrap_or(0))
            .take(request.limit.unwrap_or(DEFAULT_LIMIT))
            .cloned()
            .collect();
        Ok(SearchResponse {
            hits,
            estimated_total_hits: Some(total),
            processing_time_ms: 0,
            query: request.q.clone(),
        })
    }

    async fn health(&self) -> BackendResult<bool> {
        Ok(self.state.lock().healthy)
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(value_text).collect::<Vec<_>>().join(" "),
        other => other.to_string(),
    }
}

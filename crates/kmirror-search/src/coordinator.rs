//! Index initialization and task-synchronized mutations.
//!
//! Every mutating backend call returns a task handle. The coordinator polls
//! the task until it reaches a terminal status, so a call that returns `Ok`
//! means the change is visible to searches.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info};

use kmirror_core::{CancelToken, SearchError};

use crate::backend::{
    BackendResult, IndexKind, SearchBackend, SearchRequest, SearchResponse, TaskHandle,
    TaskStatus, PRIMARY_KEY,
};

/// Lower bound on the interval between task polls.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The kind of mutation a task performs; selects its timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    CreateIndex,
    UpdateSettings,
    AddDocuments,
    DeleteDocuments,
}

/// Per-kind ceilings on how long a task may stay pending, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskTimeouts {
    pub create_index: u64,
    pub update_settings: u64,
    pub add_documents: u64,
    pub delete_documents: u64,
}

impl Default for TaskTimeouts {
    fn default() -> Self {
        Self {
            create_index: 30,
            update_settings: 30,
            add_documents: 120,
            delete_documents: 60,
        }
    }
}

impl TaskTimeouts {
    #[must_use]
    pub fn for_kind(&self, kind: TaskKind) -> Duration {
        let secs = match kind {
            TaskKind::CreateIndex => self.create_index,
            TaskKind::UpdateSettings => self.update_settings,
            TaskKind::AddDocuments => self.add_documents,
            TaskKind::DeleteDocuments => self.delete_documents,
        };
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    poll_interval: Duration,
    pub timeouts: TaskTimeouts,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: MIN_POLL_INTERVAL,
            timeouts: TaskTimeouts::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Intervals below [`MIN_POLL_INTERVAL`] are raised to it.
    #[must_use]
    pub fn new(poll_interval: Duration, timeouts: TaskTimeouts) -> Self {
        Self {
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
            timeouts,
        }
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

pub struct SearchCoordinator<B: SearchBackend + ?Sized> {
    backend: Arc<B>,
    config: CoordinatorConfig,
    cancel: CancelToken,
}

impl<B: SearchBackend + ?Sized> Clone for SearchCoordinator<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            config: self.config,
            cancel: self.cancel.clone(),
        }
    }
}

impl<B: SearchBackend + ?Sized> SearchCoordinator<B> {
    #[must_use]
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            config: CoordinatorConfig::default(),
            cancel: CancelToken::new(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Checked between poll attempts of every wait.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    #[must_use]
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    // === Initialization ===

    /// Create any of the four indexes that does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns the first backend or task error; indexes created before it
    /// stay created.
    pub async fn initialize_indexes(&self) -> BackendResult<Vec<IndexKind>> {
        let mut created = Vec::new();
        for kind in IndexKind::ALL {
            if self.ensure_index(kind).await? {
                created.push(kind);
            }
        }
        Ok(created)
    }

    /// Create `kind`'s index and apply its settings unless `get_index`
    /// already succeeds. Returns whether the index was created.
    ///
    /// # Errors
    ///
    /// Returns a backend error, [`SearchError::TaskFailed`],
    /// [`SearchError::Timeout`], or [`SearchError::Cancelled`].
    pub async fn ensure_index(&self, kind: IndexKind) -> BackendResult<bool> {
        let uid = kind.name();
        if self.backend.get_index(uid).await.is_ok() {
            debug!(index = uid, "index exists");
            return Ok(false);
        }

        let handle = self.backend.create_index(uid, PRIMARY_KEY).await?;
        self.wait_for_task(handle, TaskKind::CreateIndex).await?;

        let handle = self.backend.update_settings(uid, &kind.settings()).await?;
        self.wait_for_task(handle, TaskKind::UpdateSettings).await?;

        info!(index = uid, "created index");
        Ok(true)
    }

    // === Task synchronization ===

    /// Poll `handle` until it succeeds or fails.
    ///
    /// # Errors
    ///
    /// - [`SearchError::TaskFailed`] with the backend's message
    /// - [`SearchError::Timeout`] once the kind's ceiling has elapsed
    /// - [`SearchError::Cancelled`] if the cancel token is set between polls
    pub async fn wait_for_task(&self, handle: TaskHandle, kind: TaskKind) -> BackendResult<()> {
        let timeout = self.config.timeouts.for_kind(kind);
        let started = Instant::now();

        loop {
            if self.cancel.is_cancelled() {
                return Err(SearchError::Cancelled(handle.uid));
            }

            let task = self.backend.get_task(handle).await?;
            match task.status {
                TaskStatus::Succeeded => {
                    debug!(task_uid = handle.uid, ?kind, "task succeeded");
                    return Ok(());
                }
                TaskStatus::Failed => {
                    return Err(SearchError::TaskFailed {
                        task_uid: handle.uid,
                        message: task.error.unwrap_or_else(|| "unknown error".to_string()),
                    });
                }
                TaskStatus::Pending => {}
            }

            let waited = started.elapsed();
            if waited >= timeout {
                return Err(SearchError::Timeout {
                    task_uid: handle.uid,
                    waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                });
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    // === Documents ===

    /// Add or replace `documents` and wait for the backend to apply them.
    /// An empty batch is a no-op.
    ///
    /// # Errors
    ///
    /// See [`Self::wait_for_task`].
    pub async fn add_documents(&self, kind: IndexKind, documents: &[Value]) -> BackendResult<()> {
        if documents.is_empty() {
            return Ok(());
        }
        let handle = self.backend.add_documents(kind.name(), documents).await?;
        self.wait_for_task(handle, TaskKind::AddDocuments).await
    }

    /// # Errors
    ///
    /// See [`Self::wait_for_task`].
    pub async fn delete_documents(&self, kind: IndexKind, ids: &[String]) -> BackendResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let handle = self.backend.delete_documents(kind.name(), ids).await?;
        self.wait_for_task(handle, TaskKind::DeleteDocuments).await
    }

    // === Queries ===

    /// # Errors
    ///
    /// Returns the backend error unchanged.
    pub async fn search(
        &self,
        kind: IndexKind,
        request: &SearchRequest,
    ) -> BackendResult<SearchResponse> {
        self.backend.search(kind.name(), request).await
    }

    /// # Errors
    ///
    /// Returns the backend error unchanged.
    pub async fn health(&self) -> BackendResult<bool> {
        self.backend.health().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use serde_json::json;

    fn coordinator(backend: &Arc<MemoryBackend>) -> SearchCoordinator<MemoryBackend> {
        SearchCoordinator::new(Arc::clone(backend))
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_creates_all_four_indexes_with_settings() {
        let backend = Arc::new(MemoryBackend::new());
        let created = coordinator(&backend).initialize_indexes().await.unwrap();

        assert_eq!(created, IndexKind::ALL.to_vec());
        for kind in IndexKind::ALL {
            assert_eq!(backend.settings(kind.name()), Some(kind.settings()));
        }
        assert_eq!(backend.task_count(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_is_a_noop_for_existing_indexes() {
        let backend = Arc::new(MemoryBackend::new());
        let coordinator = coordinator(&backend);
        coordinator.initialize_indexes().await.unwrap();

        let created = coordinator.initialize_indexes().await.unwrap();
        assert!(created.is_empty());
        assert_eq!(backend.task_count(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_through_pending_polls() {
        let backend = Arc::new(MemoryBackend::new());
        let coordinator = coordinator(&backend);
        coordinator.initialize_indexes().await.unwrap();

        backend.set_pending_polls(3);
        let started = Instant::now();
        coordinator
            .add_documents(IndexKind::Knowledge, &[json!({"id": "k1", "title": "t"})])
            .await
            .unwrap();

        assert!(started.elapsed() >= MIN_POLL_INTERVAL * 3);
        assert!(backend.document("knowledge", "k1").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_task_surfaces_backend_message() {
        let backend = Arc::new(MemoryBackend::new());
        let coordinator = coordinator(&backend);
        coordinator.initialize_indexes().await.unwrap();

        backend.fail_next_task("invalid_document_id");
        let err = coordinator
            .add_documents(IndexKind::Products, &[json!({"id": "p"})])
            .await
            .unwrap_err();
        assert!(
            matches!(err, SearchError::TaskFailed { ref message, .. } if message == "invalid_document_id")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn pending_task_times_out() {
        let backend = Arc::new(MemoryBackend::new());
        let timeouts = TaskTimeouts {
            create_index: 1,
            ..TaskTimeouts::default()
        };
        let coordinator = coordinator(&backend)
            .with_config(CoordinatorConfig::new(Duration::from_millis(250), timeouts));

        backend.set_pending_polls(u32::MAX);
        let err = coordinator
            .ensure_index(IndexKind::Projects)
            .await
            .unwrap_err();
        match err {
            SearchError::Timeout { waited_ms, .. } => assert!(waited_ms >= 1000),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_is_checked_between_polls() {
        let backend = Arc::new(MemoryBackend::new());
        let cancel = CancelToken::new();
        let coordinator = coordinator(&backend).with_cancel(cancel.clone());

        backend.set_pending_polls(u32::MAX);
        let handle = backend.create_index("projects", "id").await.unwrap();

        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .wait_for_task(handle, TaskKind::CreateIndex)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(350)).await;
        cancel.cancel();

        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, SearchError::Cancelled(uid) if uid == handle.uid));
    }

    #[test]
    fn poll_interval_is_bounded_below() {
        let config = CoordinatorConfig::new(Duration::from_millis(5), TaskTimeouts::default());
        assert_eq!(config.poll_interval(), MIN_POLL_INTERVAL);
        assert_eq!(
            TaskTimeouts::default().for_kind(TaskKind::AddDocuments),
            Duration::from_secs(120)
        );
    }

    #[tokio::test]
    async fn empty_batches_do_not_touch_the_backend() {
        let backend = Arc::new(MemoryBackend::new());
        let coordinator = coordinator(&backend);
        coordinator
            .add_documents(IndexKind::Knowledge, &[])
            .await
            .unwrap();
        coordinator
            .delete_documents(IndexKind::Knowledge, &[])
            .await
            .unwrap();
        assert_eq!(backend.task_count(), 0);
    }
}

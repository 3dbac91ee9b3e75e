//! # kmirror-search
//!
//! Full-text search indexing for platform entities.
//!
//! - [`documents`]: flat per-kind projections with resolved reference names
//! - [`SearchBackend`]: task-based backend contract, implemented by
//!   [`MeiliClient`] (HTTP) and [`MemoryBackend`] (in process)
//! - [`SearchCoordinator`]: index initialization and task polling with
//!   per-kind timeouts and cancellation
//! - [`Indexer`]: single-entity and bulk indexing from a [`kmirror_store::CatalogStore`]

pub mod backend;
pub mod coordinator;
pub mod documents;
pub mod indexer;
pub mod meili;
pub mod memory;

pub use backend::{
    IndexKind, IndexSettings, SearchBackend, SearchRequest, SearchResponse, TaskHandle, TaskInfo,
    TaskStatus,
};
pub use coordinator::{CoordinatorConfig, SearchCoordinator, TaskKind, TaskTimeouts};
pub use documents::{clean_markdown, Projection};
pub use indexer::{Indexer, RebuildStats};
pub use meili::MeiliClient;
pub use memory::MemoryBackend;

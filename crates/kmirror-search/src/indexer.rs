//! Projects store entities into documents and pushes them through the
//! coordinator.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use kmirror_core::{KmError, Result};
use kmirror_store::{CatalogStore, KnowledgeFilter};

use crate::backend::{IndexKind, SearchBackend};
use crate::coordinator::SearchCoordinator;
use crate::documents::Projection;

/// Document counts pushed by [`Indexer::rebuild_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RebuildStats {
    pub projects: usize,
    pub knowledge: usize,
    pub products: usize,
    pub forum_posts: usize,
}

pub struct Indexer<S: CatalogStore + ?Sized, B: SearchBackend + ?Sized> {
    store: Arc<S>,
    coordinator: SearchCoordinator<B>,
}

impl<S: CatalogStore + ?Sized, B: SearchBackend + ?Sized> Indexer<S, B> {
    #[must_use]
    pub fn new(store: Arc<S>, coordinator: SearchCoordinator<B>) -> Self {
        Self { store, coordinator }
    }

    #[must_use]
    pub fn coordinator(&self) -> &SearchCoordinator<B> {
        &self.coordinator
    }

    /// Index (or re-index) one entity.
    ///
    /// # Errors
    ///
    /// Returns [`KmError::Search`] if the backend rejects the document.
    pub async fn index<P: Projection>(&self, entity: &P) -> Result<()> {
        let document = self.document(entity)?;
        self.coordinator.add_documents(P::KIND, &[document]).await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`KmError::Search`] if the backend rejects the deletion.
    pub async fn delete(&self, kind: IndexKind, id: &str) -> Result<()> {
        self.coordinator
            .delete_documents(kind, &[id.to_string()])
            .await?;
        Ok(())
    }

    // === Bulk ===

    /// # Errors
    ///
    /// Returns a store or search error.
    pub async fn index_all_projects(&self) -> Result<usize> {
        let projects = self.store.list_projects()?;
        self.index_batch(&projects).await
    }

    /// # Errors
    ///
    /// Returns a store or search error.
    pub async fn index_all_knowledge(&self) -> Result<usize> {
        let entries = self.store.list_knowledge(&KnowledgeFilter::default())?;
        self.index_batch(&entries).await
    }

    /// # Errors
    ///
    /// Returns a store or search error.
    pub async fn index_all_products(&self) -> Result<usize> {
        let products = self.store.list_products()?;
        self.index_batch(&products).await
    }

    /// # Errors
    ///
    /// Returns a store or search error.
    pub async fn index_all_forum_posts(&self) -> Result<usize> {
        let posts = self.store.list_forum_posts()?;
        self.index_batch(&posts).await
    }

    /// Re-push every entity of every kind, the four kinds concurrently.
    ///
    /// # Errors
    ///
    /// Returns the first error; other kinds may have been pushed already.
    pub async fn rebuild_all(&self) -> Result<RebuildStats> {
        let (projects, knowledge, products, forum_posts) = tokio::try_join!(
            self.index_all_projects(),
            self.index_all_knowledge(),
            self.index_all_products(),
            self.index_all_forum_posts(),
        )?;
        let stats = RebuildStats {
            projects,
            knowledge,
            products,
            forum_posts,
        };
        info!(?stats, "rebuilt search indexes");
        Ok(stats)
    }

    async fn index_batch<P: Projection>(&self, entities: &[P]) -> Result<usize> {
        let documents = entities
            .iter()
            .map(|entity| self.document(entity))
            .collect::<Result<Vec<_>>>()?;
        self.coordinator.add_documents(P::KIND, &documents).await?;
        info!(index = P::KIND.name(), count = documents.len(), "indexed");
        Ok(documents.len())
    }

    fn document<P: Projection>(&self, entity: &P) -> Result<Value> {
        serde_json::to_value(entity.project(self.store.as_ref())).map_err(|e| {
            KmError::Serialization(format!("{} {}: {e}", P::KIND, entity.id()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use kmirror_core::model::{ForumPost, Knowledge, KnowledgeStatus, Product, Project, User};
    use kmirror_core::SearchError;
    use kmirror_store::{KnowledgeStore, MemoryStore};

    use crate::memory::MemoryBackend;

    fn at() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .put_user(&User {
                id: "u1".into(),
                username: "grace".into(),
                display_name: "Grace Hopper".into(),
            })
            .unwrap();
        store
            .put_project(&Project {
                id: "p1".into(),
                code: "NAV".into(),
                name: "Navigator".into(),
                description: Some("inertial nav".into()),
                category: "software".into(),
                status: "active".into(),
                leader_id: Some("u1".into()),
                created_at: at(),
                updated_at: at(),
            })
            .unwrap();
        store
            .put_product(&Product {
                id: "pr1".into(),
                name: "Compiler".into(),
                description: "A-0".into(),
                product_type: "software".into(),
                maturity: "released".into(),
                owner_id: "u1".into(),
                trl: "9".into(),
                version: "1.0".into(),
                created_at: at(),
                updated_at: at(),
            })
            .unwrap();
        store
            .put_forum_post(&ForumPost {
                id: "f1".into(),
                board_id: "b-missing".into(),
                title: "Bug found".into(),
                content: "a moth".into(),
                author_id: "u1".into(),
                tags: vec![],
                reply_count: 0,
                view_count: 1,
                is_pinned: false,
                is_best_answer: false,
                created_at: at(),
                updated_at: at(),
            })
            .unwrap();
        for id in ["k1", "k2"] {
            store
                .insert_knowledge(&Knowledge {
                    id: id.into(),
                    title: format!("Note {id}"),
                    content: "**body**".into(),
                    category_id: "c1".into(),
                    author_id: "u1".into(),
                    source: "platform".into(),
                    source_id: String::new(),
                    status: KnowledgeStatus::Draft,
                    version: 1,
                    view_count: 0,
                    created_at: at(),
                    updated_at: at(),
                })
                .unwrap();
        }
        store
    }

    async fn indexer() -> (Indexer<MemoryStore, MemoryBackend>, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let coordinator = SearchCoordinator::new(Arc::clone(&backend));
        coordinator.initialize_indexes().await.unwrap();
        (
            Indexer::new(Arc::new(seeded_store()), coordinator),
            backend,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn rebuild_pushes_every_kind() {
        let (indexer, backend) = indexer().await;
        let stats = indexer.rebuild_all().await.unwrap();

        assert_eq!(
            stats,
            RebuildStats {
                projects: 1,
                knowledge: 2,
                products: 1,
                forum_posts: 1,
            }
        );
        let project = backend.document("projects", "p1").unwrap();
        assert_eq!(project["leader_name"], "Grace Hopper");
        let post = backend.document("forum_posts", "f1").unwrap();
        assert_eq!(post["board_name"], "");
        let note = backend.document("knowledge", "k1").unwrap();
        assert_eq!(note["content"], "body");
    }

    #[tokio::test(start_paused = true)]
    async fn single_entity_index_and_delete() {
        let (indexer, backend) = indexer().await;
        let entry = indexer.store.get_knowledge("k2").unwrap().unwrap();

        indexer.index(&entry).await.unwrap();
        assert_eq!(backend.document_count("knowledge"), 1);

        indexer.delete(IndexKind::Knowledge, "k2").await.unwrap();
        assert_eq!(backend.document_count("knowledge"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn backend_failure_surfaces_as_search_error() {
        let (indexer, backend) = indexer().await;
        backend.fail_next_task("index_not_accessible");

        let err = indexer.index_all_products().await.unwrap_err();
        assert!(matches!(
            err,
            KmError::Search(SearchError::TaskFailed { .. })
        ));
    }
}

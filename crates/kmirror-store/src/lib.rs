//! # kmirror-store
//!
//! The relational store of record, seen through the operations the sync
//! engine and the indexer need:
//! - [`KnowledgeStore`]: vault mappings, knowledge rows keyed by sync key,
//!   and many-to-many tag associations with get-or-create tag names
//! - [`CatalogStore`]: the users, categories, boards, projects, products,
//!   and forum posts that search projections resolve against
//!
//! Two implementations ship here: [`SqliteStore`] (rusqlite, the default
//! for the CLI) and [`MemoryStore`] (tests and dry runs).

pub mod memory;
pub mod sqlite;

use chrono::{DateTime, Utc};
use tracing::warn;

use kmirror_core::model::{
    Category, ForumBoard, ForumPost, Knowledge, KnowledgeStatus, Product, Project, Tag, User,
    VaultMapping,
};
use kmirror_core::Result;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Equality predicates for [`KnowledgeStore::list_knowledge`]. `None`
/// fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnowledgeFilter {
    pub category_id: Option<String>,
    pub source: Option<String>,
    pub status: Option<KnowledgeStatus>,
}

impl KnowledgeFilter {
    /// Rows mirrored from the vault bound to `category_id`.
    #[must_use]
    pub fn vault(category_id: &str, source: &str) -> Self {
        Self {
            category_id: Some(category_id.to_string()),
            source: Some(source.to_string()),
            status: None,
        }
    }

    #[must_use]
    pub fn matches(&self, entry: &Knowledge) -> bool {
        self.category_id
            .as_deref()
            .is_none_or(|c| c == entry.category_id)
            && self.source.as_deref().is_none_or(|s| s == entry.source)
            && self.status.is_none_or(|s| s == entry.status)
    }
}

/// Store operations used by the sync engine.
///
/// Implementations must enforce that `(source, source_id)` is unique among
/// rows with a non-empty `source_id`.
pub trait KnowledgeStore: Send + Sync {
    // === Vault mappings ===

    /// # Errors
    ///
    /// Returns [`kmirror_core::KmError::Store`] on backend failure.
    fn get_vault_mapping(&self, id: &str) -> Result<Option<VaultMapping>>;

    /// Insert or replace a mapping by id.
    ///
    /// # Errors
    ///
    /// Returns [`kmirror_core::KmError::Store`] on backend failure.
    fn save_vault_mapping(&self, mapping: &VaultMapping) -> Result<()>;

    /// # Errors
    ///
    /// Returns [`kmirror_core::KmError::Store`] on backend failure.
    fn list_vault_mappings(&self) -> Result<Vec<VaultMapping>>;

    /// Returns `true` if a mapping was removed.
    ///
    /// # Errors
    ///
    /// Returns [`kmirror_core::KmError::Store`] on backend failure.
    fn delete_vault_mapping(&self, id: &str) -> Result<bool>;

    /// Persist the time of the latest sync run.
    ///
    /// # Errors
    ///
    /// Returns [`kmirror_core::KmError::VaultNotFound`] if the mapping is
    /// gone, [`kmirror_core::KmError::Store`] on backend failure.
    fn record_sync(&self, mapping_id: &str, at: DateTime<Utc>) -> Result<()>;

    // === Knowledge ===

    /// Rows matching `filter`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`kmirror_core::KmError::Store`] on backend failure.
    fn list_knowledge(&self, filter: &KnowledgeFilter) -> Result<Vec<Knowledge>>;

    /// # Errors
    ///
    /// Returns [`kmirror_core::KmError::Store`] on backend failure.
    fn get_knowledge(&self, id: &str) -> Result<Option<Knowledge>>;

    /// Look up a row by sync key.
    ///
    /// # Errors
    ///
    /// Returns [`kmirror_core::KmError::Store`] on backend failure.
    fn find_knowledge_by_source(&self, source: &str, source_id: &str)
        -> Result<Option<Knowledge>>;

    /// # Errors
    ///
    /// Returns [`kmirror_core::KmError::Store`] if the id or sync key is
    /// already taken.
    fn insert_knowledge(&self, entry: &Knowledge) -> Result<()>;

    /// Overwrite every field of the row with `entry.id`.
    ///
    /// # Errors
    ///
    /// Returns [`kmirror_core::KmError::Store`] if the row does not exist or
    /// the new sync key collides with another row.
    fn update_knowledge(&self, entry: &Knowledge) -> Result<()>;

    // === Tags ===

    /// Remove every tag association of an entry. Tag rows stay.
    ///
    /// # Errors
    ///
    /// Returns [`kmirror_core::KmError::Store`] on backend failure.
    fn clear_tags(&self, knowledge_id: &str) -> Result<()>;

    /// Return the tag named `name`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`kmirror_core::KmError::Store`] on backend failure.
    fn first_or_create_tag(&self, name: &str) -> Result<Tag>;

    /// Associate a tag with an entry. Associating twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`kmirror_core::KmError::Store`] if either side is missing.
    fn append_tag(&self, knowledge_id: &str, tag_id: &str) -> Result<()>;

    /// Tags of an entry in association order.
    ///
    /// # Errors
    ///
    /// Returns [`kmirror_core::KmError::Store`] on backend failure.
    fn find_tags(&self, knowledge_id: &str) -> Result<Vec<Tag>>;

    /// Replace the tag set of an entry with `names`.
    ///
    /// Clearing failures propagate; a failure on an individual tag is logged
    /// and skipped so the remaining tags still attach.
    ///
    /// # Errors
    ///
    /// Returns [`kmirror_core::KmError::Store`] if the existing
    /// associations cannot be cleared.
    fn replace_tags(&self, knowledge_id: &str, names: &[String]) -> Result<()> {
        self.clear_tags(knowledge_id)?;
        for name in names {
            let attached = self
                .first_or_create_tag(name)
                .and_then(|tag| self.append_tag(knowledge_id, &tag.id));
            if let Err(e) = attached {
                warn!(knowledge_id, tag = %name, error = %e, "skipping tag");
            }
        }
        Ok(())
    }

    /// Tag names of an entry in association order.
    ///
    /// # Errors
    ///
    /// Returns [`kmirror_core::KmError::Store`] on backend failure.
    fn tag_names(&self, knowledge_id: &str) -> Result<Vec<String>> {
        Ok(self
            .find_tags(knowledge_id)?
            .into_iter()
            .map(|tag| tag.name)
            .collect())
    }
}

/// Read and write access to the entities projected into search indexes.
pub trait CatalogStore: KnowledgeStore {
    /// # Errors
    ///
    /// Returns [`kmirror_core::KmError::Store`] on backend failure.
    fn get_user(&self, id: &str) -> Result<Option<User>>;

    /// # Errors
    ///
    /// Returns [`kmirror_core::KmError::Store`] on backend failure.
    fn get_category(&self, id: &str) -> Result<Option<Category>>;

    /// # Errors
    ///
    /// Returns [`kmirror_core::KmError::Store`] on backend failure.
    fn get_forum_board(&self, id: &str) -> Result<Option<ForumBoard>>;

    /// # Errors
    ///
    /// Returns [`kmirror_core::KmError::Store`] on backend failure.
    fn list_projects(&self) -> Result<Vec<Project>>;

    /// # Errors
    ///
    /// Returns [`kmirror_core::KmError::Store`] on backend failure.
    fn list_products(&self) -> Result<Vec<Product>>;

    /// # Errors
    ///
    /// Returns [`kmirror_core::KmError::Store`] on backend failure.
    fn list_forum_posts(&self) -> Result<Vec<ForumPost>>;

    // === Upserts (insert or replace by id) ===

    /// # Errors
    ///
    /// Returns [`kmirror_core::KmError::Store`] on backend failure.
    fn put_user(&self, user: &User) -> Result<()>;

    /// # Errors
    ///
    /// Returns [`kmirror_core::KmError::Store`] on backend failure.
    fn put_category(&self, category: &Category) -> Result<()>;

    /// # Errors
    ///
    /// Returns [`kmirror_core::KmError::Store`] on backend failure.
    fn put_forum_board(&self, board: &ForumBoard) -> Result<()>;

    /// # Errors
    ///
    /// Returns [`kmirror_core::KmError::Store`] on backend failure.
    fn put_project(&self, project: &Project) -> Result<()>;

    /// # Errors
    ///
    /// Returns [`kmirror_core::KmError::Store`] on backend failure.
    fn put_product(&self, product: &Product) -> Result<()>;

    /// # Errors
    ///
    /// Returns [`kmirror_core::KmError::Store`] on backend failure.
    fn put_forum_post(&self, post: &ForumPost) -> Result<()>;
}

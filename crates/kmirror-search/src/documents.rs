//! Flat, denormalized documents pushed to the search backend.
//!
//! Each entity kind projects into one document shape. Names of referenced
//! entities (author, leader, owner, category, board) are resolved by single
//! lookups against the store; a failed or empty lookup leaves the name
//! empty. Timestamps use `YYYY-MM-DDTHH:MM:SSZ`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use kmirror_core::model::{ForumPost, Knowledge, Product, Project, User};
use kmirror_core::time::index_timestamp;
use kmirror_store::CatalogStore;

use crate::backend::IndexKind;

/// An entity that can be indexed.
pub trait Projection {
    const KIND: IndexKind;
    type Document: Serialize;

    /// Primary key of the entity and of its document.
    fn id(&self) -> &str;

    fn project<S: CatalogStore + ?Sized>(&self, store: &S) -> Self::Document;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexableProject {
    pub id: String,
    pub name: String,
    pub code: String,
    pub description: String,
    pub status: String,
    pub category: String,
    pub leader_id: String,
    pub leader_name: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexableKnowledge {
    pub id: String,
    pub title: String,
    pub content: String,
    pub category_id: String,
    pub category_name: String,
    pub author_id: String,
    pub author_name: String,
    pub tags: Vec<String>,
    pub status: String,
    pub source: String,
    pub view_count: i64,
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexableProduct {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub product_type: String,
    pub maturity: String,
    pub owner_id: String,
    pub owner_name: String,
    pub trl: String,
    pub version: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexableForumPost {
    pub id: String,
    pub title: String,
    pub content: String,
    pub board_id: String,
    pub board_name: String,
    pub author_id: String,
    pub author_name: String,
    pub tags: Vec<String>,
    pub reply_count: i64,
    pub view_count: i64,
    pub is_pinned: bool,
    pub is_best_answer: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Projection for Project {
    const KIND: IndexKind = IndexKind::Projects;
    type Document = IndexableProject;

    fn id(&self) -> &str {
        &self.id
    }

    fn project<S: CatalogStore + ?Sized>(&self, store: &S) -> IndexableProject {
        let leader_id = self.leader_id.clone().unwrap_or_default();
        IndexableProject {
            id: self.id.clone(),
            name: self.name.clone(),
            code: self.code.clone(),
            description: self.description.clone().unwrap_or_default(),
            status: self.status.clone(),
            category: self.category.clone(),
            leader_name: display_name(store, &leader_id),
            leader_id,
            created_at: index_timestamp(self.created_at),
            updated_at: index_timestamp(self.updated_at),
        }
    }
}

impl Projection for Knowledge {
    const KIND: IndexKind = IndexKind::Knowledge;
    type Document = IndexableKnowledge;

    fn id(&self) -> &str {
        &self.id
    }

    fn project<S: CatalogStore + ?Sized>(&self, store: &S) -> IndexableKnowledge {
        let category_name = lookup(&self.category_id, |id| store.get_category(id))
            .map(|c| c.name)
            .unwrap_or_default();
        let tags = store.tag_names(&self.id).unwrap_or_else(|e| {
            debug!(id = %self.id, error = %e, "tag lookup failed");
            Vec::new()
        });
        IndexableKnowledge {
            id: self.id.clone(),
            title: self.title.clone(),
            content: clean_markdown(&self.content),
            category_id: self.category_id.clone(),
            category_name,
            author_id: self.author_id.clone(),
            author_name: display_name(store, &self.author_id),
            tags,
            status: self.status.as_str().to_string(),
            source: self.source.clone(),
            view_count: self.view_count,
            version: self.version,
            created_at: index_timestamp(self.created_at),
            updated_at: index_timestamp(self.updated_at),
        }
    }
}

impl Projection for Product {
    const KIND: IndexKind = IndexKind::Products;
    type Document = IndexableProduct;

    fn id(&self) -> &str {
        &self.id
    }

    fn project<S: CatalogStore + ?Sized>(&self, store: &S) -> IndexableProduct {
        IndexableProduct {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            product_type: self.product_type.clone(),
            maturity: self.maturity.clone(),
            owner_id: self.owner_id.clone(),
            owner_name: display_name(store, &self.owner_id),
            trl: self.trl.clone(),
            version: self.version.clone(),
            created_at: index_timestamp(self.created_at),
            updated_at: index_timestamp(self.updated_at),
        }
    }
}

impl Projection for ForumPost {
    const KIND: IndexKind = IndexKind::ForumPosts;
    type Document = IndexableForumPost;

    fn id(&self) -> &str {
        &self.id
    }

    fn project<S: CatalogStore + ?Sized>(&self, store: &S) -> IndexableForumPost {
        let board_name = lookup(&self.board_id, |id| store.get_forum_board(id))
            .map(|b| b.name)
            .unwrap_or_default();
        IndexableForumPost {
            id: self.id.clone(),
            title: self.title.clone(),
            content: self.content.clone(),
            board_id: self.board_id.clone(),
            board_name,
            author_id: self.author_id.clone(),
            author_name: display_name(store, &self.author_id),
            tags: self.tags.clone(),
            reply_count: self.reply_count,
            view_count: self.view_count,
            is_pinned: self.is_pinned,
            is_best_answer: self.is_best_answer,
            created_at: index_timestamp(self.created_at),
            updated_at: index_timestamp(self.updated_at),
        }
    }
}

/// Strip markdown syntax for lexical search.
///
/// Wiki-link openers, `]`, `#`, `*`, and `_` become spaces; whitespace runs
/// collapse to one space. Not a renderer.
#[must_use]
pub fn clean_markdown(content: &str) -> String {
    let stripped = ["[[", "]", "#", "**", "*", "__", "_"]
        .iter()
        .fold(content.to_string(), |text, marker| text.replace(marker, " "));
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn display_name<S: CatalogStore + ?Sized>(store: &S, user_id: &str) -> String {
    lookup(user_id, |id| store.get_user(id))
        .map(|u: User| u.display_name)
        .unwrap_or_default()
}

/// Single-key fetch that treats empty ids, misses, and errors alike.
fn lookup<T>(id: &str, fetch: impl FnOnce(&str) -> kmirror_core::Result<Option<T>>) -> Option<T> {
    if id.is_empty() {
        return None;
    }
    match fetch(id) {
        Ok(found) => found,
        Err(e) => {
            debug!(id, error = %e, "reference lookup failed");
            None
        }
    }
}

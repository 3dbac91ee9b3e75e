//! In-memory store for tests and dry runs.
//!
//! Every table is a map behind one `parking_lot::RwLock`, so a single
//! operation observes and mutates a consistent state.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use kmirror_core::id::generate_id;
use kmirror_core::model::{
    Category, ForumBoard, ForumPost, Knowledge, Product, Project, Tag, User, VaultMapping,
};
use kmirror_core::{KmError, Result};

use crate::{CatalogStore, KnowledgeFilter, KnowledgeStore};

#[derive(Default)]
struct State {
    mappings: BTreeMap<String, VaultMapping>,
    knowledge: BTreeMap<String, Knowledge>,
    tags: BTreeMap<String, Tag>,
    tag_by_name: HashMap<String, String>,
    associations: HashMap<String, Vec<String>>,
    users: BTreeMap<String, User>,
    categories: BTreeMap<String, Category>,
    boards: BTreeMap<String, ForumBoard>,
    projects: BTreeMap<String, Project>,
    products: BTreeMap<String, Product>,
    posts: BTreeMap<String, ForumPost>,
    failing_tags: HashSet<String>,
}

impl State {
    fn sync_key_taken(&self, entry: &Knowledge) -> bool {
        entry.has_sync_key()
            && self.knowledge.values().any(|other| {
                other.id != entry.id
                    && other.source == entry.source
                    && other.source_id == entry.source_id
            })
    }
}

/// Store backed by in-process maps.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make [`KnowledgeStore::first_or_create_tag`] fail for `name`.
    /// Lets callers exercise partial tag reconciliation.
    #[cfg(any(test, feature = "test-util"))]
    pub fn fail_tag(&self, name: &str) {
        self.state.write().failing_tags.insert(name.to_string());
    }

    /// Number of knowledge rows held.
    #[must_use]
    pub fn knowledge_count(&self) -> usize {
        self.state.read().knowledge.len()
    }
}

impl KnowledgeStore for MemoryStore {
    fn get_vault_mapping(&self, id: &str) -> Result<Option<VaultMapping>> {
        Ok(self.state.read().mappings.get(id).cloned())
    }

    fn save_vault_mapping(&self, mapping: &VaultMapping) -> Result<()> {
        self.state
            .write()
            .mappings
            .insert(mapping.id.clone(), mapping.clone());
        Ok(())
    }

    fn list_vault_mappings(&self) -> Result<Vec<VaultMapping>> {
        Ok(self.state.read().mappings.values().cloned().collect())
    }

    fn delete_vault_mapping(&self, id: &str) -> Result<bool> {
        Ok(self.state.write().mappings.remove(id).is_some())
    }

    fn record_sync(&self, mapping_id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write();
        let mapping = state
            .mappings
            .get_mut(mapping_id)
            .ok_or_else(|| KmError::VaultNotFound(mapping_id.to_string()))?;
        mapping.last_sync_at = Some(at);
        mapping.updated_at = at;
        Ok(())
    }

    fn list_knowledge(&self, filter: &KnowledgeFilter) -> Result<Vec<Knowledge>> {
        let state = self.state.read();
        let mut rows: Vec<Knowledge> = state
            .knowledge
            .values()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect();
        rows.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(rows)
    }

    fn get_knowledge(&self, id: &str) -> Result<Option<Knowledge>> {
        Ok(self.state.read().knowledge.get(id).cloned())
    }

    fn find_knowledge_by_source(
        &self,
        source: &str,
        source_id: &str,
    ) -> Result<Option<Knowledge>> {
        if source_id.is_empty() {
            return Ok(None);
        }
        Ok(self
            .state
            .read()
            .knowledge
            .values()
            .find(|entry| entry.source == source && entry.source_id == source_id)
            .cloned())
    }

    fn insert_knowledge(&self, entry: &Knowledge) -> Result<()> {
        let mut state = self.state.write();
        if state.knowledge.contains_key(&entry.id) {
            return Err(KmError::Store(format!("knowledge {} already exists", entry.id)));
        }
        if state.sync_key_taken(entry) {
            return Err(KmError::Store(format!(
                "duplicate sync key ({}, {})",
                entry.source, entry.source_id
            )));
        }
        state.knowledge.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    fn update_knowledge(&self, entry: &Knowledge) -> Result<()> {
        let mut state = self.state.write();
        if !state.knowledge.contains_key(&entry.id) {
            return Err(KmError::Store(format!("knowledge {} not found", entry.id)));
        }
        if state.sync_key_taken(entry) {
            return Err(KmError::Store(format!(
                "duplicate sync key ({}, {})",
                entry.source, entry.source_id
            )));
        }
        state.knowledge.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    fn clear_tags(&self, knowledge_id: &str) -> Result<()> {
        self.state.write().associations.remove(knowledge_id);
        Ok(())
    }

    fn first_or_create_tag(&self, name: &str) -> Result<Tag> {
        let mut state = self.state.write();
        if state.failing_tags.contains(name) {
            return Err(KmError::Store(format!("tag '{name}' rejected")));
        }
        if let Some(tag) = state
            .tag_by_name
            .get(name)
            .and_then(|id| state.tags.get(id))
        {
            return Ok(tag.clone());
        }
        let tag = Tag {
            id: generate_id()?,
            name: name.to_string(),
        };
        state.tag_by_name.insert(tag.name.clone(), tag.id.clone());
        state.tags.insert(tag.id.clone(), tag.clone());
        Ok(tag)
    }

    fn append_tag(&self, knowledge_id: &str, tag_id: &str) -> Result<()> {
        let mut state = self.state.write();
        if !state.knowledge.contains_key(knowledge_id) {
            return Err(KmError::Store(format!("knowledge {knowledge_id} not found")));
        }
        if !state.tags.contains_key(tag_id) {
            return Err(KmError::Store(format!("tag {tag_id} not found")));
        }
        let ids = state
            .associations
            .entry(knowledge_id.to_string())
            .or_default();
        if !ids.iter().any(|id| id == tag_id) {
            ids.push(tag_id.to_string());
        }
        Ok(())
    }

    fn find_tags(&self, knowledge_id: &str) -> Result<Vec<Tag>> {
        let state = self.state.read();
        Ok(state
            .associations
            .get(knowledge_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.tags.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl CatalogStore for MemoryStore {
    fn get_user(&self, id: &str) -> Result<Option<User>> {
        Ok(self.state.read().users.get(id).cloned())
    }

    fn get_category(&self, id: &str) -> Result<Option<Category>> {
        Ok(self.state.read().categories.get(id).cloned())
    }

    fn get_forum_board(&self, id: &str) -> Result<Option<ForumBoard>> {
        Ok(self.state.read().boards.get(id).cloned())
    }

    fn list_projects(&self) -> Result<Vec<Project>> {
        Ok(self.state.read().projects.values().cloned().collect())
    }

    fn list_products(&self) -> Result<Vec<Product>> {
        Ok(self.state.read().products.values().cloned().collect())
    }

    fn list_forum_posts(&self) -> Result<Vec<ForumPost>> {
        Ok(self.state.read().posts.values().cloned().collect())
    }

    fn put_user(&self, user: &User) -> Result<()> {
        self.state.write().users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    fn put_category(&self, category: &Category) -> Result<()> {
        self.state
            .write()
            .categories
            .insert(category.id.clone(), category.clone());
        Ok(())
    }

    fn put_forum_board(&self, board: &ForumBoard) -> Result<()> {
        self.state
            .write()
            .boards
            .insert(board.id.clone(), board.clone());
        Ok(())
    }

    fn put_project(&self, project: &Project) -> Result<()> {
        self.state
            .write()
            .projects
            .insert(project.id.clone(), project.clone());
        Ok(())
    }

    fn put_product(&self, product: &Product) -> Result<()> {
        self.state
            .write()
            .products
            .insert(product.id.clone(), product.clone());
        Ok(())
    }

    fn put_forum_post(&self, post: &ForumPost) -> Result<()> {
        self.state.write().posts.insert(post.id.clone(), post.clone());
        Ok(())
    }
}

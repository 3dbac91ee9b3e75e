//! SQLite store of record.
//!
//! One connection guarded by a mutex; each trait call is one statement or
//! one transaction. Timestamps are stored as RFC 3339 text with nanosecond
//! precision so they round-trip exactly.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use tracing::debug;

use kmirror_core::id::generate_id;
use kmirror_core::model::{
    Category, ForumBoard, ForumPost, Knowledge, KnowledgeStatus, Product, Project, Tag, User,
    VaultMapping,
};
use kmirror_core::{KmError, Result};

use crate::{CatalogStore, KnowledgeFilter, KnowledgeStore};

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        username TEXT NOT NULL,
        display_name TEXT NOT NULL DEFAULT ''
    );

    CREATE TABLE IF NOT EXISTS categories (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        parent_id TEXT
    );

    CREATE TABLE IF NOT EXISTS knowledge (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        category_id TEXT NOT NULL,
        author_id TEXT NOT NULL,
        source TEXT NOT NULL,
        source_id TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL DEFAULT 'draft',
        version INTEGER NOT NULL DEFAULT 1,
        view_count INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_knowledge_sync_key
        ON knowledge(source, source_id) WHERE source_id <> '';
    CREATE INDEX IF NOT EXISTS idx_knowledge_category ON knowledge(category_id);

    CREATE TABLE IF NOT EXISTS tags (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS knowledge_tags (
        knowledge_id TEXT NOT NULL REFERENCES knowledge(id) ON DELETE CASCADE,
        tag_id TEXT NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        PRIMARY KEY (knowledge_id, tag_id)
    );

    CREATE TABLE IF NOT EXISTS vault_mappings (
        id TEXT PRIMARY KEY,
        vault_path TEXT NOT NULL DEFAULT '',
        local_path TEXT NOT NULL,
        category_id TEXT NOT NULL,
        auto_sync INTEGER NOT NULL DEFAULT 0,
        last_sync_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS projects (
        id TEXT PRIMARY KEY,
        code TEXT NOT NULL,
        name TEXT NOT NULL,
        description TEXT,
        category TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL DEFAULT '',
        leader_id TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS products (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        type TEXT NOT NULL DEFAULT '',
        maturity TEXT NOT NULL DEFAULT '',
        owner_id TEXT NOT NULL DEFAULT '',
        trl TEXT NOT NULL DEFAULT '',
        version TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS forum_boards (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT ''
    );

    CREATE TABLE IF NOT EXISTS forum_posts (
        id TEXT PRIMARY KEY,
        board_id TEXT NOT NULL,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        author_id TEXT NOT NULL,
        tags TEXT NOT NULL DEFAULT '[]',
        reply_count INTEGER NOT NULL DEFAULT 0,
        view_count INTEGER NOT NULL DEFAULT 0,
        is_pinned INTEGER NOT NULL DEFAULT 0,
        is_best_answer INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
";

const KNOWLEDGE_COLUMNS: &str = "id, title, content, category_id, author_id, source, source_id,
     status, version, view_count, created_at, updated_at";

const MAPPING_COLUMNS: &str =
    "id, vault_path, local_path, category_id, auto_sync, last_sync_at, created_at, updated_at";

/// Store backed by a SQLite database file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database at `path` and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns [`KmError::Store`] if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(store_err)?;
        debug!(path = %path.display(), "opened store");
        Self::with_connection(conn)
    }

    /// Create an in-memory database (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns [`KmError::Store`] if schema creation fails.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(store_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn store_err(e: rusqlite::Error) -> KmError {
    KmError::Store(e.to_string())
}

/// Map unique-constraint violations on knowledge to a readable message.
fn knowledge_write_err(entry: &Knowledge, e: rusqlite::Error) -> KmError {
    match e.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => KmError::Store(format!(
            "duplicate knowledge {} or sync key ({}, {}): {e}",
            entry.id, entry.source, entry.source_id
        )),
        _ => store_err(e),
    }
}

fn ts(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(idx, &raw)
}

fn knowledge_from_row(row: &Row<'_>) -> rusqlite::Result<Knowledge> {
    let status: String = row.get(7)?;
    Ok(Knowledge {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        category_id: row.get(3)?,
        author_id: row.get(4)?,
        source: row.get(5)?,
        source_id: row.get(6)?,
        status: KnowledgeStatus::parse(&status),
        version: row.get(8)?,
        view_count: row.get(9)?,
        created_at: get_ts(row, 10)?,
        updated_at: get_ts(row, 11)?,
    })
}

fn mapping_from_row(row: &Row<'_>) -> rusqlite::Result<VaultMapping> {
    let last_sync: Option<String> = row.get(5)?;
    Ok(VaultMapping {
        id: row.get(0)?,
        vault_path: row.get(1)?,
        local_path: row.get(2)?,
        category_id: row.get(3)?,
        auto_sync: row.get(4)?,
        last_sync_at: last_sync.map(|raw| parse_ts(5, &raw)).transpose()?,
        created_at: get_ts(row, 6)?,
        updated_at: get_ts(row, 7)?,
    })
}

impl KnowledgeStore for SqliteStore {
    fn get_vault_mapping(&self, id: &str) -> Result<Option<VaultMapping>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {MAPPING_COLUMNS} FROM vault_mappings WHERE id = ?1"),
            params![id],
            mapping_from_row,
        )
        .optional()
        .map_err(store_err)
    }

    fn save_vault_mapping(&self, mapping: &VaultMapping) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO vault_mappings
             (id, vault_path, local_path, category_id, auto_sync, last_sync_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                mapping.id,
                mapping.vault_path,
                mapping.local_path,
                mapping.category_id,
                mapping.auto_sync,
                mapping.last_sync_at.as_ref().map(ts),
                ts(&mapping.created_at),
                ts(&mapping.updated_at),
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }

    fn list_vault_mappings(&self) -> Result<Vec<VaultMapping>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {MAPPING_COLUMNS} FROM vault_mappings ORDER BY created_at, id"
            ))
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], mapping_from_row)
            .map_err(store_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(store_err)?;
        Ok(rows)
    }

    fn delete_vault_mapping(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let removed = conn
            .execute("DELETE FROM vault_mappings WHERE id = ?1", params![id])
            .map_err(store_err)?;
        Ok(removed > 0)
    }

    fn record_sync(&self, mapping_id: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock();
        let stamp = ts(&at);
        let updated = conn
            .execute(
                "UPDATE vault_mappings SET last_sync_at = ?2, updated_at = ?2 WHERE id = ?1",
                params![mapping_id, stamp],
            )
            .map_err(store_err)?;
        if updated == 0 {
            return Err(KmError::VaultNotFound(mapping_id.to_string()));
        }
        Ok(())
    }

    fn list_knowledge(&self, filter: &KnowledgeFilter) -> Result<Vec<Knowledge>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {KNOWLEDGE_COLUMNS} FROM knowledge
                 WHERE (?1 IS NULL OR category_id = ?1)
                   AND (?2 IS NULL OR source = ?2)
                   AND (?3 IS NULL OR status = ?3)
                 ORDER BY created_at, id"
            ))
            .map_err(store_err)?;
        let rows = stmt
            .query_map(
                params![
                    filter.category_id,
                    filter.source,
                    filter.status.map(KnowledgeStatus::as_str),
                ],
                knowledge_from_row,
            )
            .map_err(store_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(store_err)?;
        Ok(rows)
    }

    fn get_knowledge(&self, id: &str) -> Result<Option<Knowledge>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {KNOWLEDGE_COLUMNS} FROM knowledge WHERE id = ?1"),
            params![id],
            knowledge_from_row,
        )
        .optional()
        .map_err(store_err)
    }

    fn find_knowledge_by_source(
        &self,
        source: &str,
        source_id: &str,
    ) -> Result<Option<Knowledge>> {
        if source_id.is_empty() {
            return Ok(None);
        }
        let conn = self.conn.lock();
        conn.query_row(
            &format!(
                "SELECT {KNOWLEDGE_COLUMNS} FROM knowledge WHERE source = ?1 AND source_id = ?2"
            ),
            params![source, source_id],
            knowledge_from_row,
        )
        .optional()
        .map_err(store_err)
    }

    fn insert_knowledge(&self, entry: &Knowledge) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "INSERT INTO knowledge ({KNOWLEDGE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ),
            params![
                entry.id,
                entry.title,
                entry.content,
                entry.category_id,
                entry.author_id,
                entry.source,
                entry.source_id,
                entry.status.as_str(),
                entry.version,
                entry.view_count,
                ts(&entry.created_at),
                ts(&entry.updated_at),
            ],
        )
        .map_err(|e| knowledge_write_err(entry, e))?;
        Ok(())
    }

    fn update_knowledge(&self, entry: &Knowledge) -> Result<()> {
        let conn = self.conn.lock();
        let updated = conn
            .execute(
                "UPDATE knowledge SET
                    title = ?2, content = ?3, category_id = ?4, author_id = ?5,
                    source = ?6, source_id = ?7, status = ?8, version = ?9,
                    view_count = ?10, created_at = ?11, updated_at = ?12
                 WHERE id = ?1",
                params![
                    entry.id,
                    entry.title,
                    entry.content,
                    entry.category_id,
                    entry.author_id,
                    entry.source,
                    entry.source_id,
                    entry.status.as_str(),
                    entry.version,
                    entry.view_count,
                    ts(&entry.created_at),
                    ts(&entry.updated_at),
                ],
            )
            .map_err(|e| knowledge_write_err(entry, e))?;
        if updated == 0 {
            return Err(KmError::Store(format!("knowledge {} not found", entry.id)));
        }
        Ok(())
    }

    fn clear_tags(&self, knowledge_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM knowledge_tags WHERE knowledge_id = ?1",
            params![knowledge_id],
        )
        .map_err(store_err)?;
        Ok(())
    }

    fn first_or_create_tag(&self, name: &str) -> Result<Tag> {
        let conn = self.conn.lock();
        let existing = conn
            .query_row(
                "SELECT id, name FROM tags WHERE name = ?1",
                params![name],
                |row| {
                    Ok(Tag {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(store_err)?;
        if let Some(tag) = existing {
            return Ok(tag);
        }

        let tag = Tag {
            id: generate_id()?,
            name: name.to_string(),
        };
        conn.execute(
            "INSERT INTO tags (id, name) VALUES (?1, ?2)",
            params![tag.id, tag.name],
        )
        .map_err(store_err)?;
        Ok(tag)
    }

    fn append_tag(&self, knowledge_id: &str, tag_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO knowledge_tags (knowledge_id, tag_id, position)
             VALUES (?1, ?2, (SELECT COALESCE(MAX(position), -1) + 1
                              FROM knowledge_tags WHERE knowledge_id = ?1))",
            params![knowledge_id, tag_id],
        )
        .map_err(store_err)?;
        Ok(())
    }

    fn find_tags(&self, knowledge_id: &str) -> Result<Vec<Tag>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT t.id, t.name FROM knowledge_tags kt
                 JOIN tags t ON t.id = kt.tag_id
                 WHERE kt.knowledge_id = ?1
                 ORDER BY kt.position",
            )
            .map_err(store_err)?;
        let tags = stmt
            .query_map(params![knowledge_id], |row| {
                Ok(Tag {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .map_err(store_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(store_err)?;
        Ok(tags)
    }
}

impl CatalogStore for SqliteStore {
    fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, username, display_name FROM users WHERE id = ?1",
            params![id],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    display_name: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(store_err)
    }

    fn get_category(&self, id: &str) -> Result<Option<Category>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, name, parent_id FROM categories WHERE id = ?1",
            params![id],
            |row| {
                Ok(Category {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    parent_id: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(store_err)
    }

    fn get_forum_board(&self, id: &str) -> Result<Option<ForumBoard>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, name, description FROM forum_boards WHERE id = ?1",
            params![id],
            |row| {
                Ok(ForumBoard {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(store_err)
    }

    fn list_projects(&self) -> Result<Vec<Project>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, code, name, description, category, status, leader_id,
                        created_at, updated_at
                 FROM projects ORDER BY created_at, id",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Project {
                    id: row.get(0)?,
                    code: row.get(1)?,
                    name: row.get(2)?,
                    description: row.get(3)?,
                    category: row.get(4)?,
                    status: row.get(5)?,
                    leader_id: row.get(6)?,
                    created_at: get_ts(row, 7)?,
                    updated_at: get_ts(row, 8)?,
                })
            })
            .map_err(store_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(store_err)?;
        Ok(rows)
    }

    fn list_products(&self) -> Result<Vec<Product>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, name, description, type, maturity, owner_id, trl, version,
                        created_at, updated_at
                 FROM products ORDER BY created_at, id",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Product {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    product_type: row.get(3)?,
                    maturity: row.get(4)?,
                    owner_id: row.get(5)?,
                    trl: row.get(6)?,
                    version: row.get(7)?,
                    created_at: get_ts(row, 8)?,
                    updated_at: get_ts(row, 9)?,
                })
            })
            .map_err(store_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(store_err)?;
        Ok(rows)
    }

    fn list_forum_posts(&self) -> Result<Vec<ForumPost>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, board_id, title, content, author_id, tags, reply_count,
                        view_count, is_pinned, is_best_answer, created_at, updated_at
                 FROM forum_posts ORDER BY created_at, id",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], |row| {
                let raw_tags: String = row.get(5)?;
                let tags: Vec<String> = serde_json::from_str(&raw_tags).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e))
                })?;
                Ok(ForumPost {
                    id: row.get(0)?,
                    board_id: row.get(1)?,
                    title: row.get(2)?,
                    content: row.get(3)?,
                    author_id: row.get(4)?,
                    tags,
                    reply_count: row.get(6)?,
                    view_count: row.get(7)?,
                    is_pinned: row.get(8)?,
                    is_best_answer: row.get(9)?,
                    created_at: get_ts(row, 10)?,
                    updated_at: get_ts(row, 11)?,
                })
            })
            .map_err(store_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(store_err)?;
        Ok(rows)
    }

    fn put_user(&self, user: &User) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO users (id, username, display_name) VALUES (?1, ?2, ?3)",
            params![user.id, user.username, user.display_name],
        )
        .map_err(store_err)?;
        Ok(())
    }

    fn put_category(&self, category: &Category) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO categories (id, name, parent_id) VALUES (?1, ?2, ?3)",
            params![category.id, category.name, category.parent_id],
        )
        .map_err(store_err)?;
        Ok(())
    }

    fn put_forum_board(&self, board: &ForumBoard) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO forum_boards (id, name, description) VALUES (?1, ?2, ?3)",
            params![board.id, board.name, board.description],
        )
        .map_err(store_err)?;
        Ok(())
    }

    fn put_project(&self, project: &Project) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO projects
             (id, code, name, description, category, status, leader_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                project.id,
                project.code,
                project.name,
                project.description,
                project.category,
                project.status,
                project.leader_id,
                ts(&project.created_at),
                ts(&project.updated_at),
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }

    fn put_product(&self, product: &Product) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO products
             (id, name, description, type, maturity, owner_id, trl, version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                product.id,
                product.name,
                product.description,
                product.product_type,
                product.maturity,
                product.owner_id,
                product.trl,
                product.version,
                ts(&product.created_at),
                ts(&product.updated_at),
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }

    fn put_forum_post(&self, post: &ForumPost) -> Result<()> {
        let tags =
            serde_json::to_string(&post.tags).map_err(|e| KmError::Serialization(e.to_string()))?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO forum_posts
             (id, board_id, title, content, author_id, tags, reply_count, view_count,
              is_pinned, is_best_answer, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                post.id,
                post.board_id,
                post.title,
                post.content,
                post.author_id,
                tags,
                post.reply_count,
                post.view_count,
                post.is_pinned,
                post.is_best_answer,
                ts(&post.created_at),
                ts(&post.updated_at),
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{knowledge, mapping};
    use chrono::{Duration, TimeZone};
    use kmirror_core::model::OBSIDIAN_SOURCE;

    #[test]
    fn knowledge_round_trips_with_nanosecond_timestamps() {
        let store = SqliteStore::in_memory().unwrap();
        let mut entry = knowledge("k1", "notes/alpha.md");
        entry.updated_at = entry.updated_at + Duration::nanoseconds(123_456_789);
        entry.status = KnowledgeStatus::Published;
        store.insert_knowledge(&entry).unwrap();

        let loaded = store.get_knowledge("k1").unwrap().unwrap();
        assert_eq!(loaded, entry);
    }

    #[test]
    fn sync_key_is_unique_when_non_empty() {
        let store = SqliteStore::in_memory().unwrap();
        store.insert_knowledge(&knowledge("k1", "a.md")).unwrap();
        let err = store.insert_knowledge(&knowledge("k2", "a.md")).unwrap_err();
        assert!(err.to_string().contains("sync key"));

        store.insert_knowledge(&knowledge("k3", "")).unwrap();
        store.insert_knowledge(&knowledge("k4", "")).unwrap();
    }

    #[test]
    fn filter_selects_vault_rows() {
        let store = SqliteStore::in_memory().unwrap();
        store.insert_knowledge(&knowledge("k1", "a.md")).unwrap();
        let mut other = knowledge("k2", "b.md");
        other.category_id = "cat-2".to_string();
        store.insert_knowledge(&other).unwrap();

        let rows = store
            .list_knowledge(&KnowledgeFilter::vault("cat-1", OBSIDIAN_SOURCE))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "k1");
        assert_eq!(store.list_knowledge(&KnowledgeFilter::default()).unwrap().len(), 2);
    }

    #[test]
    fn update_of_missing_row_fails() {
        let store = SqliteStore::in_memory().unwrap();
        let err = store.update_knowledge(&knowledge("nope", "x.md")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn tags_keep_association_order() {
        let store = SqliteStore::in_memory().unwrap();
        store.insert_knowledge(&knowledge("k1", "a.md")).unwrap();
        let names: Vec<String> = ["zeta", "alpha", "mid"].iter().map(ToString::to_string).collect();
        store.replace_tags("k1", &names).unwrap();
        assert_eq!(store.tag_names("k1").unwrap(), names);

        let again = store.first_or_create_tag("alpha").unwrap();
        let found = store.find_tags("k1").unwrap();
        assert_eq!(found[1].id, again.id);
    }

    #[test]
    fn append_to_missing_entry_fails() {
        let store = SqliteStore::in_memory().unwrap();
        let tag = store.first_or_create_tag("radar").unwrap();
        assert!(store.append_tag("missing", &tag.id).is_err());
    }

    #[test]
    fn mappings_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kmirror.db");
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        {
            let store = SqliteStore::open(&path).unwrap();
            store.save_vault_mapping(&mapping("v1")).unwrap();
            store.record_sync("v1", at).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        let mappings = store.list_vault_mappings().unwrap();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].last_sync_at, Some(at));
        assert!(matches!(
            store.record_sync("v2", at),
            Err(KmError::VaultNotFound(_))
        ));
    }

    #[test]
    fn catalog_entities_round_trip() {
        let store = SqliteStore::in_memory().unwrap();
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        store
            .put_user(&User {
                id: "u1".into(),
                username: "ada".into(),
                display_name: "Ada L.".into(),
            })
            .unwrap();
        store
            .put_forum_post(&ForumPost {
                id: "p1".into(),
                board_id: "b1".into(),
                title: "Question".into(),
                content: "How?".into(),
                author_id: "u1".into(),
                tags: vec!["rf".into(), "dsp".into()],
                reply_count: 2,
                view_count: 9,
                is_pinned: false,
                is_best_answer: true,
                created_at: at,
                updated_at: at,
            })
            .unwrap();

        assert_eq!(store.get_user("u1").unwrap().unwrap().display_name, "Ada L.");
        assert!(store.get_user("u2").unwrap().is_none());
        let posts = store.list_forum_posts().unwrap();
        assert_eq!(posts[0].tags, vec!["rf", "dsp"]);
        assert!(posts[0].is_best_answer);
    }
}

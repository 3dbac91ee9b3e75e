//! Entity types owned by the platform store.
//!
//! The store is authoritative for every type here. The vault mirrors
//! [`Knowledge`] rows whose `source` is [`OBSIDIAN_SOURCE`]; the search
//! backend holds flattened projections of the rest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `source` discriminator for rows mirrored from a vault.
pub const OBSIDIAN_SOURCE: &str = "obsidian";

/// `source` discriminator for rows authored on the platform.
pub const PLATFORM_SOURCE: &str = "platform";

/// Author id used when an imported file names no author.
pub const SYSTEM_AUTHOR: &str = "system";

/// Publication state of a knowledge entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnowledgeStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

impl KnowledgeStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }

    /// Parse the stored representation. Unknown values fall back to `Draft`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "published" => Self::Published,
            "archived" => Self::Archived,
            _ => Self::Draft,
        }
    }
}

/// A knowledge entry, the synchronized entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Knowledge {
    // === Identity ===
    pub id: String,
    pub title: String,
    pub content: String,

    // === References ===
    pub category_id: String,
    pub author_id: String,

    // === Sync key ===
    /// Origin of the row, e.g. `"obsidian"` or `"platform"`.
    pub source: String,
    /// Vault-relative path with forward slashes when `source` is a vault,
    /// otherwise empty.
    #[serde(default)]
    pub source_id: String,

    // === Lifecycle ===
    #[serde(default)]
    pub status: KnowledgeStatus,
    pub version: i64,
    #[serde(default)]
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Knowledge {
    /// True when this row is linked to a vault file.
    #[must_use]
    pub fn has_sync_key(&self) -> bool {
        !self.source_id.is_empty()
    }
}

/// Binds a knowledge category to a vault directory on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultMapping {
    pub id: String,
    /// Display label of the vault (the vault's own name or remote path).
    #[serde(default)]
    pub vault_path: String,
    /// Absolute directory the vault lives in.
    pub local_path: String,
    pub category_id: String,
    #[serde(default)]
    pub auto_sync: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A name-keyed tag. Names are unique and created on first use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub code: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leader_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub product_type: String,
    pub maturity: String,
    pub owner_id: String,
    /// Technology readiness level label.
    #[serde(default)]
    pub trl: String,
    #[serde(default)]
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForumBoard {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForumPost {
    pub id: String,
    pub board_id: String,
    pub title: String,
    pub content: String,
    pub author_id: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub reply_count: i64,
    #[serde(default)]
    pub view_count: i64,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub is_best_answer: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

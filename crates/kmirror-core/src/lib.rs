//! # kmirror-core
//!
//! Core types shared by every kmirror crate.
//!
//! This crate defines the foundational pieces used by the store, vault,
//! and search layers:
//! - Entity types ([`Knowledge`], [`VaultMapping`], [`Tag`], and the
//!   catalog entities projected for search)
//! - Frontmatter codec ([`frontmatter`])
//! - Tag extraction and merging ([`tags`])
//! - Filename and sync-key helpers ([`paths`])
//! - Sortable identifiers and random tokens ([`id`])
//! - Timestamp helpers for sync comparison and index rendering ([`time`])
//! - Error hierarchy ([`KmError`], [`SearchError`], [`IdError`])
//! - Cooperative cancellation ([`CancelToken`])

pub mod cancel;
pub mod error;
pub mod frontmatter;
pub mod id;
pub mod model;
pub mod paths;
pub mod tags;
pub mod time;

pub use cancel::CancelToken;
pub use error::{IdError, KmError, Result, SearchError};
pub use frontmatter::Frontmatter;
pub use model::{
    Category, ForumBoard, ForumPost, Knowledge, KnowledgeStatus, Product, Project, Tag, User,
    VaultMapping, OBSIDIAN_SOURCE, SYSTEM_AUTHOR,
};

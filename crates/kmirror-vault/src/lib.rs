//! # kmirror-vault
//!
//! Keeps a directory of markdown notes in two-way sync with the knowledge
//! store.
//!
//! The store owns entity state; the vault is a materialized mirror of the
//! knowledge rows whose `source` is `"obsidian"`. This crate provides:
//! - [`Scanner`]: glob-filtered enumeration of vault markdown files
//! - [`SyncEngine`]: import/export reconciliation with conflict policies
//! - [`register_vault`] and [`update_vault`]: validated vault mappings

pub mod mapping;
pub mod scanner;
pub mod sync;

pub use mapping::{register_vault, update_vault};
pub use scanner::{Scanner, VaultFile, VaultScan};
pub use sync::{ConflictPolicy, Resolution, SyncConfig, SyncDirection, SyncEngine, SyncStats};

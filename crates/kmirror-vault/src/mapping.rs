//! Vault mapping registration.

use std::path::{Path, PathBuf};

use tracing::info;

use kmirror_core::id::generate_id;
use kmirror_core::model::VaultMapping;
use kmirror_core::{time, KmError, Result};
use kmirror_store::KnowledgeStore;

/// Bind `category_id` to the directory at `local_path` and persist the
/// mapping. The path is canonicalized; `label` defaults to the directory
/// name.
///
/// # Errors
///
/// Returns [`KmError::Config`] if `local_path` is not an existing directory
/// or `category_id` is empty, and [`KmError::Store`] if the mapping cannot be
/// saved.
pub fn register_vault<S: KnowledgeStore + ?Sized>(
    store: &S,
    local_path: &Path,
    category_id: &str,
    label: Option<&str>,
    auto_sync: bool,
) -> Result<VaultMapping> {
    let root = checked_root(local_path, category_id)?;
    let label = label.map_or_else(|| dir_label(&root), ToString::to_string);

    let now = time::now();
    let mapping = VaultMapping {
        id: generate_id()?,
        vault_path: label,
        local_path: root.to_string_lossy().into_owned(),
        category_id: category_id.to_string(),
        auto_sync,
        last_sync_at: None,
        created_at: now,
        updated_at: now,
    };
    store.save_vault_mapping(&mapping)?;
    info!(vault_id = %mapping.id, root = %mapping.local_path, "vault registered");
    Ok(mapping)
}

/// Rebind an existing mapping to a new directory, category, or sync flag.
/// `label` keeps the current one when `None`. The id, creation time, and
/// last sync time are preserved.
///
/// # Errors
///
/// Returns [`KmError::VaultNotFound`] for an unknown id, and the errors of
/// [`register_vault`] otherwise.
pub fn update_vault<S: KnowledgeStore + ?Sized>(
    store: &S,
    vault_id: &str,
    local_path: &Path,
    category_id: &str,
    label: Option<&str>,
    auto_sync: bool,
) -> Result<VaultMapping> {
    let current = store
        .get_vault_mapping(vault_id)?
        .ok_or_else(|| KmError::VaultNotFound(vault_id.to_string()))?;
    let root = checked_root(local_path, category_id)?;

    let mapping = VaultMapping {
        vault_path: label.map_or(current.vault_path, ToString::to_string),
        local_path: root.to_string_lossy().into_owned(),
        category_id: category_id.to_string(),
        auto_sync,
        updated_at: time::now(),
        ..current
    };
    store.save_vault_mapping(&mapping)?;
    info!(vault_id = %mapping.id, root = %mapping.local_path, "vault updated");
    Ok(mapping)
}

fn checked_root(local_path: &Path, category_id: &str) -> Result<PathBuf> {
    if category_id.trim().is_empty() {
        return Err(KmError::Config("vault mapping needs a category".to_string()));
    }
    if !local_path.is_dir() {
        return Err(KmError::Config(format!(
            "vault root {} is not a directory",
            local_path.display()
        )));
    }
    Ok(local_path.canonicalize()?)
}

fn dir_label(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

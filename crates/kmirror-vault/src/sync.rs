//! Bidirectional sync between a vault directory and the knowledge store.
//!
//! A run loads the vault mapping, snapshots both sides (store rows of the
//! mapping's category with `source = "obsidian"`, and the scanned vault),
//! then walks the paths in sorted order:
//!
//! ```text
//!                  ┌── vault-only ──────► import ──► uploaded
//!   discovered ────┼── platform-only ───► export ──► downloaded
//!                  └── both ── policy ──► import | export | skip
//! ```
//!
//! Per-path failures land in [`SyncStats::errors`]; only configuration and
//! store-snapshot failures abort a run. Whatever happens, the mapping's
//! `last_sync_at` is stamped before the run returns.
//!
//! Both clocks are compared at millisecond precision. Imports stamp the row
//! with the file's mod-time and exports stamp the file with the row's
//! `updated_at`, so a second run over unchanged data does nothing.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use kmirror_core::frontmatter::{self, Frontmatter};
use kmirror_core::id::generate_id;
use kmirror_core::model::{Knowledge, KnowledgeStatus, VaultMapping, OBSIDIAN_SOURCE, SYSTEM_AUTHOR};
use kmirror_core::{paths, tags, time, CancelToken, KmError, Result};
use kmirror_store::{KnowledgeFilter, KnowledgeStore};

use crate::scanner::{Scanner, VaultFile};

/// Which reconciliation pass a run performs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// Vault to store: import files the store lacks.
    Upload,
    /// Store to vault: export rows the vault lacks.
    Download,
    #[default]
    Bidirectional,
}

/// Who wins when a path exists on both sides with different clocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    PlatformWins,
    VaultWins,
    #[default]
    NewerWins,
}

impl SyncDirection {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
            Self::Bidirectional => "bidirectional",
        }
    }
}

impl FromStr for SyncDirection {
    type Err = KmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "upload" => Ok(Self::Upload),
            "download" => Ok(Self::Download),
            "bidirectional" => Ok(Self::Bidirectional),
            other => Err(KmError::Config(format!(
                "unknown sync direction '{other}' (expected upload, download, or bidirectional)"
            ))),
        }
    }
}

impl ConflictPolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PlatformWins => "platform_wins",
            Self::VaultWins => "vault_wins",
            Self::NewerWins => "newer_wins",
        }
    }

    /// Decide what to do with a path present on both sides, given the
    /// vault mod-time and the row's `updated_at`. Ties always skip.
    #[must_use]
    pub fn resolve(self, vault_time: DateTime<Utc>, platform_time: DateTime<Utc>) -> Resolution {
        match (vault_time.cmp(&platform_time), self) {
            (Ordering::Equal, _)
            | (Ordering::Greater, Self::PlatformWins)
            | (Ordering::Less, Self::VaultWins) => Resolution::Skip,
            (Ordering::Greater, _) => Resolution::Import,
            (Ordering::Less, _) => Resolution::Export,
        }
    }
}

impl FromStr for ConflictPolicy {
    type Err = KmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "platform_wins" => Ok(Self::PlatformWins),
            "vault_wins" => Ok(Self::VaultWins),
            "newer_wins" => Ok(Self::NewerWins),
            other => Err(KmError::Config(format!(
                "unknown conflict policy '{other}' (expected platform_wins, vault_wins, or newer_wins)"
            ))),
        }
    }
}

/// Outcome of conflict resolution for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Import,
    Export,
    Skip,
}

/// Parameters of one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub vault_id: String,
    #[serde(default)]
    pub direction: SyncDirection,
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
    /// Base-name globs; when non-empty a file must match one.
    #[serde(default)]
    pub include: Vec<String>,
    /// Base-name globs; a matching file is ignored.
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl SyncConfig {
    #[must_use]
    pub fn new(vault_id: impl Into<String>, direction: SyncDirection) -> Self {
        Self {
            vault_id: vault_id.into(),
            direction,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }
}

/// Counters and errors of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub files_processed: usize,
    pub files_uploaded: usize,
    pub files_downloaded: usize,
    pub files_conflicted: usize,
    pub files_skipped: usize,
    pub errors: Vec<String>,
    /// The run stopped early on a cancellation signal.
    #[serde(default)]
    pub cancelled: bool,
}

/// Vault ids with a run in progress anywhere in this process.
static RUNNING: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Drives sync runs against one store.
///
/// Runs and single-entry transfers on the same vault never overlap, even
/// across engines.
pub struct SyncEngine<S> {
    store: Arc<S>,
}

impl<S> Clone for SyncEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

/// Releases a vault's run slot on drop.
struct RunSlot {
    vault_id: String,
}

impl Drop for RunSlot {
    fn drop(&mut self) {
        RUNNING.lock().remove(&self.vault_id);
    }
}

fn claim(vault_id: &str) -> Result<RunSlot> {
    if !RUNNING.lock().insert(vault_id.to_string()) {
        return Err(KmError::SyncInProgress(vault_id.to_string()));
    }
    Ok(RunSlot {
        vault_id: vault_id.to_string(),
    })
}

impl<S: KnowledgeStore> SyncEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Run one sync pass to completion.
    ///
    /// # Errors
    ///
    /// See [`SyncEngine::run_with_cancel`].
    pub fn run(&self, config: &SyncConfig) -> Result<SyncStats> {
        self.run_with_cancel(config, &CancelToken::new())
    }

    /// Run one sync pass, checking `cancel` between paths.
    ///
    /// # Errors
    ///
    /// - [`KmError::VaultNotFound`] if the mapping does not exist
    /// - [`KmError::Config`] for a missing vault directory or a bad glob
    /// - [`KmError::SyncInProgress`] if this vault is already syncing
    /// - [`KmError::Store`] if the store snapshot cannot be loaded
    pub fn run_with_cancel(&self, config: &SyncConfig, cancel: &CancelToken) -> Result<SyncStats> {
        let (mapping, root) = self.open(&config.vault_id)?;
        let scanner = Scanner::new(&config.include, &config.exclude)?;
        let _slot = claim(&mapping.id)?;

        info!(
            vault_id = %mapping.id,
            root = %root.display(),
            direction = config.direction.as_str(),
            policy = config.conflict_policy.as_str(),
            "sync started"
        );

        let mut run = Run {
            mirror: Mirror {
                store: self.store.as_ref(),
                mapping: &mapping,
                root: &root,
            },
            cancel,
            stats: SyncStats::default(),
        };
        let outcome = run.reconcile(config, &scanner);
        let mut stats = run.stats;

        if let Err(e) = self.store.record_sync(&mapping.id, time::now()) {
            warn!(vault_id = %mapping.id, error = %e, "could not record sync time");
            stats.errors.push(format!("finalize {}: {e}", mapping.id));
        }
        outcome?;

        info!(
            vault_id = %mapping.id,
            processed = stats.files_processed,
            uploaded = stats.files_uploaded,
            downloaded = stats.files_downloaded,
            conflicted = stats.files_conflicted,
            skipped = stats.files_skipped,
            errors = stats.errors.len(),
            cancelled = stats.cancelled,
            "sync finished"
        );
        Ok(stats)
    }

    /// Import one markdown document under `file_path` in the vault, without
    /// reading the vault itself. A non-empty `author_id` overrides the
    /// document's `author` field.
    ///
    /// # Errors
    ///
    /// - [`KmError::VaultNotFound`] if the mapping does not exist
    /// - [`KmError::Config`] if `file_path` leaves the vault root
    /// - [`KmError::SyncInProgress`] if this vault is already syncing
    /// - [`KmError::Store`] if the row cannot be written
    pub fn import_markdown(
        &self,
        vault_id: &str,
        file_path: &str,
        content: &str,
        author_id: &str,
    ) -> Result<Knowledge> {
        let (mapping, root) = self.open(vault_id)?;
        let key = vault_key(file_path)?;
        let _slot = claim(&mapping.id)?;

        let mirror = Mirror {
            store: self.store.as_ref(),
            mapping: &mapping,
            root: &root,
        };
        let author = Some(author_id).filter(|a| !a.is_empty());
        let entry = mirror.upsert(&key, content, author, time::now())?;
        info!(vault_id = %mapping.id, path = %key, id = %entry.id, "markdown imported");
        Ok(entry)
    }

    /// Write one knowledge row into the vault and return its sync key.
    ///
    /// Obsidian rows go to their sync key. Other rows, and obsidian rows
    /// without a key, go to a path derived from the title; an obsidian row
    /// then adopts that path.
    ///
    /// # Errors
    ///
    /// - [`KmError::VaultNotFound`] or [`KmError::KnowledgeNotFound`]
    /// - [`KmError::Config`] if the row's sync key leaves the vault root or
    ///   no free path exists for it
    /// - [`KmError::SyncInProgress`] if this vault is already syncing
    /// - [`KmError::Io`] if the file cannot be written
    pub fn export_entry(&self, knowledge_id: &str, vault_id: &str) -> Result<String> {
        let (mapping, root) = self.open(vault_id)?;
        let row = self
            .store
            .get_knowledge(knowledge_id)?
            .ok_or_else(|| KmError::KnowledgeNotFound(knowledge_id.to_string()))?;
        let _slot = claim(&mapping.id)?;

        let mirror = Mirror {
            store: self.store.as_ref(),
            mapping: &mapping,
            root: &root,
        };
        let obsidian = row.source == OBSIDIAN_SOURCE;
        let key = if obsidian && row.has_sync_key() {
            row.source_id.clone()
        } else {
            derive_key(&row, |key| mirror.is_taken(key, &row.id)).ok_or_else(|| {
                KmError::Config(format!("no free vault path for knowledge {}", row.id))
            })?
        };
        let adopt = obsidian && !row.has_sync_key();
        mirror.write_entry(&key, &row, adopt)?;
        info!(vault_id = %mapping.id, path = %key, id = %row.id, "entry exported");
        Ok(key)
    }

    /// Load a mapping and check its root is a directory.
    fn open(&self, vault_id: &str) -> Result<(VaultMapping, PathBuf)> {
        let mapping = self
            .store
            .get_vault_mapping(vault_id)?
            .ok_or_else(|| KmError::VaultNotFound(vault_id.to_string()))?;
        let root = PathBuf::from(&mapping.local_path);
        if !root.is_dir() {
            return Err(KmError::Config(format!(
                "vault root {} is not a directory",
                root.display()
            )));
        }
        Ok((mapping, root))
    }
}

/// Normalize a caller-supplied vault path into a sync key.
fn vault_key(path: &str) -> Result<String> {
    let key = paths::normalize_key(path);
    if !paths::is_contained(path) || key.is_empty() {
        return Err(KmError::Config(format!(
            "path '{path}' is not inside the vault"
        )));
    }
    Ok(key)
}

/// Stored sync keys must already be normalized and contained.
fn check_key(key: &str) -> Result<()> {
    if !paths::is_contained(key) || paths::normalize_key(key) != key {
        return Err(KmError::Config(format!(
            "sync key '{key}' is not a normalized path inside the vault"
        )));
    }
    Ok(())
}

/// Title-derived destination for a row without a sync key: `<title>.md`,
/// then `<title>-<id>.md`, or `None` when both are taken.
fn derive_key(row: &Knowledge, taken: impl Fn(&str) -> bool) -> Option<String> {
    let stem = match paths::sanitize(&row.title) {
        s if s.is_empty() => row.id.clone(),
        s => s,
    };
    [format!("{stem}.md"), format!("{stem}-{}.md", row.id)]
        .into_iter()
        .find(|key| !taken(key.as_str()))
}

/// A platform row due for export, keyed by its destination path.
struct PlatformEntry {
    row: Knowledge,
    /// The row had no sync key and adopts its destination after export.
    adopt: bool,
}

/// File and row transfer for one vault.
struct Mirror<'a, S: ?Sized> {
    store: &'a S,
    mapping: &'a VaultMapping,
    root: &'a Path,
}

impl<S: KnowledgeStore + ?Sized> Mirror<'_, S> {
    /// Create or update the row keyed `key` from a markdown document.
    ///
    /// `author` falls back to the document's `author` field, then to the
    /// system author.
    fn upsert(
        &self,
        key: &str,
        raw: &str,
        author: Option<&str>,
        modified: DateTime<Utc>,
    ) -> Result<Knowledge> {
        let (meta, body) = frontmatter::parse(raw);
        let author = author.unwrap_or(match meta.get("author") {
            "" => SYSTEM_AUTHOR,
            author => author,
        });
        let tag_names = tags::merge(tags::extract(body), tags::parse_csv(meta.get("tags")));

        let entry = match self.store.find_knowledge_by_source(OBSIDIAN_SOURCE, key)? {
            Some(existing) => {
                let updated = Knowledge {
                    title: meta.get("title").to_string(),
                    content: body.to_string(),
                    category_id: self.mapping.category_id.clone(),
                    author_id: author.to_string(),
                    version: existing.version + 1,
                    updated_at: modified.max(time::sync_clock(existing.updated_at)),
                    ..existing
                };
                self.store.update_knowledge(&updated)?;
                updated
            }
            None => {
                let entry = Knowledge {
                    id: generate_id()?,
                    title: meta.get("title").to_string(),
                    content: body.to_string(),
                    category_id: self.mapping.category_id.clone(),
                    author_id: author.to_string(),
                    source: OBSIDIAN_SOURCE.to_string(),
                    source_id: key.to_string(),
                    status: KnowledgeStatus::Draft,
                    version: 1,
                    view_count: 0,
                    created_at: modified.min(time::now()),
                    updated_at: modified,
                };
                self.store.insert_knowledge(&entry)?;
                entry
            }
        };

        self.store.replace_tags(&entry.id, &tag_names)?;
        Ok(entry)
    }

    fn import_file(&self, key: &str, file: &VaultFile) -> Result<()> {
        let raw = fs::read_to_string(self.root.join(key))?;
        self.upsert(key, &raw, None, file.modified).map(drop)
    }

    fn write_entry(&self, key: &str, row: &Knowledge, adopt: bool) -> Result<()> {
        check_key(key)?;
        let dest = self.root.join(key);
        if let Some(parent) = dest.parent() {
            create_dirs(parent)?;
        }

        let tag_names = self.store.tag_names(&row.id)?;
        let mut meta = Frontmatter::new();
        meta.insert("title", row.title.as_str());
        meta.insert("id", row.id.as_str());
        meta.insert("author", row.author_id.as_str());
        meta.insert("tags", tags::join_csv(&tag_names));
        meta.insert("created", time::frontmatter_timestamp(row.created_at));
        meta.insert("updated", time::frontmatter_timestamp(row.updated_at));
        let document = frontmatter::compose(&meta, &row.content);

        write_atomic(&dest, document.as_bytes(), time::sync_clock(row.updated_at))?;

        if adopt {
            let linked = Knowledge {
                source_id: key.to_string(),
                ..row.clone()
            };
            self.store.update_knowledge(&linked)?;
        }
        Ok(())
    }

    /// Whether `key` already belongs to something other than row `id`: an
    /// obsidian row, or a file whose header names another id.
    fn is_taken(&self, key: &str, id: &str) -> bool {
        match self.store.find_knowledge_by_source(OBSIDIAN_SOURCE, key) {
            Ok(Some(other)) if other.id != id => return true,
            Ok(_) => {}
            Err(_) => return true,
        }
        let path = self.root.join(key);
        if !path.exists() {
            return false;
        }
        fs::read_to_string(path).map_or(true, |raw| frontmatter::parse(&raw).0.get("id") != id)
    }
}

struct Run<'a, S: ?Sized> {
    mirror: Mirror<'a, S>,
    cancel: &'a CancelToken,
    stats: SyncStats,
}

impl<S: KnowledgeStore + ?Sized> Run<'_, S> {
    fn reconcile(&mut self, config: &SyncConfig, scanner: &Scanner) -> Result<()> {
        let rows = self.mirror.store.list_knowledge(&KnowledgeFilter::vault(
            &self.mirror.mapping.category_id,
            OBSIDIAN_SOURCE,
        ))?;
        let scan = scanner.scan(self.mirror.root);
        self.stats.errors.extend(scan.errors);
        let vault = scan.files;
        let platform = platform_map(rows, &vault);

        debug!(
            vault_id = %self.mirror.mapping.id,
            vault_files = vault.len(),
            platform_rows = platform.len(),
            "snapshots loaded"
        );

        match config.direction {
            SyncDirection::Upload => {
                for (key, file) in &vault {
                    if !self.visit() {
                        break;
                    }
                    if platform.contains_key(key) {
                        self.stats.files_skipped += 1;
                    } else {
                        self.import(key, file);
                    }
                }
            }
            SyncDirection::Download => {
                for (key, entry) in &platform {
                    if !self.visit() {
                        break;
                    }
                    if vault.contains_key(key) {
                        self.stats.files_skipped += 1;
                    } else {
                        self.export(key, entry);
                    }
                }
            }
            SyncDirection::Bidirectional => {
                let keys: BTreeSet<&String> = vault.keys().chain(platform.keys()).collect();
                for key in keys {
                    if !self.visit() {
                        break;
                    }
                    match (vault.get(key), platform.get(key)) {
                        (Some(file), None) => self.import(key, file),
                        (None, Some(entry)) => self.export(key, entry),
                        (Some(file), Some(entry)) => {
                            self.stats.files_conflicted += 1;
                            let platform_time = time::sync_clock(entry.row.updated_at);
                            match config
                                .conflict_policy
                                .resolve(file.modified, platform_time)
                            {
                                Resolution::Import => self.import(key, file),
                                Resolution::Export => self.export(key, entry),
                                Resolution::Skip => {
                                    debug!(path = %key, "conflict skipped");
                                    self.stats.files_skipped += 1;
                                }
                            }
                        }
                        (None, None) => {}
                    }
                }
            }
        }
        Ok(())
    }

    /// Count the next path, or stop the pass if cancellation was requested.
    fn visit(&mut self) -> bool {
        if self.cancel.is_cancelled() {
            info!(vault_id = %self.mirror.mapping.id, "sync cancelled");
            self.stats.cancelled = true;
            return false;
        }
        self.stats.files_processed += 1;
        true
    }

    fn import(&mut self, key: &str, file: &VaultFile) {
        match self.mirror.import_file(key, file) {
            Ok(()) => {
                debug!(path = %key, "imported");
                self.stats.files_uploaded += 1;
            }
            Err(e) => {
                warn!(path = %key, error = %e, "import failed");
                self.stats.errors.push(format!("import {key}: {e}"));
            }
        }
    }

    fn export(&mut self, key: &str, entry: &PlatformEntry) {
        match self.mirror.write_entry(key, &entry.row, entry.adopt) {
            Ok(()) => {
                debug!(path = %key, id = %entry.row.id, "exported");
                self.stats.files_downloaded += 1;
            }
            Err(e) => {
                warn!(path = %key, error = %e, "export failed");
                self.stats.errors.push(format!("export {key}: {e}"));
            }
        }
    }
}

/// Index rows by sync key. Rows without one get a destination derived from
/// their title that collides with nothing already on either side.
fn platform_map(
    rows: Vec<Knowledge>,
    vault: &BTreeMap<String, VaultFile>,
) -> BTreeMap<String, PlatformEntry> {
    let (keyed, unkeyed): (Vec<_>, Vec<_>) = rows.into_iter().partition(Knowledge::has_sync_key);

    let mut platform: BTreeMap<String, PlatformEntry> = keyed
        .into_iter()
        .map(|row| (row.source_id.clone(), PlatformEntry { row, adopt: false }))
        .collect();

    for row in unkeyed {
        let taken = |k: &str| platform.contains_key(k) || vault.contains_key(k);
        match derive_key(&row, taken) {
            Some(key) => {
                platform.insert(key, PlatformEntry { row, adopt: true });
            }
            None => warn!(id = %row.id, "no free path for unkeyed row"),
        }
    }
    platform
}

#[cfg(unix)]
fn create_dirs(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o755).create(dir)
}

#[cfg(not(unix))]
fn create_dirs(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}

/// Write through a sibling temp file, then rename over `dest`, so readers
/// see either the old file or the complete new one.
fn write_atomic(dest: &Path, contents: &[u8], modified: DateTime<Utc>) -> Result<()> {
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix(".kmirror-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))?;
    }
    tmp.as_file().set_modified(time::to_system_time(modified))?;
    tmp.persist(dest).map_err(|e| KmError::Io(e.error))?;
    Ok(())
}

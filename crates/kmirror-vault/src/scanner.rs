//! Vault scanner.
//!
//! Walks a vault root and materializes every markdown file that passes the
//! include/exclude filters into a map keyed by forward-slash relative path.
//! Globs match the file's base name only. Traversal errors are collected,
//! never fatal.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, warn};
use walkdir::WalkDir;

use kmirror_core::paths::to_sync_key;
use kmirror_core::time::from_system_time;
use kmirror_core::{KmError, Result};

/// Size and modification time of a scanned file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultFile {
    pub size: u64,
    /// Modification time on the sync clock (millisecond precision).
    pub modified: DateTime<Utc>,
}

/// Result of one scan: the file map plus per-path traversal errors.
#[derive(Debug, Default)]
pub struct VaultScan {
    pub files: BTreeMap<String, VaultFile>,
    pub errors: Vec<String>,
}

/// Compiled include/exclude filters.
#[derive(Debug, Clone)]
pub struct Scanner {
    include: Option<GlobSet>,
    exclude: GlobSet,
}

impl Scanner {
    /// Compile the filters. An empty `include` list admits every file.
    ///
    /// # Errors
    ///
    /// Returns [`KmError::Config`] if any pattern is not a valid glob.
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let include = if include.is_empty() {
            None
        } else {
            Some(build_globset(include)?)
        };
        Ok(Self {
            include,
            exclude: build_globset(exclude)?,
        })
    }

    /// Whether a file with this base name belongs in the scan.
    #[must_use]
    pub fn admits(&self, name: &str) -> bool {
        if !name.to_ascii_lowercase().ends_with(".md") {
            return false;
        }
        if self.exclude.is_match(name) {
            return false;
        }
        self.include.as_ref().is_none_or(|set| set.is_match(name))
    }

    /// Walk `root` recursively.
    pub fn scan(&self, root: &Path) -> VaultScan {
        let mut scan = VaultScan::default();

        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let at = e
                        .path()
                        .and_then(|p| p.strip_prefix(root).ok())
                        .map(to_sync_key)
                        .unwrap_or_default();
                    warn!(path = %at, error = %e, "scan error");
                    scan.errors.push(format!("scan {at}: {e}"));
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                if has_md_extension(entry.path()) {
                    let at = to_sync_key(entry.path().strip_prefix(root).unwrap_or(entry.path()));
                    warn!(path = %at, "skipping non-UTF-8 file name");
                    scan.errors.push(format!("scan {at}: non-UTF-8 file name"));
                }
                continue;
            };
            if !self.admits(name) {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let key = to_sync_key(relative);

            match entry.metadata().map_err(std::io::Error::from).and_then(|m| {
                let modified = m.modified()?;
                Ok(VaultFile {
                    size: m.len(),
                    modified: from_system_time(modified),
                })
            }) {
                Ok(file) => {
                    scan.files.insert(key, file);
                }
                Err(e) => {
                    warn!(path = %key, error = %e, "cannot stat vault file");
                    scan.errors.push(format!("scan {key}: {e}"));
                }
            }
        }

        debug!(
            root = %root.display(),
            files = scan.files.len(),
            errors = scan.errors.len(),
            "vault scanned"
        );
        scan
    }
}

fn has_md_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob =
            Glob::new(pattern).map_err(|e| KmError::Config(format!("invalid glob '{pattern}': {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| KmError::Config(format!("invalid glob set: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn finds_markdown_recursively_with_forward_slash_keys() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "top.md", "a");
        write(dir.path(), "notes/sub/alpha.md", "hello");
        write(dir.path(), "notes/image.png", "x");
        write(dir.path(), "LOUD.MD", "b");

        let scan = Scanner::new(&[], &[]).unwrap().scan(dir.path());
        let keys: Vec<&str> = scan.files.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["LOUD.MD", "notes/sub/alpha.md", "top.md"]);
        assert_eq!(scan.files["notes/sub/alpha.md"].size, 5);
        assert!(scan.errors.is_empty());
    }

    #[test]
    fn exclude_matches_base_name() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "keep.md", "");
        write(dir.path(), "drafts/skip-me.md", "");

        let scanner = Scanner::new(&[], &strings(&["skip-*"])).unwrap();
        let scan = scanner.scan(dir.path());
        assert_eq!(scan.files.len(), 1);
        assert!(scan.files.contains_key("keep.md"));
    }

    #[test]
    fn include_requires_a_match() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "2025-01-01.md", "");
        write(dir.path(), "ideas.md", "");

        let scanner = Scanner::new(&strings(&["2025-*"]), &[]).unwrap();
        let scan = scanner.scan(dir.path());
        let keys: Vec<&String> = scan.files.keys().collect();
        assert_eq!(keys, vec!["2025-01-01.md"]);
    }

    #[test]
    fn exclude_wins_over_include() {
        let scanner = Scanner::new(&strings(&["*.md"]), &strings(&["private.md"])).unwrap();
        assert!(scanner.admits("public.md"));
        assert!(!scanner.admits("private.md"));
        assert!(!scanner.admits("notes.txt"));
    }

    #[test]
    fn invalid_glob_is_a_config_error() {
        let err = Scanner::new(&strings(&["a[b"]), &[]).unwrap_err();
        assert!(matches!(err, KmError::Config(_)));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn non_utf8_markdown_name_is_reported() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "ok.md", "");
        fs::write(dir.path().join(OsStr::from_bytes(b"bad\xff.md")), "").unwrap();
        fs::write(dir.path().join(OsStr::from_bytes(b"bad\xff.png")), "").unwrap();

        let scan = Scanner::new(&[], &[]).unwrap().scan(dir.path());
        assert_eq!(scan.files.len(), 1);
        assert_eq!(scan.errors.len(), 1);
        assert!(scan.errors[0].starts_with("scan bad"));
        assert!(scan.errors[0].ends_with(": non-UTF-8 file name"));
    }

    #[test]
    fn missing_root_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let scan = Scanner::new(&[], &[])
            .unwrap()
            .scan(&dir.path().join("nope"));
        assert!(scan.files.is_empty());
        assert_eq!(scan.errors.len(), 1);
        assert!(scan.errors[0].starts_with("scan "));
    }
}

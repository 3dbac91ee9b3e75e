//! Filename sanitizing and sync-key normalization.

use std::path::{Component, Path};

/// Longest filename stem produced by [`sanitize`], in bytes.
pub const MAX_NAME_BYTES: usize = 200;

const INVALID_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Turn a title into a filename stem that is valid on common filesystems.
///
/// Characters reserved on Windows or Unix become `_`, surrounding whitespace
/// and dots are trimmed, and the result is cut to [`MAX_NAME_BYTES`] on a
/// character boundary.
#[must_use]
pub fn sanitize(title: &str) -> String {
    let replaced: String = title
        .chars()
        .map(|c| if INVALID_CHARS.contains(&c) { '_' } else { c })
        .collect();
    let trimmed = replaced.trim_matches(|c: char| c.is_whitespace() || c == '.');
    truncate_bytes(trimmed, MAX_NAME_BYTES).to_string()
}

/// Sync key for a path relative to the vault root: components joined by `/`
/// on every platform.
#[must_use]
pub fn to_sync_key(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Normalize a stored sync key: backslashes become `/`, empty and `.`
/// segments are dropped.
#[must_use]
pub fn normalize_key(key: &str) -> String {
    key.split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// True when a sync key stays inside the vault root (no `..`, not absolute).
#[must_use]
pub fn is_contained(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('/')
        && !key.split(['/', '\\']).any(|part| part == "..")
        && !Path::new(key).has_root()
}

fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

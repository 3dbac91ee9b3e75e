//! Tag extraction from markdown bodies and frontmatter.
//!
//! Tags are compared case-sensitively. Every function here returns tags in
//! first-seen order with duplicates removed.

use std::collections::HashSet;

/// Collect `#tag` tokens from a markdown body.
///
/// The body is split on whitespace; each token starting with `#` yields the
/// token minus its leading `#`, with further `#` and blanks trimmed from
/// both ends. Tokens that trim to nothing (a bare `#` heading marker) are
/// dropped.
#[must_use]
pub fn extract(body: &str) -> Vec<String> {
    let tokens = body
        .split_whitespace()
        .filter_map(|word| word.strip_prefix('#'))
        .map(|tag| tag.trim_matches(|c: char| matches!(c, '#' | ' ' | '\t' | '\n')))
        .filter(|tag| !tag.is_empty());
    dedupe(tokens)
}

/// Split a frontmatter `tags` value on commas.
#[must_use]
pub fn parse_csv(value: &str) -> Vec<String> {
    dedupe(value.split(',').map(str::trim).filter(|tag| !tag.is_empty()))
}

/// Concatenate `a` then `b`, keeping only the first occurrence of each tag.
#[must_use]
pub fn merge<A, B>(a: A, b: B) -> Vec<String>
where
    A: IntoIterator,
    A::Item: AsRef<str>,
    B: IntoIterator,
    B::Item: AsRef<str>,
{
    let a: Vec<A::Item> = a.into_iter().collect();
    let b: Vec<B::Item> = b.into_iter().collect();
    dedupe(
        a.iter()
            .map(AsRef::<str>::as_ref)
            .chain(b.iter().map(AsRef::<str>::as_ref)),
    )
}

/// Join tag names the way exported frontmatter carries them.
#[must_use]
pub fn join_csv<S: AsRef<str>>(tags: &[S]) -> String {
    tags.iter()
        .map(AsRef::<str>::as_ref)
        .collect::<Vec<_>>()
        .join(", ")
}

fn dedupe<'a>(tags: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for tag in tags {
        if seen.insert(tag) {
            out.push(tag.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn extracts_single_and_multiple_tags() {
        assert_eq!(extract("This is a document with #tag1"), vec!["tag1"]);
        assert_eq!(
            extract("Document with #tag1 and #tag2 #tag3"),
            vec!["tag1", "tag2", "tag3"]
        );
    }

    #[test]
    fn extract_dedupes_preserving_first_seen_order() {
        assert_eq!(extract("#b then #a and #b again"), vec!["b", "a"]);
    }

    #[test]
    fn extract_handles_non_ascii_tags() {
        assert_eq!(
            extract("文档包含 #中文标签 和 #微波技术"),
            vec!["中文标签", "微波技术"]
        );
    }

    #[test]
    fn heading_markers_are_not_tags() {
        assert_eq!(extract("# Title\n\nhello #foo #bar"), vec!["foo", "bar"]);
        assert!(extract("## Heading\n###").is_empty());
    }

    #[test]
    fn extra_hashes_are_trimmed() {
        assert_eq!(extract("##nested# #x##"), vec!["nested", "x"]);
    }

    #[test]
    fn tags_are_case_sensitive() {
        assert_eq!(extract("#Rust #rust"), vec!["Rust", "rust"]);
    }

    #[test]
    fn no_tags_yields_empty() {
        assert!(extract("Document without any tags").is_empty());
    }

    #[test]
    fn parse_csv_trims_and_skips_empty() {
        assert_eq!(parse_csv("a, b ,,c , "), vec!["a", "b", "c"]);
        assert!(parse_csv("").is_empty());
    }

    #[test]
    fn merge_without_duplicates() {
        assert_eq!(
            merge(["tag1", "tag2"], ["tag3", "tag4"]),
            vec!["tag1", "tag2", "tag3", "tag4"]
        );
    }

    #[test]
    fn merge_with_duplicates() {
        assert_eq!(
            merge(["tag1", "tag2"], ["tag2", "tag3"]),
            vec!["tag1", "tag2", "tag3"]
        );
    }

    #[test]
    fn merge_with_empty_sides() {
        let empty: [&str; 0] = [];
        assert_eq!(merge(empty, ["tag1", "tag2"]), vec!["tag1", "tag2"]);
        assert_eq!(merge(["tag1", "tag2"], empty), vec!["tag1", "tag2"]);
    }

    #[test]
    fn join_csv_round_trips_through_parse_csv() {
        let tags = vec!["radar".to_string(), "signal processing".to_string()];
        assert_eq!(join_csv(&tags), "radar, signal processing");
        assert_eq!(parse_csv(&join_csv(&tags)), tags);
    }

    proptest! {
        #[test]
        fn merge_is_prefix_preserving_and_unique(
            a in prop::collection::vec("[a-c]{1,2}", 0..8),
            b in prop::collection::vec("[a-c]{1,2}", 0..8),
        ) {
            let merged = merge(&a, &b);
            let unique: HashSet<&String> = merged.iter().collect();
            prop_assert_eq!(unique.len(), merged.len());

            for tag in a.iter().chain(b.iter()) {
                prop_assert!(merged.contains(tag));
            }
            let a_unique = merge(&a, Vec::<String>::new());
            prop_assert_eq!(&merged[..a_unique.len()], &a_unique[..]);
        }
    }
}

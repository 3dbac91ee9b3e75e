//! Frontmatter parsing and writing.
//!
//! Handles the `---` delimited header of vault markdown files. The header
//! is a flat list of `key: value` lines, not general YAML:
//! ```markdown
//! ---
//! title: Alpha
//! author: 01J9ZC3W5B6N8Q2R4T6V8X0Y2A
//! tags: radar, signal processing
//! updated: "2025-02-10T09:15:00+00:00"
//! ---
//! Body content here
//! ```
//!
//! The opening fence must be the first line. A document without an opening
//! fence, or without a closing fence, has empty metadata and is all body.
//!
//! Double-quoted values understand `\n`, `\r` and `\\` escapes, so a value
//! holding a line break always stays on one header line.

use std::collections::BTreeMap;

const FENCE: &str = "---";

/// Key-value metadata read from or written to a file header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frontmatter {
    fields: BTreeMap<String, String>,
}

impl Frontmatter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Value for `key`, or `""` when absent.
    #[must_use]
    pub fn get(&self, key: &str) -> &str {
        self.fields.get(key).map(String::as_str).unwrap_or("")
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Render the header block, fences included, ending with a newline.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(16 + self.fields.len() * 24);
        out.push_str(FENCE);
        out.push('\n');
        for (key, value) in &self.fields {
            out.push_str(key);
            out.push_str(": ");
            if needs_quotes(value) {
                out.push('"');
                push_escaped(&mut out, value);
                out.push('"');
            } else {
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push_str(FENCE);
        out.push('\n');
        out
    }
}

impl FromIterator<(String, String)> for Frontmatter {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Split a markdown document into its header metadata and body.
///
/// The body is everything after the line holding the closing fence,
/// returned verbatim.
#[must_use]
pub fn parse(content: &str) -> (Frontmatter, &str) {
    match split_frontmatter(content) {
        Some((header, body)) => (parse_header(header), body),
        None => (Frontmatter::new(), content),
    }
}

/// Write `meta` followed by `body` as a complete markdown document.
#[must_use]
pub fn compose(meta: &Frontmatter, body: &str) -> String {
    let mut out = meta.render();
    out.push_str(body);
    out
}

/// Locate the header between the first two fence lines.
///
/// Returns `(header, body)` or `None` if the document has no frontmatter.
fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let (first, mut rest) = next_line(content)?;
    if first != FENCE {
        return None;
    }

    let header_start = content.len() - rest.len();
    loop {
        let line_start = content.len() - rest.len();
        let (line, after) = next_line(rest)?;
        if line == FENCE {
            return Some((&content[header_start..line_start], after));
        }
        rest = after;
    }
}

/// Split off the first line, without its terminator. `None` at end of input.
fn next_line(s: &str) -> Option<(&str, &str)> {
    if s.is_empty() {
        return None;
    }
    let (line, rest) = match s.find('\n') {
        Some(pos) => (&s[..pos], &s[pos + 1..]),
        None => (s, ""),
    };
    Some((line.strip_suffix('\r').unwrap_or(line), rest))
}

fn parse_header(header: &str) -> Frontmatter {
    let mut meta = Frontmatter::new();
    for line in header.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        meta.insert(key, unquote(value.trim()));
    }
    meta
}

/// Remove one surrounding pair of matching single or double quotes,
/// decoding escapes inside double quotes.
fn unquote(value: &str) -> String {
    if let Some(inner) = strip_pair(value, '"') {
        return unescape(inner);
    }
    strip_pair(value, '\'').unwrap_or(value).to_string()
}

fn strip_pair(value: &str, quote: char) -> Option<&str> {
    (value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote))
        .then(|| &value[1..value.len() - 1])
}

fn push_escaped(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
}

/// Inverse of [`push_escaped`]. Unknown escapes are kept verbatim.
fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Values that would not survive a bare write-then-read get quoted.
fn needs_quotes(value: &str) -> bool {
    value.contains(':')
        || value.contains(['\n', '\r'])
        || value.trim() != value
        || value.starts_with(['"', '\''])
        || value.ends_with(['"', '\''])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_extracts_metadata_and_body() {
        let content = "---\ntitle: Test Document\nauthor: user123\ntags: tag1, tag2\n---\nThis is the body content.";
        let (meta, body) = parse(content);
        assert_eq!(meta.get("title"), "Test Document");
        assert_eq!(meta.get("author"), "user123");
        assert_eq!(meta.get("tags"), "tag1, tag2");
        assert_eq!(body, "This is the body content.");
    }

    #[test]
    fn parse_without_frontmatter_returns_whole_body() {
        let content = "Just content without frontmatter";
        let (meta, body) = parse(content);
        assert!(meta.is_empty());
        assert_eq!(body, content);
    }

    #[test]
    fn parse_empty_frontmatter() {
        let (meta, body) = parse("---\n---\nBody only");
        assert!(meta.is_empty());
        assert_eq!(body, "Body only");
    }

    #[test]
    fn opening_fence_must_be_first_line() {
        let content = "\n---\ntitle: x\n---\nbody";
        let (meta, body) = parse(content);
        assert!(meta.is_empty());
        assert_eq!(body, content);
    }

    #[test]
    fn missing_closing_fence_means_no_frontmatter() {
        let content = "---\ntitle: x\nno closer here";
        let (meta, body) = parse(content);
        assert!(meta.is_empty());
        assert_eq!(body, content);
    }

    #[test]
    fn fence_text_inside_a_line_is_not_a_fence() {
        let content = "---\ntitle: a---b\n---\nbody --- text";
        let (meta, body) = parse(content);
        assert_eq!(meta.get("title"), "a---b");
        assert_eq!(body, "body --- text");
    }

    #[test]
    fn later_fences_stay_in_body() {
        let (meta, body) = parse("---\na: 1\n---\nintro\n---\nmore");
        assert_eq!(meta.get("a"), "1");
        assert_eq!(body, "intro\n---\nmore");
    }

    #[test]
    fn value_splits_on_first_colon_and_strips_quotes() {
        let (meta, _) = parse("---\nurl: 'https://example.org'\nnote: \"x\"\n---\n");
        assert_eq!(meta.get("url"), "https://example.org");
        assert_eq!(meta.get("note"), "x");
    }

    #[test]
    fn mismatched_quotes_are_kept() {
        let (meta, _) = parse("---\nodd: \"half'\n---\n");
        assert_eq!(meta.get("odd"), "\"half'");
    }

    #[test]
    fn lines_without_colon_are_ignored() {
        let (meta, _) = parse("---\njust words\n: no key\ntitle: kept\n---\n");
        assert_eq!(meta.len(), 1);
        assert_eq!(meta.get("title"), "kept");
    }

    #[test]
    fn crlf_documents_parse() {
        let (meta, body) = parse("---\r\ntitle: Win\r\n---\r\nbody\r\n");
        assert_eq!(meta.get("title"), "Win");
        assert_eq!(body, "body\r\n");
    }

    #[test]
    fn render_quotes_values_with_colons() {
        let mut meta = Frontmatter::new();
        meta.insert("title", "a: b");
        meta.insert("plain", "value");
        let rendered = meta.render();
        assert!(rendered.contains("title: \"a: b\"\n"));
        assert!(rendered.contains("plain: value\n"));
        assert!(rendered.ends_with("---\n"));
    }

    #[test]
    fn colon_value_survives_round_trip() {
        let mut meta = Frontmatter::new();
        meta.insert("k", "a: b");
        let doc = compose(&meta, "");
        let (parsed, body) = parse(&doc);
        assert_eq!(parsed.get("k"), "a: b");
        assert_eq!(body, "");
    }

    #[test]
    fn line_breaks_in_values_cannot_close_the_header() {
        let mut meta = Frontmatter::new();
        meta.insert("title", "a\n---\nb");
        meta.insert("path", "C:\\notes\\new");
        meta.insert("updated", "2025-02-01T00:00:00+00:00");
        let doc = compose(&meta, "BODY");
        assert_eq!(doc.lines().filter(|l| *l == FENCE).count(), 2);

        let (parsed, body) = parse(&doc);
        assert_eq!(body, "BODY");
        assert_eq!(parsed, meta);
    }

    #[test]
    fn quoted_values_decode_known_escapes_only() {
        let (meta, _) = parse("---\na: \"x\\ny\"\nb: \"C:\\dir\"\nc: 'raw\\n'\n---\n");
        assert_eq!(meta.get("a"), "x\ny");
        assert_eq!(meta.get("b"), "C:\\dir");
        assert_eq!(meta.get("c"), "raw\\n");
    }

    #[test]
    fn compose_places_body_after_closing_fence() {
        let mut meta = Frontmatter::new();
        meta.insert("title", "T");
        let doc = compose(&meta, "B");
        assert_eq!(doc, "---\ntitle: T\n---\nB");
        let (_, body) = parse(&doc);
        assert_eq!(body, "B");
    }

    proptest! {
        #[test]
        fn any_value_survives_round_trip(
            fields in prop::collection::btree_map(
                "[a-z_]{1,12}",
                "[a-zA-Z0-9 :\"'\\\\\t\r\n-]{0,40}",
                0..8,
            ),
            body in "[^\r]{0,80}",
        ) {
            let meta: Frontmatter = fields.into_iter().collect();
            let doc = compose(&meta, &body);
            let (parsed, parsed_body) = parse(&doc);
            prop_assert_eq!(parsed, meta);
            prop_assert_eq!(parsed_body, body.as_str());
        }

        #[test]
        fn round_trip_for_values_without_colon_or_newline(
            fields in prop::collection::btree_map("[a-z_]{1,12}", "[^:\n\r]{0,40}", 0..8),
            body in "[^\r]{0,80}",
        ) {
            let meta: Frontmatter = fields.clone().into_iter().collect();
            let doc = compose(&meta, &body);
            let (parsed, parsed_body) = parse(&doc);
            prop_assert_eq!(parsed, meta);
            prop_assert_eq!(parsed_body, body.as_str());
        }
    }
}

//! Boundary to a Zotero-style reference manager.
//!
//! Item listings are paginated: each page reports the full result count in
//! the `Total-Results` response header, and callers advance `start` until
//! they have collected that many items.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ClientError, ClientResult};

/// Page size when a query does not set one.
pub const DEFAULT_PAGE_LIMIT: u32 = 25;

/// API version header sent with every request.
pub const API_VERSION_HEADER: (&str, &str) = ("Zotero-API-Version", "3");

pub const TOTAL_RESULTS_HEADER: &str = "Total-Results";

// ── Config ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceConfig {
    pub api_key: String,
    pub user_id: String,
}

impl ReferenceConfig {
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if either value is empty.
    pub fn new(api_key: &str, user_id: &str) -> ClientResult<Self> {
        if api_key.is_empty() {
            return Err(ClientError::Config("reference manager API key".into()));
        }
        if user_id.is_empty() {
            return Err(ClientError::Config("reference manager user id".into()));
        }
        Ok(Self {
            api_key: api_key.to_string(),
            user_id: user_id.to_string(),
        })
    }

    /// API key with all but the first and last four characters hidden.
    #[must_use]
    pub fn masked_key(&self) -> String {
        let key = &self.api_key;
        let chars: Vec<char> = key.chars().collect();
        if chars.len() <= 8 {
            return "***".to_string();
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    }
}

// ── Wire types ──────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Creator {
    pub creator_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    /// Single-field name for institutional creators.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemTag {
    pub tag: String,
    #[serde(default, rename = "type")]
    pub tag_type: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub key: String,
    pub version: i64,
    pub item_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub creators: Vec<Creator>,
    #[serde(default)]
    pub abstract_note: String,
    #[serde(default, rename = "publicationTitle")]
    pub publication: String,
    #[serde(default)]
    pub volume: String,
    #[serde(default)]
    pub issue: String,
    #[serde(default)]
    pub pages: String,
    #[serde(default)]
    pub date: String,
    #[serde(default, rename = "DOI")]
    pub doi: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub tags: Vec<ItemTag>,
    #[serde(default)]
    pub collections: Vec<String>,
    #[serde(default)]
    pub relations: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub key: String,
    pub item_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub key: String,
    pub version: i64,
    pub name: String,
    #[serde(default)]
    pub parent_collection: Option<String>,
}

/// One page of items plus the full result count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPage {
    pub items: Vec<Item>,
    pub total_results: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentFile {
    pub data: Vec<u8>,
    pub content_type: String,
}

// ── Queries ─────────────────────────────────────────

/// Query parameters for item listings. Zero/empty fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemQueryOptions {
    pub limit: u32,
    pub start: u32,
    pub sort: String,
    pub direction: String,
    /// Restrict to one collection (changes the request path).
    pub collection: String,
    pub tag: String,
    /// Full-text query.
    pub q: String,
    pub item_type: String,
    /// Library version; only items modified after it are returned.
    pub since: i64,
}

impl ItemQueryOptions {
    /// Path for the listing, relative to the API base.
    #[must_use]
    pub fn path(&self, user_id: &str) -> String {
        if self.collection.is_empty() {
            format!("/users/{user_id}/items")
        } else {
            format!("/users/{user_id}/collections/{}/items", self.collection)
        }
    }

    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let limit = if self.limit > 0 {
            self.limit
        } else {
            DEFAULT_PAGE_LIMIT
        };
        let mut pairs = vec![("limit", limit.to_string())];
        if self.start > 0 {
            pairs.push(("start", self.start.to_string()));
        }
        for (name, value) in [
            ("sort", &self.sort),
            ("direction", &self.direction),
            ("tag", &self.tag),
            ("q", &self.q),
            ("itemType", &self.item_type),
        ] {
            if !value.is_empty() {
                pairs.push((name, value.clone()));
            }
        }
        if self.since > 0 {
            pairs.push(("since", self.since.to_string()));
        }
        pairs
    }
}

/// Read the `Total-Results` header value. Missing or malformed values
/// count as zero.
#[must_use]
pub fn parse_total_results(header: Option<&str>) -> usize {
    header.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

// ── Boundary ────────────────────────────────────────

#[async_trait]
pub trait ReferenceManager: Send + Sync {
    /// Validate credentials with a one-item listing.
    async fn test_connection(&self) -> ClientResult<()>;

    async fn get_items(&self, options: &ItemQueryOptions) -> ClientResult<ItemPage>;

    /// Returns [`ClientError::NotFound`] for an unknown key.
    async fn get_item(&self, key: &str) -> ClientResult<Item>;

    /// Attachments and notes under `key`.
    async fn get_item_children(&self, key: &str) -> ClientResult<Vec<Attachment>>;

    async fn get_collections(&self) -> ClientResult<Vec<Collection>>;

    async fn get_tags(&self) -> ClientResult<Vec<ItemTag>>;

    /// Returns [`ClientError::LinkedAttachment`] when the attachment has no
    /// stored file.
    async fn download_attachment(&self, key: &str) -> ClientResult<AttachmentFile>;

    /// Page through every item matching `options`, starting at
    /// `options.start`.
    async fn fetch_all_items(&self, options: &ItemQueryOptions) -> ClientResult<Vec<Item>> {
        let mut query = options.clone();
        let mut items = Vec::new();
        loop {
            let page = self.get_items(&query).await?;
            let fetched = page.items.len();
            items.extend(page.items);
            debug!(fetched, total = page.total_results, "fetched item page");

            let seen = query.start as usize + fetched;
            if fetched == 0 || seen >= page.total_results {
                return Ok(items);
            }
            query.start = u32::try_from(seen)
                .map_err(|_| ClientError::Decode(format!("item offset {seen} out of range")))?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct PagedLibrary {
        total: usize,
        starts: Mutex<Vec<u32>>,
    }

    fn item(key: &str) -> Item {
        serde_json::from_value(serde_json::json!({
            "key": key, "version": 1, "itemType": "journalArticle"
        }))
        .unwrap()
    }

    #[async_trait]
    impl ReferenceManager for PagedLibrary {
        async fn test_connection(&self) -> ClientResult<()> {
            Ok(())
        }

        async fn get_items(&self, options: &ItemQueryOptions) -> ClientResult<ItemPage> {
            self.starts.lock().push(options.start);
            let limit = options.limit.max(1) as usize;
            let start = options.start as usize;
            let end = (start + limit).min(self.total);
            let items = (start..end).map(|i| item(&format!("K{i}"))).collect();
            Ok(ItemPage {
                items,
                total_results: self.total,
            })
        }

        async fn get_item(&self, key: &str) -> ClientResult<Item> {
            Err(ClientError::NotFound {
                resource: format!("item {key}"),
            })
        }

        async fn get_item_children(&self, _key: &str) -> ClientResult<Vec<Attachment>> {
            Ok(Vec::new())
        }

        async fn get_collections(&self) -> ClientResult<Vec<Collection>> {
            Ok(Vec::new())
        }

        async fn get_tags(&self) -> ClientResult<Vec<ItemTag>> {
            Ok(Vec::new())
        }

        async fn download_attachment(&self, key: &str) -> ClientResult<AttachmentFile> {
            Err(ClientError::LinkedAttachment(key.to_string()))
        }
    }

    #[test]
    fn default_query_sets_limit_only() {
        let options = ItemQueryOptions::default();
        assert_eq!(options.query_pairs(), vec![("limit", "25".to_string())]);
        assert_eq!(options.path("42"), "/users/42/items");
    }

    #[test]
    fn query_includes_set_fields_in_order() {
        let options = ItemQueryOptions {
            limit: 100,
            start: 50,
            sort: "dateModified".into(),
            direction: "desc".into(),
            collection: "ABCD".into(),
            q: "radar".into(),
            item_type: "book".into(),
            since: 812,
            ..ItemQueryOptions::default()
        };
        let keys: Vec<&str> = options.query_pairs().iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            vec!["limit", "start", "sort", "direction", "q", "itemType", "since"]
        );
        assert_eq!(options.path("42"), "/users/42/collections/ABCD/items");
    }

    #[test]
    fn total_results_header_parsing() {
        assert_eq!(parse_total_results(Some("137")), 137);
        assert_eq!(parse_total_results(Some(" 9 ")), 9);
        assert_eq!(parse_total_results(Some("lots")), 0);
        assert_eq!(parse_total_results(None), 0);
    }

    #[test]
    fn config_requires_both_values_and_masks_key() {
        assert!(matches!(
            ReferenceConfig::new("", "1"),
            Err(ClientError::Config(_))
        ));
        assert!(ReferenceConfig::new("k", "").is_err());

        let config = ReferenceConfig::new("abcd1234efgh5678", "1").unwrap();
        assert_eq!(config.masked_key(), "abcd...5678");
        assert_eq!(ReferenceConfig::new("short", "1").unwrap().masked_key(), "***");
    }

    #[test]
    fn item_decodes_wire_names() {
        let item: Item = serde_json::from_str(
            r#"{
                "key": "X1", "version": 4, "itemType": "journalArticle",
                "title": "Sparse arrays", "DOI": "10.1/xyz",
                "publicationTitle": "IEEE TAP", "abstractNote": "An abstract",
                "creators": [{"creatorType": "author", "lastName": "Doe", "firstName": "J"}],
                "tags": [{"tag": "radar"}, {"tag": "auto", "type": 1}]
            }"#,
        )
        .unwrap();
        assert_eq!(item.doi, "10.1/xyz");
        assert_eq!(item.publication, "IEEE TAP");
        assert_eq!(item.creators[0].last_name, "Doe");
        assert_eq!(item.tags[1].tag_type, 1);
        assert!(item.collections.is_empty());
    }

    #[tokio::test]
    async fn fetch_all_items_pages_until_total() {
        let library = PagedLibrary {
            total: 7,
            starts: Mutex::new(Vec::new()),
        };
        let options = ItemQueryOptions {
            limit: 3,
            ..ItemQueryOptions::default()
        };
        let items = library.fetch_all_items(&options).await.unwrap();

        assert_eq!(items.len(), 7);
        assert_eq!(items[6].key, "K6");
        assert_eq!(*library.starts.lock(), vec![0, 3, 6]);
    }

    #[tokio::test]
    async fn fetch_all_items_stops_on_empty_page() {
        let library = PagedLibrary {
            total: 0,
            starts: Mutex::new(Vec::new()),
        };
        let items = library
            .fetch_all_items(&ItemQueryOptions::default())
            .await
            .unwrap();
        assert!(items.is_empty());
        assert_eq!(library.starts.lock().len(), 1);
    }
}

//! Core data models shared by the dispatcher, the built-in handlers and the
//! index synchronizer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Site identifier that is stored without a key prefix.
pub const DEFAULT_SITE_ID: &str = "default";

/// Collapses the default site onto the un-prefixed key space.
pub fn site_scope(site_id: Option<&str>) -> Option<&str> {
    match site_id {
        Some(DEFAULT_SITE_ID) | None => None,
        Some(s) if s.trim().is_empty() => None,
        Some(s) => Some(s),
    }
}

/// Builds a storage key, prefixing it with `<siteId>/` for non-default sites.
pub fn create_database_key(site_id: Option<&str>, id: &str) -> String {
    match site_scope(site_id) {
        Some(site) => format!("{}/{}", site, id),
        None => id.to_string(),
    }
}

/// Stored document metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub document_id: String,
    pub path: Option<String>,
    pub content_type: Option<String>,
    pub user_id: Option<String>,
    pub inserted_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

/// A registered inbound webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    pub webhook_id: String,
    pub name: String,
    pub user_id: String,
    /// `"true"`, `"false"` or `"private"`.
    pub enabled: String,
    pub inserted_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_live: Option<i64>,
}

impl Webhook {
    /// Whether the webhook accepts calls on the public surface.
    pub fn is_public(&self) -> bool {
        self.enabled == "true"
    }

    /// Whether the webhook accepts calls on the authenticated surface.
    pub fn is_private(&self) -> bool {
        self.enabled == "true" || self.enabled == "private"
    }
}

/// Searchable content of one indexed document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFields {
    /// Free-text fields (`path`, `content`, `text`, ...).
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    /// Tag key/value pairs.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// Mutation carried by an [`IndexChangeRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    #[serde(alias = "INSERT")]
    Insert,
    #[serde(alias = "modify", alias = "MODIFY")]
    Update,
    #[serde(alias = "remove", alias = "REMOVE")]
    Delete,
}

/// One document/tag mutation to be reflected in the search index.
///
/// Any scalar-valued key that is not one of the named fields is treated as
/// a searchable text field, so `{"operation":"insert","documentId":"d1",
/// "text":"karate"}` indexes `text`. Numbers and booleans are stored in
/// their JSON text form; nested values are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawChangeRecord")]
pub struct IndexChangeRecord {
    pub operation: ChangeOperation,
    pub document_id: String,
    #[serde(default)]
    pub site_id: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChangeRecord {
    operation: ChangeOperation,
    document_id: String,
    #[serde(default)]
    site_id: Option<String>,
    #[serde(default)]
    tags: BTreeMap<String, Value>,
    #[serde(flatten)]
    fields: BTreeMap<String, Value>,
}

impl From<RawChangeRecord> for IndexChangeRecord {
    fn from(raw: RawChangeRecord) -> Self {
        Self {
            operation: raw.operation,
            document_id: raw.document_id,
            site_id: raw.site_id,
            tags: scalar_map(raw.tags),
            fields: scalar_map(raw.fields),
        }
    }
}

fn scalar_map(values: BTreeMap<String, Value>) -> BTreeMap<String, String> {
    values
        .into_iter()
        .filter_map(|(k, v)| match v {
            Value::String(s) => Some((k, s)),
            Value::Number(n) => Some((k, n.to_string())),
            Value::Bool(b) => Some((k, b.to_string())),
            _ => None,
        })
        .collect()
}

impl IndexChangeRecord {
    /// The index payload for insert/update records.
    pub fn index_fields(&self) -> IndexFields {
        IndexFields {
            fields: self.fields.clone(),
            tags: self.tags.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_key_default_site_unprefixed() {
        assert_eq!(create_database_key(None, "abc"), "abc");
        assert_eq!(create_database_key(Some("default"), "abc"), "abc");
        assert_eq!(create_database_key(Some("finance"), "abc"), "finance/abc");
    }

    #[test]
    fn test_change_record_collects_text_fields() {
        let record: IndexChangeRecord = serde_json::from_str(
            r#"{"operation":"insert","documentId":"d1","siteId":null,"text":"karate"}"#,
        )
        .unwrap();
        assert_eq!(record.operation, ChangeOperation::Insert);
        assert_eq!(record.site_id, None);
        assert_eq!(record.fields.get("text").map(String::as_str), Some("karate"));
        assert!(record.tags.is_empty());
    }

    #[test]
    fn test_change_record_accepts_scalar_fields() {
        let record: IndexChangeRecord = serde_json::from_str(
            r#"{"operation":"insert","documentId":"d1","content":"karate","size":5,
                "draft":false,"meta":{"x":1},"tags":{"rank":2}}"#,
        )
        .unwrap();
        assert_eq!(record.fields.get("size").map(String::as_str), Some("5"));
        assert_eq!(record.fields.get("draft").map(String::as_str), Some("false"));
        assert!(!record.fields.contains_key("meta"));
        assert_eq!(record.tags.get("rank").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_change_operation_aliases() {
        let op: ChangeOperation = serde_json::from_str("\"MODIFY\"").unwrap();
        assert_eq!(op, ChangeOperation::Update);
        let op: ChangeOperation = serde_json::from_str("\"remove\"").unwrap();
        assert_eq!(op, ChangeOperation::Delete);
    }

    #[test]
    fn test_webhook_enabled_modes() {
        let mut hook = Webhook {
            webhook_id: "w1".to_string(),
            name: "joe".to_string(),
            user_id: "joe".to_string(),
            enabled: "private".to_string(),
            inserted_date: Utc::now(),
            time_to_live: None,
        };
        assert!(hook.is_private());
        assert!(!hook.is_public());
        hook.enabled = "true".to_string();
        assert!(hook.is_public());
        hook.enabled = "false".to_string();
        assert!(!hook.is_private());
    }
}

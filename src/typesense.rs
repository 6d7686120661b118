//! Typesense-backed [`SearchIndex`].
//!
//! One collection per site (`default` for the un-prefixed site). Documents
//! are written with `action=upsert`, so redelivered change records leave a
//! single entry. Collections are created lazily on the first write.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde_json::{json, Map, Value};
use std::time::Duration;

use docgate_core::models::{site_scope, IndexFields, DEFAULT_SITE_ID};
use docgate_core::store::SearchIndex;

use crate::config::SearchConfig;

const API_KEY_HEADER: &str = "X-TYPESENSE-API-KEY";
const QUERY_BY: &str = "content,path,text,tags";

pub struct TypesenseIndex {
    client: reqwest::Client,
    host: String,
    api_key: String,
}

impl TypesenseIndex {
    pub fn new(host: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        let host = config
            .host
            .as_deref()
            .context("search.host is required for typesense")?;
        let api_key = config
            .api_key
            .as_deref()
            .context("search.api_key is required for typesense")?;
        Self::new(host, api_key, Duration::from_secs(config.timeout_secs))
    }

    fn url(&self, path: &str) -> Result<Url> {
        Url::parse(&format!("{}{}", self.host, path))
            .with_context(|| format!("Invalid typesense URL: {}{}", self.host, path))
    }

    async fn create_collection(&self, collection: &str) -> Result<()> {
        let resp = self
            .client
            .post(self.url("/collections")?)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&collection_schema(collection))
            .send()
            .await
            .context("Failed to create typesense collection")?;

        // 409: created concurrently by another invocation
        if !resp.status().is_success() && resp.status() != StatusCode::CONFLICT {
            bail!("typesense create collection returned {}", resp.status());
        }
        Ok(())
    }

    async fn post_upsert(&self, collection: &str, body: &Value) -> Result<StatusCode> {
        let mut url = self.url(&format!("/collections/{}/documents", collection))?;
        url.query_pairs_mut().append_pair("action", "upsert");
        let resp = self
            .client
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await
            .context("Failed to upsert typesense document")?;
        Ok(resp.status())
    }
}

/// Collection name for a site.
pub fn collection_name(site_id: Option<&str>) -> String {
    site_scope(site_id).unwrap_or(DEFAULT_SITE_ID).to_string()
}

fn collection_schema(collection: &str) -> Value {
    json!({
        "name": collection,
        "fields": [
            { "name": "content", "type": "string", "optional": true },
            { "name": "path", "type": "string", "optional": true },
            { "name": "text", "type": "string", "optional": true },
            { "name": "tags", "type": "string[]", "optional": true },
            { "name": ".*", "type": "auto" }
        ]
    })
}

/// Typesense document for `fields`; tags are flattened to `key=value` strings.
pub fn document_body(document_id: &str, fields: &IndexFields) -> Value {
    let mut doc = Map::new();
    for (k, v) in &fields.fields {
        doc.insert(k.clone(), Value::String(v.clone()));
    }
    if !fields.tags.is_empty() {
        let tags: Vec<Value> = fields
            .tags
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    Value::String(k.clone())
                } else {
                    Value::String(format!("{}={}", k, v))
                }
            })
            .collect();
        doc.insert("tags".to_string(), Value::Array(tags));
    }
    doc.insert("id".to_string(), Value::String(document_id.to_string()));
    Value::Object(doc)
}

#[async_trait]
impl SearchIndex for TypesenseIndex {
    async fn upsert(
        &self,
        site_id: Option<&str>,
        document_id: &str,
        fields: &IndexFields,
    ) -> Result<()> {
        let collection = collection_name(site_id);
        let body = document_body(document_id, fields);

        let mut status = self.post_upsert(&collection, &body).await?;
        if status == StatusCode::NOT_FOUND {
            self.create_collection(&collection).await?;
            status = self.post_upsert(&collection, &body).await?;
        }

        if !status.is_success() {
            bail!("typesense upsert of {} returned {}", document_id, status);
        }
        Ok(())
    }

    async fn delete(&self, site_id: Option<&str>, document_id: &str) -> Result<()> {
        let collection = collection_name(site_id);
        let mut url = self.url(&format!("/collections/{}/documents", collection))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("typesense host cannot be a base URL"))?
            .push(document_id);

        let resp = self
            .client
            .delete(url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .context("Failed to delete typesense document")?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()),
            s => bail!("typesense delete of {} returned {}", document_id, s),
        }
    }

    async fn search_fulltext(
        &self,
        site_id: Option<&str>,
        query: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        let collection = collection_name(site_id);
        let mut url = self.url(&format!("/collections/{}/documents/search", collection))?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("query_by", QUERY_BY)
            .append_pair("per_page", &limit.to_string());

        let resp = self
            .client
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .context("Failed to search typesense")?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !resp.status().is_success() {
            bail!("typesense search returned {}", resp.status());
        }

        let body: Value = resp.json().await.context("Invalid typesense response")?;
        Ok(hit_ids(&body))
    }
}

fn hit_ids(body: &Value) -> Vec<String> {
    body.get("hits")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .filter_map(|h| h.pointer("/document/id").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

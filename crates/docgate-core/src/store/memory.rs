//! In-memory collaborator implementations for tests and local runs.
//!
//! Uses `HashMap`/`BTreeMap` behind `std::sync::RwLock` for thread safety.
//! Full-text search is brute-force over every indexed document of a site
//! using [`crate::search::rank`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, RwLock};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::models::{site_scope, Document, IndexFields, Webhook};
use crate::search::rank;

use super::{DocumentStore, ObjectStore, ParameterStore, Publisher, SearchIndex, WebhookStore};

type SiteKey = (Option<String>, String);

fn site_key(site_id: Option<&str>, id: &str) -> SiteKey {
    (site_scope(site_id).map(str::to_string), id.to_string())
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

/// In-memory document, webhook, object and parameter storage.
pub struct InMemoryStore {
    docs: RwLock<HashMap<SiteKey, Document>>,
    webhooks: RwLock<HashMap<SiteKey, Webhook>>,
    objects: RwLock<HashMap<(String, String), Vec<u8>>>,
    parameters: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            webhooks: RwLock::new(HashMap::new()),
            objects: RwLock::new(HashMap::new()),
            parameters: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get_document(
        &self,
        site_id: Option<&str>,
        document_id: &str,
    ) -> Result<Option<Document>> {
        let docs = self.docs.read().map_err(poisoned)?;
        Ok(docs.get(&site_key(site_id, document_id)).cloned())
    }

    async fn put_document(&self, site_id: Option<&str>, doc: &Document) -> Result<()> {
        let mut docs = self.docs.write().map_err(poisoned)?;
        docs.insert(site_key(site_id, &doc.document_id), doc.clone());
        Ok(())
    }

    async fn delete_document(&self, site_id: Option<&str>, document_id: &str) -> Result<bool> {
        let mut docs = self.docs.write().map_err(poisoned)?;
        Ok(docs.remove(&site_key(site_id, document_id)).is_some())
    }

    async fn list_documents(&self, site_id: Option<&str>, limit: usize) -> Result<Vec<Document>> {
        let scope = site_scope(site_id).map(str::to_string);
        let docs = self.docs.read().map_err(poisoned)?;
        let mut out: Vec<Document> = docs
            .iter()
            .filter(|((site, _), _)| *site == scope)
            .map(|(_, d)| d.clone())
            .collect();
        out.sort_by(|a, b| {
            b.inserted_date
                .cmp(&a.inserted_date)
                .then_with(|| a.document_id.cmp(&b.document_id))
        });
        out.truncate(limit);
        Ok(out)
    }
}

#[async_trait]
impl WebhookStore for InMemoryStore {
    async fn save_webhook(&self, site_id: Option<&str>, hook: &Webhook) -> Result<()> {
        let mut hooks = self.webhooks.write().map_err(poisoned)?;
        hooks.insert(site_key(site_id, &hook.webhook_id), hook.clone());
        Ok(())
    }

    async fn find_webhook(&self, site_id: Option<&str>, webhook_id: &str) -> Result<Option<Webhook>> {
        let hooks = self.webhooks.read().map_err(poisoned)?;
        Ok(hooks.get(&site_key(site_id, webhook_id)).cloned())
    }

    async fn list_webhooks(&self, site_id: Option<&str>) -> Result<Vec<Webhook>> {
        let scope = site_scope(site_id).map(str::to_string);
        let hooks = self.webhooks.read().map_err(poisoned)?;
        let mut out: Vec<Webhook> = hooks
            .iter()
            .filter(|((site, _), _)| *site == scope)
            .map(|(_, h)| h.clone())
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.webhook_id.cmp(&b.webhook_id)));
        Ok(out)
    }

    async fn delete_webhook(&self, site_id: Option<&str>, webhook_id: &str) -> Result<bool> {
        let mut hooks = self.webhooks.write().map_err(poisoned)?;
        Ok(hooks.remove(&site_key(site_id, webhook_id)).is_some())
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn get_object_as_string(&self, bucket: &str, key: &str) -> Result<Option<String>> {
        let objects = self.objects.read().map_err(poisoned)?;
        match objects.get(&(bucket.to_string(), key.to_string())) {
            Some(bytes) => Ok(Some(String::from_utf8(bytes.clone())?)),
            None => Ok(None),
        }
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content: &[u8],
        _content_type: Option<&str>,
    ) -> Result<()> {
        if bucket.is_empty() {
            bail!("bucket name must not be empty");
        }
        let mut objects = self.objects.write().map_err(poisoned)?;
        objects.insert((bucket.to_string(), key.to_string()), content.to_vec());
        Ok(())
    }
}

#[async_trait]
impl ParameterStore for InMemoryStore {
    async fn get_parameter(&self, name: &str) -> Result<Option<String>> {
        let params = self.parameters.read().map_err(poisoned)?;
        Ok(params.get(name).cloned())
    }

    async fn put_parameter(&self, name: &str, value: &str) -> Result<()> {
        let mut params = self.parameters.write().map_err(poisoned)?;
        params.insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_parameter(&self, name: &str) -> Result<()> {
        let mut params = self.parameters.write().map_err(poisoned)?;
        params.remove(name);
        Ok(())
    }
}

/// In-memory full-text index.
pub struct InMemoryIndex {
    docs: RwLock<BTreeMap<SiteKey, IndexFields>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of indexed entries across all sites.
    pub fn len(&self) -> usize {
        self.docs.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchIndex for InMemoryIndex {
    async fn upsert(
        &self,
        site_id: Option<&str>,
        document_id: &str,
        fields: &IndexFields,
    ) -> Result<()> {
        if document_id.trim().is_empty() {
            bail!("documentId must not be empty");
        }
        let mut docs = self.docs.write().map_err(poisoned)?;
        docs.insert(site_key(site_id, document_id), fields.clone());
        Ok(())
    }

    async fn delete(&self, site_id: Option<&str>, document_id: &str) -> Result<()> {
        let mut docs = self.docs.write().map_err(poisoned)?;
        docs.remove(&site_key(site_id, document_id));
        Ok(())
    }

    async fn search_fulltext(
        &self,
        site_id: Option<&str>,
        query: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        let scope = site_scope(site_id).map(str::to_string);
        let docs = self.docs.read().map_err(poisoned)?;
        let candidates = docs
            .iter()
            .filter(|((site, _), _)| *site == scope)
            .map(|((_, id), fields)| (id.as_str(), fields));
        Ok(rank(query, candidates, limit))
    }
}

/// Publisher that records every payload instead of sending it.
///
/// `failing()` builds one whose publishes always error, for exercising
/// best-effort delivery paths.
pub struct RecordingPublisher {
    sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// `(address, payload)` pairs in publish order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Default for RecordingPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, address: &str, json_payload: &str) -> Result<()> {
        if self.fail {
            bail!("publish to {} refused", address);
        }
        let mut sent = self.sent.lock().map_err(poisoned)?;
        sent.push((address.to_string(), json_payload.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn text(value: &str) -> IndexFields {
        let mut fields = IndexFields::default();
        fields.fields.insert("text".to_string(), value.to_string());
        fields
    }

    fn document(id: &str, age_secs: i64) -> Document {
        Document {
            document_id: id.to_string(),
            path: Some(format!("{}.txt", id)),
            content_type: Some("text/plain".to_string()),
            user_id: Some("joe".to_string()),
            inserted_date: Utc::now() - Duration::seconds(age_secs),
            content_length: None,
            tags: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_index_upsert_is_idempotent() {
        let index = InMemoryIndex::new();
        index.upsert(None, "d1", &text("karate")).await.unwrap();
        index.upsert(None, "d1", &text("karate kid")).await.unwrap();
        assert_eq!(index.len(), 1);
        let hits = index.search_fulltext(None, "kid", 10).await.unwrap();
        assert_eq!(hits, vec!["d1"]);
    }

    #[tokio::test]
    async fn test_index_delete_missing_is_ok() {
        let index = InMemoryIndex::new();
        index.delete(None, "nope").await.unwrap();
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_index_sites_are_isolated() {
        let index = InMemoryIndex::new();
        index.upsert(Some("finance"), "d1", &text("karate")).await.unwrap();
        assert!(index.search_fulltext(None, "karate", 10).await.unwrap().is_empty());
        assert_eq!(
            index.search_fulltext(Some("finance"), "karate", 10).await.unwrap(),
            vec!["d1"]
        );
        // the default site shares the un-prefixed key space
        index.upsert(Some("default"), "d2", &text("karate")).await.unwrap();
        assert_eq!(index.search_fulltext(None, "karate", 10).await.unwrap(), vec!["d2"]);
    }

    #[tokio::test]
    async fn test_list_documents_newest_first() {
        let store = InMemoryStore::new();
        store.put_document(None, &document("old", 100)).await.unwrap();
        store.put_document(None, &document("new", 1)).await.unwrap();
        store.put_document(Some("other"), &document("elsewhere", 0)).await.unwrap();
        let ids: Vec<String> = store.list_documents(None, 10).await
            .unwrap()
            .into_iter()
            .map(|d| d.document_id)
            .collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn test_objects_and_parameters() {
        let store = InMemoryStore::new();
        store.put_object("bucket", "k", b"hello", None).await.unwrap();
        assert_eq!(
            store.get_object_as_string("bucket", "k").await.unwrap().as_deref(),
            Some("hello")
        );
        assert!(store.get_object_as_string("bucket", "missing").await.unwrap().is_none());

        store.put_parameter("/dev/version", "1.2").await.unwrap();
        assert_eq!(
            store.get_parameter("/dev/version").await.unwrap().as_deref(),
            Some("1.2")
        );
        store.remove_parameter("/dev/version").await.unwrap();
        store.remove_parameter("/dev/version").await.unwrap();
        assert!(store.get_parameter("/dev/version").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recording_publisher() {
        let publisher = RecordingPublisher::new();
        publisher.publish("queue", "{}").await.unwrap();
        assert_eq!(publisher.sent(), vec![("queue".to_string(), "{}".to_string())]);
        assert!(RecordingPublisher::failing().publish("queue", "{}").await.is_err());
    }
}

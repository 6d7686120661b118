//! Collaborator abstractions for docgate.
//!
//! The dispatcher and its handlers never talk to a concrete backend; they
//! call through the traits below, which lets the same handler catalog run
//! against in-memory stores in tests and remote services in production.
//!
//! Implementations must be `Send + Sync`: a single instance is built at
//! startup and shared by every concurrent invocation.
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`DocumentStore`] | Document metadata by `(siteId, documentId)` |
//! | [`WebhookStore`] | Registered webhooks by `(siteId, webhookId)` |
//! | [`ObjectStore`] | Raw object content by `(bucket, key)` |
//! | [`ParameterStore`] | Named configuration parameters |
//! | [`Publisher`] | Pub/sub publish of JSON payloads |
//! | [`SearchIndex`] | Full-text index of documents |

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Document, IndexFields, Webhook};

/// Document metadata persistence.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document, or `None` if it does not exist.
    async fn get_document(&self, site_id: Option<&str>, document_id: &str)
        -> Result<Option<Document>>;

    /// Insert or replace a document.
    async fn put_document(&self, site_id: Option<&str>, doc: &Document) -> Result<()>;

    /// Remove a document. Returns `false` if it did not exist.
    async fn delete_document(&self, site_id: Option<&str>, document_id: &str) -> Result<bool>;

    /// List a site's documents, newest first.
    async fn list_documents(&self, site_id: Option<&str>, limit: usize) -> Result<Vec<Document>>;
}

/// Webhook registration persistence.
#[async_trait]
pub trait WebhookStore: Send + Sync {
    /// Insert or replace a webhook.
    async fn save_webhook(&self, site_id: Option<&str>, hook: &Webhook) -> Result<()>;

    /// Fetch a webhook, or `None` if it does not exist.
    async fn find_webhook(&self, site_id: Option<&str>, webhook_id: &str) -> Result<Option<Webhook>>;

    /// List a site's webhooks ordered by name.
    async fn list_webhooks(&self, site_id: Option<&str>) -> Result<Vec<Webhook>>;

    /// Remove a webhook. Returns `false` if it did not exist.
    async fn delete_webhook(&self, site_id: Option<&str>, webhook_id: &str) -> Result<bool>;
}

/// Object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read an object as UTF-8 text, or `None` if the key is absent.
    async fn get_object_as_string(&self, bucket: &str, key: &str) -> Result<Option<String>>;

    /// Write an object, replacing any previous content.
    async fn put_object(&self, bucket: &str, key: &str, content: &[u8], content_type: Option<&str>)
        -> Result<()>;
}

/// Named parameter/secret storage.
#[async_trait]
pub trait ParameterStore: Send + Sync {
    async fn get_parameter(&self, name: &str) -> Result<Option<String>>;

    async fn put_parameter(&self, name: &str, value: &str) -> Result<()>;

    /// Remove a parameter. Removing a missing parameter is not an error.
    async fn remove_parameter(&self, name: &str) -> Result<()>;
}

/// Pub/sub publish.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish a JSON payload to a topic or queue address.
    async fn publish(&self, address: &str, json_payload: &str) -> Result<()>;
}

/// Full-text search index keyed by `(siteId, documentId)`.
///
/// `upsert` and `delete` must be idempotent: the change feed may redeliver.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Insert or replace the indexed content of a document.
    async fn upsert(&self, site_id: Option<&str>, document_id: &str, fields: &IndexFields)
        -> Result<()>;

    /// Remove a document. Deleting a missing entry succeeds.
    async fn delete(&self, site_id: Option<&str>, document_id: &str) -> Result<()>;

    /// Document ids matching `query`, best match first.
    async fn search_fulltext(&self, site_id: Option<&str>, query: &str, limit: usize)
        -> Result<Vec<String>>;
}

//! Index synchronizer: applies document/tag change records to the search
//! index.
//!
//! A queued message body holds either one change record
//!
//! ```json
//! { "operation": "insert", "documentId": "d1", "siteId": null, "text": "karate" }
//! ```
//!
//! an array of them, or a change-capture feed:
//!
//! ```json
//! { "Records": [ { "eventName": "MODIFY",
//!     "dynamodb": { "Keys": { "PK": { "S": "finance/docs#d1" } },
//!                   "NewImage": { "path": { "S": "a.pdf" },
//!                                 "tags": { "M": { "x": { "S": "y" } } } } } } ] }
//! ```
//!
//! Records are applied in order. A failing record is logged and skipped;
//! it never blocks the records after it.

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use docgate_core::models::{ChangeOperation, IndexChangeRecord};
use docgate_core::store::SearchIndex;

use crate::event::QueuedMessage;

const DOCS_PREFIX: &str = "docs#";

/// Counts from one [`IndexSynchronizer::apply_all`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub applied: usize,
    pub failed: usize,
}

pub struct IndexSynchronizer {
    index: Arc<dyn SearchIndex>,
}

impl IndexSynchronizer {
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self { index }
    }

    /// Applies one record. Insert and update upsert; delete removes.
    pub async fn apply(&self, record: &IndexChangeRecord) -> Result<()> {
        let site_id = record.site_id.as_deref();
        match record.operation {
            ChangeOperation::Insert | ChangeOperation::Update => {
                self.index
                    .upsert(site_id, &record.document_id, &record.index_fields())
                    .await
            }
            ChangeOperation::Delete => self.index.delete(site_id, &record.document_id).await,
        }
    }

    /// Applies records in order, isolating failures per record.
    pub async fn apply_all(&self, records: &[IndexChangeRecord]) -> SyncReport {
        let mut report = SyncReport::default();
        for record in records {
            match self.apply(record).await {
                Ok(()) => report.applied += 1,
                Err(err) => {
                    report.failed += 1;
                    tracing::warn!(
                        document_id = %record.document_id,
                        operation = ?record.operation,
                        error = %err,
                        "index change failed"
                    );
                }
            }
        }
        report
    }

    /// Applies every change record carried by a queued message.
    ///
    /// Fails only when the message body is missing or is not JSON. Records
    /// that cannot be read are counted as failed alongside the ones that
    /// fail to apply.
    pub async fn handle_message(&self, message: &QueuedMessage) -> Result<SyncReport> {
        let body = message.body().context("queued message has no body")?;
        let parsed = parse_change_records(body)?;
        let mut report = self.apply_all(&parsed.records).await;
        report.failed += parsed.rejected;
        Ok(report)
    }
}

/// Change records read from one message body.
#[derive(Debug, Default)]
pub struct ParsedRecords {
    pub records: Vec<IndexChangeRecord>,
    /// Entries that were not valid change records.
    pub rejected: usize,
}

impl ParsedRecords {
    fn push(&mut self, entry: &Value) {
        match serde_json::from_value::<IndexChangeRecord>(entry.clone()) {
            Ok(record) => self.records.push(record),
            Err(err) => {
                self.rejected += 1;
                tracing::warn!(error = %err, "skipping invalid change record");
            }
        }
    }
}

/// Parses a message body into change records.
///
/// Each array element is read on its own, so one malformed entry does not
/// discard its neighbours.
pub fn parse_change_records(body: &str) -> Result<ParsedRecords> {
    let value: Value = serde_json::from_str(body).context("change record body is not JSON")?;
    let mut parsed = ParsedRecords::default();

    match &value {
        Value::Array(items) => items.iter().for_each(|v| parsed.push(v)),
        Value::Object(obj) if obj.contains_key("Records") => {
            let records = obj
                .get("Records")
                .and_then(Value::as_array)
                .context("change feed Records must be an array")?;
            parsed.records = records.iter().filter_map(feed_record).collect();
        }
        Value::Object(_) => parsed.push(&value),
        _ => bail!("change record body must be an object or array"),
    }

    Ok(parsed)
}

/// Converts one change-capture entry. Entries that do not describe a
/// document are skipped.
fn feed_record(entry: &Value) -> Option<IndexChangeRecord> {
    let operation = match entry.get("eventName").and_then(Value::as_str)? {
        "INSERT" => ChangeOperation::Insert,
        "MODIFY" => ChangeOperation::Update,
        "REMOVE" => ChangeOperation::Delete,
        other => {
            tracing::debug!(event_name = other, "skipping change feed entry");
            return None;
        }
    };

    let stream = entry.get("dynamodb")?;
    let pk = stream.pointer("/Keys/PK/S").and_then(Value::as_str)?;
    let (site_id, document_id) = split_partition_key(pk)?;

    let mut fields = BTreeMap::new();
    let mut tags = BTreeMap::new();
    if operation != ChangeOperation::Delete {
        if let Some(image) = stream.get("NewImage").and_then(Value::as_object) {
            read_image(image, &mut fields, &mut tags);
        }
    }

    Some(IndexChangeRecord {
        operation,
        document_id,
        site_id,
        tags,
        fields,
    })
}

/// Splits `[<siteId>/]docs#<documentId>`.
fn split_partition_key(pk: &str) -> Option<(Option<String>, String)> {
    let (site, rest) = match pk.split_once('/') {
        Some((site, rest)) if rest.starts_with(DOCS_PREFIX) => (Some(site.to_string()), rest),
        _ => (None, pk),
    };
    let document_id = rest.strip_prefix(DOCS_PREFIX)?;
    if document_id.is_empty() {
        return None;
    }
    Some((site, document_id.to_string()))
}

fn read_image(
    image: &Map<String, Value>,
    fields: &mut BTreeMap<String, String>,
    tags: &mut BTreeMap<String, String>,
) {
    for (name, attr) in image {
        match name.as_str() {
            "PK" | "SK" | "documentId" | "siteId" => {}
            "tags" => {
                if let Some(map) = attr.get("M").and_then(Value::as_object) {
                    for (k, v) in map {
                        tags.insert(k.clone(), scalar(v).unwrap_or_default());
                    }
                }
            }
            _ => {
                if let Some(s) = scalar(attr) {
                    fields.insert(name.clone(), s);
                }
            }
        }
    }
}

/// Reads a typed `{"S":..}` or `{"N":..}` attribute.
fn scalar(attr: &Value) -> Option<String> {
    attr.get("S")
        .or_else(|| attr.get("N"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

//! Inbound event parsing.
//!
//! One entrypoint receives two very different payloads: interactive API
//! requests and batches of queued messages. [`parse_event`] classifies the
//! raw JSON without ever failing. Optional fields with the wrong type are
//! treated as absent, and input that is neither shape becomes an empty
//! batch.
//!
//! # Interactive request
//!
//! ```json
//! { "httpMethod": "GET", "resource": "/documents/{documentId}",
//!   "path": "/documents/abc", "pathParameters": { "documentId": "abc" },
//!   "queryStringParameters": { "siteId": "finance" },
//!   "headers": { "Content-Type": "application/json" },
//!   "body": "...", "isBase64Encoded": false,
//!   "requestContext": { "authorizer": { "claims": { ... } } } }
//! ```
//!
//! # Queued message batch
//!
//! ```json
//! { "Records": [ { "eventSource": "aws:sqs", "body": "..." } ] }
//! ```

use base64::Engine;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::response::ApiError;

/// A classified inbound event.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Interactive(ApiRequest),
    Batch(MessageBatch),
}

/// The authorizer/identity block of an interactive request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Raw authorizer output; usually `{ "claims": { ... } }`.
    pub authorizer: Option<Value>,
    /// Caller identity (`userArn`, ...) for IAM-signed requests.
    pub identity: Option<Value>,
}

/// A single synchronous API request.
#[derive(Debug, Clone, Default)]
pub struct ApiRequest {
    pub http_method: Option<String>,
    pub resource: Option<String>,
    pub path: Option<String>,
    pub path_parameters: HashMap<String, String>,
    pub query_parameters: HashMap<String, String>,
    pub headers: Option<HashMap<String, String>>,
    pub body: Option<String>,
    pub is_base64_encoded: bool,
    pub request_context: RequestContext,
}

/// One message of a [`MessageBatch`].
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub event_source: String,
    /// The full record as delivered.
    pub payload: Value,
}

impl QueuedMessage {
    /// The record's `body` string, if any.
    pub fn body(&self) -> Option<&str> {
        self.payload.get("body").and_then(Value::as_str)
    }
}

/// An ordered batch of queued messages.
#[derive(Debug, Clone, Default)]
pub struct MessageBatch {
    pub records: Vec<QueuedMessage>,
}

/// Classifies a raw event string.
pub fn parse_event(raw: &str) -> InboundEvent {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => classify(&value),
        Err(_) => InboundEvent::Batch(MessageBatch::default()),
    }
}

/// Classifies an already-decoded event.
pub fn classify(value: &Value) -> InboundEvent {
    let Some(obj) = value.as_object() else {
        return InboundEvent::Batch(MessageBatch::default());
    };

    let request = ApiRequest::from_object(obj);
    if request.headers.is_some() || request.path.is_some() {
        InboundEvent::Interactive(request)
    } else {
        InboundEvent::Batch(MessageBatch::from_object(obj))
    }
}

impl MessageBatch {
    fn from_object(obj: &Map<String, Value>) -> Self {
        let records = obj
            .get("Records")
            .and_then(Value::as_array)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.is_object())
                    .map(|r| QueuedMessage {
                        event_source: r
                            .get("eventSource")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        payload: r.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self { records }
    }
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Reads a `name → value` object, keeping scalar values and dropping the rest.
fn string_map(value: Option<&Value>) -> Option<HashMap<String, String>> {
    let obj = value?.as_object()?;
    Some(
        obj.iter()
            .filter_map(|(k, v)| {
                let s = match v {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => return None,
                };
                Some((k.clone(), s))
            })
            .collect(),
    )
}

fn object_field(obj: Option<&Map<String, Value>>, key: &str) -> Option<Value> {
    obj?.get(key).filter(|v| v.is_object()).cloned()
}

impl ApiRequest {
    fn from_object(obj: &Map<String, Value>) -> Self {
        let context = obj.get("requestContext").and_then(Value::as_object);
        Self {
            http_method: string_field(obj, "httpMethod"),
            resource: string_field(obj, "resource"),
            path: string_field(obj, "path"),
            path_parameters: string_map(obj.get("pathParameters")).unwrap_or_default(),
            query_parameters: string_map(obj.get("queryStringParameters")).unwrap_or_default(),
            headers: string_map(obj.get("headers")),
            body: string_field(obj, "body"),
            is_base64_encoded: obj
                .get("isBase64Encoded")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            request_context: RequestContext {
                authorizer: object_field(context, "authorizer"),
                identity: object_field(context, "identity"),
            },
        }
    }

    /// Starts a request for `method` on `resource`, with `path` equal to the
    /// resource template.
    pub fn new(method: &str, resource: &str) -> Self {
        Self {
            http_method: Some(method.to_string()),
            resource: Some(resource.to_string()),
            path: Some(resource.to_string()),
            headers: Some(HashMap::new()),
            ..Default::default()
        }
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path = Some(path.to_string());
        self
    }

    pub fn with_path_param(mut self, name: &str, value: &str) -> Self {
        self.path_parameters
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_query(mut self, name: &str, value: &str) -> Self {
        self.query_parameters
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = Some(body.to_string());
        self
    }

    pub fn with_claims(mut self, claims: Value) -> Self {
        self.request_context.authorizer = Some(serde_json::json!({ "claims": claims }));
        self
    }

    /// Lower-cased HTTP method.
    pub fn method(&self) -> Option<String> {
        self.http_method.as_deref().map(str::to_lowercase)
    }

    pub fn path_or_empty(&self) -> &str {
        self.path.as_deref().unwrap_or("")
    }

    pub fn resource_or_empty(&self) -> &str {
        self.resource.as_deref().unwrap_or("")
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.query_parameters.get(name).map(String::as_str)
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_parameters.get(name).map(String::as_str)
    }

    /// Header lookup, case-insensitive on the name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.as_ref().and_then(|h| {
            h.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        })
    }

    /// The request body as text, base64-decoded when flagged.
    ///
    /// Fails with `BadRequest` when the body is missing or empty.
    pub fn body_as_string(&self) -> Result<String, ApiError> {
        let body = self
            .body
            .as_deref()
            .ok_or_else(|| ApiError::BadRequest("request body is required".to_string()))?;

        let body = if self.is_base64_encoded {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(body)
                .map_err(|e| ApiError::BadRequest(format!("invalid base64 body: {}", e)))?;
            String::from_utf8(bytes)
                .map_err(|_| ApiError::BadRequest("request body is not valid UTF-8".to_string()))?
        } else {
            body.to_string()
        };

        if body.is_empty() {
            return Err(ApiError::BadRequest("request body is required".to_string()));
        }
        Ok(body)
    }

    /// Decodes the body as JSON into `T`.
    pub fn body_json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        let body = self.body_as_string()?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_interactive_when_path_present() {
        let event = parse_event(
            r#"{"httpMethod":"GET","resource":"/documents","path":"/documents",
                "queryStringParameters":{"siteId":"finance","limit":5}}"#,
        );
        let InboundEvent::Interactive(req) = event else {
            panic!("expected interactive request");
        };
        assert_eq!(req.method().as_deref(), Some("get"));
        assert_eq!(req.query("siteId"), Some("finance"));
        assert_eq!(req.query("limit"), Some("5"));
        assert!(req.headers.is_none());
    }

    #[test]
    fn test_interactive_when_only_headers_present() {
        let event = classify(&json!({ "headers": { "Accept": "*/*" } }));
        assert!(matches!(event, InboundEvent::Interactive(_)));
    }

    #[test]
    fn test_batch_when_no_path_or_headers() {
        let event = parse_event(
            r#"{"Records":[{"eventSource":"aws:sqs","body":"{}"},{"eventSource":"aws:s3"},42]}"#,
        );
        let InboundEvent::Batch(batch) = event else {
            panic!("expected batch");
        };
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.records[0].event_source, "aws:sqs");
        assert_eq!(batch.records[0].body(), Some("{}"));
        assert_eq!(batch.records[1].body(), None);
    }

    #[test]
    fn test_garbage_is_empty_batch() {
        for raw in ["", "not json", "[]", "42", "{}", r#"{"Records":"nope"}"#] {
            match parse_event(raw) {
                InboundEvent::Batch(batch) => assert!(batch.records.is_empty(), "{}", raw),
                InboundEvent::Interactive(_) => panic!("{} classified as interactive", raw),
            }
        }
    }

    #[test]
    fn test_malformed_optional_fields_ignored() {
        let event = classify(&json!({
            "path": "/documents",
            "headers": "oops",
            "pathParameters": [1, 2],
            "queryStringParameters": null,
            "isBase64Encoded": "yes",
            "requestContext": { "authorizer": "nope" }
        }));
        let InboundEvent::Interactive(req) = event else {
            panic!("expected interactive request");
        };
        assert!(req.headers.is_none());
        assert!(req.path_parameters.is_empty());
        assert!(req.query_parameters.is_empty());
        assert!(!req.is_base64_encoded);
        assert!(req.request_context.authorizer.is_none());
        assert!(req.http_method.is_none());
    }

    #[test]
    fn test_body_as_string_base64() {
        let mut req = ApiRequest::new("POST", "/documents").with_body("aGVsbG8=");
        req.is_base64_encoded = true;
        assert_eq!(req.body_as_string().unwrap(), "hello");
    }

    #[test]
    fn test_body_as_string_required() {
        let req = ApiRequest::new("POST", "/documents");
        assert!(matches!(req.body_as_string(), Err(ApiError::BadRequest(_))));
        let req = req.with_body("");
        assert!(matches!(req.body_as_string(), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_header_case_insensitive() {
        let mut req = ApiRequest::new("GET", "/documents");
        req.headers
            .get_or_insert_with(HashMap::new)
            .insert("Content-Type".to_string(), "text/plain".to_string());
        assert_eq!(req.header("content-type"), Some("text/plain"));
    }
}

//! End-to-end tests driving raw events through `Dispatcher::handle` with
//! the built-in handler catalog and in-memory collaborators.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use docgate::capability::Capabilities;
use docgate::config::{parse_config, Config};
use docgate::dispatch::{Dispatcher, Invocation};
use docgate::event::ApiRequest;
use docgate::handlers::builtin_registry;
use docgate::response::{ApiError, Outcome, WireEnvelope, BASE_HEADERS};
use docgate::services::Services;
use docgate::traits::RequestHandler;
use docgate_core::store::memory::RecordingPublisher;

const NOTIFY_ADDRESS: &str = "https://queue.local/websocket";

fn config() -> Config {
    parse_config(&format!(
        r#"
[server]
bind = "127.0.0.1:0"

[storage]
documents_bucket = "documents"
staging_bucket = "staging"

[notify]
address = "{}"
"#,
        NOTIFY_ADDRESS
    ))
    .unwrap()
}

// ============ Test handlers ============

struct Boom;

#[async_trait]
impl RequestHandler for Boom {
    fn request_url(&self) -> &str {
        "/boom"
    }

    async fn get(
        &self,
        _request: &ApiRequest,
        _caps: &Capabilities,
        _services: &Services,
    ) -> Result<Outcome, ApiError> {
        Err(anyhow::anyhow!("connection string postgres://admin:s3cret@db").into())
    }
}

struct Mapping;

#[async_trait]
impl RequestHandler for Mapping {
    fn request_url(&self) -> &str {
        "/mapping"
    }

    async fn get(
        &self,
        _request: &ApiRequest,
        _caps: &Capabilities,
        _services: &Services,
    ) -> Result<Outcome, ApiError> {
        let mut map = Map::new();
        map.insert("name".to_string(), json!("john smith"));
        map.insert("counts".to_string(), json!([1, 2, 3]));
        Ok(Outcome::map(200, map))
    }
}

struct Harness {
    dispatcher: Dispatcher,
    publisher: Arc<RecordingPublisher>,
}

fn harness_with(publisher: RecordingPublisher) -> Harness {
    let publisher = Arc::new(publisher);
    let services = Services::in_memory(config()).with_publisher(publisher.clone());
    let mut registry = builtin_registry().unwrap();
    registry.register(Box::new(Boom)).unwrap();
    registry.register(Box::new(Mapping)).unwrap();
    Harness {
        dispatcher: Dispatcher::new(registry, Arc::new(services)),
        publisher,
    }
}

fn harness() -> Harness {
    harness_with(RecordingPublisher::new())
}

// ============ Event builders ============

struct Event(Value);

impl Event {
    fn new(method: &str, resource: &str, path: &str) -> Self {
        Event(json!({
            "httpMethod": method,
            "resource": resource,
            "path": path,
            "headers": { "Content-Type": "application/json" },
            "pathParameters": {},
            "queryStringParameters": {},
            "requestContext": {}
        }))
    }

    fn groups(mut self, groups: &[&str]) -> Self {
        self.0["requestContext"]["authorizer"] =
            json!({ "claims": { "cognito:groups": groups, "cognito:username": "joe" } });
        self
    }

    fn claims(mut self, claims: Value) -> Self {
        self.0["requestContext"]["authorizer"] = json!({ "claims": claims });
        self
    }

    fn path_param(mut self, name: &str, value: &str) -> Self {
        self.0["pathParameters"][name] = json!(value);
        self
    }

    fn query(mut self, name: &str, value: &str) -> Self {
        self.0["queryStringParameters"][name] = json!(value);
        self
    }

    fn body(mut self, body: &str) -> Self {
        self.0["body"] = json!(body);
        self
    }
}

async fn call(h: &Harness, event: Event) -> WireEnvelope {
    match h.dispatcher.handle(&event.0.to_string()).await.unwrap() {
        Invocation::Response(env) => env,
        other => panic!("expected envelope, got {:?}", other),
    }
}

async fn enqueue(h: &Harness, bodies: &[Value]) -> anyhow::Result<Invocation> {
    let records: Vec<Value> = bodies
        .iter()
        .map(|b| json!({ "eventSource": "aws:sqs", "body": b.to_string() }))
        .collect();
    h.dispatcher
        .handle(&json!({ "Records": records }).to_string())
        .await
}

async fn create_document(h: &Harness) -> String {
    let env = call(
        h,
        Event::new("POST", "/documents", "/documents")
            .groups(&["default"])
            .body(r#"{"path":"test.pdf","content":"hello"}"#),
    )
    .await;
    assert_eq!(env.status_code, 201);
    env.body_json().unwrap()["documentId"]
        .as_str()
        .unwrap()
        .to_string()
}

fn search_event(text: &str) -> Event {
    Event::new("POST", "/search", "/search")
        .groups(&["default_read"])
        .body(&json!({ "query": { "text": text } }).to_string())
}

fn ids(env: &WireEnvelope) -> Vec<String> {
    env.body_json().unwrap()["documents"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["documentId"].as_str().unwrap().to_string())
        .collect()
}

// ============ Routing & policy ============

#[tokio::test]
async fn test_options_bypasses_policy() {
    let h = harness();
    for (resource, path) in [
        ("/documents", "/documents"),
        ("/not/registered", "/not/registered"),
    ] {
        let env = call(&h, Event::new("OPTIONS", resource, path)).await;
        assert_eq!(env.status_code, 200, "{}", resource);
        for (k, v) in BASE_HEADERS {
            assert_eq!(env.headers.get(k).map(String::as_str), Some(v));
        }
    }
}

#[tokio::test]
async fn test_options_ignores_malformed_claims() {
    let h = harness();
    for (resource, path) in [
        ("/documents", "/documents"),
        ("/not/registered", "/not/registered"),
    ] {
        let env = call(
            &h,
            Event::new("OPTIONS", resource, path).claims(json!({ "cognito:groups": 42 })),
        )
        .await;
        assert_eq!(env.status_code, 200, "{}", resource);
        assert_eq!(env.body_json(), Some(json!({})));
    }
}

#[tokio::test]
async fn test_public_path_ignores_malformed_claims() {
    let h = harness();
    let env = call(
        &h,
        Event::new("POST", "/public/webhooks/{webhooks}", "/public/webhooks/nope")
            .path_param("webhooks", "nope")
            .claims(json!({ "cognito:groups": 42 }))
            .body("{}"),
    )
    .await;
    assert_eq!(env.status_code, 404);
    assert_eq!(
        env.body_json(),
        Some(json!({ "message": "Webhook 'nope' not found" }))
    );
}

#[tokio::test]
async fn test_admin_always_allowed() {
    let h = harness();
    let env = call(
        &h,
        Event::new("POST", "/documents", "/documents")
            .groups(&["Admins"])
            .body(r#"{"path":"a.pdf"}"#),
    )
    .await;
    assert_eq!(env.status_code, 201);
}

#[tokio::test]
async fn test_iam_principal_allowed() {
    let h = harness();
    let mut event = Event::new("GET", "/documents", "/documents");
    event.0["requestContext"]["identity"] =
        json!({ "userArn": "arn:aws:iam::111122223333:user/ci" });
    assert_eq!(call(&h, event).await.status_code, 200);
}

#[tokio::test]
async fn test_public_path_allowed_without_claims() {
    let h = harness();
    let env = call(
        &h,
        Event::new("POST", "/public/webhooks/{webhooks}", "/public/webhooks/nope")
            .path_param("webhooks", "nope")
            .body("{}"),
    )
    .await;
    assert_eq!(env.status_code, 404);

    let env = call(
        &h,
        Event::new("POST", "/webhooks", "/webhooks")
            .groups(&["default"])
            .body(r#"{"name":"intake","enabled":"true"}"#),
    )
    .await;
    assert_eq!(env.status_code, 201);
    let id = env.body_json().unwrap()["id"].as_str().unwrap().to_string();

    let env = call(
        &h,
        Event::new("POST", "/public/webhooks/{webhooks}", &format!("/public/webhooks/{}", id))
            .path_param("webhooks", &id)
            .body(r#"{"hello":"world"}"#),
    )
    .await;
    assert_eq!(env.status_code, 200);
}

#[tokio::test]
async fn test_private_webhook_requires_capabilities() {
    let h = harness();
    let env = call(
        &h,
        Event::new("POST", "/webhooks", "/webhooks")
            .groups(&["default"])
            .body(r#"{"name":"intake","enabled":"private"}"#),
    )
    .await;
    let id = env.body_json().unwrap()["id"].as_str().unwrap().to_string();

    let receive = || {
        Event::new("POST", "/private/webhooks/{webhooks}", &format!("/private/webhooks/{}", id))
            .path_param("webhooks", &id)
            .body("payload")
    };
    assert_eq!(call(&h, receive()).await.status_code, 403);
    assert_eq!(call(&h, receive().groups(&["default"])).await.status_code, 200);
}

#[tokio::test]
async fn test_read_only_caller_denied_write() {
    let h = harness();
    let env = call(
        &h,
        Event::new("POST", "/documents", "/documents")
            .groups(&["default_read"])
            .body(r#"{"path":"a.pdf"}"#),
    )
    .await;
    assert_eq!(env.status_code, 403);
    assert_eq!(env.body_json(), Some(json!({ "message": "Access Denied" })));

    let env = call(
        &h,
        Event::new("GET", "/documents", "/documents").groups(&["default_read"]),
    )
    .await;
    assert_eq!(env.status_code, 200);
}

#[tokio::test]
async fn test_write_caller_allowed() {
    let h = harness();
    create_document(&h).await;
    let env = call(
        &h,
        Event::new("GET", "/documents", "/documents").groups(&["default"]),
    )
    .await;
    assert_eq!(env.status_code, 200);
    assert_eq!(env.body_json().unwrap()["documents"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unregistered_resource_not_found() {
    let h = harness();
    let env = call(&h, Event::new("GET", "/nope", "/nope").groups(&["Admins"])).await;
    assert_eq!(env.status_code, 404);
    let message = env.body_json().unwrap()["message"].as_str().unwrap().to_string();
    assert!(message.contains("/nope"));
    assert!(message.contains("not found"));
}

#[tokio::test]
async fn test_malformed_claims_unauthorized() {
    let h = harness();
    let mut event = Event::new("GET", "/documents", "/documents");
    event.0["requestContext"]["authorizer"] = json!({ "claims": { "cognito:groups": 7 } });
    assert_eq!(call(&h, event).await.status_code, 401);
}

// ============ Normalization ============

#[tokio::test]
async fn test_unclassified_error_hidden() {
    let h = harness();
    let env = call(&h, Event::new("GET", "/boom", "/boom").groups(&["Admins"])).await;
    assert_eq!(env.status_code, 500);
    let body = env.body.clone().unwrap();
    assert!(!body.contains("s3cret"));
    assert_eq!(env.body_json(), Some(json!({ "message": "Internal Server Error" })));
}

#[tokio::test]
async fn test_mapping_body_round_trips() {
    let h = harness();
    let env = call(&h, Event::new("GET", "/mapping", "/mapping").groups(&["Admins"])).await;
    assert_eq!(env.status_code, 200);

    let wire = serde_json::to_string(&env).unwrap();
    let decoded: WireEnvelope = serde_json::from_str(&wire).unwrap();
    assert_eq!(
        decoded.body_json(),
        Some(json!({ "name": "john smith", "counts": [1, 2, 3] }))
    );
}

#[tokio::test]
async fn test_redirect_envelope() {
    let h = harness();
    let id = create_document(&h).await;
    let env = call(
        &h,
        Event::new("GET", "/documents/{documentId}/url", &format!("/documents/{}/url", id))
            .groups(&["default"])
            .path_param("documentId", &id)
            .query("redirect", "true"),
    )
    .await;
    assert_eq!(env.status_code, 302);
    assert_eq!(
        env.headers.get("Location").cloned(),
        Some(format!("https://objects.local/documents/{}", id))
    );
    assert!(env.body.is_none());
}

#[tokio::test]
async fn test_malformed_date_is_bad_request() {
    let h = harness();
    let env = call(
        &h,
        Event::new("GET", "/documents", "/documents")
            .groups(&["default"])
            .query("date", "not-a-date"),
    )
    .await;
    assert_eq!(env.status_code, 400);
}

// ============ Notification ============

#[tokio::test]
async fn test_webnotify_publishes_raw_body() {
    let h = harness();
    let id = create_document(&h).await;
    let body = r#"{"path":"renamed.pdf"}"#;

    let env = call(
        &h,
        Event::new("PATCH", "/documents/{documentId}", &format!("/documents/{}", id))
            .groups(&["default"])
            .path_param("documentId", &id)
            .query("webnotify", "true")
            .body(body),
    )
    .await;
    assert_eq!(env.status_code, 200);

    let sent = h.publisher.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, NOTIFY_ADDRESS);
    let payload: Value = serde_json::from_str(&sent[0].1).unwrap();
    assert_eq!(payload["message"], json!(body));
    assert_eq!(payload["documentId"], json!(id));
}

#[tokio::test]
async fn test_webnotify_skipped_on_error() {
    let h = harness();
    let env = call(
        &h,
        Event::new("PATCH", "/documents/{documentId}", "/documents/missing")
            .groups(&["default"])
            .path_param("documentId", "missing")
            .query("webnotify", "true")
            .body(r#"{"path":"x.pdf"}"#),
    )
    .await;
    assert_eq!(env.status_code, 404);
    assert!(h.publisher.sent().is_empty());
}

#[tokio::test]
async fn test_webnotify_without_body_is_bad_request() {
    let h = harness();
    let id = create_document(&h).await;
    let env = call(
        &h,
        Event::new("DELETE", "/documents/{documentId}", &format!("/documents/{}", id))
            .groups(&["default"])
            .path_param("documentId", &id)
            .query("webnotify", "true"),
    )
    .await;
    assert_eq!(env.status_code, 400);
    assert_eq!(
        env.body_json(),
        Some(json!({ "message": "request body is required" }))
    );
}

#[tokio::test]
async fn test_webnotify_publish_failure_swallowed() {
    let h = harness_with(RecordingPublisher::failing());
    let id = create_document(&h).await;
    let env = call(
        &h,
        Event::new("PATCH", "/documents/{documentId}", &format!("/documents/{}", id))
            .groups(&["default"])
            .path_param("documentId", &id)
            .query("webnotify", "true")
            .body(r#"{"path":"renamed.pdf"}"#),
    )
    .await;
    assert_eq!(env.status_code, 200);
}

// ============ Index synchronizer ============

#[tokio::test]
async fn test_queued_insert_then_search_then_delete() {
    let h = harness();
    let inserted = enqueue(
        &h,
        &[json!({
            "operation": "insert", "documentId": "d1", "siteId": null,
            "path": "test.pdf", "content": "karate lessons"
        })],
    )
    .await
    .unwrap();
    assert_eq!(inserted, Invocation::Batch { dispatched: 1 });

    assert_eq!(ids(&call(&h, search_event("karate")).await), vec!["d1"]);

    enqueue(
        &h,
        &[json!({ "operation": "delete", "documentId": "d1", "siteId": null })],
    )
    .await
    .unwrap();
    assert!(ids(&call(&h, search_event("karate")).await).is_empty());
}

#[tokio::test]
async fn test_repeated_upsert_single_entry() {
    let h = harness();
    let record = json!({
        "operation": "update", "documentId": "d1", "siteId": null, "content": "karate"
    });
    enqueue(&h, &[record.clone(), record]).await.unwrap();
    assert_eq!(ids(&call(&h, search_event("karate")).await), vec!["d1"]);
}

#[tokio::test]
async fn test_change_feed_records() {
    let h = harness();
    let feed = json!({ "Records": [
        { "eventName": "INSERT", "dynamodb": {
            "Keys": { "PK": { "S": "docs#d1" } },
            "NewImage": { "path": { "S": "test.pdf" }, "content": { "S": "karate" } } } },
        { "eventName": "INSERT", "dynamodb": {
            "Keys": { "PK": { "S": "docs#d2" } },
            "NewImage": { "path": { "S": "bleh.pdf" } } } }
    ] });
    enqueue(&h, &[feed]).await.unwrap();

    assert_eq!(ids(&call(&h, search_event("karate")).await), vec!["d1"]);
    assert_eq!(ids(&call(&h, search_event("bleh.pdf")).await), vec!["d2"]);
}

#[tokio::test]
async fn test_invalid_record_does_not_drop_neighbours() {
    let h = harness();
    let result = enqueue(
        &h,
        &[json!([
            { "operation": "insert", "documentId": "a", "content": "karate" },
            { "operation": "insert", "documentId": "b", "content": "karate", "size": 5 },
            { "documentId": "c", "content": "karate" }
        ])],
    )
    .await
    .unwrap();
    assert_eq!(result, Invocation::Batch { dispatched: 1 });

    let mut found = ids(&call(&h, search_event("karate")).await);
    found.sort();
    assert_eq!(found, vec!["a", "b"]);
}

#[tokio::test]
async fn test_unparseable_message_fails_batch() {
    let h = harness();
    let raw = json!({ "Records": [
        { "eventSource": "aws:sqs", "body": "{not json" },
        { "eventSource": "aws:sqs",
          "body": json!({ "operation": "insert", "documentId": "d1", "content": "karate" }).to_string() }
    ] });
    assert!(h.dispatcher.handle(&raw.to_string()).await.is_err());
    assert!(ids(&call(&h, search_event("karate")).await).is_empty());
}

#[tokio::test]
async fn test_unrecognized_source_ignored() {
    let h = harness();
    let raw = json!({ "Records": [ { "eventSource": "aws:s3", "body": "{not json" } ] });
    assert_eq!(
        h.dispatcher.handle(&raw.to_string()).await.unwrap(),
        Invocation::Batch { dispatched: 0 }
    );
}

//! Local HTTP front for the dispatcher.
//!
//! Lets the single entrypoint be exercised over plain HTTP, either by
//! posting raw events or by calling the API routes directly.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/invoke` | Raw event in; wire envelope out (202 for batches) |
//! | `GET`  | `/health` | Health check (returns version) |
//! | any    | anything else | Translated into an interactive request |
//!
//! Translated requests are matched against the registered resource
//! templates to recover `resource` and `pathParameters`. They carry no
//! authorizer claims, so only `/public/` routes and `options` succeed
//! unless a fronting proxy injects identity through `/invoke`.
//!
//! # Error Contract
//!
//! Only `/invoke` can fail outside the envelope (a queued batch that
//! aborts):
//!
//! ```json
//! { "error": { "code": "batch_failed", "message": "queued batch could not be processed" } }
//! ```

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::dispatch::{Dispatcher, Invocation};
use crate::event::ApiRequest;
use crate::response::WireEnvelope;

#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
}

/// Builds the router. Exposed separately from [`run_server`] for tests.
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // The fallback answers its own pre-flights through the options
    // handler, so CORS is layered on the fixed routes only.
    Router::new()
        .route("/invoke", post(handle_invoke))
        .route("/health", get(handle_health))
        .route_layer(cors)
        .fallback(handle_api)
        .with_state(AppState { dispatcher })
}

/// Serves the router on `bind` until the process is terminated.
pub async fn run_server(dispatcher: Arc<Dispatcher>, bind: &str) -> anyhow::Result<()> {
    let app = router(dispatcher);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("docgate listening on http://{}", bind);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn batch_failed(err: anyhow::Error) -> AppError {
    tracing::error!(error = ?err, "queued batch failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "batch_failed".to_string(),
        message: "queued batch could not be processed".to_string(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /invoke ============

#[derive(Serialize)]
struct BatchResponse {
    dispatched: usize,
}

/// Returns the envelope itself as JSON, exactly as the invocation
/// transport would see it.
async fn handle_invoke(State(state): State<AppState>, body: String) -> Result<Response, AppError> {
    match state.dispatcher.handle(&body).await.map_err(batch_failed)? {
        Invocation::Response(envelope) => Ok(Json(envelope).into_response()),
        Invocation::Batch { dispatched } => {
            Ok((StatusCode::ACCEPTED, Json(BatchResponse { dispatched })).into_response())
        }
    }
}

// ============ Fallback: direct API calls ============

async fn handle_api(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = to_api_request(&state.dispatcher, &method, &uri, query, &headers, &body);
    let envelope = state.dispatcher.handle_request(&request).await;
    into_http_response(envelope)
}

/// Translates a plain HTTP request into an interactive request.
fn to_api_request(
    dispatcher: &Dispatcher,
    method: &Method,
    uri: &Uri,
    query: HashMap<String, String>,
    headers: &HeaderMap,
    body: &[u8],
) -> ApiRequest {
    let path = uri.path();
    let (resource, path_parameters) = dispatcher
        .registry()
        .match_path(path)
        .unwrap_or_else(|| (path.to_string(), HashMap::new()));

    let headers = headers
        .iter()
        .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
        .collect();

    let (body, is_base64_encoded) = if body.is_empty() {
        (None, false)
    } else {
        match std::str::from_utf8(body) {
            Ok(text) => (Some(text.to_string()), false),
            Err(_) => (
                Some(base64::engine::general_purpose::STANDARD.encode(body)),
                true,
            ),
        }
    };

    ApiRequest {
        http_method: Some(method.as_str().to_string()),
        resource: Some(resource),
        path: Some(path.to_string()),
        path_parameters,
        query_parameters: query,
        headers: Some(headers),
        body,
        is_base64_encoded,
        ..Default::default()
    }
}

fn into_http_response(envelope: WireEnvelope) -> Response {
    let status =
        StatusCode::from_u16(envelope.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, envelope.body.unwrap_or_default()).into_response();

    let out = response.headers_mut();
    for (name, value) in &envelope.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                out.insert(name, value);
            }
            _ => tracing::warn!(header = %name, "dropping invalid response header"),
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_into_http_response_copies_headers() {
        let mut headers = BTreeMap::new();
        headers.insert("Location".to_string(), "https://example.com".to_string());
        headers.insert("Bad Header".to_string(), "x".to_string());
        let response = into_http_response(WireEnvelope {
            status_code: 302,
            headers,
            body: None,
        });
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()["location"], "https://example.com");
        assert!(response.headers().get("access-control-allow-origin").is_none());
    }
}

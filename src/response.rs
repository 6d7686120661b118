//! Outcomes, the error taxonomy, and the wire envelope.
//!
//! Every handler result, whether success, redirect or typed failure, is
//! funnelled through [`normalize`] into one [`WireEnvelope`]:
//!
//! ```json
//! { "statusCode": 200,
//!   "headers": { "Access-Control-Allow-Origin": "*", ... },
//!   "body": "{\"documentId\":\"abc\"}" }
//! ```
//!
//! `body` is itself a JSON-encoded string; the invocation transport
//! expects a string there, so the envelope is double-encoded on the wire.
//!
//! # Error Contract
//!
//! | Kind | Status |
//! |------|--------|
//! | `NotFound` | 404 |
//! | `TooManyRequests` | 429 |
//! | `BadRequest` (incl. malformed JSON and dates) | 400 |
//! | `Forbidden` | 403 |
//! | `Unauthorized` | 401 |
//! | `NotImplemented` | 501 |
//! | anything else | 500, message replaced by `"Internal Server Error"` |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Message returned for every unclassified failure.
pub const INTERNAL_SERVER_ERROR: &str = "Internal Server Error";

/// Headers present on every non-redirect envelope.
pub const BASE_HEADERS: [(&str, &str); 4] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "*"),
    (
        "Access-Control-Allow-Headers",
        "Content-Type,X-Amz-Date,Authorization,X-Api-Key",
    ),
    ("Content-Type", "application/json"),
];

/// Typed failure raised by handlers, the access policy, or notification.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    TooManyRequests(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotImplemented(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::BadRequest(format!("invalid JSON: {}", err))
    }
}

impl From<chrono::ParseError> for ApiError {
    fn from(err: chrono::ParseError) -> Self {
        ApiError::BadRequest(format!("invalid date: {}", err))
    }
}

/// Classification of an [`ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    TooManyRequests,
    BadRequest,
    Forbidden,
    Unauthorized,
    NotImplemented,
    Internal,
}

impl ErrorKind {
    pub fn status(self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::TooManyRequests => 429,
            ErrorKind::BadRequest => 400,
            ErrorKind::Forbidden => 403,
            ErrorKind::Unauthorized => 401,
            ErrorKind::NotImplemented => 501,
            ErrorKind::Internal => 500,
        }
    }
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::NotFound(_) => ErrorKind::NotFound,
            ApiError::TooManyRequests(_) => ErrorKind::TooManyRequests,
            ApiError::BadRequest(_) => ErrorKind::BadRequest,
            ApiError::Forbidden(_) => ErrorKind::Forbidden,
            ApiError::Unauthorized(_) => ErrorKind::Unauthorized,
            ApiError::NotImplemented(_) => ErrorKind::NotImplemented,
            ApiError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Converts into an error outcome with a caller-safe message.
    ///
    /// Unclassified errors are logged with their full chain here and never
    /// reach the caller.
    pub fn into_outcome(self) -> Outcome {
        let kind = self.kind();
        let message = match self {
            ApiError::Internal(err) => {
                tracing::error!(error = ?err, "unhandled error during request");
                INTERNAL_SERVER_ERROR.to_string()
            }
            other => other.to_string(),
        };
        Outcome::Error { kind, message }
    }
}

/// Success body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// A structured response object.
    Object(Value),
    /// A raw key/value mapping.
    Map(Map<String, Value>),
}

/// The result of running an operation handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success {
        status: u16,
        headers: BTreeMap<String, String>,
        body: ResponseBody,
    },
    Redirect {
        location: String,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl Outcome {
    pub fn ok(body: Value) -> Self {
        Self::with_status(200, body)
    }

    pub fn created(body: Value) -> Self {
        Self::with_status(201, body)
    }

    pub fn with_status(status: u16, body: Value) -> Self {
        Outcome::Success {
            status,
            headers: BTreeMap::new(),
            body: ResponseBody::Object(body),
        }
    }

    pub fn map(status: u16, map: Map<String, Value>) -> Self {
        Outcome::Success {
            status,
            headers: BTreeMap::new(),
            body: ResponseBody::Map(map),
        }
    }

    pub fn redirect(location: impl Into<String>) -> Self {
        Outcome::Redirect {
            location: location.into(),
        }
    }

    /// Adds a per-call header override to a success outcome.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let Outcome::Success { headers, .. } = &mut self {
            headers.insert(name.to_string(), value.to_string());
        }
        self
    }

    /// HTTP status this outcome will be rendered with.
    pub fn status(&self) -> u16 {
        match self {
            Outcome::Success { status, .. } => *status,
            Outcome::Redirect { .. } => 302,
            Outcome::Error { kind, .. } => kind.status(),
        }
    }
}

/// The canonical outward response shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEnvelope {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl WireEnvelope {
    /// Parses `body` as JSON.
    pub fn body_json(&self) -> Option<Value> {
        self.body
            .as_deref()
            .and_then(|b| serde_json::from_str(b).ok())
    }
}

fn base_headers() -> BTreeMap<String, String> {
    BASE_HEADERS
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Sets each header, replacing any existing header whose name differs
/// only by case.
fn merge_headers<'a>(
    headers: &mut BTreeMap<String, String>,
    extra: impl IntoIterator<Item = (&'a String, &'a String)>,
) {
    for (name, value) in extra {
        headers.retain(|k, _| !k.eq_ignore_ascii_case(name));
        headers.insert(name.clone(), value.clone());
    }
}

/// Builds the wire envelope for an outcome.
///
/// `override_headers` are merged over the base set for success and error
/// outcomes; a redirect carries only the base set plus `Location`.
pub fn normalize(outcome: &Outcome, override_headers: &BTreeMap<String, String>) -> WireEnvelope {
    let mut headers = base_headers();

    match outcome {
        Outcome::Redirect { location } => {
            headers.insert("Location".to_string(), location.clone());
            WireEnvelope {
                status_code: 302,
                headers,
                body: None,
            }
        }
        Outcome::Success {
            status,
            headers: own,
            body,
        } => {
            merge_headers(&mut headers, own);
            merge_headers(&mut headers, override_headers);
            let encoded = match body {
                ResponseBody::Object(value) => value.to_string(),
                ResponseBody::Map(map) => Value::Object(map.clone()).to_string(),
            };
            WireEnvelope {
                status_code: *status,
                headers,
                body: Some(encoded),
            }
        }
        Outcome::Error { kind, message } => {
            merge_headers(&mut headers, override_headers);
            WireEnvelope {
                status_code: kind.status(),
                headers,
                body: Some(serde_json::json!({ "message": message }).to_string()),
            }
        }
    }
}

//! Operation handler trait and the handler registry.
//!
//! Every API resource is served by one [`RequestHandler`]. The trait has one
//! async method per HTTP verb; verbs a handler does not override answer
//! `501 Not Implemented`. Handlers are registered once at startup in a
//! [`HandlerRegistry`], which is immutable afterwards and shared by all
//! concurrent invocations.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │             HandlerRegistry              │
//! │  "options" ──▶ OptionsHandler            │
//! │  "/documents" ──▶ DocumentsHandler       │
//! │  "/documents/{documentId}" ──▶ ...       │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!      Dispatcher::handle() → WireEnvelope
//! ```
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use docgate::capability::Capabilities;
//! use docgate::event::ApiRequest;
//! use docgate::response::{ApiError, Outcome};
//! use docgate::services::Services;
//! use docgate::traits::{HandlerRegistry, RequestHandler};
//!
//! struct PingHandler;
//!
//! #[async_trait]
//! impl RequestHandler for PingHandler {
//!     fn request_url(&self) -> &str { "/ping" }
//!
//!     async fn get(&self, _req: &ApiRequest, _caps: &Capabilities, _svc: &Services)
//!         -> Result<Outcome, ApiError> {
//!         Ok(Outcome::ok(serde_json::json!({ "message": "pong" })))
//!     }
//! }
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register(Box::new(PingHandler)).unwrap();
//! ```

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::capability::Capabilities;
use crate::event::ApiRequest;
use crate::response::{ApiError, Outcome};
use crate::services::Services;

/// Registry key of the pre-flight handler.
pub const OPTIONS_KEY: &str = "options";

/// Supported HTTP verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    Get,
    Put,
    Post,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    pub const ALL: [Method; 7] = [
        Method::Get,
        Method::Put,
        Method::Post,
        Method::Patch,
        Method::Delete,
        Method::Head,
        Method::Options,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "get",
            Method::Put => "put",
            Method::Post => "post",
            Method::Patch => "patch",
            Method::Delete => "delete",
            Method::Head => "head",
            Method::Options => "options",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unsupported method: {}", s))
    }
}

/// Whether a verb only reads, or mutates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensitivity {
    ReadOnly,
    Write,
}

fn unsupported(method: Method, request: &ApiRequest) -> Result<Outcome, ApiError> {
    Err(ApiError::NotImplemented(format!(
        "{} not supported for {}",
        method.as_str().to_uppercase(),
        request.resource_or_empty()
    )))
}

/// An API operation handler.
///
/// # Lifecycle
///
/// 1. The handler is registered via [`HandlerRegistry::register`] under
///    [`request_url`](RequestHandler::request_url).
/// 2. For each request the dispatcher checks
///    [`sensitivity`](RequestHandler::sensitivity) against the caller's
///    capabilities.
/// 3. The verb method matching the request is invoked.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Resource template this handler serves, e.g. `"/documents/{documentId}"`.
    fn request_url(&self) -> &str;

    /// Access classification of `method`. Defaults to read-only for
    /// `get`, `head` and `options`.
    fn sensitivity(&self, method: Method) -> Sensitivity {
        match method {
            Method::Get | Method::Head | Method::Options => Sensitivity::ReadOnly,
            _ => Sensitivity::Write,
        }
    }

    async fn get(
        &self,
        request: &ApiRequest,
        _caps: &Capabilities,
        _services: &Services,
    ) -> Result<Outcome, ApiError> {
        unsupported(Method::Get, request)
    }

    async fn put(
        &self,
        request: &ApiRequest,
        _caps: &Capabilities,
        _services: &Services,
    ) -> Result<Outcome, ApiError> {
        unsupported(Method::Put, request)
    }

    async fn post(
        &self,
        request: &ApiRequest,
        _caps: &Capabilities,
        _services: &Services,
    ) -> Result<Outcome, ApiError> {
        unsupported(Method::Post, request)
    }

    async fn patch(
        &self,
        request: &ApiRequest,
        _caps: &Capabilities,
        _services: &Services,
    ) -> Result<Outcome, ApiError> {
        unsupported(Method::Patch, request)
    }

    async fn delete(
        &self,
        request: &ApiRequest,
        _caps: &Capabilities,
        _services: &Services,
    ) -> Result<Outcome, ApiError> {
        unsupported(Method::Delete, request)
    }

    async fn head(
        &self,
        request: &ApiRequest,
        _caps: &Capabilities,
        _services: &Services,
    ) -> Result<Outcome, ApiError> {
        unsupported(Method::Head, request)
    }

    async fn options(
        &self,
        request: &ApiRequest,
        _caps: &Capabilities,
        _services: &Services,
    ) -> Result<Outcome, ApiError> {
        unsupported(Method::Options, request)
    }
}

/// Calls the verb method of `handler` matching `method`.
pub async fn invoke(
    handler: &dyn RequestHandler,
    method: Method,
    request: &ApiRequest,
    caps: &Capabilities,
    services: &Services,
) -> Result<Outcome, ApiError> {
    match method {
        Method::Get => handler.get(request, caps, services).await,
        Method::Put => handler.put(request, caps, services).await,
        Method::Post => handler.post(request, caps, services).await,
        Method::Patch => handler.patch(request, caps, services).await,
        Method::Delete => handler.delete(request, caps, services).await,
        Method::Head => handler.head(request, caps, services).await,
        Method::Options => handler.options(request, caps, services).await,
    }
}

/// Resource template → handler map.
///
/// Use [`crate::handlers::builtin_registry`] for the standard catalog, or
/// [`register`](HandlerRegistry::register) handlers into an empty one.
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Box<dyn RequestHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    /// Registers a handler under its [`request_url`](RequestHandler::request_url).
    ///
    /// Fails if the resource is already taken.
    pub fn register(&mut self, handler: Box<dyn RequestHandler>) -> Result<()> {
        let key = handler.request_url().to_string();
        if self.handlers.contains_key(&key) {
            bail!("handler already registered for {}", key);
        }
        self.handlers.insert(key, handler);
        Ok(())
    }

    /// Resolves the handler for a request. `options` ignores the resource
    /// and resolves to the handler registered under [`OPTIONS_KEY`].
    pub fn find(&self, method: Method, resource: &str) -> Option<&dyn RequestHandler> {
        let key = if method == Method::Options {
            OPTIONS_KEY
        } else {
            resource
        };
        self.handlers.get(key).map(|h| h.as_ref())
    }

    /// Registered resource templates, sorted.
    pub fn resources(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    /// Matches a concrete path against the registered templates.
    ///
    /// Literal segments win over `{param}` segments, so `/documents/search`
    /// beats `/documents/{documentId}`.
    pub fn match_path(&self, path: &str) -> Option<(String, HashMap<String, String>)> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        self.handlers
            .keys()
            .filter(|k| k.starts_with('/'))
            .filter_map(|template| {
                match_template(template, &segments).map(|(params, literals)| {
                    (literals, template.clone(), params)
                })
            })
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1)))
            .map(|(_, template, params)| (template, params))
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns extracted parameters and the number of literal segments matched.
fn match_template(template: &str, segments: &[&str]) -> Option<(HashMap<String, String>, usize)> {
    let parts: Vec<&str> = template.split('/').filter(|s| !s.is_empty()).collect();
    if parts.len() != segments.len() {
        return None;
    }

    let mut params = HashMap::new();
    let mut literals = 0;
    for (part, seg) in parts.iter().zip(segments) {
        if let Some(name) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
            params.insert(name.to_string(), seg.to_string());
        } else if part == seg {
            literals += 1;
        } else {
            return None;
        }
    }
    Some((params, literals))
}

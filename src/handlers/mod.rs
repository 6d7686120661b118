//! Built-in handler catalog.
//!
//! | Resource | Verbs |
//! |----------|-------|
//! | `options` (any resource) | OPTIONS |
//! | `/version` | GET |
//! | `/documents` | GET, POST |
//! | `/documents/{documentId}` | GET, PATCH, DELETE |
//! | `/documents/{documentId}/url` | GET |
//! | `/search` | POST |
//! | `/webhooks` | GET, POST |
//! | `/webhooks/{webhookId}` | GET, DELETE |
//! | `/public/webhooks/{webhooks}` | POST |
//! | `/private/webhooks/{webhooks}` | POST |

mod documents;
mod options;
mod search;
mod version;
mod webhooks;

pub use documents::{DocumentHandler, DocumentUrlHandler, DocumentsHandler};
pub use options::OptionsHandler;
pub use search::SearchHandler;
pub use version::VersionHandler;
pub use webhooks::{WebhookHandler, WebhookReceiver, WebhooksHandler};

use anyhow::Result;

use crate::event::ApiRequest;
use crate::response::ApiError;
use crate::traits::HandlerRegistry;

/// Registry with every built-in handler.
pub fn builtin_registry() -> Result<HandlerRegistry> {
    let mut registry = HandlerRegistry::new();
    registry.register(Box::new(OptionsHandler))?;
    registry.register(Box::new(VersionHandler))?;
    registry.register(Box::new(DocumentsHandler))?;
    registry.register(Box::new(DocumentHandler))?;
    registry.register(Box::new(DocumentUrlHandler))?;
    registry.register(Box::new(SearchHandler))?;
    registry.register(Box::new(WebhooksHandler))?;
    registry.register(Box::new(WebhookHandler))?;
    registry.register(Box::new(WebhookReceiver::public()))?;
    registry.register(Box::new(WebhookReceiver::private()))?;
    Ok(registry)
}

fn required_path_param<'a>(request: &'a ApiRequest, name: &str) -> Result<&'a str, ApiError> {
    request
        .path_param(name)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("'{}' path parameter is required", name)))
}

/// Parses the `limit` query parameter.
fn limit(request: &ApiRequest, default: usize) -> Result<usize, ApiError> {
    match request.query("limit") {
        None => Ok(default),
        Some(raw) => raw
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| ApiError::BadRequest(format!("invalid limit: {}", raw))),
    }
}

//! Best-effort notification after a successful mutation.
//!
//! When the caller asks for it with `?webnotify=true` and the outcome is a
//! 200, 201 or 202, the raw request body is published to the configured
//! notification address:
//!
//! ```json
//! { "siteId": "finance", "documentId": "abc", "message": "<raw body>" }
//! ```
//!
//! Publish failures are logged and swallowed. A missing body is a
//! `BadRequest` and does propagate.

use serde::Serialize;

use crate::capability::Capabilities;
use crate::event::ApiRequest;
use crate::response::{ApiError, Outcome};
use crate::services::Services;

const NOTIFY_STATUSES: [u16; 3] = [200, 201, 202];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Notification<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    site_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    document_id: Option<&'a str>,
    message: String,
}

/// Whether `request` and `outcome` call for a notification.
pub fn should_notify(request: &ApiRequest, outcome: &Outcome) -> bool {
    request.query("webnotify") == Some("true") && NOTIFY_STATUSES.contains(&outcome.status())
}

/// Publishes the notification for `request` if one is due.
pub async fn maybe_notify(
    request: &ApiRequest,
    caps: &Capabilities,
    outcome: &Outcome,
    services: &Services,
) -> Result<(), ApiError> {
    if !should_notify(request, outcome) {
        return Ok(());
    }

    let message = request.body_as_string()?;

    let Some(address) = services.config.notify.address.as_deref() else {
        tracing::debug!("webnotify requested but no notify.address configured");
        return Ok(());
    };

    let payload = Notification {
        site_id: caps.site_id(),
        document_id: request.path_param("documentId"),
        message,
    };
    let json = serde_json::to_string(&payload).map_err(anyhow::Error::from)?;

    if let Err(err) = services.publisher.publish(address, &json).await {
        tracing::warn!(address, error = %err, "webnotify publish failed");
    }
    Ok(())
}

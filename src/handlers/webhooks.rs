//! Webhook registration and inbound webhook receivers.
//!
//! A receiver stages each call as a JSON object in the staging bucket
//! under `[<siteId>/]<documentId>.fkb64`:
//!
//! ```json
//! { "documentId": "...", "userId": "webhook/<name>",
//!   "path": "webhooks/<webhookId>", "content": "<body>" }
//! ```
//!
//! A webhook registered with a `ttl` passes it on as `TimeToLive`.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use docgate_core::models::{create_database_key, Webhook};

use super::required_path_param;
use crate::capability::Capabilities;
use crate::event::ApiRequest;
use crate::response::{ApiError, Outcome};
use crate::services::Services;
use crate::traits::RequestHandler;

const STAGED_SUFFIX: &str = ".fkb64";
const DEFAULT_USER: &str = "System";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewWebhook {
    name: Option<String>,
    enabled: Option<String>,
    ttl: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StagedDocument<'a> {
    document_id: &'a str,
    user_id: String,
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<&'a str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    is_base64: bool,
    content: String,
    #[serde(rename = "TimeToLive", skip_serializing_if = "Option::is_none")]
    time_to_live: Option<i64>,
}

/// `GET /webhooks` lists; `POST /webhooks` registers.
pub struct WebhooksHandler;

#[async_trait]
impl RequestHandler for WebhooksHandler {
    fn request_url(&self) -> &str {
        "/webhooks"
    }

    async fn get(
        &self,
        request: &ApiRequest,
        caps: &Capabilities,
        services: &Services,
    ) -> Result<Outcome, ApiError> {
        let webhooks = services.webhooks.list_webhooks(caps.site_id()).await?;
        Ok(Outcome::ok(json!({ "webhooks": webhooks })))
    }

    async fn post(
        &self,
        request: &ApiRequest,
        caps: &Capabilities,
        services: &Services,
    ) -> Result<Outcome, ApiError> {
        let input: NewWebhook = request.body_json()?;
        let name = input
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| ApiError::BadRequest("'name' is required".to_string()))?;
        let enabled = input.enabled.unwrap_or_else(|| "true".to_string());
        if !matches!(enabled.as_str(), "true" | "false" | "private") {
            return Err(ApiError::BadRequest(format!(
                "invalid enabled value: {}",
                enabled
            )));
        }

        let webhook = Webhook {
            webhook_id: uuid::Uuid::new_v4().to_string(),
            name,
            user_id: caps.username().unwrap_or(DEFAULT_USER).to_string(),
            enabled,
            inserted_date: Utc::now(),
            time_to_live: input.ttl,
        };
        services
            .webhooks
            .save_webhook(caps.site_id(), &webhook)
            .await?;

        Ok(Outcome::created(json!({ "id": webhook.webhook_id })))
    }
}

/// `GET|DELETE /webhooks/{webhookId}`.
pub struct WebhookHandler;

#[async_trait]
impl RequestHandler for WebhookHandler {
    fn request_url(&self) -> &str {
        "/webhooks/{webhookId}"
    }

    async fn get(
        &self,
        request: &ApiRequest,
        caps: &Capabilities,
        services: &Services,
    ) -> Result<Outcome, ApiError> {
        let id = required_path_param(request, "webhookId")?;
        let webhook = services
            .webhooks
            .find_webhook(caps.site_id(), id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Webhook '{}' not found", id)))?;
        Ok(Outcome::ok(
            serde_json::to_value(&webhook).map_err(anyhow::Error::from)?,
        ))
    }

    async fn delete(
        &self,
        request: &ApiRequest,
        caps: &Capabilities,
        services: &Services,
    ) -> Result<Outcome, ApiError> {
        let id = required_path_param(request, "webhookId")?;
        if !services
            .webhooks
            .delete_webhook(caps.site_id(), id)
            .await?
        {
            return Err(ApiError::NotFound(format!("Webhook '{}' not found", id)));
        }
        Ok(Outcome::ok(json!({ "message": format!("'{}' webhook deleted", id) })))
    }
}

/// `POST /public/webhooks/{webhooks}` and `POST /private/webhooks/{webhooks}`.
///
/// The public surface accepts webhooks enabled `true`; the private one
/// also accepts `private`. Anything else is reported as not found.
pub struct WebhookReceiver {
    private: bool,
}

impl WebhookReceiver {
    pub fn public() -> Self {
        Self { private: false }
    }

    pub fn private() -> Self {
        Self { private: true }
    }

    fn accepts(&self, webhook: &Webhook) -> bool {
        if self.private {
            webhook.is_private()
        } else {
            webhook.is_public()
        }
    }
}

#[async_trait]
impl RequestHandler for WebhookReceiver {
    fn request_url(&self) -> &str {
        if self.private {
            "/private/webhooks/{webhooks}"
        } else {
            "/public/webhooks/{webhooks}"
        }
    }

    async fn post(
        &self,
        request: &ApiRequest,
        caps: &Capabilities,
        services: &Services,
    ) -> Result<Outcome, ApiError> {
        let site = caps.site_id();
        let webhook_id = required_path_param(request, "webhooks")?;
        let not_found = || ApiError::NotFound(format!("Webhook '{}' not found", webhook_id));

        let webhook = services
            .webhooks
            .find_webhook(site, webhook_id)
            .await?
            .ok_or_else(not_found)?;
        if !self.accepts(&webhook) {
            return Err(not_found());
        }

        let text = request.body_as_string()?;
        let content = match (request.is_base64_encoded, request.body.as_ref()) {
            (true, Some(raw)) => raw.clone(),
            _ => text,
        };

        let document_id = uuid::Uuid::new_v4().to_string();
        let staged = StagedDocument {
            document_id: &document_id,
            user_id: format!("webhook/{}", webhook.name),
            path: format!("webhooks/{}", webhook_id),
            content_type: request.header("Content-Type"),
            is_base64: request.is_base64_encoded,
            content,
            time_to_live: webhook.time_to_live,
        };
        let json = serde_json::to_vec(&staged).map_err(anyhow::Error::from)?;

        let key = create_database_key(site, &format!("{}{}", document_id, STAGED_SUFFIX));
        services
            .objects
            .put_object(
                &services.config.storage.staging_bucket,
                &key,
                &json,
                Some("application/json"),
            )
            .await?;
        tracing::debug!(webhook_id, document_id = %document_id, "webhook payload staged");

        if let Some(uri) = request.query("redirect_uri") {
            return Ok(Outcome::redirect(uri));
        }
        Ok(Outcome::ok(json!({ "documentId": document_id })))
    }
}

use async_trait::async_trait;
use serde_json::json;

use crate::capability::Capabilities;
use crate::event::ApiRequest;
use crate::response::{ApiError, Outcome};
use crate::services::Services;
use crate::traits::{RequestHandler, OPTIONS_KEY};

/// CORS pre-flight. Serves `options` for every resource and never runs
/// the access policy.
pub struct OptionsHandler;

#[async_trait]
impl RequestHandler for OptionsHandler {
    fn request_url(&self) -> &str {
        OPTIONS_KEY
    }

    async fn options(
        &self,
        _request: &ApiRequest,
        _caps: &Capabilities,
        _services: &Services,
    ) -> Result<Outcome, ApiError> {
        Ok(Outcome::ok(json!({})))
    }
}

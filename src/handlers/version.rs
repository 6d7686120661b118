use async_trait::async_trait;
use serde_json::json;

use crate::capability::Capabilities;
use crate::event::ApiRequest;
use crate::response::{ApiError, Outcome};
use crate::services::Services;
use crate::traits::RequestHandler;

/// `GET /version`: the deployed version, read from the parameter store.
pub struct VersionHandler;

/// Parameter name holding the deployed version for `environment`.
pub fn version_parameter(environment: &str) -> String {
    format!("/docgate/{}/version", environment)
}

#[async_trait]
impl RequestHandler for VersionHandler {
    fn request_url(&self) -> &str {
        "/version"
    }

    async fn get(
        &self,
        _request: &ApiRequest,
        _caps: &Capabilities,
        services: &Services,
    ) -> Result<Outcome, ApiError> {
        let environment = services.config.app.environment.as_str();
        let version = services
            .parameters
            .get_parameter(&version_parameter(environment))
            .await?
            .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

        Ok(Outcome::ok(json!({
            "version": version,
            "environment": environment,
        })))
    }
}

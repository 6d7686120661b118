use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::limit;
use crate::capability::Capabilities;
use crate::event::ApiRequest;
use crate::response::{ApiError, Outcome};
use crate::services::Services;
use crate::traits::{Method, RequestHandler, Sensitivity};

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: Option<SearchQuery>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    text: Option<String>,
}

/// `POST /search` with `{"query":{"text":"..."}}`.
///
/// Results are ordered as the index returns them. Ids the index knows but
/// the document store does not are returned without metadata.
pub struct SearchHandler;

#[async_trait]
impl RequestHandler for SearchHandler {
    fn request_url(&self) -> &str {
        "/search"
    }

    // POST carries the query; it does not mutate.
    fn sensitivity(&self, _method: Method) -> Sensitivity {
        Sensitivity::ReadOnly
    }

    async fn post(
        &self,
        request: &ApiRequest,
        caps: &Capabilities,
        services: &Services,
    ) -> Result<Outcome, ApiError> {
        let site = caps.site_id();
        let body: SearchRequest = request.body_json()?;
        let text = body
            .query
            .and_then(|q| q.text)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::BadRequest("'query.text' is required".to_string()))?;

        let max = services.config.search.max_results;
        let limit = limit(request, max)?.min(max);
        let ids = services.index.search_fulltext(site, &text, limit).await?;

        let mut documents = Vec::with_capacity(ids.len());
        for id in ids {
            let doc = match services.documents.get_document(site, &id).await? {
                Some(doc) => serde_json::to_value(&doc).map_err(anyhow::Error::from)?,
                None => json!({ "documentId": id }),
            };
            documents.push(doc);
        }

        Ok(Outcome::ok(json!({ "documents": documents })))
    }
}

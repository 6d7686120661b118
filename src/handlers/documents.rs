//! Document metadata handlers.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;

use docgate_core::models::{create_database_key, Document};

use super::{limit, required_path_param};
use crate::capability::Capabilities;
use crate::event::ApiRequest;
use crate::response::{ApiError, Outcome};
use crate::services::Services;
use crate::traits::RequestHandler;

const DEFAULT_LIST_LIMIT: usize = 10;
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewDocument {
    path: Option<String>,
    content_type: Option<String>,
    content: Option<String>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentPatch {
    path: Option<String>,
    content_type: Option<String>,
    tags: Option<BTreeMap<String, String>>,
}

async fn load_document(
    services: &Services,
    site: Option<&str>,
    document_id: &str,
) -> Result<Document, ApiError> {
    services
        .documents
        .get_document(site, document_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Document {} not found", document_id)))
}

/// `GET /documents` lists; `POST /documents` creates.
pub struct DocumentsHandler;

#[async_trait]
impl RequestHandler for DocumentsHandler {
    fn request_url(&self) -> &str {
        "/documents"
    }

    async fn get(
        &self,
        request: &ApiRequest,
        caps: &Capabilities,
        services: &Services,
    ) -> Result<Outcome, ApiError> {
        let site = caps.site_id();
        let limit = limit(request, DEFAULT_LIST_LIMIT)?;
        let date = request
            .query("date")
            .map(|d| NaiveDate::parse_from_str(d, DATE_FORMAT))
            .transpose()?;

        let mut documents = services.documents.list_documents(site, usize::MAX).await?;
        if let Some(date) = date {
            documents.retain(|d| d.inserted_date.date_naive() == date);
        }
        documents.truncate(limit);

        Ok(Outcome::ok(json!({ "documents": documents })))
    }

    async fn post(
        &self,
        request: &ApiRequest,
        caps: &Capabilities,
        services: &Services,
    ) -> Result<Outcome, ApiError> {
        let site = caps.site_id();
        let input: NewDocument = request.body_json()?;
        let document_id = uuid::Uuid::new_v4().to_string();

        let mut content_length = None;
        if let Some(content) = &input.content {
            services
                .objects
                .put_object(
                    &services.config.storage.documents_bucket,
                    &create_database_key(site, &document_id),
                    content.as_bytes(),
                    input.content_type.as_deref(),
                )
                .await?;
            content_length = Some(content.len() as u64);
        }

        let document = Document {
            document_id: document_id.clone(),
            path: input.path,
            content_type: input.content_type,
            user_id: caps.username().map(str::to_string),
            inserted_date: Utc::now(),
            content_length,
            tags: input.tags,
        };
        services.documents.put_document(site, &document).await?;

        Ok(Outcome::created(json!({ "documentId": document_id })))
    }
}

/// `GET|PATCH|DELETE /documents/{documentId}`.
pub struct DocumentHandler;

#[async_trait]
impl RequestHandler for DocumentHandler {
    fn request_url(&self) -> &str {
        "/documents/{documentId}"
    }

    async fn get(
        &self,
        request: &ApiRequest,
        caps: &Capabilities,
        services: &Services,
    ) -> Result<Outcome, ApiError> {
        let document_id = required_path_param(request, "documentId")?;
        let document = load_document(services, caps.site_id(), document_id).await?;
        Ok(Outcome::ok(serde_json::to_value(&document).map_err(anyhow::Error::from)?))
    }

    async fn patch(
        &self,
        request: &ApiRequest,
        caps: &Capabilities,
        services: &Services,
    ) -> Result<Outcome, ApiError> {
        let site = caps.site_id();
        let document_id = required_path_param(request, "documentId")?;
        let patch: DocumentPatch = request.body_json()?;
        let mut document = load_document(services, site, document_id).await?;

        if let Some(path) = patch.path {
            document.path = Some(path);
        }
        if let Some(content_type) = patch.content_type {
            document.content_type = Some(content_type);
        }
        if let Some(tags) = patch.tags {
            document.tags.extend(tags);
        }
        services.documents.put_document(site, &document).await?;

        Ok(Outcome::ok(json!({
            "documentId": document_id,
            "message": format!("Updated document {}", document_id),
        })))
    }

    async fn delete(
        &self,
        request: &ApiRequest,
        caps: &Capabilities,
        services: &Services,
    ) -> Result<Outcome, ApiError> {
        let document_id = required_path_param(request, "documentId")?;
        if !services
            .documents
            .delete_document(caps.site_id(), document_id)
            .await?
        {
            return Err(ApiError::NotFound(format!("Document {} not found", document_id)));
        }
        Ok(Outcome::ok(json!({
            "message": format!("'{}' object deleted", document_id),
        })))
    }
}

/// `GET /documents/{documentId}/url`: the content URL, or a redirect to it
/// with `?redirect=true`.
pub struct DocumentUrlHandler;

#[async_trait]
impl RequestHandler for DocumentUrlHandler {
    fn request_url(&self) -> &str {
        "/documents/{documentId}/url"
    }

    async fn get(
        &self,
        request: &ApiRequest,
        caps: &Capabilities,
        services: &Services,
    ) -> Result<Outcome, ApiError> {
        let site = caps.site_id();
        let document_id = required_path_param(request, "documentId")?;
        load_document(services, site, document_id).await?;

        let storage = &services.config.storage;
        let url = format!(
            "{}/{}/{}",
            storage.object_url_base.trim_end_matches('/'),
            storage.documents_bucket,
            create_database_key(site, document_id)
        );

        if request.query("redirect") == Some("true") {
            return Ok(Outcome::redirect(url));
        }
        Ok(Outcome::ok(json!({ "documentId": document_id, "url": url })))
    }
}

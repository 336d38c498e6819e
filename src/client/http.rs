//! REST client for the study-docs store

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{ClientError, DocumentStore, ExportFormat, StoreConfig};
use crate::annotations::{
    Annotation, AnnotationUpdate, Document, DocumentSummary, DocumentUpdate,
    DocumentUpdateResponse, NewAnnotation, NewDocument,
};
use crate::routes::API_PREFIX;

/// Error body returned by the store. FastAPI-style `detail` is accepted too.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    conflicts: Option<serde_json::Value>,
}

/// Map a non-success response onto a [`ClientError`]
fn error_from_status(status: u16, body: &str) -> ClientError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message
        .or(parsed.detail)
        .unwrap_or_else(|| body.trim().to_string());

    match status {
        401 => ClientError::AuthRequired,
        403 => ClientError::Forbidden(message),
        404 => ClientError::NotFound(message),
        409 => ClientError::Conflict {
            message,
            conflicts: parsed.conflicts,
        },
        _ => ClientError::Rejected { status, message },
    }
}

/// [`DocumentStore`] over HTTP with a bearer token
#[derive(Debug, Clone)]
pub struct HttpDocumentStore {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpDocumentStore {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(&config.base_url, &config.token)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    async fn checked(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = error_from_status(status.as_u16(), &body);
        tracing::debug!("Store returned {}: {}", status, err);
        Err(err)
    }

    /// Send and decode the body strictly into `T`
    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = self.checked(request).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn send_empty(&self, request: RequestBuilder) -> Result<(), ClientError> {
        self.checked(request).await?;
        Ok(())
    }

    /// Documents owned by the caller
    pub async fn list_documents(&self) -> Result<Vec<DocumentSummary>, ClientError> {
        self.send_json(self.client.get(self.url("/documents"))).await
    }

    pub async fn create_document(&self, document: &NewDocument) -> Result<Document, ClientError> {
        self.send_json(self.client.post(self.url("/documents")).json(document))
            .await
    }

    pub async fn update_document(
        &self,
        document_id: i64,
        update: &DocumentUpdate,
    ) -> Result<DocumentUpdateResponse, ClientError> {
        let url = self.url(&format!("/documents/{}", document_id));
        self.send_json(self.client.put(url).json(update)).await
    }

    pub async fn delete_document(&self, document_id: i64) -> Result<(), ClientError> {
        let url = self.url(&format!("/documents/{}", document_id));
        self.send_empty(self.client.delete(url)).await
    }

    /// Download an export
    pub async fn export(&self, document_id: i64, format: ExportFormat) -> Result<Vec<u8>, ClientError> {
        let request = self.client.get(self.export_url(document_id, format));
        let response = self.checked(request).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn fetch_document(&self, document_id: i64) -> Result<Document, ClientError> {
        let url = self.url(&format!("/documents/{}", document_id));
        self.send_json(self.client.get(url)).await
    }

    async fn create_annotation(
        &self,
        document_id: i64,
        annotation: &NewAnnotation,
    ) -> Result<Annotation, ClientError> {
        let url = self.url(&format!("/documents/{}/annotations", document_id));
        self.send_json(self.client.post(url).json(annotation)).await
    }

    async fn update_annotation(
        &self,
        annotation_id: i64,
        update: &AnnotationUpdate,
    ) -> Result<Annotation, ClientError> {
        let url = self.url(&format!("/annotations/{}", annotation_id));
        self.send_json(self.client.put(url).json(update)).await
    }

    async fn delete_annotation(&self, annotation_id: i64) -> Result<(), ClientError> {
        let url = self.url(&format!("/annotations/{}", annotation_id));
        self.send_empty(self.client.delete(url)).await
    }

    fn export_url(&self, document_id: i64, format: ExportFormat) -> String {
        self.url(&format!("/documents/{}/export/{}", document_id, format.as_str()))
    }
}

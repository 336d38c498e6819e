//! Document store client
//!
//! The viewer talks to the document/annotation store through the
//! [`DocumentStore`] trait. [`HttpDocumentStore`] is the REST implementation;
//! tests substitute in-memory stores.

mod http;

pub use http::HttpDocumentStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::annotations::{Annotation, AnnotationUpdate, Document, NewAnnotation};

/// Errors observed at the store boundary
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Authentication required")]
    AuthRequired,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {message}")]
    Conflict {
        message: String,
        conflicts: Option<serde_json::Value>,
    },

    #[error("Store rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response shape: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Export formats offered by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Html,
    Pdf,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportFormat::Html => "html",
            ExportFormat::Pdf => "pdf",
        }
    }
}

/// Operations the viewer needs from the store
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document together with its full annotation list
    async fn fetch_document(&self, document_id: i64) -> Result<Document, ClientError>;

    async fn create_annotation(
        &self,
        document_id: i64,
        annotation: &NewAnnotation,
    ) -> Result<Annotation, ClientError>;

    async fn update_annotation(
        &self,
        annotation_id: i64,
        update: &AnnotationUpdate,
    ) -> Result<Annotation, ClientError>;

    async fn delete_annotation(&self, annotation_id: i64) -> Result<(), ClientError>;

    /// Navigation target for an export; generation happens in the store
    fn export_url(&self, document_id: i64, format: ExportFormat) -> String;
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Store origin, e.g. `http://localhost:7999`
    pub base_url: String,
    pub token: String,
}

impl StoreConfig {
    /// Read `OPOSITAPP_API_URL` and `OPOSITAPP_TOKEN`
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let base_url = std::env::var("OPOSITAPP_API_URL")
            .unwrap_or_else(|_| "http://localhost:7999".to_string());
        let token = std::env::var("OPOSITAPP_TOKEN")
            .map_err(|_| anyhow::anyhow!("OPOSITAPP_TOKEN must be set"))?;

        Ok(Self { base_url, token })
    }
}

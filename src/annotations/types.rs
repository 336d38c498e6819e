//! Study document and annotation records
//!
//! These are the wire shapes shared by the store server and the viewer's
//! HTTP client. Decoding a response into these types is the schema check at
//! the store boundary: a missing required field fails with a typed error
//! instead of reaching the renderer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A linked explanatory note bound to a character range of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: i64,
    pub document_id: i64,
    /// Zero-based character offset, inclusive
    pub start_pos: usize,
    /// Zero-based character offset, exclusive
    pub end_pos: usize,
    /// Snapshot of `content[start_pos..end_pos]` taken at creation time
    pub selected_text: String,
    pub annotation_title: Option<String>,
    /// Expandable body, may contain Markdown
    pub linked_content: String,
    pub legal_reference: Option<String>,
    pub article_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Annotation {
    /// Text shown for the annotation: its title, or the annotated text.
    pub fn label(&self) -> &str {
        match self.annotation_title.as_deref() {
            Some(title) if !title.is_empty() => title,
            _ => &self.selected_text,
        }
    }
}

/// A stored block of raw text plus its annotation set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    /// Raw text; the offset space for every annotation
    pub content: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

/// Document listing entry (no content)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub annotation_count: i64,
}

/// Request body for creating a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

/// Request body for editing a document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// `Some(None)` clears the description
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
    /// Delete annotations invalidated by a content edit instead of rejecting it
    #[serde(default)]
    pub drop_stale_annotations: bool,
}

/// Result of a document edit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentUpdateResponse {
    pub document: Document,
    /// Annotations removed because the edit moved their text
    #[serde(default)]
    pub dropped_annotations: Vec<i64>,
}

/// Request body for creating an annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAnnotation {
    pub start_pos: usize,
    pub end_pos: usize,
    pub selected_text: String,
    #[serde(default)]
    pub annotation_title: Option<String>,
    pub linked_content: String,
    #[serde(default)]
    pub legal_reference: Option<String>,
    #[serde(default)]
    pub article_number: Option<String>,
}

/// Request body for editing an annotation. Positions cannot change.
///
/// Only fields present in the body are written. For the optional metadata
/// an explicit `null` (`Some(None)`) clears the stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationUpdate {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub annotation_title: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_content: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub legal_reference: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub article_number: Option<Option<String>>,
}

/// Deserialize a field that was present in the body, keeping `null` as `Some(None)`
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

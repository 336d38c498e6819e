//! Annotation module
//!
//! Character-range annotations over study documents.
//!
//! # Features
//!
//! - Wire records shared by the store server and the viewer client
//! - Span validation (range, text match, overlap)
//! - Drift detection when a document's content is edited
//! - SQLite persistence

mod store;
mod types;
mod validation;

pub(crate) use store::{list_for_document, parse_timestamp};
pub use store::AnnotationRepository;
pub use types::{
    Annotation, AnnotationUpdate, Document, DocumentSummary, DocumentUpdate,
    DocumentUpdateResponse, NewAnnotation, NewDocument,
};
pub use validation::{
    find_overlap, find_stale_annotations, validate_span, OverlapError, SpanError, StaleAnnotation,
};

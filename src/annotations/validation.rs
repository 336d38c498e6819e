//! Span checks for annotations over mutable text
//!
//! Three failure shapes exist:
//!
//! - [`SpanError`]: a proposed range does not fit the content, or the text
//!   captured by the selection no longer matches it.
//! - [`OverlapError`]: a proposed range intersects an existing annotation.
//!   The renderer walks annotations with a single cursor, so overlaps are
//!   refused at creation time.
//! - [`StaleAnnotation`]: after a content edit, an annotation's slice of the
//!   new content differs from its `selected_text` snapshot.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::Annotation;
use crate::text::{char_len, slice_chars};

/// Invalid annotation range
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpanError {
    #[error("range {start}..{end} lies outside content of {len} characters")]
    OutOfBounds { start: usize, end: usize, len: usize },

    #[error("start_pos ({start}) must be lower than end_pos ({end})")]
    EmptyRange { start: usize, end: usize },

    #[error("selected text does not match the document: expected '{expected}'")]
    TextMismatch { expected: String, found: String },
}

/// A proposed range intersects an existing annotation
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("range {start}..{end} overlaps annotation {existing_id} ({existing_start}..{existing_end})")]
pub struct OverlapError {
    pub start: usize,
    pub end: usize,
    pub existing_id: i64,
    pub existing_start: usize,
    pub existing_end: usize,
}

/// An annotation whose text moved after a content edit
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("annotation {annotation_id} is stale: expected '{expected}', found '{found}'")]
pub struct StaleAnnotation {
    pub annotation_id: i64,
    pub expected: String,
    pub found: String,
}

/// Check that `[start, end)` is a non-empty range inside `content` whose
/// text equals `selected_text`.
pub fn validate_span(
    content: &str,
    start: usize,
    end: usize,
    selected_text: &str,
) -> Result<(), SpanError> {
    let len = char_len(content);
    if end > len {
        return Err(SpanError::OutOfBounds { start, end, len });
    }
    if start >= end {
        return Err(SpanError::EmptyRange { start, end });
    }

    let actual = slice_chars(content, start, end);
    if actual != selected_text {
        return Err(SpanError::TextMismatch {
            expected: actual.to_string(),
            found: selected_text.to_string(),
        });
    }

    Ok(())
}

/// First existing annotation intersecting `[start, end)`, in ascending
/// start order. Touching ranges (`a.end == start`) do not overlap.
pub fn find_overlap<'a, I>(existing: I, start: usize, end: usize) -> Result<(), OverlapError>
where
    I: IntoIterator<Item = &'a Annotation>,
{
    let mut hits: Vec<&Annotation> = existing
        .into_iter()
        .filter(|a| a.start_pos < end && start < a.end_pos)
        .collect();
    hits.sort_by_key(|a| a.start_pos);

    match hits.first() {
        Some(a) => Err(OverlapError {
            start,
            end,
            existing_id: a.id,
            existing_start: a.start_pos,
            existing_end: a.end_pos,
        }),
        None => Ok(()),
    }
}

/// Annotations whose range no longer selects their snapshot in `content`.
pub fn find_stale_annotations(content: &str, annotations: &[Annotation]) -> Vec<StaleAnnotation> {
    annotations
        .iter()
        .filter_map(|a| {
            let found = slice_chars(content, a.start_pos, a.end_pos);
            (found != a.selected_text).then(|| StaleAnnotation {
                annotation_id: a.id,
                expected: a.selected_text.clone(),
                found: found.to_string(),
            })
        })
        .collect()
}

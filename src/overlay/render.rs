//! Annotation overlay rendering
//!
//! Interleaves annotation spans into a document's plain text. The
//! decomposition never alters characters: concatenating the text of every
//! segment gives back the content, which is what lets the selection mapper
//! count offsets over the rendered text.

use crate::annotations::Annotation;
use crate::text::{char_len, slice_chars, slice_from};
use crate::viewer::InteractionMode;

/// One contiguous run of rendering output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Unannotated text
    Plain { text: &'a str },
    /// Text bound to an annotation
    Annotated(AnnotatedSpan<'a>),
}

/// A highlighted run bound to one annotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedSpan<'a> {
    pub annotation_id: i64,
    /// `content[start_pos..end_pos]`
    pub text: &'a str,
    /// Tooltip: the annotation title, or its selected text
    pub label: &'a str,
    /// Clicking opens the annotation (study mode only)
    pub interactive: bool,
    /// The annotation currently open in the side panel
    pub selected: bool,
}

impl<'a> Segment<'a> {
    /// The document text this segment covers
    pub fn text(&self) -> &'a str {
        match self {
            Segment::Plain { text } => text,
            Segment::Annotated(span) => span.text,
        }
    }

    pub fn annotation_id(&self) -> Option<i64> {
        match self {
            Segment::Plain { .. } => None,
            Segment::Annotated(span) => Some(span.annotation_id),
        }
    }
}

/// View state that affects span attributes but never the text decomposition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    pub mode: InteractionMode,
    pub selected_annotation: Option<i64>,
}

/// Annotations in ascending `start_pos`, ties kept in input order.
pub fn sorted_by_start(annotations: &[Annotation]) -> Vec<&Annotation> {
    let mut sorted: Vec<&Annotation> = annotations.iter().collect();
    sorted.sort_by_key(|a| a.start_pos);
    sorted
}

/// Decompose `content` into plain and annotated segments.
///
/// Overlapping annotations are not special-cased: the cursor jumps back to
/// the later annotation's start and characters are emitted twice. Ranges
/// past the end of the content are clamped. The store refuses overlaps at
/// creation time and flags drift on content edits, so neither happens for
/// records it accepted.
pub fn render_segments<'a>(
    content: &'a str,
    annotations: &'a [Annotation],
    options: RenderOptions,
) -> Vec<Segment<'a>> {
    let mut segments = Vec::with_capacity(annotations.len() * 2 + 1);
    let mut last_index = 0;

    for ann in sorted_by_start(annotations) {
        if ann.start_pos > last_index {
            segments.push(Segment::Plain {
                text: slice_chars(content, last_index, ann.start_pos),
            });
        }

        segments.push(Segment::Annotated(AnnotatedSpan {
            annotation_id: ann.id,
            text: slice_chars(content, ann.start_pos, ann.end_pos),
            label: ann.label(),
            interactive: options.mode.annotations_clickable(),
            selected: options.selected_annotation == Some(ann.id),
        }));

        last_index = ann.end_pos;
    }

    if last_index < char_len(content) {
        segments.push(Segment::Plain {
            text: slice_from(content, last_index),
        });
    }

    segments
}

/// Concatenated text of a segment sequence
pub fn segments_text(segments: &[Segment<'_>]) -> String {
    segments.iter().map(Segment::text).collect()
}

/// Side panel / export index entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry<'a> {
    pub annotation_id: i64,
    pub label: &'a str,
    pub article_number: Option<&'a str>,
}

/// Annotations listed in reading order
pub fn table_of_contents(annotations: &[Annotation]) -> Vec<TocEntry<'_>> {
    sorted_by_start(annotations)
        .into_iter()
        .map(|a| TocEntry {
            annotation_id: a.id,
            label: a.label(),
            article_number: a.article_number.as_deref(),
        })
        .collect()
}

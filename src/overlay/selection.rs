//! Selection-to-offset mapping
//!
//! Translates a selection made over the rendered document (a pair of points
//! inside rendered text nodes) into absolute character offsets of the raw
//! content. Offsets are counted over the container's full rendered text,
//! which equals the raw content because the overlay renderer never alters
//! characters. Chunking the text into spans therefore does not move offsets.

use serde::{Deserialize, Serialize};

use super::render::Segment;
use crate::text::{char_len, slice_chars};

/// Minimum number of characters (after trimming) of an annotatable selection
pub const MIN_SELECTION_CHARS: usize = 2;

/// Screen-space rectangle used to position the follow-up affordance
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A position inside the rendered container: a text node and a character
/// offset within it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TextPoint {
    pub node: usize,
    pub offset: usize,
}

impl TextPoint {
    pub fn new(node: usize, offset: usize) -> Self {
        Self { node, offset }
    }
}

/// The platform's active selection. `anchor` is where the drag started and
/// may come after `focus`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlatformSelection {
    pub anchor: TextPoint,
    pub focus: TextPoint,
    pub rect: Option<Rect>,
}

impl PlatformSelection {
    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    fn ordered(&self) -> (TextPoint, TextPoint) {
        if self.anchor <= self.focus {
            (self.anchor, self.focus)
        } else {
            (self.focus, self.anchor)
        }
    }
}

/// A selection accepted for annotation, in raw content offsets
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSelection {
    /// Trimmed selected text
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub anchor: Option<Rect>,
}

/// The rendered content container: one text node per segment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedContainer {
    nodes: Vec<String>,
}

impl RenderedContainer {
    pub fn new(nodes: Vec<String>) -> Self {
        Self { nodes }
    }

    pub fn from_segments(segments: &[Segment<'_>]) -> Self {
        Self {
            nodes: segments.iter().map(|s| s.text().to_string()).collect(),
        }
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// Full rendered text
    pub fn text(&self) -> String {
        self.nodes.concat()
    }

    /// Characters preceding `point`, or `None` if the point is outside the
    /// container
    pub fn offset_of(&self, point: TextPoint) -> Option<usize> {
        let node = self.nodes.get(point.node)?;
        if point.offset > char_len(node) {
            return None;
        }
        let before: usize = self.nodes[..point.node].iter().map(|n| char_len(n)).sum();
        Some(before + point.offset)
    }
}

/// Map a platform selection onto raw content offsets.
///
/// Returns `None` for collapsed selections, points outside the container,
/// and selections shorter than [`MIN_SELECTION_CHARS`] once trimmed. Leading
/// whitespace removed by trimming advances `start`, so `[start, end)` always
/// selects exactly `text` in the content.
pub fn map_selection(
    container: &RenderedContainer,
    selection: &PlatformSelection,
) -> Option<PendingSelection> {
    if selection.is_collapsed() {
        return None;
    }

    let (from, to) = selection.ordered();
    let raw_start = container.offset_of(from)?;
    let raw_end = container.offset_of(to)?;

    let full = container.text();
    let raw = slice_chars(&full, raw_start, raw_end);
    let text = raw.trim();
    let len = char_len(text);
    if len < MIN_SELECTION_CHARS {
        return None;
    }

    let leading = char_len(raw) - char_len(raw.trim_start());
    let start = raw_start + leading;

    Some(PendingSelection {
        text: text.to_string(),
        start,
        end: start + len,
        anchor: selection.rect,
    })
}

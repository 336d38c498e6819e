//! Annotation overlay engine
//!
//! - [`render_segments`]: content + annotations -> plain/annotated segments
//! - [`map_selection`]: rendered selection -> raw content offsets
//!
//! Both are pure; the viewer owns the state they are applied to.

mod render;
mod selection;

pub use render::{
    render_segments, segments_text, sorted_by_start, table_of_contents, AnnotatedSpan,
    RenderOptions, Segment, TocEntry,
};
pub use selection::{
    map_selection, PendingSelection, PlatformSelection, Rect, RenderedContainer, TextPoint,
    MIN_SELECTION_CHARS,
};

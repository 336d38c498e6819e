//! Character offset helpers
//!
//! Annotation positions are counted in Unicode scalar values, never in bytes.
//! `"artículo"` is 8 characters but 9 bytes; slicing a `&str` with character
//! offsets directly would split `í` in half and panic.

/// Number of characters in `text`.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Byte index of the character at `char_idx`, or `text.len()` past the end.
pub fn byte_index(text: &str, char_idx: usize) -> usize {
    text.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

/// Slice `text` by character offsets `[start, end)`.
///
/// Behaves like JavaScript's `String.prototype.slice` for non-negative
/// arguments: both bounds are clamped to the text, and an inverted range
/// yields an empty string instead of panicking.
pub fn slice_chars(text: &str, start: usize, end: usize) -> &str {
    if start >= end {
        return "";
    }
    let from = byte_index(text, start);
    let to = byte_index(text, end);
    &text[from..to]
}

/// Slice `text` from character `start` to the end.
pub fn slice_from(text: &str, start: usize) -> &str {
    &text[byte_index(text, start)..]
}

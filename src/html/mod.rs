//! HTML processing module
//!
//! Sanitization and link rewriting for exported HTML, using lol_html.

mod sanitize;

pub use sanitize::{external_links, sanitize_html, SanitizeError};

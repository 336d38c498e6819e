//! Document export
//!
//! Only HTML is produced; PDF is answered with 501 by the routes.

mod html;

pub use html::{build_interactive_html, content_disposition, markdown_to_html};

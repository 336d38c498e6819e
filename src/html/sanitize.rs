//! HTML clean-up for exported annotation bodies, using lol_html
//!
//! Annotation bodies are user Markdown rendered to HTML. Raw HTML passes
//! through the Markdown renderer untouched, so the result is sanitized
//! before it is embedded in an export.

use lol_html::{element, rewrite_str, RewriteStrSettings};

/// Errors during HTML rewriting
#[derive(Debug, thiserror::Error)]
pub enum SanitizeError {
    #[error("HTML rewrite failed: {0}")]
    Rewrite(String),
}

fn is_script_url(value: &str) -> bool {
    let value = value.trim().to_ascii_lowercase();
    value.starts_with("javascript:") || value.starts_with("vbscript:")
}

/// Remove active content: script-like elements, event handler attributes
/// and script URLs
pub fn sanitize_html(html: &str) -> Result<String, SanitizeError> {
    let result = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("script, style, iframe, object, embed, form", |el| {
                    el.remove();
                    Ok(())
                }),
                element!("*", |el| {
                    let handlers: Vec<String> = el
                        .attributes()
                        .iter()
                        .map(|attr| attr.name())
                        .filter(|name| name.starts_with("on"))
                        .collect();
                    for name in handlers {
                        el.remove_attribute(&name);
                    }

                    for attr in ["href", "src"] {
                        if el.get_attribute(attr).is_some_and(|v| is_script_url(&v)) {
                            el.remove_attribute(attr);
                        }
                    }
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| SanitizeError::Rewrite(e.to_string()))?;

    Ok(result)
}

/// Make absolute links open outside the exported document
pub fn external_links(html: &str) -> Result<String, SanitizeError> {
    let result = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("a[href]", |el| {
                if let Some(href) = el.get_attribute("href") {
                    if href.starts_with("http://") || href.starts_with("https://") {
                        el.set_attribute("target", "_blank")?;
                        el.set_attribute("rel", "noopener noreferrer")?;
                    }
                }
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| SanitizeError::Rewrite(e.to_string()))?;

    Ok(result)
}

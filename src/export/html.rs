//! Interactive HTML export
//!
//! Produces a standalone page: title, description, a table of contents and
//! the document body where each annotation is a collapsible `<details>`
//! block. User text is escaped; annotation bodies are Markdown rendered and
//! sanitized.

use std::collections::HashMap;

use html_escape::{encode_double_quoted_attribute, encode_text};
use pulldown_cmark::{html, Options, Parser};

use crate::annotations::{Annotation, Document};
use crate::html::{external_links, sanitize_html, SanitizeError};
use crate::overlay::{render_segments, table_of_contents, RenderOptions, Segment};
use crate::viewer::InteractionMode;

const STYLESHEET: &str = r#"
:root { --primary-color: #2563eb; --bg-color: #ffffff; --text-color: #1f2937; --border-color: #e5e7eb; --highlight-bg: #dbeafe; }
@media (prefers-color-scheme: dark) {
  :root { --bg-color: #1f2937; --text-color: #f3f4f6; --border-color: #374151; --highlight-bg: #1e3a5f; }
}
* { box-sizing: border-box; }
body { font-family: Georgia, 'Times New Roman', serif; line-height: 1.8; max-width: 800px; margin: 0 auto; padding: 2rem; background: var(--bg-color); color: var(--text-color); }
h1 { border-bottom: 2px solid var(--primary-color); padding-bottom: 0.5rem; }
.toc { background: var(--highlight-bg); padding: 1.5rem; border-radius: 8px; margin-bottom: 2rem; }
.toc h2 { margin-top: 0; font-size: 1.2rem; }
.toc a { color: var(--primary-color); text-decoration: none; }
.content { white-space: pre-wrap; }
.annotation { display: inline; }
.annotation-trigger { display: inline; color: var(--primary-color); cursor: pointer; border-bottom: 2px dotted var(--primary-color); font-weight: 500; }
.annotation-content { display: block; white-space: normal; background: var(--highlight-bg); border-left: 4px solid var(--primary-color); padding: 1rem 1.5rem; margin: 1rem 0; border-radius: 0 8px 8px 0; }
.annotation-content h4 { margin-top: 0; color: var(--primary-color); }
.legal-ref { font-size: 0.9rem; color: #6b7280; font-style: italic; }
table { border-collapse: collapse; width: 100%; margin: 1rem 0; }
th, td { border: 1px solid var(--border-color); padding: 0.5rem; text-align: left; }
pre { background: var(--border-color); padding: 1rem; border-radius: 8px; overflow-x: auto; }
@media print { .annotation-content { display: block !important; } }
"#;

/// Render an annotation body (Markdown with tables and fenced code) to safe HTML
pub fn markdown_to_html(markdown: &str) -> Result<String, SanitizeError> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(markdown, options);
    let mut rendered = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut rendered, parser);

    external_links(&sanitize_html(&rendered)?)
}

fn annotation_block(annotation: &Annotation, text: &str) -> Result<String, SanitizeError> {
    let reference = match (&annotation.article_number, &annotation.legal_reference) {
        (Some(article), Some(law)) => format!(
            "<p class=\"legal-ref\"><strong>Ref:</strong> {} ({})</p>\n",
            encode_text(article),
            encode_text(law)
        ),
        (Some(article), None) => format!(
            "<p class=\"legal-ref\"><strong>Ref:</strong> {}</p>\n",
            encode_text(article)
        ),
        (None, Some(law)) => format!(
            "<p class=\"legal-ref\"><strong>Ref:</strong> {}</p>\n",
            encode_text(law)
        ),
        (None, None) => String::new(),
    };

    Ok(format!(
        "<details class=\"annotation\" id=\"ann-{id}\"><summary class=\"annotation-trigger\">{text}</summary><div class=\"annotation-content\">\n<h4>{label}</h4>\n{reference}{body}</div></details>",
        id = annotation.id,
        text = encode_text(text),
        label = encode_text(annotation.label()),
        reference = reference,
        body = markdown_to_html(&annotation.linked_content)?,
    ))
}

fn toc_html(annotations: &[Annotation]) -> String {
    let entries = table_of_contents(annotations);
    if entries.is_empty() {
        return String::new();
    }

    let items: String = entries
        .iter()
        .map(|entry| {
            format!(
                "<li><a href=\"#ann-{}\">{}</a></li>",
                entry.annotation_id,
                encode_text(entry.label)
            )
        })
        .collect();

    format!(
        "<nav class=\"toc\">\n<h2>Tabla de Contenidos</h2>\n<ol>\n{}\n</ol>\n</nav>",
        items
    )
}

/// Build the interactive HTML export of a document
pub fn build_interactive_html(document: &Document) -> Result<String, SanitizeError> {
    let by_id: HashMap<i64, &Annotation> =
        document.annotations.iter().map(|a| (a.id, a)).collect();

    let options = RenderOptions {
        mode: InteractionMode::Reading,
        selected_annotation: None,
    };

    let mut body = String::with_capacity(document.content.len() * 2);
    for segment in render_segments(&document.content, &document.annotations, options) {
        match segment {
            Segment::Plain { text } => body.push_str(&encode_text(text)),
            Segment::Annotated(span) => match by_id.get(&span.annotation_id) {
                Some(annotation) => body.push_str(&annotation_block(annotation, span.text)?),
                None => body.push_str(&encode_text(span.text)),
            },
        }
    }

    let description = document
        .description
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .map(|d| format!("<p class=\"description\"><em>{}</em></p>", encode_text(d)))
        .unwrap_or_default();

    Ok(format!(
        r#"<!DOCTYPE html>
<html lang="es">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{title}</title>
<style>{style}</style>
</head>
<body>
<h1>{title}</h1>
{description}
{toc}
<div class="content">{body}</div>
<footer style="margin-top: 3rem; padding-top: 1rem; border-top: 1px solid var(--border-color); font-size: 0.9rem; color: #6b7280;">
<p>Generado desde OpositApp</p>
</footer>
</body>
</html>
"#,
        title = encode_text(&document.title),
        style = STYLESHEET,
        description = description,
        toc = toc_html(&document.annotations),
        body = body,
    ))
}

/// `Content-Disposition` value for an export download
pub fn content_disposition(title: &str, extension: &str) -> String {
    let fallback: String = title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == ' ' || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let fallback = if fallback.trim().is_empty() { "documento".to_string() } else { fallback };

    format!(
        "attachment; filename=\"{}.{}\"; filename*=UTF-8''{}.{}",
        encode_double_quoted_attribute(&fallback),
        extension,
        urlencoding::encode(title),
        extension
    )
}

//! Flatten HTML story bodies into chat-friendly text.
//!
//! Block elements render one per line:
//! `h1`–`h3` as `### t ###`, `h4`–`h6` as `## t ##` (each surrounded by blank
//! lines), list items as `- t`, paragraphs and quotes as plain lines.

use scraper::{ElementRef, Html, Selector};
use storywatch_core::PipelineError;

const BLOCKS: &str = "p, li, h1, h2, h3, h4, h5, h6, blockquote";

/// Parse a static selector.
pub(crate) fn selector(css: &'static str) -> Result<Selector, PipelineError> {
    Selector::parse(css).map_err(|e| PipelineError::config(format!("invalid selector '{css}': {e}")))
}

/// Whitespace-trimmed text content of `el`.
pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Append the rendering of one block element to `out`. Empty blocks and
/// unknown elements are ignored.
pub(crate) fn push_block(out: &mut String, el: ElementRef<'_>) {
    let text = element_text(el);
    if text.is_empty() {
        return;
    }
    match el.value().name() {
        "h1" | "h2" | "h3" => {
            out.push_str("\n### ");
            out.push_str(&text);
            out.push_str(" ###\n");
        }
        "h4" | "h5" | "h6" => {
            out.push_str("\n## ");
            out.push_str(&text);
            out.push_str(" ##\n");
        }
        "li" => {
            out.push_str("- ");
            out.push_str(&text);
            out.push('\n');
        }
        "p" | "blockquote" => {
            out.push_str(&text);
            out.push('\n');
        }
        _ => {}
    }
}

/// Render an HTML fragment as text. Falls back to the fragment's bare text
/// when it contains no block elements.
pub fn html_to_text(html: &str) -> Result<String, PipelineError> {
    let fragment = Html::parse_fragment(html);
    let blocks = selector(BLOCKS)?;

    let mut out = String::new();
    for el in fragment.select(&blocks) {
        // A <p> inside an <li> is rendered by the <li>.
        let nested = el
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|a| blocks.matches(&a));
        if !nested {
            push_block(&mut out, el);
        }
    }

    if out.trim().is_empty() {
        out = fragment.root_element().text().collect();
    }
    Ok(out.trim().to_string())
}

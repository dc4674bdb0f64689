//! Document extractor.
//!
//! Produces a title (when one is embedded) and a bounded text excerpt.
//! Oversized documents are truncated at the last character boundary within
//! the byte budget; they never fail extraction. PDF text comes from
//! `pdf-extract` and the title from the `lopdf` information dictionary, both
//! run on the blocking pool.

use lens_resolver::ResolvedObject;
use lens_types::{ContentIdentifier, ContentTypeLabel, MetadataRecord};
use lopdf::{Document, Object};
use tracing::{debug, warn};

use crate::classify::{markdown_heading, sniff, Format};
use crate::error::{ExtractError, ExtractResult};

/// Default excerpt budget in bytes.
pub const DEFAULT_EXCERPT_BYTES: usize = 1024;

/// Extractor for text-bearing documents (plain text, Markdown, HTML, PDF).
#[derive(Debug, Clone, Copy)]
pub struct DocumentExtractor {
    excerpt_bytes: usize,
}

impl Default for DocumentExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_EXCERPT_BYTES)
    }
}

impl DocumentExtractor {
    pub fn new(excerpt_bytes: usize) -> Self {
        Self { excerpt_bytes }
    }

    /// Fails with `InvalidContent` only for a PDF that cannot be parsed.
    pub async fn extract(&self, label: ContentTypeLabel, object: &ResolvedObject) -> ExtractResult<MetadataRecord> {
        let content = object.content();
        let format = sniff(content).unwrap_or(Format::Text);
        let (title, body) = match format {
            Format::Html => {
                let text = String::from_utf8_lossy(content);
                (html_title(&text), html_text(&text))
            }
            Format::Pdf => read_pdf(object.identifier(), content).await?,
            Format::Markdown => {
                let text = String::from_utf8_lossy(content);
                (markdown_heading(&text).map(str::to_string), text.trim().to_string())
            }
            _ => (None, String::from_utf8_lossy(content).trim().to_string()),
        };

        let (excerpt, truncated) = truncate_at_boundary(&body, self.excerpt_bytes);
        let mut record = MetadataRecord::new(*object.identifier(), label)
            .with_field("excerpt", excerpt)
            .with_field("excerpt_truncated", truncated)
            .with_field("byte_length", content.len())
            .with_field("format", format.name());
        if let Some(title) = title {
            record.insert("title", title);
        }
        Ok(record)
    }
}

/// Longest prefix of `text` no longer than `max` bytes that ends on a char
/// boundary, plus whether anything was cut.
pub fn truncate_at_boundary(text: &str, max: usize) -> (&str, bool) {
    if text.len() <= max {
        return (text, false);
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    (&text[..end], true)
}

// ---------------------------------------------------------------------------
// HTML
// ---------------------------------------------------------------------------

fn html_title(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let start = open + lower[open..].find('>')? + 1;
    let end = start + lower[start..].find("</title")?;
    let title = collapse_whitespace(&html[start..end]);
    (!title.is_empty()).then_some(title)
}

/// Visible text: tags removed, `<script>`/`<style>` bodies and the
/// `<head>` dropped, whitespace collapsed.
fn html_text(html: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let mut out = String::new();
    let mut pos = lower.find("</head").unwrap_or(0);
    while pos < html.len() {
        let Some(rel) = lower[pos..].find('<') else {
            out.push_str(&html[pos..]);
            break;
        };
        out.push_str(&html[pos..pos + rel]);
        out.push(' ');
        let tag_start = pos + rel;
        let Some(tag_len) = lower[tag_start..].find('>') else {
            break;
        };
        let tag = &lower[tag_start..tag_start + tag_len];
        pos = tag_start + tag_len + 1;
        for skipped in ["script", "style"] {
            if tag.starts_with(&format!("<{skipped}")) {
                pos = lower[pos..]
                    .find(&format!("</{skipped}"))
                    .map_or(html.len(), |i| pos + i);
            }
        }
    }
    collapse_whitespace(&out)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// PDF
// ---------------------------------------------------------------------------

/// Title and visible text of a PDF.
///
/// A document `lopdf` cannot load is invalid content. A document that loads
/// but whose text cannot be extracted yields an empty body.
async fn read_pdf(id: &ContentIdentifier, bytes: &[u8]) -> ExtractResult<(Option<String>, String)> {
    let bytes = bytes.to_vec();
    let (title, text) = tokio::task::spawn_blocking(move || {
        let doc = Document::load_mem(&bytes).map_err(|e| format!("unreadable pdf: {e}"))?;
        let text = pdf_extract::extract_text_from_mem(&bytes).map_err(|e| e.to_string());
        Ok::<_, String>((info_title(&doc), text))
    })
    .await
    .map_err(|e| ExtractError::invalid_content(id, format!("pdf parser task failed: {e}")))?
    .map_err(|e| ExtractError::invalid_content(id, e))?;

    let body = match text {
        Ok(text) => collapse_whitespace(&text),
        Err(e) => {
            warn!(cid = %id, error = %e, "pdf text extraction failed");
            String::new()
        }
    };
    debug!(cid = %id, title = title.is_some(), chars = body.len(), "pdf read");
    Ok((title, body))
}

/// `/Title` of the trailer's `/Info` dictionary.
fn info_title(doc: &Document) -> Option<String> {
    let info = match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => doc.get_object(*id).ok()?,
        other => other,
    };
    let Object::Dictionary(info) = info else {
        return None;
    };
    let raw = match info.get(b"Title").ok()? {
        Object::String(raw, _) => raw,
        Object::Reference(id) => match doc.get_object(*id).ok()? {
            Object::String(raw, _) => raw,
            _ => return None,
        },
        _ => return None,
    };
    let title = collapse_whitespace(&decode_pdf_string(raw));
    (!title.is_empty()).then_some(title)
}

/// PDF text strings are UTF-16BE when they carry a BOM, else byte text.
fn decode_pdf_string(raw: &[u8]) -> String {
    match raw.strip_prefix(&[0xfe, 0xff]) {
        Some(utf16) => {
            let units: Vec<u16> = utf16
                .chunks_exact(2)
                .map(|p| u16::from_be_bytes([p[0], p[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        None => String::from_utf8_lossy(raw).into_owned(),
    }
}

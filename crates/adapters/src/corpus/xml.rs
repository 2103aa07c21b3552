//! XML text and metadata extraction.
//!
//! Flattens a document's text content (element text and tails, in document
//! order, whitespace-joined) and captures the attributes that identify a
//! record in the government dumps: Dublin Core child elements plus the
//! `ID`, `type`, `spUrl`, `dateCreation`, and `dateMaj` root attributes.

use corpus_sync_ports::DocumentText;
use corpus_sync_shared::{ErrorCode, ErrorEnvelope, Result};
use serde_json::Value;
use std::collections::BTreeMap;

const DUBLIN_CORE_NS: &str = "http://purl.org/dc/elements/1.1/";
const ROOT_ATTRIBUTES: [&str; 5] = ["ID", "type", "spUrl", "dateCreation", "dateMaj"];

/// Parse raw XML bytes into flattened text plus document attributes.
///
/// Unparseable input is a permanent per-document failure
/// (`corpus:read_failed`); the run continues with other documents.
pub fn extract_document(bytes: &[u8]) -> Result<DocumentText> {
    let raw = String::from_utf8_lossy(bytes);
    let document = roxmltree::Document::parse(&raw).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::corpus_read_failed(),
            format!("failed to parse XML document: {error}"),
        )
    })?;

    let mut parts: Vec<&str> = Vec::new();
    for node in document.root().descendants() {
        if !node.is_text() {
            continue;
        }
        if let Some(text) = node.text() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                parts.push(trimmed);
            }
        }
    }

    let mut attributes = BTreeMap::new();
    for node in document.root().descendants() {
        if !node.is_element() || node.tag_name().namespace() != Some(DUBLIN_CORE_NS) {
            continue;
        }
        let name = node.tag_name().name();
        if let Some(text) = node.text() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                attributes.insert(
                    name.to_owned().into_boxed_str(),
                    Value::String(trimmed.to_owned()),
                );
            }
        }
    }
    let root = document.root_element();
    for attribute in ROOT_ATTRIBUTES {
        if let Some(value) = root.attribute(attribute) {
            attributes.insert(
                attribute.to_owned().into_boxed_str(),
                Value::String(value.to_owned()),
            );
        }
    }

    Ok(DocumentText {
        text: parts.join(" ").into_boxed_str(),
        attributes,
    })
}

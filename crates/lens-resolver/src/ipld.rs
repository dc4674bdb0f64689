//! dag-json and dag-cbor link discovery.
//!
//! Links are found anywhere in the document and named by their path from
//! the root (`"parent/0"`). Only the top-level `name` and `size` attributes
//! are surfaced; the rest of the document is not interpreted.

use std::collections::BTreeMap;

use lens_types::{ContentIdentifier, FieldValue};
use serde_cbor::Value as CborValue;
use serde_json::Value as JsonValue;

use crate::error::CodecError;

/// CBOR tag marking an embedded CID.
const CID_TAG: u64 = 42;

/// Attribute keys surfaced from structured nodes.
const ATTRIBUTE_KEYS: [&str; 2] = ["name", "size"];

/// Links and attributes found in a structured (JSON/CBOR) node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StructuredNode {
    pub links: Vec<(String, ContentIdentifier)>,
    pub attributes: BTreeMap<String, FieldValue>,
}

impl StructuredNode {
    pub fn decode_json(bytes: &[u8]) -> Result<Self, CodecError> {
        let value: JsonValue = serde_json::from_slice(bytes)
            .map_err(|e| CodecError::InvalidField(format!("dag-json: {e}")))?;
        let mut node = Self::default();
        walk_json(&value, &mut Vec::new(), &mut node.links)?;
        if let JsonValue::Object(map) = &value {
            for key in ATTRIBUTE_KEYS {
                match map.get(key) {
                    Some(JsonValue::String(s)) => {
                        node.attributes.insert(key.to_string(), FieldValue::from(s.as_str()));
                    }
                    Some(JsonValue::Number(n)) => {
                        if let Some(n) = n.as_i64() {
                            node.attributes.insert(key.to_string(), FieldValue::Integer(n));
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(node)
    }

    pub fn decode_cbor(bytes: &[u8]) -> Result<Self, CodecError> {
        let value: CborValue = serde_cbor::from_slice(bytes)
            .map_err(|e| CodecError::InvalidField(format!("dag-cbor: {e}")))?;
        let mut node = Self::default();
        walk_cbor(&value, &mut Vec::new(), &mut node.links)?;
        if let CborValue::Map(map) = &value {
            for key in ATTRIBUTE_KEYS {
                match map.get(&CborValue::Text(key.to_string())) {
                    Some(CborValue::Text(s)) => {
                        node.attributes.insert(key.to_string(), FieldValue::from(s.as_str()));
                    }
                    Some(CborValue::Integer(n)) => {
                        if let Ok(n) = i64::try_from(*n) {
                            node.attributes.insert(key.to_string(), FieldValue::Integer(n));
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(node)
    }
}

fn walk_json(
    value: &JsonValue,
    path: &mut Vec<String>,
    links: &mut Vec<(String, ContentIdentifier)>,
) -> Result<(), CodecError> {
    match value {
        JsonValue::Object(map) if map.len() == 1 && map.contains_key("/") => {
            // {"/": "<cid>"} is a link; {"/": {"bytes": ..}} is inline bytes.
            if let Some(JsonValue::String(text)) = map.get("/") {
                let id = ContentIdentifier::parse(text)
                    .map_err(|e| CodecError::InvalidLink(e.to_string()))?;
                links.push((path.join("/"), id));
            }
        }
        JsonValue::Object(map) => {
            for (key, child) in map {
                path.push(key.clone());
                walk_json(child, path, links)?;
                path.pop();
            }
        }
        JsonValue::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                path.push(i.to_string());
                walk_json(child, path, links)?;
                path.pop();
            }
        }
        _ => {}
    }
    Ok(())
}

fn walk_cbor(
    value: &CborValue,
    path: &mut Vec<String>,
    links: &mut Vec<(String, ContentIdentifier)>,
) -> Result<(), CodecError> {
    match value {
        CborValue::Tag(CID_TAG, inner) => match inner.as_ref() {
            CborValue::Bytes(raw) => links.push((path.join("/"), cid_from_tagged(raw)?)),
            _ => return Err(CodecError::InvalidLink("tag 42 must wrap bytes".into())),
        },
        CborValue::Tag(_, inner) => walk_cbor(inner, path, links)?,
        CborValue::Map(map) => {
            for (key, child) in map {
                let segment = match key {
                    CborValue::Text(s) => s.clone(),
                    CborValue::Integer(n) => n.to_string(),
                    _ => return Err(CodecError::InvalidField("dag-cbor map keys must be strings".into())),
                };
                path.push(segment);
                walk_cbor(child, path, links)?;
                path.pop();
            }
        }
        CborValue::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                path.push(i.to_string());
                walk_cbor(child, path, links)?;
                path.pop();
            }
        }
        _ => {}
    }
    Ok(())
}

/// Tag-42 payloads carry a 0x00 multibase-identity prefix before the CID.
fn cid_from_tagged(raw: &[u8]) -> Result<ContentIdentifier, CodecError> {
    match raw.split_first() {
        Some((0x00, rest)) => ContentIdentifier::from_bytes(rest)
            .map_err(|e| CodecError::InvalidLink(e.to_string())),
        _ => Err(CodecError::InvalidLink("missing identity multibase prefix".into())),
    }
}

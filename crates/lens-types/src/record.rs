use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identifier::ContentIdentifier;
use crate::label::ContentTypeLabel;

/// A single type-specific metadata value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Identifier(ContentIdentifier),
    List(Vec<FieldValue>),
    Map(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Plain JSON rendering (no variant tags), for display.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Self::Text(s) => Value::String(s.clone()),
            Self::Integer(n) => Value::from(*n),
            Self::Float(x) => Value::from(*x),
            Self::Bool(b) => Value::Bool(*b),
            Self::Identifier(id) => Value::String(id.to_canonical()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<u64> for FieldValue {
    fn from(n: u64) -> Self {
        Self::Integer(i64::try_from(n).unwrap_or(i64::MAX))
    }
}

impl From<usize> for FieldValue {
    fn from(n: usize) -> Self {
        Self::from(n as u64)
    }
}

impl From<f64> for FieldValue {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<ContentIdentifier> for FieldValue {
    fn from(id: ContentIdentifier) -> Self {
        Self::Identifier(id)
    }
}

/// Normalized metadata derived from one object.
///
/// The source identifier is fixed at construction; there is no setter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    source: ContentIdentifier,
    content_type: ContentTypeLabel,
    fields: BTreeMap<String, FieldValue>,
    extracted_at: DateTime<Utc>,
}

impl MetadataRecord {
    /// Create an empty record stamped with the current time.
    pub fn new(source: ContentIdentifier, content_type: ContentTypeLabel) -> Self {
        Self::at(source, content_type, Utc::now())
    }

    /// Create an empty record with an explicit extraction time.
    pub fn at(
        source: ContentIdentifier,
        content_type: ContentTypeLabel,
        extracted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            source,
            content_type,
            fields: BTreeMap::new(),
            extracted_at,
        }
    }

    /// Builder-style field insertion.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace a field.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn source(&self) -> &ContentIdentifier {
        &self.source
    }

    pub fn content_type(&self) -> ContentTypeLabel {
        self.content_type
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn extracted_at(&self) -> DateTime<Utc> {
        self.extracted_at
    }

    /// Plain JSON rendering, for display.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "source": self.source.to_canonical(),
            "content_type": self.content_type.as_str(),
            "extracted_at": self.extracted_at.to_rfc3339(),
            "fields": self
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect::<serde_json::Map<_, _>>(),
        })
    }
}

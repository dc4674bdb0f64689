use std::fmt;

use serde::{Deserialize, Serialize};

/// Content-type label assigned by classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentTypeLabel {
    /// Recognized binary formats (archives, executables).
    RawBinary,
    /// A linked-data node whose value lies in its links.
    GraphNode,
    Image,
    /// Text-bearing content (plain text, HTML, PDF).
    Document,
    /// Empty, unrecognized, or ambiguous content.
    Unknown,
}

impl ContentTypeLabel {
    pub const ALL: [Self; 5] = [
        Self::RawBinary,
        Self::GraphNode,
        Self::Image,
        Self::Document,
        Self::Unknown,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RawBinary => "raw_binary",
            Self::GraphNode => "graph_node",
            Self::Image => "image",
            Self::Document => "document",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ContentTypeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

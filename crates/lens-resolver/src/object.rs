use std::collections::BTreeMap;

use lens_types::{Codec, ContentIdentifier, FieldValue};

use crate::dagpb::{PbNode, UnixFsData, UnixFsType};
use crate::error::{ResolveError, ResolveResult};
use crate::ipld::StructuredNode;

/// An outbound link from a graph node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Link {
    pub target: ContentIdentifier,
    pub name: Option<String>,
    pub size: Option<u64>,
}

/// Codec-specific view of a decoded block.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    /// `raw` codec: the block is the content.
    Raw,
    /// `dag-pb`: the UnixFS payload, when the node carries a valid one.
    Pb { unixfs: Option<UnixFsData> },
    /// `dag-json` / `dag-cbor`: top-level textual attributes.
    Structured {
        attributes: BTreeMap<String, FieldValue>,
    },
}

/// A fetched, verified and decoded block.
///
/// Links are listed but not followed.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedObject {
    identifier: ContentIdentifier,
    bytes: Vec<u8>,
    links: Vec<Link>,
    node: Node,
    assembled: Option<Vec<u8>>,
}

impl ResolvedObject {
    /// Decode `bytes` according to the identifier's codec.
    pub fn decode(identifier: ContentIdentifier, bytes: Vec<u8>) -> ResolveResult<Self> {
        let (links, node) = match identifier.codec() {
            Codec::Raw => (Vec::new(), Node::Raw),
            Codec::DagPb => {
                let pb = PbNode::decode(&bytes)
                    .map_err(|e| ResolveError::decode(&identifier, e.to_string()))?;
                let unixfs = pb.unixfs();
                let links = pb
                    .links
                    .into_iter()
                    .map(|l| Link {
                        target: l.hash,
                        name: l.name,
                        size: l.tsize,
                    })
                    .collect();
                (links, Node::Pb { unixfs })
            }
            Codec::DagJson | Codec::DagCbor => {
                let decoded = if identifier.codec() == Codec::DagJson {
                    StructuredNode::decode_json(&bytes)
                } else {
                    StructuredNode::decode_cbor(&bytes)
                }
                .map_err(|e| ResolveError::decode(&identifier, e.to_string()))?;
                let links = decoded
                    .links
                    .into_iter()
                    .map(|(path, target)| Link {
                        target,
                        name: (!path.is_empty()).then_some(path),
                        size: None,
                    })
                    .collect();
                (
                    links,
                    Node::Structured {
                        attributes: decoded.attributes,
                    },
                )
            }
        };
        Ok(Self {
            identifier,
            bytes,
            links,
            node,
            assembled: None,
        })
    }

    pub fn identifier(&self) -> &ContentIdentifier {
        &self.identifier
    }

    pub fn codec(&self) -> Codec {
        self.identifier.codec()
    }

    /// The block exactly as fetched.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn unixfs(&self) -> Option<&UnixFsData> {
        match &self.node {
            Node::Pb { unixfs } => unixfs.as_ref(),
            _ => None,
        }
    }

    /// A dag-pb UnixFS file (or raw) node.
    pub fn is_unixfs_file(&self) -> bool {
        self.unixfs().is_some_and(|u| u.kind.is_file())
    }

    /// A UnixFS file whose bytes live in linked chunks.
    pub fn is_chunked_file(&self) -> bool {
        self.is_unixfs_file() && !self.links.is_empty()
    }

    /// The byte content the object stands for.
    ///
    /// `raw` blocks are their own content; UnixFS files yield their inline
    /// data (or the assembled bytes once [`with_content`](Self::with_content)
    /// has been applied); other nodes yield the encoded block.
    pub fn content(&self) -> &[u8] {
        if let Some(assembled) = &self.assembled {
            return assembled;
        }
        match &self.node {
            Node::Raw | Node::Structured { .. } => &self.bytes,
            Node::Pb { unixfs } => match unixfs {
                Some(u) if u.kind.is_file() || u.kind == UnixFsType::Symlink => {
                    u.data.as_deref().unwrap_or_default()
                }
                _ => &[],
            },
        }
    }

    /// Replace the content with bytes reassembled from linked chunks.
    pub fn with_content(mut self, content: Vec<u8>) -> Self {
        self.assembled = Some(content);
        self
    }

    pub fn is_assembled(&self) -> bool {
        self.assembled.is_some()
    }
}

/// One node reached during a deep resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct GraphEntry {
    /// Hops from the root (the root is depth 0).
    pub depth: usize,
    pub object: ResolvedObject,
}

/// Result of a bounded breadth-first traversal.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedGraph {
    pub root: ContentIdentifier,
    /// Distinct nodes in breadth-first order.
    pub nodes: Vec<GraphEntry>,
}

impl ResolvedGraph {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &ContentIdentifier) -> Option<&ResolvedObject> {
        self.nodes
            .iter()
            .find(|e| e.object.identifier() == id)
            .map(|e| &e.object)
    }

    pub fn identifiers(&self) -> Vec<ContentIdentifier> {
        self.nodes.iter().map(|e| *e.object.identifier()).collect()
    }

    /// Deepest level reached.
    pub fn depth(&self) -> usize {
        self.nodes.iter().map(|e| e.depth).max().unwrap_or(0)
    }
}

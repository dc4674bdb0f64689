//! UnixFS DAG builder.
//!
//! Produces the blocks Lens itself writes when importing files: small files
//! become a single dag-pb node with inline data; larger files are split into
//! raw leaves under a balanced tree of dag-pb `File` nodes.

use lens_types::{Codec, ContentIdentifier, HashFunction, TypeError};

use crate::dagpb::{PbLink, PbNode, UnixFsData};

/// Default leaf size for imported files.
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Default fan-out of interior nodes.
pub const DEFAULT_MAX_LINKS: usize = 174;

/// A built DAG: the root identifier plus every block, leaves first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnixFsDag {
    pub root: ContentIdentifier,
    pub blocks: Vec<(ContentIdentifier, Vec<u8>)>,
}

struct Built {
    id: ContentIdentifier,
    file_size: u64,
    tsize: u64,
}

/// Chunk `content` into a UnixFS file DAG.
pub fn build_file(content: &[u8], chunk_size: usize, max_links: usize) -> Result<UnixFsDag, TypeError> {
    let chunk_size = chunk_size.max(1);
    let max_links = max_links.max(2);
    let mut blocks = Vec::new();

    if content.len() <= chunk_size {
        let node = PbNode {
            links: Vec::new(),
            data: Some(UnixFsData::file(Some(content.to_vec()), content.len() as u64, Vec::new()).encode()),
        };
        let bytes = node.encode();
        let id = ContentIdentifier::from_content(Codec::DagPb, HashFunction::Sha2_256, &bytes)?;
        blocks.push((id, bytes));
        return Ok(UnixFsDag { root: id, blocks });
    }

    let mut level = Vec::new();
    for chunk in content.chunks(chunk_size) {
        let id = ContentIdentifier::from_content(Codec::Raw, HashFunction::Sha2_256, chunk)?;
        blocks.push((id, chunk.to_vec()));
        level.push(Built {
            id,
            file_size: chunk.len() as u64,
            tsize: chunk.len() as u64,
        });
    }

    while level.len() > 1 {
        let mut parents = Vec::with_capacity(level.len().div_ceil(max_links));
        for group in level.chunks(max_links) {
            let file_size: u64 = group.iter().map(|c| c.file_size).sum();
            let node = PbNode {
                links: group
                    .iter()
                    .map(|c| PbLink::new(c.id, None, Some(c.tsize)))
                    .collect(),
                data: Some(
                    UnixFsData::file(None, file_size, group.iter().map(|c| c.file_size).collect())
                        .encode(),
                ),
            };
            let bytes = node.encode();
            let id = ContentIdentifier::from_content(Codec::DagPb, HashFunction::Sha2_256, &bytes)?;
            let tsize = bytes.len() as u64 + group.iter().map(|c| c.tsize).sum::<u64>();
            blocks.push((id, bytes));
            parents.push(Built { id, file_size, tsize });
        }
        level = parents;
    }

    let root = level
        .first()
        .map(|b| b.id)
        .ok_or_else(|| TypeError::Serialization("empty file DAG".into()))?;
    Ok(UnixFsDag { root, blocks })
}

/// Encode a UnixFS directory node over named entries.
pub fn build_directory(entries: &[(String, ContentIdentifier, u64)]) -> Result<UnixFsDag, TypeError> {
    let node = PbNode {
        links: entries
            .iter()
            .map(|(name, id, size)| PbLink::new(*id, Some(name.clone()), Some(*size)))
            .collect(),
        data: Some(UnixFsData::directory().encode()),
    };
    let bytes = node.encode();
    let root = ContentIdentifier::from_content(Codec::DagPb, HashFunction::Sha2_256, &bytes)?;
    Ok(UnixFsDag {
        root,
        blocks: vec![(root, bytes)],
    })
}

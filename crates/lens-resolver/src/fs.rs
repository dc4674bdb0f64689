use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lens_types::{Codec, ContentIdentifier, HashFunction};
use tracing::debug;

use crate::error::{BlockStoreError, FetchError};
use crate::store::ContentStore;

/// Block directory with one file per block.
///
/// Layout: `<root>/<hash-function>/<hex[0..2]>/<hex[2..]>`. Writes go
/// through a temp file in the target directory and are renamed into place,
/// so readers never observe a partial block.
#[derive(Clone, Debug)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    /// Open (creating if needed) a block directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, BlockStoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn block_path(&self, digest: &[u8], hash_function: HashFunction) -> PathBuf {
        let hex = hex::encode(digest);
        let (prefix, rest) = if hex.len() > 2 {
            hex.split_at(2)
        } else {
            (hex.as_str(), "_")
        };
        self.root.join(hash_function.name()).join(prefix).join(rest)
    }

    /// Hash and store a block, returning its identifier. Idempotent.
    pub fn put_block(
        &self,
        codec: Codec,
        hash_function: HashFunction,
        data: &[u8],
    ) -> Result<ContentIdentifier, BlockStoreError> {
        let id = ContentIdentifier::from_content(codec, hash_function, data)?;
        let path = self.block_path(id.digest(), hash_function);
        if path.exists() {
            return Ok(id);
        }
        let dir = path.parent().unwrap_or(&self.root);
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;
        debug!(cid = %id, path = %path.display(), "block written");
        Ok(id)
    }

    pub fn contains(&self, id: &ContentIdentifier) -> bool {
        self.block_path(id.digest(), id.hash_function()).exists()
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn fetch(&self, digest: &[u8], hash_function: HashFunction) -> Result<Vec<u8>, FetchError> {
        let path = self.block_path(digest, hash_function);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(FetchError::NotFound),
            Err(e) => Err(FetchError::Transport(format!("{}: {e}", path.display()))),
        }
    }
}

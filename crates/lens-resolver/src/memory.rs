use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use lens_types::{Codec, ContentIdentifier, HashFunction, TypeError};

use crate::error::FetchError;
use crate::store::ContentStore;

type BlockKey = (HashFunction, Vec<u8>);

/// In-memory, HashMap-based block store.
///
/// Intended for tests and embedding. Blocks are held behind a `RwLock` and
/// cloned on fetch. Every fetch is counted so tests can assert how often the
/// resolver went to the store.
pub struct InMemoryContentStore {
    blocks: RwLock<HashMap<BlockKey, Vec<u8>>>,
    fetches: AtomicUsize,
}

impl InMemoryContentStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            blocks: RwLock::new(HashMap::new()),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Hash `data` with `hash_function`, store it, and return its identifier.
    pub fn put(
        &self,
        codec: Codec,
        hash_function: HashFunction,
        data: impl Into<Vec<u8>>,
    ) -> Result<ContentIdentifier, TypeError> {
        let data = data.into();
        let id = ContentIdentifier::from_content(codec, hash_function, &data)?;
        self.insert(&id, data);
        Ok(id)
    }

    /// Store a raw sha2-256 block.
    pub fn put_raw(&self, data: impl Into<Vec<u8>>) -> Result<ContentIdentifier, TypeError> {
        self.put(Codec::Raw, HashFunction::Sha2_256, data)
    }

    /// Store bytes under an identifier without verifying them.
    ///
    /// Lets tests plant corrupt blocks.
    pub fn insert(&self, id: &ContentIdentifier, data: Vec<u8>) {
        let key = (id.hash_function(), id.digest().to_vec());
        self.blocks.write().expect("lock poisoned").insert(key, data);
    }

    /// Remove the block behind an identifier. Returns `true` if it existed.
    pub fn remove(&self, id: &ContentIdentifier) -> bool {
        let key = (id.hash_function(), id.digest().to_vec());
        self.blocks.write().expect("lock poisoned").remove(&key).is_some()
    }

    pub fn contains(&self, id: &ContentIdentifier) -> bool {
        let key = (id.hash_function(), id.digest().to_vec());
        self.blocks.read().expect("lock poisoned").contains_key(&key)
    }

    /// Number of blocks currently stored.
    pub fn len(&self) -> usize {
        self.blocks.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `fetch` calls served so far, hits and misses alike.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn fetch(&self, digest: &[u8], hash_function: HashFunction) -> Result<Vec<u8>, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let map = self.blocks.read().expect("lock poisoned");
        map.get(&(hash_function, digest.to_vec()))
            .cloned()
            .ok_or(FetchError::NotFound)
    }
}

impl std::fmt::Debug for InMemoryContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryContentStore")
            .field("block_count", &self.len())
            .field("fetches", &self.fetch_count())
            .finish()
    }
}

use async_trait::async_trait;
use lens_types::{ContentIdentifier, HashFunction};

use crate::error::FetchError;

/// Content-addressed block source consulted by the resolver.
///
/// Implementations must satisfy these invariants:
/// - The same digest always yields the same bytes.
/// - `fetch` never interprets the block; decoding is the resolver's job.
/// - Missing blocks are `FetchError::NotFound`, never empty bytes.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Fetch the block addressed by `digest` under `hash_function`.
    async fn fetch(&self, digest: &[u8], hash_function: HashFunction) -> Result<Vec<u8>, FetchError>;

    /// Fetch the block for a full identifier.
    ///
    /// Blocks are keyed by multihash only, so identifiers that differ only in
    /// codec share a block.
    async fn fetch_id(&self, id: &ContentIdentifier) -> Result<Vec<u8>, FetchError> {
        self.fetch(id.digest(), id.hash_function()).await
    }
}

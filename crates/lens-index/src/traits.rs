use std::fmt;

use lens_types::{ContentIdentifier, IndexEntry, MetadataRecord};

use crate::error::{IndexError, IndexResult};

/// Handle returned by a successful `put`: the canonical key string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn new(id: &ContentIdentifier) -> Self {
        Self(id.to_canonical())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier-keyed metadata index.
///
/// All implementations must satisfy these invariants:
/// - `put` is last-write-wins; a key overwritten keeps its iteration position.
/// - `put` rejects a record whose source is not the key.
/// - Callers receive copies; nothing hands out references into storage.
/// - Operations on one key are linearizable without external locking.
/// - Iteration follows first-insertion order of live keys.
pub trait MetadataIndex: Send + Sync {
    /// Store `record` under `key`, replacing any previous record.
    fn put(&self, key: &ContentIdentifier, record: MetadataRecord) -> IndexResult<StorageKey>;

    /// Fetch a copy of the record stored under `key`.
    fn get(&self, key: &ContentIdentifier) -> IndexResult<MetadataRecord>;

    /// Remove the entry for `key`.
    fn delete(&self, key: &ContentIdentifier) -> IndexResult<()>;

    /// Snapshot of live keys in iteration order.
    fn keys(&self) -> Vec<ContentIdentifier>;

    /// Number of live entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains(&self, key: &ContentIdentifier) -> bool {
        self.get(key).is_ok()
    }

    /// A fresh pass over the index.
    ///
    /// Keys are snapshotted when the pass starts and records are read
    /// lazily; entries deleted mid-pass are skipped and entries added
    /// mid-pass are not observed.
    fn iterate(&self) -> EntryIter<'_>;

    /// Release the underlying storage.
    fn close(&self) -> IndexResult<()> {
        Ok(())
    }
}

/// Lazy, finite pass over an index. See [`MetadataIndex::iterate`].
pub struct EntryIter<'a> {
    index: &'a dyn MetadataIndex,
    keys: std::vec::IntoIter<ContentIdentifier>,
}

impl<'a> EntryIter<'a> {
    pub fn new(index: &'a dyn MetadataIndex) -> Self {
        Self {
            keys: index.keys().into_iter(),
            index,
        }
    }
}

impl Iterator for EntryIter<'_> {
    type Item = IndexResult<IndexEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        for key in self.keys.by_ref() {
            match self.index.get(&key) {
                Ok(record) => return Some(Ok(IndexEntry { key, record })),
                Err(IndexError::NotFound(_)) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.keys.len()))
    }
}

/// Check that a record belongs under `key`.
pub(crate) fn check_key(key: &ContentIdentifier, record: &MetadataRecord) -> IndexResult<()> {
    if record.source() != key {
        return Err(IndexError::KeyMismatch {
            key: *key,
            record: *record.source(),
        });
    }
    Ok(())
}

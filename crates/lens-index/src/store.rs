use std::fs::{self, File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use lens_types::{ContentIdentifier, MetadataRecord};
use tracing::{debug, info, warn};

use crate::error::{IndexError, IndexResult};
use crate::log::{IndexLog, LogRecord, SyncMode};
use crate::ordered::OrderedEntries;
use crate::traits::{check_key, EntryIter, MetadataIndex, StorageKey};

/// Name of the lock file inside a store directory.
pub const LOCK_FILE: &str = "LOCK";
/// Name of the mutation log inside a store directory.
pub const LOG_FILE: &str = "index.log";

/// Outcome of [`MetadataStore::compact`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompactStats {
    pub bytes_before: u64,
    pub bytes_after: u64,
    pub entries: usize,
}

struct Inner {
    lock: Option<File>,
    log: Option<IndexLog>,
    entries: OrderedEntries,
}

impl Inner {
    fn log_mut(&mut self) -> IndexResult<&mut IndexLog> {
        self.log.as_mut().ok_or(IndexError::Closed)
    }

    fn ensure_open(&self) -> IndexResult<()> {
        if self.log.is_some() {
            Ok(())
        } else {
            Err(IndexError::Closed)
        }
    }
}

/// Disk-backed metadata index.
///
/// A store directory holds `LOCK` and `index.log`. The handle keeps an
/// exclusive OS lock on `LOCK` from `open` until `close` or drop, so a
/// second handle on the same directory fails with
/// [`IndexError::StorageLocked`]. Entries are materialized in memory from the
/// log at open time; every mutation is appended to the log before it becomes
/// visible.
pub struct MetadataStore {
    dir: PathBuf,
    sync: SyncMode,
    inner: RwLock<Inner>,
}

impl MetadataStore {
    /// Open (or create) the store at `dir` with the default sync mode.
    pub fn open(dir: impl AsRef<Path>) -> IndexResult<Self> {
        Self::open_with(dir, SyncMode::default())
    }

    pub fn open_with(dir: impl AsRef<Path>, sync: SyncMode) -> IndexResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(dir.join(LOCK_FILE))?;
        match lock.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => return Err(IndexError::StorageLocked(dir)),
            Err(TryLockError::Error(e)) => return Err(e.into()),
        }

        let (log, replay) = IndexLog::open(&dir.join(LOG_FILE), sync)?;
        if replay.skipped > 0 {
            warn!(path = %dir.display(), skipped = replay.skipped, "index log contained unreadable entries");
        }

        let mut entries = OrderedEntries::default();
        for record in replay.records {
            match record {
                LogRecord::Put { key, record } => entries.upsert(key, record),
                LogRecord::Delete { key } => {
                    entries.remove(&key);
                }
            }
        }
        info!(path = %dir.display(), entries = entries.len(), "metadata store opened");

        Ok(Self {
            dir,
            sync,
            inner: RwLock::new(Inner {
                lock: Some(lock),
                log: Some(log),
                entries,
            }),
        })
    }

    /// Directory this store lives in.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn is_closed(&self) -> bool {
        self.inner.read().expect("lock poisoned").log.is_none()
    }

    /// Rewrite the log so it holds exactly one `Put` per live entry, in
    /// iteration order. A failed rewrite leaves the store open on its
    /// current log.
    pub fn compact(&self) -> IndexResult<CompactStats> {
        let mut inner = self.inner.write().expect("lock poisoned");
        let bytes_before = inner.log_mut()?.offset();

        let records: Vec<LogRecord> = inner
            .entries
            .iter()
            .map(|(key, record)| LogRecord::Put {
                key: *key,
                record: record.clone(),
            })
            .collect();

        // The current log stays live until the rewritten one is in place.
        let log = IndexLog::rewrite(&self.dir.join(LOG_FILE), records.iter(), self.sync).map_err(|e| {
            warn!(path = %self.dir.display(), error = %e, "index log compaction failed; keeping current log");
            e
        })?;
        let stats = CompactStats {
            bytes_before,
            bytes_after: log.offset(),
            entries: records.len(),
        };
        inner.log = Some(log);

        info!(
            path = %self.dir.display(),
            bytes_before = stats.bytes_before,
            bytes_after = stats.bytes_after,
            entries = stats.entries,
            "index log compacted"
        );
        Ok(stats)
    }
}

impl MetadataIndex for MetadataStore {
    fn put(&self, key: &ContentIdentifier, record: MetadataRecord) -> IndexResult<StorageKey> {
        check_key(key, &record)?;
        let mut inner = self.inner.write().expect("lock poisoned");
        let entry = LogRecord::Put { key: *key, record };
        inner.log_mut()?.append(&entry)?;
        if let LogRecord::Put { key, record } = entry {
            inner.entries.upsert(key, record);
        }
        debug!(cid = %key, "metadata stored");
        Ok(StorageKey::new(key))
    }

    fn get(&self, key: &ContentIdentifier) -> IndexResult<MetadataRecord> {
        let inner = self.inner.read().expect("lock poisoned");
        inner.ensure_open()?;
        inner.entries.get(key).cloned().ok_or(IndexError::NotFound(*key))
    }

    fn delete(&self, key: &ContentIdentifier) -> IndexResult<()> {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.ensure_open()?;
        if !inner.entries.contains(key) {
            return Err(IndexError::NotFound(*key));
        }
        inner.log_mut()?.append(&LogRecord::Delete { key: *key })?;
        inner.entries.remove(key);
        debug!(cid = %key, "metadata deleted");
        Ok(())
    }

    fn keys(&self) -> Vec<ContentIdentifier> {
        self.inner.read().expect("lock poisoned").entries.keys()
    }

    fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").entries.len()
    }

    fn contains(&self, key: &ContentIdentifier) -> bool {
        let inner = self.inner.read().expect("lock poisoned");
        inner.log.is_some() && inner.entries.contains(key)
    }

    fn iterate(&self) -> EntryIter<'_> {
        EntryIter::new(self)
    }

    /// Sync the log and release the directory lock. Idempotent.
    fn close(&self) -> IndexResult<()> {
        let mut inner = self.inner.write().expect("lock poisoned");
        let Some(mut log) = inner.log.take() else {
            return Ok(());
        };
        log.sync()?;
        drop(log);
        inner.entries.clear();
        if let Some(lock) = inner.lock.take() {
            lock.unlock()?;
        }
        info!(path = %self.dir.display(), "metadata store closed");
        Ok(())
    }
}

impl Drop for MetadataStore {
    fn drop(&mut self) {
        if let Err(e) = MetadataIndex::close(self) {
            warn!(path = %self.dir.display(), error = %e, "failed to close metadata store cleanly");
        }
    }
}

impl std::fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStore")
            .field("dir", &self.dir)
            .field("sync", &self.sync)
            .field("entry_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lens_types::{Codec, ContentTypeLabel, HashFunction};

    fn key(n: u8) -> ContentIdentifier {
        ContentIdentifier::from_content(Codec::Raw, HashFunction::Sha2_256, &[n]).unwrap()
    }

    fn record(n: u8) -> MetadataRecord {
        MetadataRecord::new(key(n), ContentTypeLabel::RawBinary).with_field("byte_length", u64::from(n))
    }

    #[test]
    fn second_handle_is_locked_out_until_close() {
        let dir = tempfile::tempdir().unwrap();
        let first = MetadataStore::open(dir.path()).unwrap();
        let err = MetadataStore::open(dir.path()).unwrap_err();
        assert!(matches!(err, IndexError::StorageLocked(_)));

        first.close().unwrap();
        assert!(first.is_closed());
        let second = MetadataStore::open(dir.path()).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn drop_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        drop(MetadataStore::open(dir.path()).unwrap());
        MetadataStore::open(dir.path()).unwrap();
    }

    #[test]
    fn operations_after_close_fail() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::open(dir.path()).unwrap();
        store.put(&key(1), record(1)).unwrap();
        store.close().unwrap();
        store.close().unwrap();

        assert!(matches!(store.put(&key(2), record(2)), Err(IndexError::Closed)));
        assert!(matches!(store.get(&key(1)), Err(IndexError::Closed)));
        assert!(matches!(store.delete(&key(1)), Err(IndexError::Closed)));
        assert!(!store.contains(&key(1)));
    }

    #[test]
    fn entries_survive_reopen_in_order() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = MetadataStore::open_with(dir.path(), SyncMode::EveryWrite).unwrap();
            for n in 0..4 {
                store.put(&key(n), record(n)).unwrap();
            }
            store.delete(&key(1)).unwrap();
            store.put(&key(0), record(0).with_field("rewritten", true)).unwrap();
        }

        let store = MetadataStore::open(dir.path()).unwrap();
        assert_eq!(store.keys(), vec![key(0), key(2), key(3)]);
        assert!(store.get(&key(0)).unwrap().field("rewritten").is_some());
        assert!(matches!(store.get(&key(1)), Err(IndexError::NotFound(_))));
    }

    #[test]
    fn delete_missing_key_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::open(dir.path()).unwrap();
        assert!(matches!(store.delete(&key(7)), Err(IndexError::NotFound(_))));
        let len = fs::metadata(dir.path().join(LOG_FILE)).unwrap().len();
        assert_eq!(len, 0);
    }

    #[cfg(unix)]
    #[test]
    fn failed_compaction_keeps_store_usable() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("store");
        let store = MetadataStore::open(&dir).unwrap();
        store.put(&key(1), record(1)).unwrap();

        // Without its directory the rewrite cannot create a temp file.
        fs::remove_dir_all(&dir).unwrap();
        assert!(matches!(store.compact(), Err(IndexError::Io(_))));
        assert!(!store.is_closed());
        store.put(&key(2), record(2)).unwrap();
        assert_eq!(store.get(&key(1)).unwrap().source(), &key(1));

        fs::create_dir_all(&dir).unwrap();
        let stats = store.compact().unwrap();
        assert_eq!(stats.entries, 2);
        store.close().unwrap();

        let reopened = MetadataStore::open(&dir).unwrap();
        assert_eq!(reopened.keys(), vec![key(1), key(2)]);
    }

    #[test]
    fn torn_frame_then_more_writes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = MetadataStore::open(dir.path()).unwrap();
            store.put(&key(1), record(1)).unwrap();
        }
        // A crash mid-append leaves a frame header with no payload.
        let mut log = OpenOptions::new().append(true).open(dir.path().join(LOG_FILE)).unwrap();
        std::io::Write::write_all(&mut log, &[0x40, 0, 0, 0, 0xde, 0xad]).unwrap();
        drop(log);

        {
            let store = MetadataStore::open(dir.path()).unwrap();
            assert_eq!(store.keys(), vec![key(1)]);
            store.put(&key(2), record(2)).unwrap();
            store.put(&key(3), record(3)).unwrap();
        }
        let store = MetadataStore::open(dir.path()).unwrap();
        assert_eq!(store.keys(), vec![key(1), key(2), key(3)]);
        assert_eq!(store.get(&key(3)).unwrap().field("byte_length"), Some(&3u64.into()));
    }

    #[test]
    fn compact_keeps_only_live_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::open(dir.path()).unwrap();
        for round in 0..3u64 {
            for n in 0..5 {
                store.put(&key(n), record(n).with_field("round", round)).unwrap();
            }
        }
        store.delete(&key(4)).unwrap();

        let stats = store.compact().unwrap();
        assert_eq!(stats.entries, 4);
        assert!(stats.bytes_after < stats.bytes_before);

        // Still writable after compaction, and the result survives reopen.
        store.put(&key(9), record(9)).unwrap();
        let expected: Vec<_> = store.iterate().map(|e| e.unwrap()).collect();
        store.close().unwrap();

        let reopened = MetadataStore::open(dir.path()).unwrap();
        let actual: Vec<_> = reopened.iterate().map(|e| e.unwrap()).collect();
        assert_eq!(actual, expected);
        assert_eq!(actual.len(), 5);
    }
}

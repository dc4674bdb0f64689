use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use lens_types::{ContentIdentifier, MetadataRecord};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{IndexError, IndexResult};

/// One mutation recorded in the index log.
///
/// On-disk framing:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized LogRecord)]
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LogRecord {
    Put {
        key: ContentIdentifier,
        record: MetadataRecord,
    },
    Delete {
        key: ContentIdentifier,
    },
}

/// Flush/sync strategy for the log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncMode {
    /// `fsync` after every append.
    EveryWrite,
    /// Hand each append to the OS and rely on its page cache.
    #[default]
    OsDefault,
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// Result of replaying a log file.
#[derive(Debug, Default)]
pub struct Replay {
    pub records: Vec<LogRecord>,
    /// Bytes up to the end of the last well-framed entry.
    pub valid_len: u64,
    /// Entries dropped because of CRC or decode failures.
    pub skipped: usize,
}

fn encode(record: &LogRecord) -> IndexResult<Vec<u8>> {
    let payload = bincode::serialize(record).map_err(|e| IndexError::Serialization(e.to_string()))?;
    let length = u32::try_from(payload.len())
        .map_err(|_| IndexError::Serialization(format!("log entry of {} bytes is too large", payload.len())))?;
    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&length.to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Append-only, CRC-framed log of index mutations.
///
/// Owned by a single store handle; the store serializes access. A failed
/// append is cut back to the last complete frame before the error is
/// returned, so a later append never lands after a partial frame.
pub struct IndexLog {
    path: PathBuf,
    file: File,
    offset: u64,
    sync: SyncMode,
    poisoned: bool,
}

impl IndexLog {
    /// Open (or create) the log, replay it, and cut off any torn tail so new
    /// appends land directly after the last valid entry.
    pub fn open(path: &Path, sync: SyncMode) -> IndexResult<(Self, Replay)> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let replay = Self::replay(path)?;
        let file_len = file.metadata()?.len();
        if replay.valid_len < file_len {
            warn!(
                path = %path.display(),
                valid_len = replay.valid_len,
                file_len,
                "discarding torn tail of index log"
            );
            file.set_len(replay.valid_len)?;
        }

        let log = Self {
            path: path.to_path_buf(),
            file,
            offset: replay.valid_len,
            sync,
            poisoned: false,
        };
        Ok((log, replay))
    }

    /// Read every valid entry from the log at `path`.
    ///
    /// Entries failing the CRC check or bincode decoding are skipped; an
    /// entry whose length runs past the end of the file ends the replay.
    pub fn replay(path: &Path) -> IndexResult<Replay> {
        let mut replay = Replay::default();
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(replay),
            Err(e) => return Err(e.into()),
        };
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut offset: u64 = 0;

        while offset + HEADER_SIZE as u64 <= file_len {
            let mut header = [0u8; HEADER_SIZE];
            reader.read_exact(&mut header)?;
            let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            if length == 0 || offset + HEADER_SIZE as u64 + u64::from(length) > file_len {
                warn!(offset, length, file_len, "invalid index log entry length; stopping replay");
                break;
            }

            let mut payload = vec![0u8; length as usize];
            reader.read_exact(&mut payload)?;
            let next = offset + HEADER_SIZE as u64 + u64::from(length);

            let actual_crc = crc32fast::hash(&payload);
            if actual_crc != expected_crc {
                warn!(offset, expected = expected_crc, actual = actual_crc, "CRC mismatch; skipping entry");
                replay.skipped += 1;
            } else {
                match bincode::deserialize::<LogRecord>(&payload) {
                    Ok(record) => replay.records.push(record),
                    Err(e) => {
                        warn!(offset, error = %e, "failed to deserialize index log entry; skipping");
                        replay.skipped += 1;
                    }
                }
            }
            offset = next;
            replay.valid_len = next;
        }

        debug!(path = %path.display(), recovered = replay.records.len(), skipped = replay.skipped, "index log replayed");
        Ok(replay)
    }

    /// Append one record. Returns the byte offset it was written at.
    pub fn append(&mut self, record: &LogRecord) -> IndexResult<u64> {
        if self.poisoned {
            return Err(IndexError::Poisoned(self.path.clone()));
        }
        let frame = encode(record)?;
        let at = self.offset;
        if let Err(e) = self.write_frame(&frame) {
            self.discard_partial_write();
            return Err(e.into());
        }
        self.offset += frame.len() as u64;
        Ok(at)
    }

    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.file.write_all(frame)?;
        if self.sync == SyncMode::EveryWrite {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Cut the file back to the end of the last complete frame.
    fn discard_partial_write(&mut self) {
        let restored = self
            .file
            .set_len(self.offset)
            .and_then(|()| self.file.seek(SeekFrom::Start(self.offset)).map(|_| ()));
        if let Err(e) = restored {
            warn!(path = %self.path.display(), offset = self.offset, error = %e, "cannot roll back failed append");
            self.poisoned = true;
        }
    }

    /// Atomically replace the log with `records`: write a temp file in the
    /// same directory, fsync it, and rename it over the log.
    ///
    /// On error the file at `path` is left as it was.
    pub fn rewrite<'a>(
        path: &Path,
        records: impl IntoIterator<Item = &'a LogRecord>,
        sync: SyncMode,
    ) -> IndexResult<Self> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let tmp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            for record in records {
                writer.write_all(&encode(record)?)?;
            }
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        let mut file = tmp.persist(path).map_err(|e| IndexError::Io(e.error))?;
        let offset = file.seek(SeekFrom::End(0))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            offset,
            sync,
            poisoned: false,
        })
    }

    /// Fsync the log.
    pub fn sync(&mut self) -> IndexResult<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Current size of the log in bytes.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for IndexLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexLog")
            .field("path", &self.path)
            .field("offset", &self.offset)
            .field("sync", &self.sync)
            .field("poisoned", &self.poisoned)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lens_types::{Codec, ContentTypeLabel, HashFunction};
    use std::io::{Seek, SeekFrom};

    fn key(n: u8) -> ContentIdentifier {
        ContentIdentifier::from_content(Codec::Raw, HashFunction::Sha2_256, &[n]).unwrap()
    }

    fn fixed_time() -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn put(n: u8) -> LogRecord {
        LogRecord::Put {
            key: key(n),
            record: MetadataRecord::at(key(n), ContentTypeLabel::RawBinary, fixed_time())
                .with_field("byte_length", 1u64),
        }
    }

    #[test]
    fn append_then_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.log");
        let (mut log, replay) = IndexLog::open(&path, SyncMode::EveryWrite).unwrap();
        assert!(replay.records.is_empty());

        assert_eq!(log.append(&put(1)).unwrap(), 0);
        log.append(&LogRecord::Delete { key: key(1) }).unwrap();
        log.append(&put(2)).unwrap();
        drop(log);

        let replay = IndexLog::replay(&path).unwrap();
        assert_eq!(replay.records, vec![put(1), LogRecord::Delete { key: key(1) }, put(2)]);
        assert_eq!(replay.skipped, 0);
    }

    #[test]
    fn torn_tail_is_discarded_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.log");
        let (mut log, _) = IndexLog::open(&path, SyncMode::OsDefault).unwrap();
        log.append(&put(1)).unwrap();
        let good_len = log.offset();
        log.append(&put(2)).unwrap();
        drop(log);

        // Chop the second entry in half.
        let full = fs::metadata(&path).unwrap().len();
        let f = OpenOptions::new().write(true).open(&path).unwrap();
        f.set_len(good_len + (full - good_len) / 2).unwrap();
        drop(f);

        let (mut log, replay) = IndexLog::open(&path, SyncMode::OsDefault).unwrap();
        assert_eq!(replay.records, vec![put(1)]);
        assert_eq!(fs::metadata(&path).unwrap().len(), good_len);

        // New appends are readable after the recovered prefix.
        log.append(&put(3)).unwrap();
        drop(log);
        assert_eq!(IndexLog::replay(&path).unwrap().records, vec![put(1), put(3)]);
    }

    #[test]
    fn crc_mismatch_skips_only_that_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.log");
        let (mut log, _) = IndexLog::open(&path, SyncMode::OsDefault).unwrap();
        log.append(&put(1)).unwrap();
        let second = log.append(&put(2)).unwrap();
        log.append(&put(3)).unwrap();
        drop(log);

        // Flip a payload byte of the second entry.
        let mut f = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        let at = second + HEADER_SIZE as u64 + 2;
        f.seek(SeekFrom::Start(at)).unwrap();
        let mut byte = [0u8; 1];
        f.read_exact(&mut byte).unwrap();
        f.seek(SeekFrom::Start(at)).unwrap();
        f.write_all(&[byte[0] ^ 0xff]).unwrap();
        drop(f);

        let replay = IndexLog::replay(&path).unwrap();
        assert_eq!(replay.records, vec![put(1), put(3)]);
        assert_eq!(replay.skipped, 1);
    }

    #[test]
    fn failed_append_leaves_no_partial_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.log");
        let (mut log, _) = IndexLog::open(&path, SyncMode::OsDefault).unwrap();
        log.append(&put(1)).unwrap();
        let committed = log.offset();

        // Half a frame reaches the file before the write fails.
        let frame = encode(&put(2)).unwrap();
        log.file.write_all(&frame[..frame.len() / 2]).unwrap();
        log.discard_partial_write();
        assert!(!log.poisoned);
        assert_eq!(fs::metadata(&path).unwrap().len(), committed);

        log.append(&put(3)).unwrap();
        log.append(&put(4)).unwrap();
        drop(log);

        let (_, replay) = IndexLog::open(&path, SyncMode::OsDefault).unwrap();
        assert_eq!(replay.records, vec![put(1), put(3), put(4)]);
        assert_eq!(replay.skipped, 0);
    }

    #[test]
    fn poisoned_log_refuses_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.log");
        let (mut log, _) = IndexLog::open(&path, SyncMode::OsDefault).unwrap();
        log.poisoned = true;
        assert!(matches!(log.append(&put(1)), Err(IndexError::Poisoned(_))));
        assert_eq!(log.offset(), 0);
    }

    #[test]
    fn rewrite_into_missing_directory_leaves_log_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.log");
        let (mut log, _) = IndexLog::open(&path, SyncMode::OsDefault).unwrap();
        log.append(&put(1)).unwrap();

        let elsewhere = dir.path().join("missing").join("index.log");
        assert!(IndexLog::rewrite(&elsewhere, [put(2)].iter(), SyncMode::OsDefault).is_err());
        log.append(&put(3)).unwrap();
        drop(log);
        assert_eq!(IndexLog::replay(&path).unwrap().records, vec![put(1), put(3)]);
    }

    #[test]
    fn rewrite_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.log");
        let (mut log, _) = IndexLog::open(&path, SyncMode::OsDefault).unwrap();
        for n in 0..5 {
            log.append(&put(n)).unwrap();
        }
        drop(log);

        let keep = [put(4)];
        let mut log = IndexLog::rewrite(&path, keep.iter(), SyncMode::OsDefault).unwrap();
        log.append(&put(9)).unwrap();
        drop(log);
        assert_eq!(IndexLog::replay(&path).unwrap().records, vec![put(4), put(9)]);
    }
}

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use lens_index::{IndexResult, MetadataIndex};
use lens_resolver::{ContentStore, ObjectResolver, ResolveError};
use lens_types::{ContentIdentifier, IndexEntry, MigrationReport, MigrationResult};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{EntryFailure, MigrateResult, MigrationError};

/// Default per-fetch timeout while re-resolving entries.
pub const DEFAULT_MIGRATION_FETCH_TIMEOUT: Duration = Duration::from_secs(300);

/// Lifecycle of a single migration run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MigrationState {
    #[default]
    Initialized,
    Running,
    Completed,
    Aborted,
}

impl MigrationState {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Per-run knobs.
#[derive(Clone, Debug)]
pub struct MigrationOptions {
    /// Record failed entries and keep going instead of aborting the run.
    pub continue_on_entry_error: bool,
    /// Re-resolve every entry but write nothing; entries report `Skipped`.
    pub dry_run: bool,
    pub fetch_timeout: Duration,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            continue_on_entry_error: true,
            dry_run: false,
            fetch_timeout: DEFAULT_MIGRATION_FETCH_TIMEOUT,
        }
    }
}

enum Step {
    Migrated,
    Skipped,
    Failed(EntryFailure),
    Cancelled,
}

/// Copies index entries into a destination index, re-resolving each key
/// against a content store first.
///
/// Entries are processed one at a time in the order supplied. The source is
/// never written. Writes are not transactional across entries: an aborted
/// run leaves everything before the failing entry in the destination.
pub struct MigrationEngine {
    destination: Arc<dyn MetadataIndex>,
    state: MigrationState,
}

impl MigrationEngine {
    pub fn new(destination: Arc<dyn MetadataIndex>) -> Self {
        Self {
            destination,
            state: MigrationState::Initialized,
        }
    }

    pub fn state(&self) -> MigrationState {
        self.state
    }

    pub fn destination(&self) -> &Arc<dyn MetadataIndex> {
        &self.destination
    }

    /// Migrate `entries`, in order.
    pub async fn migrate(
        &mut self,
        entries: impl IntoIterator<Item = IndexEntry>,
        content_store: Arc<dyn ContentStore>,
        options: &MigrationOptions,
        cancel: &CancellationToken,
    ) -> MigrateResult<MigrationReport> {
        self.run(entries.into_iter().map(Ok), content_store, options, cancel)
            .await
    }

    /// Migrate every entry of `source` in its iteration order.
    pub async fn migrate_index(
        &mut self,
        source: &dyn MetadataIndex,
        content_store: Arc<dyn ContentStore>,
        options: &MigrationOptions,
        cancel: &CancellationToken,
    ) -> MigrateResult<MigrationReport> {
        self.run(source.iterate(), content_store, options, cancel).await
    }

    async fn run(
        &mut self,
        entries: impl Iterator<Item = IndexResult<IndexEntry>>,
        content_store: Arc<dyn ContentStore>,
        options: &MigrationOptions,
        cancel: &CancellationToken,
    ) -> MigrateResult<MigrationReport> {
        if self.state != MigrationState::Initialized {
            return Err(MigrationError::AlreadyStarted(self.state));
        }
        self.state = MigrationState::Running;
        info!(
            continue_on_entry_error = options.continue_on_entry_error,
            dry_run = options.dry_run,
            "migration started"
        );

        let resolver = ObjectResolver::new(content_store).with_timeout(options.fetch_timeout);
        let mut report = MigrationReport::default();

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    self.state = MigrationState::Aborted;
                    return Err(MigrationError::Source(e));
                }
            };
            if cancel.is_cancelled() {
                return Err(self.cancelled(&report));
            }

            let key = entry.key;
            match self.migrate_entry(&resolver, entry, options, cancel).await {
                Step::Migrated => {
                    debug!(cid = %key, "entry migrated");
                    report.record(MigrationResult::migrated(key));
                }
                Step::Skipped => {
                    debug!(cid = %key, "entry verified (dry run)");
                    report.record(MigrationResult::skipped(key));
                }
                Step::Cancelled => return Err(self.cancelled(&report)),
                Step::Failed(cause) => {
                    warn!(cid = %key, error = %cause, "entry failed to migrate");
                    if !options.continue_on_entry_error {
                        self.state = MigrationState::Aborted;
                        return Err(MigrationError::Aborted { key, cause });
                    }
                    report.record(MigrationResult::failed(key, cause.to_string()));
                }
            }
        }

        self.state = MigrationState::Completed;
        info!(
            total = report.total,
            migrated = report.migrated_count,
            failed = report.failed_count,
            skipped = report.skipped_count,
            "migration completed"
        );
        Ok(report)
    }

    async fn migrate_entry(
        &self,
        resolver: &ObjectResolver,
        entry: IndexEntry,
        options: &MigrationOptions,
        cancel: &CancellationToken,
    ) -> Step {
        match resolver.resolve(&entry.key, cancel).await {
            Ok(_) => {}
            Err(ResolveError::Cancelled(_)) => return Step::Cancelled,
            Err(e) => return Step::Failed(e.into()),
        }
        if options.dry_run {
            return Step::Skipped;
        }
        match self.destination.put(&entry.key, entry.record) {
            Ok(_) => Step::Migrated,
            Err(e) => Step::Failed(e.into()),
        }
    }

    fn cancelled(&mut self, report: &MigrationReport) -> MigrationError {
        self.state = MigrationState::Aborted;
        warn!(processed = report.total, "migration cancelled");
        MigrationError::Cancelled {
            processed: report.total,
        }
    }
}

impl fmt::Debug for MigrationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationEngine")
            .field("state", &self.state)
            .field("destination_len", &self.destination.len())
            .finish()
    }
}

/// Keys of `source` that are not present in `destination`.
pub fn missing_keys(source: &dyn MetadataIndex, destination: &dyn MetadataIndex) -> Vec<ContentIdentifier> {
    source
        .keys()
        .into_iter()
        .filter(|k| !destination.contains(k))
        .collect()
}

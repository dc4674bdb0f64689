use serde::{Deserialize, Serialize};

use crate::identifier::ContentIdentifier;

/// Outcome of migrating one index entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    Migrated,
    Skipped,
    Failed,
}

impl MigrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Migrated => "migrated",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

/// Per-entry migration record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationResult {
    pub key: ContentIdentifier,
    pub status: MigrationStatus,
    pub error_detail: Option<String>,
}

impl MigrationResult {
    pub fn migrated(key: ContentIdentifier) -> Self {
        Self {
            key,
            status: MigrationStatus::Migrated,
            error_detail: None,
        }
    }

    pub fn skipped(key: ContentIdentifier) -> Self {
        Self {
            key,
            status: MigrationStatus::Skipped,
            error_detail: None,
        }
    }

    pub fn failed(key: ContentIdentifier, detail: impl Into<String>) -> Self {
        Self {
            key,
            status: MigrationStatus::Failed,
            error_detail: Some(detail.into()),
        }
    }
}

/// Aggregate of one migration run, results in input order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    pub total: usize,
    pub migrated_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    pub results: Vec<MigrationResult>,
}

impl MigrationReport {
    /// Append a result and update the counters.
    pub fn record(&mut self, result: MigrationResult) {
        self.total += 1;
        match result.status {
            MigrationStatus::Migrated => self.migrated_count += 1,
            MigrationStatus::Skipped => self.skipped_count += 1,
            MigrationStatus::Failed => self.failed_count += 1,
        }
        self.results.push(result);
    }

    /// Keys that failed, in order, for replaying just that subset.
    pub fn failed_keys(&self) -> Vec<ContentIdentifier> {
        self.results
            .iter()
            .filter(|r| r.status == MigrationStatus::Failed)
            .map(|r| r.key)
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.failed_count == 0
    }
}

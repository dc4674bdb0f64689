use lens_index::IndexError;
use lens_resolver::ResolveError;
use lens_types::ContentIdentifier;

use crate::engine::MigrationState;

/// Why a single entry could not be migrated.
#[derive(Debug, thiserror::Error)]
pub enum EntryFailure {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Store(#[from] IndexError),
}

/// Errors that end a migration run.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// An entry failed while `continue_on_entry_error` was off.
    #[error("migration aborted at {key}: {cause}")]
    Aborted {
        key: ContentIdentifier,
        #[source]
        cause: EntryFailure,
    },

    /// The run was cancelled; entries already written stay written.
    #[error("migration cancelled after {processed} entries")]
    Cancelled { processed: usize },

    /// Reading the source index failed.
    #[error("cannot read source index: {0}")]
    Source(#[source] IndexError),

    /// An engine runs once; this one is past `Initialized`.
    #[error("migration engine cannot start from state {0}")]
    AlreadyStarted(MigrationState),
}

impl MigrationError {
    /// Identifier of the entry that stopped the run, if any.
    pub fn identifier(&self) -> Option<&ContentIdentifier> {
        match self {
            Self::Aborted { key, .. } => Some(key),
            _ => None,
        }
    }
}

pub type MigrateResult<T> = Result<T, MigrationError>;

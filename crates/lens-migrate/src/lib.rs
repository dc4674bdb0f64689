//! Migration engine for Lens.
//!
//! Moves the entries of one index generation into another, re-resolving each
//! key against a content store first and recording a per-entry outcome in a
//! [`MigrationReport`](lens_types::MigrationReport).
//!
//! # Key Types
//!
//! - [`MigrationEngine`]: single-run state machine
//! - [`MigrationOptions`]: abort-vs-continue policy, dry run, fetch timeout
//! - [`MigrationError`]: errors that end a run

pub mod engine;
pub mod error;

pub use engine::{missing_keys, MigrationEngine, MigrationOptions, MigrationState, DEFAULT_MIGRATION_FETCH_TIMEOUT};
pub use error::{EntryFailure, MigrateResult, MigrationError};

//! Configuration for a Lens deployment.
//!
//! Loaded from a TOML file; every field is optional and falls back to its
//! default. Command-line flags override file values at the call site.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lens_extract::ExtractConfig;
use lens_migrate::MigrationOptions;
use serde::{Deserialize, Serialize};

use crate::error::{LensError, LensResult};

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LensConfig {
    /// Metadata index directory
    #[serde(default = "default_datastore_path")]
    pub datastore_path: PathBuf,

    /// Block store directory
    #[serde(default = "default_blocks_path")]
    pub blocks_path: PathBuf,

    /// Per-fetch timeout for extraction (seconds)
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Per-fetch timeout while migrating (seconds)
    #[serde(default = "default_migration_fetch_timeout_secs")]
    pub migration_fetch_timeout_secs: u64,

    /// Image classifier deadline (seconds)
    #[serde(default = "default_model_timeout_secs")]
    pub model_timeout_secs: u64,

    /// Maximum link hops when traversing or assembling a graph
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Concurrent extractions in a batch
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Concurrent image classifier calls
    #[serde(default = "default_image_concurrency")]
    pub image_concurrency: usize,

    /// Document excerpt budget (bytes)
    #[serde(default = "default_excerpt_bytes")]
    pub excerpt_bytes: usize,

    /// Ceiling on reassembled file content (bytes)
    #[serde(default = "default_max_assembled_bytes")]
    pub max_assembled_bytes: u64,

    /// Migration records failed entries and keeps going
    #[serde(default = "default_continue_on_entry_error")]
    pub continue_on_entry_error: bool,
}

fn default_datastore_path() -> PathBuf {
    PathBuf::from("lens-data/index")
}

fn default_blocks_path() -> PathBuf {
    PathBuf::from("lens-data/blocks")
}

fn default_fetch_timeout_secs() -> u64 {
    60
}

fn default_migration_fetch_timeout_secs() -> u64 {
    300
}

fn default_model_timeout_secs() -> u64 {
    30
}

fn default_max_depth() -> usize {
    lens_resolver::DEFAULT_MAX_DEPTH
}

fn default_max_concurrency() -> usize {
    8
}

fn default_image_concurrency() -> usize {
    lens_extract::DEFAULT_IMAGE_CONCURRENCY
}

fn default_excerpt_bytes() -> usize {
    lens_extract::DEFAULT_EXCERPT_BYTES
}

fn default_max_assembled_bytes() -> u64 {
    64 * 1024 * 1024
}

fn default_continue_on_entry_error() -> bool {
    true
}

impl Default for LensConfig {
    fn default() -> Self {
        Self {
            datastore_path: default_datastore_path(),
            blocks_path: default_blocks_path(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            migration_fetch_timeout_secs: default_migration_fetch_timeout_secs(),
            model_timeout_secs: default_model_timeout_secs(),
            max_depth: default_max_depth(),
            max_concurrency: default_max_concurrency(),
            image_concurrency: default_image_concurrency(),
            excerpt_bytes: default_excerpt_bytes(),
            max_assembled_bytes: default_max_assembled_bytes(),
            continue_on_entry_error: default_continue_on_entry_error(),
        }
    }
}

impl LensConfig {
    /// Load from `path`, or return the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> LensResult<Self> {
        match path {
            None => Ok(Self::default()),
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|e| LensError::Config {
                    path: path.to_path_buf(),
                    detail: e.to_string(),
                })?;
                Self::from_toml(&text).map_err(|e| match e {
                    LensError::Config { detail, .. } => LensError::Config {
                        path: path.to_path_buf(),
                        detail,
                    },
                    other => other,
                })
            }
        }
    }

    pub fn from_toml(text: &str) -> LensResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| LensError::Config {
            path: PathBuf::new(),
            detail: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> LensResult<String> {
        toml::to_string_pretty(self).map_err(|e| LensError::Config {
            path: PathBuf::new(),
            detail: e.to_string(),
        })
    }

    fn validate(&self) -> LensResult<()> {
        let invalid = |detail: &str| LensError::Config {
            path: PathBuf::new(),
            detail: detail.to_string(),
        };
        if self.max_concurrency == 0 {
            return Err(invalid("max_concurrency must be at least 1"));
        }
        if self.image_concurrency == 0 {
            return Err(invalid("image_concurrency must be at least 1"));
        }
        if self.fetch_timeout_secs == 0 || self.migration_fetch_timeout_secs == 0 {
            return Err(invalid("fetch timeouts must be positive"));
        }
        if self.model_timeout_secs == 0 {
            return Err(invalid("model_timeout_secs must be positive"));
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn extract_config(&self) -> ExtractConfig {
        ExtractConfig {
            image_concurrency: self.image_concurrency,
            model_timeout: Duration::from_secs(self.model_timeout_secs),
            excerpt_bytes: self.excerpt_bytes,
        }
    }

    /// Migration options from this configuration; `dry_run` is off.
    pub fn migration_options(&self) -> MigrationOptions {
        MigrationOptions {
            continue_on_entry_error: self.continue_on_entry_error,
            dry_run: false,
            fetch_timeout: Duration::from_secs(self.migration_fetch_timeout_secs),
        }
    }
}

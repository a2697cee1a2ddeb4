//! TOML configuration for chainlog components.
//!
//! Every section and field has a default, so an empty document is a valid
//! configuration:
//!
//! ```toml
//! [store]
//! backend = "file"          # or "memory"
//! path = "audit/chain.jsonl"
//! chain_id = "tenant-a"
//! sync_on_commit = true
//!
//! [admission]
//! max_attempts = 8
//! initial_backoff_ms = 2
//! max_backoff_ms = 100
//!
//! [query]
//! default_limit = 100
//! max_limit = 1000
//! ```

use std::{path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use chainlog_contracts::error::{ChainlogError, ChainlogResult};

/// Which row backend a chain is persisted to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreBackend {
    Memory,
    #[default]
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// JSON-lines file for the `file` backend.
    pub path: PathBuf,
    pub chain_id: String,
    /// `fsync` after every appended row.
    pub sync_on_commit: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::File,
            path: PathBuf::from("chainlog.jsonl"),
            chain_id: "default".to_string(),
            sync_on_commit: true,
        }
    }
}

/// Bounded exponential backoff for compare-and-swap retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total commit attempts, including the first.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_backoff_ms: 2,
            max_backoff_ms: 100,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    ///
    /// Doubles from `initial_backoff_ms` and saturates at `max_backoff_ms`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(32);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Page size when a query does not set one.
    pub default_limit: usize,
    /// Upper clamp on any requested page size.
    pub max_limit: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: 100,
            max_limit: 1000,
        }
    }
}

/// The top-level structure deserialized from a chainlog TOML file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainlogConfig {
    pub store: StoreConfig,
    pub admission: RetryPolicy,
    pub query: QueryConfig,
}

impl ChainlogConfig {
    /// Parse `s` as TOML and validate it.
    ///
    /// Returns `ChainlogError::Config` if the TOML is malformed, does not
    /// match the schema, or holds inconsistent values.
    pub fn from_toml_str(s: &str) -> ChainlogResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| ChainlogError::Config {
            reason: format!("failed to parse chainlog TOML: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read the file at `path` and parse it as chainlog configuration.
    pub fn from_file(path: &Path) -> ChainlogResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ChainlogError::Config {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> ChainlogResult<()> {
        let fail = |reason: &str| {
            Err(ChainlogError::Config {
                reason: reason.to_string(),
            })
        };

        if self.store.chain_id.trim().is_empty() {
            return fail("store.chain_id must not be empty");
        }
        if self.store.backend == StoreBackend::File && self.store.path.as_os_str().is_empty() {
            return fail("store.path is required for the file backend");
        }
        if self.admission.max_attempts == 0 {
            return fail("admission.max_attempts must be at least 1");
        }
        if self.admission.initial_backoff_ms > self.admission.max_backoff_ms {
            return fail("admission.initial_backoff_ms must not exceed max_backoff_ms");
        }
        if self.query.default_limit == 0 || self.query.max_limit == 0 {
            return fail("query limits must be at least 1");
        }
        if self.query.default_limit > self.query.max_limit {
            return fail("query.default_limit must not exceed query.max_limit");
        }
        Ok(())
    }
}

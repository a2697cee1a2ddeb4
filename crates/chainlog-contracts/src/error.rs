//! Error types shared by every chainlog crate.
//!
//! All fallible operations return `ChainlogResult<T>`. `IntegrityViolation`
//! is deliberately kept apart from the operational variants so callers can
//! route it to a separate response path.

use thiserror::Error;

use crate::verify::MismatchKind;

/// The unified error type for chainlog.
#[derive(Debug, Error)]
pub enum ChainlogError {
    /// A draft field is missing or malformed. Raised before hashing.
    #[error("validation error: {reason}")]
    Validation { reason: String },

    /// Every compare-and-swap attempt lost to a concurrent writer.
    ///
    /// Nothing was committed; the caller may retry the whole admission.
    #[error("write contention: head kept moving after {attempts} commit attempts")]
    WriteContention { attempts: u32 },

    /// The row log is unavailable, timed out or refused a write.
    ///
    /// No partial commit happened.
    #[error("storage error: {reason}")]
    Storage { reason: String },

    /// A stored row at `position` could not be decoded.
    #[error("corrupt record at position {position}: {reason}")]
    CorruptRecord { position: u64, reason: String },

    /// Verification found a broken link. Never repaired automatically.
    #[error("integrity violation at position {position} ({kind}): {reason}")]
    IntegrityViolation {
        position: u64,
        kind: MismatchKind,
        reason: String,
    },

    /// An id or hash boundary does not exist in the chain.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// A configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    Config { reason: String },
}

impl ChainlogError {
    pub fn storage(reason: impl Into<String>) -> Self {
        Self::Storage { reason: reason.into() }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation { reason: reason.into() }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// True for tamper evidence, false for every operational failure.
    pub fn is_integrity_violation(&self) -> bool {
        matches!(self, Self::IntegrityViolation { .. })
    }

    /// True for failures where retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::WriteContention { .. } | Self::Storage { .. })
    }
}

/// Convenience alias used throughout the chainlog crates.
pub type ChainlogResult<T> = Result<T, ChainlogError>;

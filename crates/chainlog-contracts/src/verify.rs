//! Integrity verification ranges, results and attestations.
//!
//! A `VerificationResult` always says how much of the scanned range is
//! provably intact, even when it also carries a failure.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ChainlogError, ChainlogResult},
    event::{AuditEvent, ChainId, EventId},
};

/// Which part of a chain to verify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationRange {
    /// From genesis to the live head.
    Full,

    /// A committed sub-sequence: starts at the event whose `previous_hash`
    /// is `start_previous_hash` and ends at the event whose `event_hash` is
    /// `end_hash`, both inclusive.
    Between {
        start_previous_hash: String,
        end_hash: String,
    },
}

impl VerificationRange {
    pub fn between(start_previous_hash: impl Into<String>, end_hash: impl Into<String>) -> Self {
        Self::Between {
            start_previous_hash: start_previous_hash.into(),
            end_hash: end_hash.into(),
        }
    }

    /// The hash the first scanned event must link to.
    pub fn start_hash(&self) -> &str {
        match self {
            Self::Full => AuditEvent::GENESIS_HASH,
            Self::Between { start_previous_hash, .. } => start_previous_hash,
        }
    }
}

/// Why a link in the chain failed to verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchKind {
    /// The event does not point at its predecessor's hash.
    PreviousHashMismatch,
    /// The stored `event_hash` does not match the recomputed one.
    HashMismatch,
    /// An event expected at this position is absent or unreadable.
    MissingEvent,
}

impl MismatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreviousHashMismatch => "previous_hash_mismatch",
            Self::HashMismatch => "hash_mismatch",
            Self::MissingEvent => "missing_event",
        }
    }
}

impl fmt::Display for MismatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The first broken link found by a verification pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityFailure {
    /// Commit position of the offending event.
    pub position: u64,
    /// The offending event's id, when its row could be read.
    pub event_id: Option<EventId>,
    pub kind: MismatchKind,
    /// The hash the verifier expected to see.
    pub expected: String,
    /// The hash (or a description of the gap) actually found.
    pub found: String,
}

/// Outcome of verifying one range of one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub chain_id: ChainId,
    /// Position of the first event in the range.
    pub start_position: u64,
    /// Length of the longest verified prefix of the range.
    pub verified_count: u64,
    /// `event_hash` of the last verified event, or the range's start hash
    /// when nothing verified.
    pub tail_hash: String,
    /// `None` on a clean pass.
    pub failure: Option<IntegrityFailure>,
}

impl VerificationResult {
    pub fn is_intact(&self) -> bool {
        self.failure.is_none()
    }

    /// Turn a failed pass into `ChainlogError::IntegrityViolation`.
    pub fn into_result(self) -> ChainlogResult<Self> {
        match &self.failure {
            None => Ok(self),
            Some(failure) => Err(ChainlogError::IntegrityViolation {
                position: failure.position,
                kind: failure.kind,
                reason: format!(
                    "chain '{}': expected {}, found {} ({} events verified before the break)",
                    self.chain_id, failure.expected, failure.found, self.verified_count
                ),
            }),
        }
    }
}

/// A compact commitment to a verified range, consumed by export jobs.
///
/// Only produced for ranges that verified cleanly. Signing it is the
/// exporter's business.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainAttestation {
    pub chain_id: ChainId,
    pub start_previous_hash: String,
    pub start_position: u64,
    pub event_count: u64,
    pub terminal_hash: String,
    pub verified_at: DateTime<Utc>,
}

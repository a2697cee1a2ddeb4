//! Hash-chain integrity verifier.
//!
//! `IntegrityVerifier` walks a range of a chain once, in commit order, and
//! checks every link:
//!
//! 1. **Linkage**: the event's `previous_hash` equals the `event_hash` of
//!    the event before it (or the range's start hash).
//! 2. **Content**: the stored `event_hash` equals the hash recomputed from
//!    the stored fields.
//! 3. **Continuity**: positions are contiguous, every row decodes, and the
//!    walk ends exactly at the expected terminal hash.
//!
//! The first failure stops the walk. The result still reports how many
//! events before it verified. The verifier holds one expected hash and one
//! row at a time, never writes, and never takes the commit lock.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info};

use chainlog_contracts::{
    error::{ChainlogError, ChainlogResult},
    event::AuditEvent,
    verify::{
        ChainAttestation, IntegrityFailure, MismatchKind, VerificationRange, VerificationResult,
    },
};
use chainlog_core::{
    chain::{check_link, compute_event_hash},
    traits::ChainStore,
};

/// Resolved scan bounds for one verification pass.
struct Bounds {
    /// First position to check.
    start: u64,
    /// One past the last position to check.
    end: u64,
    /// The hash the last checked event must carry.
    terminal_hash: String,
    /// Failure kind when the walk ends on a different hash.
    terminal_kind: MismatchKind,
}

/// Read-only integrity checker for one chain.
pub struct IntegrityVerifier {
    store: Arc<dyn ChainStore>,
}

impl IntegrityVerifier {
    pub fn new(store: Arc<dyn ChainStore>) -> Self {
        Self { store }
    }

    /// Verify `range` and report the first broken link, if any.
    ///
    /// A broken link is returned inside `VerificationResult::failure`, not
    /// as an `Err`; use `VerificationResult::into_result` to turn it into
    /// `ChainlogError::IntegrityViolation`. `Err` is reserved for unknown
    /// range boundaries (`NotFound`) and for the row log being unreadable
    /// as a whole (`Storage`).
    pub fn verify(&self, range: &VerificationRange) -> ChainlogResult<VerificationResult> {
        let chain_id = self.store.chain_id().clone();
        let bounds = self.resolve(range)?;

        debug!(
            chain_id = %chain_id,
            start = bounds.start,
            end = bounds.end,
            "verifying chain range"
        );

        let mut expected = range.start_hash().to_string();
        let mut next_position = bounds.start;
        let mut failure: Option<IntegrityFailure> = None;

        for item in self.store.scan(bounds.start, bounds.end) {
            let committed = match item {
                Ok(committed) => committed,
                Err(ChainlogError::CorruptRecord { position, reason }) => {
                    failure = Some(IntegrityFailure {
                        position,
                        event_id: None,
                        kind: MismatchKind::MissingEvent,
                        expected: expected.clone(),
                        found: format!("unreadable row: {}", reason),
                    });
                    break;
                }
                Err(e) => return Err(e),
            };

            if committed.position != next_position {
                failure = Some(IntegrityFailure {
                    position: next_position,
                    event_id: None,
                    kind: MismatchKind::MissingEvent,
                    expected: expected.clone(),
                    found: format!("next row is at position {}", committed.position),
                });
                break;
            }

            let event = &committed.event;
            if let Some(kind) = check_link(event, &expected) {
                let (want, got) = match kind {
                    MismatchKind::PreviousHashMismatch => {
                        (expected.clone(), event.previous_hash.clone())
                    }
                    _ => (compute_event_hash(event), event.event_hash.clone()),
                };
                failure = Some(IntegrityFailure {
                    position: committed.position,
                    event_id: Some(event.id),
                    kind,
                    expected: want,
                    found: got,
                });
                break;
            }

            expected = committed.event.event_hash;
            next_position += 1;
        }

        if failure.is_none() {
            if next_position < bounds.end {
                failure = Some(IntegrityFailure {
                    position: next_position,
                    event_id: None,
                    kind: MismatchKind::MissingEvent,
                    expected: expected.clone(),
                    found: "row log ended early".to_string(),
                });
            } else if expected != bounds.terminal_hash {
                failure = Some(IntegrityFailure {
                    position: match bounds.terminal_kind {
                        MismatchKind::MissingEvent => next_position,
                        _ => next_position.saturating_sub(1),
                    },
                    event_id: None,
                    kind: bounds.terminal_kind,
                    expected: bounds.terminal_hash.clone(),
                    found: expected.clone(),
                });
            }
        }

        let result = VerificationResult {
            chain_id,
            start_position: bounds.start,
            verified_count: next_position - bounds.start,
            tail_hash: expected,
            failure,
        };

        match &result.failure {
            None => info!(
                chain_id = %result.chain_id,
                start = result.start_position,
                verified = result.verified_count,
                tail = %result.tail_hash,
                "chain range verified"
            ),
            Some(f) => error!(
                chain_id = %result.chain_id,
                position = f.position,
                kind = %f.kind,
                expected = %f.expected,
                found = %f.found,
                verified = result.verified_count,
                "chain integrity violation"
            ),
        }

        Ok(result)
    }

    /// Verify `range` and commit to it.
    ///
    /// Fails with `IntegrityViolation` when the range does not verify.
    pub fn attest(&self, range: &VerificationRange) -> ChainlogResult<ChainAttestation> {
        let result = self.verify(range)?.into_result()?;
        Ok(ChainAttestation {
            chain_id: result.chain_id,
            start_previous_hash: range.start_hash().to_string(),
            start_position: result.start_position,
            event_count: result.verified_count,
            terminal_hash: result.tail_hash,
            verified_at: Utc::now(),
        })
    }

    // ── Internal helpers ──────────────────────────────────────────────────────

    fn resolve(&self, range: &VerificationRange) -> ChainlogResult<Bounds> {
        match range {
            VerificationRange::Full => {
                // Head and row count come from one snapshot, so events
                // committed during the walk are simply out of range.
                let head = self.store.head_state()?;
                Ok(Bounds {
                    start: 0,
                    end: head.len,
                    terminal_hash: head.hash,
                    terminal_kind: MismatchKind::MissingEvent,
                })
            }
            VerificationRange::Between {
                start_previous_hash,
                end_hash,
            } => {
                let start = self.position_after(start_previous_hash)?;
                let end = self.position_after(end_hash)?;
                if end < start {
                    return Err(ChainlogError::validation(format!(
                        "range end {} precedes range start {}",
                        end_hash, start_previous_hash
                    )));
                }
                Ok(Bounds {
                    start,
                    end,
                    terminal_hash: end_hash.clone(),
                    terminal_kind: MismatchKind::HashMismatch,
                })
            }
        }
    }

    /// Position just after the event carrying `hash`; 0 for genesis.
    fn position_after(&self, hash: &str) -> ChainlogResult<u64> {
        if hash == AuditEvent::GENESIS_HASH {
            return Ok(0);
        }
        self.store
            .position_of_hash(hash)?
            .map(|p| p + 1)
            .ok_or_else(|| {
                ChainlogError::not_found(format!(
                    "event with hash {} in chain '{}'",
                    hash,
                    self.store.chain_id()
                ))
            })
    }
}

//! The chain state keeper: the single serialization point of a chain.
//!
//! `ChainStateKeeper` owns the head of one chain in a versioned cell and
//! persists rows through an `EventLog`. `commit()` is a compare-and-swap:
//! inside one critical section it checks the expected head, appends the row
//! and only then advances the head. A failed append leaves the head where
//! it was, and the head never names a row that is not in the log.
//!
//! Row reads go straight to the log. `len` reads the head version, so a
//! reader never sees a row the head does not cover yet.

use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info, warn};

use chainlog_contracts::{
    error::{ChainlogError, ChainlogResult},
    event::{AuditEvent, ChainId, CommittedEvent, EventId},
};
use chainlog_core::{
    chain::{is_well_formed_hash, verify_event_hash},
    traits::{ChainStore, CommitOutcome, EventLog, EventStream, HeadState},
};

// ── Internal mutable state ────────────────────────────────────────────────────

/// The versioned head cell.
///
/// `version` counts committed rows, so it is also the position the next
/// commit must land on.
#[derive(Debug)]
struct HeadCell {
    hash: String,
    version: u64,
    /// Set when the last row could not be read on open. Commits are refused.
    damaged: Option<String>,
}

// ── Public keeper ─────────────────────────────────────────────────────────────

/// Compare-and-swap guardian of one chain's head over an append-only log.
///
/// # Thread safety
///
/// Any number of threads may call `commit()` concurrently through a shared
/// reference; the head mutex linearizes them. Row readers (`scan`, `get`)
/// only touch the log.
pub struct ChainStateKeeper<L: EventLog> {
    chain_id: ChainId,
    log: L,
    head: Mutex<HeadCell>,
}

impl<L: EventLog> ChainStateKeeper<L> {
    /// Open a keeper over an existing (possibly empty) log.
    ///
    /// The head is recovered from the most recently committed row, or set to
    /// `AuditEvent::GENESIS_HASH` when the log is empty.
    ///
    /// When the last row cannot be decoded the keeper still opens, so the
    /// damage can be verified and reported. The head then names the last
    /// readable row, the length still counts the damaged rows, and every
    /// commit fails with `Storage`.
    pub fn open(chain_id: ChainId, log: L) -> ChainlogResult<Self> {
        let len = log.len()?;
        let (hash, damaged) = match len.checked_sub(1) {
            None => (AuditEvent::GENESIS_HASH.to_string(), None),
            Some(last) => match log.read(last) {
                Ok(Some(event)) => (event.event_hash, None),
                Ok(None) => {
                    return Err(ChainlogError::storage(format!(
                        "log reports {} rows but row {} is missing",
                        len, last
                    )))
                }
                Err(ChainlogError::CorruptRecord { position, reason }) => {
                    warn!(
                        chain_id = %chain_id,
                        position,
                        reason = %reason,
                        "last row unreadable; chain opened without a trusted head"
                    );
                    let damage = format!("row {} is unreadable: {}", position, reason);
                    (last_readable_hash(&log, position)?, Some(damage))
                }
                Err(e) => return Err(e),
            },
        };

        info!(
            chain_id = %chain_id,
            events = len,
            head = %hash,
            damaged = damaged.is_some(),
            "chain keeper opened"
        );

        Ok(Self {
            chain_id,
            log,
            head: Mutex::new(HeadCell {
                hash,
                version: len,
                damaged,
            }),
        })
    }

    /// The underlying row log.
    pub fn log(&self) -> &L {
        &self.log
    }

    fn lock_head(&self) -> ChainlogResult<MutexGuard<'_, HeadCell>> {
        self.head
            .lock()
            .map_err(|e| ChainlogError::storage(format!("chain head lock poisoned: {}", e)))
    }
}

impl<L: EventLog> ChainStore for ChainStateKeeper<L> {
    fn chain_id(&self) -> &ChainId {
        &self.chain_id
    }

    fn head_state(&self) -> ChainlogResult<HeadState> {
        let head = self.lock_head()?;
        Ok(HeadState {
            hash: head.hash.clone(),
            len: head.version,
        })
    }

    /// Append `candidate` if the live head still equals
    /// `expected_previous_head`.
    ///
    /// Structural checks on the candidate run before the head lock is taken
    /// so a malformed event never holds up other writers.
    fn commit(
        &self,
        candidate: AuditEvent,
        expected_previous_head: &str,
    ) -> ChainlogResult<CommitOutcome> {
        if candidate.previous_hash != expected_previous_head {
            return Err(ChainlogError::validation(format!(
                "candidate {} links to {} but expected head is {}",
                candidate.id, candidate.previous_hash, expected_previous_head
            )));
        }
        if !is_well_formed_hash(&candidate.event_hash) || !verify_event_hash(&candidate) {
            return Err(ChainlogError::validation(format!(
                "candidate {} carries an event_hash that does not match its fields",
                candidate.id
            )));
        }

        let mut head = self.lock_head()?;

        if let Some(damage) = &head.damaged {
            return Err(ChainlogError::storage(format!(
                "chain '{}' refuses commits: {}",
                self.chain_id, damage
            )));
        }

        if head.hash != expected_previous_head {
            debug!(
                chain_id = %self.chain_id,
                event_id = %candidate.id,
                expected = %expected_previous_head,
                live = %head.hash,
                "commit conflict"
            );
            return Ok(CommitOutcome::Conflict {
                live_head: head.hash.clone(),
            });
        }

        if self.log.position_of_id(&candidate.id)?.is_some() {
            return Err(ChainlogError::validation(format!(
                "event id {} already exists in chain '{}'",
                candidate.id, self.chain_id
            )));
        }

        let rows = self.log.len()?;
        if rows != head.version {
            return Err(ChainlogError::storage(format!(
                "row log holds {} rows but head covers {}; refusing to commit",
                rows, head.version
            )));
        }

        // The row must be durable before the head may point at it.
        let position = self.log.append(&candidate)?;

        head.hash = candidate.event_hash.clone();
        head.version = position + 1;

        debug!(
            chain_id = %self.chain_id,
            event_id = %candidate.id,
            position,
            head = %head.hash,
            "commit succeeded"
        );

        Ok(CommitOutcome::Committed(CommittedEvent {
            position,
            event: candidate,
        }))
    }

    fn len(&self) -> ChainlogResult<u64> {
        Ok(self.lock_head()?.version)
    }

    fn scan(&self, from: u64, to: u64) -> EventStream<'_> {
        self.log.scan(from, to)
    }

    fn get(&self, id: &EventId) -> ChainlogResult<Option<CommittedEvent>> {
        let Some(position) = self.log.position_of_id(id)? else {
            return Ok(None);
        };
        Ok(self
            .log
            .read(position)?
            .map(|event| CommittedEvent { position, event }))
    }

    fn position_of_hash(&self, hash: &str) -> ChainlogResult<Option<u64>> {
        self.log.position_of_hash(hash)
    }
}

/// `event_hash` of the last decodable row before `before`, or genesis.
fn last_readable_hash<L: EventLog>(log: &L, before: u64) -> ChainlogResult<String> {
    for position in (0..before).rev() {
        match log.read(position) {
            Ok(Some(event)) => return Ok(event.event_hash),
            Ok(None) | Err(ChainlogError::CorruptRecord { .. }) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(AuditEvent::GENESIS_HASH.to_string())
}

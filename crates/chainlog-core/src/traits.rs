//! Core trait definitions for the chainlog pipeline.
//!
//! Two seams define the storage trust boundary:
//!
//! - `ChainStore`: the chain handle every component is given explicitly.
//!   It owns the head and the compare-and-swap commit, and reads rows in
//!   commit order.
//! - `EventLog`: the append-only row backend a chain keeper persists to.
//!
//! The admission gateway, integrity verifier and query engine only ever see
//! `ChainStore`. Nothing reaches the head except through `commit()`.

use chainlog_contracts::{
    error::ChainlogResult,
    event::{AuditEvent, ChainId, CommittedEvent, EventId},
};

/// A lazily evaluated stream of committed events in commit order.
///
/// Dropping the stream early is always safe: reads never write.
pub type EventStream<'a> = Box<dyn Iterator<Item = ChainlogResult<CommittedEvent>> + Send + 'a>;

/// The result of a compare-and-swap commit attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// The candidate is durable and the head now equals its `event_hash`.
    Committed(CommittedEvent),

    /// The head moved since the caller read it. Nothing was written.
    Conflict {
        /// The head at the time of the failed attempt.
        live_head: String,
    },
}

/// The head together with the number of events it covers, read atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadState {
    /// `event_hash` of the last committed event, or the genesis sentinel.
    pub hash: String,
    /// Number of committed events; also the next commit position.
    pub len: u64,
}

/// One chain: its head, its compare-and-swap admission primitive, and
/// read-only access to its committed rows.
///
/// Implementations must guarantee that a row becomes visible to readers
/// only together with the matching head advance, and that a failed write
/// leaves both untouched.
pub trait ChainStore: Send + Sync {
    /// The chain this store holds.
    fn chain_id(&self) -> &ChainId;

    /// The head and the commit count it corresponds to, as one snapshot.
    fn head_state(&self) -> ChainlogResult<HeadState>;

    /// The `event_hash` of the last committed event, or
    /// `AuditEvent::GENESIS_HASH` for an empty chain.
    fn current_head(&self) -> ChainlogResult<String> {
        Ok(self.head_state()?.hash)
    }

    /// Append `candidate` if and only if the live head still equals
    /// `expected_previous_head`.
    ///
    /// Returns `CommitOutcome::Conflict` when another writer got there
    /// first. Returns `Err(Validation)` for a candidate that does not link
    /// to `expected_previous_head`, whose hash does not recompute, or whose
    /// id already exists; `Err(Storage)` when the row could not be made
    /// durable.
    fn commit(
        &self,
        candidate: AuditEvent,
        expected_previous_head: &str,
    ) -> ChainlogResult<CommitOutcome>;

    /// Number of committed events. Used as a snapshot bound by readers.
    fn len(&self) -> ChainlogResult<u64>;

    fn is_empty(&self) -> ChainlogResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Stream committed events with positions in `[from, to)`.
    fn scan(&self, from: u64, to: u64) -> EventStream<'_>;

    /// Fetch a committed event by id.
    fn get(&self, id: &EventId) -> ChainlogResult<Option<CommittedEvent>>;

    /// Position of the committed event whose `event_hash` is `hash`.
    fn position_of_hash(&self, hash: &str) -> ChainlogResult<Option<u64>>;
}

/// Append-only row storage behind a chain keeper.
///
/// Implementations need not be safe against concurrent `append` calls; the
/// keeper serializes them. Reads may run concurrently with an append and
/// must never observe a partially written row.
pub trait EventLog: Send + Sync {
    /// Number of rows.
    fn len(&self) -> ChainlogResult<u64>;

    fn is_empty(&self) -> ChainlogResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Durably append one row and return its position.
    ///
    /// On `Err` the log must be exactly as it was before the call.
    fn append(&self, event: &AuditEvent) -> ChainlogResult<u64>;

    /// Read the row at `position`, `None` past the end.
    fn read(&self, position: u64) -> ChainlogResult<Option<AuditEvent>>;

    /// Stream rows with positions in `[from, to)`, clamped to the log length.
    fn scan(&self, from: u64, to: u64) -> EventStream<'_>;

    fn position_of_id(&self, id: &EventId) -> ChainlogResult<Option<u64>>;

    fn position_of_hash(&self, hash: &str) -> ChainlogResult<Option<u64>>;
}

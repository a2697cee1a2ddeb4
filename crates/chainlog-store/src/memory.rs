//! In-memory implementation of `EventLog`.
//!
//! `MemoryEventLog` keeps rows in a `Vec` behind an `RwLock`, plus id and
//! hash indexes. It is the reference backend for tests and for short-lived
//! chains that do not need to survive a restart.

use std::{
    collections::HashMap,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use chainlog_contracts::{
    error::{ChainlogError, ChainlogResult},
    event::{AuditEvent, CommittedEvent, EventId},
};
use chainlog_core::traits::{EventLog, EventStream};

// ── Internal mutable state ────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryRows {
    /// All rows in commit order.
    events: Vec<AuditEvent>,
    by_id: HashMap<EventId, u64>,
    by_hash: HashMap<String, u64>,
}

// ── Public log ────────────────────────────────────────────────────────────────

/// An append-only row log held entirely in memory.
#[derive(Default)]
pub struct MemoryEventLog {
    rows: RwLock<MemoryRows>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_rows(&self) -> ChainlogResult<RwLockReadGuard<'_, MemoryRows>> {
        self.rows
            .read()
            .map_err(|e| ChainlogError::storage(format!("memory log lock poisoned: {}", e)))
    }

    fn write_rows(&self) -> ChainlogResult<RwLockWriteGuard<'_, MemoryRows>> {
        self.rows
            .write()
            .map_err(|e| ChainlogError::storage(format!("memory log lock poisoned: {}", e)))
    }
}

impl EventLog for MemoryEventLog {
    fn len(&self) -> ChainlogResult<u64> {
        Ok(self.read_rows()?.events.len() as u64)
    }

    fn append(&self, event: &AuditEvent) -> ChainlogResult<u64> {
        let mut rows = self.write_rows()?;
        let position = rows.events.len() as u64;
        rows.by_id.insert(event.id, position);
        rows.by_hash.insert(event.event_hash.clone(), position);
        rows.events.push(event.clone());
        Ok(position)
    }

    fn read(&self, position: u64) -> ChainlogResult<Option<AuditEvent>> {
        Ok(self.read_rows()?.events.get(position as usize).cloned())
    }

    /// Rows are cloned out one at a time, so the read lock is only held for
    /// a single row and appends interleave freely with a long scan.
    fn scan(&self, from: u64, to: u64) -> EventStream<'_> {
        let end = match self.len() {
            Ok(len) => to.min(len),
            Err(e) => return Box::new(std::iter::once(Err(e))),
        };
        Box::new((from..end).map(move |position| match self.read(position) {
            Ok(Some(event)) => Ok(CommittedEvent { position, event }),
            Ok(None) => Err(ChainlogError::CorruptRecord {
                position,
                reason: "row missing from memory log".to_string(),
            }),
            Err(e) => Err(e),
        }))
    }

    fn position_of_id(&self, id: &EventId) -> ChainlogResult<Option<u64>> {
        Ok(self.read_rows()?.by_id.get(id).copied())
    }

    fn position_of_hash(&self, hash: &str) -> ChainlogResult<Option<u64>> {
        Ok(self.read_rows()?.by_hash.get(hash).copied())
    }
}

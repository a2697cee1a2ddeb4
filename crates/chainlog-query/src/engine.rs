//! Read-only query engine over one chain.
//!
//! `QueryEngine` filters committed events with an `EventQuery` and returns
//! them a page at a time, ordered by `(timestamp, id)`.
//!
//! Paging algorithm:
//!
//! 1. Pin the snapshot: the first page records the chain length; later
//!    pages read it back from the cursor and never look past it.
//! 2. Stream rows `[0, snapshot_len)` and keep only those that match the
//!    predicates and sort strictly after the cursor.
//! 3. Hold the best `limit + 1` candidates in a bounded heap; the extra
//!    one only signals that another page exists.
//!
//! Rows committed after the first page are invisible to that paging
//! session, so no row present at its start is skipped or repeated.

use std::{collections::BinaryHeap, sync::Arc};

use tracing::debug;

use chainlog_contracts::{
    error::{ChainlogError, ChainlogResult},
    event::{CommittedEvent, EventId},
    query::{EventQuery, Page, PageCursor},
};
use chainlog_core::{chain::compute_event_hash, config::QueryConfig, traits::ChainStore};

use crate::predicate::{self, Ranked};

/// Filters, orders and pages the committed events of one chain.
pub struct QueryEngine {
    store: Arc<dyn ChainStore>,
    config: QueryConfig,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn ChainStore>, config: QueryConfig) -> Self {
        Self { store, config }
    }

    /// Return one page of events matching `query`.
    ///
    /// Fails with `Validation` for a zero limit or a cursor whose snapshot
    /// is longer than the chain, which means it came from another chain.
    pub fn query(&self, query: &EventQuery) -> ChainlogResult<Page> {
        let limit = self.effective_limit(query)?;
        let snapshot_len = self.snapshot_len(query.cursor.as_ref())?;

        let mut heap: BinaryHeap<Ranked> = BinaryHeap::with_capacity(limit + 1);
        for item in self.store.scan(0, snapshot_len) {
            let committed = item?;
            if !predicate::matches(query, &committed.event) {
                continue;
            }
            let ranked = Ranked::new(committed, query.order);
            if let Some(cursor) = &query.cursor {
                if !predicate::after_cursor(&ranked.key, cursor, query.order) {
                    continue;
                }
            }
            heap.push(ranked);
            if heap.len() > limit + 1 {
                heap.pop();
            }
        }

        let mut ranked = heap.into_sorted_vec();
        let has_more = ranked.len() > limit;
        ranked.truncate(limit);

        let next_cursor = match ranked.last() {
            Some(last) if has_more => Some(PageCursor {
                timestamp: last.key.0,
                id: last.key.1,
                snapshot_len,
            }),
            _ => None,
        };
        let events: Vec<CommittedEvent> = ranked.into_iter().map(|r| r.event).collect();

        debug!(
            chain_id = %self.store.chain_id(),
            snapshot_len,
            returned = events.len(),
            has_more,
            "query page served"
        );

        Ok(Page {
            events,
            next_cursor,
            snapshot_len,
        })
    }

    /// Count every committed event matching `query`'s predicates.
    ///
    /// Paging fields are ignored; the count covers the whole chain as of
    /// the call.
    pub fn count(&self, query: &EventQuery) -> ChainlogResult<u64> {
        let len = self.store.len()?;
        let mut count = 0u64;
        for item in self.store.scan(0, len) {
            if predicate::matches(query, &item?.event) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Fetch one committed event by id, `NotFound` if absent.
    pub fn get(&self, id: &EventId) -> ChainlogResult<CommittedEvent> {
        self.store.get(id)?.ok_or_else(|| {
            ChainlogError::not_found(format!("event {} in chain '{}'", id, self.store.chain_id()))
        })
    }

    /// Fetch an event and recompute its hash from the stored fields.
    ///
    /// Equal to the stored `event_hash` unless the row was altered.
    pub fn recompute_hash(&self, id: &EventId) -> ChainlogResult<String> {
        Ok(compute_event_hash(&self.get(id)?.event))
    }

    // ── Internal helpers ──────────────────────────────────────────────────────

    fn effective_limit(&self, query: &EventQuery) -> ChainlogResult<usize> {
        match query.limit {
            Some(0) => Err(ChainlogError::validation("query limit must be at least 1")),
            Some(limit) => Ok(limit.min(self.config.max_limit)),
            None => Ok(self.config.default_limit.min(self.config.max_limit)),
        }
    }

    fn snapshot_len(&self, cursor: Option<&PageCursor>) -> ChainlogResult<u64> {
        let len = self.store.len()?;
        match cursor {
            None => Ok(len),
            Some(cursor) if cursor.snapshot_len <= len => Ok(cursor.snapshot_len),
            Some(cursor) => Err(ChainlogError::validation(format!(
                "cursor snapshot of {} events exceeds chain '{}' length {}",
                cursor.snapshot_len,
                self.store.chain_id(),
                len
            ))),
        }
    }
}

//! Event predicates and the `(timestamp, id)` sort key.
//!
//! Every populated field of an `EventQuery` must hold for an event to
//! match. String comparisons are exact and case-sensitive.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde_json::Value;

use chainlog_contracts::{
    event::{AuditEvent, CommittedEvent, EventId},
    query::{EventQuery, PageCursor, SortOrder},
};

/// Return true if `event` satisfies every predicate in `query`.
///
/// Cursor, order and limit are paging concerns and are not checked here.
pub fn matches(query: &EventQuery, event: &AuditEvent) -> bool {
    if query.start_time.is_some_and(|start| event.timestamp < start) {
        return false;
    }
    if query.end_time.is_some_and(|end| event.timestamp > end) {
        return false;
    }
    if !query.event_types.is_empty() && !query.event_types.contains(&event.event_type) {
        return false;
    }
    if query.actor.is_some() && query.actor != event.actor {
        return false;
    }
    if query.resource_type.as_ref().is_some_and(|t| *t != event.resource_type) {
        return false;
    }
    if query.resource_id.as_ref().is_some_and(|id| *id != event.resource_id) {
        return false;
    }
    if query.outcome.is_some_and(|o| o != event.outcome) {
        return false;
    }
    if query.request_correlation_id.is_some()
        && query.request_correlation_id != event.request_correlation_id
    {
        return false;
    }
    query.details.iter().all(|m| {
        resolve_path(&event.details, &m.path).is_some_and(|found| contains(found, &m.value))
    })
}

/// Resolve a dot-notation path (e.g. `"request.scopes.0"`) against a JSON
/// value. Numeric segments index into arrays. An empty path is the value
/// itself. Returns `None` when any segment is missing.
pub fn resolve_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    if path.is_empty() {
        return Some(value);
    }
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Structural containment of `needle` in `haystack`.
///
/// - objects: every key of `needle` is present and its value is contained
/// - arrays: every element of `needle` is contained in some element
/// - a non-array needle against an array: contained in some element
/// - anything else: equality
pub fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::Object(h), Value::Object(n)) => n
            .iter()
            .all(|(key, nv)| h.get(key).is_some_and(|hv| contains(hv, nv))),
        (Value::Array(h), Value::Array(n)) => {
            n.iter().all(|nv| h.iter().any(|hv| contains(hv, nv)))
        }
        (Value::Array(h), n) => h.iter().any(|hv| contains(hv, n)),
        (h, n) => h == n,
    }
}

// ── Sort key ──────────────────────────────────────────────────────────────────

pub(crate) type SortKey = (DateTime<Utc>, EventId);

pub(crate) fn sort_key(event: &AuditEvent) -> SortKey {
    (event.timestamp, event.id)
}

/// True if `key` comes strictly after the cursor in the given order.
pub(crate) fn after_cursor(key: &SortKey, cursor: &PageCursor, order: SortOrder) -> bool {
    let cursor_key = (cursor.timestamp, cursor.id);
    match order {
        SortOrder::Ascending => *key > cursor_key,
        SortOrder::Descending => *key < cursor_key,
    }
}

/// A candidate result ranked so that the best-placed event is the smallest.
///
/// A max-heap of `Ranked` therefore surfaces the worst-placed candidate,
/// which is the one to evict when the page overflows.
pub(crate) struct Ranked {
    pub(crate) key: SortKey,
    pub(crate) order: SortOrder,
    pub(crate) event: CommittedEvent,
}

impl Ranked {
    pub(crate) fn new(event: CommittedEvent, order: SortOrder) -> Self {
        Self {
            key: sort_key(&event.event),
            order,
            event,
        }
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.order {
            SortOrder::Ascending => self.key.cmp(&other.key),
            SortOrder::Descending => other.key.cmp(&self.key),
        }
    }
}

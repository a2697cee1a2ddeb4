//! Query predicates, ordering and keyset pagination types.
//!
//! Every predicate on an `EventQuery` is optional and they combine with AND.
//! An empty query matches every committed event.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::{CommittedEvent, EventId, Outcome};

/// Result ordering over the `(timestamp, id)` key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

/// A structural match against an event's `details` payload.
///
/// The value found at `path` must contain `value`: objects contain a
/// subset of keys with contained values, arrays contain every needle
/// element, and scalars compare equal. An empty path targets the whole
/// payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailsMatch {
    /// Dot-separated key path, e.g. `"request.scopes"`.
    pub path: String,
    pub value: Value,
}

/// Opaque position marker between two pages.
///
/// Carries the last returned `(timestamp, id)` key and the chain length
/// observed when the first page ran, so later pages read the same snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    pub timestamp: DateTime<Utc>,
    pub id: EventId,
    pub snapshot_len: u64,
}

impl PageCursor {
    /// Render as `<rfc3339>|<uuid>|<snapshot_len>` for transport.
    pub fn encode(&self) -> String {
        format!(
            "{}|{}|{}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
            self.id,
            self.snapshot_len
        )
    }

    /// Parse the form produced by `encode`.
    pub fn decode(s: &str) -> Option<Self> {
        let mut parts = s.splitn(3, '|');
        let timestamp = DateTime::parse_from_rfc3339(parts.next()?).ok()?.with_timezone(&Utc);
        let id = EventId::parse(parts.next()?)?;
        let snapshot_len = parts.next()?.parse().ok()?;
        Some(Self { timestamp, id, snapshot_len })
    }
}

/// A composable, read-only filter over committed events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventQuery {
    /// Inclusive lower bound on `timestamp`.
    pub start_time: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `timestamp`.
    pub end_time: Option<DateTime<Utc>>,
    /// Membership: the event's type must be one of these. Empty means any.
    pub event_types: Vec<String>,
    pub actor: Option<String>,
    pub resource_type: Option<String>,
    /// Only meaningful together with `resource_type`.
    pub resource_id: Option<String>,
    pub outcome: Option<Outcome>,
    pub request_correlation_id: Option<String>,
    pub details: Vec<DetailsMatch>,
    pub order: SortOrder,
    /// Page size; `None` uses the engine's configured default.
    pub limit: Option<usize>,
    pub cursor: Option<PageCursor>,
}

impl EventQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_time_range(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self.end_time = Some(end);
        self
    }

    pub fn with_start_time(mut self, start: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self
    }

    pub fn with_end_time(mut self, end: DateTime<Utc>) -> Self {
        self.end_time = Some(end);
        self
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_types.push(event_type.into());
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }

    pub fn with_resource(
        mut self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn with_request_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.request_correlation_id = Some(id.into());
        self
    }

    pub fn with_details_match(mut self, path: impl Into<String>, value: Value) -> Self {
        self.details.push(DetailsMatch { path: path.into(), value });
        self
    }

    pub fn ascending(mut self) -> Self {
        self.order = SortOrder::Ascending;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_cursor(mut self, cursor: PageCursor) -> Self {
        self.cursor = Some(cursor);
        self
    }
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub events: Vec<CommittedEvent>,
    /// Present when more matching events exist beyond this page.
    pub next_cursor: Option<PageCursor>,
    /// Chain length the whole paging session is pinned to.
    pub snapshot_len: u64,
}

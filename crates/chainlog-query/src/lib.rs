//! # chainlog-query
//!
//! Filtered, paged retrieval over the committed events of a chain.
//!
//! ## Overview
//!
//! [`QueryEngine`] evaluates an
//! [`EventQuery`](chainlog_contracts::query::EventQuery) against one chain
//! and returns a [`Page`](chainlog_contracts::query::Page) ordered by
//! `(timestamp, id)`, newest first unless ascending order is requested.
//! Pages are linked by keyset cursors that also pin the chain length seen
//! by the first page.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use chainlog_contracts::{event::Outcome, query::EventQuery};
//! use chainlog_query::QueryEngine;
//!
//! let engine = QueryEngine::new(store, config.query.clone());
//! let query = EventQuery::new()
//!     .with_actor("alice")
//!     .with_outcome(Outcome::Failure)
//!     .with_details_match("request.scopes", json!(["admin"]));
//! let page = engine.query(&query)?;
//! ```
//!
//! ## Matching
//!
//! All predicates are conjunctive. `details` predicates resolve a
//! dot-separated path and test structural containment: objects match a
//! subset of keys, arrays must contain every needle, scalars are equal.

pub mod engine;
pub mod predicate;

pub use engine::QueryEngine;
pub use predicate::{contains, matches, resolve_path};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc, time::Duration};

    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;
    use tempfile::TempDir;

    use chainlog_contracts::{
        error::ChainlogError,
        event::{AdmissionReceipt, ChainId, EventDraft, EventId, Outcome},
        query::{EventQuery, Page, PageCursor},
    };
    use chainlog_core::{
        config::{QueryConfig, RetryPolicy},
        gateway::AdmissionGateway,
        producers::{self, event_types, resource_types},
        traits::ChainStore,
    };
    use chainlog_store::{ChainStateKeeper, JsonlEventLog, MemoryEventLog};

    use crate::QueryEngine;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap() + chrono::Duration::seconds(seconds)
    }

    fn setup(config: QueryConfig) -> (AdmissionGateway, QueryEngine) {
        let store: Arc<dyn ChainStore> =
            Arc::new(ChainStateKeeper::open(ChainId::new("query-test"), MemoryEventLog::new()).unwrap());
        (
            AdmissionGateway::new(store.clone(), RetryPolicy::default()),
            QueryEngine::new(store, config),
        )
    }

    /// Eight events, one second apart, covering every producer.
    fn seed(gateway: &AdmissionGateway) -> Vec<AdmissionReceipt> {
        let drafts = vec![
            producers::authentication_attempt("alice", true, Some("10.0.0.7")),
            producers::authentication_attempt("bob", false, None),
            producers::authorization_check("alice", "audit:read", "alice", true),
            producers::workflow_execution("wf-1", "carol", Outcome::PartialSuccess, Duration::from_millis(1500)),
            producers::secret_access("db-password", "alice"),
            producers::api_key_created("key-1", "bob", &["read".to_string(), "write".to_string()]),
            producers::config_change("retention", Some("30d"), "90d", "carol").with_request_correlation_id("req-42"),
            producers::api_key_revoked("key-1", "bob", "rotated"),
        ];
        drafts
            .into_iter()
            .enumerate()
            .map(|(i, d)| gateway.admit(d.with_timestamp(at(i as i64))).unwrap())
            .collect()
    }

    fn positions(page: &Page) -> Vec<u64> {
        page.events.iter().map(|c| c.position).collect()
    }

    // ── Ordering ──────────────────────────────────────────────────────────────

    #[test]
    fn test_default_order_is_newest_first() {
        let (gateway, engine) = setup(QueryConfig::default());
        seed(&gateway);

        let page = engine.query(&EventQuery::new()).unwrap();
        assert_eq!(positions(&page), vec![7, 6, 5, 4, 3, 2, 1, 0]);
        assert_eq!(page.next_cursor, None);
        assert_eq!(page.snapshot_len, 8);
    }

    #[test]
    fn test_ascending_order() {
        let (gateway, engine) = setup(QueryConfig::default());
        seed(&gateway);

        let page = engine.query(&EventQuery::new().ascending().with_limit(3)).unwrap();
        assert_eq!(positions(&page), vec![0, 1, 2]);
        assert!(page.next_cursor.is_some());
    }

    /// Events sharing a timestamp are ordered by id and page without loss.
    #[test]
    fn test_equal_timestamps_break_ties_by_id() {
        let (gateway, engine) = setup(QueryConfig::default());
        let mut ids: Vec<EventId> = (0..5)
            .map(|i| {
                let draft = producers::secret_access(&format!("s-{i}"), "alice").with_timestamp(at(0));
                gateway.admit(draft).unwrap().id
            })
            .collect();
        ids.sort();
        ids.reverse();

        let mut seen = Vec::new();
        let mut query = EventQuery::new().with_limit(2);
        loop {
            let page = engine.query(&query).unwrap();
            seen.extend(page.events.iter().map(|c| c.event.id));
            match page.next_cursor {
                Some(cursor) => query = query.with_cursor(cursor),
                None => break,
            }
        }
        assert_eq!(seen, ids);
    }

    // ── Predicates ────────────────────────────────────────────────────────────

    #[test]
    fn test_single_field_filters() {
        let (gateway, engine) = setup(QueryConfig::default());
        seed(&gateway);

        let cases: Vec<(EventQuery, Vec<u64>)> = vec![
            (
                EventQuery::new()
                    .with_event_type(event_types::AUTHENTICATION)
                    .with_event_type(event_types::API_KEY_CREATE),
                vec![5, 1, 0],
            ),
            (EventQuery::new().with_actor("alice"), vec![4, 2, 0]),
            (EventQuery::new().with_resource_type(resource_types::API_KEY), vec![7, 5]),
            (EventQuery::new().with_resource(resource_types::USER, "bob"), vec![1]),
            (EventQuery::new().with_outcome(Outcome::Failure), vec![1]),
            (EventQuery::new().with_outcome(Outcome::PartialSuccess), vec![3]),
            (EventQuery::new().with_request_correlation_id("req-42"), vec![6]),
            (EventQuery::new().with_time_range(at(2), at(4)), vec![4, 3, 2]),
            (EventQuery::new().with_start_time(at(6)), vec![7, 6]),
            (EventQuery::new().with_end_time(at(0)), vec![0]),
            (EventQuery::new().with_actor("nobody"), vec![]),
        ];

        for (query, expected) in cases {
            let page = engine.query(&query).unwrap();
            assert_eq!(positions(&page), expected, "query: {:?}", query);
            assert_eq!(engine.count(&query).unwrap(), expected.len() as u64);
        }
    }

    #[test]
    fn test_details_containment_filters() {
        let (gateway, engine) = setup(QueryConfig::default());
        seed(&gateway);

        let cases: Vec<(EventQuery, Vec<u64>)> = vec![
            (EventQuery::new().with_details_match("scopes", json!(["write"])), vec![5]),
            (EventQuery::new().with_details_match("scopes", json!(["write", "admin"])), vec![]),
            (EventQuery::new().with_details_match("permission", json!("audit:read")), vec![2]),
            (EventQuery::new().with_details_match("", json!({ "new_value": "90d" })), vec![6]),
            (EventQuery::new().with_details_match("duration_ms", json!(1500)), vec![3]),
            (EventQuery::new().with_details_match("reason.deeper", json!("rotated")), vec![]),
        ];

        for (query, expected) in cases {
            assert_eq!(positions(&engine.query(&query).unwrap()), expected, "query: {:?}", query);
        }
    }

    #[test]
    fn test_predicates_are_conjunctive() {
        let (gateway, engine) = setup(QueryConfig::default());
        seed(&gateway);

        let query = EventQuery::new().with_actor("bob").with_outcome(Outcome::Success);
        assert_eq!(positions(&engine.query(&query).unwrap()), vec![7, 5]);

        let query = query.with_details_match("reason", json!("rotated"));
        assert_eq!(positions(&engine.query(&query).unwrap()), vec![7]);
    }

    // ── Paging ────────────────────────────────────────────────────────────────

    /// Rows admitted between pages never leak into an open paging session.
    #[test]
    fn test_pages_are_pinned_to_first_snapshot() {
        let (gateway, engine) = setup(QueryConfig::default());
        let original: HashSet<EventId> = (0..25)
            .map(|i| {
                let draft = producers::secret_access(&format!("s-{i}"), "alice").with_timestamp(at(100 + i));
                gateway.admit(draft).unwrap().id
            })
            .collect();

        let first = engine.query(&EventQuery::new().with_limit(10)).unwrap();
        assert_eq!(first.events.len(), 10);
        assert_eq!(first.snapshot_len, 25);

        // Backdated rows would sort into the later pages without the snapshot.
        for i in 0..5 {
            let draft = producers::secret_access(&format!("late-{i}"), "alice").with_timestamp(at(i));
            gateway.admit(draft).unwrap();
        }

        let mut seen: Vec<EventId> = first.events.iter().map(|c| c.event.id).collect();
        let mut cursor = first.next_cursor;
        while let Some(c) = cursor {
            assert_eq!(c.snapshot_len, 25);
            let page = engine.query(&EventQuery::new().with_limit(10).with_cursor(c)).unwrap();
            seen.extend(page.events.iter().map(|e| e.event.id));
            cursor = page.next_cursor;
        }

        assert_eq!(seen.len(), 25);
        assert_eq!(seen.iter().copied().collect::<HashSet<_>>(), original);

        let fresh = engine.query(&EventQuery::new().with_limit(100)).unwrap();
        assert_eq!(fresh.events.len(), 30);
    }

    /// A cursor survives its string form.
    #[test]
    fn test_cursor_round_trips_between_pages() {
        let (gateway, engine) = setup(QueryConfig::default());
        seed(&gateway);

        let first = engine.query(&EventQuery::new().ascending().with_limit(5)).unwrap();
        let token = first.next_cursor.unwrap().encode();
        let cursor = PageCursor::decode(&token).unwrap();

        let second = engine
            .query(&EventQuery::new().ascending().with_limit(5).with_cursor(cursor))
            .unwrap();
        assert_eq!(positions(&second), vec![5, 6, 7]);
        assert_eq!(second.next_cursor, None);
    }

    #[test]
    fn test_limit_is_clamped() {
        let (gateway, engine) = setup(QueryConfig {
            default_limit: 3,
            max_limit: 5,
        });
        seed(&gateway);

        assert_eq!(engine.query(&EventQuery::new()).unwrap().events.len(), 3);
        assert_eq!(engine.query(&EventQuery::new().with_limit(100)).unwrap().events.len(), 5);

        let err = engine.query(&EventQuery::new().with_limit(0)).unwrap_err();
        assert!(matches!(err, ChainlogError::Validation { .. }));
    }

    #[test]
    fn test_cursor_from_longer_chain_is_rejected() {
        let (gateway, engine) = setup(QueryConfig::default());
        seed(&gateway);

        let cursor = PageCursor {
            timestamp: at(3),
            id: EventId::new(),
            snapshot_len: 500,
        };
        let err = engine.query(&EventQuery::new().with_cursor(cursor)).unwrap_err();
        assert!(matches!(err, ChainlogError::Validation { .. }));
    }

    // ── Lookup ────────────────────────────────────────────────────────────────

    #[test]
    fn test_get_and_recompute_hash() {
        let (gateway, engine) = setup(QueryConfig::default());
        let receipts = seed(&gateway);

        let fetched = engine.get(&receipts[3].id).unwrap();
        assert_eq!(fetched.position, 3);
        assert_eq!(fetched.event.resource_id, "wf-1");
        assert_eq!(engine.recompute_hash(&receipts[3].id).unwrap(), receipts[3].event_hash);

        let err = engine.get(&EventId::new()).unwrap_err();
        assert!(matches!(err, ChainlogError::NotFound { .. }));
    }

    /// After an out-of-band edit the recomputed hash no longer matches.
    #[test]
    fn test_recompute_hash_exposes_edited_row() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chain.jsonl");
        let open = || -> Arc<dyn ChainStore> {
            Arc::new(
                ChainStateKeeper::open(ChainId::new("q"), JsonlEventLog::open(&path, false).unwrap()).unwrap(),
            )
        };

        let receipt = AdmissionGateway::new(open(), RetryPolicy::default())
            .admit(EventDraft::new("config_change", "set", "configuration", "mode", Outcome::Success))
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, contents.replace("\"mode\"", "\"debug\"")).unwrap();

        let engine = QueryEngine::new(open(), QueryConfig::default());
        let stored = engine.get(&receipt.id).unwrap();
        assert_eq!(stored.event.resource_id, "debug");
        assert_eq!(stored.event.event_hash, receipt.event_hash);
        assert_ne!(engine.recompute_hash(&receipt.id).unwrap(), receipt.event_hash);
    }
}

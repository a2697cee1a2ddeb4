//! # chainlog-contracts
//!
//! Shared types, schemas, and contracts for the chainlog audit chain.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate, only data definitions and error types.

pub mod error;
pub mod event;
pub mod query;
pub mod verify;

pub use error::{ChainlogError, ChainlogResult};
pub use event::{
    AdmissionReceipt, AuditEvent, ChainId, ClientContext, CommittedEvent, EventDraft, EventId,
    Outcome,
};
pub use query::{DetailsMatch, EventQuery, Page, PageCursor, SortOrder};
pub use verify::{
    ChainAttestation, IntegrityFailure, MismatchKind, VerificationRange, VerificationResult,
};

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;

    // ── EventId ──────────────────────────────────────────────────────────────

    #[test]
    fn event_id_new_produces_unique_values() {
        let ids: std::collections::HashSet<EventId> = (0..100).map(|_| EventId::new()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn event_id_parses_its_display_form() {
        let id = EventId::new();
        assert_eq!(EventId::parse(&id.to_string()), Some(id));
        assert_eq!(EventId::parse("not-a-uuid"), None);
    }

    // ── Outcome ──────────────────────────────────────────────────────────────

    #[test]
    fn outcome_serializes_as_snake_case() {
        let json = serde_json::to_string(&Outcome::PartialSuccess).unwrap();
        assert_eq!(json, "\"partial_success\"");
        assert_eq!(Outcome::parse("partial_success"), Some(Outcome::PartialSuccess));
        assert_eq!(Outcome::parse("maybe"), None);
        assert!(Outcome::Success.is_success());
        assert!(!Outcome::Failure.is_success());
    }

    // ── EventDraft / AuditEvent ──────────────────────────────────────────────

    #[test]
    fn draft_builder_sets_optional_fields() {
        let draft = EventDraft::new("authentication", "login", "user", "u-1", Outcome::Failure)
            .with_actor("u-1")
            .with_outcome_detail("bad password")
            .with_ip_address("10.0.0.7")
            .with_user_agent("curl/8")
            .with_request_correlation_id("req-9")
            .with_details(json!({ "method": "password" }));

        assert_eq!(draft.actor.as_deref(), Some("u-1"));
        assert_eq!(draft.outcome_detail.as_deref(), Some("bad password"));
        assert_eq!(draft.client.ip_address.as_deref(), Some("10.0.0.7"));
        assert_eq!(draft.client.user_agent.as_deref(), Some("curl/8"));
        assert_eq!(draft.request_correlation_id.as_deref(), Some("req-9"));
        assert!(draft.timestamp.is_none());
    }

    #[test]
    fn draft_deserializes_with_only_required_fields() {
        let draft: EventDraft = serde_json::from_value(json!({
            "event_type": "config_change",
            "action": "set",
            "resource_type": "configuration",
            "resource_id": "max_workers",
            "outcome": "success"
        }))
        .unwrap();

        assert_eq!(draft.details, serde_json::Value::Null);
        assert!(draft.client.is_empty());
    }

    #[test]
    fn from_draft_keeps_caller_timestamp_and_links_previous_hash() {
        let caller_ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let draft = EventDraft::new("t", "a", "r", "1", Outcome::Success).with_timestamp(caller_ts);

        let event = AuditEvent::from_draft(EventId::new(), draft, now, AuditEvent::GENESIS_HASH);

        assert_eq!(event.timestamp, caller_ts);
        assert!(event.is_genesis());
        assert!(event.event_hash.is_empty());
    }

    #[test]
    fn from_draft_uses_server_time_when_absent() {
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let draft = EventDraft::new("t", "a", "r", "1", Outcome::Success);
        let event = AuditEvent::from_draft(EventId::new(), draft, now, "ab".repeat(32));
        assert_eq!(event.timestamp, now);
        assert!(!event.is_genesis());
    }

    #[test]
    fn genesis_hash_is_64_zeros() {
        assert_eq!(AuditEvent::GENESIS_HASH.len(), 64);
        assert!(AuditEvent::GENESIS_HASH.chars().all(|c| c == '0'));
    }

    // ── PageCursor ───────────────────────────────────────────────────────────

    #[test]
    fn page_cursor_encode_decode() {
        let cursor = PageCursor {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap(),
            id: EventId::new(),
            snapshot_len: 42,
        };
        assert_eq!(PageCursor::decode(&cursor.encode()), Some(cursor));
        assert_eq!(PageCursor::decode("garbage"), None);
    }

    // ── VerificationResult ───────────────────────────────────────────────────

    #[test]
    fn intact_result_passes_through_into_result() {
        let result = VerificationResult {
            chain_id: ChainId::default(),
            start_position: 0,
            verified_count: 3,
            tail_hash: "ab".repeat(32),
            failure: None,
        };
        assert!(result.is_intact());
        assert!(result.into_result().is_ok());
    }

    #[test]
    fn failed_result_becomes_integrity_violation() {
        let result = VerificationResult {
            chain_id: ChainId::new("tenant-a"),
            start_position: 0,
            verified_count: 1,
            tail_hash: "aa".repeat(32),
            failure: Some(IntegrityFailure {
                position: 1,
                event_id: None,
                kind: MismatchKind::HashMismatch,
                expected: "bb".repeat(32),
                found: "cc".repeat(32),
            }),
        };

        let err = result.into_result().unwrap_err();
        assert!(err.is_integrity_violation());
        assert!(!err.is_retryable());
        let msg = err.to_string();
        assert!(msg.contains("position 1"));
        assert!(msg.contains("hash_mismatch"));
        assert!(msg.contains("tenant-a"));
    }

    // ── ChainlogError display messages ───────────────────────────────────────

    #[test]
    fn error_write_contention_display() {
        let err = ChainlogError::WriteContention { attempts: 8 };
        assert!(err.to_string().contains("8 commit attempts"));
        assert!(err.is_retryable());
    }

    #[test]
    fn error_storage_display() {
        let err = ChainlogError::storage("disk full");
        let msg = err.to_string();
        assert!(msg.contains("storage error"));
        assert!(msg.contains("disk full"));
        assert!(err.is_retryable());
        assert!(!err.is_integrity_violation());
    }

    #[test]
    fn error_validation_display() {
        let err = ChainlogError::validation("event_type must not be empty");
        assert!(err.to_string().contains("validation error"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn error_not_found_display() {
        let err = ChainlogError::not_found("event abc");
        assert_eq!(err.to_string(), "not found: event abc");
    }
}

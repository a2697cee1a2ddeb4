//! # chainlog-core
//!
//! Hashing, storage seams and the admission pipeline for chainlog.
//!
//! This crate provides:
//! - Canonical encoding and SHA-256 hash-chain primitives (`chain`)
//! - The two storage traits (`ChainStore`, `EventLog`)
//! - The `AdmissionGateway` that turns drafts into committed events
//! - TOML configuration (`ChainlogConfig`)
//! - Draft constructors for common producer events (`producers`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chainlog_core::{AdmissionGateway, config::RetryPolicy, producers};
//!
//! let gateway = AdmissionGateway::new(store, RetryPolicy::default());
//! let receipt = gateway.admit(producers::secret_access("db-password", "alice"))?;
//! println!("committed {} at {}", receipt.id, receipt.position);
//! ```

pub mod chain;
pub mod config;
pub mod gateway;
pub mod producers;
pub mod traits;

pub use chain::{canonical_encoding, check_link, compute_event_hash, verify_event_hash};
pub use config::{ChainlogConfig, QueryConfig, RetryPolicy, StoreBackend, StoreConfig};
pub use gateway::{validate_draft, AdmissionGateway};
pub use traits::{ChainStore, CommitOutcome, EventLog, EventStream, HeadState};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use serde_json::json;

    use chainlog_contracts::{
        error::{ChainlogError, ChainlogResult},
        event::{AuditEvent, ChainId, CommittedEvent, EventDraft, EventId, Outcome},
    };

    use super::*;

    // ── Helpers ───────────────────────────────────────────────────────────────

    /// A chain store whose contention and failures are scripted by the test.
    struct ScriptedStore {
        chain_id: ChainId,
        state: Mutex<ScriptedState>,
    }

    struct ScriptedState {
        head: String,
        events: Vec<AuditEvent>,
        /// Each pending conflict simulates another writer winning one race.
        conflicts_left: u32,
        fail_storage: bool,
        commit_calls: u32,
    }

    impl ScriptedStore {
        fn new(conflicts: u32) -> Arc<Self> {
            Arc::new(Self {
                chain_id: ChainId::new("scripted"),
                state: Mutex::new(ScriptedState {
                    head: AuditEvent::GENESIS_HASH.to_string(),
                    events: Vec::new(),
                    conflicts_left: conflicts,
                    fail_storage: false,
                    commit_calls: 0,
                }),
            })
        }

        fn failing() -> Arc<Self> {
            let store = Self::new(0);
            store.state.lock().unwrap().fail_storage = true;
            store
        }

        fn events(&self) -> Vec<AuditEvent> {
            self.state.lock().unwrap().events.clone()
        }

        fn commit_calls(&self) -> u32 {
            self.state.lock().unwrap().commit_calls
        }
    }

    impl ChainStore for ScriptedStore {
        fn chain_id(&self) -> &ChainId {
            &self.chain_id
        }

        fn head_state(&self) -> ChainlogResult<HeadState> {
            let state = self.state.lock().unwrap();
            Ok(HeadState {
                hash: state.head.clone(),
                len: state.events.len() as u64,
            })
        }

        fn commit(
            &self,
            candidate: AuditEvent,
            expected_previous_head: &str,
        ) -> ChainlogResult<CommitOutcome> {
            let mut state = self.state.lock().unwrap();
            state.commit_calls += 1;

            if state.conflicts_left > 0 {
                state.conflicts_left -= 1;
                let rival = format!("{:064x}", state.conflicts_left + 1);
                state.head = rival.clone();
                return Ok(CommitOutcome::Conflict { live_head: rival });
            }
            if state.fail_storage {
                return Err(ChainlogError::storage("scripted outage"));
            }
            if state.head != expected_previous_head {
                return Ok(CommitOutcome::Conflict {
                    live_head: state.head.clone(),
                });
            }

            assert_eq!(candidate.previous_hash, expected_previous_head);
            assert!(verify_event_hash(&candidate));

            let position = state.events.len() as u64;
            state.head = candidate.event_hash.clone();
            state.events.push(candidate.clone());
            Ok(CommitOutcome::Committed(CommittedEvent {
                position,
                event: candidate,
            }))
        }

        fn len(&self) -> ChainlogResult<u64> {
            Ok(self.state.lock().unwrap().events.len() as u64)
        }

        fn scan(&self, from: u64, to: u64) -> EventStream<'_> {
            let events = self.events();
            Box::new(
                events
                    .into_iter()
                    .enumerate()
                    .skip(from as usize)
                    .take(to.saturating_sub(from) as usize)
                    .map(|(i, event)| {
                        Ok(CommittedEvent {
                            position: i as u64,
                            event,
                        })
                    }),
            )
        }

        fn get(&self, id: &EventId) -> ChainlogResult<Option<CommittedEvent>> {
            Ok(self
                .events()
                .into_iter()
                .enumerate()
                .find(|(_, e)| &e.id == id)
                .map(|(i, event)| CommittedEvent {
                    position: i as u64,
                    event,
                }))
        }

        fn position_of_hash(&self, hash: &str) -> ChainlogResult<Option<u64>> {
            Ok(self
                .events()
                .iter()
                .position(|e| e.event_hash == hash)
                .map(|p| p as u64))
        }
    }

    fn no_wait(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    fn draft(action: &str) -> EventDraft {
        EventDraft::new("authentication", action, "user", "u-1", Outcome::Success)
    }

    // ── Admission ─────────────────────────────────────────────────────────────

    /// The first admitted event links to the genesis sentinel.
    #[test]
    fn test_first_event_links_to_genesis() {
        let store = ScriptedStore::new(0);
        let gateway = AdmissionGateway::new(store.clone(), no_wait(3));

        let receipt = gateway.admit(draft("login")).unwrap();

        assert_eq!(receipt.position, 0);
        assert_eq!(receipt.previous_hash, AuditEvent::GENESIS_HASH);
        assert_eq!(receipt.attempts, 1);
        assert_eq!(receipt.chain_id, ChainId::new("scripted"));

        let events = store.events();
        assert_eq!(events[0].id, receipt.id);
        assert_eq!(events[0].event_hash, receipt.event_hash);
    }

    /// Sequential admissions form a linked chain.
    #[test]
    fn test_sequential_admissions_link() {
        let store = ScriptedStore::new(0);
        let gateway = AdmissionGateway::new(store.clone(), no_wait(3));

        let a = gateway.admit(draft("a")).unwrap();
        let b = gateway.admit(draft("b")).unwrap();

        assert_eq!(b.previous_hash, a.event_hash);
        assert_eq!(b.position, 1);
        assert_ne!(a.id, b.id);
    }

    /// A lost race relinks to the new head and keeps the same identity.
    #[test]
    fn test_conflict_retries_against_new_head() {
        let store = ScriptedStore::new(2);
        let gateway = AdmissionGateway::new(store.clone(), no_wait(5));

        let receipt = gateway.admit(draft("contended")).unwrap();

        assert_eq!(receipt.attempts, 3);
        assert_eq!(store.commit_calls(), 3);
        // The last rival head the script installed was 0x...01.
        assert_eq!(receipt.previous_hash, format!("{:064x}", 1));
        assert_eq!(store.events().len(), 1);
        assert_eq!(store.events()[0].id, receipt.id);
    }

    /// Exhausting every attempt fails with WriteContention and commits nothing.
    #[test]
    fn test_contention_exhausts_attempts() {
        let store = ScriptedStore::new(10);
        let gateway = AdmissionGateway::new(store.clone(), no_wait(4));

        let err = gateway.admit(draft("never")).unwrap_err();

        assert!(matches!(err, ChainlogError::WriteContention { attempts: 4 }));
        assert_eq!(store.commit_calls(), 4);
        assert!(store.events().is_empty());
    }

    /// A storage failure surfaces as StorageError without retrying.
    #[test]
    fn test_storage_error_propagates() {
        let store = ScriptedStore::failing();
        let gateway = AdmissionGateway::new(store.clone(), no_wait(4));

        let err = gateway.admit(draft("x")).unwrap_err();

        assert!(matches!(err, ChainlogError::Storage { .. }));
        assert_eq!(store.commit_calls(), 1);
        assert!(store.events().is_empty());
    }

    /// Invalid drafts are rejected before any commit attempt.
    #[test]
    fn test_validation_happens_before_commit() {
        let store = ScriptedStore::new(0);
        let gateway = AdmissionGateway::new(store.clone(), no_wait(3));

        let bad = [
            EventDraft::new("", "a", "r", "1", Outcome::Success),
            EventDraft::new("t", "  ", "r", "1", Outcome::Success),
            EventDraft::new("t", "a", "r", "", Outcome::Success),
            draft("a").with_actor(""),
            draft("a").with_ip_address("not-an-ip"),
        ];
        for d in bad {
            let err = gateway.admit(d).unwrap_err();
            assert!(matches!(err, ChainlogError::Validation { .. }), "got {err}");
        }
        assert_eq!(store.commit_calls(), 0);
    }

    #[test]
    fn test_validation_accepts_ipv6_and_full_context() {
        let d = draft("a")
            .with_ip_address("2001:db8::1")
            .with_user_agent("agent/1.0")
            .with_request_correlation_id("req-1")
            .with_details(json!({ "k": [1, 2] }));
        assert!(validate_draft(&d).is_ok());
    }

    // ── RetryPolicy ───────────────────────────────────────────────────────────

    #[test]
    fn test_backoff_doubles_and_saturates() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff_ms: 5,
            max_backoff_ms: 30,
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(5));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(10));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(20));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(30));
        assert_eq!(policy.backoff_for(60), Duration::from_millis(30));
    }

    // ── Config ────────────────────────────────────────────────────────────────

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ChainlogConfig::from_toml_str("").unwrap();
        assert_eq!(config, ChainlogConfig::default());
        assert_eq!(config.store.backend, StoreBackend::File);
        assert_eq!(config.admission.max_attempts, 8);
        assert_eq!(config.query.default_limit, 100);
    }

    #[test]
    fn test_full_config_parses() {
        let toml = r#"
            [store]
            backend = "memory"
            chain_id = "tenant-a"
            sync_on_commit = false

            [admission]
            max_attempts = 3
            initial_backoff_ms = 1
            max_backoff_ms = 4

            [query]
            default_limit = 10
            max_limit = 50
        "#;

        let config = ChainlogConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.chain_id, "tenant-a");
        assert!(!config.store.sync_on_commit);
        assert_eq!(config.admission.max_attempts, 3);
        assert_eq!(config.query.max_limit, 50);
    }

    /// The example config shipped at the workspace root stays loadable.
    #[test]
    fn test_example_config_parses() {
        let config = ChainlogConfig::from_toml_str(include_str!("../../../chainlog.example.toml")).unwrap();
        assert_eq!(config.store.path, std::path::PathBuf::from("audit/chain.jsonl"));
        assert_eq!(config.admission, RetryPolicy::default());
        assert_eq!(config.query, QueryConfig::default());
    }

    #[test]
    fn test_inconsistent_config_is_rejected() {
        let cases = [
            "[admission]\nmax_attempts = 0",
            "[admission]\ninitial_backoff_ms = 50\nmax_backoff_ms = 10",
            "[query]\ndefault_limit = 500\nmax_limit = 100",
            "[store]\nchain_id = \"  \"",
        ];
        for case in cases {
            let err = ChainlogConfig::from_toml_str(case).unwrap_err();
            assert!(matches!(err, ChainlogError::Config { .. }), "case {case:?}");
        }
    }

    #[test]
    fn test_malformed_config_is_config_error() {
        let err = ChainlogConfig::from_toml_str("[store\nbackend = ").unwrap_err();
        assert!(err.to_string().contains("configuration error"));

        let err = ChainlogConfig::from_toml_str("[store]\nbackend = \"postgres\"").unwrap_err();
        assert!(matches!(err, ChainlogError::Config { .. }));
    }

    // ── Producers ─────────────────────────────────────────────────────────────

    #[test]
    fn test_failed_authentication_draft() {
        let d = producers::authentication_attempt("alice", false, Some("10.1.2.3"));
        assert_eq!(d.event_type, producers::event_types::AUTHENTICATION);
        assert_eq!(d.outcome, Outcome::Failure);
        assert_eq!(d.outcome_detail.as_deref(), Some("authentication failed"));
        assert_eq!(d.client.ip_address.as_deref(), Some("10.1.2.3"));
        assert!(validate_draft(&d).is_ok());
    }

    #[test]
    fn test_authorization_and_key_drafts_carry_details() {
        let d = producers::authorization_check("bob", "workflow:write", "wf-1", false);
        assert_eq!(d.details["permission"], "workflow:write");
        assert_eq!(d.details["allowed"], false);
        assert!(d.outcome_detail.unwrap().contains("workflow:write"));

        let scopes = vec!["read".to_string(), "write".to_string()];
        let d = producers::api_key_created("key-1", "bob", &scopes);
        assert_eq!(d.details["scopes"], json!(["read", "write"]));

        let d = producers::workflow_execution(
            "wf-2",
            "carol",
            Outcome::PartialSuccess,
            Duration::from_millis(1500),
        );
        assert_eq!(d.details["duration_ms"], 1500);
    }
}

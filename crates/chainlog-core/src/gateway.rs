//! The admission gateway: the only way an event enters a chain.
//!
//! The gateway enforces the admission pipeline:
//!
//!   Validate → Assign id/timestamp → Read head → Hash → CAS commit → (retry)
//!
//! Identity and timestamp are assigned once per admission and reused across
//! retries, so a retried commit carries the same `id` the producer would see
//! in logs. Only the `previous_hash` link (and therefore `event_hash`)
//! changes between attempts.

use std::{net::IpAddr, sync::Arc, thread};

use chrono::Utc;
use tracing::{debug, warn};

use chainlog_contracts::{
    error::{ChainlogError, ChainlogResult},
    event::{AdmissionReceipt, AuditEvent, EventDraft, EventId},
};

use crate::{
    chain::seal,
    config::RetryPolicy,
    traits::{ChainStore, CommitOutcome},
};

/// Accepts event drafts and commits them to one chain.
///
/// Construct one gateway per chain handle. Gateways are cheap to share
/// behind an `Arc`; every call to `admit()` is independent.
pub struct AdmissionGateway {
    store: Arc<dyn ChainStore>,
    retry: RetryPolicy,
}

impl AdmissionGateway {
    pub fn new(store: Arc<dyn ChainStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// The chain handle this gateway commits to.
    pub fn store(&self) -> &Arc<dyn ChainStore> {
        &self.store
    }

    /// Admit one draft into the chain.
    ///
    /// # Pipeline
    ///
    /// 1. Validate the draft; malformed drafts never reach hashing
    /// 2. Assign `id` and, when absent, `timestamp`
    /// 3. Read the live head and link the candidate to it
    /// 4. Compute `event_hash` over the canonical encoding + `previous_hash`
    /// 5. Attempt the compare-and-swap commit
    /// 6. On `Conflict`, back off and go back to step 3
    ///
    /// # Errors
    ///
    /// `Validation` for a bad draft, `WriteContention` once
    /// `RetryPolicy::max_attempts` commits have lost the race, `Storage`
    /// when the row could not be persisted. In every error case nothing
    /// was committed.
    pub fn admit(&self, draft: EventDraft) -> ChainlogResult<AdmissionReceipt> {
        // ── Step 1: Validate ─────────────────────────────────────────────────
        validate_draft(&draft)?;

        // ── Step 2: Assign identity ──────────────────────────────────────────
        let id = EventId::new();
        let unlinked = AuditEvent::from_draft(id, draft, Utc::now(), String::new());
        let chain_id = self.store.chain_id().clone();
        let max_attempts = self.retry.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            // ── Step 3: Link to the live head ────────────────────────────────
            let head = self.store.current_head()?;
            let mut candidate = unlinked.clone();
            candidate.previous_hash = head.clone();

            // ── Step 4: Hash ─────────────────────────────────────────────────
            seal(&mut candidate);

            // ── Step 5: Compare-and-swap ─────────────────────────────────────
            match self.store.commit(candidate, &head)? {
                CommitOutcome::Committed(committed) => {
                    debug!(
                        chain_id = %chain_id,
                        event_id = %id,
                        position = committed.position,
                        attempt,
                        event_hash = %committed.event.event_hash,
                        "audit event admitted"
                    );
                    return Ok(AdmissionReceipt {
                        chain_id,
                        id,
                        position: committed.position,
                        previous_hash: committed.event.previous_hash,
                        event_hash: committed.event.event_hash,
                        attempts: attempt,
                    });
                }

                // ── Step 6: Lost the race; back off and relink ───────────────
                CommitOutcome::Conflict { live_head } => {
                    if attempt == max_attempts {
                        break;
                    }
                    let delay = self.retry.backoff_for(attempt);
                    debug!(
                        chain_id = %chain_id,
                        event_id = %id,
                        attempt,
                        expected_head = %head,
                        live_head = %live_head,
                        backoff_ms = delay.as_millis() as u64,
                        "head moved during admission, retrying"
                    );
                    thread::sleep(delay);
                }
            }
        }

        warn!(
            chain_id = %chain_id,
            event_id = %id,
            attempts = max_attempts,
            "admission gave up under write contention"
        );
        Err(ChainlogError::WriteContention {
            attempts: max_attempts,
        })
    }
}

/// Reject drafts with missing or malformed fields.
///
/// Field semantics (taxonomy, resource naming) belong to producers; this
/// only checks what the chain structurally relies on.
pub fn validate_draft(draft: &EventDraft) -> ChainlogResult<()> {
    for (name, value) in [
        ("event_type", &draft.event_type),
        ("action", &draft.action),
        ("resource_type", &draft.resource_type),
        ("resource_id", &draft.resource_id),
    ] {
        if value.trim().is_empty() {
            return Err(ChainlogError::validation(format!("{} must not be empty", name)));
        }
    }

    for (name, value) in [
        ("actor", &draft.actor),
        ("request_correlation_id", &draft.request_correlation_id),
        ("outcome_detail", &draft.outcome_detail),
        ("client.user_agent", &draft.client.user_agent),
    ] {
        if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
            return Err(ChainlogError::validation(format!(
                "{} must be absent or non-empty",
                name
            )));
        }
    }

    if let Some(ip) = &draft.client.ip_address {
        if ip.parse::<IpAddr>().is_err() {
            return Err(ChainlogError::validation(format!(
                "client.ip_address '{}' is not an IP address",
                ip
            )));
        }
    }

    Ok(())
}

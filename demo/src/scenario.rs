//! Tamper-detection walkthrough on a scratch chain.
//!
//! Steps:
//!   1. Admit A (genesis link) and B (links to A)
//!   2. Four concurrent admitters append 100 more events through the CAS
//!   3. Full verification passes; an attestation is taken
//!   4. One character of A's stored `action` is flipped on disk
//!   5. Verification of the chain, reopened read-only, reports HashMismatch
//!      at position 0

use std::{path::Path, sync::Arc, thread};

use serde_json::json;
use tempfile::TempDir;

use chainlog_contracts::{
    error::{ChainlogError, ChainlogResult},
    event::{ChainId, Outcome},
    verify::{MismatchKind, VerificationRange},
};
use chainlog_core::{
    config::ChainlogConfig,
    gateway::AdmissionGateway,
    producers,
    traits::ChainStore,
};
use chainlog_query::QueryEngine;
use chainlog_store::{ChainStateKeeper, JsonlEventLog};
use chainlog_verify::IntegrityVerifier;

const WRITERS: usize = 4;
const EVENTS_PER_WRITER: usize = 25;

pub fn run_scenario(config: &ChainlogConfig, keep: Option<&Path>) -> ChainlogResult<()> {
    println!("=== Scenario: tamper detection ===");
    println!();

    let scratch = TempDir::new()
        .map_err(|e| ChainlogError::storage(format!("cannot create scratch directory: {}", e)))?;
    let path = match keep {
        Some(path) => path.to_path_buf(),
        None => scratch.path().join("scenario.jsonl"),
    };
    if path.exists() {
        return Err(ChainlogError::validation(format!(
            "{} already exists; the scenario needs a fresh chain",
            path.display()
        )));
    }

    // ── Step 1: A and B ───────────────────────────────────────────────────────
    let store: Arc<dyn ChainStore> = Arc::new(ChainStateKeeper::open(
        ChainId::new("scenario"),
        JsonlEventLog::open(&path, false)?,
    )?);
    let gateway = AdmissionGateway::new(store.clone(), config.admission.clone());

    let a = gateway.admit(
        producers::authentication_attempt("alice", true, Some("192.0.2.10"))
            .with_details(json!({ "method": "password", "mfa": true })),
    )?;
    let b = gateway.admit(producers::secret_access("db-password", "alice"))?;

    println!("  Chain file: {}", path.display());
    println!("  A  position {}  previous {}", a.position, short(&a.previous_hash));
    println!("     hash {}", a.event_hash);
    println!("  B  position {}  previous {}", b.position, short(&b.previous_hash));
    println!("     hash {}", b.event_hash);
    println!();

    // ── Step 2: concurrent admission ──────────────────────────────────────────
    let attempts = thread::scope(|s| -> ChainlogResult<u32> {
        let handles: Vec<_> = (0..WRITERS)
            .map(|w| {
                let gateway = &gateway;
                s.spawn(move || -> ChainlogResult<u32> {
                    let mut attempts = 0;
                    for i in 0..EVENTS_PER_WRITER {
                        let draft = producers::workflow_execution(
                            &format!("wf-{w}-{i}"),
                            "scheduler",
                            Outcome::Success,
                            std::time::Duration::from_millis((w * 10 + i) as u64),
                        );
                        attempts += gateway.admit(draft)?.attempts;
                    }
                    Ok(attempts)
                })
            })
            .collect();

        let mut total = 0;
        for handle in handles {
            total += handle
                .join()
                .map_err(|_| ChainlogError::storage("admitter thread panicked"))??;
        }
        Ok(total)
    })?;

    let admitted = (WRITERS * EVENTS_PER_WRITER) as u32;
    println!(
        "  {} writers admitted {} events in {} commit attempts ({} retried on a moved head)",
        WRITERS,
        admitted,
        attempts,
        attempts - admitted
    );

    // ── Step 3: verify and attest ─────────────────────────────────────────────
    let verifier = IntegrityVerifier::new(store.clone());
    let attestation = verifier.attest(&VerificationRange::Full)?;
    println!(
        "  Full verification:      PASS ({} events, tail {})",
        attestation.event_count,
        short(&attestation.terminal_hash)
    );
    drop(verifier);
    drop(gateway);
    drop(store);

    // ── Step 4: tamper ────────────────────────────────────────────────────────
    flip_first_action_char(&path)?;
    println!("  Tampered:               flipped one character of A's stored action");

    // ── Step 5: detect ────────────────────────────────────────────────────────
    let store: Arc<dyn ChainStore> = Arc::new(ChainStateKeeper::open(
        ChainId::new("scenario"),
        JsonlEventLog::open_read_only(&path)?,
    )?);
    let result = IntegrityVerifier::new(store.clone()).verify(&VerificationRange::Full)?;
    let engine = QueryEngine::new(store, config.query.clone());
    let stored = engine.get(&a.id)?;
    let recomputed = engine.recompute_hash(&a.id)?;

    match &result.failure {
        Some(f) if f.kind == MismatchKind::HashMismatch && f.position == 0 => {
            println!("  Re-verification:        FAIL as expected");
            println!("    kind:       {}", f.kind);
            println!("    position:   {}", f.position);
            println!("    stored:     {}", stored.event.event_hash);
            println!("    recomputed: {}", recomputed);
            println!("    action now: {:?}", stored.event.action);
        }
        other => {
            return Err(ChainlogError::validation(format!(
                "tampering was not detected as expected: {:?}",
                other
            )))
        }
    }

    println!();
    println!("  Scenario complete.");
    println!();
    Ok(())
}

/// Rewrite the first row with one character of `action` changed.
fn flip_first_action_char(path: &Path) -> ChainlogResult<()> {
    let io = |e: std::io::Error| ChainlogError::storage(format!("{}: {}", path.display(), e));
    let contents = std::fs::read_to_string(path).map_err(io)?;
    let mut lines: Vec<String> = contents.lines().map(str::to_string).collect();
    let first = lines
        .first_mut()
        .ok_or_else(|| ChainlogError::storage("scenario chain is empty"))?;

    let mut row: serde_json::Value = serde_json::from_str(first).map_err(|e| ChainlogError::CorruptRecord {
        position: 0,
        reason: e.to_string(),
    })?;
    let action = row["action"].as_str().unwrap_or_default();
    let mut chars: Vec<char> = action.chars().collect();
    if let Some(c) = chars.first_mut() {
        *c = if c.is_ascii_uppercase() { c.to_ascii_lowercase() } else { c.to_ascii_uppercase() };
    }
    row["action"] = json!(chars.into_iter().collect::<String>());
    *first = row.to_string();

    std::fs::write(path, format!("{}\n", lines.join("\n"))).map_err(io)
}

fn short(hash: &str) -> &str {
    &hash[..hash.len().min(16)]
}

//! Hash-chain primitives: canonical encoding, hashing and link checks.
//!
//! The canonical encoding is independent of how rows are stored. Every
//! field that contributes to an event's hash is listed explicitly so nothing
//! is accidentally omitted, and each one is length-prefixed so adjacent
//! fields can never bleed into each other.
//!
//! Hash input layout (bytes, in order):
//!   1. id, hyphenated lowercase UUID
//!   2. timestamp, RFC 3339 with nanoseconds and `Z`
//!   3. event_type, actor?, action, resource_type, resource_id
//!   4. outcome (snake_case name), outcome_detail?
//!   5. details as canonical JSON (compact, object keys sorted)
//!   6. request_correlation_id?, client.ip_address?, client.user_agent?
//!   7. previous_hash as UTF-8 bytes (64 ASCII hex chars), not prefixed
//!
//! Strings are written as an 8-byte little-endian length followed by the
//! UTF-8 bytes. Optional fields (`?`) get a presence byte first: `0` when
//! absent, `1` followed by the string when present.

use chrono::SecondsFormat;
use serde_json::Value;
use sha2::{Digest, Sha256};

use chainlog_contracts::{event::AuditEvent, verify::MismatchKind};

/// Deterministic bytes for every hashed field except `previous_hash`.
pub fn canonical_encoding(event: &AuditEvent) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);

    put_str(&mut buf, &event.id.to_string());
    put_str(
        &mut buf,
        &event.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
    );
    put_str(&mut buf, &event.event_type);
    put_opt(&mut buf, event.actor.as_deref());
    put_str(&mut buf, &event.action);
    put_str(&mut buf, &event.resource_type);
    put_str(&mut buf, &event.resource_id);
    put_str(&mut buf, event.outcome.as_str());
    put_opt(&mut buf, event.outcome_detail.as_deref());

    let mut details = String::new();
    write_canonical_json(&mut details, &event.details);
    put_str(&mut buf, &details);

    put_opt(&mut buf, event.request_correlation_id.as_deref());
    put_opt(&mut buf, event.client.ip_address.as_deref());
    put_opt(&mut buf, event.client.user_agent.as_deref());

    buf
}

/// Compute `SHA-256(canonical_encoding || previous_hash)` for an event.
///
/// Returns a lowercase 64-character hex string. The stored `event_hash`
/// field is ignored.
pub fn compute_event_hash(event: &AuditEvent) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_encoding(event));
    hasher.update(event.previous_hash.as_bytes());
    hex::encode(hasher.finalize())
}

/// Fill in `event_hash` from the event's current fields.
pub fn seal(event: &mut AuditEvent) {
    event.event_hash = compute_event_hash(event);
}

/// True when the stored `event_hash` matches the recomputed one.
pub fn verify_event_hash(event: &AuditEvent) -> bool {
    event.event_hash == compute_event_hash(event)
}

/// True for 64 lowercase hex characters.
pub fn is_well_formed_hash(hash: &str) -> bool {
    hash.len() == 64 && hash.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Check one link of the chain.
///
/// Rule 1: the stored `previous_hash` must equal `expected_previous`.
/// Rule 2: the stored `event_hash` must match the recomputed value.
///
/// Returns the first rule that fails, or `None` when the link holds.
pub fn check_link(event: &AuditEvent, expected_previous: &str) -> Option<MismatchKind> {
    if event.previous_hash != expected_previous {
        return Some(MismatchKind::PreviousHashMismatch);
    }
    if !verify_event_hash(event) {
        return Some(MismatchKind::HashMismatch);
    }
    None
}

// ── Encoding helpers ──────────────────────────────────────────────────────────

fn put_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u64).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn put_opt(buf: &mut Vec<u8>, s: Option<&str>) {
    match s {
        None => buf.push(0),
        Some(s) => {
            buf.push(1);
            put_str(buf, s);
        }
    }
}

/// Compact JSON with object keys sorted at every depth.
///
/// Written by hand so the encoding does not depend on which map type
/// `serde_json` was compiled with.
fn write_canonical_json(out: &mut String, value: &Value) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical_json(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical_json(out, item);
            }
            out.push('}');
        }
        // Scalars already have exactly one compact rendering.
        scalar => out.push_str(&scalar.to_string()),
    }
}

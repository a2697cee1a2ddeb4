//! Audit event, draft and identity types.
//!
//! `EventDraft` is what producers hand to the admission gateway.
//! `AuditEvent` is the sealed, hash-linked record that lands in the chain,
//! and `CommittedEvent` pairs it with its position in commit order.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a committed audit event.
///
/// Assigned exactly once by the admission gateway and never changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub uuid::Uuid);

impl EventId {
    /// Create a new, unique event ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Parse an event ID from its hyphenated string form.
    pub fn parse(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Name of an independent chain, e.g. one per tenant.
///
/// Each chain has its own head and its own commit order. Nothing orders
/// events across chains.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub String);

impl ChainId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ChainId {
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the audited action ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
    PartialSuccess,
}

impl Outcome {
    /// The stable snake_case name, also used in the canonical encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::PartialSuccess => "partial_success",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Parse the snake_case name produced by `as_str`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            "partial_success" => Some(Self::PartialSuccess),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-side correlation metadata captured at the edge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientContext {
    /// Remote address of the caller, textual IPv4 or IPv6.
    pub ip_address: Option<String>,
    /// The caller's user-agent string.
    pub user_agent: Option<String>,
}

impl ClientContext {
    pub fn is_empty(&self) -> bool {
        self.ip_address.is_none() && self.user_agent.is_none()
    }
}

/// An event as submitted by a producer, before admission.
///
/// Carries every `AuditEvent` field except `id`, `previous_hash` and
/// `event_hash`, which only the gateway may assign. `timestamp` is optional;
/// the gateway fills it with the server clock when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub event_type: String,
    #[serde(default)]
    pub actor: Option<String>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub outcome: Outcome,
    #[serde(default)]
    pub outcome_detail: Option<String>,
    #[serde(default)]
    pub details: serde_json::Value,
    #[serde(default)]
    pub request_correlation_id: Option<String>,
    #[serde(default)]
    pub client: ClientContext,
}

impl EventDraft {
    /// Start a draft with the required fields; everything else is empty.
    pub fn new(
        event_type: impl Into<String>,
        action: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        outcome: Outcome,
    ) -> Self {
        Self {
            timestamp: None,
            event_type: event_type.into(),
            actor: None,
            action: action.into(),
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            outcome,
            outcome_detail: None,
            details: serde_json::Value::Null,
            request_correlation_id: None,
            client: ClientContext::default(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_outcome_detail(mut self, detail: impl Into<String>) -> Self {
        self.outcome_detail = Some(detail.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_request_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.request_correlation_id = Some(id.into());
        self
    }

    pub fn with_ip_address(mut self, ip: impl Into<String>) -> Self {
        self.client.ip_address = Some(ip.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.client.user_agent = Some(user_agent.into());
        self
    }
}

/// A single, sealed entry in a hash chain.
///
/// `event_hash` commits to every other field including `previous_hash`, so
/// changing any byte of a stored event (or dropping one) is detectable by
/// re-walking the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub actor: Option<String>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub outcome: Outcome,
    pub outcome_detail: Option<String>,
    pub details: serde_json::Value,
    pub request_correlation_id: Option<String>,
    #[serde(default)]
    pub client: ClientContext,

    /// SHA-256 hash (hex) of the preceding event, or `GENESIS_HASH` for the
    /// first event of a chain.
    pub previous_hash: String,

    /// SHA-256 hash (hex) over the canonical encoding of this event
    /// followed by `previous_hash`.
    pub event_hash: String,
}

impl AuditEvent {
    /// The sentinel `previous_hash` used for the first event in every chain.
    ///
    /// 64 hex zeros, a value no real SHA-256 output is expected to produce.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";

    /// Seal a draft into an event linked to `previous_hash`.
    ///
    /// `event_hash` is left empty; the caller computes it over the finished
    /// fields. `timestamp` falls back to `now` when the draft has none.
    pub fn from_draft(
        id: EventId,
        draft: EventDraft,
        now: DateTime<Utc>,
        previous_hash: impl Into<String>,
    ) -> Self {
        Self {
            id,
            timestamp: draft.timestamp.unwrap_or(now),
            event_type: draft.event_type,
            actor: draft.actor,
            action: draft.action,
            resource_type: draft.resource_type,
            resource_id: draft.resource_id,
            outcome: draft.outcome,
            outcome_detail: draft.outcome_detail,
            details: draft.details,
            request_correlation_id: draft.request_correlation_id,
            client: draft.client,
            previous_hash: previous_hash.into(),
            event_hash: String::new(),
        }
    }

    /// True when this event opens a chain.
    pub fn is_genesis(&self) -> bool {
        self.previous_hash == Self::GENESIS_HASH
    }
}

/// An event together with its zero-based position in commit order.
///
/// Position, not the `previous_hash` back-reference, is the authority on
/// ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommittedEvent {
    pub position: u64,
    pub event: AuditEvent,
}

/// Confirmation handed back to a producer once its event is durable.
///
/// Callers must not assume an event was recorded without one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionReceipt {
    pub chain_id: ChainId,
    pub id: EventId,
    pub position: u64,
    pub previous_hash: String,
    pub event_hash: String,
    /// Number of commit attempts it took, 1 when uncontended.
    pub attempts: u32,
}

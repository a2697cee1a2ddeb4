//! Draft constructors for the common producer events.
//!
//! Auth, workflow and credential subsystems own their taxonomy; these
//! helpers only spell out the conventional `event_type` / `resource_type`
//! strings and detail payloads so producers stay consistent with each
//! other. Nothing in the chain interprets them.

use std::time::Duration;

use serde_json::json;

use chainlog_contracts::event::{EventDraft, Outcome};

/// Conventional `event_type` values.
pub mod event_types {
    pub const AUTHENTICATION: &str = "authentication";
    pub const AUTHORIZATION: &str = "authorization";
    pub const WORKFLOW_EXECUTION: &str = "workflow_execution";
    pub const SECRET_ACCESS: &str = "secret_access";
    pub const CONFIG_CHANGE: &str = "config_change";
    pub const API_KEY_CREATE: &str = "api_key_create";
    pub const API_KEY_REVOKE: &str = "api_key_revoke";
}

/// Conventional `resource_type` values.
pub mod resource_types {
    pub const USER: &str = "user";
    pub const WORKFLOW: &str = "workflow";
    pub const SECRET: &str = "secret";
    pub const CONFIGURATION: &str = "configuration";
    pub const API_KEY: &str = "api_key";
}

pub fn authentication_attempt(user_id: &str, success: bool, ip_address: Option<&str>) -> EventDraft {
    let mut draft = EventDraft::new(
        event_types::AUTHENTICATION,
        "user authentication attempt",
        resource_types::USER,
        user_id,
        if success { Outcome::Success } else { Outcome::Failure },
    )
    .with_actor(user_id);
    if !success {
        draft = draft.with_outcome_detail("authentication failed");
    }
    if let Some(ip) = ip_address {
        draft = draft.with_ip_address(ip);
    }
    draft
}

pub fn authorization_check(
    user_id: &str,
    permission: &str,
    resource_id: &str,
    allowed: bool,
) -> EventDraft {
    let mut draft = EventDraft::new(
        event_types::AUTHORIZATION,
        format!("authorization check: {}", permission),
        resource_types::USER,
        resource_id,
        if allowed { Outcome::Success } else { Outcome::Failure },
    )
    .with_actor(user_id)
    .with_details(json!({ "permission": permission, "allowed": allowed }));
    if !allowed {
        draft = draft.with_outcome_detail(format!("permission denied: {}", permission));
    }
    draft
}

pub fn workflow_execution(
    workflow_id: &str,
    user_id: &str,
    outcome: Outcome,
    duration: Duration,
) -> EventDraft {
    EventDraft::new(
        event_types::WORKFLOW_EXECUTION,
        "workflow executed",
        resource_types::WORKFLOW,
        workflow_id,
        outcome,
    )
    .with_actor(user_id)
    .with_details(json!({ "duration_ms": duration.as_millis() as u64 }))
}

pub fn secret_access(secret_key: &str, user_id: &str) -> EventDraft {
    EventDraft::new(
        event_types::SECRET_ACCESS,
        "secret accessed",
        resource_types::SECRET,
        secret_key,
        Outcome::Success,
    )
    .with_actor(user_id)
}

pub fn config_change(
    config_key: &str,
    old_value: Option<&str>,
    new_value: &str,
    changed_by: &str,
) -> EventDraft {
    EventDraft::new(
        event_types::CONFIG_CHANGE,
        "configuration changed",
        resource_types::CONFIGURATION,
        config_key,
        Outcome::Success,
    )
    .with_actor(changed_by)
    .with_details(json!({ "old_value": old_value, "new_value": new_value }))
}

pub fn api_key_created(key_id: &str, user_id: &str, scopes: &[String]) -> EventDraft {
    EventDraft::new(
        event_types::API_KEY_CREATE,
        "API key created",
        resource_types::API_KEY,
        key_id,
        Outcome::Success,
    )
    .with_actor(user_id)
    .with_details(json!({ "scopes": scopes }))
}

pub fn api_key_revoked(key_id: &str, user_id: &str, reason: &str) -> EventDraft {
    EventDraft::new(
        event_types::API_KEY_REVOKE,
        "API key revoked",
        resource_types::API_KEY,
        key_id,
        Outcome::Success,
    )
    .with_actor(user_id)
    .with_details(json!({ "reason": reason }))
}

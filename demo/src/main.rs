//! chainlog: command-line front end for a hash-chained audit log.
//!
//! Admits events, verifies and attests chain integrity, and queries the
//! committed history of the chain named in the config file.
//!
//! Usage:
//!   chainlog --config chainlog.toml admit --event-type secret_access \
//!       --action "secret accessed" --resource-type secret --resource-id db-password
//!   chainlog verify
//!   chainlog query --actor alice --limit 20
//!   chainlog scenario

use std::{
    fs::OpenOptions,
    io::Read,
    path::{Path, PathBuf},
    sync::Mutex,
};

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use chainlog_contracts::{
    error::{ChainlogError, ChainlogResult},
    event::{AdmissionReceipt, CommittedEvent, EventDraft, EventId, Outcome},
    query::{EventQuery, PageCursor},
    verify::{VerificationRange, VerificationResult},
};
use chainlog_core::{config::ChainlogConfig, gateway::AdmissionGateway};
use chainlog_query::QueryEngine;
use chainlog_verify::IntegrityVerifier;

mod scenario;

// ── CLI definition ────────────────────────────────────────────────────────────

/// Tamper-evident audit log: admit, verify, attest and query events.
#[derive(Parser)]
#[command(
    name = "chainlog",
    about = "Hash-chained, tamper-evident audit event log",
    long_about = "Every admitted event commits to its predecessor's SHA-256 hash.\n\
                  Editing, deleting or reordering a stored row breaks the chain\n\
                  and is reported by `chainlog verify`."
)]
struct Cli {
    /// TOML config file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Append logs to this file instead of stderr.
    #[arg(long, global = true)]
    log: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Admit one event, from flags or from a JSON draft.
    Admit(AdmitArgs),
    /// Verify the whole chain, or the range between two hashes.
    Verify {
        /// `previous_hash` of the first event in the range.
        #[arg(long, requires = "to")]
        from: Option<String>,
        /// `event_hash` of the last event in the range.
        #[arg(long, requires = "from")]
        to: Option<String>,
    },
    /// Verify the whole chain and print an attestation for it.
    Attest,
    /// Query committed events, newest first.
    Query(QueryArgs),
    /// Print one event and check its stored hash.
    Show {
        id: String,
    },
    /// Print the chain head and length.
    Head,
    /// Walk through admission, verification and tamper detection on a
    /// scratch chain.
    Scenario {
        /// Keep the scratch chain at this path instead of a temp directory.
        #[arg(long)]
        keep: Option<PathBuf>,
    },
}

#[derive(Args)]
struct AdmitArgs {
    /// Read an `EventDraft` as JSON from this file, or `-` for stdin.
    #[arg(long, conflicts_with_all = ["event_type", "action", "resource_type", "resource_id"])]
    json: Option<PathBuf>,

    #[arg(long, required_unless_present = "json")]
    event_type: Option<String>,
    #[arg(long, required_unless_present = "json")]
    action: Option<String>,
    #[arg(long, required_unless_present = "json")]
    resource_type: Option<String>,
    #[arg(long, required_unless_present = "json")]
    resource_id: Option<String>,
    /// success, failure or partial_success.
    #[arg(long, default_value = "success")]
    outcome: String,
    #[arg(long)]
    outcome_detail: Option<String>,
    #[arg(long)]
    actor: Option<String>,
    /// JSON object stored as the event's details.
    #[arg(long)]
    details: Option<String>,
    #[arg(long)]
    correlation_id: Option<String>,
    #[arg(long)]
    ip: Option<String>,
    #[arg(long)]
    user_agent: Option<String>,
    /// RFC 3339 timestamp; defaults to admission time.
    #[arg(long)]
    timestamp: Option<String>,
}

#[derive(Args)]
struct QueryArgs {
    /// Repeat to match any of several types.
    #[arg(long = "event-type")]
    event_types: Vec<String>,
    #[arg(long)]
    actor: Option<String>,
    #[arg(long)]
    resource_type: Option<String>,
    #[arg(long, requires = "resource_type")]
    resource_id: Option<String>,
    #[arg(long)]
    outcome: Option<String>,
    #[arg(long)]
    correlation_id: Option<String>,
    /// Inclusive RFC 3339 lower bound.
    #[arg(long)]
    since: Option<String>,
    /// Inclusive RFC 3339 upper bound.
    #[arg(long)]
    until: Option<String>,
    /// `path=json` containment match on details; repeatable.
    #[arg(long = "details")]
    details: Vec<String>,
    /// Oldest first.
    #[arg(long)]
    asc: bool,
    #[arg(long)]
    limit: Option<usize>,
    /// Cursor printed by the previous page.
    #[arg(long)]
    cursor: Option<String>,
    /// Print the number of matches instead of a page.
    #[arg(long)]
    count: bool,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.log.as_deref()) {
        eprintln!("chainlog: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(cli) {
        eprintln!("chainlog: {}", e);
        std::process::exit(if e.is_integrity_violation() { 2 } else { 1 });
    }
}

/// Structured logging to stderr or a file. Set RUST_LOG=debug for detail.
fn init_logging(path: Option<&Path>) -> ChainlogResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    match path {
        None => builder.compact().with_writer(std::io::stderr).init(),
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| ChainlogError::Config {
                    reason: format!("cannot open log file '{}': {}", path.display(), e),
                })?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
    }
    Ok(())
}

fn run(cli: Cli) -> ChainlogResult<()> {
    let config = match &cli.config {
        Some(path) => ChainlogConfig::from_file(path)?,
        None => ChainlogConfig::default(),
    };

    if let Command::Scenario { keep } = &cli.command {
        return scenario::run_scenario(&config, keep.as_deref());
    }

    // Only admission may create or repair the log.
    let store = match &cli.command {
        Command::Admit(_) => chainlog_store::open_store(&config.store)?,
        _ => chainlog_store::open_store_read_only(&config.store)?,
    };
    info!(chain_id = %store.chain_id(), backend = ?config.store.backend, "chain opened");

    match cli.command {
        Command::Admit(args) => {
            let gateway = AdmissionGateway::new(store, config.admission.clone());
            let receipt = gateway.admit(args.into_draft()?)?;
            print_receipt(&receipt);
        }
        Command::Verify { from, to } => {
            let range = match (from, to) {
                (Some(from), Some(to)) => VerificationRange::between(from, to),
                _ => VerificationRange::Full,
            };
            let result = IntegrityVerifier::new(store).verify(&range)?;
            print_verification(&result);
            result.into_result()?;
        }
        Command::Attest => {
            let attestation = IntegrityVerifier::new(store).attest(&VerificationRange::Full)?;
            println!("{}", to_pretty_json(&attestation)?);
        }
        Command::Query(args) => {
            let count_only = args.count;
            let query = args.into_query()?;
            let engine = QueryEngine::new(store, config.query.clone());
            if count_only {
                println!("{}", engine.count(&query)?);
            } else {
                let page = engine.query(&query)?;
                for committed in &page.events {
                    print_event_line(committed);
                }
                match page.next_cursor {
                    Some(cursor) => println!("next cursor: {}", cursor.encode()),
                    None => println!("({} events, end of results)", page.events.len()),
                }
            }
        }
        Command::Show { id } => {
            let id = parse_event_id(&id)?;
            let engine = QueryEngine::new(store, config.query.clone());
            let committed = engine.get(&id)?;
            let recomputed = engine.recompute_hash(&id)?;
            println!("{}", to_pretty_json(&committed)?);
            if recomputed == committed.event.event_hash {
                println!("stored hash matches recomputed hash");
            } else {
                println!("HASH MISMATCH: recomputed {}", recomputed);
            }
        }
        Command::Head => {
            let head = store.head_state()?;
            println!("chain:  {}", store.chain_id());
            println!("events: {}", head.len);
            println!("head:   {}", head.hash);
        }
        Command::Scenario { .. } => {}
    }
    Ok(())
}

// ── Argument conversion ───────────────────────────────────────────────────────

impl AdmitArgs {
    fn into_draft(self) -> ChainlogResult<EventDraft> {
        if let Some(path) = &self.json {
            let text = read_input(path)?;
            return serde_json::from_str(&text)
                .map_err(|e| ChainlogError::validation(format!("invalid event draft JSON: {}", e)));
        }

        let required = |field: Option<String>, name: &str| {
            field.ok_or_else(|| ChainlogError::validation(format!("--{} is required", name)))
        };
        let mut draft = EventDraft::new(
            required(self.event_type, "event-type")?,
            required(self.action, "action")?,
            required(self.resource_type, "resource-type")?,
            required(self.resource_id, "resource-id")?,
            parse_outcome(&self.outcome)?,
        );
        draft.actor = self.actor;
        draft.outcome_detail = self.outcome_detail;
        draft.request_correlation_id = self.correlation_id;
        draft.client.ip_address = self.ip;
        draft.client.user_agent = self.user_agent;
        if let Some(details) = &self.details {
            draft.details = serde_json::from_str(details)
                .map_err(|e| ChainlogError::validation(format!("--details is not valid JSON: {}", e)))?;
        }
        if let Some(ts) = &self.timestamp {
            draft.timestamp = Some(parse_time(ts)?);
        }
        Ok(draft)
    }
}

impl QueryArgs {
    fn into_query(self) -> ChainlogResult<EventQuery> {
        let mut query = EventQuery::new();
        query.event_types = self.event_types;
        query.actor = self.actor;
        query.resource_type = self.resource_type;
        query.resource_id = self.resource_id;
        query.request_correlation_id = self.correlation_id;
        query.limit = self.limit;
        if let Some(outcome) = &self.outcome {
            query.outcome = Some(parse_outcome(outcome)?);
        }
        if let Some(since) = &self.since {
            query.start_time = Some(parse_time(since)?);
        }
        if let Some(until) = &self.until {
            query.end_time = Some(parse_time(until)?);
        }
        for spec in &self.details {
            let (path, raw) = spec.split_once('=').ok_or_else(|| {
                ChainlogError::validation(format!("--details '{}' must look like path=value", spec))
            })?;
            // Bare words are matched as JSON strings.
            let value = serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
            query = query.with_details_match(path, value);
        }
        if self.asc {
            query = query.ascending();
        }
        if let Some(cursor) = &self.cursor {
            let cursor = PageCursor::decode(cursor)
                .ok_or_else(|| ChainlogError::validation(format!("malformed cursor '{}'", cursor)))?;
            query = query.with_cursor(cursor);
        }
        Ok(query)
    }
}

fn parse_outcome(s: &str) -> ChainlogResult<Outcome> {
    Outcome::parse(s).ok_or_else(|| {
        ChainlogError::validation(format!(
            "unknown outcome '{}' (expected success, failure or partial_success)",
            s
        ))
    })
}

fn parse_time(s: &str) -> ChainlogResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ChainlogError::validation(format!("'{}' is not an RFC 3339 timestamp: {}", s, e)))
}

fn parse_event_id(s: &str) -> ChainlogResult<EventId> {
    EventId::parse(s).ok_or_else(|| ChainlogError::validation(format!("'{}' is not an event id", s)))
}

fn read_input(path: &Path) -> ChainlogResult<String> {
    let mut text = String::new();
    if path == Path::new("-") {
        std::io::stdin()
            .read_to_string(&mut text)
            .map_err(|e| ChainlogError::validation(format!("cannot read stdin: {}", e)))?;
    } else {
        text = std::fs::read_to_string(path)
            .map_err(|e| ChainlogError::validation(format!("cannot read '{}': {}", path.display(), e)))?;
    }
    Ok(text)
}

// ── Output ────────────────────────────────────────────────────────────────────

fn to_pretty_json<T: serde::Serialize>(value: &T) -> ChainlogResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ChainlogError::storage(format!("failed to render JSON: {}", e)))
}

fn print_receipt(receipt: &AdmissionReceipt) {
    println!("admitted {} to chain '{}'", receipt.id, receipt.chain_id);
    println!("  position:      {}", receipt.position);
    println!("  previous_hash: {}", receipt.previous_hash);
    println!("  event_hash:    {}", receipt.event_hash);
    println!("  attempts:      {}", receipt.attempts);
}

fn print_verification(result: &VerificationResult) {
    match &result.failure {
        None => {
            println!(
                "chain '{}' intact: {} events verified from position {}",
                result.chain_id, result.verified_count, result.start_position
            );
            println!("  tail: {}", result.tail_hash);
        }
        Some(f) => {
            println!("chain '{}' BROKEN at position {}: {}", result.chain_id, f.position, f.kind);
            if let Some(id) = f.event_id {
                println!("  event:    {}", id);
            }
            println!("  expected: {}", f.expected);
            println!("  found:    {}", f.found);
            println!("  {} events verified before the break", result.verified_count);
        }
    }
}

fn print_event_line(committed: &CommittedEvent) {
    let e = &committed.event;
    println!(
        "#{:<6} {}  {:<20} {:<12} {} {}/{} [{}]  {}",
        committed.position,
        e.timestamp.to_rfc3339(),
        e.event_type,
        e.actor.as_deref().unwrap_or("-"),
        e.action,
        e.resource_type,
        e.resource_id,
        e.outcome.as_str(),
        e.id
    );
}

//! # chainlog-verify
//!
//! Tamper detection for chainlog chains.
//!
//! This crate provides [`engine::IntegrityVerifier`], which re-walks a
//! committed range of a chain and recomputes every hash link. It reports
//! the first broken link and the length of the prefix that still verifies.
//! Attestations over clean ranges let export jobs carry a commitment to the
//! exact events they shipped.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use chainlog_contracts::verify::VerificationRange;
//! use chainlog_verify::IntegrityVerifier;
//!
//! let verifier = IntegrityVerifier::new(store);
//! let result = verifier.verify(&VerificationRange::Full)?;
//! if let Some(failure) = &result.failure {
//!     eprintln!("{} at position {}", failure.kind, failure.position);
//! }
//! ```

pub mod engine;

pub use engine::IntegrityVerifier;

// ── Tests ─────────────────────────────────────────────────────────────────────

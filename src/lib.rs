//! Trackwork - issue tracking and reconciliation for code-quality analyses
//!
//! Trackwork reconciles the issues found by a fresh source-code analysis
//! ("raw" issues) with the issues already known for the project ("base"
//! issues), across the branch topologies a code-quality server supports:
//! main branches, long-lived branches, pull requests, and reference-branch
//! "new code" comparisons. Issue identity — key, history, assignment,
//! resolution — survives line shifts, file moves, and partial analyses;
//! matched closed issues reopen under their old identity and unmatched
//! base issues close.
//!
//! # Architecture
//!
//! The codebase follows a strict layered architecture:
//!
//! - [`core`] - Domain types: issues, rule keys, hash sequences, settings
//! - [`tracking`] - The matching engine (exact / same-line / block
//!   strategies over line- and block-hash sequences)
//! - [`analysis`] - Per-branch orchestration, issue lifecycle, new-code
//!   classification, creation-date backdating
//! - [`store`] - Narrow trait seams to persistence, rules, SCM, the scan
//!   report, and the issue workflow
//!
//! # Correctness Invariants
//!
//! Trackwork maintains the following invariants:
//!
//! 1. An issue's key is assigned once and never changes
//! 2. Every raw and base issue participates in at most one match
//! 3. Change history is append-only; merges record diffs, never rewrite
//! 4. A tracking with unmatched raws is incomplete until the closed-issue
//!    pass has run (or no base exists, as on first analysis)

pub mod analysis;
pub mod core;
pub mod store;
pub mod tracking;

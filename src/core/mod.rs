//! core
//!
//! Core domain types and settings for trackwork.
//!
//! # Modules
//!
//! - [`types`] - Strong types: RuleKey, IssueKey, BranchName
//! - [`issue`] - The issue record, statuses, impacts, change history
//! - [`hashes`] - Line and block hash sequences for content matching
//! - [`config`] - Analysis settings and loading
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Issues are plain value structs; all mutation happens through the
//!   lifecycle transformation functions and is recorded as field diffs
//! - Hashing ignores whitespace so formatting churn never breaks identity

pub mod config;
pub mod hashes;
pub mod issue;
pub mod types;

//! core::issue
//!
//! The issue record and its satellite value types.
//!
//! # Overview
//!
//! An [`Issue`] is the unit everything in this crate reconciles: raw issues
//! come out of the current scan without identity, base issues come out of
//! storage with identity and history. Tracking decides which raw issue is
//! which base issue; the lifecycle functions then move identity, state, and
//! history from one onto the other.
//!
//! # Invariants
//!
//! - `key` is assigned at most once ([`Issue::set_key`] aborts on a second
//!   assignment); matched issues inherit the base key instead of minting a
//!   new one
//! - `changes` is append-only; lifecycle operations record what they did as
//!   [`FieldDiffs`] entries and never rewrite history
//!
//! # Example
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use trackwork::core::issue::{Issue, IssueStatus};
//! use trackwork::core::types::RuleKey;
//!
//! let rule = RuleKey::parse("java:S1135").unwrap();
//! let date = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
//! let mut issue = Issue::new(rule, "file-uuid", date);
//! issue.line = Some(42);
//! assert_eq!(issue.status, IssueStatus::Open);
//! assert!(issue.key().is_none());
//! ```

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::{IssueKey, RuleKey};

/// Well-known field names used in change history diffs.
pub mod field {
    pub const SEVERITY: &str = "severity";
    pub const LINE: &str = "line";
    pub const MESSAGE: &str = "message";
    pub const EFFORT: &str = "effort";
    pub const LOCATIONS: &str = "locations";
    pub const CLEAN_CODE_ATTRIBUTE: &str = "clean_code_attribute";
    pub const IMPACT_SEVERITY: &str = "impact_severity";
    pub const STATUS: &str = "status";
    pub const RESOLUTION: &str = "resolution";
    /// Provenance marker recording which branch or pull request an issue
    /// was copied from.
    pub const FROM_BRANCH: &str = "from_branch";
}

/// Workflow status of an issue.
///
/// `ToReview` / `Reviewed` are the security-hotspot statuses; all other
/// variants belong to the regular issue workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueStatus {
    Open,
    Confirmed,
    Reopened,
    Resolved,
    Closed,
    ToReview,
    Reviewed,
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::Open => "OPEN",
            IssueStatus::Confirmed => "CONFIRMED",
            IssueStatus::Reopened => "REOPENED",
            IssueStatus::Resolved => "RESOLVED",
            IssueStatus::Closed => "CLOSED",
            IssueStatus::ToReview => "TO_REVIEW",
            IssueStatus::Reviewed => "REVIEWED",
        }
    }
}

impl std::fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolution of a non-open issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Resolution {
    Fixed,
    FalsePositive,
    WontFix,
    Removed,
    Safe,
    Acknowledged,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Fixed => "FIXED",
            Resolution::FalsePositive => "FALSE_POSITIVE",
            Resolution::WontFix => "WONTFIX",
            Resolution::Removed => "REMOVED",
            Resolution::Safe => "SAFE",
            Resolution::Acknowledged => "ACKNOWLEDGED",
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule-assigned severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Minor,
    Major,
    Critical,
    Blocker,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Minor => "MINOR",
            Severity::Major => "MAJOR",
            Severity::Critical => "CRITICAL",
            Severity::Blocker => "BLOCKER",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Software quality axis an issue impacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SoftwareQuality {
    Maintainability,
    Reliability,
    Security,
}

/// Severity of an impact on one software quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImpactSeverity {
    Info,
    Low,
    Medium,
    High,
    Blocker,
}

/// Clean-code attribute attached to a rule and carried on its issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CleanCodeAttribute {
    Clear,
    Complete,
    Conventional,
    Distinct,
    Efficient,
    Focused,
    Formatted,
    Identifiable,
    Logical,
    Lawful,
    Modular,
    Respectful,
    Tested,
    Trustworthy,
}

/// A line span inside one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRange {
    pub start_line: u32,
    pub end_line: u32,
}

impl TextRange {
    pub fn new(start_line: u32, end_line: u32) -> Self {
        Self {
            start_line,
            end_line,
        }
    }

    pub fn at_line(line: u32) -> Self {
        Self::new(line, line)
    }
}

/// One secondary location of an issue.
///
/// `component_uuid` is `None` when the location sits in the same file as
/// the issue's primary location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueLocation {
    pub component_uuid: Option<String>,
    pub text_range: Option<TextRange>,
    pub message: Option<String>,
}

impl IssueLocation {
    pub fn in_same_file(range: TextRange) -> Self {
        Self {
            component_uuid: None,
            text_range: Some(range),
            message: None,
        }
    }

    pub fn in_file(component_uuid: impl Into<String>, range: TextRange) -> Self {
        Self {
            component_uuid: Some(component_uuid.into()),
            text_range: Some(range),
            message: None,
        }
    }
}

/// An ordered execution-flow of secondary locations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flow {
    pub locations: Vec<IssueLocation>,
}

impl Flow {
    pub fn of(locations: Vec<IssueLocation>) -> Self {
        Self { locations }
    }
}

/// Old/new values of one changed field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// One change-history entry: every field that changed in one operation.
///
/// Entries are appended to [`Issue::changes`] and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDiffs {
    /// Key of the issue this entry belongs to. Re-keyed when history is
    /// copied onto another issue.
    pub issue_key: Option<IssueKey>,
    /// User who triggered the change, if any.
    pub user: Option<String>,
    pub creation_date: DateTime<Utc>,
    diffs: BTreeMap<String, Diff>,
}

impl FieldDiffs {
    pub fn new(creation_date: DateTime<Utc>) -> Self {
        Self {
            issue_key: None,
            user: None,
            creation_date,
            diffs: BTreeMap::new(),
        }
    }

    /// Record old/new values for one field, replacing a previous diff of
    /// the same field within this entry.
    pub fn set_diff(
        &mut self,
        field: &str,
        old_value: Option<String>,
        new_value: Option<String>,
    ) -> &mut Self {
        self.diffs.insert(
            field.to_string(),
            Diff {
                old_value,
                new_value,
            },
        );
        self
    }

    pub fn diff(&self, field: &str) -> Option<&Diff> {
        self.diffs.get(field)
    }

    pub fn diffs(&self) -> &BTreeMap<String, Diff> {
        &self.diffs
    }

    pub fn is_empty(&self) -> bool {
        self.diffs.is_empty()
    }
}

/// A user comment attached to an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueComment {
    pub issue_key: Option<IssueKey>,
    pub user: Option<String>,
    pub markdown: String,
    pub created_at: DateTime<Utc>,
}

/// The issue record.
///
/// A plain value struct: every field except `key` is public and mutated by
/// the lifecycle transformation functions in `analysis::lifecycle`. Flags
/// describe the issue's situation within the current analysis only and are
/// never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    key: Option<IssueKey>,
    pub rule_key: RuleKey,
    /// File (or other component) the issue's primary location sits in.
    pub component_uuid: String,
    pub component_key: Option<String>,
    pub status: IssueStatus,
    pub resolution: Option<Resolution>,
    pub severity: Option<Severity>,
    /// A user overrode the severity; scanned severity must not win over it.
    pub manual_severity: bool,
    pub message: Option<String>,
    pub line: Option<u32>,
    /// Whitespace-insensitive hash of the issue's text range.
    pub checksum: Option<String>,
    pub assignee: Option<String>,
    pub author: Option<String>,
    pub tags: BTreeSet<String>,
    pub effort_minutes: Option<i64>,
    pub creation_date: DateTime<Utc>,
    pub update_date: Option<DateTime<Utc>>,
    pub close_date: Option<DateTime<Utc>>,
    pub clean_code_attribute: Option<CleanCodeAttribute>,
    pub impacts: BTreeMap<SoftwareQuality, ImpactSeverity>,
    pub flows: Vec<Flow>,
    pub changes: Vec<FieldDiffs>,
    pub comments: Vec<IssueComment>,

    /// First seen in this analysis.
    pub is_new: bool,
    /// Seeded from another branch rather than detected here.
    pub is_copied: bool,
    /// Has a location on a line changed relative to the comparison base.
    pub is_on_changed_line: bool,
    /// Counted as new code by the reference-branch comparison.
    pub is_new_code_reference_issue: bool,
    /// Was counted as new code by the reference branch, no longer overlaps.
    pub is_no_longer_new_code_reference_issue: bool,
    /// Locations differ from what was previously persisted.
    pub locations_changed: bool,
    /// State differs from what was previously persisted; must be spooled.
    pub changed: bool,
    /// Unmatched base issue on its way to CLOSED.
    pub being_closed: bool,
}

impl Issue {
    /// Create a fresh, keyless issue as the scanner reports it.
    pub fn new(
        rule_key: RuleKey,
        component_uuid: impl Into<String>,
        creation_date: DateTime<Utc>,
    ) -> Self {
        Self {
            key: None,
            rule_key,
            component_uuid: component_uuid.into(),
            component_key: None,
            status: IssueStatus::Open,
            resolution: None,
            severity: None,
            manual_severity: false,
            message: None,
            line: None,
            checksum: None,
            assignee: None,
            author: None,
            tags: BTreeSet::new(),
            effort_minutes: None,
            creation_date,
            update_date: None,
            close_date: None,
            clean_code_attribute: None,
            impacts: BTreeMap::new(),
            flows: Vec::new(),
            changes: Vec::new(),
            comments: Vec::new(),
            is_new: false,
            is_copied: false,
            is_on_changed_line: false,
            is_new_code_reference_issue: false,
            is_no_longer_new_code_reference_issue: false,
            locations_changed: false,
            changed: false,
            being_closed: false,
        }
    }

    /// The issue's identity, if already assigned.
    pub fn key(&self) -> Option<&IssueKey> {
        self.key.as_ref()
    }

    /// Assign the issue's identity.
    ///
    /// # Panics
    ///
    /// Panics if a key was already assigned — identity is immutable, and a
    /// second assignment is a programming error that must abort the task.
    pub fn set_key(&mut self, key: IssueKey) {
        assert!(
            self.key.is_none(),
            "issue key is immutable once assigned (was {}, tried {})",
            self.key.as_ref().map(ToString::to_string).unwrap_or_default(),
            key
        );
        self.key = Some(key);
    }

    /// All lines the issue touches inside the given file: the primary line
    /// when the file is the issue's own, plus every flow location either
    /// unqualified (same file) or explicitly in that file.
    pub fn lines_in_component(&self, component_uuid: &str) -> Vec<u32> {
        let mut lines = Vec::new();
        if self.component_uuid == component_uuid {
            if let Some(line) = self.line {
                lines.push(line);
            }
        }
        for flow in &self.flows {
            for location in &flow.locations {
                let in_component = match &location.component_uuid {
                    Some(uuid) => uuid == component_uuid,
                    None => self.component_uuid == component_uuid,
                };
                if !in_component {
                    continue;
                }
                if let Some(range) = &location.text_range {
                    lines.extend(range.start_line..=range.end_line);
                }
            }
        }
        lines.sort_unstable();
        lines.dedup();
        lines
    }

    /// Uuids of all other files referenced by flow locations.
    pub fn other_component_uuids(&self) -> BTreeSet<&str> {
        self.flows
            .iter()
            .flat_map(|f| f.locations.iter())
            .filter_map(|l| l.component_uuid.as_deref())
            .filter(|uuid| *uuid != self.component_uuid)
            .collect()
    }
}

//! store
//!
//! The single doorway to everything outside the reconciliation engine:
//! issue persistence, rule metadata, SCM blame, scanner report contents,
//! moved-file detection, and the issue workflow.
//!
//! # Architecture
//!
//! Each collaborator is a narrow synchronous trait. The engine never
//! reaches around these seams; hosts plug in database-backed
//! implementations, and the [`memory`] module provides in-memory ones for
//! tests and embedding.
//!
//! Absence is always expressed as `Option` — missing SCM info, an unknown
//! moved-file mapping, or an unresolvable branch component are normal
//! control flow, never errors. The one fatal condition is a rule referenced
//! by an issue that the repository does not know: that signals upstream
//! inconsistency and aborts the analysis.

pub mod memory;

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use thiserror::Error;

use crate::core::issue::{FieldDiffs, Issue};
use crate::core::types::{BranchName, IssueKey, RuleKey};

/// Errors raised at the storage seam.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An issue references a rule the repository does not know. Upstream
    /// data is inconsistent; the analysis must abort.
    #[error("rule {0} not found in rule repository")]
    RuleNotFound(RuleKey),
}

/// Kind of a rule, which decides the initial workflow status of its issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleType {
    CodeSmell,
    Bug,
    Vulnerability,
    SecurityHotspot,
}

/// Rule metadata the engine needs.
#[derive(Debug, Clone)]
pub struct Rule {
    pub key: RuleKey,
    pub rule_type: RuleType,
    /// Scanner plugin that defines the rule, when known.
    pub plugin_key: Option<String>,
    /// Imported from an external analyzer report.
    pub is_external: bool,
    /// Created on the fly from an external report, without server-side
    /// definition.
    pub is_ad_hoc: bool,
}

/// Rule metadata lookup.
pub trait RuleRepository {
    fn find_by_key(&self, key: &RuleKey) -> Option<&Rule>;

    /// Like [`find_by_key`](Self::find_by_key) but missing rules are fatal.
    fn get_by_key(&self, key: &RuleKey) -> Result<&Rule, StoreError> {
        self.find_by_key(key)
            .ok_or_else(|| StoreError::RuleNotFound(key.clone()))
    }
}

/// A rule as activated in the analyzed project's quality profile.
#[derive(Debug, Clone)]
pub struct ActiveRule {
    pub rule_key: RuleKey,
    /// Scanner plugin that provided the activation, when known.
    pub plugin_key: Option<String>,
    /// When the activation was created or last changed.
    pub updated_at: DateTime<Utc>,
    /// Quality profile the activation belongs to.
    pub qprofile_key: Option<String>,
}

/// Active-rule lookup for the analyzed project.
pub trait ActiveRulesHolder {
    fn get(&self, rule_key: &RuleKey) -> Option<&ActiveRule>;
}

/// One scanner plugin installed on the server.
#[derive(Debug, Clone)]
pub struct ScannerPlugin {
    pub key: String,
    pub base_plugin_key: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Installed-plugin lookup.
pub trait ScannerPluginRepository {
    fn plugin(&self, key: &str) -> Option<&ScannerPlugin>;
}

/// Quality-profile change detection relative to the previous analysis.
pub trait QProfileStatusRepository {
    fn has_changed(&self, qprofile_key: &str) -> bool;
}

/// One SCM change of one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Changeset {
    pub date: DateTime<Utc>,
    pub revision: Option<String>,
    pub author: Option<String>,
}

/// Per-line SCM information for one file.
#[derive(Debug, Clone, Default)]
pub struct ScmInfo {
    changesets: BTreeMap<u32, Changeset>,
}

impl ScmInfo {
    pub fn new(changesets: BTreeMap<u32, Changeset>) -> Self {
        Self { changesets }
    }

    pub fn changeset_for_line(&self, line: u32) -> Option<&Changeset> {
        self.changesets.get(&line)
    }

    /// The most recent changeset anywhere in the file.
    pub fn latest_changeset(&self) -> Option<&Changeset> {
        self.changesets.values().max_by_key(|c| c.date)
    }
}

/// SCM blame lookup.
pub trait ScmInfoRepository {
    fn scm_info(&self, component_uuid: &str) -> Option<&ScmInfo>;
}

/// A moved/renamed predecessor of a file component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalFile {
    pub uuid: String,
    pub key: String,
}

/// Moved-file detection results.
pub trait MovedFilesRepository {
    fn original_file(&self, component_uuid: &str) -> Option<&OriginalFile>;
}

/// Lines considered "new code" for one file, per the configured comparison.
pub trait NewLinesRepository {
    /// `None` when no changed-line information exists for the file.
    fn new_lines(&self, component_uuid: &str) -> Option<&BTreeSet<u32>>;
}

/// An issue of a sibling pull request or short-lived branch sharing the
/// same source branch, together with where it came from.
#[derive(Debug, Clone)]
pub struct SiblingIssue {
    pub issue: Issue,
    /// Display name of the origin, e.g. the branch name or `#42` for a PR.
    pub origin_display_name: String,
}

/// Issue persistence.
///
/// Branch-crossing loads resolve through component *keys*, because the same
/// file has a different component uuid on every branch.
pub trait IssueStore {
    /// Non-closed issues of the previous analysis of this branch.
    fn load_open_issues(&self, component_uuid: &str) -> Vec<Issue>;

    /// Closed issues whose close date is at or after the given floor.
    fn load_closed_issues(&self, component_uuid: &str, closed_after: DateTime<Utc>) -> Vec<Issue>;

    /// RESOLVED issues only (already accepted: false positive, won't fix).
    fn load_resolved_issues(&self, component_uuid: &str) -> Vec<Issue>;

    /// Full change history of one issue, oldest first.
    fn load_changes(&self, issue_key: &IssueKey) -> Vec<FieldDiffs>;

    /// Line hashes persisted by the previous analysis of this file.
    fn load_line_hashes(&self, component_uuid: &str) -> Option<Vec<String>>;

    /// Resolve the file's component uuid on another branch, if the file
    /// exists there.
    fn branch_component_uuid(&self, branch: &BranchName, component_key: &str) -> Option<String>;

    /// Confirmed or resolved issues of sibling pull requests that share the
    /// given source branch.
    fn load_sibling_issues(
        &self,
        source_branch: &BranchName,
        component_key: &str,
    ) -> Vec<SiblingIssue>;
}

/// The current scan: file contents and freshly detected issues.
///
/// Report decoding lives behind this seam; the engine only consumes the
/// decoded results.
pub trait ScanReport {
    /// Current source of the file, when it is a file with content.
    fn file_source(&self, component_uuid: &str) -> Option<String>;

    /// Issues the scanner raised on the component.
    fn raw_issues(&self, component_uuid: &str) -> Vec<Issue>;
}

/// Context under which workflow transitions and comments are recorded.
#[derive(Debug, Clone)]
pub struct IssueChangeContext {
    pub date: DateTime<Utc>,
    pub user: Option<String>,
}

/// The issue workflow state machine, invoked at defined points and
/// otherwise opaque to this crate.
pub trait IssueWorkflow {
    /// Apply the automatic transition fitting the issue's situation, e.g.
    /// reopening a matched closed issue or closing an unmatched base.
    fn do_automatic_transition(&self, issue: &mut Issue, context: &IssueChangeContext);

    /// Apply a named manual transition. Returns whether it applied.
    fn do_manual_transition(
        &self,
        issue: &mut Issue,
        transition: &str,
        context: &IssueChangeContext,
    ) -> bool;
}

/// Remediation-effort computation for fresh issues.
pub trait EffortCalculator {
    fn effort_minutes(&self, rule: &Rule, issue: &Issue) -> Option<i64>;
}

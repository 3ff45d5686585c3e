//! analysis::branch
//!
//! What is being analyzed: branch topology, first-analysis state, and the
//! "new code" comparison period.
//!
//! Branch topology is a closed tagged variant so that tracker selection
//! can match on it exhaustively — there is no ordering-dependent chain of
//! boolean checks to get wrong.

use chrono::{DateTime, Utc};

use crate::core::types::BranchName;

/// The branch topology of the current analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchContext {
    /// The project's main branch.
    Main { name: BranchName },
    /// A non-main branch, possibly configured with a reference branch used
    /// to seed its issue history on first analysis.
    Branch {
        name: BranchName,
        reference: Option<BranchName>,
    },
    /// A pull request, analyzed against its own previous analyses and
    /// optionally reconciled with a target branch.
    PullRequest {
        /// Pull request identifier, e.g. `1234`.
        id: String,
        source: BranchName,
        target: Option<BranchName>,
    },
}

impl BranchContext {
    /// Display name used in provenance records.
    pub fn display_name(&self) -> String {
        match self {
            BranchContext::Main { name } => name.to_string(),
            BranchContext::Branch { name, .. } => name.to_string(),
            BranchContext::PullRequest { id, .. } => format!("#{id}"),
        }
    }

    pub fn is_pull_request(&self) -> bool {
        matches!(self, BranchContext::PullRequest { .. })
    }
}

/// How the "new code" period was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodMode {
    /// Last N days before the analysis.
    Days(u32),
    /// Since the previous version event.
    PreviousVersion,
    /// Diff against a reference branch.
    ReferenceBranch,
}

/// The configured "new code" comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Period {
    pub mode: PeriodMode,
    /// Resolved comparison date; `None` for reference-branch periods and
    /// for previous-version periods with no version event yet.
    pub date: Option<DateTime<Utc>>,
    /// Reference branch name, for [`PeriodMode::ReferenceBranch`].
    pub branch: Option<BranchName>,
}

impl Period {
    pub fn days(days: u32, date: DateTime<Utc>) -> Self {
        Self {
            mode: PeriodMode::Days(days),
            date: Some(date),
            branch: None,
        }
    }

    pub fn previous_version(date: Option<DateTime<Utc>>) -> Self {
        Self {
            mode: PeriodMode::PreviousVersion,
            date,
            branch: None,
        }
    }

    pub fn reference_branch(branch: BranchName) -> Self {
        Self {
            mode: PeriodMode::ReferenceBranch,
            date: None,
            branch: Some(branch),
        }
    }

    pub fn is_reference_branch(&self) -> bool {
        self.mode == PeriodMode::ReferenceBranch
    }
}

/// Metadata of the current analysis task.
#[derive(Debug, Clone)]
pub struct AnalysisContext {
    pub branch: BranchContext,
    /// No previous analysis exists for this branch.
    pub is_first_analysis: bool,
    pub analysis_date: DateTime<Utc>,
    /// Date of the previous analysis of this branch, when one exists.
    pub previous_analysis_date: Option<DateTime<Utc>>,
    /// The "new code" comparison, when one is configured.
    pub period: Option<Period>,
}

impl AnalysisContext {
    pub fn is_pull_request(&self) -> bool {
        self.branch.is_pull_request()
    }
}

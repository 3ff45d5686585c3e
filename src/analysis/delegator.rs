//! analysis::delegator
//!
//! Picks the one tracker execution that fits the current analysis.
//!
//! Selection matches exhaustively on the branch topology:
//!
//! - pull request ⇒ pull-request execution
//! - first analysis of a branch with a configured reference ⇒
//!   reference-branch execution (seed history from the reference)
//! - everything else (main branch, later branch analyses, branches
//!   without a reference) ⇒ base execution

use tracing::debug;

use super::branch::{AnalysisContext, BranchContext};
use super::component::Component;
use super::executions::{
    BaseTrackerExecution, PullRequestTrackerExecution, ReferenceBranchTrackerExecution,
    TrackingOutcome,
};
use crate::core::issue::Issue;
use crate::tracking::Input;

/// Per-analysis tracker selection.
pub struct IssueTrackingDelegator<'a> {
    ctx: &'a AnalysisContext,
    base: BaseTrackerExecution<'a>,
    reference: ReferenceBranchTrackerExecution<'a>,
    pull_request: PullRequestTrackerExecution<'a>,
}

impl<'a> IssueTrackingDelegator<'a> {
    pub fn new(
        ctx: &'a AnalysisContext,
        base: BaseTrackerExecution<'a>,
        reference: ReferenceBranchTrackerExecution<'a>,
        pull_request: PullRequestTrackerExecution<'a>,
    ) -> Self {
        Self {
            ctx,
            base,
            reference,
            pull_request,
        }
    }

    /// Run the execution fitting the branch topology on one component.
    pub fn track(&self, component: &Component, raw_input: Input<Issue>) -> TrackingOutcome {
        match &self.ctx.branch {
            BranchContext::PullRequest { target, .. } => {
                debug!(component = %component.uuid, "tracking as pull request");
                self.pull_request.track(target.as_ref(), component, raw_input)
            }
            BranchContext::Branch {
                reference: Some(reference),
                ..
            } if self.ctx.is_first_analysis => {
                debug!(
                    component = %component.uuid,
                    reference = reference.as_str(),
                    "first analysis, seeding from reference branch"
                );
                self.reference.track(reference, component, raw_input)
            }
            BranchContext::Main { .. } | BranchContext::Branch { .. } => {
                self.base.track(component, raw_input)
            }
        }
    }
}

//! analysis
//!
//! Orchestrates issue reconciliation for one analysis task: walk the
//! component tree post-order, pick the right tracker for the branch
//! topology, apply lifecycle mutations to matched and unmatched issues,
//! and spool everything that needs persisting.
//!
//! # Modules
//!
//! - [`branch`] - Branch topology, first-analysis state, period
//! - [`component`] - Component tree and post-order traversal
//! - [`loader`] - Input supply (base, closed, branch, raw)
//! - [`executions`] - Per-topology tracker executions
//! - [`delegator`] - Execution selection
//! - [`lifecycle`] - Issue state transitions
//! - [`classifier`] - New-code classification
//! - [`creation_date`] - Backdating of rule-change-driven issues
//!
//! # Control Flow
//!
//! ```text
//! walk_post_order
//!   └─ per component: raw input → delegator → TrackingOutcome
//!        ├─ matched pairs   → merge / copy / reopen
//!        ├─ unmatched raws  → init new → backdate → sibling merge
//!        ├─ all raws        → new-code reclassification
//!        └─ unmatched bases → close → spool
//! ```
//!
//! # Concurrency
//!
//! Everything here is single-threaded per analysis task. Inputs are built
//! and consumed within one component's visit; no component is revisited.

pub mod branch;
pub mod classifier;
pub mod component;
pub mod creation_date;
pub mod delegator;
pub mod executions;
pub mod lifecycle;
pub mod loader;

pub use branch::{AnalysisContext, BranchContext, Period, PeriodMode};
pub use classifier::NewIssueClassifier;
pub use component::{walk_post_order, Component, ComponentKind, FileStatus};
pub use creation_date::IssueCreationDateCalculator;
pub use delegator::IssueTrackingDelegator;
pub use executions::{
    BaseTrackerExecution, IssueMatch, MatchOrigin, PullRequestTrackerExecution,
    ReferenceBranchTrackerExecution, SourceBranchMerger, TrackingOutcome,
};
pub use lifecycle::IssueLifecycle;
pub use loader::{
    BaseInputFactory, BranchInputFactory, ClosedIssuesInputFactory, ComponentIssuesLoader,
    RawInputFactory,
};

use thiserror::Error;
use tracing::debug;

use crate::core::issue::Issue;
use crate::store::{IssueStore, StoreError};
use crate::tracking::Input;

/// Errors that abort an analysis task.
#[derive(Debug, Error)]
pub enum TrackingError {
    /// Upstream data inconsistency surfaced at the storage seam.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A matched base issue came without a key; stored issues always have
    /// one, so the input data is corrupt.
    #[error("cannot merge from a base issue without a key")]
    BaseIssueWithoutKey,

    /// Provenance copying was attempted outside a pull-request analysis.
    #[error("issues can only be copied from another branch in a pull-request analysis")]
    NotAPullRequest,

    /// A reference-branch match was produced without a configured
    /// reference branch.
    #[error("reference-branch tracking requires a configured reference branch")]
    MissingReferenceBranch,
}

/// Append-only sink of issues that must be persisted: new issues, changed
/// issues, and bases on their way to CLOSED. Unchanged matched issues are
/// never re-emitted.
#[derive(Debug, Default)]
pub struct IssueSpool {
    issues: Vec<Issue>,
}

impl IssueSpool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, issue: Issue) {
        self.issues.push(issue);
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter()
    }

    pub fn into_issues(self) -> Vec<Issue> {
        self.issues
    }
}

/// Drives reconciliation over a component tree and collects the spool.
pub struct IssueReconciler<'a> {
    ctx: &'a AnalysisContext,
    raw_factory: &'a RawInputFactory<'a>,
    delegator: &'a IssueTrackingDelegator<'a>,
    lifecycle: &'a IssueLifecycle<'a>,
    classifier: &'a NewIssueClassifier<'a>,
    creation_dates: &'a IssueCreationDateCalculator<'a>,
    store: &'a dyn IssueStore,
    spool: IssueSpool,
}

impl<'a> IssueReconciler<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: &'a AnalysisContext,
        raw_factory: &'a RawInputFactory<'a>,
        delegator: &'a IssueTrackingDelegator<'a>,
        lifecycle: &'a IssueLifecycle<'a>,
        classifier: &'a NewIssueClassifier<'a>,
        creation_dates: &'a IssueCreationDateCalculator<'a>,
        store: &'a dyn IssueStore,
    ) -> Self {
        Self {
            ctx,
            raw_factory,
            delegator,
            lifecycle,
            classifier,
            creation_dates,
            store,
            spool: IssueSpool::new(),
        }
    }

    /// Reconcile every component of the tree, post-order.
    pub fn process_tree(&mut self, root: &Component) -> Result<(), TrackingError> {
        walk_post_order(root, &mut |component| self.process_component(component))
    }

    /// Issues collected so far for persistence.
    pub fn spool(&self) -> &IssueSpool {
        &self.spool
    }

    pub fn into_spool(self) -> IssueSpool {
        self.spool
    }

    fn process_component(&mut self, component: &Component) -> Result<(), TrackingError> {
        let raw_input: Input<Issue> = self.raw_factory.create(component);
        let outcome = self.delegator.track(component, raw_input);
        let TrackingOutcome {
            mut raws,
            matches,
            unmatched_bases,
        } = outcome;

        let mut matched = vec![false; raws.len()];
        for m in &matches {
            matched[m.raw_index] = true;
            let raw = &mut raws[m.raw_index];
            match m.origin {
                MatchOrigin::Base => {
                    self.lifecycle.merge_existing_open_issue(raw, &m.base)?;
                }
                MatchOrigin::Closed => {
                    self.lifecycle.merge_existing_open_issue(raw, &m.base)?;
                    self.lifecycle.do_automatic_transition(raw);
                }
                MatchOrigin::Reference => {
                    let reference = match &self.ctx.branch {
                        BranchContext::Branch {
                            reference: Some(reference),
                            ..
                        } => reference,
                        _ => return Err(TrackingError::MissingReferenceBranch),
                    };
                    self.lifecycle
                        .copy_existing_open_issue_from_branch(raw, &m.base, reference)?;
                }
            }
        }

        for (idx, raw) in raws.iter_mut().enumerate() {
            if matched[idx] {
                continue;
            }
            self.lifecycle.init_new_open_issue(raw)?;
            self.creation_dates.calculate(component, raw)?;
        }

        if let BranchContext::PullRequest { source, .. } = &self.ctx.branch {
            let merger = SourceBranchMerger::new(self.store, self.lifecycle);
            merger.try_merge_from_siblings(component, source, &mut raws)?;
        }

        for raw in &mut raws {
            self.classifier.reclassify_reference_issue(component, raw);
        }

        let mut spooled = 0usize;
        for raw in raws {
            if raw.is_new || raw.changed || raw.is_copied || raw.locations_changed {
                self.spool.append(raw);
                spooled += 1;
            }
        }
        for mut base in unmatched_bases {
            base.being_closed = true;
            self.lifecycle.do_automatic_transition(&mut base);
            self.spool.append(base);
            spooled += 1;
        }
        if spooled > 0 {
            debug!(component = %component.uuid, spooled, "component reconciled");
        }
        Ok(())
    }
}

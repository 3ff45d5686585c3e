//! analysis::lifecycle
//!
//! Applies tracking results to issues: initializing new ones, merging
//! matched base state into raw ones, copying provenance across branch and
//! pull-request boundaries, and delegating workflow transitions.
//!
//! # Invariants
//!
//! - Merging transfers the base issue's key onto the raw issue; new keys
//!   are minted only for genuinely new issues and cross-branch copies
//! - Every recorded change appends a [`FieldDiffs`] entry; history is
//!   never rewritten
//! - Copying provenance from a source branch is only legal in a
//!   pull-request analysis — elsewhere it is a programming error
//!
//! The functions mutate the passed issue and return the applied diffs
//! where relevant. Callers are responsible for only invoking them on
//! tracking-matched pairs.

use tracing::trace;

use super::branch::AnalysisContext;
use super::TrackingError;
use crate::core::issue::{
    field, CleanCodeAttribute, FieldDiffs, Issue, IssueComment, IssueStatus, SoftwareQuality,
};
use crate::core::types::{BranchName, IssueKey};
use crate::store::{
    EffortCalculator, IssueChangeContext, IssueWorkflow, RuleRepository, RuleType,
};

/// Issue state transitions for one analysis.
pub struct IssueLifecycle<'a> {
    ctx: &'a AnalysisContext,
    rules: &'a dyn RuleRepository,
    effort: &'a dyn EffortCalculator,
    workflow: &'a dyn IssueWorkflow,
    change_context: IssueChangeContext,
}

impl<'a> IssueLifecycle<'a> {
    pub fn new(
        ctx: &'a AnalysisContext,
        rules: &'a dyn RuleRepository,
        effort: &'a dyn EffortCalculator,
        workflow: &'a dyn IssueWorkflow,
    ) -> Self {
        let change_context = IssueChangeContext {
            date: ctx.analysis_date,
            user: None,
        };
        Self {
            ctx,
            rules,
            effort,
            workflow,
            change_context,
        }
    }

    /// Turn an unmatched raw issue into a brand-new open issue.
    ///
    /// # Errors
    ///
    /// Returns [`TrackingError::Store`] when the issue's rule is unknown —
    /// that is fatal, the analysis must abort.
    pub fn init_new_open_issue(&self, issue: &mut Issue) -> Result<(), TrackingError> {
        let rule = self.rules.get_by_key(&issue.rule_key)?;
        issue.set_key(IssueKey::generate());
        issue.creation_date = self.ctx.analysis_date;
        issue.update_date = Some(self.ctx.analysis_date);
        issue.status = match rule.rule_type {
            RuleType::SecurityHotspot => IssueStatus::ToReview,
            _ => IssueStatus::Open,
        };
        issue.effort_minutes = self.effort.effort_minutes(rule, issue);
        issue.is_new = true;
        trace!(key = %issue.key().map(ToString::to_string).unwrap_or_default(), "initialized new issue");
        Ok(())
    }

    /// Merge a matched base issue's identity and state into the raw issue.
    ///
    /// The raw issue keeps its freshly scanned values; where they differ
    /// from the base's, a field diff (old = base, new = scanned) is
    /// recorded. A manual severity on the base wins over the scanned
    /// severity and suppresses the severity diff.
    ///
    /// # Errors
    ///
    /// Returns [`TrackingError::BaseIssueWithoutKey`] when the base issue
    /// has no key — matched base issues always come from storage, so this
    /// signals corrupted input.
    pub fn merge_existing_open_issue(
        &self,
        raw: &mut Issue,
        base: &Issue,
    ) -> Result<FieldDiffs, TrackingError> {
        let base_key = base.key().copied().ok_or(TrackingError::BaseIssueWithoutKey)?;
        raw.set_key(base_key);
        raw.is_new = false;
        if base.changed {
            raw.changed = true;
        }
        // A moved file leaves the raw issue on a different component than
        // the stored one; the new location must be persisted.
        if raw.component_uuid != base.component_uuid {
            raw.changed = true;
        }
        raw.creation_date = base.creation_date;
        raw.update_date = base.update_date;
        raw.close_date = base.close_date;
        raw.status = base.status;
        raw.resolution = base.resolution;
        raw.assignee = base.assignee.clone();
        raw.tags = base.tags.clone();
        raw.is_new_code_reference_issue = base.is_new_code_reference_issue;
        if raw.author.is_none() {
            raw.author = base.author.clone();
        }

        let mut diffs = FieldDiffs::new(self.change_context.date);
        diffs.issue_key = Some(base_key);
        diffs.user = self.change_context.user.clone();

        if base.manual_severity {
            raw.manual_severity = true;
            raw.severity = base.severity;
        } else if raw.severity != base.severity {
            diffs.set_diff(
                field::SEVERITY,
                base.severity.map(|s| s.as_str().to_string()),
                raw.severity.map(|s| s.as_str().to_string()),
            );
        }
        if raw.line != base.line {
            diffs.set_diff(
                field::LINE,
                base.line.map(|l| l.to_string()),
                raw.line.map(|l| l.to_string()),
            );
        }
        if raw.message != base.message {
            diffs.set_diff(field::MESSAGE, base.message.clone(), raw.message.clone());
        }
        if raw.effort_minutes != base.effort_minutes {
            diffs.set_diff(
                field::EFFORT,
                base.effort_minutes.map(|e| e.to_string()),
                raw.effort_minutes.map(|e| e.to_string()),
            );
        }
        if raw.flows != base.flows {
            diffs.set_diff(field::LOCATIONS, None, None);
            raw.locations_changed = true;
        }
        if raw.clean_code_attribute != base.clean_code_attribute {
            diffs.set_diff(
                field::CLEAN_CODE_ATTRIBUTE,
                base.clean_code_attribute.map(attribute_str),
                raw.clean_code_attribute.map(attribute_str),
            );
        }
        for (quality, base_severity) in &base.impacts {
            if let Some(raw_severity) = raw.impacts.get(quality) {
                if raw_severity != base_severity {
                    diffs.set_diff(
                        &impact_field(*quality),
                        Some(format!("{base_severity:?}").to_uppercase()),
                        Some(format!("{raw_severity:?}").to_uppercase()),
                    );
                }
            }
        }

        if !diffs.is_empty() {
            raw.changed = true;
            raw.changes.push(diffs.clone());
        }
        Ok(diffs)
    }

    /// Seed an issue matched on the reference branch into this branch.
    ///
    /// The issue gets a fresh key (keys are unique per branch) but carries
    /// the reference issue's full state and history, plus a provenance
    /// diff recording where it came from.
    pub fn copy_existing_open_issue_from_branch(
        &self,
        raw: &mut Issue,
        base: &Issue,
        from_branch: &BranchName,
    ) -> Result<(), TrackingError> {
        raw.set_key(IssueKey::generate());
        raw.is_new = false;
        raw.is_copied = true;
        raw.changed = true;
        self.copy_attributes(raw, base);
        self.append_provenance(raw, from_branch.as_str());
        Ok(())
    }

    /// Seed an issue from the pull request's source branch.
    ///
    /// # Errors
    ///
    /// Returns [`TrackingError::NotAPullRequest`] outside a pull-request
    /// analysis.
    pub fn copy_existing_issue_from_source_branch_to_pull_request(
        &self,
        raw: &mut Issue,
        base: &Issue,
        source_display_name: &str,
    ) -> Result<(), TrackingError> {
        if !self.ctx.is_pull_request() {
            return Err(TrackingError::NotAPullRequest);
        }
        raw.set_key(IssueKey::generate());
        raw.is_new = false;
        raw.is_copied = true;
        raw.changed = true;
        self.copy_attributes(raw, base);
        self.append_provenance(raw, source_display_name);
        Ok(())
    }

    /// Copy confirmed/resolved state from a sibling branch or pull request
    /// onto a newly created issue.
    ///
    /// # Errors
    ///
    /// Returns [`TrackingError::NotAPullRequest`] outside a pull-request
    /// analysis.
    pub fn merge_confirmed_or_resolved_from_pr_or_branch(
        &self,
        issue: &mut Issue,
        sibling: &Issue,
        origin_display_name: &str,
    ) -> Result<(), TrackingError> {
        if !self.ctx.is_pull_request() {
            return Err(TrackingError::NotAPullRequest);
        }
        issue.status = sibling.status;
        issue.resolution = sibling.resolution;
        issue.clean_code_attribute = sibling.clean_code_attribute;
        let issue_key = issue.key().copied();
        issue.comments.extend(sibling.comments.iter().cloned().map(|mut c| {
            c.issue_key = issue_key;
            c
        }));
        issue.changes.extend(sibling.changes.iter().cloned().map(|mut c| {
            c.issue_key = issue_key;
            c
        }));
        issue.changed = true;
        self.append_provenance(issue, origin_display_name);
        Ok(())
    }

    /// Let the workflow pick the transition fitting the issue's situation.
    pub fn do_automatic_transition(&self, issue: &mut Issue) {
        self.workflow.do_automatic_transition(issue, &self.change_context);
    }

    /// Apply a named manual transition. Returns whether it applied.
    pub fn do_manual_transition(&self, issue: &mut Issue, transition: &str) -> bool {
        self.workflow
            .do_manual_transition(issue, transition, &self.change_context)
    }

    /// Attach a comment under the current change context.
    pub fn add_comment(&self, issue: &mut Issue, markdown: impl Into<String>) {
        let comment = IssueComment {
            issue_key: issue.key().copied(),
            user: self.change_context.user.clone(),
            markdown: markdown.into(),
            created_at: self.change_context.date,
        };
        issue.comments.push(comment);
        issue.changed = true;
    }

    /// Copy state and history from an issue of another branch, re-keying
    /// comments and diffs to the destination.
    fn copy_attributes(&self, dest: &mut Issue, source: &Issue) {
        dest.creation_date = source.creation_date;
        dest.update_date = source.update_date;
        dest.close_date = source.close_date;
        dest.status = source.status;
        dest.resolution = source.resolution;
        dest.severity = source.severity;
        dest.manual_severity = source.manual_severity;
        dest.assignee = source.assignee.clone();
        dest.tags = source.tags.clone();
        dest.clean_code_attribute = source.clean_code_attribute;
        dest.impacts = source.impacts.clone();
        if dest.author.is_none() {
            dest.author = source.author.clone();
        }
        let dest_key = dest.key().copied();
        dest.comments = source
            .comments
            .iter()
            .cloned()
            .map(|mut c| {
                c.issue_key = dest_key;
                c
            })
            .collect();
        dest.changes = source
            .changes
            .iter()
            .cloned()
            .map(|mut c| {
                c.issue_key = dest_key;
                c
            })
            .collect();
    }

    /// Record where the issue was copied from (old value) and where it now
    /// lives (new value).
    fn append_provenance(&self, issue: &mut Issue, origin_display_name: &str) {
        let mut diffs = FieldDiffs::new(self.change_context.date);
        diffs.issue_key = issue.key().copied();
        diffs.user = self.change_context.user.clone();
        diffs.set_diff(
            field::FROM_BRANCH,
            Some(origin_display_name.to_string()),
            Some(self.ctx.branch.display_name()),
        );
        issue.changes.push(diffs);
    }
}

fn attribute_str(attribute: CleanCodeAttribute) -> String {
    format!("{attribute:?}").to_uppercase()
}

fn impact_field(quality: SoftwareQuality) -> String {
    format!(
        "{}.{}",
        field::IMPACT_SEVERITY,
        format!("{quality:?}").to_uppercase()
    )
}

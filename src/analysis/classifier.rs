//! analysis::classifier
//!
//! Decides whether an issue counts as "new" for the configured comparison
//! period.
//!
//! - Pull requests: everything surviving the changed-lines filter is new.
//! - Date-based periods (days / previous version): new iff the issue was
//!   created strictly after the period date; no date, no comparison.
//! - Reference-branch periods: new iff some location overlaps a line
//!   recorded as changed against the reference. Issues that were counted
//!   as new by an earlier analysis but no longer overlap are explicitly
//!   demoted, not silently dropped — consumers need to see the flag flip.

use std::collections::BTreeSet;

use tracing::trace;

use super::branch::AnalysisContext;
use super::component::Component;
use crate::core::issue::Issue;
use crate::store::NewLinesRepository;

/// New-code classification for one analysis.
pub struct NewIssueClassifier<'a> {
    ctx: &'a AnalysisContext,
    new_lines: &'a dyn NewLinesRepository,
}

impl<'a> NewIssueClassifier<'a> {
    pub fn new(ctx: &'a AnalysisContext, new_lines: &'a dyn NewLinesRepository) -> Self {
        Self { ctx, new_lines }
    }

    /// Classification only applies when a period exists or the analysis is
    /// a pull request.
    pub fn is_enabled(&self) -> bool {
        self.ctx.period.is_some() || self.ctx.is_pull_request()
    }

    /// Whether the issue counts as new code.
    pub fn is_new(&self, component: &Component, issue: &Issue) -> bool {
        if self.ctx.is_pull_request() {
            return true;
        }
        match &self.ctx.period {
            None => false,
            Some(period) if period.is_reference_branch() => {
                self.overlaps_new_lines(component, issue)
            }
            Some(period) => period
                .date
                .is_some_and(|date| issue.creation_date > date),
        }
    }

    /// Re-evaluate the reference-branch flag on an issue, promoting issues
    /// that now overlap changed lines and demoting ones that no longer do.
    pub fn reclassify_reference_issue(&self, component: &Component, issue: &mut Issue) {
        let applies = matches!(&self.ctx.period, Some(p) if p.is_reference_branch())
            && !self.ctx.is_pull_request();
        if !applies {
            return;
        }
        if self.overlaps_new_lines(component, issue) {
            if !issue.is_new_code_reference_issue {
                issue.is_new_code_reference_issue = true;
                issue.changed = true;
            }
        } else if issue.is_new_code_reference_issue {
            trace!(
                key = %issue.key().map(ToString::to_string).unwrap_or_default(),
                "issue no longer overlaps changed lines, demoting from new code"
            );
            issue.is_new_code_reference_issue = false;
            issue.is_no_longer_new_code_reference_issue = true;
            issue.changed = true;
        }
    }

    /// Whether any location of the issue — primary or in a flow — sits on
    /// a changed line. Only components with recorded changed lines are
    /// considered.
    fn overlaps_new_lines(&self, component: &Component, issue: &Issue) -> bool {
        let mut uuids: BTreeSet<&str> = issue.other_component_uuids();
        uuids.insert(&component.uuid);
        uuids.insert(&issue.component_uuid);

        for uuid in uuids {
            let changed = match self.new_lines.new_lines(uuid) {
                Some(lines) => lines,
                None => continue,
            };
            if issue
                .lines_in_component(uuid)
                .iter()
                .any(|line| changed.contains(line))
            {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::*;
    use crate::analysis::branch::{BranchContext, Period};
    use crate::analysis::component::FileStatus;
    use crate::core::issue::{Flow, IssueLocation, TextRange};
    use crate::core::types::{BranchName, RuleKey};
    use crate::store::memory::InMemoryNewLinesRepository;

    fn date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    fn ctx(branch: BranchContext, period: Option<Period>) -> AnalysisContext {
        AnalysisContext {
            branch,
            is_first_analysis: false,
            analysis_date: date(),
            previous_analysis_date: None,
            period,
        }
    }

    fn main_branch() -> BranchContext {
        BranchContext::Main {
            name: BranchName::new("main").unwrap(),
        }
    }

    fn file() -> Component {
        Component::file("file-1", "project:a.rs", FileStatus::Changed)
    }

    fn issue_on_line(line: u32) -> Issue {
        let mut issue = Issue::new(RuleKey::parse("java:S1").unwrap(), "file-1", date());
        issue.line = Some(line);
        issue
    }

    #[test]
    fn disabled_without_period_outside_pr() {
        let no_lines = InMemoryNewLinesRepository::new();
        let ctx = ctx(main_branch(), None);
        let classifier = NewIssueClassifier::new(&ctx, &no_lines);
        assert!(!classifier.is_enabled());
        assert!(!classifier.is_new(&file(), &issue_on_line(1)));
    }

    #[test]
    fn pull_requests_count_everything_as_new() {
        let no_lines = InMemoryNewLinesRepository::new();
        let ctx = ctx(
            BranchContext::PullRequest {
                id: "7".into(),
                source: BranchName::new("feature/x").unwrap(),
                target: None,
            },
            None,
        );
        let classifier = NewIssueClassifier::new(&ctx, &no_lines);
        assert!(classifier.is_enabled());
        assert!(classifier.is_new(&file(), &issue_on_line(1)));
    }

    mod date_period {
        use super::*;

        #[test]
        fn created_after_period_date_is_new() {
            let no_lines = InMemoryNewLinesRepository::new();
            let ctx = ctx(
                main_branch(),
                Some(Period::days(30, date() - Duration::days(30))),
            );
            let classifier = NewIssueClassifier::new(&ctx, &no_lines);

            let mut recent = issue_on_line(1);
            recent.creation_date = date() - Duration::days(3);
            assert!(classifier.is_new(&file(), &recent));

            let mut old = issue_on_line(1);
            old.creation_date = date() - Duration::days(60);
            assert!(!classifier.is_new(&file(), &old));
        }

        #[test]
        fn period_without_date_never_compares() {
            let no_lines = InMemoryNewLinesRepository::new();
            let ctx = ctx(main_branch(), Some(Period::previous_version(None)));
            let classifier = NewIssueClassifier::new(&ctx, &no_lines);
            let mut issue = issue_on_line(1);
            issue.creation_date = date();
            assert!(!classifier.is_new(&file(), &issue));
        }
    }

    mod reference_branch {
        use super::*;

        fn reference_ctx() -> AnalysisContext {
            ctx(
                BranchContext::Branch {
                    name: BranchName::new("feature/x").unwrap(),
                    reference: Some(BranchName::new("main").unwrap()),
                },
                Some(Period::reference_branch(BranchName::new("main").unwrap())),
            )
        }

        #[test]
        fn overlap_with_changed_lines_is_new() {
            let mut lines = InMemoryNewLinesRepository::new();
            lines.set("file-1", [2, 3]);
            let ctx = reference_ctx();
            let classifier = NewIssueClassifier::new(&ctx, &lines);
            assert!(classifier.is_new(&file(), &issue_on_line(2)));
            assert!(!classifier.is_new(&file(), &issue_on_line(10)));
        }

        #[test]
        fn flow_location_overlap_counts() {
            let mut lines = InMemoryNewLinesRepository::new();
            lines.set("file-2", [8]);
            let ctx = reference_ctx();
            let classifier = NewIssueClassifier::new(&ctx, &lines);

            let mut issue = issue_on_line(50);
            issue.flows.push(Flow::of(vec![IssueLocation::in_file(
                "file-2",
                TextRange::at_line(8),
            )]));
            assert!(classifier.is_new(&file(), &issue));
        }

        #[test]
        fn components_without_new_line_data_are_ignored() {
            let lines = InMemoryNewLinesRepository::new();
            let ctx = reference_ctx();
            let classifier = NewIssueClassifier::new(&ctx, &lines);
            assert!(!classifier.is_new(&file(), &issue_on_line(2)));
        }

        #[test]
        fn promotes_issue_now_on_changed_line() {
            let mut lines = InMemoryNewLinesRepository::new();
            lines.set("file-1", [2, 3]);
            let ctx = reference_ctx();
            let classifier = NewIssueClassifier::new(&ctx, &lines);

            let mut issue = issue_on_line(3);
            classifier.reclassify_reference_issue(&file(), &mut issue);
            assert!(issue.is_new_code_reference_issue);
            assert!(issue.changed);
        }

        #[test]
        fn demotes_issue_no_longer_on_changed_line() {
            let mut lines = InMemoryNewLinesRepository::new();
            lines.set("file-1", [2, 3]);
            let ctx = reference_ctx();
            let classifier = NewIssueClassifier::new(&ctx, &lines);

            let mut issue = issue_on_line(10);
            issue.is_new_code_reference_issue = true;
            classifier.reclassify_reference_issue(&file(), &mut issue);

            assert!(!classifier.is_new(&file(), &issue));
            assert!(!issue.is_new_code_reference_issue);
            assert!(issue.is_no_longer_new_code_reference_issue);
            assert!(issue.changed);
        }

        #[test]
        fn untouched_issue_stays_untouched() {
            let mut lines = InMemoryNewLinesRepository::new();
            lines.set("file-1", [2]);
            let ctx = reference_ctx();
            let classifier = NewIssueClassifier::new(&ctx, &lines);

            let mut issue = issue_on_line(10);
            classifier.reclassify_reference_issue(&file(), &mut issue);
            assert!(!issue.is_new_code_reference_issue);
            assert!(!issue.is_no_longer_new_code_reference_issue);
            assert!(!issue.changed);
        }
    }
}

//! analysis::executions
//!
//! Per-topology tracker executions: each wires the matching engine to the
//! correct pair of comparison sides for one branch topology and turns the
//! index-based tracking into an owned [`TrackingOutcome`] the lifecycle
//! can consume.
//!
//! - [`BaseTrackerExecution`]: raw vs. this branch's previous analysis,
//!   then vs. recently closed issues
//! - [`ReferenceBranchTrackerExecution`]: raw vs. a reference branch, to
//!   seed a brand-new branch's history
//! - [`PullRequestTrackerExecution`]: raw (changed lines only) vs. the
//!   PR's own previous analysis, suppressing issues already resolved on
//!   the target branch
//! - [`SourceBranchMerger`]: copies confirmed/resolved state from sibling
//!   pull requests sharing the same source branch

use std::collections::BTreeSet;

use tracing::debug;

use super::branch::AnalysisContext;
use super::component::Component;
use super::lifecycle::IssueLifecycle;
use super::loader::{
    BaseInputFactory, BranchInputFactory, ClosedIssuesInputFactory, ComponentIssuesLoader,
};
use super::TrackingError;
use crate::core::issue::{Issue, IssueStatus};
use crate::core::types::BranchName;
use crate::store::IssueStore;
use crate::tracking::{Input, SimpleTracker, Tracker, Tracking};

/// Where a matched counterpart came from, which decides the lifecycle
/// treatment of the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOrigin {
    /// Open issue of this branch's previous analysis: merge.
    Base,
    /// Recently closed issue: merge, then reopen.
    Closed,
    /// Open issue of the reference branch: copy into this branch.
    Reference,
}

/// One matched pair: the raw issue (by index into the outcome's `raws`)
/// and the owned counterpart it matched.
#[derive(Debug)]
pub struct IssueMatch {
    pub raw_index: usize,
    pub base: Issue,
    pub origin: MatchOrigin,
}

/// Owned result of one component's tracking, ready for the lifecycle.
#[derive(Debug, Default)]
pub struct TrackingOutcome {
    /// The raw issues that survived filtering, in input order.
    pub raws: Vec<Issue>,
    pub matches: Vec<IssueMatch>,
    /// Open base issues no raw issue claimed; they are on their way to
    /// CLOSED.
    pub unmatched_bases: Vec<Issue>,
}

impl TrackingOutcome {
    /// Indices into `raws` that no match claimed.
    pub fn unmatched_raw_indices(&self) -> Vec<usize> {
        let matched: BTreeSet<usize> = self.matches.iter().map(|m| m.raw_index).collect();
        (0..self.raws.len()).filter(|i| !matched.contains(i)).collect()
    }
}

/// Raw vs. same-branch previous analysis, then vs. closed issues.
pub struct BaseTrackerExecution<'a> {
    ctx: &'a AnalysisContext,
    loader: &'a ComponentIssuesLoader<'a>,
    base_factory: &'a BaseInputFactory<'a>,
    closed_factory: &'a ClosedIssuesInputFactory<'a>,
}

impl<'a> BaseTrackerExecution<'a> {
    pub fn new(
        ctx: &'a AnalysisContext,
        loader: &'a ComponentIssuesLoader<'a>,
        base_factory: &'a BaseInputFactory<'a>,
        closed_factory: &'a ClosedIssuesInputFactory<'a>,
    ) -> Self {
        Self {
            ctx,
            loader,
            base_factory,
            closed_factory,
        }
    }

    pub fn track(&self, component: &Component, raw_input: Input<Issue>) -> TrackingOutcome {
        let base_input = self.base_factory.create(component);
        let partial = Tracker::track_non_closed(&raw_input, &base_input);

        let (tracking, closed_issues) = if partial.is_complete() || self.ctx.is_first_analysis {
            (partial.into_tracking(), Vec::new())
        } else {
            let closed_input = self.closed_factory.create(component);
            let tracking = Tracker::track_closed(partial, &raw_input, &closed_input);
            (tracking, closed_input.into_issues())
        };

        let mut outcome = build_outcome(
            raw_input.into_issues(),
            base_input.into_issues(),
            closed_issues,
            &tracking,
            MatchOrigin::Base,
            true,
        );

        // The reopening transition needs to know the closed issue's last
        // status and resolution changes.
        let mut reopened: Vec<Issue> = Vec::new();
        let mut reopened_slots: Vec<usize> = Vec::new();
        for (slot, m) in outcome.matches.iter_mut().enumerate() {
            if m.origin == MatchOrigin::Closed {
                reopened.push(std::mem::replace(&mut m.base, placeholder_issue()));
                reopened_slots.push(slot);
            }
        }
        if !reopened.is_empty() {
            self.loader.load_latest_diff_changes_for_reopening(&mut reopened);
            for (slot, issue) in reopened_slots.into_iter().zip(reopened) {
                outcome.matches[slot].base = issue;
            }
        }
        outcome
    }
}

/// Raw vs. a reference branch's open issues, seeding a new branch.
pub struct ReferenceBranchTrackerExecution<'a> {
    branch_factory: &'a BranchInputFactory<'a>,
}

impl<'a> ReferenceBranchTrackerExecution<'a> {
    pub fn new(branch_factory: &'a BranchInputFactory<'a>) -> Self {
        Self { branch_factory }
    }

    pub fn track(
        &self,
        reference: &BranchName,
        component: &Component,
        raw_input: Input<Issue>,
    ) -> TrackingOutcome {
        let reference_input = self.branch_factory.create_open(reference, component);
        let partial = Tracker::track_non_closed(&raw_input, &reference_input);
        let tracking = partial.into_tracking();

        let mut outcome = build_outcome(
            raw_input.into_issues(),
            reference_input.into_issues(),
            Vec::new(),
            &tracking,
            MatchOrigin::Reference,
            false,
        );
        // Reference-branch issues we did not match stay untouched on their
        // own branch; they are not ours to close.
        outcome.unmatched_bases.clear();
        outcome
    }
}

/// Raw (changed lines only) vs. the PR's own previous analysis, with
/// target-branch suppression.
pub struct PullRequestTrackerExecution<'a> {
    base_factory: &'a BaseInputFactory<'a>,
    branch_factory: &'a BranchInputFactory<'a>,
    new_lines: &'a dyn crate::store::NewLinesRepository,
}

impl<'a> PullRequestTrackerExecution<'a> {
    pub fn new(
        base_factory: &'a BaseInputFactory<'a>,
        branch_factory: &'a BranchInputFactory<'a>,
        new_lines: &'a dyn crate::store::NewLinesRepository,
    ) -> Self {
        Self {
            base_factory,
            branch_factory,
            new_lines,
        }
    }

    pub fn track(
        &self,
        target: Option<&BranchName>,
        component: &Component,
        raw_input: Input<Issue>,
    ) -> TrackingOutcome {
        let raw_input = self.keep_issues_on_changed_lines(component, raw_input);

        let base_input = self.base_factory.create(component);
        let partial = Tracker::track_non_closed(&raw_input, &base_input);
        let tracking = partial.into_tracking();

        let mut outcome = build_outcome(
            raw_input.into_issues(),
            base_input.into_issues(),
            Vec::new(),
            &tracking,
            MatchOrigin::Base,
            true,
        );

        if let Some(target) = target {
            self.suppress_issues_resolved_on_target(target, component, &mut outcome);
        }
        outcome
    }

    /// Issues whose every location misses the changed lines are not part
    /// of the pull request's diff and are dropped up front. Issues with no
    /// line at all (file-level) are kept.
    fn keep_issues_on_changed_lines(
        &self,
        component: &Component,
        raw_input: Input<Issue>,
    ) -> Input<Issue> {
        let changed = match self.new_lines.new_lines(&component.uuid) {
            Some(changed) => changed.clone(),
            None => return raw_input,
        };
        let line_hashes = raw_input.line_hashes().clone();
        let issues: Vec<Issue> = raw_input
            .into_issues()
            .into_iter()
            .filter_map(|mut issue| {
                if issue.line.is_none() && issue.flows.is_empty() {
                    return Some(issue);
                }
                let on_changed = issue
                    .lines_in_component(&component.uuid)
                    .iter()
                    .any(|line| changed.contains(line));
                if on_changed {
                    issue.is_on_changed_line = true;
                    Some(issue)
                } else {
                    None
                }
            })
            .collect();
        Input::new(line_hashes, issues)
    }

    /// An unmatched raw issue that equals a RESOLVED issue on the target
    /// branch was already accepted there; raising it again on the PR would
    /// only produce noise. It is removed from the outcome entirely.
    fn suppress_issues_resolved_on_target(
        &self,
        target: &BranchName,
        component: &Component,
        outcome: &mut TrackingOutcome,
    ) {
        let target_input = self.branch_factory.create_resolved(target, component);
        if target_input.issues().is_empty() {
            return;
        }

        let unmatched = outcome.unmatched_raw_indices();
        let suppressed: BTreeSet<usize> = {
            let unmatched_refs: Vec<&Issue> =
                unmatched.iter().map(|&i| &outcome.raws[i]).collect();
            let target_refs: Vec<&Issue> = target_input.issues().iter().collect();
            let tracking = SimpleTracker::track(&unmatched_refs, &target_refs);
            tracking
                .matched_pairs()
                .map(|(r, _)| unmatched[r])
                .collect()
        };
        if suppressed.is_empty() {
            return;
        }
        debug!(
            component = %component.uuid,
            count = suppressed.len(),
            "suppressing raw issues already resolved on target branch"
        );

        // Drop suppressed raws and remap the surviving match indices.
        let mut remap = vec![usize::MAX; outcome.raws.len()];
        let mut kept = 0usize;
        let raws = std::mem::take(&mut outcome.raws);
        outcome.raws = raws
            .into_iter()
            .enumerate()
            .filter_map(|(idx, issue)| {
                if suppressed.contains(&idx) {
                    None
                } else {
                    remap[idx] = kept;
                    kept += 1;
                    Some(issue)
                }
            })
            .collect();
        for m in &mut outcome.matches {
            m.raw_index = remap[m.raw_index];
        }
    }
}

/// Copies confirmed/resolved state from sibling pull requests sharing the
/// same source branch onto freshly created issues.
pub struct SourceBranchMerger<'a> {
    store: &'a dyn IssueStore,
    lifecycle: &'a IssueLifecycle<'a>,
}

impl<'a> SourceBranchMerger<'a> {
    pub fn new(store: &'a dyn IssueStore, lifecycle: &'a IssueLifecycle<'a>) -> Self {
        Self { store, lifecycle }
    }

    /// Match the new issues against sibling candidates and copy state from
    /// the preferred candidate: resolved first, then confirmed, then the
    /// oldest.
    pub fn try_merge_from_siblings(
        &self,
        component: &Component,
        source: &BranchName,
        issues: &mut [Issue],
    ) -> Result<(), TrackingError> {
        let mut siblings = self.store.load_sibling_issues(source, &component.key);
        siblings.retain(|s| {
            matches!(
                s.issue.status,
                IssueStatus::Confirmed | IssueStatus::Resolved
            )
        });
        if siblings.is_empty() {
            return Ok(());
        }
        siblings.sort_by_key(|s| {
            let rank = match s.issue.status {
                IssueStatus::Resolved => 0,
                IssueStatus::Confirmed => 1,
                _ => 2,
            };
            (rank, s.issue.creation_date)
        });

        let new_indices: Vec<usize> = issues
            .iter()
            .enumerate()
            .filter(|(_, i)| i.is_new)
            .map(|(idx, _)| idx)
            .collect();
        let pairs: Vec<(usize, usize)> = {
            let new_refs: Vec<&Issue> = new_indices.iter().map(|&i| &issues[i]).collect();
            let sibling_refs: Vec<&Issue> = siblings.iter().map(|s| &s.issue).collect();
            let tracking = SimpleTracker::track(&new_refs, &sibling_refs);
            tracking
                .matched_pairs()
                .map(|(r, b)| (new_indices[r], b))
                .collect()
        };

        for (issue_idx, sibling_idx) in pairs {
            let sibling = &siblings[sibling_idx];
            self.lifecycle.merge_confirmed_or_resolved_from_pr_or_branch(
                &mut issues[issue_idx],
                &sibling.issue,
                &sibling.origin_display_name,
            )?;
        }
        Ok(())
    }
}

/// Convert an index-based tracking plus the owned issue collections into a
/// [`TrackingOutcome`].
fn build_outcome(
    raws: Vec<Issue>,
    bases: Vec<Issue>,
    closed: Vec<Issue>,
    tracking: &Tracking,
    base_origin: MatchOrigin,
    keep_unmatched_bases: bool,
) -> TrackingOutcome {
    let mut bases: Vec<Option<Issue>> = bases.into_iter().map(Some).collect();
    let mut closed: Vec<Option<Issue>> = closed.into_iter().map(Some).collect();

    let mut matches = Vec::new();
    for (raw_index, base_index) in tracking.matched_pairs() {
        if let Some(base) = bases[base_index].take() {
            matches.push(IssueMatch {
                raw_index,
                base,
                origin: base_origin,
            });
        }
    }
    for (raw_index, closed_index) in tracking.closed_pairs() {
        if let Some(base) = closed[closed_index].take() {
            matches.push(IssueMatch {
                raw_index,
                base,
                origin: MatchOrigin::Closed,
            });
        }
    }

    let unmatched_bases = if keep_unmatched_bases {
        bases.into_iter().flatten().collect()
    } else {
        Vec::new()
    };

    TrackingOutcome {
        raws,
        matches,
        unmatched_bases,
    }
}

/// Stand-in used while closed issues take a round trip through the
/// reopening-diff loader.
fn placeholder_issue() -> Issue {
    Issue::new(
        crate::core::types::RuleKey::new("internal", "placeholder")
            .unwrap_or_else(|_| unreachable!("static rule key is valid")),
        "",
        chrono::DateTime::<chrono::Utc>::MIN_UTC,
    )
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::*;
    use crate::analysis::branch::BranchContext;
    use crate::analysis::component::FileStatus;
    use crate::core::config::Settings;
    use crate::core::issue::{field, FieldDiffs, Resolution};
    use crate::core::types::{IssueKey, RuleKey};
    use crate::store::memory::{InMemoryIssueStore, InMemoryMovedFilesRepository};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    fn ctx(first_analysis: bool) -> AnalysisContext {
        AnalysisContext {
            branch: BranchContext::Main {
                name: BranchName::new("main").unwrap(),
            },
            is_first_analysis: first_analysis,
            analysis_date: now(),
            previous_analysis_date: None,
            period: None,
        }
    }

    fn file() -> Component {
        Component::file("file-1", "project:a.rs", FileStatus::Changed)
    }

    fn raw(line: u32, checksum: &str) -> Issue {
        let mut issue = Issue::new(RuleKey::parse("java:S1").unwrap(), "file-1", now());
        issue.line = Some(line);
        issue.checksum = Some(checksum.into());
        issue
    }

    fn stored(line: u32, checksum: &str) -> Issue {
        let mut issue = raw(line, checksum);
        issue.set_key(IssueKey::generate());
        issue.creation_date = now() - Duration::days(30);
        issue
    }

    struct BaseFixture {
        store: InMemoryIssueStore,
        moved: InMemoryMovedFilesRepository,
        settings: Settings,
    }

    impl BaseFixture {
        fn new() -> Self {
            Self {
                store: InMemoryIssueStore::new(),
                moved: InMemoryMovedFilesRepository::new(),
                settings: Settings::new(),
            }
        }

        fn track(&self, first_analysis: bool, raws: Vec<Issue>) -> TrackingOutcome {
            let ctx = ctx(first_analysis);
            let loader = ComponentIssuesLoader::new(&self.store, &self.settings, now());
            let base_factory = BaseInputFactory::new(&loader, &self.store, &self.moved);
            let closed_factory = ClosedIssuesInputFactory::new(&loader, &self.moved);
            let execution =
                BaseTrackerExecution::new(&ctx, &loader, &base_factory, &closed_factory);
            execution.track(&file(), Input::no_content(raws))
        }
    }

    mod base_execution {
        use super::*;
        use crate::core::issue::IssueStatus;

        #[test]
        fn matches_open_base_issues() {
            let mut fixture = BaseFixture::new();
            fixture.store.add_issue("file-1", stored(5, "c1"));

            let outcome = fixture.track(false, vec![raw(5, "c1")]);
            assert_eq!(outcome.matches.len(), 1);
            assert_eq!(outcome.matches[0].origin, MatchOrigin::Base);
            assert!(outcome.unmatched_bases.is_empty());
            assert!(outcome.unmatched_raw_indices().is_empty());
        }

        #[test]
        fn unmatched_bases_are_reported() {
            let mut fixture = BaseFixture::new();
            fixture.store.add_issue("file-1", stored(5, "c1"));

            let outcome = fixture.track(false, Vec::new());
            assert_eq!(outcome.unmatched_bases.len(), 1);
        }

        #[test]
        fn closed_pass_reopens_recent_issue_with_diffs() {
            let mut fixture = BaseFixture::new();
            let mut closed = stored(5, "c1");
            closed.status = IssueStatus::Closed;
            closed.close_date = Some(now() - Duration::days(3));
            let key = *closed.key().unwrap();
            fixture.store.add_issue("file-1", closed);
            let mut change = FieldDiffs::new(now() - Duration::days(3));
            change.set_diff(field::STATUS, Some("OPEN".into()), Some("CLOSED".into()));
            fixture.store.add_changes(key, vec![change]);

            let outcome = fixture.track(false, vec![raw(5, "c1")]);
            assert_eq!(outcome.matches.len(), 1);
            let m = &outcome.matches[0];
            assert_eq!(m.origin, MatchOrigin::Closed);
            assert_eq!(m.base.key(), Some(&key));
            assert_eq!(m.base.changes.len(), 1);
            assert!(m.base.changes[0].diff(field::STATUS).is_some());
        }

        #[test]
        fn first_analysis_skips_closed_pass() {
            let mut fixture = BaseFixture::new();
            let mut closed = stored(5, "c1");
            closed.status = IssueStatus::Closed;
            closed.close_date = Some(now() - Duration::days(3));
            fixture.store.add_issue("file-1", closed);

            let outcome = fixture.track(true, vec![raw(5, "c1")]);
            assert!(outcome.matches.is_empty());
            assert_eq!(outcome.unmatched_raw_indices(), vec![0]);
        }

        #[test]
        fn old_closed_issue_is_not_reopened() {
            let mut fixture = BaseFixture::new();
            let mut closed = stored(5, "c1");
            closed.status = IssueStatus::Closed;
            closed.close_date = Some(now() - Duration::days(310));
            fixture.store.add_issue("file-1", closed);

            let outcome = fixture.track(false, vec![raw(5, "c1")]);
            assert!(outcome.matches.is_empty());
        }
    }

    mod reference_execution {
        use super::*;

        #[test]
        fn matches_reference_issues_and_drops_their_unmatched() {
            let mut store = InMemoryIssueStore::new();
            let main = BranchName::new("main").unwrap();
            store.map_branch_component(&main, "project:a.rs", "main-file-1");
            store.add_issue("main-file-1", stored(5, "c1"));
            store.add_issue("main-file-1", stored(9, "other"));

            let branch_factory = BranchInputFactory::new(&store);
            let execution = ReferenceBranchTrackerExecution::new(&branch_factory);
            let outcome = execution.track(&main, &file(), Input::no_content(vec![raw(5, "c1")]));

            assert_eq!(outcome.matches.len(), 1);
            assert_eq!(outcome.matches[0].origin, MatchOrigin::Reference);
            // The unmatched reference issue is not ours to close.
            assert!(outcome.unmatched_bases.is_empty());
        }

        #[test]
        fn missing_file_on_reference_branch_matches_nothing() {
            let store = InMemoryIssueStore::new();
            let branch_factory = BranchInputFactory::new(&store);
            let execution = ReferenceBranchTrackerExecution::new(&branch_factory);
            let outcome = execution.track(
                &BranchName::new("main").unwrap(),
                &file(),
                Input::no_content(vec![raw(5, "c1")]),
            );
            assert!(outcome.matches.is_empty());
            assert_eq!(outcome.unmatched_raw_indices(), vec![0]);
        }
    }

    mod pull_request_execution {
        use super::*;
        use crate::store::memory::InMemoryNewLinesRepository;

        struct PrFixture {
            store: InMemoryIssueStore,
            moved: InMemoryMovedFilesRepository,
            settings: Settings,
            new_lines: InMemoryNewLinesRepository,
        }

        impl PrFixture {
            fn new() -> Self {
                Self {
                    store: InMemoryIssueStore::new(),
                    moved: InMemoryMovedFilesRepository::new(),
                    settings: Settings::new(),
                    new_lines: InMemoryNewLinesRepository::new(),
                }
            }

            fn track(&self, target: Option<&BranchName>, raws: Vec<Issue>) -> TrackingOutcome {
                let loader = ComponentIssuesLoader::new(&self.store, &self.settings, now());
                let base_factory = BaseInputFactory::new(&loader, &self.store, &self.moved);
                let branch_factory = BranchInputFactory::new(&self.store);
                let execution = PullRequestTrackerExecution::new(
                    &base_factory,
                    &branch_factory,
                    &self.new_lines,
                );
                execution.track(target, &file(), Input::no_content(raws))
            }
        }

        #[test]
        fn issues_off_changed_lines_are_dropped() {
            let mut fixture = PrFixture::new();
            fixture.new_lines.set("file-1", [5, 6]);

            let outcome = fixture.track(None, vec![raw(5, "c1"), raw(20, "c2")]);
            assert_eq!(outcome.raws.len(), 1);
            assert_eq!(outcome.raws[0].line, Some(5));
            assert!(outcome.raws[0].is_on_changed_line);
        }

        #[test]
        fn without_changed_line_data_everything_is_kept() {
            let fixture = PrFixture::new();
            let outcome = fixture.track(None, vec![raw(5, "c1"), raw(20, "c2")]);
            assert_eq!(outcome.raws.len(), 2);
        }

        #[test]
        fn raw_resolved_on_target_is_suppressed() {
            let mut fixture = PrFixture::new();
            let target = BranchName::new("main").unwrap();
            fixture
                .store
                .map_branch_component(&target, "project:a.rs", "main-file-1");
            let mut resolved = stored(5, "c1");
            resolved.status = crate::core::issue::IssueStatus::Resolved;
            resolved.resolution = Some(Resolution::FalsePositive);
            fixture.store.add_issue("main-file-1", resolved);

            let outcome = fixture.track(Some(&target), vec![raw(5, "c1"), raw(9, "c2")]);
            // The false positive from main disappears; the other raw stays.
            assert_eq!(outcome.raws.len(), 1);
            assert_eq!(outcome.raws[0].line, Some(9));
            assert_eq!(outcome.unmatched_raw_indices(), vec![0]);
        }

        #[test]
        fn matched_prior_pr_issue_survives_target_suppression() {
            let mut fixture = PrFixture::new();
            let target = BranchName::new("main").unwrap();
            // Previous analysis of the PR itself.
            fixture.store.add_issue("file-1", stored(5, "c1"));
            // Same issue also resolved on main.
            fixture
                .store
                .map_branch_component(&target, "project:a.rs", "main-file-1");
            let mut resolved = stored(5, "c1");
            resolved.status = crate::core::issue::IssueStatus::Resolved;
            fixture.store.add_issue("main-file-1", resolved);

            let outcome = fixture.track(Some(&target), vec![raw(5, "c1")]);
            // Matched against its own base, so not suppressed.
            assert_eq!(outcome.raws.len(), 1);
            assert_eq!(outcome.matches.len(), 1);
        }
    }
}

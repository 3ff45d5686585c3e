//! store::memory
//!
//! In-memory implementations of the collaborator seams, used by tests and
//! by hosts that keep analysis state in process.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use super::{
    ActiveRule, ActiveRulesHolder, Changeset, EffortCalculator, IssueChangeContext, IssueStore,
    IssueWorkflow, MovedFilesRepository, NewLinesRepository, OriginalFile, QProfileStatusRepository,
    Rule, RuleRepository, ScanReport, ScannerPlugin, ScannerPluginRepository, ScmInfo,
    ScmInfoRepository, SiblingIssue,
};
use crate::core::issue::{FieldDiffs, Issue, IssueStatus};
use crate::core::types::{BranchName, IssueKey, RuleKey};

/// Rule repository backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryRuleRepository {
    rules: HashMap<RuleKey, Rule>,
}

impl InMemoryRuleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, rule: Rule) -> &mut Self {
        self.rules.insert(rule.key.clone(), rule);
        self
    }
}

impl RuleRepository for InMemoryRuleRepository {
    fn find_by_key(&self, key: &RuleKey) -> Option<&Rule> {
        self.rules.get(key)
    }
}

/// Active rules backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryActiveRulesHolder {
    rules: HashMap<RuleKey, ActiveRule>,
}

impl InMemoryActiveRulesHolder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, rule: ActiveRule) -> &mut Self {
        self.rules.insert(rule.rule_key.clone(), rule);
        self
    }
}

impl ActiveRulesHolder for InMemoryActiveRulesHolder {
    fn get(&self, rule_key: &RuleKey) -> Option<&ActiveRule> {
        self.rules.get(rule_key)
    }
}

/// Installed plugins backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryScannerPluginRepository {
    plugins: HashMap<String, ScannerPlugin>,
}

impl InMemoryScannerPluginRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, plugin: ScannerPlugin) -> &mut Self {
        self.plugins.insert(plugin.key.clone(), plugin);
        self
    }
}

impl ScannerPluginRepository for InMemoryScannerPluginRepository {
    fn plugin(&self, key: &str) -> Option<&ScannerPlugin> {
        self.plugins.get(key)
    }
}

/// Quality-profile statuses: profiles listed here changed since the
/// previous analysis.
#[derive(Debug, Default)]
pub struct InMemoryQProfileStatusRepository {
    changed: BTreeSet<String>,
}

impl InMemoryQProfileStatusRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_changed(&mut self, qprofile_key: impl Into<String>) -> &mut Self {
        self.changed.insert(qprofile_key.into());
        self
    }
}

impl QProfileStatusRepository for InMemoryQProfileStatusRepository {
    fn has_changed(&self, qprofile_key: &str) -> bool {
        self.changed.contains(qprofile_key)
    }
}

/// SCM info backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryScmInfoRepository {
    infos: HashMap<String, ScmInfo>,
}

impl InMemoryScmInfoRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, component_uuid: impl Into<String>, info: ScmInfo) -> &mut Self {
        self.infos.insert(component_uuid.into(), info);
        self
    }

    /// Convenience: one changeset per (line, date) pair.
    pub fn set_line_dates(
        &mut self,
        component_uuid: impl Into<String>,
        line_dates: impl IntoIterator<Item = (u32, DateTime<Utc>)>,
    ) -> &mut Self {
        let changesets: BTreeMap<u32, Changeset> = line_dates
            .into_iter()
            .map(|(line, date)| {
                (
                    line,
                    Changeset {
                        date,
                        revision: None,
                        author: None,
                    },
                )
            })
            .collect();
        self.set(component_uuid, ScmInfo::new(changesets))
    }
}

impl ScmInfoRepository for InMemoryScmInfoRepository {
    fn scm_info(&self, component_uuid: &str) -> Option<&ScmInfo> {
        self.infos.get(component_uuid)
    }
}

/// Moved-file mappings backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryMovedFilesRepository {
    originals: HashMap<String, OriginalFile>,
}

impl InMemoryMovedFilesRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_move(
        &mut self,
        component_uuid: impl Into<String>,
        original: OriginalFile,
    ) -> &mut Self {
        self.originals.insert(component_uuid.into(), original);
        self
    }
}

impl MovedFilesRepository for InMemoryMovedFilesRepository {
    fn original_file(&self, component_uuid: &str) -> Option<&OriginalFile> {
        self.originals.get(component_uuid)
    }
}

/// New-code lines backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryNewLinesRepository {
    lines: HashMap<String, BTreeSet<u32>>,
}

impl InMemoryNewLinesRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(
        &mut self,
        component_uuid: impl Into<String>,
        lines: impl IntoIterator<Item = u32>,
    ) -> &mut Self {
        self.lines
            .insert(component_uuid.into(), lines.into_iter().collect());
        self
    }
}

impl NewLinesRepository for InMemoryNewLinesRepository {
    fn new_lines(&self, component_uuid: &str) -> Option<&BTreeSet<u32>> {
        self.lines.get(component_uuid)
    }
}

/// Issue store keeping everything in maps.
///
/// Issues are stored per component uuid; their status decides which load
/// returns them.
#[derive(Debug, Default)]
pub struct InMemoryIssueStore {
    issues: HashMap<String, Vec<Issue>>,
    changes: HashMap<IssueKey, Vec<FieldDiffs>>,
    line_hashes: HashMap<String, Vec<String>>,
    branch_components: HashMap<(String, String), String>,
    siblings: HashMap<(String, String), Vec<SiblingIssue>>,
}

impl InMemoryIssueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_issue(&mut self, component_uuid: impl Into<String>, issue: Issue) -> &mut Self {
        self.issues.entry(component_uuid.into()).or_default().push(issue);
        self
    }

    pub fn add_changes(&mut self, issue_key: IssueKey, changes: Vec<FieldDiffs>) -> &mut Self {
        self.changes.entry(issue_key).or_default().extend(changes);
        self
    }

    pub fn set_line_hashes(
        &mut self,
        component_uuid: impl Into<String>,
        hashes: Vec<String>,
    ) -> &mut Self {
        self.line_hashes.insert(component_uuid.into(), hashes);
        self
    }

    pub fn map_branch_component(
        &mut self,
        branch: &BranchName,
        component_key: impl Into<String>,
        component_uuid: impl Into<String>,
    ) -> &mut Self {
        self.branch_components.insert(
            (branch.as_str().to_string(), component_key.into()),
            component_uuid.into(),
        );
        self
    }

    pub fn add_sibling_issue(
        &mut self,
        source_branch: &BranchName,
        component_key: impl Into<String>,
        sibling: SiblingIssue,
    ) -> &mut Self {
        self.siblings
            .entry((source_branch.as_str().to_string(), component_key.into()))
            .or_default()
            .push(sibling);
        self
    }

    fn issues_of(&self, component_uuid: &str) -> &[Issue] {
        self.issues.get(component_uuid).map_or(&[], Vec::as_slice)
    }
}

impl IssueStore for InMemoryIssueStore {
    fn load_open_issues(&self, component_uuid: &str) -> Vec<Issue> {
        self.issues_of(component_uuid)
            .iter()
            .filter(|i| i.status != IssueStatus::Closed)
            .cloned()
            .collect()
    }

    fn load_closed_issues(&self, component_uuid: &str, closed_after: DateTime<Utc>) -> Vec<Issue> {
        self.issues_of(component_uuid)
            .iter()
            .filter(|i| i.status == IssueStatus::Closed)
            .filter(|i| i.close_date.is_some_and(|d| d >= closed_after))
            .cloned()
            .collect()
    }

    fn load_resolved_issues(&self, component_uuid: &str) -> Vec<Issue> {
        self.issues_of(component_uuid)
            .iter()
            .filter(|i| i.status == IssueStatus::Resolved)
            .cloned()
            .collect()
    }

    fn load_changes(&self, issue_key: &IssueKey) -> Vec<FieldDiffs> {
        self.changes.get(issue_key).cloned().unwrap_or_default()
    }

    fn load_line_hashes(&self, component_uuid: &str) -> Option<Vec<String>> {
        self.line_hashes.get(component_uuid).cloned()
    }

    fn branch_component_uuid(&self, branch: &BranchName, component_key: &str) -> Option<String> {
        self.branch_components
            .get(&(branch.as_str().to_string(), component_key.to_string()))
            .cloned()
    }

    fn load_sibling_issues(
        &self,
        source_branch: &BranchName,
        component_key: &str,
    ) -> Vec<SiblingIssue> {
        self.siblings
            .get(&(source_branch.as_str().to_string(), component_key.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

/// Scan report backed by maps.
#[derive(Debug, Default)]
pub struct InMemoryScanReport {
    sources: HashMap<String, String>,
    issues: HashMap<String, Vec<Issue>>,
}

impl InMemoryScanReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_source(
        &mut self,
        component_uuid: impl Into<String>,
        source: impl Into<String>,
    ) -> &mut Self {
        self.sources.insert(component_uuid.into(), source.into());
        self
    }

    pub fn add_issue(&mut self, component_uuid: impl Into<String>, issue: Issue) -> &mut Self {
        self.issues.entry(component_uuid.into()).or_default().push(issue);
        self
    }
}

impl ScanReport for InMemoryScanReport {
    fn file_source(&self, component_uuid: &str) -> Option<String> {
        self.sources.get(component_uuid).cloned()
    }

    fn raw_issues(&self, component_uuid: &str) -> Vec<Issue> {
        self.issues.get(component_uuid).cloned().unwrap_or_default()
    }
}

/// Minimal workflow covering the transitions the engine itself triggers:
/// closing unmatched bases and reopening matched closed issues. Hosts with
/// a full workflow state machine plug their own implementation in.
#[derive(Debug, Default)]
pub struct SimpleWorkflow;

impl SimpleWorkflow {
    pub fn new() -> Self {
        Self
    }
}

impl IssueWorkflow for SimpleWorkflow {
    fn do_automatic_transition(&self, issue: &mut Issue, context: &IssueChangeContext) {
        if issue.being_closed {
            if issue.status != IssueStatus::Closed {
                issue.status = IssueStatus::Closed;
                issue.close_date = Some(context.date);
                issue.changed = true;
            }
        } else if issue.status == IssueStatus::Closed {
            issue.status = IssueStatus::Reopened;
            issue.resolution = None;
            issue.close_date = None;
            issue.update_date = Some(context.date);
            issue.changed = true;
        }
    }

    fn do_manual_transition(
        &self,
        issue: &mut Issue,
        transition: &str,
        context: &IssueChangeContext,
    ) -> bool {
        use crate::core::issue::Resolution;
        let applied = match transition {
            "confirm" => {
                issue.status = IssueStatus::Confirmed;
                issue.resolution = None;
                true
            }
            "resolve" => {
                issue.status = IssueStatus::Resolved;
                issue.resolution = Some(Resolution::Fixed);
                true
            }
            "falsepositive" => {
                issue.status = IssueStatus::Resolved;
                issue.resolution = Some(Resolution::FalsePositive);
                true
            }
            "wontfix" => {
                issue.status = IssueStatus::Resolved;
                issue.resolution = Some(Resolution::WontFix);
                true
            }
            "reopen" => {
                issue.status = IssueStatus::Reopened;
                issue.resolution = None;
                true
            }
            _ => false,
        };
        if applied {
            issue.update_date = Some(context.date);
            issue.changed = true;
        }
        applied
    }
}

/// Effort calculator returning a fixed value for every issue.
#[derive(Debug, Clone, Copy)]
pub struct FixedEffortCalculator {
    pub minutes: i64,
}

impl EffortCalculator for FixedEffortCalculator {
    fn effort_minutes(&self, _rule: &Rule, _issue: &Issue) -> Option<i64> {
        Some(self.minutes)
    }
}

/// Effort calculator that never assigns effort.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEffortCalculator;

impl EffortCalculator for NoEffortCalculator {
    fn effort_minutes(&self, _rule: &Rule, _issue: &Issue) -> Option<i64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn date(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap()
    }

    fn issue(status: IssueStatus, close_date: Option<DateTime<Utc>>) -> Issue {
        let mut issue = Issue::new(
            RuleKey::parse("java:S1").unwrap(),
            "file-1",
            date(1),
        );
        issue.status = status;
        issue.close_date = close_date;
        issue
    }

    mod issue_store {
        use super::*;

        #[test]
        fn open_load_excludes_closed() {
            let mut store = InMemoryIssueStore::new();
            store.add_issue("file-1", issue(IssueStatus::Open, None));
            store.add_issue("file-1", issue(IssueStatus::Closed, Some(date(2))));
            assert_eq!(store.load_open_issues("file-1").len(), 1);
        }

        #[test]
        fn closed_load_honors_floor() {
            let mut store = InMemoryIssueStore::new();
            store.add_issue("file-1", issue(IssueStatus::Closed, Some(date(2))));
            store.add_issue("file-1", issue(IssueStatus::Closed, Some(date(20))));
            let loaded = store.load_closed_issues("file-1", date(10));
            assert_eq!(loaded.len(), 1);
            assert_eq!(loaded[0].close_date, Some(date(20)));
        }

        #[test]
        fn resolved_load_excludes_open_and_closed() {
            let mut store = InMemoryIssueStore::new();
            store.add_issue("file-1", issue(IssueStatus::Open, None));
            store.add_issue("file-1", issue(IssueStatus::Resolved, None));
            store.add_issue("file-1", issue(IssueStatus::Closed, Some(date(2))));
            assert_eq!(store.load_resolved_issues("file-1").len(), 1);
        }

        #[test]
        fn unknown_component_loads_empty() {
            let store = InMemoryIssueStore::new();
            assert!(store.load_open_issues("nope").is_empty());
            assert!(store.load_line_hashes("nope").is_none());
        }
    }

    mod workflow {
        use super::*;

        fn context() -> IssueChangeContext {
            IssueChangeContext {
                date: date(15),
                user: None,
            }
        }

        #[test]
        fn being_closed_issue_closes() {
            let mut i = issue(IssueStatus::Open, None);
            i.being_closed = true;
            SimpleWorkflow::new().do_automatic_transition(&mut i, &context());
            assert_eq!(i.status, IssueStatus::Closed);
            assert_eq!(i.close_date, Some(date(15)));
            assert!(i.changed);
        }

        #[test]
        fn matched_closed_issue_reopens() {
            let mut i = issue(IssueStatus::Closed, Some(date(2)));
            i.resolution = Some(crate::core::issue::Resolution::Fixed);
            SimpleWorkflow::new().do_automatic_transition(&mut i, &context());
            assert_eq!(i.status, IssueStatus::Reopened);
            assert_eq!(i.resolution, None);
            assert_eq!(i.close_date, None);
        }

        #[test]
        fn open_issue_untouched() {
            let mut i = issue(IssueStatus::Open, None);
            SimpleWorkflow::new().do_automatic_transition(&mut i, &context());
            assert_eq!(i.status, IssueStatus::Open);
            assert!(!i.changed);
        }

        #[test]
        fn unknown_manual_transition_rejected() {
            let mut i = issue(IssueStatus::Open, None);
            assert!(!SimpleWorkflow::new().do_manual_transition(&mut i, "levitate", &context()));
        }
    }
}

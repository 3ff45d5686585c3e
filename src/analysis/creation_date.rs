//! analysis::creation_date
//!
//! Backdates new issues to the SCM date of the code that raised them.
//!
//! When an issue appears only because a rule, plugin, or quality profile
//! changed — not because anyone touched the code — dating it "today" would
//! manufacture spurious new-code issues. Instead its creation date moves
//! back to the most recent SCM changeset among the lines it touches.
//!
//! # Qualification
//!
//! Backdating applies to a new issue when any of these hold:
//! - first analysis of the branch
//! - the file itself is new
//! - the rule activation changed since the previous analysis
//! - the rule's plugin or base plugin was updated since then
//! - the quality profile changed
//!
//! External and ad-hoc rules always qualify — they have no activation to
//! consult. An issue that is not new is never backdated, which also makes
//! the computation idempotent: re-running it with unchanged inputs finds
//! the same changesets and the same date.
//!
//! # Failure
//!
//! A rule that cannot be found at all is fatal: it signals an upstream
//! data inconsistency, not a condition this step can recover from.

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use super::branch::AnalysisContext;
use super::component::Component;
use super::TrackingError;
use crate::core::issue::Issue;
use crate::store::{
    ActiveRulesHolder, QProfileStatusRepository, Rule, RuleRepository, ScannerPluginRepository,
    ScmInfoRepository,
};

/// Computes backdated creation dates for new issues.
pub struct IssueCreationDateCalculator<'a> {
    ctx: &'a AnalysisContext,
    rules: &'a dyn RuleRepository,
    active_rules: &'a dyn ActiveRulesHolder,
    scm: &'a dyn ScmInfoRepository,
    plugins: &'a dyn ScannerPluginRepository,
    qprofile_statuses: &'a dyn QProfileStatusRepository,
}

impl<'a> IssueCreationDateCalculator<'a> {
    pub fn new(
        ctx: &'a AnalysisContext,
        rules: &'a dyn RuleRepository,
        active_rules: &'a dyn ActiveRulesHolder,
        scm: &'a dyn ScmInfoRepository,
        plugins: &'a dyn ScannerPluginRepository,
        qprofile_statuses: &'a dyn QProfileStatusRepository,
    ) -> Self {
        Self {
            ctx,
            rules,
            active_rules,
            scm,
            plugins,
            qprofile_statuses,
        }
    }

    /// Backdate the issue's creation and update dates when it qualifies.
    ///
    /// # Errors
    ///
    /// Returns [`TrackingError::Store`] when the issue's rule is unknown.
    pub fn calculate(&self, component: &Component, issue: &mut Issue) -> Result<(), TrackingError> {
        if !issue.is_new {
            return Ok(());
        }
        let rule = self.rules.get_by_key(&issue.rule_key)?;

        let qualifies = rule.is_external || rule.is_ad_hoc || self.qualifies(rule, component);
        if !qualifies {
            trace!(rule = %issue.rule_key, "no rule or profile change, keeping scan date");
            return Ok(());
        }

        if let Some(date) = self.date_of_latest_change(component, issue) {
            debug!(
                rule = %issue.rule_key,
                component = %component.uuid,
                backdated_to = %date,
                "backdating issue to latest relevant changeset"
            );
            issue.creation_date = date;
            issue.update_date = Some(date);
        }
        Ok(())
    }

    /// Whether the rule or its surroundings changed in a way that makes
    /// "today" the wrong creation date.
    fn qualifies(&self, rule: &Rule, component: &Component) -> bool {
        if self.ctx.is_first_analysis || component.is_new_file() {
            return true;
        }
        let previous = match self.ctx.previous_analysis_date {
            Some(previous) => previous,
            // Not a first analysis but no previous date recorded: be
            // conservative and backdate.
            None => return true,
        };
        let active = match self.active_rules.get(&rule.key) {
            Some(active) => active,
            // Rule no longer active: nothing changed on its account.
            None => return false,
        };
        if active.updated_at > previous {
            return true;
        }
        if self.plugin_updated_since(active.plugin_key.as_deref().or(rule.plugin_key.as_deref()), previous)
        {
            return true;
        }
        active
            .qprofile_key
            .as_deref()
            .is_some_and(|qp| self.qprofile_statuses.has_changed(qp))
    }

    fn plugin_updated_since(&self, plugin_key: Option<&str>, previous: DateTime<Utc>) -> bool {
        let plugin = match plugin_key.and_then(|key| self.plugins.plugin(key)) {
            Some(plugin) => plugin,
            None => return false,
        };
        if plugin.updated_at > previous {
            return true;
        }
        plugin
            .base_plugin_key
            .as_deref()
            .and_then(|key| self.plugins.plugin(key))
            .is_some_and(|base| base.updated_at > previous)
    }

    /// Most recent changeset date among the issue's own lines, plus flow
    /// locations in other files with known SCM info.
    fn date_of_latest_change(&self, component: &Component, issue: &Issue) -> Option<DateTime<Utc>> {
        let mut latest: Option<DateTime<Utc>> = None;

        if let Some(scm_info) = self.scm.scm_info(&component.uuid) {
            let lines = issue.lines_in_component(&component.uuid);
            if lines.is_empty() {
                // No location in the file: the whole file's latest change.
                merge_latest(&mut latest, scm_info.latest_changeset().map(|c| c.date));
            } else {
                for line in lines {
                    merge_latest(
                        &mut latest,
                        scm_info.changeset_for_line(line).map(|c| c.date),
                    );
                }
            }
        }

        for uuid in issue.other_component_uuids() {
            if let Some(scm_info) = self.scm.scm_info(uuid) {
                for line in issue.lines_in_component(uuid) {
                    merge_latest(
                        &mut latest,
                        scm_info.changeset_for_line(line).map(|c| c.date),
                    );
                }
            }
        }
        latest
    }
}

fn merge_latest(latest: &mut Option<DateTime<Utc>>, candidate: Option<DateTime<Utc>>) {
    if let Some(date) = candidate {
        if latest.map_or(true, |current| date > current) {
            *latest = Some(date);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::analysis::branch::BranchContext;
    use crate::analysis::component::FileStatus;
    use crate::core::issue::{Flow, IssueLocation, TextRange};
    use crate::core::types::{BranchName, RuleKey};
    use crate::store::memory::{
        InMemoryActiveRulesHolder, InMemoryQProfileStatusRepository, InMemoryRuleRepository,
        InMemoryScannerPluginRepository, InMemoryScmInfoRepository,
    };
    use crate::store::{ActiveRule, RuleType, ScannerPlugin};

    fn analysis_date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    fn previous_date() -> DateTime<Utc> {
        analysis_date() - Duration::days(7)
    }

    fn ctx(first_analysis: bool) -> AnalysisContext {
        AnalysisContext {
            branch: BranchContext::Main {
                name: BranchName::new("main").unwrap(),
            },
            is_first_analysis: first_analysis,
            analysis_date: analysis_date(),
            previous_analysis_date: if first_analysis {
                None
            } else {
                Some(previous_date())
            },
            period: None,
        }
    }

    struct Fixture {
        ctx: AnalysisContext,
        rules: InMemoryRuleRepository,
        active_rules: InMemoryActiveRulesHolder,
        scm: InMemoryScmInfoRepository,
        plugins: InMemoryScannerPluginRepository,
        qprofiles: InMemoryQProfileStatusRepository,
    }

    impl Fixture {
        fn new(first_analysis: bool) -> Self {
            let mut rules = InMemoryRuleRepository::new();
            rules.add(Rule {
                key: RuleKey::parse("java:S1").unwrap(),
                rule_type: RuleType::CodeSmell,
                plugin_key: Some("java".into()),
                is_external: false,
                is_ad_hoc: false,
            });
            rules.add(Rule {
                key: RuleKey::parse("external_lint:E1").unwrap(),
                rule_type: RuleType::CodeSmell,
                plugin_key: None,
                is_external: true,
                is_ad_hoc: false,
            });
            Self {
                ctx: ctx(first_analysis),
                rules,
                active_rules: InMemoryActiveRulesHolder::new(),
                scm: InMemoryScmInfoRepository::new(),
                plugins: InMemoryScannerPluginRepository::new(),
                qprofiles: InMemoryQProfileStatusRepository::new(),
            }
        }

        fn activate_rule(&mut self, updated_at: DateTime<Utc>) {
            self.active_rules.add(ActiveRule {
                rule_key: RuleKey::parse("java:S1").unwrap(),
                plugin_key: Some("java".into()),
                updated_at,
                qprofile_key: Some("qp-1".into()),
            });
        }

        fn calculator(&self) -> IssueCreationDateCalculator<'_> {
            IssueCreationDateCalculator::new(
                &self.ctx,
                &self.rules,
                &self.active_rules,
                &self.scm,
                &self.plugins,
                &self.qprofiles,
            )
        }
    }

    fn file() -> Component {
        Component::file("file-1", "project:a.rs", FileStatus::Changed)
    }

    fn new_issue(rule: &str, line: Option<u32>) -> Issue {
        let mut issue = Issue::new(RuleKey::parse(rule).unwrap(), "file-1", analysis_date());
        issue.is_new = true;
        issue.line = line;
        issue
    }

    fn scm_date(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn existing_issues_are_never_backdated() {
        let mut fixture = Fixture::new(true);
        fixture.scm.set_line_dates("file-1", [(1, scm_date(1))]);
        let mut issue = new_issue("java:S1", Some(1));
        issue.is_new = false;

        fixture.calculator().calculate(&file(), &mut issue).unwrap();
        assert_eq!(issue.creation_date, analysis_date());
    }

    #[test]
    fn first_analysis_backdates_to_line_changeset() {
        let mut fixture = Fixture::new(true);
        fixture
            .scm
            .set_line_dates("file-1", [(1, scm_date(1)), (2, scm_date(5))]);
        let mut issue = new_issue("java:S1", Some(2));

        fixture.calculator().calculate(&file(), &mut issue).unwrap();
        assert_eq!(issue.creation_date, scm_date(5));
        assert_eq!(issue.update_date, Some(scm_date(5)));
    }

    #[test]
    fn unknown_rule_is_fatal() {
        let fixture = Fixture::new(true);
        let mut issue = new_issue("java:UNKNOWN", Some(1));
        assert!(matches!(
            fixture.calculator().calculate(&file(), &mut issue),
            Err(TrackingError::Store(_))
        ));
    }

    #[test]
    fn latest_changeset_wins_across_locations() {
        let mut fixture = Fixture::new(true);
        fixture
            .scm
            .set_line_dates("file-1", [(2, scm_date(5)), (7, scm_date(20))]);
        let mut issue = new_issue("java:S1", Some(2));
        issue
            .flows
            .push(Flow::of(vec![IssueLocation::in_same_file(TextRange::at_line(7))]));

        fixture.calculator().calculate(&file(), &mut issue).unwrap();
        assert_eq!(issue.creation_date, scm_date(20));
    }

    #[test]
    fn flow_locations_in_other_files_are_considered() {
        let mut fixture = Fixture::new(true);
        fixture.scm.set_line_dates("file-1", [(2, scm_date(5))]);
        fixture.scm.set_line_dates("file-2", [(9, scm_date(25))]);
        let mut issue = new_issue("java:S1", Some(2));
        issue.flows.push(Flow::of(vec![IssueLocation::in_file(
            "file-2",
            TextRange::at_line(9),
        )]));

        fixture.calculator().calculate(&file(), &mut issue).unwrap();
        assert_eq!(issue.creation_date, scm_date(25));
    }

    #[test]
    fn issue_without_location_uses_file_latest() {
        let mut fixture = Fixture::new(true);
        fixture
            .scm
            .set_line_dates("file-1", [(1, scm_date(1)), (5, scm_date(15))]);
        let mut issue = new_issue("java:S1", None);

        fixture.calculator().calculate(&file(), &mut issue).unwrap();
        assert_eq!(issue.creation_date, scm_date(15));
    }

    #[test]
    fn missing_scm_info_keeps_scan_date() {
        let fixture = Fixture::new(true);
        let mut issue = new_issue("java:S1", Some(1));
        fixture.calculator().calculate(&file(), &mut issue).unwrap();
        assert_eq!(issue.creation_date, analysis_date());
    }

    mod qualification {
        use super::*;

        #[test]
        fn stable_rule_on_later_analysis_keeps_scan_date() {
            let mut fixture = Fixture::new(false);
            fixture.activate_rule(previous_date() - Duration::days(100));
            fixture.plugins.add(ScannerPlugin {
                key: "java".into(),
                base_plugin_key: None,
                updated_at: previous_date() - Duration::days(100),
            });
            fixture.scm.set_line_dates("file-1", [(1, scm_date(1))]);
            let mut issue = new_issue("java:S1", Some(1));

            fixture.calculator().calculate(&file(), &mut issue).unwrap();
            assert_eq!(issue.creation_date, analysis_date());
        }

        #[test]
        fn rule_activation_change_triggers_backdating() {
            let mut fixture = Fixture::new(false);
            fixture.activate_rule(previous_date() + Duration::days(1));
            fixture.scm.set_line_dates("file-1", [(1, scm_date(1))]);
            let mut issue = new_issue("java:S1", Some(1));

            fixture.calculator().calculate(&file(), &mut issue).unwrap();
            assert_eq!(issue.creation_date, scm_date(1));
        }

        #[test]
        fn plugin_update_triggers_backdating() {
            let mut fixture = Fixture::new(false);
            fixture.activate_rule(previous_date() - Duration::days(100));
            fixture.plugins.add(ScannerPlugin {
                key: "java".into(),
                base_plugin_key: None,
                updated_at: previous_date() + Duration::days(1),
            });
            fixture.scm.set_line_dates("file-1", [(1, scm_date(1))]);
            let mut issue = new_issue("java:S1", Some(1));

            fixture.calculator().calculate(&file(), &mut issue).unwrap();
            assert_eq!(issue.creation_date, scm_date(1));
        }

        #[test]
        fn base_plugin_update_triggers_backdating() {
            let mut fixture = Fixture::new(false);
            fixture.activate_rule(previous_date() - Duration::days(100));
            fixture.plugins.add(ScannerPlugin {
                key: "java".into(),
                base_plugin_key: Some("base-java".into()),
                updated_at: previous_date() - Duration::days(100),
            });
            fixture.plugins.add(ScannerPlugin {
                key: "base-java".into(),
                base_plugin_key: None,
                updated_at: previous_date() + Duration::hours(1),
            });
            fixture.scm.set_line_dates("file-1", [(1, scm_date(1))]);
            let mut issue = new_issue("java:S1", Some(1));

            fixture.calculator().calculate(&file(), &mut issue).unwrap();
            assert_eq!(issue.creation_date, scm_date(1));
        }

        #[test]
        fn profile_change_triggers_backdating() {
            let mut fixture = Fixture::new(false);
            fixture.activate_rule(previous_date() - Duration::days(100));
            fixture.qprofiles.mark_changed("qp-1");
            fixture.scm.set_line_dates("file-1", [(1, scm_date(1))]);
            let mut issue = new_issue("java:S1", Some(1));

            fixture.calculator().calculate(&file(), &mut issue).unwrap();
            assert_eq!(issue.creation_date, scm_date(1));
        }

        #[test]
        fn new_file_triggers_backdating() {
            let mut fixture = Fixture::new(false);
            fixture.activate_rule(previous_date() - Duration::days(100));
            fixture.scm.set_line_dates("file-1", [(1, scm_date(1))]);
            let mut issue = new_issue("java:S1", Some(1));

            let added = Component::file("file-1", "project:a.rs", FileStatus::Added);
            fixture.calculator().calculate(&added, &mut issue).unwrap();
            assert_eq!(issue.creation_date, scm_date(1));
        }

        #[test]
        fn external_rules_always_qualify() {
            let mut fixture = Fixture::new(false);
            // No active rule registered for the external rule at all.
            fixture.scm.set_line_dates("file-1", [(1, scm_date(1))]);
            let mut issue = new_issue("external_lint:E1", Some(1));

            fixture.calculator().calculate(&file(), &mut issue).unwrap();
            assert_eq!(issue.creation_date, scm_date(1));
        }
    }

    #[test]
    fn backdating_is_idempotent() {
        let mut fixture = Fixture::new(true);
        fixture.scm.set_line_dates("file-1", [(1, scm_date(1))]);
        let mut issue = new_issue("java:S1", Some(1));

        fixture.calculator().calculate(&file(), &mut issue).unwrap();
        let after_first = issue.creation_date;
        fixture.calculator().calculate(&file(), &mut issue).unwrap();
        assert_eq!(issue.creation_date, after_first);
    }
}

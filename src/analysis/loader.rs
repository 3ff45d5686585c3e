//! analysis::loader
//!
//! Input supply: loads the issues and line hashes each comparison side
//! needs and packages them as `tracking::Input`s.
//!
//! # Closed-issue retention
//!
//! Closed issues are only loaded for reopening within a retention window
//! (`tracking.closed_issues_max_age`, default 30 days). The close-date
//! floor is anchored at midnight UTC of the cutoff day, so the window
//! covers whole days. A window of `0` disables the closed pass without
//! querying the store at all.
//!
//! # Moved files
//!
//! When a file was detected as moved/renamed, its base and closed inputs
//! load from the predecessor component so issue identity survives the
//! move.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use tracing::debug;

use super::component::Component;
use crate::core::config::{ClosedIssuesRetention, Settings};
use crate::core::hashes::LineHashSequence;
use crate::core::issue::{field, FieldDiffs, Issue, TextRange};
use crate::core::types::BranchName;
use crate::store::{IssueStore, MovedFilesRepository, ScanReport};
use crate::tracking::Input;

/// Loads base and closed issues for one component, applying the retention
/// window and reopening-diff selection.
pub struct ComponentIssuesLoader<'a> {
    store: &'a dyn IssueStore,
    settings: &'a Settings,
    now: DateTime<Utc>,
}

impl<'a> ComponentIssuesLoader<'a> {
    pub fn new(store: &'a dyn IssueStore, settings: &'a Settings, now: DateTime<Utc>) -> Self {
        Self {
            store,
            settings,
            now,
        }
    }

    /// Non-closed issues of the previous analysis.
    pub fn load_open_issues(&self, component_uuid: &str) -> Vec<Issue> {
        self.store.load_open_issues(component_uuid)
    }

    /// Closed issues inside the retention window; empty (without touching
    /// the store) when the window is disabled.
    pub fn load_closed_issues(&self, component_uuid: &str) -> Vec<Issue> {
        match self.settings.closed_issues_retention() {
            ClosedIssuesRetention::Disabled => {
                debug!(component_uuid, "closed-issue reopening disabled, skipping load");
                Vec::new()
            }
            ClosedIssuesRetention::MaxAge(days) => {
                let floor = self.close_date_floor(days);
                self.store.load_closed_issues(component_uuid, floor)
            }
        }
    }

    /// Midnight UTC of the day `days` days before now.
    fn close_date_floor(&self, days: u32) -> DateTime<Utc> {
        let cutoff = self.now - Duration::days(i64::from(days));
        cutoff.date_naive().and_time(NaiveTime::MIN).and_utc()
    }

    /// Replace each issue's change list with the diffs that matter for
    /// reopening: the most recent status change and the most recent
    /// resolution change. When both happened in the same change, a single
    /// entry is kept.
    pub fn load_latest_diff_changes_for_reopening(&self, issues: &mut [Issue]) {
        for issue in issues {
            let key = match issue.key() {
                Some(key) => *key,
                None => continue,
            };
            let changes = self.store.load_changes(&key);
            let status_idx = latest_change_of(&changes, field::STATUS);
            let resolution_idx = latest_change_of(&changes, field::RESOLUTION);

            let mut selected = Vec::new();
            match (status_idx, resolution_idx) {
                (Some(s), Some(r)) if s == r => selected.push(changes[s].clone()),
                (status, resolution) => {
                    let mut picked: Vec<&FieldDiffs> = Vec::new();
                    if let Some(s) = status {
                        picked.push(&changes[s]);
                    }
                    if let Some(r) = resolution {
                        picked.push(&changes[r]);
                    }
                    picked.sort_by_key(|c| c.creation_date);
                    selected.extend(picked.into_iter().cloned());
                }
            }
            issue.changes = selected;
        }
    }
}

/// Index of the most recent change containing a diff of the given field.
fn latest_change_of(changes: &[FieldDiffs], field: &str) -> Option<usize> {
    changes
        .iter()
        .enumerate()
        .filter(|(_, c)| c.diff(field).is_some())
        .max_by_key(|(idx, c)| (c.creation_date, *idx))
        .map(|(idx, _)| idx)
}

/// Builds the raw side of a comparison from the current scan.
///
/// Raw issues arrive without checksums; this factory computes them from
/// the current file content so the exact strategy has something to match
/// on. Blank lines get no checksum.
pub struct RawInputFactory<'a> {
    report: &'a dyn ScanReport,
}

impl<'a> RawInputFactory<'a> {
    pub fn new(report: &'a dyn ScanReport) -> Self {
        Self { report }
    }

    pub fn create(&self, component: &Component) -> Input<Issue> {
        let line_hashes = if component.is_file() {
            self.report
                .file_source(&component.uuid)
                .map(|source| LineHashSequence::of_source(&source))
                .unwrap_or_default()
        } else {
            LineHashSequence::empty()
        };

        let mut issues = self.report.raw_issues(&component.uuid);
        for issue in &mut issues {
            if issue.checksum.is_some() {
                continue;
            }
            if let Some(line) = issue.line {
                if !line_hashes.hash_for_line(line).is_empty() {
                    issue.checksum = line_hashes.range_checksum(TextRange::at_line(line));
                }
            }
        }
        Input::new(line_hashes, issues)
    }
}

/// Builds the base side: open issues and line hashes of the previous
/// analysis, following moved-file mappings.
pub struct BaseInputFactory<'a> {
    loader: &'a ComponentIssuesLoader<'a>,
    store: &'a dyn IssueStore,
    moved_files: &'a dyn MovedFilesRepository,
}

impl<'a> BaseInputFactory<'a> {
    pub fn new(
        loader: &'a ComponentIssuesLoader<'a>,
        store: &'a dyn IssueStore,
        moved_files: &'a dyn MovedFilesRepository,
    ) -> Self {
        Self {
            loader,
            store,
            moved_files,
        }
    }

    pub fn create(&self, component: &Component) -> Input<Issue> {
        let uuid = base_component_uuid(self.moved_files, component);
        let issues = self.loader.load_open_issues(&uuid);
        let line_hashes = self
            .store
            .load_line_hashes(&uuid)
            .map(LineHashSequence::from_hashes)
            .unwrap_or_default();
        Input::new(line_hashes, issues)
    }
}

/// Builds the closed side: recently closed issues, no file content (closed
/// issues match through their stored checksums and lines only).
pub struct ClosedIssuesInputFactory<'a> {
    loader: &'a ComponentIssuesLoader<'a>,
    moved_files: &'a dyn MovedFilesRepository,
}

impl<'a> ClosedIssuesInputFactory<'a> {
    pub fn new(
        loader: &'a ComponentIssuesLoader<'a>,
        moved_files: &'a dyn MovedFilesRepository,
    ) -> Self {
        Self {
            loader,
            moved_files,
        }
    }

    pub fn create(&self, component: &Component) -> Input<Issue> {
        let uuid = base_component_uuid(self.moved_files, component);
        Input::no_content(self.loader.load_closed_issues(&uuid))
    }
}

fn base_component_uuid(moved_files: &dyn MovedFilesRepository, component: &Component) -> String {
    match moved_files.original_file(&component.uuid) {
        Some(original) => {
            debug!(
                component_uuid = %component.uuid,
                original_uuid = %original.uuid,
                "loading base issues from moved-file predecessor"
            );
            original.uuid.clone()
        }
        None => component.uuid.clone(),
    }
}

/// Builds comparison sides living on another branch, resolved through the
/// component key.
pub struct BranchInputFactory<'a> {
    store: &'a dyn IssueStore,
}

impl<'a> BranchInputFactory<'a> {
    pub fn new(store: &'a dyn IssueStore) -> Self {
        Self { store }
    }

    /// Open issues of the file on the given branch; empty when the file
    /// does not exist there.
    pub fn create_open(&self, branch: &BranchName, component: &Component) -> Input<Issue> {
        match self.store.branch_component_uuid(branch, &component.key) {
            Some(uuid) => {
                let issues = self.store.load_open_issues(&uuid);
                let line_hashes = self
                    .store
                    .load_line_hashes(&uuid)
                    .map(LineHashSequence::from_hashes)
                    .unwrap_or_default();
                Input::new(line_hashes, issues)
            }
            None => Input::no_content(Vec::new()),
        }
    }

    /// RESOLVED issues of the file on the given branch.
    pub fn create_resolved(&self, branch: &BranchName, component: &Component) -> Input<Issue> {
        match self.store.branch_component_uuid(branch, &component.key) {
            Some(uuid) => Input::no_content(self.store.load_resolved_issues(&uuid)),
            None => Input::no_content(Vec::new()),
        }
    }
}

//! tracking::input
//!
//! One side of a tracking comparison.
//!
//! An [`Input`] bundles the line-hash sequence of a file revision, the
//! block-hash sequence derived from it, and the issues to match on that
//! side. Inputs are immutable once built; factories in `analysis` cache
//! them per component.
//!
//! The [`Trackable`] trait is the minimal surface the matching engine
//! needs from an issue. `core::issue::Issue` implements it, and tests can
//! implement it on lightweight stand-ins.

use crate::core::hashes::{BlockHashSequence, LineHashSequence};
use crate::core::issue::Issue;
use crate::core::types::RuleKey;

/// What the matching engine needs to know about one issue.
pub trait Trackable {
    fn rule_key(&self) -> &RuleKey;
    fn line(&self) -> Option<u32>;
    fn message(&self) -> Option<&str>;
    /// Whitespace-insensitive hash of the issue's text range, if it has one.
    fn checksum(&self) -> Option<&str>;
}

impl<T: Trackable> Trackable for &T {
    fn rule_key(&self) -> &RuleKey {
        (*self).rule_key()
    }

    fn line(&self) -> Option<u32> {
        (*self).line()
    }

    fn message(&self) -> Option<&str> {
        (*self).message()
    }

    fn checksum(&self) -> Option<&str> {
        (*self).checksum()
    }
}

impl Trackable for Issue {
    fn rule_key(&self) -> &RuleKey {
        &self.rule_key
    }

    fn line(&self) -> Option<u32> {
        self.line
    }

    fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }
}

/// Immutable bundle of (line hashes, block hashes, issues) for one side of
/// a comparison.
#[derive(Debug, Clone)]
pub struct Input<T> {
    line_hashes: LineHashSequence,
    block_hashes: BlockHashSequence,
    issues: Vec<T>,
}

impl<T: Trackable> Input<T> {
    /// Build an input from a file's line hashes; the block-hash sequence is
    /// derived here.
    pub fn new(line_hashes: LineHashSequence, issues: Vec<T>) -> Self {
        let block_hashes = BlockHashSequence::create(&line_hashes);
        Self {
            line_hashes,
            block_hashes,
            issues,
        }
    }

    /// Build an input with no file content (project-level components,
    /// closed-issue inputs). Issues can still match through their stored
    /// checksums and lines.
    pub fn no_content(issues: Vec<T>) -> Self {
        Self {
            line_hashes: LineHashSequence::empty(),
            block_hashes: BlockHashSequence::empty(),
            issues,
        }
    }

    pub fn line_hashes(&self) -> &LineHashSequence {
        &self.line_hashes
    }

    pub fn block_hashes(&self) -> &BlockHashSequence {
        &self.block_hashes
    }

    pub fn issues(&self) -> &[T] {
        &self.issues
    }

    pub fn into_issues(self) -> Vec<T> {
        self.issues
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn issue_is_trackable() {
        let rule = RuleKey::parse("java:S1135").unwrap();
        let date = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut issue = Issue::new(rule.clone(), "file-1", date);
        issue.line = Some(7);
        issue.message = Some("remove this".into());
        issue.checksum = Some("abc".into());

        assert_eq!(Trackable::rule_key(&issue), &rule);
        assert_eq!(Trackable::line(&issue), Some(7));
        assert_eq!(Trackable::message(&issue), Some("remove this"));
        assert_eq!(Trackable::checksum(&issue), Some("abc"));
    }

    #[test]
    fn new_derives_block_hashes() {
        let lines = LineHashSequence::of_source("a\nb\nc");
        let input: Input<Issue> = Input::new(lines, Vec::new());
        assert!(input.block_hashes().block_hash_for_line(1).is_some());
        assert_eq!(input.line_hashes().length(), 3);
    }

    #[test]
    fn no_content_input_has_empty_sequences() {
        let input: Input<Issue> = Input::no_content(Vec::new());
        assert_eq!(input.line_hashes().length(), 0);
        assert!(input.block_hashes().block_hash_for_line(1).is_none());
    }
}

//! tracking::tracker
//!
//! The matching engine.
//!
//! # Algorithm
//!
//! Matching runs in strict priority order; every raw and base issue is
//! consumed by at most one match:
//!
//! 1. **Exact**: same rule key, same line, identical text-range checksum —
//!    the issue did not move and its code did not change.
//! 2. **Same line**: same rule key, same line, for issues without a text
//!    range (no checksum on at least one side).
//! 3. **Block**: same rule key and equal matching hash at shifted lines.
//!    The matching hash is the stored checksum when present, otherwise the
//!    block hash at the issue's line. Ties resolve to the smallest line
//!    shift, so a moved block reconciles to its nearest origin.
//!
//! Anything left over lands in `unmatched_raws` / `unmatched_bases`.
//!
//! # Two passes
//!
//! [`Tracker::track_non_closed`] compares raw issues against open base
//! issues. When unmatched raws remain, the result is incomplete and
//! [`Tracker::track_closed`] must run them against recently closed issues,
//! so a just-fixed-then-reintroduced issue reopens under its old identity
//! instead of getting a fresh key. First analyses have no base and skip
//! the closed pass.

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use super::input::{Input, Trackable};
use super::result::{NonClosedTracking, Tracking};
use crate::core::types::RuleKey;

/// The hash-sequence-based matching engine.
pub struct Tracker;

/// Which side of the tracking result a match lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Base,
    Closed,
}

impl Tracker {
    /// Match raw issues against open base issues.
    pub fn track_non_closed<R: Trackable, B: Trackable>(
        raw: &Input<R>,
        base: &Input<B>,
    ) -> NonClosedTracking {
        let mut tracking = Tracking::new(raw.issues().len(), base.issues().len());
        run_strategies(&mut tracking, raw, base, Target::Base);
        debug!(
            raws = raw.issues().len(),
            bases = base.issues().len(),
            matched = tracking.matched_pairs().count(),
            "tracked against open base issues"
        );
        NonClosedTracking::of(tracking)
    }

    /// Match the remaining unmatched raws against closed issues.
    pub fn track_closed<R: Trackable, B: Trackable>(
        mut partial: NonClosedTracking,
        raw: &Input<R>,
        closed: &Input<B>,
    ) -> Tracking {
        run_strategies(partial.tracking_mut(), raw, closed, Target::Closed);
        let tracking = partial.into_tracking();
        debug!(
            closed = closed.issues().len(),
            reopened = tracking.closed_pairs().count(),
            "tracked against closed issues"
        );
        tracking
    }
}

/// Single-pass tracker matching on the full issue signature (rule, line,
/// message, checksum). Used when comparing issues of sibling branches or
/// pull requests that analyzed the same code, where nothing has moved.
pub struct SimpleTracker;

impl SimpleTracker {
    pub fn track<R: Trackable, B: Trackable>(raws: &[R], bases: &[B]) -> Tracking {
        let mut tracking = Tracking::new(raws.len(), bases.len());

        let mut buckets: HashMap<SignatureKey, VecDeque<usize>> = HashMap::new();
        for (idx, base) in bases.iter().enumerate() {
            buckets.entry(SignatureKey::of(base)).or_default().push_back(idx);
        }
        for (raw_idx, raw) in raws.iter().enumerate() {
            if let Some(bucket) = buckets.get_mut(&SignatureKey::of(raw)) {
                if let Some(base_idx) = bucket.pop_front() {
                    tracking.record_base_match(raw_idx, base_idx);
                }
            }
        }
        tracking
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SignatureKey {
    rule_key: RuleKey,
    line: Option<u32>,
    message: Option<String>,
    checksum: Option<String>,
}

impl SignatureKey {
    fn of<T: Trackable>(issue: &T) -> Self {
        Self {
            rule_key: issue.rule_key().clone(),
            line: issue.line(),
            message: issue.message().map(str::to_string),
            checksum: nonblank(issue.checksum()).map(str::to_string),
        }
    }
}

fn run_strategies<R: Trackable, B: Trackable>(
    tracking: &mut Tracking,
    raw_input: &Input<R>,
    other_input: &Input<B>,
    target: Target,
) {
    let mut raw_open: Vec<usize> = tracking.unmatched_raws().collect();
    let mut other_consumed = vec![false; other_input.issues().len()];

    match_exact(tracking, raw_input, other_input, target, &mut raw_open, &mut other_consumed);
    match_same_line(tracking, raw_input, other_input, target, &mut raw_open, &mut other_consumed);
    match_block(tracking, raw_input, other_input, target, &mut raw_open, &mut other_consumed);
}

fn record(tracking: &mut Tracking, target: Target, raw: usize, other: usize) {
    match target {
        Target::Base => tracking.record_base_match(raw, other),
        Target::Closed => tracking.record_closed_match(raw, other),
    }
}

fn nonblank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Strategy 1: same rule, same line, same checksum.
fn match_exact<R: Trackable, B: Trackable>(
    tracking: &mut Tracking,
    raw_input: &Input<R>,
    other_input: &Input<B>,
    target: Target,
    raw_open: &mut Vec<usize>,
    other_consumed: &mut [bool],
) {
    let mut buckets: HashMap<(RuleKey, u32, String), VecDeque<usize>> = HashMap::new();
    for (idx, other) in other_input.issues().iter().enumerate() {
        if other_consumed[idx] {
            continue;
        }
        if let (Some(line), Some(checksum)) = (other.line(), nonblank(other.checksum())) {
            buckets
                .entry((other.rule_key().clone(), line, checksum.to_string()))
                .or_default()
                .push_back(idx);
        }
    }

    raw_open.retain(|&raw_idx| {
        let raw = &raw_input.issues()[raw_idx];
        let (line, checksum) = match (raw.line(), nonblank(raw.checksum())) {
            (Some(line), Some(checksum)) => (line, checksum),
            _ => return true,
        };
        let key = (raw.rule_key().clone(), line, checksum.to_string());
        if let Some(bucket) = buckets.get_mut(&key) {
            if let Some(other_idx) = bucket.pop_front() {
                record(tracking, target, raw_idx, other_idx);
                other_consumed[other_idx] = true;
                return false;
            }
        }
        true
    });
}

/// Strategy 2: same rule and line, for issues without a text range.
fn match_same_line<R: Trackable, B: Trackable>(
    tracking: &mut Tracking,
    raw_input: &Input<R>,
    other_input: &Input<B>,
    target: Target,
    raw_open: &mut Vec<usize>,
    other_consumed: &mut [bool],
) {
    let mut buckets: HashMap<(RuleKey, u32), Vec<usize>> = HashMap::new();
    for (idx, other) in other_input.issues().iter().enumerate() {
        if other_consumed[idx] {
            continue;
        }
        if let Some(line) = other.line() {
            buckets
                .entry((other.rule_key().clone(), line))
                .or_default()
                .push(idx);
        }
    }

    raw_open.retain(|&raw_idx| {
        let raw = &raw_input.issues()[raw_idx];
        let line = match raw.line() {
            Some(line) => line,
            None => return true,
        };
        let raw_has_checksum = nonblank(raw.checksum()).is_some();
        let key = (raw.rule_key().clone(), line);
        if let Some(bucket) = buckets.get(&key) {
            for &other_idx in bucket {
                if other_consumed[other_idx] {
                    continue;
                }
                let other = &other_input.issues()[other_idx];
                // A changed checksum on both sides means the code changed;
                // that is the block strategy's business, not a line match.
                if raw_has_checksum && nonblank(other.checksum()).is_some() {
                    continue;
                }
                record(tracking, target, raw_idx, other_idx);
                other_consumed[other_idx] = true;
                return false;
            }
        }
        true
    });
}

/// Hash an issue matches on when its line number is allowed to differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum MatchHash {
    Checksum(String),
    Block(u64),
}

/// Strategy 3: same rule, equal matching hash, shifted line.
fn match_block<R: Trackable, B: Trackable>(
    tracking: &mut Tracking,
    raw_input: &Input<R>,
    other_input: &Input<B>,
    target: Target,
    raw_open: &mut Vec<usize>,
    other_consumed: &mut [bool],
) {
    let mut buckets: HashMap<(RuleKey, MatchHash), Vec<usize>> = HashMap::new();
    for (idx, other) in other_input.issues().iter().enumerate() {
        if other_consumed[idx] {
            continue;
        }
        if let Some(hash) = match_hash_of(other, other_input) {
            buckets
                .entry((other.rule_key().clone(), hash))
                .or_default()
                .push(idx);
        }
    }

    raw_open.retain(|&raw_idx| {
        let raw = &raw_input.issues()[raw_idx];
        let hash = match match_hash_of(raw, raw_input) {
            Some(hash) => hash,
            None => return true,
        };
        let key = (raw.rule_key().clone(), hash);
        let bucket = match buckets.get(&key) {
            Some(bucket) => bucket,
            None => return true,
        };

        let mut best: Option<(u64, usize)> = None;
        for &other_idx in bucket {
            if other_consumed[other_idx] {
                continue;
            }
            let other = &other_input.issues()[other_idx];
            let shift = line_shift(raw.line(), other.line());
            if best.map_or(true, |(best_shift, _)| shift < best_shift) {
                best = Some((shift, other_idx));
            }
        }

        if let Some((_, other_idx)) = best {
            record(tracking, target, raw_idx, other_idx);
            other_consumed[other_idx] = true;
            false
        } else {
            true
        }
    });
}

fn match_hash_of<T: Trackable>(issue: &T, input: &Input<T>) -> Option<MatchHash> {
    if let Some(checksum) = nonblank(issue.checksum()) {
        return Some(MatchHash::Checksum(checksum.to_string()));
    }
    issue
        .line()
        .and_then(|line| input.block_hashes().block_hash_for_line(line))
        .map(MatchHash::Block)
}

fn line_shift(raw_line: Option<u32>, other_line: Option<u32>) -> u64 {
    match (raw_line, other_line) {
        (Some(r), Some(o)) => u64::from(r.abs_diff(o)),
        (None, None) => 0,
        _ => u64::MAX,
    }
}

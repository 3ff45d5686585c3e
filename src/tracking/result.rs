//! tracking::result
//!
//! Outcome of one tracking comparison.
//!
//! A [`Tracking`] relates issues by index: raw indices point into the raw
//! input's issue collection, base indices into the base input's, closed
//! indices into the closed input's. Index-based results keep the engine
//! pure — issue ownership and mutation stay with the caller.
//!
//! [`NonClosedTracking`] is the intermediate result after matching against
//! open base issues only. It is *incomplete* while unmatched raws remain,
//! because a second pass against recently closed issues may still claim
//! them; callers must run that pass (or establish that no base exists, as
//! on first analysis) before treating the result as final.

use std::collections::{BTreeMap, BTreeSet};

/// Final result of one comparison: matches against open bases and, when the
/// closed pass ran, against closed issues.
#[derive(Debug, Clone, Default)]
pub struct Tracking {
    raw_count: usize,
    base_count: usize,
    raw_to_base: BTreeMap<usize, usize>,
    raw_to_closed: BTreeMap<usize, usize>,
    matched_bases: BTreeSet<usize>,
    matched_closed: BTreeSet<usize>,
}

impl Tracking {
    pub(crate) fn new(raw_count: usize, base_count: usize) -> Self {
        Self {
            raw_count,
            base_count,
            ..Self::default()
        }
    }

    pub(crate) fn record_base_match(&mut self, raw: usize, base: usize) {
        debug_assert!(!self.is_raw_matched(raw), "raw {raw} matched twice");
        debug_assert!(!self.matched_bases.contains(&base), "base {base} matched twice");
        self.raw_to_base.insert(raw, base);
        self.matched_bases.insert(base);
    }

    pub(crate) fn record_closed_match(&mut self, raw: usize, closed: usize) {
        debug_assert!(!self.is_raw_matched(raw), "raw {raw} matched twice");
        debug_assert!(
            !self.matched_closed.contains(&closed),
            "closed {closed} matched twice"
        );
        self.raw_to_closed.insert(raw, closed);
        self.matched_closed.insert(closed);
    }

    /// Number of issues on the raw side.
    pub fn raw_count(&self) -> usize {
        self.raw_count
    }

    /// Number of issues on the base side.
    pub fn base_count(&self) -> usize {
        self.base_count
    }

    /// Base index matched to the given raw, if any.
    pub fn base_for_raw(&self, raw: usize) -> Option<usize> {
        self.raw_to_base.get(&raw).copied()
    }

    /// Closed index matched to the given raw, if any.
    pub fn closed_for_raw(&self, raw: usize) -> Option<usize> {
        self.raw_to_closed.get(&raw).copied()
    }

    /// Whether the raw issue was matched to either an open or closed base.
    pub fn is_raw_matched(&self, raw: usize) -> bool {
        self.raw_to_base.contains_key(&raw) || self.raw_to_closed.contains_key(&raw)
    }

    /// All (raw, base) pairs, in raw order.
    pub fn matched_pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.raw_to_base.iter().map(|(&r, &b)| (r, b))
    }

    /// All (raw, closed) pairs, in raw order.
    pub fn closed_pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.raw_to_closed.iter().map(|(&r, &c)| (r, c))
    }

    /// Raw indices matched by neither pass, in order.
    pub fn unmatched_raws(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.raw_count).filter(move |r| !self.is_raw_matched(*r))
    }

    /// Base indices no raw issue claimed, in order.
    pub fn unmatched_bases(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.base_count).filter(move |b| !self.matched_bases.contains(b))
    }
}

/// Tracking against open base issues only; the closed pass has not run.
#[derive(Debug, Clone)]
pub struct NonClosedTracking {
    tracking: Tracking,
}

impl NonClosedTracking {
    pub(crate) fn of(tracking: Tracking) -> Self {
        Self { tracking }
    }

    /// `false` while unmatched raws remain — a closed-issue pass could
    /// still claim them, so the result must not be treated as final.
    pub fn is_complete(&self) -> bool {
        self.tracking.unmatched_raws().next().is_none()
    }

    pub fn as_tracking(&self) -> &Tracking {
        &self.tracking
    }

    /// Give up on the closed pass (first analysis: nothing is closed yet).
    pub fn into_tracking(self) -> Tracking {
        self.tracking
    }

    pub(crate) fn tracking_mut(&mut self) -> &mut Tracking {
        &mut self.tracking
    }
}

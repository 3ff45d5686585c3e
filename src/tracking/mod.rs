//! tracking
//!
//! The matching engine: given two [`Input`]s, relate the issues of the
//! current scan to the issues already known for the component.
//!
//! # Modules
//!
//! - [`input`] - Comparison sides: hash sequences plus issue collections
//! - [`tracker`] - The priority-ordered matching strategies
//! - [`result`] - Index-based tracking results
//!
//! # Invariants
//!
//! - Matching is pure: inputs are never mutated, results refer to issues
//!   by index
//! - Every raw and base issue participates in at most one match
//! - A tracking with unmatched raws is incomplete until the closed-issue
//!   pass has run (or no base exists, as on first analysis)

pub mod input;
pub mod result;
pub mod tracker;

pub use input::{Input, Trackable};
pub use result::{NonClosedTracking, Tracking};
pub use tracker::{SimpleTracker, Tracker};

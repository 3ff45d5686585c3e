//! core::hashes
//!
//! Content hashing used by issue matching.
//!
//! # Types
//!
//! - [`LineHashSequence`] - per-line, whitespace-insensitive content hashes
//! - [`BlockHashSequence`] - per-line hashes over a surrounding window of
//!   lines, tolerant to contiguous shifts
//!
//! Line hashes ignore all whitespace so that re-indentation does not break
//! issue identity. Blank lines hash to the empty string.
//!
//! # Example
//!
//! ```
//! use trackwork::core::hashes::LineHashSequence;
//! use trackwork::core::issue::TextRange;
//!
//! let hashes = LineHashSequence::of_source("fn main() {\n    let x = 1;\n}\n");
//! assert_eq!(hashes.length(), 3);
//!
//! // Indentation does not matter
//! let reindented = LineHashSequence::of_source("fn main() {\nlet x = 1;\n}\n");
//! assert_eq!(
//!     hashes.hash_for_line(2),
//!     reindented.hash_for_line(2),
//! );
//!
//! let checksum = hashes.range_checksum(TextRange::new(1, 2)).unwrap();
//! assert_eq!(reindented.range_checksum(TextRange::new(1, 2)).unwrap(), checksum);
//! ```

use sha2::{Digest, Sha256};

use crate::core::issue::TextRange;

/// Default half-size of the block window: a block covers the line itself
/// plus up to this many lines above and below.
pub const DEFAULT_HALF_BLOCK_SIZE: usize = 5;

const BLOCK_HASH_PRIME: u64 = 31;

/// Hash one line of source, ignoring every whitespace character.
///
/// Blank (or whitespace-only) lines hash to the empty string so that
/// issues anchored on them never checksum-match.
pub fn hash_line(line: &str) -> String {
    let stripped: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    if stripped.is_empty() {
        return String::new();
    }
    let mut hasher = Sha256::new();
    hasher.update(stripped.as_bytes());
    hex::encode(hasher.finalize())
}

/// Ordered sequence of line hashes for one file, 1-based.
///
/// Built from current source for the raw side of a comparison, or restored
/// from storage for the base side (the previous analysis persisted its own
/// line hashes).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineHashSequence {
    hashes: Vec<String>,
}

impl LineHashSequence {
    /// Hash every line of the given source text.
    pub fn of_source(source: &str) -> Self {
        let mut lines: Vec<&str> = source.split('\n').collect();
        // A trailing newline is not an extra empty line.
        if lines.last() == Some(&"") {
            lines.pop();
        }
        Self::of_lines(&lines)
    }

    /// Hash each of the given lines.
    pub fn of_lines<S: AsRef<str>>(lines: &[S]) -> Self {
        Self {
            hashes: lines.iter().map(|l| hash_line(l.as_ref())).collect(),
        }
    }

    /// Restore a sequence from already-computed hashes.
    pub fn from_hashes(hashes: Vec<String>) -> Self {
        Self { hashes }
    }

    /// A sequence with no lines at all (non-file components).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of lines.
    pub fn length(&self) -> usize {
        self.hashes.len()
    }

    /// Whether the 1-based line exists in the file.
    pub fn has_line(&self, line: u32) -> bool {
        line >= 1 && (line as usize) <= self.hashes.len()
    }

    /// Hash of the 1-based line; empty string for blank or missing lines.
    pub fn hash_for_line(&self, line: u32) -> &str {
        if !self.has_line(line) {
            return "";
        }
        &self.hashes[line as usize - 1]
    }

    /// All line hashes in order.
    pub fn hashes(&self) -> &[String] {
        &self.hashes
    }

    /// Checksum over the lines of a text range.
    ///
    /// Returns `None` when the range starts outside the file or is empty.
    /// The end is clamped to the last line, so a range reaching past the
    /// end of file still produces a checksum over the lines that exist.
    pub fn range_checksum(&self, range: TextRange) -> Option<String> {
        if range.start_line < 1 || range.end_line < range.start_line {
            return None;
        }
        if !self.has_line(range.start_line) {
            return None;
        }
        let end = (range.end_line as usize).min(self.hashes.len());
        let mut hasher = Sha256::new();
        for hash in &self.hashes[range.start_line as usize - 1..end] {
            hasher.update(hash.as_bytes());
            hasher.update(b"\n");
        }
        Some(hex::encode(hasher.finalize()))
    }
}

/// Per-line hashes over a window of surrounding lines.
///
/// The hash for line `i` covers lines `i - H ..= i + H` (clamped to the
/// file), combined in order with a polynomial rolling scheme. Two lines in
/// different revisions of a file get the same block hash when the whole
/// surrounding block moved without internal edits, which is what makes
/// matching survive insertions and deletions elsewhere in the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockHashSequence {
    block_hashes: Vec<u64>,
}

impl BlockHashSequence {
    /// Build with the default half-block size.
    pub fn create(lines: &LineHashSequence) -> Self {
        Self::with_half_block_size(lines, DEFAULT_HALF_BLOCK_SIZE)
    }

    /// Build with an explicit half-block size (window = `2 * half + 1`).
    pub fn with_half_block_size(lines: &LineHashSequence, half_block_size: usize) -> Self {
        let len = lines.length();
        let mut block_hashes = Vec::with_capacity(len);
        for line in 1..=len {
            let start = line.saturating_sub(half_block_size).max(1);
            let end = (line + half_block_size).min(len);
            let mut acc: u64 = 0;
            for l in start..=end {
                acc = acc
                    .wrapping_mul(BLOCK_HASH_PRIME)
                    .wrapping_add(line_hash_value(lines.hash_for_line(l as u32)));
            }
            block_hashes.push(acc);
        }
        Self { block_hashes }
    }

    /// An empty sequence (non-file components).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Block hash of the 1-based line, or `None` outside the file.
    pub fn block_hash_for_line(&self, line: u32) -> Option<u64> {
        if line < 1 {
            return None;
        }
        self.block_hashes.get(line as usize - 1).copied()
    }
}

/// Numeric value of one line hash for block hashing: the first 16 hex
/// digits of the digest; blank lines contribute 0.
fn line_hash_value(hash: &str) -> u64 {
    if hash.is_empty() {
        return 0;
    }
    u64::from_str_radix(&hash[..16.min(hash.len())], 16).unwrap_or(0)
}

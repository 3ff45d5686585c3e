//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`RuleKey`] - Qualified rule identifier (`repository:rule`)
//! - [`IssueKey`] - Stable issue identity, assigned once and never changed
//! - [`BranchName`] - Validated branch name
//!
//! # Validation
//!
//! These types enforce validity at construction time. Invalid values
//! cannot be represented, preventing entire classes of bugs.
//!
//! # Examples
//!
//! ```
//! use trackwork::core::types::{BranchName, IssueKey, RuleKey};
//!
//! // Valid constructions
//! let rule = RuleKey::parse("java:S1135").unwrap();
//! assert_eq!(rule.repository(), "java");
//! assert_eq!(rule.rule(), "S1135");
//!
//! let key = IssueKey::generate();
//! let branch = BranchName::new("feature/my-branch").unwrap();
//!
//! // Invalid constructions fail at creation time
//! assert!(RuleKey::parse("no-colon").is_err());
//! assert!(BranchName::new("").is_err());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Repository prefix used by rules imported from external analyzers.
const EXTERNAL_REPOSITORY_PREFIX: &str = "external_";

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid rule key: {0}")]
    InvalidRuleKey(String),

    #[error("invalid issue key: {0}")]
    InvalidIssueKey(String),

    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),
}

/// A qualified rule identifier.
///
/// Rule keys have the form `repository:rule`, e.g. `java:S1135`. Both parts
/// must be non-empty; the rule part may itself contain colons (the split is
/// on the first colon only).
///
/// # Example
///
/// ```
/// use trackwork::core::types::RuleKey;
///
/// let key = RuleKey::parse("java:S1135").unwrap();
/// assert_eq!(key.repository(), "java");
/// assert_eq!(key.rule(), "S1135");
/// assert_eq!(key.to_string(), "java:S1135");
///
/// // External analyzer rules are recognized by repository prefix
/// let ext = RuleKey::parse("external_pylint:C0111").unwrap();
/// assert!(ext.is_external());
///
/// assert!(RuleKey::parse("missing-rule-part:").is_err());
/// assert!(RuleKey::parse(":missing-repo").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RuleKey {
    repository: String,
    rule: String,
}

impl RuleKey {
    /// Create a rule key from its two parts.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRuleKey` if either part is empty or
    /// contains whitespace.
    pub fn new(repository: impl Into<String>, rule: impl Into<String>) -> Result<Self, TypeError> {
        let repository = repository.into();
        let rule = rule.into();
        Self::validate_part(&repository, "repository")?;
        Self::validate_part(&rule, "rule")?;
        Ok(Self { repository, rule })
    }

    /// Parse a `repository:rule` string.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRuleKey` if the string has no colon or
    /// either part is empty.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let (repository, rule) = s
            .split_once(':')
            .ok_or_else(|| TypeError::InvalidRuleKey(format!("missing ':' in '{s}'")))?;
        Self::new(repository, rule)
    }

    fn validate_part(part: &str, what: &str) -> Result<(), TypeError> {
        if part.is_empty() {
            return Err(TypeError::InvalidRuleKey(format!("{what} part is empty")));
        }
        if part.chars().any(char::is_whitespace) {
            return Err(TypeError::InvalidRuleKey(format!(
                "{what} part contains whitespace"
            )));
        }
        Ok(())
    }

    /// The rule repository (analyzer) part.
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// The rule part.
    pub fn rule(&self) -> &str {
        &self.rule
    }

    /// Whether the rule comes from an external analyzer report.
    ///
    /// External rules live in repositories prefixed with `external_` and are
    /// not part of any quality profile.
    pub fn is_external(&self) -> bool {
        self.repository.starts_with(EXTERNAL_REPOSITORY_PREFIX)
    }
}

impl TryFrom<String> for RuleKey {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<RuleKey> for String {
    fn from(key: RuleKey) -> Self {
        key.to_string()
    }
}

impl std::fmt::Display for RuleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.repository, self.rule)
    }
}

/// Stable issue identity.
///
/// Keys are UUIDs assigned when an issue is first initialized. Once an
/// issue carries a key it keeps it for its whole life: matching transfers
/// the base issue's key onto the raw issue instead of minting a new one.
///
/// # Example
///
/// ```
/// use trackwork::core::types::IssueKey;
///
/// let key = IssueKey::generate();
/// let parsed = IssueKey::parse(&key.to_string()).unwrap();
/// assert_eq!(key, parsed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IssueKey(Uuid);

impl IssueKey {
    /// Mint a fresh key.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a key from its hyphenated string form.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidIssueKey` if the string is not a UUID.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| TypeError::InvalidIssueKey(e.to_string()))
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl TryFrom<String> for IssueKey {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<IssueKey> for String {
    fn from(key: IssueKey) -> Self {
        key.to_string()
    }
}

impl std::fmt::Display for IssueKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// A validated branch name.
///
/// Branch names arrive from analysis metadata and are used verbatim in
/// provenance records, so the basic refname rules are enforced here:
/// - Cannot be empty
/// - Cannot start with `.` or `-`
/// - Cannot end with `/`
/// - Cannot contain `..`, `//`, whitespace, or ASCII control characters
///
/// # Example
///
/// ```
/// use trackwork::core::types::BranchName;
///
/// let name = BranchName::new("feature/my-branch").unwrap();
/// assert_eq!(name.as_str(), "feature/my-branch");
///
/// assert!(BranchName::new("").is_err());
/// assert!(BranchName::new("bad..name").is_err());
/// assert!(BranchName::new("has space").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// Create a new validated branch name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidBranchName` if the name violates the
    /// refname rules above.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), TypeError> {
        if name.is_empty() {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot be empty".into(),
            ));
        }
        if name.starts_with('.') || name.starts_with('-') {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot start with '.' or '-'".into(),
            ));
        }
        if name.ends_with('/') {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot end with '/'".into(),
            ));
        }
        if name.contains("..") || name.contains("//") {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot contain '..' or '//'".into(),
            ));
        }
        for c in name.chars() {
            if c.is_whitespace() {
                return Err(TypeError::InvalidBranchName(
                    "branch name cannot contain whitespace".into(),
                ));
            }
            if c.is_ascii_control() {
                return Err(TypeError::InvalidBranchName(
                    "branch name cannot contain control characters".into(),
                ));
            }
        }
        Ok(())
    }

    /// Get the branch name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BranchName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<BranchName> for String {
    fn from(name: BranchName) -> Self {
        name.0
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//! core::config
//!
//! Analysis settings and loading.
//!
//! # Overview
//!
//! Settings are a flat key/value map, loaded from a TOML file (nested
//! tables flatten into dotted keys) or set programmatically by the host.
//! Typed accessors apply defaults and fall back on invalid values instead
//! of failing the analysis: a bad retention setting must not abort a task
//! that is otherwise fine.
//!
//! # Keys
//!
//! - `tracking.closed_issues_max_age` — days a closed issue stays eligible
//!   for reopening. Default 30; `0` disables closed-issue lookups entirely;
//!   negative or non-numeric values fall back to the default with a
//!   warning.
//!
//! # Example
//!
//! ```
//! use trackwork::core::config::{ClosedIssuesRetention, Settings};
//!
//! let mut settings = Settings::new();
//! assert_eq!(
//!     settings.closed_issues_retention(),
//!     ClosedIssuesRetention::MaxAge(30)
//! );
//!
//! settings.set("tracking.closed_issues_max_age", "0");
//! assert_eq!(
//!     settings.closed_issues_retention(),
//!     ClosedIssuesRetention::Disabled
//! );
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

/// Setting key for the closed-issue retention window, in days.
pub const CLOSED_ISSUES_MAX_AGE_KEY: &str = "tracking.closed_issues_max_age";

/// Default closed-issue retention window, in days.
pub const DEFAULT_CLOSED_ISSUES_MAX_AGE: u32 = 30;

/// Errors from settings operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse settings file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },
}

/// Warnings generated while loading or validating settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    /// The setting key that triggered the warning.
    pub key: String,
    /// The warning message.
    pub message: String,
}

/// Result of loading settings from a file.
#[derive(Debug)]
pub struct SettingsLoadResult {
    pub settings: Settings,
    pub warnings: Vec<ConfigWarning>,
}

/// How long closed issues stay eligible for reopening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosedIssuesRetention {
    /// Closed issues are never loaded; the store is not even queried.
    Disabled,
    /// Closed issues whose close date is within this many days are loaded.
    MaxAge(u32),
}

/// Flat key/value analysis settings.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    values: BTreeMap<String, String>,
}

impl Settings {
    /// Empty settings; every accessor resolves to its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one value, replacing any previous one.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Raw value of one key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Load settings from a TOML file.
    ///
    /// Nested tables flatten into dotted keys, so
    ///
    /// ```toml
    /// [tracking]
    /// closed_issues_max_age = 15
    /// ```
    ///
    /// becomes `tracking.closed_issues_max_age = "15"`. Validation warnings
    /// (e.g. a non-numeric retention) are returned, not raised.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when the file cannot be read or is not valid
    /// TOML. Invalid *values* for known keys are warnings, not errors.
    pub fn load(path: &Path) -> Result<SettingsLoadResult, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let table: toml::Table =
            content
                .parse()
                .map_err(|e: toml::de::Error| ConfigError::ParseError {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;

        let mut settings = Settings::new();
        flatten_table(&mut settings, "", &table);
        let warnings = settings.validate();
        Ok(SettingsLoadResult { settings, warnings })
    }

    /// Validate known keys, returning a warning per value that will fall
    /// back to its default at access time.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        if let Some(raw) = self.get(CLOSED_ISSUES_MAX_AGE_KEY) {
            if !raw.trim().is_empty() && resolve_max_age(raw).is_none() {
                warnings.push(ConfigWarning {
                    key: CLOSED_ISSUES_MAX_AGE_KEY.to_string(),
                    message: format!(
                        "'{raw}' is not a non-negative number of days; \
                         using default of {DEFAULT_CLOSED_ISSUES_MAX_AGE}"
                    ),
                });
            }
        }
        warnings
    }

    /// Resolved closed-issue retention window.
    ///
    /// Absent or blank ⇒ default. `0` ⇒ disabled. Negative or non-numeric
    /// ⇒ default, with a warning logged.
    pub fn closed_issues_retention(&self) -> ClosedIssuesRetention {
        let raw = match self.get(CLOSED_ISSUES_MAX_AGE_KEY) {
            Some(raw) if !raw.trim().is_empty() => raw,
            _ => return ClosedIssuesRetention::MaxAge(DEFAULT_CLOSED_ISSUES_MAX_AGE),
        };
        match resolve_max_age(raw) {
            Some(0) => ClosedIssuesRetention::Disabled,
            Some(days) => ClosedIssuesRetention::MaxAge(days),
            None => {
                warn!(
                    key = CLOSED_ISSUES_MAX_AGE_KEY,
                    value = raw,
                    "invalid closed-issue retention, using default of {} days",
                    DEFAULT_CLOSED_ISSUES_MAX_AGE
                );
                ClosedIssuesRetention::MaxAge(DEFAULT_CLOSED_ISSUES_MAX_AGE)
            }
        }
    }
}

fn resolve_max_age(raw: &str) -> Option<u32> {
    raw.trim().parse::<i64>().ok().and_then(|days| {
        if (0..=i64::from(u32::MAX)).contains(&days) {
            Some(days as u32)
        } else {
            None
        }
    })
}

fn flatten_table(settings: &mut Settings, prefix: &str, table: &toml::Table) {
    for (key, value) in table {
        let full_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::Table(nested) => flatten_table(settings, &full_key, nested),
            toml::Value::String(s) => {
                settings.set(full_key, s.clone());
            }
            toml::Value::Array(items) => {
                let joined = items
                    .iter()
                    .map(toml_scalar_to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                settings.set(full_key, joined);
            }
            other => {
                settings.set(full_key, toml_scalar_to_string(other));
            }
        }
    }
}

fn toml_scalar_to_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

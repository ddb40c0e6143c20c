//! Scan result types
//!
//! A [`ScanResult`] is created exactly once per username and never mutated
//! afterwards; it is what the checkpoint stores and the report prints.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Overall outcome for one user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    /// At least one file was found
    Success,
    /// Nothing found in either namespace
    Empty,
    /// No usable count could be produced
    Error,
}

impl ScanStatus {
    /// Lowercase label used in reports
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Success => "success",
            ScanStatus::Empty => "empty",
            ScanStatus::Error => "error",
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which namespaces contributed files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSource {
    /// Both namespaces had files
    Both,
    /// Only DBFS had files
    SourceA,
    /// Only the Workspace had files
    SourceB,
    /// Neither namespace contributed
    None,
}

impl FileSource {
    /// Label used in reports
    pub fn as_str(&self) -> &'static str {
        match self {
            FileSource::Both => "both",
            FileSource::SourceA => "source_a",
            FileSource::SourceB => "source_b",
            FileSource::None => "none",
        }
    }
}

impl fmt::Display for FileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Merged per-user inventory record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub username: String,
    pub file_count: u64,
    /// Exact DBFS bytes plus estimated Workspace bytes
    pub total_size: u64,
    pub status: ScanStatus,
    pub source: FileSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScanResult {
    /// A user with files
    pub fn success(username: &str, file_count: u64, total_size: u64, source: FileSource) -> Self {
        Self {
            username: username.to_string(),
            file_count,
            total_size,
            status: ScanStatus::Success,
            source,
            error: None,
        }
    }

    /// A user with nothing in either namespace
    pub fn empty(username: &str) -> Self {
        Self {
            username: username.to_string(),
            file_count: 0,
            total_size: 0,
            status: ScanStatus::Empty,
            source: FileSource::None,
            error: None,
        }
    }

    /// A user whose scan failed
    pub fn error(username: &str, message: impl Into<String>) -> Self {
        Self {
            username: username.to_string(),
            file_count: 0,
            total_size: 0,
            status: ScanStatus::Error,
            source: FileSource::None,
            error: Some(message.into()),
        }
    }

    /// Check the record's internal invariants
    ///
    /// `file_count == 0` exactly when the status is empty or error, and a
    /// `none` source never comes with a success.
    pub fn is_consistent(&self) -> bool {
        let zero = self.file_count == 0;
        let not_success = self.status != ScanStatus::Success;
        zero == not_success && (self.source != FileSource::None || not_success)
    }
}

/// How one namespace scan ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceOutcome {
    /// Root listed; counts are complete (minus truncated/skipped subtrees)
    Ok,
    /// Root does not exist; treated as empty
    NotFound,
    /// Root unreadable or a listing could not be used
    Failed(String),
    /// The namespace API could not be reached at all
    Unreachable(String),
}

/// Totals for one namespace of one user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceTally {
    /// Non-directory items found
    pub count: u64,
    /// Bytes, exact or estimated per namespace
    pub size: u64,
    /// Directories listed
    pub dirs: u64,
    /// Directories below the depth limit that were not descended
    pub truncated: u64,
    /// Subdirectories skipped after a recoverable error
    pub skipped: u64,
    pub outcome: NamespaceOutcome,
}

impl NamespaceTally {
    /// An empty tally with the given outcome
    pub fn with_outcome(outcome: NamespaceOutcome) -> Self {
        Self {
            count: 0,
            size: 0,
            dirs: 0,
            truncated: 0,
            skipped: 0,
            outcome,
        }
    }

    /// Whether the namespace failed outright
    pub fn is_failed(&self) -> bool {
        self.failure().is_some()
    }

    /// Whether the failure was losing contact with the API
    pub fn is_unreachable(&self) -> bool {
        matches!(self.outcome, NamespaceOutcome::Unreachable(_))
    }

    /// Failure message, if any
    pub fn failure(&self) -> Option<&str> {
        match &self.outcome {
            NamespaceOutcome::Failed(message) | NamespaceOutcome::Unreachable(message) => Some(message),
            NamespaceOutcome::Ok | NamespaceOutcome::NotFound => None,
        }
    }
}

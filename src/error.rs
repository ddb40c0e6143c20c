//! Error types for home-census
//!
//! This module defines the error hierarchy that covers:
//! - Remote listing errors (one call against one namespace)
//! - Checkpoint store errors
//! - Configuration and CLI errors
//! - Worker thread errors
//!
//! Listing errors are deliberately small and `Clone`: they are produced per
//! directory call, classified by the retry policy, and finally folded into a
//! per-namespace outcome. Only run-level failures ever reach `CensusError`.

use crate::retry::FailureClass;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the home-census application
#[derive(Error, Debug)]
pub enum CensusError {
    /// Remote listing errors that escaped a namespace scan
    #[error("Listing error: {0}")]
    List(#[from] ListError),

    /// Checkpoint store errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// I/O errors (report files, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Run-level abort after the checkpoint was flushed
    #[error(
        "Run aborted after {completed}/{total} users (last completed: {}): {reason}",
        last_username.as_deref().unwrap_or("none")
    )]
    Aborted {
        completed: u64,
        total: u64,
        last_username: Option<String>,
        reason: String,
    },
}

/// Errors from a single directory listing call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListError {
    /// Path does not exist (404-equivalent)
    #[error("Path not found: '{path}'")]
    NotFound { path: String },

    /// Caller may not read this path
    #[error("Permission denied: '{path}'")]
    PermissionDenied { path: String },

    /// Credentials were rejected
    #[error("Unauthorized request for '{path}' - check the access token")]
    Unauthorized { path: String },

    /// Server asked us to slow down (429-equivalent)
    #[error("Rate limited while listing '{path}'")]
    RateLimited { path: String },

    /// Server-side failure (5xx-equivalent)
    #[error("Server error {status} while listing '{path}'")]
    Server { path: String, status: u16 },

    /// Transport failure: timeout, refused connection, reset
    #[error("Network error while listing '{path}': {reason}")]
    Network { path: String, reason: String },

    /// Request or response could not be understood
    #[error("Malformed listing for '{path}': {reason}")]
    Malformed { path: String, reason: String },

    /// Retryable failures persisted past the attempt ceiling
    #[error("Giving up on '{path}' after {attempts} attempts: {last}")]
    RetriesExhausted {
        path: String,
        attempts: u32,
        last: Box<ListError>,
    },

    /// Shutdown was requested while the call was pending
    #[error("Listing of '{path}' cancelled")]
    Cancelled { path: String },
}

impl ListError {
    /// Path the failing call was made against
    pub fn path(&self) -> &str {
        match self {
            ListError::NotFound { path }
            | ListError::PermissionDenied { path }
            | ListError::Unauthorized { path }
            | ListError::RateLimited { path }
            | ListError::Server { path, .. }
            | ListError::Network { path, .. }
            | ListError::Malformed { path, .. }
            | ListError::RetriesExhausted { path, .. }
            | ListError::Cancelled { path } => path,
        }
    }

    /// Classify this error for the retry policy
    pub fn class(&self) -> FailureClass {
        match self {
            ListError::RateLimited { .. } => FailureClass::RateLimited,
            ListError::Server { .. } => FailureClass::ServerError,
            ListError::Network { .. } => FailureClass::NetworkError,
            ListError::NotFound { .. }
            | ListError::PermissionDenied { .. }
            | ListError::Unauthorized { .. }
            | ListError::Malformed { .. }
            | ListError::RetriesExhausted { .. }
            | ListError::Cancelled { .. } => FailureClass::Fatal,
        }
    }

    /// Check if this error can be skipped inside a subtree
    ///
    /// A subdirectory that vanished or that we may not read does not
    /// invalidate the rest of the namespace.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ListError::NotFound { .. } | ListError::PermissionDenied { .. }
        )
    }

    /// Check if this error means the API itself could not be reached
    ///
    /// Covers transport failures, rejected credentials and retryable
    /// failures that outlasted the attempt ceiling. Per-path refusals and
    /// malformed listings are not included.
    pub fn is_connectivity_failure(&self) -> bool {
        matches!(
            self,
            ListError::Network { .. }
                | ListError::Unauthorized { .. }
                | ListError::RetriesExhausted { .. }
        )
    }

    /// Check if this error means the credentials themselves are bad
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            ListError::Unauthorized { .. } | ListError::PermissionDenied { .. }
        )
    }
}

/// Checkpoint store errors
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error on the checkpoint file
    #[error("I/O error on checkpoint '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Atomic replace of the checkpoint file failed
    #[error("Failed to persist checkpoint '{path}': {reason}")]
    Persist { path: PathBuf, reason: String },

    /// Stored data does not decode into results
    #[error("Corrupt checkpoint '{path}': {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid work unit cap
    #[error("Invalid work unit cap {cap}: must be at least 1")]
    InvalidUnitCap { cap: usize },

    /// Invalid traversal depth
    #[error("Invalid max depth {depth}: must be between 1 and {max}")]
    InvalidMaxDepth { depth: u32, max: u32 },

    /// Invalid retry ceiling
    #[error("Invalid retry count {count}: must be between 1 and {max}")]
    InvalidRetryCount { count: u32, max: u32 },

    /// Workspace URL or token missing
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// No usernames given
    #[error("No usernames provided - pass them as arguments or use --users-file")]
    NoUsernames,

    /// Users file could not be read
    #[error("Cannot read users file '{path}': {reason}")]
    UsersFile { path: PathBuf, reason: String },

    /// A checkpoint exists but resume was not requested
    #[error("Checkpoint '{path}' already exists - pass --resume to continue it or remove it to start over")]
    CheckpointExists { path: PathBuf },

    /// Output path error
    #[error("Invalid output path '{path}': {reason}")]
    InvalidOutputPath { path: PathBuf, reason: String },
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    /// Work unit queue send failed
    #[error("Failed to send work unit: queue full or closed")]
    QueueSendFailed,

    /// Worker initialization failed
    #[error("Failed to initialize worker {id}: {reason}")]
    InitFailed { id: usize, reason: String },

    /// No listing strategy was usable for a namespace
    #[error("No usable listing strategy for {namespace}")]
    NoStrategy { namespace: String },
}

/// Result type alias for CensusError
pub type Result<T> = std::result::Result<T, CensusError>;

/// Result type alias for ListError
pub type ListResult<T> = std::result::Result<T, ListError>;

/// Result type alias for CheckpointError
pub type CheckpointResult<T> = std::result::Result<T, CheckpointError>;
